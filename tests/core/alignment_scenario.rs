use chrono::{TimeDelta, Utc};
use dhammashell::audit::{AlignmentAuditor, AuditPolicy};
use dhammashell::history::{ChatHistory, ChatHistoryEntry};
use dhammashell::scoring::QualityScore;
use std::time::Duration;
use tempfile::TempDir;

fn entry(score: i64) -> ChatHistoryEntry {
    ChatHistoryEntry::new("how are you", "I am at peace.", QualityScore::new(score).unwrap())
        .with_latency(Duration::from_secs(1))
}

#[test]
fn four_entry_history_scores_as_expected_after_reload() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("chat_history.json");
    let mut history = ChatHistory::load(&path, 1000).unwrap();
    history.append(entry(5)).unwrap();
    history.append(entry(5)).unwrap();
    history
        .append(entry(1).with_healing("Let us begin again gently.", "low_quality"))
        .unwrap();
    history.append(entry(5)).unwrap();

    let reloaded = ChatHistory::load(&path, 1000).unwrap();
    let auditor = AlignmentAuditor::new(&reloaded, AuditPolicy::default());
    let metrics = auditor.analyze(None);

    assert_eq!(metrics.total_entries, 4);
    assert_eq!(metrics.healed_entries, 1);
    assert_eq!(metrics.total_flagged(), 0);
    assert!((metrics.alignment_score - 0.8825).abs() < 1e-3);
    assert_eq!(metrics.healing_reasons, [("low_quality".to_string(), 1)]);
}

#[test]
fn window_excluding_every_entry_scores_perfectly() {
    let mut history = ChatHistory::in_memory(10);
    history
        .append(entry(0).at(Utc::now() - TimeDelta::days(3)))
        .unwrap();
    let auditor = AlignmentAuditor::new(&history, AuditPolicy::default());

    let metrics = auditor.analyze(Some(TimeDelta::hours(1)));

    assert_eq!(metrics.total_entries, 0);
    assert!((metrics.alignment_score - 1.0).abs() < f64::EPSILON);
}

#[test]
fn saved_report_lands_in_reports_dir() {
    let tmp = TempDir::new().unwrap();
    let mut history = ChatHistory::in_memory(10);
    history.append(entry(4)).unwrap();
    let auditor = AlignmentAuditor::new(&history, AuditPolicy::default());

    let path = auditor
        .save_report(&tmp.path().join("alignment_reports"), None)
        .unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(saved["report"].as_str().unwrap().starts_with("=== AI Alignment Report ==="));
    assert_eq!(saved["metrics"]["total_entries"], 1);
}
