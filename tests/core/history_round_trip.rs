use chrono::{TimeZone, Utc};
use dhammashell::history::{ChatHistory, ChatHistoryEntry, ContextTurn};
use dhammashell::scoring::QualityScore;
use std::time::Duration;
use tempfile::TempDir;

fn sample_history() -> ChatHistory {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let mut history = ChatHistory::in_memory(10);
    history
        .append(
            ChatHistoryEntry::new("how do I rest", "Breathe slowly.", QualityScore::new(4).unwrap())
                .with_latency(Duration::from_millis(1234))
                .at(base + chrono::TimeDelta::microseconds(123_456)),
        )
        .unwrap();
    history
        .append(
            ChatHistoryEntry::new("and now?", "", QualityScore::new(1).unwrap())
                .with_healing("I understand your message.", "gateway_error")
                .with_context(vec![
                    ContextTurn::user("how do I rest"),
                    ContextTurn::assistant("Breathe slowly."),
                ])
                .at(base + chrono::TimeDelta::milliseconds(2_500)),
        )
        .unwrap();
    history
}

#[test]
fn export_then_import_reproduces_every_field() {
    let source = sample_history();
    let exported = source.export().unwrap();

    let mut target = ChatHistory::in_memory(10);
    target.import(&exported).unwrap();

    let original: Vec<&ChatHistoryEntry> = source.entries().collect();
    let imported: Vec<&ChatHistoryEntry> = target.entries().collect();
    assert_eq!(imported, original);
    assert_eq!(imported[0].latency_ms, Some(1234));
    assert_eq!(imported[1].healing_reason(), Some("gateway_error"));
    assert_eq!(imported[1].context_snapshot.len(), 2);
}

#[test]
fn imported_history_is_persisted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("chat_history.json");
    let source = sample_history();

    let mut target = ChatHistory::load(&path, 10).unwrap();
    target.import(&source.export().unwrap()).unwrap();

    let reloaded = ChatHistory::load(&path, 10).unwrap();
    assert!(reloaded.entries().eq(source.entries()));
}
