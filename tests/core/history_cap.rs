use dhammashell::history::{ChatHistory, ChatHistoryEntry, DEFAULT_HISTORY_CAP};
use dhammashell::scoring::QualityScore;
use std::fs;
use tempfile::TempDir;

fn entry(i: usize) -> ChatHistoryEntry {
    ChatHistoryEntry::new(format!("question {i}"), format!("answer {i}"), QualityScore::new(4).unwrap())
}

#[test]
fn appending_past_the_cap_evicts_the_oldest_entry() {
    let mut history = ChatHistory::in_memory(DEFAULT_HISTORY_CAP);
    for i in 0..=DEFAULT_HISTORY_CAP {
        history.append(entry(i)).unwrap();
    }

    assert_eq!(history.len(), 1000);
    assert_eq!(history.entries().next().unwrap().request_text, "question 1");
    assert_eq!(history.entries().last().unwrap().request_text, "question 1000");
}

#[test]
fn persisted_history_stays_capped_across_reloads() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("chat_history.json");

    let mut seed = ChatHistory::in_memory(DEFAULT_HISTORY_CAP);
    for i in 0..DEFAULT_HISTORY_CAP {
        seed.append(entry(i)).unwrap();
    }
    fs::write(&path, seed.export().unwrap()).unwrap();

    let mut history = ChatHistory::load(&path, DEFAULT_HISTORY_CAP).unwrap();
    assert_eq!(history.len(), 1000);
    history.append(entry(DEFAULT_HISTORY_CAP)).unwrap();

    let reloaded = ChatHistory::load(&path, DEFAULT_HISTORY_CAP).unwrap();
    assert_eq!(reloaded.len(), 1000);
    assert_eq!(reloaded.entries().next().unwrap().request_text, "question 1");
}

#[test]
fn corrupt_history_file_is_backed_up() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("chat_history.json");
    fs::write(&path, "not json at all").unwrap();

    let history = ChatHistory::load(&path, 10).unwrap();

    assert!(history.is_empty());
    assert!(tmp.path().join("chat_history.json.bak").exists());
}
