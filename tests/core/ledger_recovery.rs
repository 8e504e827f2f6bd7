use dhammashell::ledger::{ConversationLedger, Message, MessageKind};
use std::fs;
use tempfile::TempDir;

#[test]
fn invalid_json_is_quarantined_and_ledger_starts_empty() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("conversation_history.json");
    fs::write(&path, "{ this is not json").unwrap();

    let mut ledger = ConversationLedger::load(&path).unwrap();

    assert!(ledger.is_empty());
    let backup = tmp.path().join("conversation_history.json.bak");
    assert_eq!(fs::read_to_string(&backup).unwrap(), "{ this is not json");
    assert!(!path.exists());

    ledger
        .append(Message::new(MessageKind::Seek, "hello again", None).unwrap())
        .unwrap();
    let reloaded = ConversationLedger::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.snapshot()[0].content(), "hello again");
}

#[test]
fn export_then_import_into_a_fresh_ledger_keeps_order() {
    let tmp = TempDir::new().unwrap();
    let mut source = ConversationLedger::load(tmp.path().join("a.json")).unwrap();
    for (kind, text) in [
        (MessageKind::Seek, "how do I rest"),
        (MessageKind::Acknowledge, "Message received: how do I rest..."),
        (MessageKind::Respond, "Breathe slowly."),
    ] {
        source.append(Message::new(kind, text, None).unwrap()).unwrap();
    }

    let exported = source.export().unwrap();
    let mut target = ConversationLedger::load(tmp.path().join("b.json")).unwrap();
    target.import(&exported).unwrap();

    assert_eq!(target.snapshot(), source.snapshot());
    let reloaded = ConversationLedger::load(tmp.path().join("b.json")).unwrap();
    assert_eq!(reloaded.snapshot(), source.snapshot());
}

#[test]
fn unknown_message_tag_is_an_error_not_a_quarantine() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ledger.json");
    fs::write(
        &path,
        r#"[{"type":"shout","content":"hi","timestamp":"2024-01-01T00:00:00","metadata":null}]"#,
    )
    .unwrap();

    assert!(ConversationLedger::load(&path).is_err());
    assert!(path.exists());
}
