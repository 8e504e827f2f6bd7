use dhammashell::config::GatewayConfig;
use dhammashell::gateway::{ApiKey, OpenRouterGateway};
use dhammashell::health::{ResilientGateway, RetryPolicy};
use dhammashell::history::ChatHistory;
use dhammashell::ledger::{ConversationLedger, MessageKind};
use dhammashell::protocol::{GATEWAY_FALLBACK, MindfulProtocol, REASON_GATEWAY_ERROR, TurnState};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn protocol_for(
    server: &MockServer,
    tmp: &TempDir,
    retries: u32,
) -> MindfulProtocol<ResilientGateway<OpenRouterGateway>> {
    let config = GatewayConfig {
        base_url: server.uri(),
        ..GatewayConfig::default()
    };
    let gateway =
        OpenRouterGateway::new(&config, &ApiKey::new("sk-or-integration").unwrap()).unwrap();
    let policy = RetryPolicy {
        max_retries: retries,
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
    };
    let ledger = ConversationLedger::load(tmp.path().join("ledger.json")).unwrap();
    let history = ChatHistory::load(tmp.path().join("history.json"), 1000).unwrap();
    MindfulProtocol::new(ledger, history, ResilientGateway::new(gateway, policy))
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": text}}]
    }))
}

#[tokio::test]
async fn full_turn_is_recorded_in_ledger_and_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Breathe in, breathe out."))
        .expect(2)
        .mount(&server)
        .await;
    let tmp = TempDir::new().unwrap();
    let mut protocol = protocol_for(&server, &tmp, 0);

    let seek = protocol.create_seek("  How can I find calm?  ").unwrap();
    protocol.acknowledge(&seek).unwrap();
    let reply = protocol.generate_response(&seek, 3, None).await.unwrap();

    assert_eq!(reply.content(), "Breathe in, breathe out.");
    assert_eq!(protocol.state(), TurnState::Idle);

    let second = protocol.create_seek("And tomorrow?").unwrap();
    protocol.acknowledge(&second).unwrap();
    protocol.generate_response(&second, 3, None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(
        &contents[1..],
        ["How can I find calm?", "Breathe in, breathe out.", "And tomorrow?"]
    );

    let ledger = ConversationLedger::load(tmp.path().join("ledger.json")).unwrap();
    let kinds: Vec<MessageKind> = ledger.snapshot().iter().map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        [
            MessageKind::Seek,
            MessageKind::Acknowledge,
            MessageKind::Respond,
            MessageKind::Seek,
            MessageKind::Acknowledge,
            MessageKind::Respond,
        ]
    );
    let history = ChatHistory::load(tmp.path().join("history.json"), 1000).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.entries().all(|e| !e.is_healed()));
}

#[tokio::test]
async fn upstream_outage_serves_fallback_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(2)
        .mount(&server)
        .await;
    let tmp = TempDir::new().unwrap();
    let mut protocol = protocol_for(&server, &tmp, 1);

    let seek = protocol.create_seek("Are you there?").unwrap();
    protocol.acknowledge(&seek).unwrap();
    let reply = protocol.generate_response(&seek, 4, None).await.unwrap();

    assert_eq!(reply.content(), GATEWAY_FALLBACK);
    assert_eq!(protocol.health().snapshot().errors, 1);
    let entry = protocol.history().entries().last().unwrap();
    assert_eq!(entry.original_response, "");
    assert_eq!(entry.healing_reason(), Some(REASON_GATEWAY_ERROR));
    assert_eq!(entry.healed_response(), Some(GATEWAY_FALLBACK));
}

#[tokio::test]
async fn rejected_credentials_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key sk-or-integration"))
        .expect(1)
        .mount(&server)
        .await;
    let tmp = TempDir::new().unwrap();
    let mut protocol = protocol_for(&server, &tmp, 3);

    let seek = protocol.create_seek("hello").unwrap();
    protocol.acknowledge(&seek).unwrap();
    let reply = protocol.generate_response(&seek, 3, None).await.unwrap();

    assert_eq!(reply.content(), GATEWAY_FALLBACK);
    let saved = std::fs::read_to_string(tmp.path().join("history.json")).unwrap();
    assert!(!saved.contains("sk-or-integration"));
}
