//! The mindful message protocol.
//!
//! One user turn walks `Idle → Seek → Clarify* → Acknowledge → Respond` and
//! then returns to `Idle`. Every step is appended to the
//! [`ConversationLedger`] before it is returned. Response generation is
//! gated by the [`HealthMonitor`]; upstream failures become fallback text
//! and are never surfaced to the caller.

pub mod wisdom;

use crate::config::ProtocolConfig;
use crate::error::{CoreError, HealthExhaustedError, ValidationError};
use crate::gateway::{ChatPayload, CompletionGateway, GenerationParams};
use crate::health::HealthMonitor;
use crate::health::breaker::{self, Admission};
use crate::history::{ChatHistory, ChatHistoryEntry, ContextTurn};
use crate::ledger::{ConversationLedger, Message, MessageKind, MessageMetadata};
use crate::scoring::QualityScore;
use std::time::Instant;
use strum::IntoStaticStr;

pub const GATEWAY_FALLBACK: &str = "I understand your message and am here to support you.";
pub const MAINTENANCE_MESSAGE: &str =
    "DhammaShell is under maintenance. Please try again in a little while.";

const REPHRASE_PROMPT: &str = "Would you like to rephrase this message to be more compassionate?";
const CLARIFY_PROMPT: &str = "Would you like to clarify this message?";

/// Healing reason recorded when the upstream call failed.
pub const REASON_GATEWAY_ERROR: &str = "gateway_error";
/// Healing reason recorded when the monitor refused the call.
pub const REASON_HEALING_EXHAUSTED: &str = "healing_exhausted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub needs_rephrase_below: u8,
    pub high_compassion_at: u8,
    pub preview_chars: usize,
    pub context_turns: usize,
}

impl ProtocolSettings {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            needs_rephrase_below: config.needs_rephrase_below,
            high_compassion_at: config.high_compassion_at,
            preview_chars: config.preview_chars,
            context_turns: config.context_turns,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TurnState {
    Idle,
    Seek,
    Clarify,
    Acknowledge,
}

pub struct MindfulProtocol<G> {
    ledger: ConversationLedger,
    history: ChatHistory,
    health: HealthMonitor,
    gateway: G,
    params: GenerationParams,
    settings: ProtocolSettings,
    state: TurnState,
    active_seek: Option<Message>,
}

impl<G: CompletionGateway> MindfulProtocol<G> {
    pub fn new(ledger: ConversationLedger, history: ChatHistory, gateway: G) -> Self {
        Self {
            ledger,
            history,
            health: HealthMonitor::default(),
            gateway,
            params: GenerationParams::default(),
            settings: ProtocolSettings::default(),
            state: TurnState::Idle,
            active_seek: None,
        }
    }

    pub fn with_health(mut self, health: HealthMonitor) -> Self {
        self.health = health;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_settings(mut self, settings: ProtocolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn ledger(&self) -> &ConversationLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut ConversationLedger {
        &mut self.ledger
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn health_mut(&mut self) -> &mut HealthMonitor {
        &mut self.health
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn active_seek(&self) -> Option<&Message> {
        self.active_seek.as_ref()
    }

    /// Start a new turn. Any unfinished turn is abandoned.
    pub fn create_seek(&mut self, content: &str) -> Result<Message, CoreError> {
        let seek = Message::new(MessageKind::Seek, content, None)?;
        self.ledger.append(seek.clone())?;
        self.active_seek = Some(seek.clone());
        self.state = TurnState::Seek;
        Ok(seek)
    }

    /// Ask the user to clarify or rephrase the active seek.
    pub fn request_clarification(
        &mut self,
        message: &Message,
        compassion_score: i64,
    ) -> Result<Message, CoreError> {
        let score = QualityScore::new(compassion_score)?;
        self.expect_active_seek(
            message,
            "request_clarification",
            &[TurnState::Seek, TurnState::Clarify],
        )?;

        let prompt = if score.value() < self.settings.needs_rephrase_below {
            REPHRASE_PROMPT
        } else {
            CLARIFY_PROMPT
        };
        let metadata = MessageMetadata::referencing(message).with_compassion_score(score);
        let clarify = Message::new(MessageKind::Clarify, prompt, Some(metadata))?;
        self.ledger.append(clarify.clone())?;
        self.state = TurnState::Clarify;
        Ok(clarify)
    }

    pub fn acknowledge(&mut self, message: &Message) -> Result<Message, CoreError> {
        self.expect_active_seek(message, "acknowledge", &[TurnState::Seek, TurnState::Clarify])?;

        let preview: String = message
            .content()
            .chars()
            .take(self.settings.preview_chars)
            .collect();
        let ack = Message::new(
            MessageKind::Acknowledge,
            &format!("Message received: {preview}..."),
            Some(MessageMetadata::referencing(message)),
        )?;
        self.ledger.append(ack.clone())?;
        self.state = TurnState::Acknowledge;
        Ok(ack)
    }

    /// Produce, record and return the Respond message for the acknowledged seek.
    ///
    /// `context` overrides the prior turns otherwise taken from chat history.
    /// Only validation and ledger storage failures are returned as errors.
    pub async fn generate_response(
        &mut self,
        message: &Message,
        compassion_score: i64,
        context: Option<&[ContextTurn]>,
    ) -> Result<Message, CoreError> {
        let score = QualityScore::new(compassion_score)?;
        self.expect_active_seek(message, "generate_response", &[TurnState::Acknowledge])?;

        let context = match context {
            Some(turns) => {
                let skip = turns.len().saturating_sub(self.settings.context_turns);
                turns[skip..].to_vec()
            }
            None => self.history.recent_context(self.settings.context_turns),
        };

        self.health.record_quality(score);
        let entry = match breaker::admit(&mut self.health) {
            Admission::Refused { attempts } => {
                let error = HealthExhaustedError { attempts };
                tracing::error!(
                    target: "dhammashell::healing",
                    "{error}; serving maintenance message"
                );
                ChatHistoryEntry::new(message.content(), String::new(), score)
                    .with_healing(MAINTENANCE_MESSAGE, REASON_HEALING_EXHAUSTED)
            }
            Admission::Admitted => self.call_gateway(message, score, &context, None).await,
            Admission::AdmittedAfterHealing(reason) => {
                self.call_gateway(message, score, &context, Some(reason.code()))
                    .await
            }
        };
        let entry = entry.with_context(context);
        let delivered = entry.delivered_response().to_string();

        if let Err(error) = self.history.append(entry) {
            tracing::error!("Failed to persist chat history: {error}");
        }

        let metadata = MessageMetadata::referencing(message).with_compassion_score(score);
        let response = self.create_response(&delivered, Some(metadata))?;
        self.state = TurnState::Idle;
        self.active_seek = None;
        Ok(response)
    }

    async fn call_gateway(
        &mut self,
        message: &Message,
        score: QualityScore,
        context: &[ContextTurn],
        healed_because: Option<&'static str>,
    ) -> ChatHistoryEntry {
        let payload = ChatPayload::build(&self.params, context, message.content());
        let started = Instant::now();
        let outcome = self.gateway.complete(&payload).await;
        let latency = started.elapsed();

        match outcome {
            Ok(text) => {
                self.health.record_success(latency);
                let text = if score.value() >= self.settings.high_compassion_at {
                    wisdom::with_wisdom(&text)
                } else {
                    text
                };
                let entry = ChatHistoryEntry::new(message.content(), text.as_str(), score)
                    .with_latency(latency);
                match healed_because {
                    Some(reason) => entry.with_healing(text, reason),
                    None => entry,
                }
            }
            Err(error) => {
                tracing::warn!(gateway = self.gateway.name(), "Completion failed: {error}");
                self.health.record_error();
                ChatHistoryEntry::new(message.content(), String::new(), score)
                    .with_latency(latency)
                    .with_healing(GATEWAY_FALLBACK, REASON_GATEWAY_ERROR)
            }
        }
    }

    /// Append an arbitrary Respond message.
    pub fn create_response(
        &mut self,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<Message, CoreError> {
        let response = Message::new(MessageKind::Respond, content, metadata)?;
        self.ledger.append(response.clone())?;
        Ok(response)
    }

    fn expect_active_seek(
        &self,
        message: &Message,
        operation: &'static str,
        allowed: &[TurnState],
    ) -> Result<(), ValidationError> {
        if message.kind() != MessageKind::Seek {
            return Err(ValidationError::WrongKind {
                expected: MessageKind::Seek.into(),
                found: message.kind().to_string(),
            });
        }
        if !allowed.contains(&self.state) {
            return Err(ValidationError::OutOfOrder {
                operation,
                state: self.state.into(),
            });
        }
        if self.active_seek.as_ref() != Some(message) {
            return Err(ValidationError::UnknownMessage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::health::HealthThresholds;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies with a fixed outcome and remembers every payload it saw.
    struct StubGateway {
        outcome: Result<String, GatewayError>,
        seen: Mutex<Vec<ChatPayload>>,
    }

    impl StubGateway {
        fn replying(text: &str) -> Self {
            Self {
                outcome: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                outcome: Err(GatewayError::Status {
                    status: 503,
                    body: "unavailable".into(),
                }),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl CompletionGateway for StubGateway {
        fn name(&self) -> &str {
            "stub"
        }

        fn complete<'a>(
            &'a self,
            payload: &'a ChatPayload,
        ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
            self.seen.lock().unwrap().push(payload.clone());
            let outcome = self.outcome.clone();
            Box::pin(async move { outcome })
        }
    }

    fn protocol(tmp: &TempDir, gateway: StubGateway) -> MindfulProtocol<StubGateway> {
        let ledger = ConversationLedger::load(tmp.path().join("conversation_history.json")).unwrap();
        let history = ChatHistory::load(tmp.path().join("chat_history.json"), 1000).unwrap();
        MindfulProtocol::new(ledger, history, gateway)
    }

    #[test]
    fn create_seek_trims_and_persists() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));

        let seek = protocol.create_seek("  How do I find calm?  ").unwrap();

        assert_eq!(seek.content(), "How do I find calm?");
        assert_eq!(protocol.state(), TurnState::Seek);
        let reloaded =
            ConversationLedger::load(tmp.path().join("conversation_history.json")).unwrap();
        assert_eq!(reloaded.snapshot(), &[seek]);
    }

    #[test]
    fn create_seek_rejects_blank_input() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));

        let err = protocol.create_seek("   ").unwrap_err();

        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyContent)));
        assert!(protocol.ledger().is_empty());
    }

    #[test]
    fn clarification_wording_follows_score() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));
        let seek = protocol.create_seek("you are stupid").unwrap();

        let low = protocol.request_clarification(&seek, 1).unwrap();
        assert_eq!(low.content(), REPHRASE_PROMPT);
        assert_eq!(
            low.metadata().unwrap().compassion_score,
            Some(QualityScore::new(1).unwrap())
        );

        let high = protocol.request_clarification(&seek, 3).unwrap();
        assert_eq!(high.content(), CLARIFY_PROMPT);
        assert_eq!(protocol.state(), TurnState::Clarify);
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));
        let seek = protocol.create_seek("hello").unwrap();

        for score in [-1, 6, 42] {
            let err = protocol.request_clarification(&seek, score).unwrap_err();
            assert!(matches!(
                err,
                CoreError::Validation(ValidationError::QualityOutOfRange { .. })
            ));
        }
        assert_eq!(protocol.ledger().len(), 1);
    }

    #[test]
    fn acknowledge_previews_fifty_chars() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));
        let long = "ü".repeat(80);
        let seek = protocol.create_seek(&long).unwrap();

        let ack = protocol.acknowledge(&seek).unwrap();

        let expected = format!("Message received: {}...", "ü".repeat(50));
        assert_eq!(ack.content(), expected);
        assert_eq!(
            ack.metadata().unwrap().original_message.as_deref(),
            Some(&seek)
        );
    }

    #[test]
    fn acknowledge_requires_the_active_seek() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));
        let stale = protocol.create_seek("first").unwrap();
        protocol.create_seek("second").unwrap();

        let err = protocol.acknowledge(&stale).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::UnknownMessage)));
    }

    #[tokio::test]
    async fn generate_before_acknowledge_is_out_of_order() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("hi"));
        let seek = protocol.create_seek("hello").unwrap();

        let err = protocol.generate_response(&seek, 3, None).await.unwrap_err();

        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfOrder {
                operation: "generate_response",
                state: "seek"
            })
        ));
        assert_eq!(protocol.gateway().calls(), 0);
    }

    #[tokio::test]
    async fn full_turn_records_ledger_and_history() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("Breathe slowly."));
        let seek = protocol.create_seek("I feel anxious").unwrap();
        protocol.acknowledge(&seek).unwrap();

        let response = protocol.generate_response(&seek, 3, None).await.unwrap();

        assert_eq!(response.kind(), MessageKind::Respond);
        assert_eq!(response.content(), "Breathe slowly.");
        assert_eq!(protocol.state(), TurnState::Idle);
        assert!(protocol.active_seek().is_none());

        let kinds: Vec<MessageKind> = protocol.ledger().snapshot().iter().map(Message::kind).collect();
        assert_eq!(
            kinds,
            [MessageKind::Seek, MessageKind::Acknowledge, MessageKind::Respond]
        );

        let entry = protocol.history().entries().next().unwrap();
        assert_eq!(entry.request_text, "I feel anxious");
        assert!(!entry.is_healed());
        assert!(entry.latency().is_some());
        assert_eq!(protocol.health().snapshot().api_calls, 1);
    }

    #[tokio::test]
    async fn high_scores_earn_a_wisdom_suffix() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("With kindness."));
        let seek = protocol.create_seek("thank you for your help").unwrap();
        protocol.acknowledge(&seek).unwrap();

        let response = protocol.generate_response(&seek, 4, None).await.unwrap();

        assert!(response.content().starts_with("With kindness.\n\nDharma Wisdom: "));
    }

    #[tokio::test]
    async fn gateway_failure_becomes_fallback_text() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::failing());
        let seek = protocol.create_seek("hello").unwrap();
        protocol.acknowledge(&seek).unwrap();

        let response = protocol.generate_response(&seek, 5, None).await.unwrap();

        assert_eq!(response.content(), GATEWAY_FALLBACK);
        let entry = protocol.history().entries().next().unwrap();
        assert_eq!(entry.healing_reason(), Some(REASON_GATEWAY_ERROR));
        assert_eq!(protocol.health().snapshot().consecutive_errors, 1);
    }

    #[tokio::test]
    async fn exhausted_health_serves_maintenance_without_calling_upstream() {
        let tmp = TempDir::new().unwrap();
        let health = HealthMonitor::new(HealthThresholds {
            max_healing_attempts: 0,
            min_check_interval: std::time::Duration::ZERO,
            ..HealthThresholds::default()
        });
        let mut protocol = protocol(&tmp, StubGateway::replying("unused")).with_health(health);
        for _ in 0..6 {
            protocol.health_mut().record_error();
        }
        let seek = protocol.create_seek("hello").unwrap();
        protocol.acknowledge(&seek).unwrap();

        let response = protocol.generate_response(&seek, 3, None).await.unwrap();

        assert_eq!(response.content(), MAINTENANCE_MESSAGE);
        assert_eq!(protocol.gateway().calls(), 0);
        let entry = protocol.history().entries().next().unwrap();
        assert_eq!(entry.healing_reason(), Some(REASON_HEALING_EXHAUSTED));
    }

    #[tokio::test]
    async fn explicit_context_is_bounded_and_sent_in_order() {
        let tmp = TempDir::new().unwrap();
        let mut protocol = protocol(&tmp, StubGateway::replying("ok")).with_settings(
            ProtocolSettings {
                context_turns: 2,
                ..ProtocolSettings::default()
            },
        );
        let context = vec![
            ContextTurn::user("one"),
            ContextTurn::assistant("two"),
            ContextTurn::user("three"),
        ];
        let seek = protocol.create_seek("four").unwrap();
        protocol.acknowledge(&seek).unwrap();

        protocol
            .generate_response(&seek, 3, Some(&context))
            .await
            .unwrap();

        let seen = protocol.gateway().seen.lock().unwrap();
        let contents: Vec<&str> = seen[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["two", "three", "four"]);
        assert_eq!(
            protocol.history().entries().next().unwrap().context_snapshot.len(),
            2
        );
    }
}
