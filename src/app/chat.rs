use anyhow::{Context, Result};
use dhammashell::Config;
use dhammashell::gateway::{CompletionGateway, GenerationParams, OpenRouterGateway};
use dhammashell::health::{HealthMonitor, HealthThresholds, ResilientGateway, RetryPolicy};
use dhammashell::history::ChatHistory;
use dhammashell::ledger::{ConversationLedger, Message};
use dhammashell::protocol::{MindfulProtocol, ProtocolSettings};
use dhammashell::scoring::{CompassionScorer, LexiconScorer, QualityScore};
use dhammashell::ui::style;
use dialoguer::{Confirm, Input};

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

/// Assemble the protocol around the configured upstream.
pub fn build_protocol(
    config: &Config,
) -> Result<MindfulProtocol<ResilientGateway<OpenRouterGateway>>> {
    let api_key = config.resolve_api_key().context(
        "No API key configured. Run `ds config --api-key <KEY>` or set OPENROUTER_API_KEY",
    )?;
    let gateway = OpenRouterGateway::new(&config.gateway, &api_key)?;
    let gateway = ResilientGateway::new(gateway, RetryPolicy::from_config(&config.reliability));

    let ledger = ConversationLedger::load(config.storage.ledger_path())?;
    let history = ChatHistory::load(config.storage.history_path(), config.storage.history_cap)?;

    Ok(MindfulProtocol::new(ledger, history, gateway)
        .with_health(HealthMonitor::new(HealthThresholds::from_config(
            &config.health,
        )))
        .with_params(GenerationParams::from_config(&config.gateway))
        .with_settings(ProtocolSettings::from_config(&config.protocol)))
}

pub async fn run(config: &Config, calm: bool) -> Result<()> {
    let mut protocol = build_protocol(config)?;
    let scorer = LexiconScorer;

    println!("{}", style::header("DhammaShell"));
    println!(
        "{}",
        style::dim("Speak mindfully. Type `exit` to end the session.")
    );

    loop {
        let Some(text) = prompt_line("you")? else {
            break;
        };
        let (seek, score) = seek_with_care(&mut protocol, &scorer, text, calm)?;

        protocol.acknowledge(&seek)?;
        let response = protocol
            .generate_response(&seek, i64::from(score.value()), None)
            .await?;
        println!("\n{} {}\n", style::accent("ds ›"), response.content());
    }

    println!("{}", style::dim("May you be well."));
    Ok(())
}

/// Record the seek and, unless `calm`, offer rephrasing while it scores low.
fn seek_with_care<G: CompletionGateway>(
    protocol: &mut MindfulProtocol<G>,
    scorer: &dyn CompassionScorer,
    mut text: String,
    calm: bool,
) -> Result<(Message, QualityScore)> {
    loop {
        let seek = protocol.create_seek(&text)?;
        let assessment = scorer.assess(&text)?;
        if calm || assessment.score.value() >= protocol.settings().needs_rephrase_below {
            return Ok((seek, assessment.score));
        }

        let clarify = protocol.request_clarification(&seek, i64::from(assessment.score.value()))?;
        println!(
            "{} {}",
            style::score(assessment.score, assessment.score.value()),
            style::yellow(assessment.feedback)
        );
        let rephrase = Confirm::new()
            .with_prompt(clarify.content())
            .default(true)
            .interact()?;
        if !rephrase {
            return Ok((seek, assessment.score));
        }
        match prompt_line("rephrase")? {
            Some(rephrased) => text = rephrased,
            None => return Ok((seek, assessment.score)),
        }
    }
}

/// Next non-blank line, or `None` when the user asks to leave.
fn prompt_line(label: &str) -> Result<Option<String>> {
    loop {
        let line: String = Input::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&line.to_lowercase().as_str()) {
            return Ok(None);
        }
        return Ok(Some(line.to_string()));
    }
}
