use crate::app::{chat, status};
use crate::cli::commands::{AuditCommands, Cli, Commands};
use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use dhammashell::Config;
use dhammashell::audit::{AlignmentAuditor, AuditPolicy};
use dhammashell::gateway::ApiKey;
use dhammashell::history::ChatHistory;
use dhammashell::ledger::ConversationLedger;
use dhammashell::scoring::{CompassionScorer, LexiconScorer};
use dhammashell::ui::style;
use std::path::Path;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Chat { calm } => chat::run(&config, calm).await,
        Commands::Check { text } => check(&text),
        Commands::Export => {
            let ledger = ConversationLedger::load(config.storage.ledger_path())?;
            println!("{}", ledger.export()?);
            Ok(())
        }
        Commands::Import { file } => import(&config, &file),
        Commands::Audit { audit_command } => audit(&config, audit_command),
        Commands::Config { api_key, clear } => configure(config, api_key, clear),
    }
}

fn check(text: &str) -> Result<()> {
    println!("{}", render_check(text)?);
    Ok(())
}

fn render_check(text: &str) -> Result<String> {
    let assessment = LexiconScorer.assess(text)?;
    Ok(format!(
        "Compassion score: {}\n{}",
        style::score(assessment.score, assessment.score.value()),
        style::dim(assessment.feedback)
    ))
}

fn import(config: &Config, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut ledger = ConversationLedger::load(config.storage.ledger_path())?;
    ledger.import(&raw)?;
    println!(
        "{} Imported {} messages into {}",
        style::success("✓"),
        ledger.len(),
        style::value(ledger.path().display())
    );
    Ok(())
}

fn audit(config: &Config, command: AuditCommands) -> Result<()> {
    let history = ChatHistory::load(config.storage.history_path(), config.storage.history_cap)?;
    match command {
        AuditCommands::Alignment { hours, save } => {
            let window = match hours {
                None => None,
                Some(h) if h > 0 => Some(
                    TimeDelta::try_hours(h).with_context(|| format!("--hours {h} is too large"))?,
                ),
                Some(h) => bail!("--hours must be positive, got {h}"),
            };
            let auditor = AlignmentAuditor::new(&history, AuditPolicy::from_config(&config.audit));
            println!("{}", auditor.report(window));
            if save {
                let path = auditor.save_report(&config.storage.reports_path(), window)?;
                println!(
                    "\n{} Report saved to {}",
                    style::success("✓"),
                    style::value(path.display())
                );
            }
            Ok(())
        }
        AuditCommands::Health => {
            println!("{}", status::render_health(config, &history)?);
            Ok(())
        }
    }
}

fn configure(mut config: Config, api_key: Option<String>, clear: bool) -> Result<()> {
    if clear {
        config.api_key = None;
        config.save()?;
        println!("{} API key removed", style::success("✓"));
        return Ok(());
    }

    let Some(raw) = api_key else {
        match config.resolve_api_key() {
            Some(key) => println!("API key: {}", style::value(key.masked())),
            None => println!("{}", style::yellow("No API key configured")),
        }
        println!("Config: {}", style::value(config.config_path.display()));
        return Ok(());
    };

    let key = ApiKey::new(&raw)?;
    config.api_key = Some(key.expose().to_string());
    config.save()?;
    println!(
        "{} API key {} saved to {}",
        style::success("✓"),
        style::value(key.masked()),
        style::value(config.config_path.display())
    );
    Ok(())
}
