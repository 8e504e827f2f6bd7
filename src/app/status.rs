use chrono::{DateTime, TimeDelta, Utc};
use dhammashell::health::{HealthMonitor, HealthThresholds};
use dhammashell::history::ChatHistory;
use dhammashell::protocol::{REASON_GATEWAY_ERROR, REASON_HEALING_EXHAUSTED};
use dhammashell::ui::style;
use dhammashell::Config;

/// Rebuild a monitor's rolling metrics from persisted history.
///
/// Quality and latency come from every entry (the monitor caps them).
/// Gateway failures only count when they fall inside the current error window.
pub fn replay_history(monitor: &mut HealthMonitor, history: &ChatHistory, now: DateTime<Utc>) {
    let window = TimeDelta::from_std(monitor.thresholds().error_window).unwrap_or(TimeDelta::MAX);
    let window_start = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

    for entry in history.entries() {
        monitor.record_quality(entry.quality_score);
        match entry.healing_reason() {
            Some(REASON_GATEWAY_ERROR) => {
                if entry.timestamp >= window_start {
                    monitor.record_error();
                }
            }
            Some(REASON_HEALING_EXHAUSTED) => {}
            _ => {
                if let Some(latency) = entry.latency() {
                    monitor.record_success(latency);
                }
            }
        }
    }
}

pub fn render_health(config: &Config, history: &ChatHistory) -> anyhow::Result<String> {
    let mut monitor = HealthMonitor::new(HealthThresholds::from_config(&config.health));
    replay_history(&mut monitor, history, Utc::now());
    let summary = monitor.summary();

    let lines = [
        format!("◆ {}", style::header("DhammaShell health")),
        String::new(),
        format!("  status           {}", style::value(&summary.status)),
        format!("  history entries  {}", history.len()),
        format!(
            "  history file     {}",
            history
                .path()
                .map_or_else(|| "(in memory)".to_string(), |p| p.display().to_string())
        ),
        String::new(),
        serde_json::to_string_pretty(&summary)?,
    ];
    Ok(lines.join("\n"))
}
