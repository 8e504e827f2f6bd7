use super::AlignmentMetrics;
use super::policy::AuditPolicy;
use std::fmt::Write;

/// Render the human-readable alignment report. Output depends only on the
/// inputs, so equal metrics always yield identical text.
pub fn render(metrics: &AlignmentMetrics, policy: &AuditPolicy) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, metrics, policy);
    out
}

fn write_report(
    out: &mut String,
    metrics: &AlignmentMetrics,
    policy: &AuditPolicy,
) -> std::fmt::Result {
    writeln!(out, "=== AI Alignment Report ===")?;
    writeln!(
        out,
        "Time Period: {:.1} hours",
        metrics.time_period.num_seconds() as f64 / 3600.0
    )?;
    writeln!(out, "Total Interactions: {}", metrics.total_entries)?;
    writeln!(out, "Alignment Score: {:.2}%", metrics.alignment_score * 100.0)?;

    writeln!(out, "\nCompassion Metrics:")?;
    match metrics.average_quality() {
        Some(avg) => writeln!(out, "- Average Compassion Score: {avg:.2}/5.0")?,
        None => writeln!(out, "- No compassion scores recorded")?,
    }

    writeln!(out, "\nHealing Events:")?;
    writeln!(out, "- Total Healing Events: {}", metrics.healed_entries)?;
    if metrics.total_entries > 0 {
        writeln!(out, "- Healing Rate: {:.1}%", metrics.healing_rate() * 100.0)?;
    } else {
        writeln!(out, "- No interactions recorded")?;
    }
    writeln!(out, "- Longest Flagged Streak: {}", metrics.max_flagged_streak)?;

    writeln!(out, "\nResponse Times:")?;
    match metrics.average_latency() {
        Some(avg) => writeln!(out, "- Average Response Time: {:.2}s", avg.as_secs_f64())?,
        None => writeln!(out, "- No response times recorded")?,
    }

    if !metrics.healing_reasons.is_empty() {
        writeln!(out, "\nHealing Reasons:")?;
        for (reason, count) in &metrics.healing_reasons {
            writeln!(out, "- {reason}: {count} times")?;
        }
    }

    if !metrics.harm_patterns.is_empty() {
        writeln!(out, "\nDetected Harmful Patterns:")?;
        for (pattern, count) in &metrics.harm_patterns {
            writeln!(out, "- {pattern}: {count} times")?;
        }
    }

    write!(out, "\nRecommendations:")?;
    if metrics.alignment_score < policy.recommendation_threshold {
        write!(out, "\n- Consider reviewing and adjusting response patterns")?;
        write!(out, "\n- Monitor for recurring harmful patterns")?;
        write!(out, "\n- Evaluate compassion score distribution")?;
        if metrics.max_flagged_streak > 0 {
            write!(out, "\n- Address consecutive flagged responses")?;
        }
        let slow = policy.latency_ceiling.mul_f64(2.0 / 3.0);
        if metrics.average_latency().is_some_and(|avg| avg > slow) {
            write!(out, "\n- Investigate response time performance")?;
        }
    } else {
        write!(out, "\n- System is maintaining good alignment")?;
        write!(out, "\n- Continue monitoring for any changes in patterns")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AlignmentAuditor;
    use crate::history::{ChatHistory, ChatHistoryEntry};
    use crate::scoring::QualityScore;
    use std::time::Duration;

    fn history_with(entries: Vec<ChatHistoryEntry>) -> ChatHistory {
        let mut history = ChatHistory::in_memory(10);
        for entry in entries {
            history.append(entry).unwrap();
        }
        history
    }

    #[test]
    fn healthy_history_gets_positive_recommendations() {
        let history = history_with(vec![
            ChatHistoryEntry::new("q", "Rest well.", QualityScore::new(5).unwrap())
                .with_latency(Duration::from_secs(2)),
        ]);
        let auditor = AlignmentAuditor::new(&history, AuditPolicy::default());

        let text = auditor.report(None);

        assert!(text.starts_with("=== AI Alignment Report ===\n"));
        assert!(text.contains("Total Interactions: 1"));
        assert!(text.contains("- Average Compassion Score: 5.00/5.0"));
        assert!(text.contains("- Average Response Time: 2.00s"));
        assert!(text.ends_with("- Continue monitoring for any changes in patterns"));
        assert!(!text.contains("Detected Harmful Patterns"));
    }

    #[test]
    fn poor_history_gets_corrective_recommendations() {
        let flagged = |text: &str| {
            ChatHistoryEntry::new("q", text, QualityScore::new(0).unwrap())
                .with_latency(Duration::from_secs(29))
                .with_healing("I am here to help.", "gateway_error")
        };
        let history = history_with(vec![
            flagged("this is illegal and harmful"),
            flagged("a password breach"),
        ]);
        let auditor = AlignmentAuditor::new(&history, AuditPolicy::default());
        let metrics = auditor.analyze(None);

        let text = render(&metrics, auditor.policy());

        assert!(metrics.alignment_score < 0.7);
        assert!(text.contains("- gateway_error: 2 times"));
        assert!(text.contains("Detected Harmful Patterns:"));
        assert!(text.contains("- Address consecutive flagged responses"));
        assert!(text.contains("- Investigate response time performance"));
        assert_eq!(text, render(&metrics, auditor.policy()));
    }

    #[test]
    fn empty_report_mentions_missing_data() {
        let history = ChatHistory::in_memory(10);
        let text = AlignmentAuditor::new(&history, AuditPolicy::default()).report(None);
        assert!(text.contains("- No compassion scores recorded"));
        assert!(text.contains("- No interactions recorded"));
        assert!(text.contains("Alignment Score: 100.00%"));
    }
}
