use crate::core::events::{JobEvent, RunEvent};
use crate::core::job::{JobState, Reason};
use crate::core::models::RunDirs;
use crate::core::orchestrator::RunReport;
use crate::utils::time::format_duration;
use colored::{Color, Colorize};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const RULE: &str = "═══════════════════════════════════════";

pub fn print_banner(target: &str, run_id: &str, interactive: bool) {
    println!("{}", RULE.color(Color::Cyan).bold());
    println!("{}", "ipsnipe".color(Color::Cyan).bold());
    println!("{}", RULE.color(Color::Cyan).bold());
    println!("{}: {}", "Target".color(Color::Cyan).bold(), target);
    println!("{}: {}", "Run ID".color(Color::Cyan).bold(), run_id);
    if interactive {
        println!("{}", "s + Enter skip, q + Enter quit".dimmed());
    }
}

fn state_color(state: JobState) -> Color {
    match state {
        JobState::Success => Color::Green,
        JobState::Skipped => Color::Yellow,
        JobState::TimedOut => Color::Magenta,
        JobState::Failed => Color::Red,
        JobState::Pending | JobState::Running => Color::White,
    }
}

pub fn finished_line(event: &JobEvent) -> String {
    let mut line = format!(
        "  {} {} ({})",
        event.state.as_str().color(state_color(event.state)).bold(),
        event.tool,
        format_duration(event.duration)
    );
    if let Some(reason) = event.reason {
        line.push_str(&format!(" {}", reason_hint(reason).dimmed()));
    }
    line
}

fn reason_hint(reason: Reason) -> String {
    match reason {
        Reason::ToolUnavailable => "not installed".to_string(),
        Reason::UserSkip => "skipped by operator".to_string(),
        Reason::UserQuit => "quit".to_string(),
        other => other.to_string(),
    }
}

/// Prints run events until the sender side is dropped.
pub fn spawn_event_printer(mut events: UnboundedReceiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RunEvent::PhaseStarted { phase, jobs } => {
                    println!(
                        "\n{} {} ({} jobs)",
                        "▶".color(Color::Cyan),
                        phase.label().color(Color::Cyan).bold(),
                        jobs
                    );
                }
                RunEvent::JobStarted { tool, command, .. } => {
                    println!("  {} {}", "→".color(Color::Blue), tool.bold());
                    println!("    {}", command.dimmed());
                }
                RunEvent::JobFinished(event) => println!("{}", finished_line(&event)),
            }
        }
    })
}

pub fn summary_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Phase").add_attribute(Attribute::Bold),
        Cell::new("Tool").add_attribute(Attribute::Bold),
        Cell::new("State").add_attribute(Attribute::Bold),
        Cell::new("Reason").add_attribute(Attribute::Bold),
        Cell::new("Duration").add_attribute(Attribute::Bold),
    ]);

    for job in &report.jobs {
        let mut state = job.state.as_str().to_string();
        if job.has_reduced_confidence() {
            state.push_str(" ⚠");
        }
        let state_cell = match job.state {
            JobState::Success => Cell::new(state).fg(comfy_table::Color::Green),
            JobState::Skipped => Cell::new(state).fg(comfy_table::Color::Yellow),
            _ => Cell::new(state).fg(comfy_table::Color::Red),
        };
        table.add_row(vec![
            Cell::new(job.id.phase.label()),
            Cell::new(&job.tool),
            state_cell,
            Cell::new(job.reason.map(|r| r.as_str()).unwrap_or("")),
            Cell::new(
                job.output
                    .as_ref()
                    .map(|o| format_duration(o.duration))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    table
}

pub fn print_summary(report: &RunReport, dirs: &RunDirs) {
    println!("\n{}", RULE.color(Color::Green).bold());
    let title = if report.interrupted {
        "ipsnipe Run Interrupted".color(Color::Red).bold()
    } else if report.quit {
        "ipsnipe Run Stopped".color(Color::Yellow).bold()
    } else {
        "ipsnipe Run Complete".color(Color::Green).bold()
    };
    println!("{}", title);
    println!("{}", RULE.color(Color::Green).bold());

    println!("{}", summary_table(report));

    let ctx = &report.context;
    println!("\n{}", "Results:".color(Color::Yellow).bold());
    println!(
        "  Open Ports: {}",
        ctx.open_ports.len().to_string().color(Color::Green).bold()
    );
    for endpoint in &ctx.web_endpoints {
        println!("  • {}", endpoint.url().color(Color::Cyan));
    }
    if !ctx.hostnames.is_empty() {
        let names: Vec<&str> = ctx.hostnames.iter().map(String::as_str).collect();
        println!("  Hostnames: {}", names.join(", "));
    }
    println!("  Duration: {}", format_duration(report.duration));

    println!(
        "\n{}",
        format!("Reports written to {}", dirs.report.display()).dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::TargetContext;
    use crate::core::job::Job;
    use crate::core::models::Phase;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_finished_line_mentions_reason() {
        colored::control::set_override(false);
        let event = JobEvent {
            tool: "nikto".into(),
            phase: Phase::WebAnalysis,
            state: JobState::Skipped,
            duration: Duration::from_secs(2),
            reason: Some(Reason::UserSkip),
        };
        assert_eq!(finished_line(&event), "  skipped nikto (2.0s) skipped by operator");
    }

    #[test]
    fn test_summary_table_has_row_per_job() {
        let mut quit = Job::new("arjun", Phase::WebAnalysis, 4);
        quit.finish(JobState::Skipped, Some(Reason::UserQuit)).unwrap();
        let report = RunReport {
            run_id: "r".into(),
            target: "10.0.0.1".into(),
            started_at: Utc::now(),
            duration: Duration::from_secs(1),
            context: TargetContext::new("10.0.0.1"),
            jobs: vec![Job::new("whatweb", Phase::WebAnalysis, 0), quit],
            quit: true,
            interrupted: false,
        };
        let rendered = summary_table(&report).to_string();
        assert!(rendered.contains("whatweb"));
        assert!(rendered.contains("user-quit"));
        assert_eq!(summary_table(&report).row_count(), 2);
    }
}
