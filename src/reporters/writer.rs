use crate::core::job::{Annotation, Job, JobState};
use crate::core::models::RunDirs;
use crate::core::orchestrator::RunReport;
use crate::utils::fs::{atomic_write, strip_ansi};
use crate::utils::time::format_duration;
use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use std::path::PathBuf;

const SUMMARY_TEMPLATE: &str = include_str!("../../report_templates/summary.md.j2");

#[derive(Serialize)]
struct JobRow {
    phase: &'static str,
    tool: String,
    state: &'static str,
    reason: Option<&'static str>,
    duration: String,
    notes: Vec<String>,
    reduced: bool,
}

#[derive(Serialize)]
struct TechRow {
    name: String,
    confidence: String,
}

fn describe(annotation: &Annotation) -> String {
    match annotation {
        Annotation::ParseError { message } => format!("parse error: {message}"),
        Annotation::DegradedWordlistFallback { category } => {
            format!("built-in {category} wordlist")
        }
        Annotation::Note { message } => message.clone(),
    }
}

fn job_row(job: &Job) -> JobRow {
    JobRow {
        phase: job.id.phase.label(),
        tool: job.tool.clone(),
        state: job.state.as_str(),
        reason: job.reason.map(|r| r.as_str()),
        duration: job
            .output
            .as_ref()
            .map(|o| format_duration(o.duration))
            .unwrap_or_else(|| "-".to_string()),
        notes: job.annotations.iter().map(describe).collect(),
        reduced: job.has_reduced_confidence(),
    }
}

pub fn write_all(report: &RunReport, dirs: &RunDirs) -> Result<Vec<PathBuf>> {
    let json = write_json_summary(report, dirs)?;
    let markdown = write_markdown_summary(report, dirs)?;
    Ok(vec![json, markdown])
}

pub fn render_markdown(report: &RunReport, dirs: &RunDirs) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("summary.md", SUMMARY_TEMPLATE)?;
    let template = env.get_template("summary.md")?;

    let jobs: Vec<JobRow> = report.jobs.iter().map(job_row).collect();
    let ctx = &report.context;
    let technologies: Vec<TechRow> = ctx
        .confident_technologies(0.0)
        .into_iter()
        .map(|(name, c)| TechRow {
            name: name.to_string(),
            confidence: format!("{:.2}", c),
        })
        .collect();

    let rendered = template.render(context! {
        target => &report.target,
        run_id => &report.run_id,
        scan_date => report.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        duration => format_duration(report.duration),
        succeeded => report.count(JobState::Success),
        skipped => report.count(JobState::Skipped),
        failed => report.count(JobState::Failed) + report.count(JobState::TimedOut),
        quit => report.quit,
        interrupted => report.interrupted,
        reduced => jobs.iter().any(|j| j.reduced),
        jobs => jobs,
        ports => ctx.open_ports.iter().map(|(p, proto)| format!("{p}/{proto}")).collect::<Vec<_>>(),
        endpoints => ctx.web_endpoints.iter().map(|e| e.url()).collect::<Vec<_>>(),
        hostnames => &ctx.hostnames,
        technologies => technologies,
        scans_dir => dirs.scans.display().to_string(),
        version => env!("CARGO_PKG_VERSION"),
    })?;
    Ok(rendered)
}

fn write_markdown_summary(report: &RunReport, dirs: &RunDirs) -> Result<PathBuf> {
    let rendered = render_markdown(report, dirs).context("Failed to render summary")?;
    let path = dirs.report.join("SUMMARY.md");
    atomic_write(&path, rendered.as_bytes())?;
    Ok(path)
}

fn write_json_summary(report: &RunReport, dirs: &RunDirs) -> Result<PathBuf> {
    let path = dirs.report.join("summary.json");
    let json = serde_json::to_string_pretty(report)?;
    atomic_write(&path, json.as_bytes())?;
    Ok(path)
}

/// Raw tool output under `scans/<tool>.txt`, colour codes removed. Jobs
/// that never ran get only the header.
pub fn write_job_output(dirs: &RunDirs, job: &Job) -> Result<()> {
    let mut content = String::new();
    content.push_str(&format!("# tool: {}\n", job.tool));
    content.push_str(&format!("# phase: {}\n", job.id.phase));
    if let Some(command) = &job.command {
        content.push_str(&format!("# command: {}\n", command.display()));
    }
    content.push_str(&format!("# state: {}", job.state.as_str()));
    if let Some(reason) = job.reason {
        content.push_str(&format!(" ({reason})"));
    }
    content.push('\n');
    for annotation in &job.annotations {
        content.push_str(&format!("# note: {}\n", describe(annotation)));
    }

    if let Some(output) = &job.output {
        content.push_str(&format!("# duration: {}\n", format_duration(output.duration)));
        if let Some(code) = output.exit_code {
            content.push_str(&format!("# exit code: {code}\n"));
        }
        content.push('\n');
        content.push_str(&strip_ansi(&output.stdout_text()));
        if !output.stderr.is_empty() {
            content.push_str("\n# stderr\n");
            content.push_str(&strip_ansi(&output.stderr_text()));
        }
    }

    let path = dirs.scans.join(format!("{}.txt", job.tool));
    atomic_write(&path, content.as_bytes())
        .with_context(|| format!("Failed to write {:?}", path))
}
