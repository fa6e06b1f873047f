use super::context::{ContextUpdate, TargetContext};
use super::events::{ControlSignal, JobEvent, RunEvent};
use super::job::{Annotation, Job, JobId, JobState, Reason};
use super::models::{Phase, RunDirs};
use crate::config::Config;
use crate::executors::command::{self, ExecOutcome};
use crate::executors::toolchain;
use crate::plugins::probe::{self, WebProber};
use crate::plugins::types::{BuildDecision, BuildInput, JobBuilder};
use crate::reporters::writer;
use crate::wordlists::Catalog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, watch};

/// Shared, read-mostly state for one run.
pub struct RunEnv {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub prober: Arc<dyn WebProber>,
    pub dirs: RunDirs,
    pub context: Arc<Mutex<TargetContext>>,
    pub events: UnboundedSender<RunEvent>,
    pub current: watch::Sender<Option<JobId>>,
}

pub struct PlannedJob {
    pub job: Job,
    pub builder: Arc<dyn JobBuilder>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunFlags {
    pub cancel_all: bool,
    pub interrupted: bool,
}

impl RunFlags {
    fn apply(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::Skip { job } => tracing::debug!("Discarding stale skip for {}", job),
            ControlSignal::Quit => self.cancel_all = true,
            ControlSignal::Interrupt => {
                self.cancel_all = true;
                self.interrupted = true;
            }
        }
    }
}

/// Consumes queued signals. Returns true when one of them skips `current`;
/// skips for any other job are stale and dropped.
fn drain_pending(
    control: &mut UnboundedReceiver<ControlSignal>,
    flags: &mut RunFlags,
    current: Option<JobId>,
) -> bool {
    let mut skipped = false;
    loop {
        match control.try_recv() {
            Ok(ControlSignal::Skip { job }) if Some(job) == current => skipped = true,
            Ok(signal) => flags.apply(signal),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    skipped
}

fn settle(job: &mut Job, state: JobState, reason: Option<Reason>) {
    if let Err(e) = job.finish(state, reason) {
        tracing::error!("{}", e);
    }
}

/// Runs `jobs` strictly one after another. Stops at the first job found
/// while `cancel_all` is set; those jobs stay Pending for the caller.
pub async fn run_phase(
    env: &RunEnv,
    phase: Phase,
    jobs: &mut [PlannedJob],
    control: &mut UnboundedReceiver<ControlSignal>,
    flags: &mut RunFlags,
) {
    let _ = env.events.send(RunEvent::PhaseStarted {
        phase,
        jobs: jobs.len(),
    });
    tracing::info!("Starting {} ({} jobs)", phase, jobs.len());

    for (index, planned) in jobs.iter_mut().enumerate() {
        drain_pending(control, flags, None);
        if flags.cancel_all {
            break;
        }
        run_job(env, planned, index == 0, control, flags).await;
    }
}

async fn run_job(
    env: &RunEnv,
    planned: &mut PlannedJob,
    first_in_phase: bool,
    control: &mut UnboundedReceiver<ControlSignal>,
    flags: &mut RunFlags,
) {
    let input = BuildInput {
        config: Arc::clone(&env.config),
        context: env.context.lock().await.clone(),
        catalog: Arc::clone(&env.catalog),
        prober: Arc::clone(&env.prober),
        dirs: env.dirs.clone(),
        first_in_phase,
    };
    let builder = Arc::clone(&planned.builder);
    // published during the build so a slow fallback probe can be skipped
    let _ = env.current.send(Some(planned.job.id));
    let decision = tokio::task::spawn_blocking(move || builder.build(&input)).await;
    let _ = env.current.send(None);

    let job = &mut planned.job;
    let (command, discovered, annotations) = match decision {
        Ok(BuildDecision::Run {
            command,
            discovered,
            annotations,
        }) => (command, discovered, annotations),
        Ok(BuildDecision::Skip(reason)) => {
            tracing::info!("Skipping {}: {}", job.tool, reason);
            job.annotate(Annotation::Note { message: reason });
            settle(job, JobState::Skipped, Some(Reason::PreconditionNotMet));
            finish_job(env, job);
            return;
        }
        Err(e) => {
            tracing::error!("Builder for {} failed: {}", job.tool, e);
            job.annotate(Annotation::Note {
                message: format!("builder failed: {e}"),
            });
            settle(job, JobState::Failed, Some(Reason::SpawnError));
            finish_job(env, job);
            return;
        }
    };

    if let Some(update) = discovered {
        merge_and_promote(env, update).await;
    }

    // signals posted while the builder ran are honoured before anything spawns
    let skipped = drain_pending(control, flags, Some(job.id));
    if flags.cancel_all {
        // left Pending; the orchestrator settles it with the quit or interrupt reason
        return;
    }
    if skipped {
        tracing::info!("{} skipped by operator before dispatch", job.tool);
        settle(job, JobState::Skipped, Some(Reason::UserSkip));
        finish_job(env, job);
        return;
    }
    for annotation in annotations {
        job.annotate(annotation);
    }

    let missing = toolchain::missing_tools(command.requires.iter().map(String::as_str));
    if let Some(binary) = missing.first() {
        tracing::warn!("{} not found on PATH, {} not started", binary, job.tool);
        job.annotate(Annotation::Note {
            message: format!("{binary} not found on PATH"),
        });
        settle(job, JobState::Failed, Some(Reason::ToolUnavailable));
        finish_job(env, job);
        return;
    }

    let display = command.display();
    if let Err(e) = job.dispatch(command.clone()) {
        tracing::error!("{}", e);
        return;
    }
    let _ = env.current.send(Some(job.id));
    let _ = env.events.send(RunEvent::JobStarted {
        tool: job.tool.clone(),
        phase: job.id.phase,
        command: display,
    });

    let exec = command::execute(&command, job.id, env.config.grace_period(), control).await;
    let _ = env.current.send(None);

    let (state, reason) = match &exec.outcome {
        ExecOutcome::Exited { code: Some(code) } if command.success_codes.contains(code) => {
            (JobState::Success, None)
        }
        ExecOutcome::Exited { .. } => (JobState::Failed, Some(Reason::NonzeroExit)),
        ExecOutcome::TimedOut => (JobState::TimedOut, Some(Reason::Timeout)),
        ExecOutcome::Cancelled(ControlSignal::Skip { .. }) => (JobState::Skipped, Some(Reason::UserSkip)),
        ExecOutcome::Cancelled(ControlSignal::Quit) => {
            flags.cancel_all = true;
            (JobState::Skipped, Some(Reason::UserQuit))
        }
        ExecOutcome::Cancelled(ControlSignal::Interrupt) => {
            flags.cancel_all = true;
            flags.interrupted = true;
            (JobState::Failed, Some(Reason::Interrupted))
        }
        ExecOutcome::Unavailable { missing } => {
            job.annotate(Annotation::Note {
                message: format!("{missing} not found on PATH"),
            });
            (JobState::Failed, Some(Reason::ToolUnavailable))
        }
        ExecOutcome::SpawnFailed(message) => {
            job.annotate(Annotation::Note {
                message: message.clone(),
            });
            (JobState::Failed, Some(Reason::SpawnError))
        }
    };
    settle(job, state, reason);

    if state == JobState::Success {
        let snapshot = env.context.lock().await.clone();
        match planned.builder.parse(&exec.output, &snapshot) {
            Ok(update) => merge_and_promote(env, update).await,
            Err(e) => {
                tracing::warn!("{}", e);
                job.annotate(Annotation::ParseError {
                    message: e.to_string(),
                });
            }
        }
    }
    job.output = Some(exec.output);
    finish_job(env, job);
}

/// Merges `update`; newly opened ports are probed for web services and
/// the result merged as well.
async fn merge_and_promote(env: &RunEnv, update: ContextUpdate) {
    let snapshot = {
        let mut ctx = env.context.lock().await;
        let ports_before = ctx.open_ports.len();
        ctx.merge(update);
        if ctx.open_ports.len() == ports_before {
            return;
        }
        ctx.clone()
    };

    let probe_config = env.config.probe.clone();
    let prober = Arc::clone(&env.prober);
    let promoted = tokio::task::spawn_blocking(move || {
        probe::promote_web_ports(&snapshot, &probe_config, prober.as_ref())
    })
    .await;
    match promoted {
        Ok(update) if !update.is_empty() => {
            tracing::info!("Promoted {} web endpoints", update.web_endpoints.len());
            env.context.lock().await.merge(update);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Web port probe failed: {}", e),
    }
}

fn finish_job(env: &RunEnv, job: &Job) {
    if let Err(e) = writer::write_job_output(&env.dirs, job) {
        tracing::warn!("Failed to write output for {}: {:#}", job.tool, e);
    }
    let duration = job
        .output
        .as_ref()
        .map(|o| o.duration)
        .unwrap_or(Duration::ZERO);
    tracing::info!(
        "{} finished: {}{}",
        job.tool,
        job.state.as_str(),
        job.reason.map(|r| format!(" ({r})")).unwrap_or_default()
    );
    let _ = env.events.send(RunEvent::JobFinished(JobEvent {
        tool: job.tool.clone(),
        phase: job.id.phase,
        state: job.state,
        duration,
        reason: job.reason,
    }));
}
