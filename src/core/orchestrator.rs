use super::context::TargetContext;
use super::events::ControlSignal;
use super::job::{Job, JobState, Reason};
use super::models::Phase;
use super::phase::{PlannedJob, RunEnv, RunFlags, run_phase};
use crate::config::Config;
use crate::plugins::types::JobBuilder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

/// Everything the report writer needs once the run is over.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub context: TargetContext,
    pub jobs: Vec<Job>,
    pub quit: bool,
    pub interrupted: bool,
}

impl RunReport {
    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }
}

pub struct Orchestrator {
    env: RunEnv,
    phases: Vec<(Phase, Vec<PlannedJob>)>,
    control: UnboundedReceiver<ControlSignal>,
}

/// Orders `builders` into phases, dropping disabled tools and unselected phases.
pub fn plan(builders: &[Arc<dyn JobBuilder>], config: &Config, phases: &[Phase]) -> Vec<(Phase, Vec<PlannedJob>)> {
    Phase::ALL
        .into_iter()
        .filter(|phase| phases.contains(phase))
        .map(|phase| {
            let jobs = builders
                .iter()
                .filter(|b| b.phase() == phase)
                .filter(|b| {
                    let enabled = config.is_enabled(b.name());
                    if !enabled {
                        tracing::info!("{} disabled in configuration", b.name());
                    }
                    enabled
                })
                .enumerate()
                .map(|(ordinal, builder)| PlannedJob {
                    job: Job::new(builder.name(), phase, ordinal),
                    builder: Arc::clone(builder),
                })
                .collect();
            (phase, jobs)
        })
        .collect()
}

impl Orchestrator {
    pub fn new(
        env: RunEnv,
        phases: Vec<(Phase, Vec<PlannedJob>)>,
        control: UnboundedReceiver<ControlSignal>,
    ) -> Self {
        Self {
            env,
            phases,
            control,
        }
    }

    pub async fn run(mut self, run_id: &str) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut flags = RunFlags::default();

        for (phase, jobs) in self.phases.iter_mut() {
            if flags.cancel_all {
                break;
            }
            run_phase(&self.env, *phase, jobs, &mut self.control, &mut flags).await;
        }

        let mut jobs = Vec::new();
        for (_, planned) in self.phases {
            for PlannedJob { mut job, .. } in planned {
                if !job.is_terminal() {
                    let (state, reason) = if flags.interrupted {
                        (JobState::Failed, Reason::Interrupted)
                    } else {
                        (JobState::Skipped, Reason::UserQuit)
                    };
                    if let Err(e) = job.finish(state, Some(reason)) {
                        tracing::error!("{}", e);
                    }
                }
                jobs.push(job);
            }
        }

        let context = self.env.context.lock().await.clone();
        RunReport {
            run_id: run_id.to_string(),
            target: context.target.clone(),
            started_at,
            duration: start.elapsed(),
            context,
            jobs,
            quit: flags.cancel_all && !flags.interrupted,
            interrupted: flags.interrupted,
        }
    }
}
