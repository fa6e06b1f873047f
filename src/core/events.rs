use super::job::{JobState, Reason};
use super::models::Phase;
use serde::Serialize;
use std::time::Duration;

/// Emitted after every terminal transition.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub tool: String,
    pub phase: Phase,
    pub state: JobState,
    pub duration: Duration,
    pub reason: Option<Reason>,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    PhaseStarted { phase: Phase, jobs: usize },
    JobStarted { tool: String, phase: Phase, command: String },
    JobFinished(JobEvent),
}

/// Typed cancellation messages posted by the controller and the interrupt
/// watcher; the phase runner is the only consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Skip { job: super::job::JobId },
    Quit,
    Interrupt,
}
