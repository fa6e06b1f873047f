use super::errors::IpsnipeError;
use super::models::Phase;
use crate::wordlists::Category;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub phase: Phase,
    pub ordinal: usize,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.phase, self.ordinal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Success => "success",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
            JobState::TimedOut => "timed-out",
        }
    }
}

/// Why a job ended somewhere other than `Success`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    ToolUnavailable,
    UserSkip,
    UserQuit,
    Timeout,
    NonzeroExit,
    Interrupted,
    PreconditionNotMet,
    SpawnError,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ToolUnavailable => "tool-unavailable",
            Reason::UserSkip => "user-skip",
            Reason::UserQuit => "user-quit",
            Reason::Timeout => "timeout",
            Reason::NonzeroExit => "nonzero-exit",
            Reason::Interrupted => "interrupted",
            Reason::PreconditionNotMet => "precondition-not-met",
            Reason::SpawnError => "spawn-error",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduced-confidence flags attached to a job without changing its state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Annotation {
    ParseError { message: String },
    DegradedWordlistFallback { category: Category },
    Note { message: String },
}

/// A file the executor writes before spawning (synthesized wordlists).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    #[serde(skip)]
    pub contents: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Binaries that must be on PATH; defaults to `program`.
    pub requires: Vec<String>,
    pub success_codes: Vec<i32>,
    pub artifacts: Vec<Artifact>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        let program = program.into();
        Self {
            requires: vec![program.clone()],
            program,
            args: Vec::new(),
            cwd: None,
            timeout,
            success_codes: vec![0],
            artifacts: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the command through `sudo`, still requiring the wrapped tool.
    pub fn elevated(mut self) -> Self {
        let tool = std::mem::replace(&mut self.program, "sudo".to_string());
        self.args.insert(0, tool.clone());
        self.requires = vec!["sudo".to_string(), tool];
        self
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    #[serde(skip)]
    pub stdout: Vec<u8>,
    #[serde(skip)]
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl JobOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Both streams, stdout first. Parsers match against this.
    pub fn combined_text(&self) -> String {
        let mut text = self.stdout_text();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr_text());
        }
        text
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tool: String,
    pub state: JobState,
    pub reason: Option<Reason>,
    pub command: Option<CommandSpec>,
    pub output: Option<JobOutput>,
    pub annotations: Vec<Annotation>,
}

impl Job {
    pub fn new(tool: impl Into<String>, phase: Phase, ordinal: usize) -> Self {
        Self {
            id: JobId { phase, ordinal },
            tool: tool.into(),
            state: JobState::Pending,
            reason: None,
            command: None,
            output: None,
            annotations: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `Pending -> Running`.
    pub fn dispatch(&mut self, command: CommandSpec) -> Result<(), IpsnipeError> {
        self.check(JobState::Running)?;
        self.state = JobState::Running;
        self.command = Some(command);
        Ok(())
    }

    /// Moves the job to a terminal state. Terminal states are never left.
    pub fn finish(&mut self, state: JobState, reason: Option<Reason>) -> Result<(), IpsnipeError> {
        self.check(state)?;
        self.state = state;
        self.reason = reason;
        Ok(())
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub fn has_reduced_confidence(&self) -> bool {
        self.annotations.iter().any(|a| {
            matches!(
                a,
                Annotation::ParseError { .. } | Annotation::DegradedWordlistFallback { .. }
            )
        })
    }

    fn check(&self, to: JobState) -> Result<(), IpsnipeError> {
        let legal = match (self.state, to) {
            (JobState::Pending, JobState::Running) => true,
            // never spawned: precondition, quit, missing binary, interrupt
            (JobState::Pending, JobState::Skipped | JobState::Failed) => true,
            (JobState::Running, next) => next.is_terminal(),
            _ => false,
        };
        if legal {
            Ok(())
        } else {
            Err(IpsnipeError::Transition {
                tool: self.tool.clone(),
                from: self.state,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec() -> CommandSpec {
        CommandSpec::new("true", Duration::from_secs(1))
    }

    #[test]
    fn test_running_to_terminal() {
        let mut job = Job::new("nmap_quick", Phase::NetworkDiscovery, 0);
        job.dispatch(spec()).unwrap();
        assert_eq!(job.state, JobState::Running);
        job.finish(JobState::Success, None).unwrap();
        assert!(job.is_terminal());
    }

    #[rstest]
    #[case(JobState::Success)]
    #[case(JobState::Failed)]
    #[case(JobState::Skipped)]
    #[case(JobState::TimedOut)]
    fn test_terminal_states_are_immutable(#[case] terminal: JobState) {
        let mut job = Job::new("whatweb", Phase::WebAnalysis, 0);
        job.dispatch(spec()).unwrap();
        job.finish(terminal, Some(Reason::Timeout)).unwrap();

        for next in [
            JobState::Pending,
            JobState::Running,
            JobState::Success,
            JobState::Failed,
            JobState::Skipped,
            JobState::TimedOut,
        ] {
            assert!(job.finish(next, Some(Reason::UserQuit)).is_err());
        }
        assert!(job.dispatch(spec()).is_err());
        assert_eq!(job.state, terminal);
        assert_eq!(job.reason, Some(Reason::Timeout));
    }

    #[test]
    fn test_pending_can_skip_without_running() {
        let mut job = Job::new("ffuf_vhost", Phase::WebAnalysis, 2);
        job.finish(JobState::Skipped, Some(Reason::PreconditionNotMet)).unwrap();
        assert!(job.command.is_none());
    }

    #[test]
    fn test_pending_cannot_succeed_or_time_out() {
        let mut job = Job::new("nikto", Phase::WebAnalysis, 3);
        assert!(job.finish(JobState::Success, None).is_err());
        assert!(job.finish(JobState::TimedOut, Some(Reason::Timeout)).is_err());
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn test_elevated_command_requires_both() {
        let cmd = CommandSpec::new("nmap", Duration::from_secs(5)).arg("-sU").elevated();
        assert_eq!(cmd.program, "sudo");
        assert_eq!(cmd.args, vec!["nmap", "-sU"]);
        assert_eq!(cmd.requires, vec!["sudo", "nmap"]);
    }
}
