use super::events::ControlSignal;
use super::job::JobId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc::UnboundedSender, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Skip,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "s" | "skip" => Some(Command::Skip),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Turns operator lines into [`ControlSignal`]s for the job currently running.
pub struct Controller<R> {
    input: R,
    current: watch::Receiver<Option<JobId>>,
    signals: UnboundedSender<ControlSignal>,
}

impl<R> Controller<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        input: R,
        current: watch::Receiver<Option<JobId>>,
        signals: UnboundedSender<ControlSignal>,
    ) -> Self {
        Self {
            input,
            current,
            signals,
        }
    }

    /// Reads until EOF or until the run drops its receiver.
    pub async fn run(self) {
        let mut lines = self.input.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Controller input closed: {}", e);
                    break;
                }
            };

            let signal = match parse_command(&line) {
                Some(Command::Skip) => {
                    let current = *self.current.borrow();
                    match current {
                        Some(job) => ControlSignal::Skip { job },
                        None => {
                            tracing::debug!("Skip requested with no job running");
                            continue;
                        }
                    }
                }
                Some(Command::Quit) => ControlSignal::Quit,
                None => continue,
            };

            tracing::info!("Operator requested {:?}", signal);
            if self.signals.send(signal).is_err() {
                break;
            }
        }
    }
}

/// Listens on the process stdin for the lifetime of the run.
pub fn spawn_stdin_controller(
    current: watch::Receiver<Option<JobId>>,
    signals: UnboundedSender<ControlSignal>,
) -> JoinHandle<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::spawn(Controller::new(stdin, current, signals).run())
}

/// Ctrl-C goes straight to the runner as `Interrupt`.
pub fn spawn_interrupt_watcher(signals: UnboundedSender<ControlSignal>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, killing the running job");
            let _ = signals.send(ControlSignal::Interrupt);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Phase;
    use rstest::rstest;
    use tokio::sync::mpsc;

    #[rstest]
    #[case("s", Some(Command::Skip))]
    #[case(" SKIP ", Some(Command::Skip))]
    #[case("q", Some(Command::Quit))]
    #[case("exit", Some(Command::Quit))]
    #[case("quit\r", Some(Command::Quit))]
    #[case("", None)]
    #[case("sk", None)]
    fn test_parse_command(#[case] line: &str, #[case] expected: Option<Command>) {
        assert_eq!(parse_command(line), expected);
    }

    #[tokio::test]
    async fn test_lines_become_signals_for_current_job() {
        let job = JobId {
            phase: Phase::WebAnalysis,
            ordinal: 1,
        };
        let (_current_tx, current_rx) = watch::channel(Some(job));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let input: &[u8] = b"s\nhello\nq\n";
        Controller::new(input, current_rx, tx).run().await;

        assert_eq!(rx.recv().await, Some(ControlSignal::Skip { job }));
        assert_eq!(rx.recv().await, Some(ControlSignal::Quit));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_skip_without_running_job_is_dropped() {
        let (_current_tx, current_rx) = watch::channel(None);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let input: &[u8] = b"skip\n";
        Controller::new(input, current_rx, tx).run().await;

        assert_eq!(rx.recv().await, None);
    }
}
