use crate::core::errors::IpsnipeError;
use crate::core::events::ControlSignal;
use crate::core::job::{CommandSpec, JobId, JobOutput};
use crate::utils::fs::atomic_write;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// How long to keep reading pipes after the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Exited { code: Option<i32> },
    TimedOut,
    Cancelled(ControlSignal),
    Unavailable { missing: String },
    SpawnFailed(String),
}

#[derive(Debug)]
pub struct ExecResult {
    pub outcome: ExecOutcome,
    pub output: JobOutput,
}

/// Runs `spec` to completion, racing its exit against the timeout and the
/// control channel. A `Skip` naming another job is dropped.
pub async fn execute(
    spec: &CommandSpec,
    job: JobId,
    grace: Duration,
    control: &mut UnboundedReceiver<ControlSignal>,
) -> ExecResult {
    let start = Instant::now();
    let result = |outcome: ExecOutcome, output: JobOutput| ExecResult { outcome, output };

    for binary in &spec.requires {
        if which::which(binary).is_err() {
            tracing::warn!("{} not found on PATH", binary);
            return result(
                ExecOutcome::Unavailable {
                    missing: binary.clone(),
                },
                JobOutput::default(),
            );
        }
    }

    for artifact in &spec.artifacts {
        if let Err(e) = atomic_write(&artifact.path, artifact.contents.as_bytes()) {
            return result(ExecOutcome::SpawnFailed(format!("{:#}", e)), JobOutput::default());
        }
    }

    tracing::debug!("Executing: {} {:?} (timeout {:?})", spec.program, spec.args, spec.timeout);

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let err = IpsnipeError::Spawn {
                program: spec.program.clone(),
                source,
            };
            tracing::warn!("{}", err);
            return result(ExecOutcome::SpawnFailed(err.to_string()), JobOutput::default());
        }
    };

    let (stdout_buf, stdout_task) = drain(child.stdout.take());
    let (stderr_buf, stderr_task) = drain(child.stderr.take());

    let deadline = tokio::time::sleep(spec.timeout);
    tokio::pin!(deadline);
    let mut control_open = true;

    let outcome = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => ExecOutcome::Exited { code: status.code() },
                    Err(e) => ExecOutcome::SpawnFailed(e.to_string()),
                };
            }
            _ = &mut deadline => {
                tracing::info!("{} exceeded {:?}, terminating", spec.program, spec.timeout);
                terminate(&mut child, grace).await;
                break ExecOutcome::TimedOut;
            }
            signal = control.recv(), if control_open => match signal {
                Some(ControlSignal::Skip { job: target }) if target != job => {
                    tracing::debug!("Ignoring skip for {} while running {}", target, job);
                }
                Some(signal @ (ControlSignal::Skip { .. } | ControlSignal::Quit)) => {
                    terminate(&mut child, grace).await;
                    break ExecOutcome::Cancelled(signal);
                }
                Some(ControlSignal::Interrupt) => {
                    kill_now(&mut child).await;
                    break ExecOutcome::Cancelled(ControlSignal::Interrupt);
                }
                None => control_open = false,
            },
        }
    };

    let exit_code = match &outcome {
        ExecOutcome::Exited { code } => *code,
        _ => None,
    };
    let output = JobOutput {
        stdout: collect(stdout_buf, stdout_task).await,
        stderr: collect(stderr_buf, stderr_task).await,
        exit_code,
        duration: start.elapsed(),
    };
    tracing::debug!("{} finished: {:?} in {:?}", spec.program, outcome, output.duration);
    result(outcome, output)
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn drain<R>(reader: Option<R>) -> (SharedBuf, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf: SharedBuf = Arc::default();
    let task = reader.map(|mut reader| {
        let buf = Arc::clone(&buf);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut b) = buf.lock() {
                            b.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        })
    });
    (buf, task)
}

/// Whatever was read so far; a pipe held open by an escaped grandchild
/// does not block the run.
async fn collect(buf: SharedBuf, task: Option<JoinHandle<()>>) -> Vec<u8> {
    if let Some(task) = task {
        let abort = task.abort_handle();
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            abort.abort();
        }
    }
    let bytes = match buf.lock() {
        Ok(mut b) => std::mem::take(&mut *b),
        Err(_) => Vec::new(),
    };
    bytes
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // the child leads its own group, so -pid reaches every descendant
    unsafe {
        libc::kill(-(pid as libc::pid_t), signal);
    }
}

/// SIGTERM to the process group, SIGKILL once `grace` has elapsed.
#[cfg(unix)]
async fn terminate(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        let _ = child.wait().await;
        return;
    };
    signal_group(pid, libc::SIGTERM);
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    tracing::debug!("pid {} survived SIGTERM, sending SIGKILL", pid);
    signal_group(pid, libc::SIGKILL);
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _grace: Duration) {
    let _ = child.kill().await;
}

#[cfg(unix)]
async fn kill_now(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGKILL);
    }
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn kill_now(child: &mut Child) {
    let _ = child.kill().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::job::Artifact;
    use crate::core::models::Phase;
    use tokio::sync::mpsc;

    const JOB: JobId = JobId {
        phase: Phase::NetworkDiscovery,
        ordinal: 0,
    };

    fn sh(script: &str, timeout: Duration) -> CommandSpec {
        CommandSpec::new("sh", timeout).args(["-c", script])
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let res = execute(
            &sh("echo out; echo err >&2; exit 3", Duration::from_secs(5)),
            JOB,
            Duration::from_millis(100),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::Exited { code: Some(3) });
        assert_eq!(res.output.stdout_text(), "out\n");
        assert_eq!(res.output.stderr_text(), "err\n");
        assert_eq!(res.output.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let spec = CommandSpec::new("definitely-not-a-real-tool-ipsnipe", Duration::from_secs(1));
        let res = execute(&spec, JOB, Duration::from_millis(100), &mut rx).await;
        assert!(matches!(res.outcome, ExecOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_exec_failure_is_spawn_failed() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("broken-tool");
        std::fs::write(&script, "#!/nonexistent/ipsnipe-interpreter\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let spec = CommandSpec::new(script.display().to_string(), Duration::from_secs(1));
        let res = execute(&spec, JOB, Duration::from_millis(100), &mut rx).await;
        match res.outcome {
            ExecOutcome::SpawnFailed(message) => assert!(message.starts_with("failed to spawn")),
            other => panic!("expected spawn failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_bounded_by_grace() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let res = execute(
            &sh("sleep 30", Duration::from_millis(200)),
            JOB,
            Duration::from_millis(300),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_term_ignoring_process_is_killed() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let res = execute(
            &sh("trap '' TERM; sleep 30", Duration::from_millis(200)),
            JOB,
            Duration::from_millis(300),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_skip_for_current_job_terminates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ControlSignal::Skip { job: JOB }).unwrap();
        let res = execute(
            &sh("sleep 30", Duration::from_secs(30)),
            JOB,
            Duration::from_millis(200),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::Cancelled(ControlSignal::Skip { job: JOB }));
    }

    #[tokio::test]
    async fn test_skip_for_other_job_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let other = JobId {
            phase: Phase::WebAnalysis,
            ordinal: 4,
        };
        tx.send(ControlSignal::Skip { job: other }).unwrap();
        let res = execute(
            &sh("sleep 0.2; echo done", Duration::from_secs(10)),
            JOB,
            Duration::from_millis(200),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::Exited { code: Some(0) });
        assert_eq!(res.output.stdout_text(), "done\n");
    }

    #[tokio::test]
    async fn test_interrupt_kills_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ControlSignal::Interrupt).unwrap();
        let start = Instant::now();
        let res = execute(
            &sh("trap '' TERM; sleep 30", Duration::from_secs(30)),
            JOB,
            Duration::from_secs(10),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::Cancelled(ControlSignal::Interrupt));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_artifacts_are_written_before_spawn() {
        let dir = tempfile::TempDir::new().unwrap();
        let list = dir.path().join("wordlists/directory-builtin.txt");
        let mut spec = sh(&format!("wc -l < {}", list.display()), Duration::from_secs(5));
        spec.artifacts.push(Artifact {
            path: list.clone(),
            contents: "admin\nlogin\n".into(),
        });

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let res = execute(&spec, JOB, Duration::from_millis(100), &mut rx).await;
        assert_eq!(res.outcome, ExecOutcome::Exited { code: Some(0) });
        assert_eq!(res.output.stdout_text().trim(), "2");
    }

    #[tokio::test]
    async fn test_closed_control_channel_still_waits_for_exit() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ControlSignal>();
        drop(tx);
        let res = execute(
            &sh("sleep 0.1; exit 0", Duration::from_secs(5)),
            JOB,
            Duration::from_millis(100),
            &mut rx,
        )
        .await;
        assert_eq!(res.outcome, ExecOutcome::Exited { code: Some(0) });
    }
}
