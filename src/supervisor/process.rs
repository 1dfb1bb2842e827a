//! Running external commands with streamed output.

use super::{CapturedOutput, CommandSpec, Elevator, ExitReport, OutputLine, OutputStream};
use crate::privilege::Secret;
use crate::SupervisorError;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Replacement text for a credential that shows up in process output.
const REDACTED: &str = "********";

/// Options for the process supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Maximum run time of a single command before it is killed.
    ///
    /// Default: 30 minutes.
    pub timeout: Duration,

    /// Wrapper used for privileged commands on platforms that need an
    /// interactive credential.
    pub elevator: Elevator,

    /// Privileged commands need a credential before they can run.
    pub requires_interactive_elevation: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            elevator: Elevator::default(),
            requires_interactive_elevation: false,
        }
    }
}

/// Launches external commands and streams their output line by line.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    options: SupervisorOptions,
}

impl ProcessSupervisor {
    /// Create a supervisor.
    pub fn new(options: SupervisorOptions) -> Self {
        Self { options }
    }

    /// Options this supervisor was built with.
    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Whether running `cmd` needs a credential from the operator.
    pub fn requires_credential(&self, cmd: &CommandSpec) -> bool {
        cmd.privileged && self.options.requires_interactive_elevation
    }

    /// Run `cmd`, delivering each output line to `on_line` as it is produced.
    ///
    /// Lines of one stream arrive in the order the process wrote them;
    /// stdout and stderr are interleaved as they become readable.
    ///
    /// When the command needs a credential (see
    /// [`requires_credential`](Self::requires_credential)) and `credential`
    /// is `None`, nothing is launched and
    /// [`SupervisorError::CredentialRequired`] is returned so the caller can
    /// obtain one. A supplied credential is written once to the child's
    /// stdin, which is then closed. It is scrubbed from every output line
    /// and dropped when this call returns.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use runtime_bootstrap::{CommandSpec, ProcessSupervisor};
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() {
    ///     let supervisor = ProcessSupervisor::default();
    ///     let cmd = CommandSpec::new("docker").args(["--version"]);
    ///     let result = supervisor.run(&cmd, None, |line| println!("{}", line.text)).await;
    ///     match result {
    ///         Ok(report) => println!("done in {:?}", report.duration),
    ///         Err(e) => println!("failed: {}. Fix: {}", e, e.fix_suggestion()),
    ///     }
    /// }
    /// ```
    pub async fn run<F>(
        &self,
        cmd: &CommandSpec,
        credential: Option<Secret>,
        mut on_line: F,
    ) -> Result<ExitReport, SupervisorError>
    where
        F: FnMut(OutputLine) + Send,
    {
        let elevate = self.requires_credential(cmd);
        if elevate && credential.is_none() {
            return Err(SupervisorError::CredentialRequired {
                program: cmd.program.clone(),
            });
        }

        let (program, args) = if elevate {
            self.options.elevator.wrap(cmd)
        } else {
            (cmd.program.clone(), cmd.args.clone())
        };

        let mut command = Command::new(&program);
        command
            .args(&args)
            .envs(cmd.env_vars.iter().cloned())
            .kill_on_drop(true)
            .stdin(if credential.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            program = %program,
            description = %cmd.description,
            privileged = elevate,
            "launching command"
        );
        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::from_spawn(&program, &e))?;

        let redact = match credential {
            Some(secret) => {
                deliver_credential(&mut child, &secret, &program).await;
                Some(secret)
            }
            None => None,
        };

        let mut emit = |stream: OutputStream, text: String| {
            let text = match &redact {
                Some(secret) if !secret.expose().is_empty() => {
                    text.replace(secret.expose(), REDACTED)
                }
                _ => text,
            };
            on_line(OutputLine { stream, text });
        };

        let outcome = timeout(self.options.timeout, async {
            pump_output(&mut child, &program, &mut emit).await?;
            child.wait().await.map_err(|e| SupervisorError::Io {
                program: program.clone(),
                message: e.to_string(),
            })
        })
        .await;

        let status = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(program = %program, timeout = ?self.options.timeout, "command timed out, killing");
                let _ = child.kill().await;
                return Err(SupervisorError::Timeout {
                    program,
                    duration: self.options.timeout,
                });
            }
        };

        let duration = started.elapsed();
        debug!(program = %program, ?duration, code = ?status.code(), "command finished");
        classify_exit(&program, status, duration)
    }

    /// Run a short query command and buffer its output.
    ///
    /// Non-zero exits are not errors here; callers inspect
    /// [`CapturedOutput::exit_code`].
    pub async fn capture(
        &self,
        cmd: &CommandSpec,
        limit: Duration,
    ) -> Result<CapturedOutput, SupervisorError> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env_vars.iter().cloned())
            .kill_on_drop(true)
            .stdin(Stdio::null());

        let output = timeout(limit, command.output())
            .await
            .map_err(|_| SupervisorError::Timeout {
                program: cmd.program.clone(),
                duration: limit,
            })?
            .map_err(|e| SupervisorError::from_spawn(&cmd.program, &e))?;

        Ok(CapturedOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

async fn deliver_credential(child: &mut Child, secret: &Secret, program: &str) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };
    let written = async {
        stdin.write_all(secret.expose().as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.shutdown().await
    }
    .await;
    // A child that exits without reading its input is reported by its exit status.
    if let Err(e) = written {
        warn!(program = %program, error = %e, "could not deliver credential to child stdin");
    }
}

async fn pump_output<F>(
    child: &mut Child,
    program: &str,
    emit: &mut F,
) -> Result<(), SupervisorError>
where
    F: FnMut(OutputStream, String),
{
    let io_error = |message: &str| SupervisorError::Io {
        program: program.to_string(),
        message: message.to_string(),
    };
    let stdout = child.stdout.take().ok_or_else(|| io_error("stdout not captured"))?;
    let stderr = child.stderr.take().ok_or_else(|| io_error("stderr not captured"))?;

    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        tokio::select! {
            line = next_line(&mut stdout, &mut out_buf), if out_open => {
                match line.map_err(|e| io_error(&e.to_string()))? {
                    Some(text) => emit(OutputStream::Stdout, text),
                    None => out_open = false,
                }
            }
            line = next_line(&mut stderr, &mut err_buf), if err_open => {
                match line.map_err(|e| io_error(&e.to_string()))? {
                    Some(text) => emit(OutputStream::Stderr, text),
                    None => err_open = false,
                }
            }
        }
    }
    Ok(())
}

/// Read one line, tolerating invalid UTF-8.
///
/// Partial reads stay in `buf` when the future is dropped, so this is safe
/// to race in `select!` as long as the same buffer is passed again.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }
    let mut bytes = std::mem::take(buf);
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn classify_exit(
    program: &str,
    status: ExitStatus,
    duration: Duration,
) -> Result<ExitReport, SupervisorError> {
    match status.code() {
        Some(0) => Ok(ExitReport {
            exit_code: 0,
            duration,
        }),
        Some(code) => Err(SupervisorError::NonZeroExit {
            program: program.to_string(),
            code,
        }),
        None => Err(SupervisorError::AbnormalExit {
            program: program.to_string(),
            code_or_signal: termination_signal(&status),
        }),
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> i32 {
    -1
}
