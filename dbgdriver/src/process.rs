/// Process management for the debugger
///
/// This module spawns the debugger with stdin on a pipe and stdout and
/// stderr merged into a second pipe, watches for its exit and delivers
/// interrupt signals.

use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::communication::{self, PipeTransport, ProcessEvent};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start debugger process: {0}")]
    StartError(#[from] std::io::Error),
    #[error("Debugger command line is empty")]
    EmptyCommandLine,
    #[error("Process terminated unexpectedly")]
    Terminated,
    #[error("Signal error: {0}")]
    SignalError(String),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// A running debugger process
#[derive(Debug)]
pub struct DebuggerProcess {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
}

/// Everything produced by a successful spawn
#[derive(Debug)]
pub struct SpawnedDebugger {
    pub process: DebuggerProcess,
    pub transport: PipeTransport,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

/// Split a command line into program and arguments
pub fn split_command_line(command_line: &str) -> Result<(String, Vec<String>)> {
    let mut words = command_line.split_whitespace().map(str::to_string);
    let program = words.next().ok_or(ProcessError::EmptyCommandLine)?;
    Ok((program, words.collect()))
}

impl DebuggerProcess {
    /// Start the debugger described by `command_line`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(command_line: &str) -> Result<SpawnedDebugger> {
        let (program, args) = split_command_line(command_line)?;
        log::debug!("Starting debugger process: {} {:?}", program, args);

        let (output_reader, output_writer) = os_pipe::pipe()?;
        let mut child = {
            let mut command = Command::new(&program);
            command
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(output_writer.try_clone()?)
                .stderr(output_writer)
                .kill_on_drop(true);
            // the command holds our copies of the write end; dropping it
            // lets the reader see EOF once the child exits
            command.spawn()?
        };

        let pid = child.id();
        log::debug!("Debugger process started with PID: {:?}", pid);

        let stdin = child.stdin.take().ok_or_else(|| {
            ProcessError::StartError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Failed to get stdin handle",
            ))
        })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let input = communication::start_input_writer(stdin, events_tx.clone());
        communication::start_output_reader(output_reader, events_tx.clone());

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill debugger: {}", e);
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    log::error!("Failed to wait for debugger: {}", e);
                    None
                }
            };
            log::debug!("Debugger process exited with code {:?}", code);
            let _ = events_tx.send(ProcessEvent::Exited(code));
        });

        Ok(SpawnedDebugger {
            process: DebuggerProcess {
                pid,
                kill: Some(kill_tx),
            },
            transport: PipeTransport::new(input, pid),
            events: events_rx,
        })
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the watcher task to kill the process; the exit is reported as an event
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            log::debug!("Killing debugger PID: {:?}", self.pid);
            let _ = kill.send(());
        }
    }
}

impl Drop for DebuggerProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Platform-specific interrupt signal implementation
#[cfg(unix)]
pub fn send_interrupt_signal(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|_| ProcessError::SignalError(format!("Invalid PID {}", pid)))?;
    match kill(Pid::from_raw(pid), Signal::SIGINT) {
        Ok(()) => {
            log::debug!("Successfully sent SIGINT to PID {}", pid);
            Ok(())
        }
        Err(errno) => {
            log::error!("Failed to send SIGINT to PID {}: {}", pid, errno);
            Err(ProcessError::SignalError(format!("Failed to send SIGINT: {}", errno)))
        }
    }
}

#[cfg(windows)]
pub fn send_interrupt_signal(pid: u32) -> Result<()> {
    unsafe {
        use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_C_EVENT};

        let result = GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid);
        if result == 0 {
            log::error!("GenerateConsoleCtrlEvent failed for PID {}", pid);
            Err(ProcessError::SignalError("Failed to send Ctrl+C event".into()))
        } else {
            log::debug!("Successfully sent CTRL_C_EVENT to PID {}", pid);
            Ok(())
        }
    }
}

#[cfg(not(any(windows, unix)))]
pub fn send_interrupt_signal(_pid: u32) -> Result<()> {
    Err(ProcessError::SignalError("Interrupt not supported on this platform".into()))
}

/// Install custom signal handlers to prevent self-termination when sending signals
#[cfg(windows)]
pub fn install_signal_protection() {
    unsafe {
        use winapi::shared::minwindef::{BOOL, DWORD, TRUE};
        use winapi::um::consoleapi::SetConsoleCtrlHandler;

        unsafe extern "system" fn ctrl_handler(ctrl_type: DWORD) -> BOOL {
            use winapi::um::wincon::{CTRL_BREAK_EVENT, CTRL_C_EVENT};

            match ctrl_type {
                CTRL_C_EVENT | CTRL_BREAK_EVENT => {
                    log::debug!("CTRL_HANDLER: Ignoring control event {} to prevent self-termination", ctrl_type);
                    TRUE
                }
                _ => 0,
            }
        }

        if SetConsoleCtrlHandler(Some(ctrl_handler), TRUE) == 0 {
            log::warn!("Failed to install custom Ctrl+C handler");
        }
    }
}

#[cfg(not(windows))]
pub fn install_signal_protection() {
    // SIGINT goes to the debugger's PID only
    log::debug!("Signal protection not required on this platform");
}
