/// Communication layer between the driver and the debugger process
///
/// The driver only sees a [`Transport`] for writing and interrupting, and
/// a stream of [`ProcessEvent`]s coming back. With a real process those
/// events are produced by the background tasks started here.

use std::io::Read;

use os_pipe::PipeReader;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc;

use crate::process::{self, ProcessError};

const READ_CHUNK_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Debugger input is closed")]
    Closed,
    #[error("Failed to interrupt debugger: {0}")]
    Signal(#[from] ProcessError),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Events produced by the debugger process, in the order they happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The last write was fully accepted by the operating system
    WriteAcknowledged,
    /// A chunk of the merged stdout/stderr stream
    Output(Vec<u8>),
    /// The process is gone
    Exited(Option<i32>),
}

/// Outgoing side of the debugger connection
///
/// Every successful `write` must later be answered by exactly one
/// [`ProcessEvent::WriteAcknowledged`].
pub trait Transport: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
    fn interrupt(&mut self) -> Result<()>;
}

/// Transport backed by the stdin pipe of a spawned debugger
#[derive(Debug, Clone)]
pub struct PipeTransport {
    input: mpsc::UnboundedSender<Vec<u8>>,
    pid: Option<u32>,
}

impl PipeTransport {
    pub fn new(input: mpsc::UnboundedSender<Vec<u8>>, pid: Option<u32>) -> Self {
        Self { input, pid }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Transport for PipeTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.input.send(bytes.to_vec()).map_err(|_| TransportError::Closed)
    }

    fn interrupt(&mut self) -> Result<()> {
        let pid = self.pid.ok_or(ProcessError::Terminated)?;
        process::send_interrupt_signal(pid)?;
        Ok(())
    }
}

/// Start the task that writes commands to the debugger's stdin
///
/// Each buffer is written and flushed before `WriteAcknowledged` is sent.
pub fn start_input_writer(
    mut stdin: ChildStdin,
    events: mpsc::UnboundedSender<ProcessEvent>,
) -> mpsc::UnboundedSender<Vec<u8>> {
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        log::debug!("debugger input writer started");
        while let Some(bytes) = input_rx.recv().await {
            let written: std::io::Result<()> = async {
                stdin.write_all(&bytes).await?;
                stdin.flush().await
            }
            .await;

            if let Err(e) = written {
                log::error!("debugger stdin write error: {}", e);
                break;
            }

            log::trace!("SEND: {} bytes acknowledged", bytes.len());
            if events.send(ProcessEvent::WriteAcknowledged).is_err() {
                break;
            }
        }
        log::debug!("debugger input writer finished");
    });

    input_tx
}

/// Start reading the merged output pipe on a blocking thread
pub fn start_output_reader(mut reader: PipeReader, events: mpsc::UnboundedSender<ProcessEvent>) {
    tokio::task::spawn_blocking(move || {
        log::debug!("debugger output reader started");
        let mut buf = [0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    log::debug!("debugger output: EOF reached");
                    break;
                }
                Ok(n) => {
                    log::trace!("RECV: {:?}", String::from_utf8_lossy(&buf[..n]));
                    if events.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("debugger output read error: {}", e);
                    break;
                }
            }
        }
        log::debug!("debugger output reader finished");
    });
}
