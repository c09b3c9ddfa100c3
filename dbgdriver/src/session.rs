/// Debugger session actor
///
/// A [`DebuggerSession`] owns one [`DebuggerDriver`] and the debugger
/// process it talks to. Both live on a single tokio task; requests reach
/// it over a channel and answers come back on oneshot channels, so every
/// driver mutation happens in one place and in order.

use tokio::sync::{mpsc, oneshot};

use crate::communication::ProcessEvent;
use crate::config::DriverConfig;
use crate::driver::DebuggerDriver;
use crate::events::DriverNotification;
use crate::process::{DebuggerProcess, SpawnedDebugger};
use crate::transcript::Transcript;
use crate::types::{CommandHandle, CommandKind, DriverState, ExprAncestry, ExprId, QueueMode};
use crate::{DriverError, Result};

enum SessionRequest {
    Startup {
        command_line: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    EnqueueUrgent {
        kind: CommandKind,
        text: String,
        clear_low: bool,
        reply: oneshot::Sender<CommandHandle>,
    },
    EnqueueNormal {
        kind: CommandKind,
        text: String,
        mode: QueueMode,
        expr: Option<ExprId>,
        reply: oneshot::Sender<CommandHandle>,
    },
    DropCommandsFor {
        scope: Box<dyn ExprAncestry + Send>,
        reply: oneshot::Sender<usize>,
    },
    FlushCommands {
        hipri_only: bool,
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<DriverState>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session; cheap to clone
#[derive(Clone)]
pub struct DebuggerSession {
    requests: mpsc::UnboundedSender<SessionRequest>,
}

impl DebuggerSession {
    /// Create the session task
    ///
    /// The returned receiver yields the driver's notifications. Must be
    /// called from within a tokio runtime.
    pub fn new(config: DriverConfig) -> Result<(Self, mpsc::UnboundedReceiver<DriverNotification>)> {
        let prompt = config.prompt.recognizer()?;
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let driver = DebuggerDriver::with_output_capacity(prompt, Box::new(notify_tx), config.output_capacity);

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let worker = SessionWorker {
            driver,
            config,
            process: None,
        };
        tokio::spawn(worker.run(request_rx));

        Ok((Self { requests: request_tx }, notify_rx))
    }

    /// Start the debugger, replacing any previous one
    ///
    /// `None` or a blank command line selects the configured invocation.
    pub async fn startup(&self, command_line: Option<&str>) -> Result<()> {
        let command_line = command_line.map(str::to_string);
        self.call(|reply| SessionRequest::Startup { command_line, reply }).await?
    }

    pub async fn enqueue_urgent(&self, kind: CommandKind, text: &str, clear_low: bool) -> Result<CommandHandle> {
        let text = text.to_string();
        self.call(|reply| SessionRequest::EnqueueUrgent {
            kind,
            text,
            clear_low,
            reply,
        })
        .await
    }

    pub async fn enqueue_normal(&self, kind: CommandKind, text: &str, mode: QueueMode) -> Result<CommandHandle> {
        self.enqueue_normal_inner(kind, text, mode, None).await
    }

    pub async fn enqueue_normal_for_expr(
        &self,
        kind: CommandKind,
        text: &str,
        mode: QueueMode,
        expr: ExprId,
    ) -> Result<CommandHandle> {
        self.enqueue_normal_inner(kind, text, mode, Some(expr)).await
    }

    async fn enqueue_normal_inner(
        &self,
        kind: CommandKind,
        text: &str,
        mode: QueueMode,
        expr: Option<ExprId>,
    ) -> Result<CommandHandle> {
        let text = text.to_string();
        self.call(|reply| SessionRequest::EnqueueNormal {
            kind,
            text,
            mode,
            expr,
            reply,
        })
        .await
    }

    /// Drop queued low-priority commands for `scope` and its descendants
    pub async fn drop_commands_for(&self, scope: impl ExprAncestry + Send + 'static) -> Result<usize> {
        let scope = Box::new(scope);
        self.call(|reply| SessionRequest::DropCommandsFor { scope, reply }).await
    }

    pub async fn flush_commands(&self, hipri_only: bool) -> Result<()> {
        self.call(|reply| SessionRequest::FlushCommands { hipri_only, reply }).await
    }

    pub async fn state(&self) -> Result<DriverState> {
        self.call(|reply| SessionRequest::State { reply }).await
    }

    /// Stop the debugger and forget all pending work
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| SessionRequest::Shutdown { reply }).await
    }

    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> SessionRequest) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(request(reply_tx))
            .map_err(|_| DriverError::SessionClosed)?;
        reply_rx.await.map_err(|_| DriverError::SessionClosed)
    }
}

enum Step {
    Request(Option<SessionRequest>),
    Event(Option<ProcessEvent>),
}

struct SessionWorker {
    driver: DebuggerDriver,
    config: DriverConfig,
    process: Option<DebuggerProcess>,
}

impl SessionWorker {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<SessionRequest>) {
        log::debug!("session task started");
        let mut events: Option<mpsc::UnboundedReceiver<ProcessEvent>> = None;

        loop {
            let step = tokio::select! {
                request = requests.recv() => Step::Request(request),
                event = next_event(&mut events) => Step::Event(event),
            };

            match step {
                Step::Request(Some(request)) => self.handle_request(request, &mut events),
                Step::Request(None) => break,
                Step::Event(Some(event)) => {
                    let exited = matches!(event, ProcessEvent::Exited(_));
                    self.driver.handle_event(event);
                    if exited {
                        self.process = None;
                    }
                }
                Step::Event(None) => {
                    log::debug!("debugger event stream closed");
                    events = None;
                }
            }
        }

        self.stop();
        log::debug!("session task finished");
    }

    fn handle_request(&mut self, request: SessionRequest, events: &mut Option<mpsc::UnboundedReceiver<ProcessEvent>>) {
        match request {
            SessionRequest::Startup { command_line, reply } => {
                *events = None;
                let result = self.startup(command_line.as_deref()).map(|rx| {
                    *events = Some(rx);
                });
                let _ = reply.send(result);
            }
            SessionRequest::EnqueueUrgent {
                kind,
                text,
                clear_low,
                reply,
            } => {
                let _ = reply.send(self.driver.enqueue_urgent(kind, &text, clear_low));
            }
            SessionRequest::EnqueueNormal {
                kind,
                text,
                mode,
                expr,
                reply,
            } => {
                let cmd = match expr {
                    Some(expr) => self.driver.enqueue_normal_for_expr(kind, &text, mode, expr),
                    None => self.driver.enqueue_normal(kind, &text, mode),
                };
                let _ = reply.send(cmd);
            }
            SessionRequest::DropCommandsFor { scope, reply } => {
                let _ = reply.send(self.driver.drop_commands_for(&*scope));
            }
            SessionRequest::FlushCommands { hipri_only, reply } => {
                self.driver.flush_commands(hipri_only);
                let _ = reply.send(());
            }
            SessionRequest::State { reply } => {
                let _ = reply.send(self.driver.state());
            }
            SessionRequest::Shutdown { reply } => {
                *events = None;
                self.stop();
                let _ = reply.send(());
            }
        }
    }

    fn startup(&mut self, command_line: Option<&str>) -> Result<mpsc::UnboundedReceiver<ProcessEvent>> {
        if let Some(mut old) = self.process.take() {
            log::debug!("replacing running debugger {:?}", old.id());
            old.kill();
        }
        self.driver.detach();

        let command_line = self.config.command_line(command_line).to_string();
        let SpawnedDebugger {
            process,
            transport,
            events,
        } = DebuggerProcess::spawn(&command_line)?;

        if !self.driver.has_transcript() {
            if let Some(path) = &self.config.transcript {
                match Transcript::create(path) {
                    Ok(transcript) => self.driver.set_transcript(Some(transcript)),
                    Err(e) => log::warn!("cannot open transcript {}: {}", path.display(), e),
                }
            }
        }

        self.driver.startup(Box::new(transport));
        self.process = Some(process);
        log::info!("debugger started: {}", command_line);
        Ok(events)
    }

    fn stop(&mut self) {
        self.driver.shutdown();
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<ProcessEvent>>) -> Option<ProcessEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
