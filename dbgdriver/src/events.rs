/// Notifications for the UI layer
///
/// The driver reports finished commands and execution state changes
/// through a [`DriverListener`]. The usual listener is a channel whose
/// receiving end is drained by a [`NotificationHandler`].

use tokio::sync::mpsc;

use crate::types::CommandHandle;

/// Something the UI layer should know about
#[derive(Debug, Clone)]
pub enum DriverNotification {
    /// The debugger printed its prompt after `command`; `output` is what came before it
    CommandCompleted {
        command: CommandHandle,
        output: String,
    },
    /// A command that lets the program run was accepted by the debugger
    InferiorRunning,
    /// All queued work is done
    EnterIdleState,
}

/// Receiver of driver notifications
pub trait DriverListener: Send {
    fn command_completed(&mut self, command: CommandHandle, output: String);
    fn inferior_running(&mut self);
    fn enter_idle_state(&mut self);
}

impl DriverListener for mpsc::UnboundedSender<DriverNotification> {
    fn command_completed(&mut self, command: CommandHandle, output: String) {
        if self.send(DriverNotification::CommandCompleted { command, output }).is_err() {
            log::debug!("notification receiver dropped");
        }
    }

    fn inferior_running(&mut self) {
        let _ = self.send(DriverNotification::InferiorRunning);
    }

    fn enter_idle_state(&mut self) {
        let _ = self.send(DriverNotification::EnterIdleState);
    }
}

/// Dispatches notifications from a channel to registered callbacks
pub struct NotificationHandler {
    receiver: mpsc::UnboundedReceiver<DriverNotification>,
    completed_callbacks: Vec<Box<dyn Fn(&CommandHandle, &str) + Send + Sync>>,
    running_callbacks: Vec<Box<dyn Fn() + Send + Sync>>,
    idle_callbacks: Vec<Box<dyn Fn() + Send + Sync>>,
    inferior_running: bool,
}

impl NotificationHandler {
    pub fn new(receiver: mpsc::UnboundedReceiver<DriverNotification>) -> Self {
        Self {
            receiver,
            completed_callbacks: Vec::new(),
            running_callbacks: Vec::new(),
            idle_callbacks: Vec::new(),
            inferior_running: false,
        }
    }

    /// Add command completion callback
    pub fn on_command_completed<F>(&mut self, callback: F)
    where
        F: Fn(&CommandHandle, &str) + Send + Sync + 'static,
    {
        self.completed_callbacks.push(Box::new(callback));
    }

    /// Add inferior running callback
    pub fn on_inferior_running<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.running_callbacks.push(Box::new(callback));
    }

    /// Add idle callback
    pub fn on_idle<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.idle_callbacks.push(Box::new(callback));
    }

    /// Whether the last resuming command has not been followed by idle yet
    pub fn is_inferior_running(&self) -> bool {
        self.inferior_running
    }

    /// Run until the sending side goes away
    pub async fn run(&mut self) {
        log::debug!("notification handler started");

        while let Some(notification) = self.receiver.recv().await {
            self.handle(notification);
        }

        log::debug!("notification handler stopped");
    }

    /// Handle everything that is already queued, without waiting
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notification) = self.receiver.try_recv() {
            self.handle(notification);
            handled += 1;
        }
        handled
    }

    fn handle(&mut self, notification: DriverNotification) {
        match notification {
            DriverNotification::CommandCompleted { command, output } => {
                log::debug!(
                    "command #{} ({}) completed with {} bytes",
                    command.id(),
                    command.kind(),
                    output.len()
                );
                for callback in &self.completed_callbacks {
                    callback(&command, &output);
                }
            }
            DriverNotification::InferiorRunning => {
                self.inferior_running = true;
                for callback in &self.running_callbacks {
                    callback();
                }
            }
            DriverNotification::EnterIdleState => {
                self.inferior_running = false;
                for callback in &self.idle_callbacks {
                    callback();
                }
            }
        }
    }
}
