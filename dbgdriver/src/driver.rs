/// Debugger driver state machine
///
/// The driver sends one command at a time to the debugger, collects the
/// output until the prompt reappears and hands it to the UI layer. It is
/// purely event driven: the owner feeds it write acknowledgments, output
/// chunks and exit notifications, and calls the enqueue methods.

use crate::commands::CommandQueues;
use crate::communication::{ProcessEvent, Transport};
use crate::events::DriverListener;
use crate::output::{DelayedOutput, OutputBuffer, DEFAULT_OUTPUT_CAPACITY};
use crate::parser::PromptRecognizer;
use crate::transcript::Transcript;
use crate::types::{CommandHandle, CommandKind, DriverState, ExprAncestry, ExprId, Priority, QueueMode};

/// Serializes commands to one debugger and routes its output back
pub struct DebuggerDriver {
    state: DriverState,
    active: Option<CommandHandle>,
    queues: CommandQueues,
    output: OutputBuffer,
    delayed: DelayedOutput,
    prompt: Box<dyn PromptRecognizer>,
    listener: Box<dyn DriverListener>,
    transport: Option<Box<dyn Transport>>,
    transcript: Option<Transcript>,
}

impl DebuggerDriver {
    pub fn new(prompt: Box<dyn PromptRecognizer>, listener: Box<dyn DriverListener>) -> Self {
        Self::with_output_capacity(prompt, listener, DEFAULT_OUTPUT_CAPACITY)
    }

    pub fn with_output_capacity(
        prompt: Box<dyn PromptRecognizer>,
        listener: Box<dyn DriverListener>,
        capacity: usize,
    ) -> Self {
        Self {
            state: DriverState::Idle,
            active: None,
            queues: CommandQueues::new(),
            output: OutputBuffer::with_capacity(capacity),
            delayed: DelayedOutput::default(),
            prompt,
            listener,
            transport: None,
            transcript: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DriverState::Idle
    }

    pub fn active_command(&self) -> Option<&CommandHandle> {
        self.active.as_ref()
    }

    pub fn queues(&self) -> &CommandQueues {
        &self.queues
    }

    /// Number of output chunks waiting for a write acknowledgment
    pub fn delayed_chunks(&self) -> usize {
        self.delayed.len()
    }

    /// Output collected for the active command so far
    pub fn buffered_output(&self) -> &[u8] {
        self.output.as_bytes()
    }

    pub fn output_capacity(&self) -> usize {
        self.output.capacity()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn has_transcript(&self) -> bool {
        self.transcript.is_some()
    }

    pub fn set_transcript(&mut self, transcript: Option<Transcript>) {
        self.transcript = transcript;
    }

    /// Forget any in-flight interaction: active command, queues and buffers
    pub fn reset(&mut self) {
        if let Some(cmd) = self.active.take() {
            log::debug!("discarding active command #{}", cmd.id());
        }
        self.queues.flush(false);
        self.output.clear();
        self.delayed.clear();
        self.state = DriverState::Idle;
    }

    /// Reset and stop talking to the current debugger
    pub fn detach(&mut self) {
        self.reset();
        if self.transport.take().is_some() {
            log::debug!("driver detached from debugger");
        }
    }

    /// Begin talking to a freshly started debugger
    pub fn startup(&mut self, transport: Box<dyn Transport>) {
        self.reset();
        self.transport = Some(transport);
        log::debug!("driver attached to debugger");
    }

    /// Detach from the debugger and close the transcript
    pub fn shutdown(&mut self) {
        self.detach();
        self.transcript = None;
        log::debug!("driver shut down");
    }

    /// Queue a high-priority command
    ///
    /// With `clear_low` set the low-priority queue is dropped, and a running
    /// low-priority command is interrupted and abandoned.
    pub fn enqueue_urgent(&mut self, kind: CommandKind, text: &str, clear_low: bool) -> CommandHandle {
        let cmd = self.queues.push_urgent(kind, text);

        if clear_low {
            if self.state == DriverState::RunningLow {
                self.state = DriverState::Interrupted;
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.interrupt() {
                        log::warn!("failed to interrupt debugger: {}", e);
                    }
                }
                match self.active.take() {
                    Some(active) => log::debug!("interrupted command #{} ({})", active.id(), active.kind()),
                    None => self.contract_violation("running low-priority state without an active command"),
                }
            }
            let flushed = self.queues.flush_low();
            if flushed > 0 {
                log::debug!("dropped {} low-priority commands", flushed);
            }
        }

        if self.state == DriverState::Idle {
            self.write_command();
        }
        cmd
    }

    /// Queue a low-priority command
    pub fn enqueue_normal(&mut self, kind: CommandKind, text: &str, mode: QueueMode) -> CommandHandle {
        self.enqueue_normal_inner(kind, text, None, mode)
    }

    /// Queue a low-priority command that concerns `expr`
    pub fn enqueue_normal_for_expr(
        &mut self,
        kind: CommandKind,
        text: &str,
        mode: QueueMode,
        expr: ExprId,
    ) -> CommandHandle {
        self.enqueue_normal_inner(kind, text, Some(expr), mode)
    }

    fn enqueue_normal_inner(
        &mut self,
        kind: CommandKind,
        text: &str,
        expr: Option<ExprId>,
        mode: QueueMode,
    ) -> CommandHandle {
        let cmd = self.queues.push_normal(kind, text, expr, mode, self.active.as_ref());

        if self.state == DriverState::Idle {
            self.write_command();
        }
        cmd
    }

    /// Drop queued low-priority commands about `scope` or its descendants
    pub fn drop_commands_for(&mut self, scope: &dyn ExprAncestry) -> usize {
        self.queues.drop_matching(scope)
    }

    /// Drop the high-priority queue, and the low-priority one unless `hipri_only`
    pub fn flush_commands(&mut self, hipri_only: bool) {
        self.queues.flush(hipri_only);
    }

    /// Dispatch an event coming from the debugger process
    pub fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::WriteAcknowledged => self.command_read(),
            ProcessEvent::Output(chunk) => self.receive_output(&chunk),
            ProcessEvent::Exited(code) => {
                log::debug!("debugger exited with {:?}", code);
                self.process_exited();
            }
        }
    }

    /// The transport accepted the write of the active command
    pub fn command_read(&mut self) {
        let next = match self.state {
            DriverState::CommandSent => DriverState::Running,
            DriverState::CommandSentLow => DriverState::RunningLow,
            other => {
                return self.contract_violation(&format!("write acknowledged in state {:?}", other));
            }
        };
        let Some(cmd) = self.active.clone() else {
            return self.contract_violation("write acknowledged without an active command");
        };
        if cmd.commit() {
            return self.contract_violation("active command was already committed");
        }

        self.state = next;
        log::trace!("command #{} committed, state {:?}", cmd.id(), self.state);

        if cmd.kind().resumes_inferior() {
            self.listener.inferior_running();
        }

        // output that raced ahead of the acknowledgment
        while let Some(chunk) = self.delayed.pop() {
            self.receive_output(&chunk);
        }

        // the prompt was found while more chunks were held back
        if self.active.is_none() && matches!(self.state, DriverState::Running | DriverState::RunningLow) {
            self.advance();
        }
    }

    /// A chunk of debugger output arrived
    pub fn receive_output(&mut self, chunk: &[u8]) {
        if self.state.awaits_acknowledgment() {
            let pending = matches!(&self.active, Some(cmd) if !cmd.is_committed());
            if pending {
                log::trace!("holding {} bytes until write is acknowledged", chunk.len());
                self.delayed.push(chunk);
            } else {
                self.contract_violation("output held back without an uncommitted command");
            }
            return;
        }

        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(chunk);
        }

        // the debugger repeats its prompt after SIGCONT and the like
        if self.active.is_none() && self.state != DriverState::Interrupted {
            log::trace!("ignoring stray output: {:?}", String::from_utf8_lossy(chunk));
            return;
        }

        self.output.append(chunk);

        let Some(prompt_at) = self.prompt.find_prompt(self.output.as_bytes()) else {
            return;
        };

        let interrupted = self.state == DriverState::Interrupted;
        if interrupted {
            log::debug!("discarding output of interrupted command");
        } else {
            let Some(cmd) = self.active.take() else {
                return self.contract_violation("prompt found without an active command");
            };
            let output = self.output.text_before(prompt_at);
            log::debug!("command #{} finished with {} bytes", cmd.id(), output.len());
            self.listener.command_completed(cmd, output);
        }

        self.output.clear();
        if interrupted {
            self.delayed.clear();
        }

        if self.delayed.is_empty() {
            self.advance();
        }
    }

    /// The debugger process went away
    pub fn process_exited(&mut self) {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record_exit();
        }

        if let Some(cmd) = self.active.take() {
            log::debug!("command #{} lost with the debugger", cmd.id());
        }
        self.transport = None;
        self.delayed.clear();
        self.output.clear();
        self.state = DriverState::Idle;
    }

    /// Send the next command or announce idle
    fn advance(&mut self) {
        if self.queues.is_empty() {
            self.state = DriverState::Idle;
            self.listener.enter_idle_state();
        } else {
            self.write_command();
        }
    }

    /// Dequeue a pending command, make it the active one and send it
    fn write_command(&mut self) {
        if self.active.is_some() {
            return self.contract_violation("write requested while a command is active");
        }

        let Some(transport) = self.transport.as_mut() else {
            log::trace!("no debugger attached, keeping commands queued");
            self.state = DriverState::Idle;
            return;
        };

        let Some((cmd, priority)) = self.queues.pop_next() else {
            // also needed after an interrupted command
            self.state = DriverState::Idle;
            return;
        };

        log::debug!("SEND #{} ({:?}): {}", cmd.id(), priority, cmd.text().trim_end());

        if let Err(e) = transport.write(cmd.text().as_bytes()) {
            log::error!("failed to write command #{}: {}", cmd.id(), e);
            self.transport = None;
            self.queues.push_front(priority, cmd);
            self.state = DriverState::Idle;
            return;
        }

        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(cmd.text().as_bytes());
        }

        self.active = Some(cmd);
        self.state = match priority {
            Priority::High => DriverState::CommandSent,
            Priority::Low => DriverState::CommandSentLow,
        };
    }

    /// A broken invariant; fatal in debug builds, resynchronizes otherwise
    fn contract_violation(&mut self, what: &str) {
        log::error!("driver invariant broken: {}", what);
        if cfg!(debug_assertions) {
            panic!("driver invariant broken: {}", what);
        }
        self.reset();
    }
}

impl std::fmt::Debug for DebuggerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerDriver")
            .field("state", &self.state)
            .field("active", &self.active.as_ref().map(|cmd| cmd.id()))
            .field("urgent", &self.queues.high_len())
            .field("normal", &self.queues.low_len())
            .field("delayed", &self.delayed.len())
            .field("buffered", &self.output.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::TransportError;
    use crate::events::DriverNotification;
    use crate::parser::{PatternPrompt, TrailingPrompt};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Debug, Default)]
    struct Wire {
        writes: Vec<String>,
        interrupts: usize,
        broken: bool,
    }

    #[derive(Clone, Default)]
    struct FakeTransport(Arc<Mutex<Wire>>);

    impl Transport for FakeTransport {
        fn write(&mut self, bytes: &[u8]) -> crate::communication::Result<()> {
            let mut wire = self.0.lock().unwrap();
            if wire.broken {
                return Err(TransportError::Closed);
            }
            wire.writes.push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }

        fn interrupt(&mut self) -> crate::communication::Result<()> {
            self.0.lock().unwrap().interrupts += 1;
            Ok(())
        }
    }

    struct Harness {
        driver: DebuggerDriver,
        wire: FakeTransport,
        notifications: mpsc::UnboundedReceiver<DriverNotification>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_prompt(Box::new(TrailingPrompt::gdb()))
        }

        fn with_prompt(prompt: Box<dyn PromptRecognizer>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut driver = DebuggerDriver::new(prompt, Box::new(tx));
            let wire = FakeTransport::default();
            driver.startup(Box::new(wire.clone()));
            Self {
                driver,
                wire,
                notifications: rx,
            }
        }

        fn writes(&self) -> Vec<String> {
            self.wire.0.lock().unwrap().writes.clone()
        }

        fn interrupts(&self) -> usize {
            self.wire.0.lock().unwrap().interrupts
        }

        fn notifications(&mut self) -> Vec<DriverNotification> {
            let mut all = Vec::new();
            while let Ok(n) = self.notifications.try_recv() {
                all.push(n);
            }
            all
        }

        fn completions(&mut self) -> Vec<(CommandHandle, String)> {
            self.notifications()
                .into_iter()
                .filter_map(|n| match n {
                    DriverNotification::CommandCompleted { command, output } => Some((command, output)),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_idle_driver_sends_immediately() {
        let mut h = Harness::new();
        let cmd = h.driver.enqueue_normal(CommandKind::Print, "print x\n", QueueMode::Append);

        assert_eq!(h.driver.state(), DriverState::CommandSentLow);
        assert!(Arc::ptr_eq(h.driver.active_command().unwrap(), &cmd));
        assert_eq!(h.writes(), vec!["print x\n"]);
        assert!(!cmd.is_committed());
    }

    #[test]
    fn test_one_command_in_flight() {
        let mut h = Harness::new();
        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.enqueue_normal(CommandKind::Print, "print b\n", QueueMode::Append);
        h.driver.enqueue_urgent(CommandKind::BreakLine, "break f.c:3\n", false);

        assert_eq!(h.writes().len(), 1);
        assert_eq!(h.driver.queues().high_len(), 1);
        assert_eq!(h.driver.queues().low_len(), 1);

        h.driver.command_read();
        assert_eq!(h.driver.state(), DriverState::RunningLow);
        h.driver.receive_output(b"$1 = 1\n(gdb) ");

        // urgent work preempts at the next idle point
        assert_eq!(h.writes(), vec!["print a\n", "break f.c:3\n"]);
        assert_eq!(h.driver.state(), DriverState::CommandSent);
    }

    #[test]
    fn test_full_cycle_to_idle() {
        let mut h = Harness::new();
        let cmd = h.driver.enqueue_urgent(CommandKind::InfoLocals, "info locals\n", false);
        h.driver.command_read();
        assert_eq!(h.driver.state(), DriverState::Running);
        assert!(cmd.is_committed());

        h.driver.receive_output(b"x = 1\ny = 2\n");
        assert!(h.completions().is_empty());
        h.driver.receive_output(b"(gdb) ");

        let notes = h.notifications();
        assert_eq!(notes.len(), 2);
        match &notes[0] {
            DriverNotification::CommandCompleted { command, output } => {
                assert!(Arc::ptr_eq(command, &cmd));
                assert_eq!(output, "x = 1\ny = 2\n");
            }
            other => panic!("Expected completion, got {:?}", other),
        }
        assert!(matches!(notes[1], DriverNotification::EnterIdleState));
        assert_eq!(h.driver.state(), DriverState::Idle);
        assert!(h.driver.active_command().is_none());
        assert!(h.driver.buffered_output().is_empty());
    }

    #[test]
    fn test_resuming_command_reports_running() {
        let mut h = Harness::new();
        h.driver.enqueue_urgent(CommandKind::Continue, "cont\n", false);
        assert!(h.notifications().is_empty());

        h.driver.command_read();
        assert!(matches!(h.notifications().as_slice(), [DriverNotification::InferiorRunning]));

        h.driver.receive_output(b"(gdb) ");
        h.driver.enqueue_urgent(CommandKind::StepInstruction, "stepi\n", false);
        h.driver.command_read();
        assert!(!h
            .notifications()
            .iter()
            .any(|n| matches!(n, DriverNotification::InferiorRunning)));
    }

    #[test]
    fn test_output_before_ack_is_replayed_in_order() {
        let mut h = Harness::new();
        let cmd = h.driver.enqueue_normal(CommandKind::Backtrace, "bt\n", QueueMode::Append);

        h.driver.receive_output(b"#0 main () at a.c:3\n");
        h.driver.receive_output(b"#1 start ()\n(gdb) ");
        assert_eq!(h.driver.delayed_chunks(), 2);
        assert!(h.driver.buffered_output().is_empty());
        assert!(h.notifications().is_empty());

        h.driver.command_read();

        let completions = h.completions();
        assert_eq!(completions.len(), 1);
        assert!(Arc::ptr_eq(&completions[0].0, &cmd));
        assert_eq!(completions[0].1, "#0 main () at a.c:3\n#1 start ()\n");
        assert_eq!(h.driver.delayed_chunks(), 0);
        assert_eq!(h.driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_prompt_in_first_held_chunk_does_not_stall() {
        let mut h = Harness::new();
        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.enqueue_normal(CommandKind::Print, "print b\n", QueueMode::Append);

        h.driver.receive_output(b"$1 = 1\n(gdb) ");
        h.driver.receive_output(b"stray");
        h.driver.command_read();

        assert_eq!(h.completions().len(), 1);
        assert_eq!(h.writes(), vec!["print a\n", "print b\n"]);
        assert_eq!(h.driver.state(), DriverState::CommandSentLow);
    }

    #[test]
    fn test_prompt_framing_drops_trailing_fragment() {
        let mut h = Harness::with_prompt(Box::new(PatternPrompt::new(r"(?m)^\(gdb\) ").unwrap()));
        h.driver.enqueue_urgent(CommandKind::Print, "print v\n", false);
        h.driver.command_read();

        h.driver.receive_output(b"result-text\n(gdb) next-fragment");

        let completions = h.completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].1, "result-text\n");
        assert!(h.driver.buffered_output().is_empty());
    }

    #[test]
    fn test_stray_output_while_idle_is_ignored() {
        let mut h = Harness::new();
        h.driver.receive_output(b"(gdb) ");
        assert!(h.notifications().is_empty());
        assert!(h.driver.buffered_output().is_empty());
        assert_eq!(h.driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_urgent_with_clear_low_interrupts_running_low() {
        let mut h = Harness::new();
        let running = h.driver.enqueue_normal(CommandKind::InfoLocals, "info locals\n", QueueMode::Append);
        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.enqueue_normal(CommandKind::Print, "print b\n", QueueMode::Append);
        h.driver.command_read();
        assert_eq!(h.driver.state(), DriverState::RunningLow);

        let urgent = h.driver.enqueue_urgent(CommandKind::Continue, "cont\n", true);

        assert_eq!(h.driver.state(), DriverState::Interrupted);
        assert_eq!(h.interrupts(), 1);
        assert!(h.driver.active_command().is_none());
        assert_eq!(h.driver.queues().low_len(), 0);
        let high: Vec<_> = h.driver.queues().high().cloned().collect();
        assert_eq!(high.len(), 1);
        assert!(Arc::ptr_eq(&high[0], &urgent));

        // the debugger answers the interrupt with its prompt
        h.driver.receive_output(b"x = 1\n^C\n(gdb) ");

        assert!(h.completions().iter().all(|(cmd, _)| !Arc::ptr_eq(cmd, &running)));
        assert_eq!(h.writes(), vec!["info locals\n", "cont\n"]);
        assert_eq!(h.driver.state(), DriverState::CommandSent);
        assert!(Arc::ptr_eq(h.driver.active_command().unwrap(), &urgent));
    }

    #[test]
    fn test_clear_low_without_running_low_only_flushes() {
        let mut h = Harness::new();
        h.driver.enqueue_urgent(CommandKind::BreakLine, "break a.c:1\n", false);
        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.command_read();
        assert_eq!(h.driver.state(), DriverState::Running);

        h.driver.enqueue_urgent(CommandKind::Kill, "kill\n", true);
        assert_eq!(h.interrupts(), 0);
        assert_eq!(h.driver.state(), DriverState::Running);
        assert_eq!(h.driver.queues().low_len(), 0);
        assert!(h.driver.active_command().is_some());
    }

    #[test]
    fn test_interrupted_goes_idle_when_nothing_is_left() {
        let mut h = Harness::new();
        h.driver.enqueue_normal(CommandKind::InfoLocals, "info locals\n", QueueMode::Append);
        h.driver.command_read();
        h.driver.enqueue_urgent(CommandKind::Continue, "cont\n", true);
        h.driver.flush_commands(true);
        h.notifications();

        h.driver.receive_output(b"(gdb) ");
        assert_eq!(h.driver.state(), DriverState::Idle);
        assert!(matches!(h.notifications().as_slice(), [DriverNotification::EnterIdleState]));
    }

    #[test]
    fn test_merge_with_active_command() {
        let mut h = Harness::new();
        let a = h.driver.enqueue_normal(CommandKind::InfoLocals, "info locals\n", QueueMode::Merge);
        let b = h.driver.enqueue_normal(CommandKind::InfoLocals, "info locals\n", QueueMode::Merge);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(h.driver.queues().low_len(), 0);
        assert_eq!(h.writes().len(), 1);
    }

    #[test]
    fn test_drop_commands_for_expression() {
        let mut h = Harness::new();
        let active = h.driver.enqueue_normal_for_expr(CommandKind::Print, "print s\n", QueueMode::Append, ExprId(1));
        h.driver.enqueue_normal_for_expr(CommandKind::Print, "print s.a\n", QueueMode::Append, ExprId(2));
        h.driver.enqueue_normal(CommandKind::Backtrace, "bt\n", QueueMode::Append);

        let subtree = |candidate: ExprId| candidate.0 <= 2;
        assert_eq!(h.driver.drop_commands_for(&subtree), 1);
        assert!(Arc::ptr_eq(h.driver.active_command().unwrap(), &active));
        assert_eq!(h.driver.queues().low().map(|c| c.text()).collect::<Vec<_>>(), vec!["bt\n"]);
    }

    #[test]
    fn test_process_exit_resets_but_keeps_queues() {
        let mut h = Harness::new();
        h.driver.enqueue_normal(CommandKind::Run, "run\n", QueueMode::Append);
        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.command_read();
        h.driver.receive_output(b"Starting program\n");

        h.driver.handle_event(ProcessEvent::Exited(Some(0)));

        assert_eq!(h.driver.state(), DriverState::Idle);
        assert!(h.driver.buffered_output().is_empty());
        assert!(h.driver.active_command().is_none());
        assert!(!h.driver.has_transport());
        assert_eq!(h.driver.queues().low_len(), 1);

        // nothing is written without a debugger
        h.driver.enqueue_urgent(CommandKind::Kill, "kill\n", false);
        assert_eq!(h.writes(), vec!["run\n"]);
        assert_eq!(h.driver.queues().high_len(), 1);
    }

    #[test]
    fn test_startup_flushes_everything() {
        let mut h = Harness::new();
        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.enqueue_normal(CommandKind::Print, "print b\n", QueueMode::Append);

        let fresh = FakeTransport::default();
        h.driver.startup(Box::new(fresh.clone()));

        assert_eq!(h.driver.state(), DriverState::Idle);
        assert!(h.driver.active_command().is_none());
        assert!(h.driver.queues().is_empty());
        assert!(fresh.0.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn test_write_failure_requeues_command() {
        let mut h = Harness::new();
        h.wire.0.lock().unwrap().broken = true;

        let cmd = h.driver.enqueue_urgent(CommandKind::Print, "print a\n", false);
        assert_eq!(h.driver.state(), DriverState::Idle);
        assert!(h.driver.active_command().is_none());
        assert!(!h.driver.has_transport());
        assert!(Arc::ptr_eq(h.driver.queues().high().next().unwrap(), &cmd));
    }

    #[test]
    fn test_transcript_records_traffic_once() {
        #[derive(Clone, Default)]
        struct Sink(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut h = Harness::new();
        let sink = Sink::default();
        h.driver.set_transcript(Some(Transcript::from_writer(sink.clone())));

        h.driver.enqueue_urgent(CommandKind::Print, "print a\n", false);
        h.driver.receive_output(b"$1 = 1\n");
        h.driver.command_read();
        h.driver.receive_output(b"(gdb) ");
        h.driver.process_exited();

        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "print a\n$1 = 1\n(gdb) \n====== debugger exited ======\n");
    }

    #[test]
    fn test_detach_stops_writes() {
        let mut h = Harness::new();
        h.driver.enqueue_normal(CommandKind::InfoLocals, "info locals\n", QueueMode::Append);
        h.driver.command_read();

        h.driver.detach();
        assert!(!h.driver.has_transport());
        assert_eq!(h.driver.state(), DriverState::Idle);
        assert!(h.driver.active_command().is_none());

        h.driver.enqueue_normal(CommandKind::Print, "print a\n", QueueMode::Append);
        h.driver.enqueue_urgent(CommandKind::Kill, "kill\n", true);
        assert_eq!(h.driver.state(), DriverState::Idle);
        assert_eq!(h.writes(), vec!["info locals\n"]);
        assert_eq!(h.interrupts(), 0);
        assert_eq!(h.driver.queues().high_len(), 1);
    }

    #[test]
    fn test_large_output_survives_buffer_growth() {
        let mut h = Harness::new();
        let cmd = h.driver.enqueue_urgent(CommandKind::Disassemble, "disassemble\n", false);
        let initial = h.driver.output_capacity();
        assert_eq!(initial, DEFAULT_OUTPUT_CAPACITY);

        let payload: Vec<u8> = (0..DEFAULT_OUTPUT_CAPACITY * 5)
            .map(|i| b'a' + (i % 26) as u8)
            .collect();
        // first part arrives before the acknowledgment
        h.driver.receive_output(&payload[..1000]);
        h.driver.command_read();
        for chunk in payload[1000..].chunks(777) {
            h.driver.receive_output(chunk);
        }
        assert_eq!(h.driver.buffered_output(), payload.as_slice());
        assert!(h.driver.output_capacity() > initial);

        h.driver.receive_output(b"\n(gdb) ");

        let completions = h.completions();
        assert_eq!(completions.len(), 1);
        assert!(Arc::ptr_eq(&completions[0].0, &cmd));
        let mut expected = String::from_utf8(payload).unwrap();
        expected.push('\n');
        assert_eq!(completions[0].1, expected);
        assert!(h.driver.buffered_output().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "write acknowledged in state Idle")]
    fn test_ack_without_pending_write_panics_in_debug() {
        let mut h = Harness::new();
        h.driver.command_read();
    }
}
