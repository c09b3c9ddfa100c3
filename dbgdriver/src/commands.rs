/// Command queue management
///
/// This module holds the pending commands of a driver: a strict FIFO for
/// high-priority commands and a low-priority queue that can merge and
/// promote equal requests.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::types::{Command, CommandHandle, CommandKind, ExprAncestry, ExprId, Priority, QueueMode};

/// The pending work of one driver
#[derive(Debug, Default)]
pub struct CommandQueues {
    hipri: VecDeque<CommandHandle>,
    lopri: VecDeque<CommandHandle>,
}

impl CommandQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new command to the high-priority queue
    pub fn push_urgent(&mut self, kind: CommandKind, text: &str) -> CommandHandle {
        let cmd = Arc::new(Command::new(kind, text));
        self.hipri.push_back(cmd.clone());
        cmd
    }

    /// Place a command into the low-priority queue according to `mode`
    ///
    /// In the merging modes an equal `active` command or an equal queued
    /// command is returned instead of creating a new one.
    pub fn push_normal(
        &mut self,
        kind: CommandKind,
        text: &str,
        expr: Option<ExprId>,
        mode: QueueMode,
        active: Option<&CommandHandle>,
    ) -> CommandHandle {
        if mode != QueueMode::Append {
            if let Some(active) = active.filter(|cmd| cmd.is_equal_request(kind, text)) {
                log::trace!("merged into active command #{}", active.id());
                return active.clone();
            }

            if let Some(pos) = self.lopri.iter().position(|cmd| cmd.is_equal_request(kind, text)) {
                if mode == QueueMode::MergeAndPromote && pos > 0 {
                    if let Some(cmd) = self.lopri.remove(pos) {
                        self.lopri.push_front(cmd);
                    }
                    return self.lopri[0].clone();
                }
                return self.lopri[pos].clone();
            }
        }

        let mut cmd = Command::new(kind, text);
        if let Some(expr) = expr {
            cmd = cmd.with_expr(expr);
        }
        let cmd = Arc::new(cmd);
        self.lopri.push_back(cmd.clone());
        cmd
    }

    /// Put a command back at the head of its queue
    pub(crate) fn push_front(&mut self, priority: Priority, cmd: CommandHandle) {
        match priority {
            Priority::High => self.hipri.push_front(cmd),
            Priority::Low => self.lopri.push_front(cmd),
        }
    }

    /// Take the next command; high priority always wins
    pub fn pop_next(&mut self) -> Option<(CommandHandle, Priority)> {
        if let Some(cmd) = self.hipri.pop_front() {
            return Some((cmd, Priority::High));
        }
        self.lopri.pop_front().map(|cmd| (cmd, Priority::Low))
    }

    pub fn flush_high(&mut self) -> usize {
        let n = self.hipri.len();
        self.hipri.clear();
        n
    }

    pub fn flush_low(&mut self) -> usize {
        let n = self.lopri.len();
        self.lopri.clear();
        n
    }

    /// Drop the high-priority queue, and the low-priority one unless `hipri_only`
    pub fn flush(&mut self, hipri_only: bool) {
        self.flush_high();
        if !hipri_only {
            self.flush_low();
        }
    }

    /// Remove low-priority commands whose expression lies in `scope`
    pub fn drop_matching(&mut self, scope: &dyn ExprAncestry) -> usize {
        let before = self.lopri.len();
        self.lopri.retain(|cmd| match cmd.expr() {
            Some(expr) if scope.is_ancestor_or_self(expr) => {
                log::debug!("removing obsolete command #{}: {}", cmd.id(), cmd.text().trim_end());
                false
            }
            _ => true,
        });
        before - self.lopri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hipri.is_empty() && self.lopri.is_empty()
    }

    pub fn high_len(&self) -> usize {
        self.hipri.len()
    }

    pub fn low_len(&self) -> usize {
        self.lopri.len()
    }

    pub fn high(&self) -> impl Iterator<Item = &CommandHandle> {
        self.hipri.iter()
    }

    pub fn low(&self) -> impl Iterator<Item = &CommandHandle> {
        self.lopri.iter()
    }
}
