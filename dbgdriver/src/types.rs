/// Driver types and data structures
///
/// This module defines the commands handed to the debugger, the queueing
/// modes and the discrete states of the driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Logical category of a debugger command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Initialize,
    Tty,
    Executable,
    CoreFile,
    Attach,
    SetArgs,
    SetEnv,
    UnsetEnv,
    SetOption,
    ChangeDir,
    Backtrace,
    Run,
    Continue,
    Step,
    StepInstruction,
    Next,
    NextInstruction,
    Finish,
    Until,
    Kill,
    BreakText,
    BreakLine,
    TempBreakLine,
    BreakAddress,
    TempBreakAddress,
    Watchpoint,
    Delete,
    Enable,
    Disable,
    Condition,
    Ignore,
    Print,
    PrintDeref,
    PrintStruct,
    SetVariable,
    SetPc,
    Frame,
    Thread,
    InfoLocals,
    InfoRegisters,
    InfoLine,
    InfoThreads,
    InfoBreakpoints,
    InfoSharedLib,
    Examine,
    Disassemble,
    FindType,
    Other,
}

impl CommandKind {
    /// Whether committing a command of this kind lets the inferior run
    pub fn resumes_inferior(self) -> bool {
        matches!(
            self,
            CommandKind::Run
                | CommandKind::Continue
                | CommandKind::Next
                | CommandKind::Step
                | CommandKind::Finish
                | CommandKind::Until
        )
    }

    /// Classify a typed gdb command line by its first word
    pub fn from_command_text(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(first) = words.next() else {
            return CommandKind::Other;
        };

        match first {
            "run" | "r" | "start" => CommandKind::Run,
            "continue" | "cont" | "c" => CommandKind::Continue,
            "step" | "s" => CommandKind::Step,
            "stepi" | "si" => CommandKind::StepInstruction,
            "next" | "n" => CommandKind::Next,
            "nexti" | "ni" => CommandKind::NextInstruction,
            "finish" | "fin" => CommandKind::Finish,
            "until" | "u" => CommandKind::Until,
            "kill" | "k" => CommandKind::Kill,
            "break" | "b" | "br" => match words.next() {
                Some(loc) if loc.starts_with('*') => CommandKind::BreakAddress,
                Some(loc) if loc.contains(':') => CommandKind::BreakLine,
                _ => CommandKind::BreakText,
            },
            "tbreak" | "tb" => match words.next() {
                Some(loc) if loc.starts_with('*') => CommandKind::TempBreakAddress,
                _ => CommandKind::TempBreakLine,
            },
            "watch" | "rwatch" | "awatch" => CommandKind::Watchpoint,
            "delete" | "d" => CommandKind::Delete,
            "enable" => CommandKind::Enable,
            "disable" => CommandKind::Disable,
            "condition" => CommandKind::Condition,
            "ignore" => CommandKind::Ignore,
            "print" | "p" | "output" => match words.next() {
                Some(expr) if expr.starts_with('*') => CommandKind::PrintDeref,
                _ => CommandKind::Print,
            },
            "set" => match words.next() {
                Some("var" | "variable") => CommandKind::SetVariable,
                Some("args") => CommandKind::SetArgs,
                Some("$pc") => CommandKind::SetPc,
                _ => CommandKind::SetOption,
            },
            "frame" | "f" | "up" | "down" => CommandKind::Frame,
            "thread" => CommandKind::Thread,
            "backtrace" | "bt" | "where" => CommandKind::Backtrace,
            "info" | "i" => match words.next() {
                Some("locals") => CommandKind::InfoLocals,
                Some("registers" | "all-registers") => CommandKind::InfoRegisters,
                Some("line") => CommandKind::InfoLine,
                Some("threads") => CommandKind::InfoThreads,
                Some("breakpoints" | "break" | "b") => CommandKind::InfoBreakpoints,
                Some("sharedlibrary") => CommandKind::InfoSharedLib,
                _ => CommandKind::Other,
            },
            "x" => CommandKind::Examine,
            "disassemble" => CommandKind::Disassemble,
            "ptype" | "whatis" => CommandKind::FindType,
            "file" | "exec-file" => CommandKind::Executable,
            "core" | "core-file" => CommandKind::CoreFile,
            "attach" => CommandKind::Attach,
            "tty" => CommandKind::Tty,
            "cd" => CommandKind::ChangeDir,
            "unset" => CommandKind::UnsetEnv,
            _ => CommandKind::Other,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How a low-priority command is placed into its queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    /// Always append a new entry
    Append,
    /// Reuse an equal active or queued command, otherwise append
    Merge,
    /// Like `Merge`, but an equal queued command moves to the front
    MergeAndPromote,
}

/// Which queue a command was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

/// Current state of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No command is in flight
    Idle,
    /// A high-priority command was written, acknowledgment pending
    CommandSent,
    /// A low-priority command was written, acknowledgment pending
    CommandSentLow,
    /// The debugger works on a committed high-priority command
    Running,
    /// The debugger works on a committed low-priority command
    RunningLow,
    /// A running low-priority command was interrupted
    Interrupted,
}

impl DriverState {
    /// The write of the active command has not been acknowledged yet
    pub fn awaits_acknowledgment(self) -> bool {
        matches!(self, DriverState::CommandSent | DriverState::CommandSentLow)
    }
}

/// Opaque reference to a node of the expression tree maintained by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u64);

/// Ancestry test supplied by the expression tree
///
/// The implementor stands for a subtree root; it answers whether
/// `candidate` is that root or one of its descendants.
pub trait ExprAncestry {
    fn is_ancestor_or_self(&self, candidate: ExprId) -> bool;
}

impl ExprAncestry for ExprId {
    fn is_ancestor_or_self(&self, candidate: ExprId) -> bool {
        *self == candidate
    }
}

impl<F> ExprAncestry for F
where
    F: Fn(ExprId) -> bool,
{
    fn is_ancestor_or_self(&self, candidate: ExprId) -> bool {
        self(candidate)
    }
}

/// One request to the debugger
#[derive(Debug)]
pub struct Command {
    id: u64,
    kind: CommandKind,
    text: String,
    expr: Option<ExprId>,
    committed: AtomicBool,
}

/// Shared handle to a command; identity is the allocation
pub type CommandHandle = Arc<Command>;

impl Command {
    /// Create a new, uncommitted command
    pub fn new(kind: CommandKind, text: impl Into<String>) -> Self {
        Self {
            id: NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            text: text.into(),
            expr: None,
            committed: AtomicBool::new(false),
        }
    }

    /// Attach the expression this command is about
    pub fn with_expr(mut self, expr: ExprId) -> Self {
        self.expr = Some(expr);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The literal text written to the debugger
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> Option<ExprId> {
        self.expr
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Mark the command committed, returning whether it already was
    pub(crate) fn commit(&self) -> bool {
        self.committed.swap(true, Ordering::AcqRel)
    }

    /// Same category and same text
    pub fn is_equal_request(&self, kind: CommandKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}
