//! Canonical error taxonomy shared by every kernel entry point.
//!
//! `r3_core` generates a separate small error enum per operation
//! (`ActivateTaskError`, `LockMutexError`, ...) and converts each into a
//! handful of public aliases. This kernel collapses that into one `Error`
//! carrying a `Kind`, with `severity()` and `category()` derived from the
//! kind so callers never have to match on operation-specific variants.

use core::fmt;

/// Which of the six families an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Category {
    Parameter,
    State,
    Resource,
    Hardware,
    System,
    Operation,
}

/// How serious an error is, independent of its category. Ordered from
/// least to most severe so callers can threshold on it directly
/// (`severity() >= Severity::Critical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Purely diagnostic; the operation was declined but nothing was
    /// attempted and no caller expectation was violated.
    Info,
    /// Caller can retry or choose a different input; no kernel state changed.
    Warning,
    /// The requested operation did not happen but the kernel remains consistent.
    Error,
    /// A subsystem is degraded and may not recover without intervention,
    /// but the kernel's core invariants still hold.
    Critical,
    /// The kernel can no longer guarantee its invariants; see `requires_shutdown`.
    Fatal,
}

/// A specific error condition. New variants may be added; match with a
/// wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Kind {
    // Parameter
    InvalidPriority,
    InvalidTaskId,
    InvalidPluginId,
    InvalidResourceId,
    NullStack,
    BadConfig,

    // State
    TaskNotDormant,
    TaskNotReady,
    TaskAlreadyActive,
    WouldDeadlock,
    RestartLimitExceeded,
    PluginNotRegistered,
    PluginAlreadyActive,
    SwitchInProgress,

    // Resource
    TaskTableFull,
    PluginTableFull,
    ChainPoolExhausted,
    QueueOverflow,

    // Hardware
    StackOverflow,
    TimerUnavailable,
    PortFault,

    // System
    IntegrityViolation,
    ChecksumMismatch,
    OutOfTicks,

    // Operation
    NotSupported,
    Timeout,
    RolledBack,
}

impl Kind {
    pub const fn category(self) -> Category {
        use Kind::*;
        match self {
            InvalidPriority | InvalidTaskId | InvalidPluginId | InvalidResourceId | NullStack
            | BadConfig => Category::Parameter,
            TaskNotDormant | TaskNotReady | TaskAlreadyActive | WouldDeadlock
            | RestartLimitExceeded | PluginNotRegistered | PluginAlreadyActive
            | SwitchInProgress => Category::State,
            TaskTableFull | PluginTableFull | ChainPoolExhausted | QueueOverflow => {
                Category::Resource
            }
            StackOverflow | TimerUnavailable | PortFault => Category::Hardware,
            IntegrityViolation | ChecksumMismatch | OutOfTicks => Category::System,
            NotSupported | Timeout | RolledBack => Category::Operation,
        }
    }

    pub const fn severity(self) -> Severity {
        use Kind::*;
        match self {
            NotSupported => Severity::Info,
            InvalidPriority | InvalidTaskId | InvalidPluginId | InvalidResourceId | NullStack
            | BadConfig | Timeout | TaskNotDormant | TaskNotReady | TaskAlreadyActive
            | WouldDeadlock | RestartLimitExceeded | PluginNotRegistered | PluginAlreadyActive
            | SwitchInProgress | ChecksumMismatch | OutOfTicks => Severity::Warning,
            TaskTableFull | PluginTableFull | ChainPoolExhausted | QueueOverflow | RolledBack => {
                Severity::Error
            }
            TimerUnavailable | PortFault => Severity::Critical,
            StackOverflow | IntegrityViolation => Severity::Fatal,
        }
    }

    pub const fn as_str(self) -> &'static str {
        use Kind::*;
        match self {
            InvalidPriority => "invalid priority",
            InvalidTaskId => "invalid task id",
            InvalidPluginId => "invalid plugin id",
            InvalidResourceId => "invalid resource id",
            NullStack => "null or misaligned stack",
            BadConfig => "invalid configuration",
            TaskNotDormant => "task not dormant",
            TaskNotReady => "task not ready",
            TaskAlreadyActive => "task already active",
            WouldDeadlock => "operation would deadlock",
            RestartLimitExceeded => "task restart limit exceeded",
            PluginNotRegistered => "plugin not registered",
            PluginAlreadyActive => "plugin already active",
            SwitchInProgress => "scheduler switch already in progress",
            TaskTableFull => "task table full",
            PluginTableFull => "plugin table full",
            ChainPoolExhausted => "inheritance chain pool exhausted",
            QueueOverflow => "ready queue overflow",
            StackOverflow => "stack overflow detected",
            TimerUnavailable => "hardware timer unavailable",
            PortFault => "port operation faulted",
            IntegrityViolation => "queue integrity violation",
            ChecksumMismatch => "plugin descriptor checksum mismatch",
            OutOfTicks => "tick counter exhausted",
            NotSupported => "operation not supported",
            Timeout => "operation timed out",
            RolledBack => "scheduler switch rolled back",
        }
    }
}

/// The single error type returned by every fallible kernel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Error {
    kind: Kind,
}

impl Error {
    pub const fn new(kind: Kind) -> Self {
        Self { kind }
    }

    pub const fn kind(self) -> Kind {
        self.kind
    }

    pub const fn category(self) -> Category {
        self.kind.category()
    }

    pub const fn severity(self) -> Severity {
        self.kind.severity()
    }

    /// Whether this error leaves the kernel in a state where continuing to
    /// run is unsafe and an error hook should be invoked before any further
    /// scheduling decision is made.
    pub const fn requires_shutdown(self) -> bool {
        matches!(self.kind.severity(), Severity::Fatal)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())
    }
}

impl From<Kind> for Error {
    fn from(kind: Kind) -> Self {
        Error::new(kind)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_require_shutdown() {
        let e = Error::new(Kind::StackOverflow);
        assert!(e.requires_shutdown());
        assert_eq!(e.category(), Category::Hardware);
    }

    #[test]
    fn recoverable_kinds_do_not_require_shutdown() {
        let e = Error::new(Kind::InvalidPriority);
        assert!(!e.requires_shutdown());
        assert_eq!(e.severity(), Severity::Warning);
    }

    #[test]
    fn severities_are_ordered_least_to_most_severe() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert!(Severity::Critical < Severity::Fatal);
    }
}
