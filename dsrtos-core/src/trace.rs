//! The `Trace` collaborator: an O(1) leveled sink the kernel calls on
//! scheduling events, compiled out entirely when the `trace` feature of
//! `dsrtos-kernel` is disabled.

/// Relative importance of a trace event, cheapest filtering test first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A destination for kernel trace events. Implementations must not block
/// and must not allocate; the kernel may call `emit` from within a
/// critical section.
pub trait TraceSink {
    fn emit(&self, level: TraceLevel, event: &str);

    /// Lowest level this sink will forward; used by callers to skip
    /// formatting work for events that would be dropped anyway.
    fn min_level(&self) -> TraceLevel {
        TraceLevel::Debug
    }
}

/// A `TraceSink` that discards every event. The default when tracing is
/// compiled out or no sink has been installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _level: TraceLevel, _event: &str) {}

    fn min_level(&self) -> TraceLevel {
        TraceLevel::Error
    }
}
