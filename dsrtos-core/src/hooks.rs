//! Hook collaborators: caller-supplied callbacks the kernel invokes on
//! fatal conditions it cannot itself recover from.

use crate::error::Error;
use crate::ids::TaskId;

/// Invoked when a fatal error (`Error::requires_shutdown` is `true`) is
/// raised anywhere in the kernel. Implementations typically log the error
/// and either halt or reset the system; they must not panic.
pub trait ErrorHook {
    fn on_fatal_error(&self, error: Error);
}

/// Invoked when the stack manager (C3) detects a canary corruption or a
/// watermark crossing the configured safety margin.
pub trait OverflowHook {
    fn on_stack_overflow(&self, task: TaskId);

    /// Called when a task's stack usage crosses into the safety margin but
    /// has not yet corrupted the canary. Not fatal by itself.
    fn on_watermark_warning(&self, task: TaskId, bytes_remaining: usize) {
        let _ = (task, bytes_remaining);
    }
}

/// An `ErrorHook`/`OverflowHook` pair that does nothing; the default before
/// an application installs its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl ErrorHook for NullHooks {
    fn on_fatal_error(&self, _error: Error) {}
}

impl OverflowHook for NullHooks {
    fn on_stack_overflow(&self, _task: TaskId) {}
}
