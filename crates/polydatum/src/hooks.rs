//! Lifecycle hooks invoked around every context.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::fault::Fault;

/// Extension points around context setup and teardown.
///
/// Every method defaults to doing nothing.
pub trait ContextHooks: Send + Sync {
    /// Runs after the context is pushed onto the active stack and before
    /// middleware is set up. An error aborts setup.
    fn setup(&self, _context: &ExecutionContext) -> Result<(), Fault> {
        Ok(())
    }

    /// Runs after middleware teardown and before resources close. Errors are
    /// recorded as exit errors rather than propagated.
    fn teardown(&self, _context: &ExecutionContext, _fault: Option<&Fault>) -> Result<(), Fault> {
        Ok(())
    }

    /// Always runs last, before the context leaves the active stack.
    fn finished(&self, _context: &ExecutionContext, _fault: Option<&Fault>) {}
}

impl<T> ContextHooks for Arc<T>
where
    T: ContextHooks + ?Sized,
{
    fn setup(&self, context: &ExecutionContext) -> Result<(), Fault> {
        (**self).setup(context)
    }

    fn teardown(&self, context: &ExecutionContext, fault: Option<&Fault>) -> Result<(), Fault> {
        (**self).teardown(context, fault)
    }

    fn finished(&self, context: &ExecutionContext, fault: Option<&Fault>) {
        (**self).finished(context, fault);
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ContextHooks for NoopHooks {}
