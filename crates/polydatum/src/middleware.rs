//! Context middleware wrapping the whole lifetime of a context.
//!
//! Middleware providers are acquired in registration order when a context
//! is entered and released in reverse order when it exits. Unlike resources,
//! middleware may suppress or replace the in-flight fault.

use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::fault::Fault;
use crate::protocol::{Provider, Step};

/// Provider created for one middleware in one context.
pub type MiddlewareProvider = Box<dyn Provider<Ready = ()>>;

/// Factory for per-context middleware providers.
pub trait ContextMiddleware: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Builds a fresh provider for `context`.
    fn provider(&self, context: &ExecutionContext) -> MiddlewareProvider;
}

/// How [`FnMiddleware`] treats the in-flight fault on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Let the fault continue down the middleware stack.
    Propagate,
    /// Swallow the fault.
    Suppress,
}

type EnterFn = dyn Fn(&ExecutionContext) -> Result<(), Fault> + Send + Sync;
type LeaveFn = dyn Fn(&ExecutionContext, Option<&Fault>) -> Result<Disposition, Fault> + Send + Sync;

/// Middleware built from an enter closure and a leave closure.
pub struct FnMiddleware {
    name: String,
    enter: Arc<EnterFn>,
    leave: Arc<LeaveFn>,
}

impl FnMiddleware {
    /// Creates middleware from two closures.
    ///
    /// `leave` runs during teardown. Returning an error replaces the
    /// in-flight fault.
    pub fn new<E, L>(name: impl Into<String>, enter: E, leave: L) -> Self
    where
        E: Fn(&ExecutionContext) -> Result<(), Fault> + Send + Sync + 'static,
        L: Fn(&ExecutionContext, Option<&Fault>) -> Result<Disposition, Fault>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            enter: Arc::new(enter),
            leave: Arc::new(leave),
        }
    }
}

impl fmt::Debug for FnMiddleware {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ContextMiddleware for FnMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self, _context: &ExecutionContext) -> MiddlewareProvider {
        Box::new(FnMiddlewareProvider {
            enter: Arc::clone(&self.enter),
            leave: Arc::clone(&self.leave),
        })
    }
}

struct FnMiddlewareProvider {
    enter: Arc<EnterFn>,
    leave: Arc<LeaveFn>,
}

impl Provider for FnMiddlewareProvider {
    type Ready = ();

    fn acquire(&mut self, context: &ExecutionContext) -> Result<Step<()>, Fault> {
        (self.enter)(context)?;
        Ok(Step::Ready(()))
    }

    fn release(
        &mut self,
        context: &ExecutionContext,
        fault: Option<&Fault>,
    ) -> Result<Step<()>, Fault> {
        match ((self.leave)(context, fault)?, fault) {
            (Disposition::Propagate, Some(in_flight)) => Err(in_flight.clone()),
            (Disposition::Propagate | Disposition::Suppress, _) => Ok(Step::Done),
        }
    }
}
