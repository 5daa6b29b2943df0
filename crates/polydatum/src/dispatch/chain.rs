//! Onion composition of method middleware.
//!
//! Middleware is folded around a terminal handler once, when the manager is
//! built. The first middleware in the list is the outermost call and the last
//! sits closest to the method.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::request::Request;
use crate::errors::DalError;
use crate::fault::Fault;
use crate::service::MethodCall;

/// The rest of the chain, as seen by one middleware.
pub type Next<'a> = &'a dyn Fn(&mut Request) -> Result<Value, Fault>;

/// A fully composed handler.
pub type Handler = Arc<dyn Fn(&mut Request) -> Result<Value, Fault> + Send + Sync>;

/// Code wrapping a single command invocation.
///
/// Implementations call `next` to continue, or return early to abort.
pub trait MethodMiddleware: Send + Sync {
    /// Handles `request`, delegating to `next` to continue the chain.
    ///
    /// # Errors
    ///
    /// Returns the fault raised by this middleware or by anything below it.
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Value, Fault>;
}

impl<F> MethodMiddleware for F
where
    F: Fn(&mut Request, Next<'_>) -> Result<Value, Fault> + Send + Sync,
{
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Value, Fault> {
        self(request, next)
    }
}

/// Boxes a closure as method middleware.
///
/// Going through this function pins the closure's signature, which plain
/// closure literals passed to generic parameters cannot always infer.
pub fn from_fn<F>(middleware: F) -> Arc<dyn MethodMiddleware>
where
    F: Fn(&mut Request, Next<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
{
    Arc::new(middleware)
}

/// Default terminal handler: invokes the resolved target.
///
/// # Errors
///
/// Returns [`DalError::DalMethod`] for the full path when no middleware set a
/// target, or whatever the method returns.
pub fn invoke_target(request: &mut Request) -> Result<Value, Fault> {
    let target = request
        .target()
        .cloned()
        .ok_or_else(|| DalError::dal_method(request.path()))?;
    target.invoke(&MethodCall::new(
        request.context(),
        request.path(),
        request.args(),
    ))
}

/// Method middleware folded around a terminal handler.
#[derive(Clone)]
pub struct MethodChain {
    handler: Handler,
    layers: usize,
}

impl MethodChain {
    /// Folds `layers` around `terminal`, first layer outermost.
    #[must_use]
    pub fn compose(layers: Vec<Arc<dyn MethodMiddleware>>, terminal: Handler) -> Self {
        let count = layers.len();
        let handler = layers.into_iter().rev().fold(terminal, |next, layer| {
            Arc::new(move |request: &mut Request| layer.handle(request, &*next)) as Handler
        });
        Self {
            handler,
            layers: count,
        }
    }

    /// Runs `request` through the chain.
    ///
    /// # Errors
    ///
    /// Returns the fault raised by any middleware, the terminal handler, or
    /// the method.
    pub fn dispatch(&self, request: &mut Request) -> Result<Value, Fault> {
        (self.handler)(request)
    }

    /// Number of middleware layers around the terminal handler.
    #[must_use]
    pub const fn layers(&self) -> usize {
        self.layers
    }
}

impl fmt::Debug for MethodChain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MethodChain")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
