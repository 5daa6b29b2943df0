//! Request-scoped execution contexts.
//!
//! An [`ExecutionContext`] is one unit of work. Entering it runs the
//! context middleware; resources are created on first use; exiting tears
//! everything down in a fixed order:
//!
//! 1. Middleware is released in reverse registration order. Each sees the
//!    in-flight fault and may pass it through, suppress it, or replace it.
//! 2. The teardown hook runs. Its errors are recorded, not raised.
//! 3. Every resource that became ready is released exactly once. Their
//!    errors are recorded, not raised.
//! 4. The surviving fault, if any, is returned to the caller.
//! 5. The final hook runs and the context leaves the active stack.
//!
//! Recorded errors are available from [`ExecutionContext::exit_errors`].

mod stack;

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::dispatch::Dal;
use crate::errors::DalError;
use crate::fault::Fault;
use crate::manager::DataManager;
use crate::meta::Meta;
use crate::middleware::MiddlewareProvider;
use crate::protocol::{self, Closing, Step};
use crate::resource::{ResourceProvider, ResourceValue};

pub use self::stack::depth as active_depth;
pub(crate) use self::stack::top_for as innermost_for;

/// Tracing target for context lifecycle events.
pub(crate) const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::context");

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle states of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built but never entered.
    Created,
    /// Middleware is being set up.
    Setup,
    /// Setup completed; the body is running.
    Active,
    /// Teardown is in progress.
    Exiting,
    /// Teardown finished. The context cannot be used again.
    Exited,
}

impl LifecycleState {
    /// Canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Setup => "setup",
            Self::Active => "active",
            Self::Exiting => "exiting",
            Self::Exited => "exited",
        }
    }

    /// Returns `true` when new resources may be created.
    #[must_use]
    pub const fn can_create_resources(self) -> bool {
        matches!(self, Self::Setup | Self::Active)
    }

    /// Returns `true` between the start of setup and the end of teardown.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Setup | Self::Active | Self::Exiting)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Where a recorded exit error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSource {
    /// A resource failed while closing.
    Resource(String),
    /// The teardown hook failed.
    TeardownHook,
}

impl fmt::Display for ExitSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(name) => write!(formatter, "resource '{name}'"),
            Self::TeardownHook => formatter.write_str("teardown hook"),
        }
    }
}

/// An error captured during teardown instead of being raised.
#[derive(Debug, Clone)]
pub struct ExitError {
    source: ExitSource,
    fault: Fault,
}

impl ExitError {
    /// Where the error came from.
    #[must_use]
    pub fn source(&self) -> &ExitSource {
        &self.source
    }

    /// The captured fault.
    #[must_use]
    pub fn fault(&self) -> &Fault {
        &self.fault
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.source, self.fault)
    }
}

struct ContextInner {
    id: u64,
    manager: Arc<DataManager>,
    meta: Meta,
    state: Cell<LifecycleState>,
    resources: RefCell<HashMap<String, ResourceValue>>,
    providers: RefCell<Vec<(String, ResourceProvider)>>,
    middleware: RefCell<Vec<(String, MiddlewareProvider)>>,
    exit_errors: RefCell<Vec<ExitError>>,
}

/// Handle to one unit of work.
///
/// Clones share the same context. Contexts are confined to the thread that
/// created them.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Rc<ContextInner>,
}

impl ExecutionContext {
    pub(crate) fn new(manager: Arc<DataManager>, meta: Meta) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                manager,
                meta,
                state: Cell::new(LifecycleState::Created),
                resources: RefCell::new(HashMap::new()),
                providers: RefCell::new(Vec::new()),
                middleware: RefCell::new(Vec::new()),
                exit_errors: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Process-unique identifier, used in log events.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Read-only metadata supplied at construction.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.inner.meta
    }

    /// The manager that owns this context.
    #[must_use]
    pub fn manager(&self) -> &Arc<DataManager> {
        &self.inner.manager
    }

    /// Command entry point bound to this context's manager.
    #[must_use]
    pub fn dal(&self) -> Dal {
        self.inner.manager.dal()
    }

    /// Returns `true` when both handles refer to the same context.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` once `name` has been created in this context.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.resources.borrow().contains_key(name)
    }

    /// Errors captured while closing resources or running the teardown hook.
    #[must_use]
    pub fn exit_errors(&self) -> Vec<ExitError> {
        self.inner.exit_errors.borrow().clone()
    }

    /// Returns the resource `name` as a `T`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Fails as [`ExecutionContext::resource_value`] does, and with
    /// [`DalError::ResourceType`] when the value is not a `T`.
    pub fn resource<T>(&self, name: &str) -> Result<Arc<T>, Fault>
    where
        T: Any + Send + Sync,
    {
        self.resource_value(name)?
            .downcast::<T>()
            .map_err(|_| DalError::resource_type(name, type_name::<T>()).into())
    }

    /// Returns the resource `name`, creating it on first use.
    ///
    /// Cached values are readable during setup, while active, and during
    /// teardown. New values can only be created during setup or while
    /// active.
    ///
    /// # Errors
    ///
    /// - [`DalError::InvalidState`] outside the permitted states.
    /// - [`DalError::UnknownResource`] when nothing is registered as `name`.
    /// - [`DalError::ResourceSetup`] when the provider finishes without a
    ///   value.
    /// - Any fault raised by the provider while acquiring, unchanged.
    pub fn resource_value(&self, name: &str) -> Result<ResourceValue, Fault> {
        let state = self.state();
        if !state.is_open() {
            return Err(DalError::invalid_state("resource access", state).into());
        }
        if let Some(value) = self.inner.resources.borrow().get(name) {
            return Ok(Arc::clone(value));
        }
        if !state.can_create_resources() {
            return Err(DalError::invalid_state("resource creation", state).into());
        }

        let resource = self
            .inner
            .manager
            .resource(name)
            .ok_or_else(|| DalError::unknown_resource(name))?;
        let mut provider = resource.provider(self);
        match provider.acquire(self)? {
            Step::Ready(value) => {
                debug!(
                    target: CONTEXT_TARGET,
                    context = self.id(),
                    resource = name,
                    "resource ready"
                );
                self.inner
                    .resources
                    .borrow_mut()
                    .insert(name.to_owned(), Arc::clone(&value));
                self.inner
                    .providers
                    .borrow_mut()
                    .push((name.to_owned(), provider));
                Ok(value)
            }
            Step::Done => Err(DalError::resource_setup(name).into()),
        }
    }

    /// Enters the context: pushes it onto the active stack, runs the setup
    /// hook, and sets up every middleware in registration order.
    ///
    /// When setup fails, teardown runs before the error is returned, so any
    /// middleware or resource that did start is cleaned up. A panic during
    /// setup tears the context down the same way before unwinding further.
    ///
    /// # Errors
    ///
    /// - [`DalError::Reuse`] when the context was entered before.
    /// - [`DalError::MiddlewareSetup`] when middleware opts out of setup.
    /// - The setup failure, or the fault that replaced it during teardown.
    pub fn enter(&self) -> Result<(), Fault> {
        if self.state() != LifecycleState::Created {
            return Err(DalError::Reuse.into());
        }
        self.set_state(LifecycleState::Setup);
        debug!(target: CONTEXT_TARGET, context = self.id(), "entering context");

        let guard = ExitOnUnwind::new(self, "context setup panicked");
        let setup = self.setup();
        std::mem::forget(guard);
        if let Err(failure) = setup {
            debug!(
                target: CONTEXT_TARGET,
                context = self.id(),
                error = %failure,
                "context setup failed"
            );
            return Err(self.exit(Some(failure.clone())).err().unwrap_or(failure));
        }

        self.set_state(LifecycleState::Active);
        Ok(())
    }

    fn setup(&self) -> Result<(), Fault> {
        stack::push(self.clone());
        self.inner.manager.hooks().setup(self)?;

        let pending: Vec<(String, MiddlewareProvider)> = self
            .inner
            .manager
            .context_middleware()
            .iter()
            .map(|middleware| (middleware.name().to_owned(), middleware.provider(self)))
            .collect();

        for (name, mut provider) in pending {
            match provider.acquire(self)? {
                Step::Ready(()) => self.inner.middleware.borrow_mut().push((name, provider)),
                Step::Done => return Err(DalError::middleware_setup(name).into()),
            }
        }
        Ok(())
    }

    /// Exits the context, running teardown with `fault` in flight.
    ///
    /// # Errors
    ///
    /// - [`DalError::InvalidState`] when the context is not in setup or
    ///   active.
    /// - The fault that survived middleware teardown.
    pub fn exit(&self, fault: Option<Fault>) -> Result<(), Fault> {
        let state = self.state();
        if !state.can_create_resources() {
            return Err(DalError::invalid_state("context exit", state).into());
        }
        self.set_state(LifecycleState::Exiting);
        debug!(
            target: CONTEXT_TARGET,
            context = self.id(),
            fault = fault.as_ref().map(tracing::field::display),
            "exiting context"
        );

        let in_flight = self.release_middleware(fault);

        if let Err(error) = self
            .inner
            .manager
            .hooks()
            .teardown(self, in_flight.as_ref())
        {
            self.record_exit_error(ExitSource::TeardownHook, error);
        }

        self.release_resources(in_flight.as_ref());

        self.inner
            .manager
            .hooks()
            .finished(self, in_flight.as_ref());
        stack::remove(self);
        self.inner.resources.borrow_mut().clear();
        self.set_state(LifecycleState::Exited);
        debug!(target: CONTEXT_TARGET, context = self.id(), "context exited");

        in_flight.map_or(Ok(()), Err)
    }

    fn release_middleware(&self, fault: Option<Fault>) -> Option<Fault> {
        let providers = std::mem::take(&mut *self.inner.middleware.borrow_mut());
        let mut in_flight = fault;
        for (name, mut provider) in providers.into_iter().rev() {
            match protocol::close(provider.as_mut(), self, in_flight.as_ref(), &name) {
                Closing::Closed | Closing::PassedThrough => {}
                Closing::Suppressed => {
                    debug!(
                        target: CONTEXT_TARGET,
                        context = self.id(),
                        middleware = %name,
                        "middleware suppressed fault"
                    );
                    in_flight = None;
                }
                Closing::Raised(replacement) => {
                    debug!(
                        target: CONTEXT_TARGET,
                        context = self.id(),
                        middleware = %name,
                        error = %replacement,
                        "middleware raised during teardown"
                    );
                    in_flight = Some(replacement);
                }
            }
        }
        in_flight
    }

    fn release_resources(&self, in_flight: Option<&Fault>) {
        let providers = std::mem::take(&mut *self.inner.providers.borrow_mut());
        for (name, mut provider) in providers.into_iter().rev() {
            if let Closing::Raised(error) =
                protocol::close(provider.as_mut(), self, in_flight, &name)
            {
                self.record_exit_error(ExitSource::Resource(name), error);
            }
        }
    }

    /// Runs `body` inside the context.
    ///
    /// Returns `Ok(Some(value))` on success and `Ok(None)` when the body
    /// failed but middleware suppressed the fault. If the body panics, the
    /// context is still torn down before the panic continues.
    ///
    /// # Errors
    ///
    /// Returns setup failures and any fault that survives teardown.
    pub fn scope<T, F>(&self, body: F) -> Result<Option<T>, Fault>
    where
        F: FnOnce(&Self) -> Result<T, Fault>,
    {
        self.enter()?;
        let guard = ExitOnUnwind::new(self, "context body panicked");
        let outcome = body(self);
        std::mem::forget(guard);
        match outcome {
            Ok(value) => self.exit(None).map(|()| Some(value)),
            Err(fault) => self.exit(Some(fault)).map(|()| None),
        }
    }

    pub(crate) fn belongs_to(&self, manager: &DataManager) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.inner.manager), manager)
    }

    fn set_state(&self, state: LifecycleState) {
        self.inner.state.set(state);
    }

    fn record_exit_error(&self, source: ExitSource, fault: Fault) {
        warn!(
            target: CONTEXT_TARGET,
            context = self.id(),
            source = %source,
            error = %fault,
            "captured error during context exit"
        );
        self.inner
            .exit_errors
            .borrow_mut()
            .push(ExitError { source, fault });
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("meta", &self.inner.meta)
            .finish_non_exhaustive()
    }
}

/// Tears the context down if setup or the body unwinds.
struct ExitOnUnwind<'a> {
    context: &'a ExecutionContext,
    reason: &'static str,
}

impl<'a> ExitOnUnwind<'a> {
    const fn new(context: &'a ExecutionContext, reason: &'static str) -> Self {
        Self { context, reason }
    }
}

impl Drop for ExitOnUnwind<'_> {
    fn drop(&mut self) {
        if let Err(fault) = self.context.exit(Some(Fault::msg(self.reason))) {
            debug!(
                target: CONTEXT_TARGET,
                context = self.context.id(),
                error = %fault,
                "context torn down after panic"
            );
        }
    }
}
