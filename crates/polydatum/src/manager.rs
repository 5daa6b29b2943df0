//! The registry owner: resources, services, middleware, and hooks.
//!
//! A [`DataManager`] is assembled once with [`DataManagerBuilder`] and is
//! immutable afterwards, so it can be shared freely across threads. Each unit
//! of work opens its own [`ExecutionContext`] from it.

use std::fmt;
use std::sync::Arc;

use polydatum_config::Settings;

use crate::context::{self, ExecutionContext};
use crate::dispatch::resolver::ResolverMiddleware;
use crate::dispatch::{Dal, Handler, MethodChain, MethodMiddleware, invoke_target};
use crate::errors::DalError;
use crate::fault::Fault;
use crate::hooks::{ContextHooks, NoopHooks};
use crate::meta::Meta;
use crate::middleware::ContextMiddleware;
use crate::resource::{Resource, ResourceRegistry};
use crate::service::{Service, ServiceRegistry};

/// Owns everything a context needs.
pub struct DataManager {
    resources: ResourceRegistry,
    services: ServiceRegistry,
    context_middleware: Vec<Arc<dyn ContextMiddleware>>,
    chain: MethodChain,
    hooks: Arc<dyn ContextHooks>,
    settings: Settings,
}

impl DataManager {
    /// Starts building a manager.
    #[must_use]
    pub fn builder() -> DataManagerBuilder {
        DataManagerBuilder::new()
    }

    /// Creates a fresh, unentered context carrying `meta`.
    #[must_use]
    pub fn context(self: &Arc<Self>, meta: Meta) -> ExecutionContext {
        ExecutionContext::new(Arc::clone(self), meta)
    }

    /// Opens a context, runs `body` with the command entry point, and closes
    /// the context again.
    ///
    /// Returns `Ok(None)` when `body` failed and middleware suppressed the
    /// fault.
    ///
    /// # Errors
    ///
    /// Returns setup failures and any fault that survives teardown.
    pub fn run<T, F>(self: &Arc<Self>, meta: Meta, body: F) -> Result<Option<T>, Fault>
    where
        F: FnOnce(&Dal, &ExecutionContext) -> Result<T, Fault>,
    {
        let dal = self.dal();
        self.context(meta).scope(|context| body(&dal, context))
    }

    /// Command entry point for this manager.
    #[must_use]
    pub fn dal(self: &Arc<Self>) -> Dal {
        Dal::new(Arc::clone(self))
    }

    /// Resource factory registered under `name`.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Arc<dyn Resource>> {
        self.resources.get(name)
    }

    /// Registered resources.
    #[must_use]
    pub const fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Registered top-level services.
    #[must_use]
    pub const fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Composed method middleware chain.
    #[must_use]
    pub const fn chain(&self) -> &MethodChain {
        &self.chain
    }

    /// Configuration supplied at build time.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Innermost open context of this manager on the current thread.
    #[must_use]
    pub fn active_context(&self) -> Option<ExecutionContext> {
        context::innermost_for(self)
    }

    /// Like [`DataManager::active_context`], but fails when none is open.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::NoActiveContext`] when no context is open.
    pub fn require_active_context(&self) -> Result<ExecutionContext, DalError> {
        self.active_context().ok_or(DalError::NoActiveContext)
    }

    pub(crate) fn context_middleware(&self) -> &[Arc<dyn ContextMiddleware>] {
        &self.context_middleware
    }

    pub(crate) fn hooks(&self) -> &dyn ContextHooks {
        self.hooks.as_ref()
    }
}

impl fmt::Debug for DataManager {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let middleware: Vec<&str> = self
            .context_middleware
            .iter()
            .map(|middleware| middleware.name())
            .collect();
        formatter
            .debug_struct("DataManager")
            .field("resources", &self.resources)
            .field("services", &self.services.names().collect::<Vec<_>>())
            .field("context_middleware", &middleware)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`DataManager`].
///
/// Method middleware runs in the order given, followed by the default
/// middleware (the path resolver unless replaced), around the terminal
/// handler.
pub struct DataManagerBuilder {
    resources: ResourceRegistry,
    services: ServiceRegistry,
    context_middleware: Vec<Arc<dyn ContextMiddleware>>,
    method_middleware: Vec<Arc<dyn MethodMiddleware>>,
    default_method_middleware: Vec<Arc<dyn MethodMiddleware>>,
    terminal: Handler,
    hooks: Arc<dyn ContextHooks>,
    settings: Settings,
}

impl Default for DataManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManagerBuilder {
    /// Creates a builder with the default resolver and terminal handler.
    #[must_use]
    pub fn new() -> Self {
        let resolver: Arc<dyn MethodMiddleware> = Arc::new(ResolverMiddleware);
        Self {
            resources: ResourceRegistry::new(),
            services: ServiceRegistry::new(),
            context_middleware: Vec::new(),
            method_middleware: Vec::new(),
            default_method_middleware: vec![resolver],
            terminal: Arc::new(invoke_target),
            hooks: Arc::new(NoopHooks),
            settings: Settings::new(),
        }
    }

    /// Registers a resource.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when `name` is taken.
    pub fn register_resource<R>(mut self, name: &str, resource: R) -> Result<Self, DalError>
    where
        R: Resource + 'static,
    {
        self.resources.register(name, Arc::new(resource))?;
        Ok(self)
    }

    /// Registers several resources, stopping at the first conflict.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when a name is taken.
    pub fn register_resources<I, N>(mut self, resources: I) -> Result<Self, DalError>
    where
        I: IntoIterator<Item = (N, Arc<dyn Resource>)>,
        N: Into<String>,
    {
        for (name, resource) in resources {
            self.resources.register(name, resource)?;
        }
        Ok(self)
    }

    /// Registers a resource, overwriting any existing entry.
    #[must_use]
    pub fn replace_resource<R>(mut self, name: &str, resource: R) -> Self
    where
        R: Resource + 'static,
    {
        self.resources.replace(name, Arc::new(resource));
        self
    }

    /// Registers a top-level service.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when `name` is taken.
    pub fn register_service(mut self, name: &str, service: Service) -> Result<Self, DalError> {
        self.services.register(name, service)?;
        Ok(self)
    }

    /// Registers several top-level services, stopping at the first conflict.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when a name is taken.
    pub fn register_services<I, N>(mut self, services: I) -> Result<Self, DalError>
    where
        I: IntoIterator<Item = (N, Service)>,
        N: Into<String>,
    {
        for (name, service) in services {
            self.services.register(name, service)?;
        }
        Ok(self)
    }

    /// Registers a top-level service, overwriting any existing entry.
    #[must_use]
    pub fn replace_service(mut self, name: &str, service: Service) -> Self {
        self.services.replace(name, service);
        self
    }

    /// Appends context middleware. Setup follows registration order.
    #[must_use]
    pub fn register_context_middleware<M>(mut self, middleware: M) -> Self
    where
        M: ContextMiddleware + 'static,
    {
        self.context_middleware.push(Arc::new(middleware));
        self
    }

    /// Appends method middleware ahead of the defaults.
    #[must_use]
    pub fn method_middleware(mut self, middleware: Arc<dyn MethodMiddleware>) -> Self {
        self.method_middleware.push(middleware);
        self
    }

    /// Replaces the default method middleware that runs after every
    /// explicitly added layer.
    #[must_use]
    pub fn default_method_middleware(mut self, middleware: Vec<Arc<dyn MethodMiddleware>>) -> Self {
        self.default_method_middleware = middleware;
        self
    }

    /// Replaces the handler at the centre of the method chain.
    #[must_use]
    pub fn terminal_handler(mut self, handler: Handler) -> Self {
        self.terminal = handler;
        self
    }

    /// Installs context lifecycle hooks.
    #[must_use]
    pub fn hooks<H>(mut self, hooks: H) -> Self
    where
        H: ContextHooks + 'static,
    {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Supplies configuration.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Composes the method chain, attaches every resource and service to
    /// the manager, and returns it.
    #[must_use]
    pub fn build(self) -> Arc<DataManager> {
        let Self {
            resources,
            mut services,
            context_middleware,
            mut method_middleware,
            default_method_middleware,
            terminal,
            hooks,
            settings,
        } = self;
        method_middleware.extend(default_method_middleware);
        let chain = MethodChain::compose(method_middleware, terminal);

        Arc::new_cyclic(|manager| {
            resources.setup_all(manager);
            services.setup_all(manager);
            DataManager {
                resources,
                services,
                context_middleware,
                chain,
                hooks,
                settings,
            }
        })
    }
}

impl fmt::Debug for DataManagerBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DataManagerBuilder")
            .field("resources", &self.resources)
            .field("method_middleware", &self.method_middleware.len())
            .finish_non_exhaustive()
    }
}
