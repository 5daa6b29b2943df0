//! Service trees exposing named domain methods.
//!
//! A [`Service`] is a node holding named child services and named methods.
//! Top-level services live in a [`ServiceRegistry`]; the resolver walks the
//! tree one path segment at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::dispatch::{Args, PathSegment};
use crate::errors::{DalError, RegistryKind};
use crate::fault::Fault;
use crate::manager::DataManager;

type MethodFn = dyn Fn(&MethodCall<'_>) -> Result<Value, Fault> + Send + Sync;

/// A callable service method.
#[derive(Clone)]
pub struct Method {
    call: Arc<MethodFn>,
}

impl Method {
    /// Wraps `call` as a method.
    pub fn new<F>(call: F) -> Self
    where
        F: Fn(&MethodCall<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        Self {
            call: Arc::new(call),
        }
    }

    /// Invokes the method.
    ///
    /// # Errors
    ///
    /// Returns whatever the method body returns.
    pub fn invoke(&self, call: &MethodCall<'_>) -> Result<Value, Fault> {
        (self.call)(call)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Method").finish_non_exhaustive()
    }
}

/// Arguments and context handed to a method body.
#[derive(Debug)]
pub struct MethodCall<'a> {
    context: &'a ExecutionContext,
    path: &'a [PathSegment],
    args: &'a Args,
}

impl<'a> MethodCall<'a> {
    pub(crate) fn new(context: &'a ExecutionContext, path: &'a [PathSegment], args: &'a Args) -> Self {
        Self {
            context,
            path,
            args,
        }
    }

    /// The context the call runs in.
    #[must_use]
    pub fn context(&self) -> &'a ExecutionContext {
        self.context
    }

    /// Path the method was reached through.
    #[must_use]
    pub fn path(&self) -> &'a [PathSegment] {
        self.path
    }

    /// All call arguments.
    #[must_use]
    pub fn args(&self) -> &'a Args {
        self.args
    }

    /// Positional argument at `position`.
    #[must_use]
    pub fn arg(&self, position: usize) -> Option<&'a Value> {
        self.args.positional().get(position)
    }

    /// Keyword argument `name`.
    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&'a Value> {
        self.args.keyword().get(name)
    }

    /// Deserialises the positional argument at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::MissingArgument`] when there is no such argument,
    /// or the deserialisation error when it has the wrong shape.
    pub fn arg_as<T>(&self, position: usize) -> Result<T, Fault>
    where
        T: DeserializeOwned,
    {
        let value = self
            .arg(position)
            .ok_or(DalError::MissingArgument { position })?;
        Ok(T::deserialize(value)?)
    }
}

/// A node in a service tree.
#[derive(Debug, Default)]
pub struct Service {
    children: BTreeMap<String, Service>,
    methods: BTreeMap<String, Method>,
    manager: Weak<DataManager>,
}

/// What a single path segment resolved to.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// A child service.
    Service(&'a Service),
    /// A callable method.
    Method(&'a Method),
}

impl Service {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method named `name`.
    #[must_use]
    pub fn with_method<F>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&MethodCall<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Method::new(call));
        self
    }

    /// Adds a child service named `name`, replacing any existing child.
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, child: Self) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    /// Registers a child service.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when `name` is taken.
    pub fn register_service(&mut self, name: impl Into<String>, child: Self) -> Result<(), DalError> {
        let name = name.into();
        if self.children.contains_key(&name) {
            return Err(DalError::already_exists(RegistryKind::Service, name));
        }
        self.children.insert(name, child);
        Ok(())
    }

    /// Registers several child services, stopping at the first conflict.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when a name is taken.
    pub fn register_services<I, N>(&mut self, children: I) -> Result<(), DalError>
    where
        I: IntoIterator<Item = (N, Self)>,
        N: Into<String>,
    {
        children
            .into_iter()
            .try_for_each(|(name, child)| self.register_service(name, child))
    }

    /// Child service named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.get(name)
    }

    /// Method named `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Looks up `name`, preferring child services over methods.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Node<'_>> {
        self.child(name)
            .map(Node::Service)
            .or_else(|| self.method(name).map(Node::Method))
    }

    /// The owning manager, once the service has been set up.
    #[must_use]
    pub fn manager(&self) -> Option<Arc<DataManager>> {
        self.manager.upgrade()
    }

    /// Returns `true` once the owning manager has been attached.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.manager.strong_count() > 0
    }

    /// The innermost active context of the owning manager.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::NoActiveContext`] when the service is not attached
    /// to a manager or no context is open.
    pub fn context(&self) -> Result<ExecutionContext, DalError> {
        self.manager()
            .ok_or(DalError::NoActiveContext)?
            .require_active_context()
    }

    pub(crate) fn setup(&mut self, manager: &Weak<DataManager>) {
        self.manager = manager.clone();
        for child in self.children.values_mut() {
            child.setup(manager);
        }
    }
}

/// Top-level services keyed by name.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Service>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, service: Service) -> Result<(), DalError> {
        let name = name.into();
        if self.services.contains_key(&name) {
            return Err(DalError::already_exists(RegistryKind::Service, name));
        }
        self.services.insert(name, service);
        Ok(())
    }

    /// Registers `service` under `name`, returning the service it replaced.
    pub fn replace(&mut self, name: impl Into<String>, service: Service) -> Option<Service> {
        self.services.insert(name.into(), service)
    }

    /// Top-level service named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Iterates over top-level names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub(crate) fn setup_all(&mut self, manager: &Weak<DataManager>) {
        for service in self.services.values_mut() {
            service.setup(manager);
        }
    }
}
