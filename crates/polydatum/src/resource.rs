//! Lazily created, exactly-once-closed resources.
//!
//! A [`Resource`] is a factory registered under a unique name. The first time
//! a context asks for that name, the factory builds a provider, the context
//! acquires it, and the resulting value is cached for the rest of the
//! context. Providers that became ready are released exactly once when the
//! context exits.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::context::ExecutionContext;
use crate::errors::{DalError, RegistryKind};
use crate::fault::Fault;
use crate::manager::DataManager;
use crate::protocol::{Provider, Step};

/// Value produced by a resource provider.
pub type ResourceValue = Arc<dyn Any + Send + Sync>;

/// Provider created for one resource in one context.
pub type ResourceProvider = Box<dyn Provider<Ready = ResourceValue>>;

/// Factory for per-context resource providers.
pub trait Resource: Send + Sync {
    /// Builds a fresh provider for `context`.
    fn provider(&self, context: &ExecutionContext) -> ResourceProvider;

    /// Called once when the owning manager is built.
    ///
    /// The handle cannot be upgraded until `build` has returned.
    fn setup(&self, _manager: &Weak<DataManager>) {}
}

/// Resource that hands out a fixed value.
#[derive(Clone)]
pub struct ValueResource {
    value: ResourceValue,
}

impl ValueResource {
    /// Wraps `value`.
    #[must_use]
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value: Arc::new(value),
        }
    }

    /// Shares an existing allocation, so callers can keep a handle to it.
    #[must_use]
    pub fn from_arc<T>(value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self { value }
    }
}

impl fmt::Debug for ValueResource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ValueResource").finish_non_exhaustive()
    }
}

impl Resource for ValueResource {
    fn provider(&self, _context: &ExecutionContext) -> ResourceProvider {
        Box::new(ValueProvider {
            value: Some(Arc::clone(&self.value)),
        })
    }
}

struct ValueProvider {
    value: Option<ResourceValue>,
}

impl Provider for ValueProvider {
    type Ready = ResourceValue;

    fn acquire(&mut self, _context: &ExecutionContext) -> Result<Step<ResourceValue>, Fault> {
        Ok(self.value.take().map_or(Step::Done, Step::Ready))
    }

    fn release(
        &mut self,
        _context: &ExecutionContext,
        fault: Option<&Fault>,
    ) -> Result<Step<ResourceValue>, Fault> {
        fault.map_or(Ok(Step::Done), |in_flight| Err(in_flight.clone()))
    }
}

type AcquireFn<T> = dyn Fn(&ExecutionContext) -> Result<T, Fault> + Send + Sync;
type ReleaseFn<T> = dyn Fn(&T, Option<&Fault>) -> Result<(), Fault> + Send + Sync;

/// Resource built from an acquire closure and a release closure.
///
/// The release closure always runs for a value that was acquired. It sees
/// the in-flight fault but cannot suppress it; returning an error records a
/// new exit error instead.
pub struct FnResource<T> {
    acquire: Arc<AcquireFn<T>>,
    release: Arc<ReleaseFn<T>>,
}

impl<T> FnResource<T>
where
    T: Any + Send + Sync,
{
    /// Creates a resource from two closures.
    pub fn new<A, R>(acquire: A, release: R) -> Self
    where
        A: Fn(&ExecutionContext) -> Result<T, Fault> + Send + Sync + 'static,
        R: Fn(&T, Option<&Fault>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        Self {
            acquire: Arc::new(acquire),
            release: Arc::new(release),
        }
    }

    /// Creates a resource whose value needs no cleanup.
    pub fn acquire_only<A>(acquire: A) -> Self
    where
        A: Fn(&ExecutionContext) -> Result<T, Fault> + Send + Sync + 'static,
    {
        Self::new(acquire, |_, _| Ok(()))
    }
}

impl<T> fmt::Debug for FnResource<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("FnResource").finish_non_exhaustive()
    }
}

impl<T> Resource for FnResource<T>
where
    T: Any + Send + Sync,
{
    fn provider(&self, _context: &ExecutionContext) -> ResourceProvider {
        Box::new(FnProvider {
            acquire: Arc::clone(&self.acquire),
            release: Arc::clone(&self.release),
            value: None,
        })
    }
}

struct FnProvider<T> {
    acquire: Arc<AcquireFn<T>>,
    release: Arc<ReleaseFn<T>>,
    value: Option<Arc<T>>,
}

impl<T> Provider for FnProvider<T>
where
    T: Any + Send + Sync,
{
    type Ready = ResourceValue;

    fn acquire(&mut self, context: &ExecutionContext) -> Result<Step<ResourceValue>, Fault> {
        let value = Arc::new((self.acquire)(context)?);
        self.value = Some(Arc::clone(&value));
        let shared: ResourceValue = value;
        Ok(Step::Ready(shared))
    }

    fn release(
        &mut self,
        _context: &ExecutionContext,
        fault: Option<&Fault>,
    ) -> Result<Step<ResourceValue>, Fault> {
        if let Some(value) = self.value.take() {
            (self.release)(&value, fault)?;
        }
        fault.map_or(Ok(Step::Done), |in_flight| Err(in_flight.clone()))
    }
}

/// Name to resource factory table.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::AlreadyExists`] when `name` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        resource: Arc<dyn Resource>,
    ) -> Result<(), DalError> {
        let name = name.into();
        if self.resources.contains_key(&name) {
            return Err(DalError::already_exists(RegistryKind::Resource, name));
        }
        self.resources.insert(name, resource);
        Ok(())
    }

    /// Registers `resource` under `name`, overwriting any existing entry.
    pub fn replace(
        &mut self,
        name: impl Into<String>,
        resource: Arc<dyn Resource>,
    ) -> Option<Arc<dyn Resource>> {
        self.resources.insert(name.into(), resource)
    }

    /// Returns the factory registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Resource>> {
        self.resources.get(name).cloned()
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Iterates over registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub(crate) fn setup_all(&self, manager: &Weak<DataManager>) {
        for resource in self.resources.values() {
            resource.setup(manager);
        }
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_set()
            .entries(self.resources.keys())
            .finish()
    }
}
