//! Request-scoped data access layer.
//!
//! A [`DataManager`] owns three registries. Resources are named factories
//! for things like connections and caches. Services form a tree of named
//! domain operations. Context middleware wraps every unit of work. Each unit
//! of work runs inside an [`ExecutionContext`]:
//!
//! - resources are created on first use and closed exactly once when the
//!   context exits;
//! - middleware is set up in registration order and torn down in reverse,
//!   and may pass through, suppress, or replace the in-flight fault;
//! - cleanup failures never mask the real failure. They are collected and
//!   exposed through [`ExecutionContext::exit_errors`].
//!
//! Commands are built from dotted paths with [`Dal`] and [`DalCommand`],
//! resolved against the service tree, and routed through an onion of
//! [`MethodMiddleware`] before reaching the method.
//!
//! ```rust,ignore
//! let manager = DataManager::builder()
//!     .register_resource("db", FnResource::acquire_only(|_| Ok(Pool::connect())))?
//!     .register_service("users", users_service())?
//!     .build();
//!
//! manager.run(Meta::new(), |dal, _| {
//!     dal.attr("users")?.attr("get").call(Args::new().arg(7))
//! })?;
//! ```

pub mod context;
pub mod dispatch;
mod errors;
mod fault;
mod hooks;
mod manager;
mod meta;
mod middleware;
mod protocol;
mod resource;
mod service;
pub mod telemetry;

pub use context::{ExecutionContext, ExitError, ExitSource, LifecycleState, active_depth};
pub use dispatch::{
    Args, Dal, DalCommand, MethodChain, MethodMiddleware, Next, PathSegment, Request,
};
pub use errors::{DalError, RegistryKind, ServiceError};
pub use fault::Fault;
pub use hooks::{ContextHooks, NoopHooks};
pub use manager::{DataManager, DataManagerBuilder};
pub use meta::Meta;
pub use middleware::{ContextMiddleware, Disposition, FnMiddleware, MiddlewareProvider};
pub use polydatum_config::Settings;
pub use protocol::{Provider, Step};
pub use resource::{
    FnResource, Resource, ResourceProvider, ResourceRegistry, ResourceValue, ValueResource,
};
pub use service::{Method, MethodCall, Node, Service, ServiceRegistry};
pub use telemetry::TelemetryError;

#[cfg(test)]
mod tests;
