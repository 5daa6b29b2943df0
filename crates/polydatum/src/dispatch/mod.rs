//! Command dispatch through the service tree.
//!
//! A [`DalCommand`] accumulates path segments without resolving anything.
//! Calling it builds a [`Request`] and runs it through the manager's
//! [`MethodChain`]. With the default chain, [`resolver::ResolverMiddleware`]
//! finds the target method and [`invoke_target`] calls it.
//!
//! ```text
//! dal.attr("users")?.attr("profile").attr("update").call(args)
//!   -> Request { context, path, args, target: None }
//!   -> middleware[0] -> ... -> ResolverMiddleware -> invoke_target
//! ```

mod chain;
mod command;
mod path;
mod request;
pub mod resolver;

pub use self::chain::{Handler, MethodChain, MethodMiddleware, Next, from_fn, invoke_target};
pub use self::command::{Dal, DalCommand};
pub use self::path::{PathSegment, dotted, parse_dotted};
pub use self::request::{Args, Request};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
