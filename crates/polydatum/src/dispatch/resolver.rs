//! Resolution of command paths against the service tree.
//!
//! The walk never stops early: once a segment goes missing, every later
//! step reports `None`, so callers always see one step per segment.

use serde_json::Value;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::chain::{MethodMiddleware, Next};
use super::path::{PathSegment, dotted};
use super::request::Request;
use crate::errors::DalError;
use crate::fault::Fault;
use crate::service::{Method, Node, ServiceRegistry};

/// One step of a walk: the path consumed so far and the node it reached.
pub type WalkStep<'a> = (&'a [PathSegment], Option<Node<'a>>);

/// Walks `path` through `services`, yielding one step per segment.
///
/// The first segment is looked up among top-level services. On a service,
/// child services are tried before methods. Nothing can be reached from a
/// method or from a missing node.
pub fn walk<'a>(
    services: &'a ServiceRegistry,
    path: &'a [PathSegment],
) -> impl Iterator<Item = WalkStep<'a>> + 'a {
    let mut current: Option<Option<Node<'a>>> = None;
    (1..=path.len()).zip(path).map(move |(consumed, segment)| {
        let reached = match current {
            None => services.get(segment.name()).map(Node::Service),
            Some(Some(Node::Service(service))) => service.lookup(segment.name()),
            Some(Some(Node::Method(_)) | None) => None,
        };
        current = Some(reached);
        let (location, _) = path.split_at(consumed);
        (location, reached)
    })
}

/// Resolves `path` to a callable method.
///
/// # Errors
///
/// Returns [`DalError::DalMethod`] carrying the path up to the first missing
/// segment, or the full path when it ends on a service or is empty.
pub fn resolve(services: &ServiceRegistry, path: &[PathSegment]) -> Result<Method, DalError> {
    let mut first_missing: Option<&[PathSegment]> = None;
    let mut last: Option<Node<'_>> = None;
    for (location, reached) in walk(services, path) {
        if reached.is_none() && first_missing.is_none() {
            first_missing = Some(location);
        }
        last = reached;
    }
    match (first_missing, last) {
        (None, Some(Node::Method(method))) => Ok(method.clone()),
        (Some(location), _) => Err(DalError::dal_method(location)),
        (None, _) => Err(DalError::dal_method(path)),
    }
}

/// Method middleware that resolves the request path and stores the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolverMiddleware;

impl MethodMiddleware for ResolverMiddleware {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Value, Fault> {
        let manager = request.context().manager();
        let target = resolve(manager.services(), request.path())?;
        debug!(
            target: DISPATCH_TARGET,
            path = %dotted(request.path()),
            "resolved method"
        );
        request.set_target(target);
        next(request)
    }
}
