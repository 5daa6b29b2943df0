//! Per-invocation request state threaded through method middleware.

use std::collections::BTreeMap;

use serde_json::Value;

use super::path::PathSegment;
use crate::context::ExecutionContext;
use crate::service::Method;

/// Positional and keyword call arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Positional arguments in call order.
    #[must_use]
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Keyword arguments.
    #[must_use]
    pub fn keyword(&self) -> &BTreeMap<String, Value> {
        &self.keyword
    }

    /// Mutable positional arguments.
    pub fn positional_mut(&mut self) -> &mut Vec<Value> {
        &mut self.positional
    }

    /// Mutable keyword arguments.
    pub fn keyword_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.keyword
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keyword: BTreeMap::new(),
        }
    }
}

/// One command invocation in flight.
///
/// Middleware may rewrite the arguments or the resolved target before
/// delegating.
#[derive(Debug)]
pub struct Request {
    context: ExecutionContext,
    path: Vec<PathSegment>,
    args: Args,
    target: Option<Method>,
}

impl Request {
    pub(crate) fn new(context: ExecutionContext, path: Vec<PathSegment>, args: Args) -> Self {
        Self {
            context,
            path,
            args,
            target: None,
        }
    }

    /// Context the command runs in.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Full command path.
    #[must_use]
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Call arguments.
    #[must_use]
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Mutable call arguments.
    pub fn args_mut(&mut self) -> &mut Args {
        &mut self.args
    }

    /// Method resolved for this request, if any.
    #[must_use]
    pub fn target(&self) -> Option<&Method> {
        self.target.as_ref()
    }

    /// Sets the method to invoke.
    pub fn set_target(&mut self, target: Method) {
        self.target = Some(target);
    }
}
