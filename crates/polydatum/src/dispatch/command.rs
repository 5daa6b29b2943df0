//! Deferred command paths.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::path::{PathSegment, dotted, parse_dotted};
use super::request::{Args, Request};
use crate::context::ExecutionContext;
use crate::errors::DalError;
use crate::fault::Fault;
use crate::manager::DataManager;

/// Entry point for building commands against a manager's services.
#[derive(Clone)]
pub struct Dal {
    manager: Arc<DataManager>,
}

impl Dal {
    pub(crate) const fn new(manager: Arc<DataManager>) -> Self {
        Self { manager }
    }

    /// Starts a command at the top-level service `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::NoActiveContext`] when no context of this manager
    /// is open on the current thread.
    pub fn attr(&self, name: &str) -> Result<DalCommand, DalError> {
        self.manager.require_active_context()?;
        Ok(DalCommand::new(
            Arc::clone(&self.manager),
            vec![PathSegment::new(name)],
        ))
    }

    /// Builds a command from a dotted path such as `dal.users.get`.
    ///
    /// Unlike [`Dal::attr`], this needs no open context until the command is
    /// called.
    #[must_use]
    pub fn command(&self, path: &str) -> DalCommand {
        DalCommand::new(Arc::clone(&self.manager), parse_dotted(path))
    }
}

impl fmt::Debug for Dal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Dal").finish_non_exhaustive()
    }
}

/// An immutable, deferred command path.
///
/// Extending the path always yields a new command; nothing is resolved until
/// the command is called.
#[derive(Clone)]
pub struct DalCommand {
    manager: Arc<DataManager>,
    path: Vec<PathSegment>,
}

impl DalCommand {
    const fn new(manager: Arc<DataManager>, path: Vec<PathSegment>) -> Self {
        Self { manager, path }
    }

    /// Returns a new command with `name` appended.
    #[must_use]
    pub fn attr(&self, name: &str) -> Self {
        self.segment(PathSegment::new(name))
    }

    /// Returns a new command with `segment` appended.
    #[must_use]
    pub fn segment(&self, segment: PathSegment) -> Self {
        let mut path = self.path.clone();
        path.push(segment);
        Self::new(Arc::clone(&self.manager), path)
    }

    /// Accumulated path.
    #[must_use]
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Returns `true` when both commands target the same manager and path.
    #[must_use]
    pub fn same_path(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.manager, &other.manager) && self.path == other.path
    }

    /// Calls the command in the innermost active context.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::NoActiveContext`] when no context is open, or any
    /// fault raised while dispatching.
    pub fn call(&self, args: impl Into<Args>) -> Result<Value, Fault> {
        let context = self.manager.require_active_context()?;
        self.call_in(&context, args)
    }

    /// Calls the command in `context`.
    ///
    /// # Errors
    ///
    /// - [`DalError::ForeignContext`] when `context` was opened by another
    ///   manager.
    /// - [`DalError::InvalidState`] when `context` is not open.
    /// - Any fault raised while dispatching.
    pub fn call_in(&self, context: &ExecutionContext, args: impl Into<Args>) -> Result<Value, Fault> {
        if !context.belongs_to(&self.manager) {
            return Err(DalError::ForeignContext.into());
        }
        let state = context.state();
        if !state.is_open() {
            return Err(DalError::invalid_state("command dispatch", state).into());
        }
        debug!(
            target: DISPATCH_TARGET,
            context = context.id(),
            path = %self,
            "dispatching command"
        );
        let mut request = Request::new(context.clone(), self.path.clone(), args.into());
        self.manager.chain().dispatch(&mut request)
    }
}

impl fmt::Display for DalCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&dotted(&self.path))
    }
}

impl fmt::Debug for DalCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DalCommand")
            .field("path", &dotted(&self.path))
            .finish_non_exhaustive()
    }
}
