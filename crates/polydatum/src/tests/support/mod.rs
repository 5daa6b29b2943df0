//! Scripted providers and a shared journal for lifecycle tests.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::{
    ContextMiddleware, DataManager, DataManagerBuilder, ExecutionContext, Fault, MethodCall,
    MiddlewareProvider, Provider, Resource, ResourceProvider, ResourceValue, Service, Step,
};

/// Ordered record of lifecycle events, shared between providers and tests.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .expect("journal lock poisoned")
            .push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("journal lock poisoned").clone()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|seen| *seen == entry).count()
    }

    pub(crate) fn joined(&self) -> String {
        self.entries().join(",")
    }
}

/// What a scripted provider does when acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnAcquire {
    Ready,
    Finish,
    Fail,
}

/// What a scripted provider does when released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnRelease {
    /// Hands an in-flight fault back, otherwise finishes.
    PassThrough,
    /// Finishes, suppressing any in-flight fault.
    Finish,
    /// Becomes ready again.
    ReadyAgain,
    /// Raises a fresh fault.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Script {
    pub(crate) acquire: OnAcquire,
    pub(crate) release: OnRelease,
}

impl Script {
    pub(crate) const fn well_behaved() -> Self {
        Self {
            acquire: OnAcquire::Ready,
            release: OnRelease::PassThrough,
        }
    }

    pub(crate) const fn releasing(release: OnRelease) -> Self {
        Self {
            acquire: OnAcquire::Ready,
            release,
        }
    }

    pub(crate) const fn acquiring(acquire: OnAcquire) -> Self {
        Self {
            acquire,
            release: OnRelease::PassThrough,
        }
    }
}

struct ScriptedProvider<T> {
    name: String,
    script: Script,
    journal: Journal,
    value: T,
}

impl<T: Clone> Provider for ScriptedProvider<T> {
    type Ready = T;

    fn acquire(&mut self, _context: &ExecutionContext) -> Result<Step<T>, Fault> {
        self.journal.record(format!("enter:{}", self.name));
        match self.script.acquire {
            OnAcquire::Ready => Ok(Step::Ready(self.value.clone())),
            OnAcquire::Finish => Ok(Step::Done),
            OnAcquire::Fail => Err(Fault::msg(format!("{} failed to start", self.name))),
        }
    }

    fn release(
        &mut self,
        _context: &ExecutionContext,
        fault: Option<&Fault>,
    ) -> Result<Step<T>, Fault> {
        match fault {
            Some(in_flight) => self
                .journal
                .record(format!("exit:{}:{in_flight}", self.name)),
            None => self.journal.record(format!("exit:{}", self.name)),
        }
        match (self.script.release, fault) {
            (OnRelease::PassThrough, Some(in_flight)) => Err(in_flight.clone()),
            (OnRelease::PassThrough | OnRelease::Finish, _) => Ok(Step::Done),
            (OnRelease::ReadyAgain, _) => Ok(Step::Ready(self.value.clone())),
            (OnRelease::Fail, _) => Err(Fault::msg(format!("{} failed to close", self.name))),
        }
    }
}

/// Resource whose provider follows a [`Script`] and records to a journal.
pub(crate) struct ScriptedResource {
    name: String,
    script: Script,
    journal: Journal,
}

impl ScriptedResource {
    pub(crate) fn new(name: &str, script: Script, journal: &Journal) -> Self {
        Self {
            name: name.to_owned(),
            script,
            journal: journal.clone(),
        }
    }
}

impl Resource for ScriptedResource {
    fn provider(&self, _context: &ExecutionContext) -> ResourceProvider {
        let value: ResourceValue = Arc::new(format!("{}-value", self.name));
        Box::new(ScriptedProvider {
            name: self.name.clone(),
            script: self.script,
            journal: self.journal.clone(),
            value,
        })
    }
}

/// Context middleware following a [`Script`].
pub(crate) struct ScriptedMiddleware {
    name: String,
    script: Script,
    journal: Journal,
}

impl ScriptedMiddleware {
    pub(crate) fn new(name: &str, script: Script, journal: &Journal) -> Self {
        Self {
            name: name.to_owned(),
            script,
            journal: journal.clone(),
        }
    }
}

impl ContextMiddleware for ScriptedMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self, _context: &ExecutionContext) -> MiddlewareProvider {
        Box::new(ScriptedProvider {
            name: self.name.clone(),
            script: self.script,
            journal: self.journal.clone(),
            value: (),
        })
    }
}

/// Builds a manager from scripted resources and middleware.
pub(crate) fn scripted_manager(
    journal: &Journal,
    resources: &[(&str, Script)],
    middleware: &[(&str, Script)],
) -> Arc<DataManager> {
    scripted_builder(journal, resources, middleware).build()
}

pub(crate) fn scripted_builder(
    journal: &Journal,
    resources: &[(&str, Script)],
    middleware: &[(&str, Script)],
) -> DataManagerBuilder {
    let with_resources = resources
        .iter()
        .fold(DataManager::builder(), |builder, (name, script)| {
            builder
                .register_resource(name, ScriptedResource::new(name, *script, journal))
                .expect("resource names are unique")
        });
    middleware
        .iter()
        .fold(with_resources, |builder, (name, script)| {
            builder.register_context_middleware(ScriptedMiddleware::new(name, *script, journal))
        })
}

/// `users` service with a nested `profile` child whose `update` echoes its
/// arguments.
pub(crate) fn users_service() -> Service {
    let profile = Service::new().with_method("update", |call: &MethodCall<'_>| {
        Ok(json!({
            "id": call.arg(0).cloned().unwrap_or(Value::Null),
            "changes": call.arg(1).cloned().unwrap_or(Value::Null),
        }))
    });
    Service::new()
        .with_method("count", |_: &MethodCall<'_>| Ok(json!(2)))
        .with_service("profile", profile)
}
