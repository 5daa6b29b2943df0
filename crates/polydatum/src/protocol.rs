//! The two-phase acquire/release protocol shared by resources and context
//! middleware.
//!
//! A provider is driven exactly twice: [`Provider::acquire`] must return
//! [`Step::Ready`], and [`Provider::release`] must return [`Step::Done`] or
//! fail. The context checks these rules itself rather than trusting the
//! provider, so a provider that never becomes ready, or becomes ready a
//! second time, is reported as a [`DalError`].

use crate::context::ExecutionContext;
use crate::errors::DalError;
use crate::fault::Fault;

/// Result of advancing a provider by one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// The provider is ready and produced a value.
    Ready(T),
    /// The provider finished.
    Done,
}

/// A stateful object driven through the acquire/release protocol.
///
/// Both phases receive the owning context, so middleware can read resources
/// while setting up or tearing down.
pub trait Provider {
    /// Value produced when the provider becomes ready.
    type Ready;

    /// Advances the provider to its ready point.
    ///
    /// Returning [`Step::Done`] means the provider opted out without raising,
    /// which the context reports as a setup error.
    ///
    /// # Errors
    ///
    /// Any error aborts setup and propagates unchanged.
    fn acquire(&mut self, context: &ExecutionContext) -> Result<Step<Self::Ready>, Fault>;

    /// Closes the provider, informing it of the in-flight fault, if any.
    ///
    /// With a fault in flight, returning [`Step::Done`] suppresses it and
    /// returning the same fault (see [`Fault::is_same`]) lets it pass
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// Returning a different fault replaces the in-flight one.
    fn release(
        &mut self,
        context: &ExecutionContext,
        fault: Option<&Fault>,
    ) -> Result<Step<Self::Ready>, Fault>;
}

/// What closing a provider did to the in-flight fault.
#[derive(Debug)]
pub(crate) enum Closing {
    /// No fault was in flight and the provider finished.
    Closed,
    /// The in-flight fault was swallowed.
    Suppressed,
    /// The in-flight fault was handed back unchanged.
    PassedThrough,
    /// The provider raised a new fault or broke the protocol.
    Raised(Fault),
}

/// Releases `provider` and classifies the outcome.
pub(crate) fn close<P>(
    provider: &mut P,
    context: &ExecutionContext,
    fault: Option<&Fault>,
    subject: &str,
) -> Closing
where
    P: Provider + ?Sized,
{
    let outcome = provider.release(context, fault);
    match (fault, outcome) {
        (None, Ok(Step::Done)) => Closing::Closed,
        (None, Ok(Step::Ready(_))) => Closing::Raised(
            DalError::protocol_violation(subject, "became ready more than once").into(),
        ),
        (Some(_), Ok(Step::Done)) => Closing::Suppressed,
        (Some(_), Ok(Step::Ready(_))) => Closing::Raised(
            DalError::protocol_violation(subject, "did not close after receiving a fault").into(),
        ),
        (Some(in_flight), Err(returned)) if returned.is_same(in_flight) => Closing::PassedThrough,
        (_, Err(raised)) => Closing::Raised(raised),
    }
}
