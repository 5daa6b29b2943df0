//! In-flight faults propagated through context teardown.
//!
//! A [`Fault`] is a shared, clonable handle over any error. Clones keep the
//! same identity, which lets teardown distinguish a provider handing the
//! in-flight fault straight back (pass-through) from a provider raising a
//! new error that happens to look the same.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::errors::DalError;

/// Shared error handle with identity semantics.
///
/// Every type implementing [`std::error::Error`] converts into a `Fault`, so
/// `?` works inside context bodies, providers, and service methods.
#[derive(Clone)]
pub struct Fault {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Fault {
    /// Wraps an error in a new fault with a fresh identity.
    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Creates a fault carrying only a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageFault(message.into()))
    }

    /// Returns `true` when both handles refer to the same fault object.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    /// Returns the underlying error when it has type `E`.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Returns `true` when the underlying error has type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.inner.is::<E>()
    }

    /// Returns the underlying [`DalError`], if this fault carries one.
    #[must_use]
    pub fn dal_error(&self) -> Option<&DalError> {
        self.downcast_ref::<DalError>()
    }

    /// Borrows the underlying error.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("Fault").field(&self.inner).finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, formatter)
    }
}

impl<E> From<E> for Fault
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageFault(String);
