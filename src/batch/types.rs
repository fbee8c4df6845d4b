//! Core batch types: operations, outcomes, and run configuration.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

/// A deferred API call: a nullary closure producing its value asynchronously.
///
/// An operation's identity is its index in the input sequence. It is invoked
/// exactly once and never retried; callers wanting timeouts or retries wrap
/// the future themselves before handing it in.
pub type Operation<T, E> =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send + 'static>;

/// Box an async closure into an [`Operation`].
pub fn operation<F, Fut, T, E>(call: F) -> Operation<T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move || call().boxed())
}

/// Settlement record for one operation.
///
/// Rejection reasons are preserved verbatim, never wrapped, so callers can
/// switch on their own error type (HTTP code, server error class) when
/// presenting aggregated results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The operation resolved with a value.
    Fulfilled {
        /// The resolved value.
        value: T,
    },
    /// The operation failed.
    Rejected {
        /// The failure, exactly as the operation produced it.
        reason: E,
    },
}

impl<T, E> Outcome<T, E> {
    /// True if the operation resolved with a value.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled { .. })
    }

    /// True if the operation failed.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected { .. })
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled { value } => Some(value),
            Outcome::Rejected { .. } => None,
        }
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<&E> {
        match self {
            Outcome::Fulfilled { .. } => None,
            Outcome::Rejected { reason } => Some(reason),
        }
    }

    /// Consume the outcome, returning the resolved value if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Fulfilled { value } => Some(value),
            Outcome::Rejected { .. } => None,
        }
    }

    /// Consume the outcome, returning the rejection reason if any.
    pub fn into_reason(self) -> Option<E> {
        match self {
            Outcome::Fulfilled { .. } => None,
            Outcome::Rejected { reason } => Some(reason),
        }
    }
}

/// Configuration for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum operations in flight at once. `None` (or `Some(0)`) defers to
    /// the executor's [`ConcurrencySource`](crate::transport::ConcurrencySource).
    pub concurrency: Option<usize>,
    /// Reject the whole run with the first observed rejection instead of
    /// settling every operation.
    pub fail_fast: bool,
}

/// Callback for progress updates: `(settled_count, total)`.
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;
