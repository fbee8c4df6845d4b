//! # Bulkflow
//!
//! Client-side orchestration utilities for a CI/CD platform: a
//! bounded-concurrency bulk executor for asynchronous API operations, outcome
//! aggregation helpers, and a workflow-graph linker that turns flat pipeline
//! API responses into a linked Git → CI → pre-CD → CD → post-CD graph.
//!
//! ## Overview
//!
//! Bulk actions (trigger N builds, deploy to N environments, patch N branches)
//! fan out into many REST calls. The [`batch`] module runs those calls with a
//! fixed ceiling on how many are in flight at once, captures one outcome per
//! call in input order, and can short-circuit on the first failure.
//!
//! ## Quick Start
//!
//! ```rust
//! use bulkflow::batch::{operation, run_batched, BatchOptions, Outcome};
//!
//! # async fn example() {
//! let operations = (0..4_u32)
//!     .map(|i| operation(move || async move { Ok::<_, String>(i * 2) }))
//!     .collect();
//!
//! let outcomes = run_batched(operations, BatchOptions::default())
//!     .await
//!     .expect("settle-all batches never reject");
//!
//! assert_eq!(outcomes.len(), 4);
//! assert!(outcomes.iter().all(Outcome::is_fulfilled));
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: bounded-concurrency execution and outcome aggregation
//! - [`transport`]: transport-derived default concurrency signal
//! - [`workflow`]: pipeline graph linking from flat API responses

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for bulkflow operations
pub type Result<T> = std::result::Result<T, BulkflowError>;

/// Main error type for bulkflow operations
///
/// Individual bulk-call failures are never carried here; they stay as data in
/// [`batch::Outcome::Rejected`] with the caller's own error type.
#[derive(Error, Debug)]
pub enum BulkflowError {
    /// Workflow tree references that cannot form a graph (bad branch data)
    #[error("Workflow structure error: {0}")]
    WorkflowStructure(String),

    /// Cyclic parent references in a workflow tree
    #[error("Cyclic pipeline reference: {0}")]
    CyclicWorkflow(String),
}

/// Bounded-concurrency batch execution and outcome aggregation
pub mod batch;

/// Transport-derived concurrency defaults
pub mod transport;

/// Workflow graph linking from flat pipeline responses
pub mod workflow;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BulkflowError::CyclicWorkflow("CD-7".to_string());
        assert_eq!(err.to_string(), "Cyclic pipeline reference: CD-7");
    }

    #[test]
    fn test_outcome_construction() {
        let outcome: batch::Outcome<u32, String> = batch::Outcome::Fulfilled { value: 7 };
        assert!(outcome.is_fulfilled());
        assert_eq!(outcome.value(), Some(&7));
    }
}
