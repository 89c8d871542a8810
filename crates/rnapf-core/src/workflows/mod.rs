//! # Workflows Module
//!
//! The user-facing layer. Workflows tie the [`crate::core`] models and the
//! [`crate::engine`] scan together into complete procedures: validate the
//! inputs, run the fold, and hand back a queryable, persistable
//! [`partition::FoldState`].
//!
//! - **Partition Workflow** ([`partition`]) - the full equilibrium
//!   partition-function computation with progress reporting, cooperative
//!   cancellation, base-pair probability extraction and save/restore.

pub mod partition;
