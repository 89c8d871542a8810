//! # Core Module
//!
//! Stateless building blocks of the partition-function computation: sequence
//! and constraint models, the thermodynamic energy model with its Boltzmann
//! point queries, and save-file I/O.
//!
//! ## Architecture
//!
//! - **Sequence & Constraints** ([`models`]) - typed nucleotide sequences and
//!   per-position folding constraints
//! - **Energy** ([`energy`]) - raw free-energy parameter sets and the derived,
//!   read-only Boltzmann weight tables consumed by the recurrences
//! - **File I/O** ([`io`]) - the binary partition-save format used for
//!   restart and probability extraction without recomputation
//!
//! Everything in this module is pure or read-only after construction; all
//! mutable fold state lives in [`crate::engine`].

pub mod energy;
pub mod io;
pub mod models;
