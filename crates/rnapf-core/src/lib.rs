//! # rnapf Core Library
//!
//! A library for computing the equilibrium partition function of RNA secondary
//! structure: Boltzmann-weighted sums over all consistent pairings of a
//! nucleotide sequence, and the base-pair probabilities derived from them.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   ([`RnaSequence`](core::models::sequence::RnaSequence),
//!   [`FoldConstraints`](core::models::constraints::FoldConstraints)), the
//!   precomputed Boltzmann energy model
//!   ([`EnergyModel`](core::energy::model::EnergyModel)) with its pure point
//!   queries, and the binary save-file codec.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer owns the banded
//!   triangular pair arrays, the span-by-span recurrence scan that fills them,
//!   and the rescaling controller that keeps magnitudes inside floating-point
//!   range over arbitrarily long sequences.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer.
//!   [`workflows::partition::run`] executes a complete fold and returns a
//!   [`FoldState`](workflows::partition::FoldState) from which pair
//!   probabilities are extracted or persisted for later reuse.

pub mod core;
pub mod engine;
pub mod workflows;
