//! # Energy Module
//!
//! Thermodynamics of the partition function: raw free-energy parameter sets,
//! the derived read-only Boltzmann weight tables, and the pure point queries
//! the recurrences call.
//!
//! ## Key Components
//!
//! - [`params`] - raw (non-Boltzmann) free-energy parameter structures and
//!   their TOML loader
//! - [`model`] - [`model::EnergyModel`]: exponentiated tables with the global
//!   scaling factor folded in, rebuilt on rescale
//! - [`queries`] - stateless point queries: stacked pairs, bulge/internal
//!   loops, hairpins, dangling ends, helix-end penalties, coaxial stacking
//! - [`weights`] - pure math shared by the above (Boltzmann conversion,
//!   entropic loop extrapolation)
//!
//! Every query is pure given (positions, sequence, constraints, model); all
//! returned weights are non-negative and already reflect the current scale.

pub mod model;
pub mod params;
pub mod queries;
pub mod weights;
