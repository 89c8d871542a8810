use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Free energy indexed by the four bases of a closing pair and a following
/// pair (stacks, coaxial stacks) or a pair plus two loop bases (terminal
/// mismatches). Order: `[p5][p3][x][y]` over dense [`Base`](crate::core::models::sequence::Base) indices.
pub type QuadTable = [[[[f64; 4]; 4]; 4]; 4];

/// Free energy indexed by a pair and one adjacent single base: `[p5][p3][x]`.
pub type DangleTable = [[[f64; 4]; 4]; 4];

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Length-indexed table '{table}' must tabulate sizes 0..={expected}, found {found}")]
    TableLength {
        table: &'static str,
        expected: usize,
        found: usize,
    },
}

/// A raw (non-Boltzmann) free-energy parameter set, in kcal/mol.
///
/// This is the contract-level input of the energy model: how such a set is
/// assembled from published thermodynamic files is a caller concern. All
/// length-indexed curves tabulate loop sizes `0..=max_tabulated_loop`;
/// larger loops are extrapolated with `prelog` (see
/// [`weights::extrapolated_loop_dg`](super::weights::extrapolated_loop_dg)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyParams {
    /// Helix stack: closing pair then the pair stacked on it. Published
    /// sets satisfy the duplex-reading symmetry
    /// `stack[a][b][c][d] == stack[d][c][b][a]`, which the exterior
    /// recursion relies on.
    pub stack: QuadTable,
    /// Terminal mismatch stacks by loop context.
    pub mismatch_hairpin: QuadTable,
    pub mismatch_internal: QuadTable,
    pub mismatch_multi: QuadTable,
    pub mismatch_exterior: QuadTable,
    /// Dangling base 3' of a pair, and 5' of a pair.
    pub dangle3: DangleTable,
    pub dangle5: DangleTable,
    /// Loop-length penalty curves, indexed by number of unpaired bases.
    pub hairpin_by_len: Vec<f64>,
    pub bulge_by_len: Vec<f64>,
    pub internal_by_len: Vec<f64>,
    /// Coaxial stacking: flush, and the single-mismatch variant.
    pub coax_flush: QuadTable,
    pub coax_mismatch: QuadTable,
    /// Helix-end penalty for AU/GU closing pairs.
    pub terminal_au: f64,
    /// Affine multibranch-loop model: closure, per-branch, per-unpaired.
    pub ml_closure: f64,
    pub ml_branch: f64,
    pub ml_unpaired: f64,
    /// Poly-C hairpin penalties: per-base slope, intercept, and the
    /// single-C special case.
    pub polyc_slope: f64,
    pub polyc_intercept: f64,
    pub polyc_single: f64,
    /// Bonus for a bulged single cytidine.
    pub single_c_bulge: f64,
    /// Internal-loop asymmetry penalty per unit and its cap.
    pub asymmetry_per_unit: f64,
    pub asymmetry_max: f64,
    /// Entropic extrapolation coefficient for long loops.
    pub prelog: f64,
    /// Exact-sequence hairpin bonuses, keyed by the full loop including the
    /// closing pair (5, 6 and 8 characters respectively). Maps sit last so
    /// the set serializes cleanly to TOML.
    #[serde(default)]
    pub triloop_bonus: HashMap<String, f64>,
    #[serde(default)]
    pub tetraloop_bonus: HashMap<String, f64>,
    #[serde(default)]
    pub hexaloop_bonus: HashMap<String, f64>,
    /// Exact 1x1 and 2x2 internal-loop energies keyed by the two closing
    /// pairs plus the loop bases in 5'→3' order (6 and 8 characters); absent
    /// entries fall back to the generic mismatch model.
    #[serde(default)]
    pub internal_11: HashMap<String, f64>,
    #[serde(default)]
    pub internal_22: HashMap<String, f64>,
}

impl EnergyParams {
    /// Largest tabulated loop size, common to the three curves.
    pub fn max_tabulated_loop(&self) -> usize {
        self.hairpin_by_len.len() - 1
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ParamLoadError> {
        let params: EnergyParams =
            toml::from_str(content).map_err(|e| ParamLoadError::Toml {
                path: origin.to_string(),
                source: e,
            })?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.to_string_lossy())
    }

    fn validate(&self) -> Result<(), ParamLoadError> {
        let expected = self.hairpin_by_len.len() - 1;
        for (table, curve) in [
            ("bulge_by_len", &self.bulge_by_len),
            ("internal_by_len", &self.internal_by_len),
        ] {
            if curve.len() != expected + 1 {
                return Err(ParamLoadError::TableLength {
                    table,
                    expected,
                    found: curve.len().saturating_sub(1),
                });
            }
        }
        Ok(())
    }
}
