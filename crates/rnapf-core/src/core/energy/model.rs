use super::params::{DangleTable, EnergyParams, QuadTable};
use super::weights::{boltzmann, extrapolated_loop_dg};
use crate::core::models::sequence::Base;
use std::collections::HashMap;
use tracing::warn;

/// Default folding temperature, in Kelvin.
pub const DEFAULT_TEMPERATURE: f64 = 310.15;

/// The kind of length-indexed loop curve to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Hairpin,
    Bulge,
    Internal,
}

/// Immutable, precomputed Boltzmann weights derived from an
/// [`EnergyParams`] set at a fixed temperature and global scaling factor.
///
/// Every stored weight already includes `scaling^k` for the `k` nucleotides
/// the corresponding term newly accounts for: stacks carry `scaling²`,
/// length curves `scaling^(size+2)`, dangles `scaling`, decoration
/// mismatches and mismatched coaxial stacks `scaling²`. Terms that account
/// no new nucleotides (end penalties, flush coaxial stacks, per-branch
/// multibranch weight) are pure equilibrium constants. The recurrence
/// multiplies [`base_scale`](Self::base_scale) (or
/// [`ml_base`](Self::ml_base) inside multibranch loops) once per plain
/// unpaired base and nothing else.
#[derive(Debug, Clone)]
pub struct EnergyModel {
    params: EnergyParams,
    temperature: f64,
    scaling: f64,

    stack: QuadTable,
    mismatch_hairpin: QuadTable,
    mismatch_internal: QuadTable,
    mismatch_multi: QuadTable,
    mismatch_exterior: QuadTable,
    dangle3: DangleTable,
    dangle5: DangleTable,
    hairpin_len: Vec<f64>,
    bulge_len: Vec<f64>,
    internal_len: Vec<f64>,
    hairpin_bonus: HashMap<Vec<u8>, f64>,
    internal_exact: HashMap<Vec<u8>, f64>,
    coax_flush: QuadTable,
    coax_mismatch: QuadTable,
    asymmetry: Vec<f64>,
    terminal_au: f64,
    ml_closure: f64,
    ml_branch: f64,
    ml_base: f64,
    ml_unpaired: f64,
    single_c_bulge: f64,
    polyc_slope: f64,
    polyc_intercept: f64,
    polyc_single: f64,
}

impl EnergyModel {
    pub fn new(params: EnergyParams, scaling: f64, temperature: f64) -> Self {
        assert!(
            scaling > 0.0 && scaling.is_finite(),
            "scaling factor must be positive and finite, got {scaling}"
        );
        let mut model = Self {
            params,
            temperature,
            scaling,
            stack: [[[[0.0; 4]; 4]; 4]; 4],
            mismatch_hairpin: [[[[0.0; 4]; 4]; 4]; 4],
            mismatch_internal: [[[[0.0; 4]; 4]; 4]; 4],
            mismatch_multi: [[[[0.0; 4]; 4]; 4]; 4],
            mismatch_exterior: [[[[0.0; 4]; 4]; 4]; 4],
            dangle3: [[[0.0; 4]; 4]; 4],
            dangle5: [[[0.0; 4]; 4]; 4],
            hairpin_len: Vec::new(),
            bulge_len: Vec::new(),
            internal_len: Vec::new(),
            hairpin_bonus: HashMap::new(),
            internal_exact: HashMap::new(),
            coax_flush: [[[[0.0; 4]; 4]; 4]; 4],
            coax_mismatch: [[[[0.0; 4]; 4]; 4]; 4],
            asymmetry: Vec::new(),
            terminal_au: 0.0,
            ml_closure: 0.0,
            ml_branch: 0.0,
            ml_base: 0.0,
            ml_unpaired: 0.0,
            single_c_bulge: 0.0,
            polyc_slope: 0.0,
            polyc_intercept: 0.0,
            polyc_single: 0.0,
        };
        model.rebuild();
        model
    }

    pub fn with_default_temperature(params: EnergyParams, scaling: f64) -> Self {
        Self::new(params, scaling, DEFAULT_TEMPERATURE)
    }

    /// Fold `factor` into the global scaling and rebuild every derived table
    /// so all point queries reflect the new scale.
    pub fn rescale(&mut self, factor: f64) {
        assert!(
            factor > 0.0 && factor.is_finite(),
            "rescale factor must be positive and finite, got {factor}"
        );
        self.scaling *= factor;
        self.rebuild();
    }

    #[inline]
    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    #[inline]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tabulated_loop(&self) -> usize {
        self.hairpin_len.len() - 1
    }

    /// Per plain unpaired nucleotide outside multibranch loops.
    #[inline]
    pub fn base_scale(&self) -> f64 {
        self.scaling
    }

    /// Per plain unpaired nucleotide inside a multibranch loop.
    #[inline]
    pub fn ml_base(&self) -> f64 {
        self.ml_base
    }

    /// The pure multibranch per-unpaired penalty, without the scaling the
    /// dangle and mismatch tables already carry for the bases they consume.
    #[inline]
    pub fn ml_unpaired_penalty(&self) -> f64 {
        self.ml_unpaired
    }

    /// Multibranch closure weight; accounts the closing pair.
    #[inline]
    pub fn ml_closure(&self) -> f64 {
        self.ml_closure
    }

    /// Per-branch multibranch weight.
    #[inline]
    pub fn ml_branch(&self) -> f64 {
        self.ml_branch
    }

    #[inline]
    pub fn terminal_au(&self) -> f64 {
        self.terminal_au
    }

    #[inline]
    pub fn single_c_bulge(&self) -> f64 {
        self.single_c_bulge
    }

    #[inline]
    pub(crate) fn stack_weight(&self, a: Base, b: Base, c: Base, d: Base) -> f64 {
        self.stack[a.index()][b.index()][c.index()][d.index()]
    }

    #[inline]
    pub(crate) fn mismatch_hairpin_weight(&self, a: Base, b: Base, x: Base, y: Base) -> f64 {
        self.mismatch_hairpin[a.index()][b.index()][x.index()][y.index()]
    }

    #[inline]
    pub(crate) fn mismatch_internal_weight(&self, a: Base, b: Base, x: Base, y: Base) -> f64 {
        self.mismatch_internal[a.index()][b.index()][x.index()][y.index()]
    }

    #[inline]
    pub(crate) fn mismatch_multi_weight(&self, a: Base, b: Base, x: Base, y: Base) -> f64 {
        self.mismatch_multi[a.index()][b.index()][x.index()][y.index()]
    }

    #[inline]
    pub(crate) fn mismatch_exterior_weight(&self, a: Base, b: Base, x: Base, y: Base) -> f64 {
        self.mismatch_exterior[a.index()][b.index()][x.index()][y.index()]
    }

    #[inline]
    pub(crate) fn dangle3_weight(&self, p5: Base, p3: Base, x: Base) -> f64 {
        self.dangle3[p5.index()][p3.index()][x.index()]
    }

    #[inline]
    pub(crate) fn dangle5_weight(&self, p5: Base, p3: Base, x: Base) -> f64 {
        self.dangle5[p5.index()][p3.index()][x.index()]
    }

    #[inline]
    pub(crate) fn coax_flush_weight(&self, a: Base, b: Base, c: Base, d: Base) -> f64 {
        self.coax_flush[a.index()][b.index()][c.index()][d.index()]
    }

    #[inline]
    pub(crate) fn coax_mismatch_weight(&self, a: Base, b: Base, x: Base, y: Base) -> f64 {
        self.coax_mismatch[a.index()][b.index()][x.index()][y.index()]
    }

    #[inline]
    pub(crate) fn asymmetry_weight(&self, l1: usize, l2: usize) -> f64 {
        let diff = l1.abs_diff(l2).min(self.asymmetry.len() - 1);
        self.asymmetry[diff]
    }

    /// Exact-sequence hairpin bonus for the loop `[i..=j]` including the
    /// closing pair, or 1.0 when none is tabulated.
    #[inline]
    pub(crate) fn hairpin_bonus_weight(&self, key: &[u8]) -> f64 {
        self.hairpin_bonus.get(key).copied().unwrap_or(1.0)
    }

    /// Exact 1x1/2x2 internal-loop weight (scaling included), if tabulated.
    #[inline]
    pub(crate) fn internal_exact_weight(&self, key: &[u8]) -> Option<f64> {
        self.internal_exact.get(key).copied()
    }

    /// Length-curve weight for a loop of `size` unpaired bases; sizes beyond
    /// the tabulated maximum use the entropic extrapolation. Includes
    /// `scaling^(size+2)`.
    pub(crate) fn loop_len_weight(&self, kind: LoopKind, size: usize) -> f64 {
        let curve = match kind {
            LoopKind::Hairpin => &self.hairpin_len,
            LoopKind::Bulge => &self.bulge_len,
            LoopKind::Internal => &self.internal_len,
        };
        let max = curve.len() - 1;
        if size <= max {
            return curve[size];
        }
        let raw = match kind {
            LoopKind::Hairpin => &self.params.hairpin_by_len,
            LoopKind::Bulge => &self.params.bulge_by_len,
            LoopKind::Internal => &self.params.internal_by_len,
        };
        let dg = extrapolated_loop_dg(raw[max], self.params.prelog, size, max);
        boltzmann(dg, self.temperature) * self.scaling.powi(size as i32 + 2)
    }

    /// A digest of the underlying parameter set and temperature, stored in
    /// save files to detect mismatched re-loads. Independent of the current
    /// scaling factor, which is persisted separately.
    pub fn fingerprint(&self) -> [u8; 16] {
        let p = &self.params;
        let mut sum = 0.0f64;
        let mut weighted = 0.0f64;
        let mut k = 1.0f64;
        let mut absorb = |v: f64| {
            sum += v;
            weighted += v * k;
            k += std::f64::consts::SQRT_2;
        };
        absorb(self.temperature);
        absorb(p.terminal_au);
        absorb(p.ml_closure);
        absorb(p.ml_branch);
        absorb(p.ml_unpaired);
        absorb(p.prelog);
        for curve in [&p.hairpin_by_len, &p.bulge_by_len, &p.internal_by_len] {
            for &v in curve.iter().filter(|v| v.is_finite()) {
                absorb(v);
            }
        }
        for table in [
            &p.stack,
            &p.mismatch_hairpin,
            &p.mismatch_internal,
            &p.mismatch_multi,
            &p.mismatch_exterior,
            &p.coax_flush,
            &p.coax_mismatch,
        ] {
            for plane in table {
                for row in plane {
                    for cell in row {
                        for &v in cell.iter().filter(|v| v.is_finite()) {
                            absorb(v);
                        }
                    }
                }
            }
        }
        for table in [&p.dangle3, &p.dangle5] {
            for row in table {
                for cell in row {
                    for &v in cell.iter().filter(|v| v.is_finite()) {
                        absorb(v);
                    }
                }
            }
        }
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&sum.to_le_bytes());
        out[8..].copy_from_slice(&weighted.to_le_bytes());
        out
    }

    fn rebuild(&mut self) {
        let t = self.temperature;
        let s = self.scaling;
        let s2 = s * s;

        let quad = |table: &QuadTable, scale: f64| -> QuadTable {
            let mut out = [[[[0.0; 4]; 4]; 4]; 4];
            for a in 0..4 {
                for b in 0..4 {
                    for c in 0..4 {
                        for d in 0..4 {
                            out[a][b][c][d] = boltzmann(table[a][b][c][d], t) * scale;
                        }
                    }
                }
            }
            out
        };
        let dangle = |table: &DangleTable| -> DangleTable {
            let mut out = [[[0.0; 4]; 4]; 4];
            for a in 0..4 {
                for b in 0..4 {
                    for c in 0..4 {
                        out[a][b][c] = boltzmann(table[a][b][c], t) * s;
                    }
                }
            }
            out
        };
        let curve = |raw: &[f64]| -> Vec<f64> {
            raw.iter()
                .enumerate()
                .map(|(size, &dg)| boltzmann(dg, t) * s.powi(size as i32 + 2))
                .collect()
        };

        self.stack = quad(&self.params.stack, s2);
        self.mismatch_hairpin = quad(&self.params.mismatch_hairpin, 1.0);
        self.mismatch_internal = quad(&self.params.mismatch_internal, 1.0);
        self.mismatch_multi = quad(&self.params.mismatch_multi, s2);
        self.mismatch_exterior = quad(&self.params.mismatch_exterior, s2);
        self.dangle3 = dangle(&self.params.dangle3);
        self.dangle5 = dangle(&self.params.dangle5);
        self.hairpin_len = curve(&self.params.hairpin_by_len);
        self.bulge_len = curve(&self.params.bulge_by_len);
        self.internal_len = curve(&self.params.internal_by_len);
        self.coax_flush = quad(&self.params.coax_flush, 1.0);
        self.coax_mismatch = quad(&self.params.coax_mismatch, s2);

        let mut hairpin_bonus = HashMap::new();
        for bonuses in [
            &self.params.triloop_bonus,
            &self.params.tetraloop_bonus,
            &self.params.hexaloop_bonus,
        ] {
            for (key, &dg) in bonuses {
                if let Some(encoded) = encode_key(key) {
                    hairpin_bonus.insert(encoded, boltzmann(dg, t));
                } else {
                    warn!(key = %key, "Skipping hairpin bonus with non-nucleotide key");
                }
            }
        }
        self.hairpin_bonus = hairpin_bonus;

        let mut internal_exact = HashMap::new();
        for (map, size) in [(&self.params.internal_11, 2usize), (&self.params.internal_22, 4)] {
            for (key, &dg) in map {
                if let Some(encoded) = encode_key(key) {
                    internal_exact.insert(encoded, boltzmann(dg, t) * s.powi(size as i32 + 2));
                } else {
                    warn!(key = %key, "Skipping exact internal-loop entry with non-nucleotide key");
                }
            }
        }
        self.internal_exact = internal_exact;

        let cap = if self.params.asymmetry_per_unit > 0.0 {
            (self.params.asymmetry_max / self.params.asymmetry_per_unit).ceil() as usize + 1
        } else {
            1
        };
        self.asymmetry = (0..=cap)
            .map(|d| {
                let dg = (d as f64 * self.params.asymmetry_per_unit).min(self.params.asymmetry_max);
                boltzmann(dg, t)
            })
            .collect();

        self.terminal_au = boltzmann(self.params.terminal_au, t);
        self.ml_closure = boltzmann(self.params.ml_closure, t) * s2;
        self.ml_branch = boltzmann(self.params.ml_branch, t);
        self.ml_unpaired = boltzmann(self.params.ml_unpaired, t);
        self.ml_base = self.ml_unpaired * s;
        self.single_c_bulge = boltzmann(self.params.single_c_bulge, t);
        self.polyc_slope = boltzmann(self.params.polyc_slope, t);
        self.polyc_intercept = boltzmann(self.params.polyc_intercept, t);
        self.polyc_single = boltzmann(self.params.polyc_single, t);
    }

    /// Poly-C hairpin penalty weight for a loop of `size` cytidines.
    #[inline]
    pub(crate) fn polyc_weight(&self, size: usize) -> f64 {
        if size == 1 {
            self.polyc_single
        } else {
            self.polyc_intercept * self.polyc_slope.powi(size as i32)
        }
    }
}

fn encode_key(key: &str) -> Option<Vec<u8>> {
    key.chars()
        .map(|c| Base::from_char(c).map(|b| b.index() as u8))
        .collect()
}
