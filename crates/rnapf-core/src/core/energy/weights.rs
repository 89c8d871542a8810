/// Gas constant in kcal/(mol·K).
pub const GAS_CONSTANT: f64 = 0.001_987_2;

/// Free energies at or above this threshold are treated as prohibitive and
/// map to a zero Boltzmann weight.
pub const PROHIBITIVE_DG: f64 = 600.0;

/// Convert a free energy (kcal/mol) into an equilibrium weight at the given
/// absolute temperature.
#[inline]
pub fn boltzmann(dg_kcal: f64, temperature: f64) -> f64 {
    if dg_kcal >= PROHIBITIVE_DG || dg_kcal.is_infinite() {
        return 0.0;
    }
    (-dg_kcal / (GAS_CONSTANT * temperature)).exp()
}

/// Jacobson-Stockmayer entropic extrapolation for loop sizes beyond the
/// tabulated maximum: `dg(n) = dg(max) + prelog·ln(n/max)`.
#[inline]
pub fn extrapolated_loop_dg(dg_at_max: f64, prelog: f64, size: usize, max_tabulated: usize) -> f64 {
    debug_assert!(size > max_tabulated);
    dg_at_max + prelog * (size as f64 / max_tabulated as f64).ln()
}

/// Internal-loop asymmetry penalty, capped at `max_penalty`.
#[inline]
pub fn asymmetry_dg(l1: usize, l2: usize, per_unit: f64, max_penalty: f64) -> f64 {
    let asym = l1.abs_diff(l2) as f64;
    (asym * per_unit).min(max_penalty)
}
