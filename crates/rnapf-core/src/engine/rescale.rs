//! Proactive magnitude control for the span scan.
//!
//! Partition-function magnitudes grow roughly exponentially with span. The
//! controller watches the freshly finalized accumulator (or, in the wrapped
//! pass, the largest new table entry) after every span and, when it drifts
//! outside the configured bounds, folds a corrective per-nucleotide factor
//! into every live table, both accumulators and the energy model in
//! lockstep. Ratios between entries are untouched, so derived probabilities
//! are invariant; only the common scale moves.

use super::config::FoldConfig;
use super::error::EngineError;
use super::tables::FoldTables;
use crate::core::energy::model::EnergyModel;
use tracing::debug;

pub(crate) struct RescalingController {
    upper: f64,
    lower: f64,
    events: usize,
}

impl RescalingController {
    pub(crate) fn new(config: &FoldConfig) -> Self {
        Self {
            upper: config.rescale_upper,
            lower: config.rescale_lower,
            events: 0,
        }
    }

    pub(crate) fn events(&self) -> usize {
        self.events
    }

    /// Inspect the leading magnitude after a span of entries covering
    /// `width` nucleotides; apply a corrective rescale when it drifts out
    /// of bounds.
    pub(crate) fn observe(
        &mut self,
        magnitude: f64,
        width: usize,
        span: usize,
        tables: &mut FoldTables,
        model: &mut EnergyModel,
    ) -> Result<(), EngineError> {
        if magnitude == 0.0 || (self.lower..=self.upper).contains(&magnitude) {
            return Ok(());
        }
        let factor = (1.0 / magnitude).powf(1.0 / width as f64);
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::ScalingExhausted { span, factor });
        }
        self.apply(tables, model, factor);
        self.events += 1;
        debug!(
            span,
            magnitude, factor, scaling = model.scaling(),
            "applied corrective rescale"
        );
        Ok(())
    }

    /// Multiply every live value by `factor^covered_bases` and fold the
    /// factor into the model's global scaling. Every table moves in
    /// lockstep; a partial application would silently corrupt later
    /// probability extraction.
    fn apply(&self, tables: &mut FoldTables, model: &mut EnergyModel, factor: f64) {
        for array in tables.arrays_mut() {
            array.rescale_by_width(factor);
        }
        let n = tables.size();
        let mut prefix = 1.0;
        for k in 1..=n {
            prefix *= factor;
            tables.w5[k] *= prefix;
        }
        let mut suffix = 1.0;
        for k in (1..=n).rev() {
            suffix *= factor;
            tables.w3[k] *= suffix;
        }
        model.rescale(factor);
    }
}
