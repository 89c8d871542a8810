use crate::core::energy::model::DEFAULT_TEMPERATURE;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid parameter {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Numeric policies of a fold. Everything the recurrences treat as a
/// tunable constant lives here; parameter sets vary between published
/// thermodynamic tables, so none of these are hardcoded in the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldConfig {
    /// Absolute temperature the energy model is built at.
    pub temperature: f64,
    /// Initial per-nucleotide scaling factor.
    pub initial_scaling: f64,
    /// Accumulator magnitudes outside `[rescale_lower, rescale_upper]`
    /// trigger a corrective rescale.
    pub rescale_upper: f64,
    pub rescale_lower: f64,
    /// Largest internal/bulge loop the recurrence enumerates (total
    /// unpaired bases across both sides).
    pub max_internal_loop: usize,
    /// Minimum unpaired bases in a hairpin loop.
    pub min_hairpin_loop: usize,
    /// Minimum unpaired separation between consecutive multibranch helices.
    pub min_branch_separation: usize,
    /// Relative tolerance for the 5'/3' accumulator consistency check and
    /// the probability range check.
    pub consistency_tolerance: f64,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            initial_scaling: 0.62,
            rescale_upper: 1e60,
            rescale_lower: 1e-60,
            max_internal_loop: 30,
            min_hairpin_loop: 3,
            min_branch_separation: 0,
            consistency_tolerance: 1e-6,
        }
    }
}

impl FoldConfig {
    pub fn builder() -> FoldConfigBuilder {
        FoldConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("temperature", self.temperature),
            ("initial_scaling", self.initial_scaling),
            ("rescale_upper", self.rescale_upper),
            ("rescale_lower", self.rescale_lower),
            ("consistency_tolerance", self.consistency_tolerance),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidParameter {
                    name,
                    value,
                    reason: "must be positive and finite",
                });
            }
        }
        if self.rescale_lower >= self.rescale_upper {
            return Err(ConfigError::InvalidParameter {
                name: "rescale_lower",
                value: self.rescale_lower,
                reason: "must be below rescale_upper",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct FoldConfigBuilder {
    temperature: Option<f64>,
    initial_scaling: Option<f64>,
    rescale_upper: Option<f64>,
    rescale_lower: Option<f64>,
    max_internal_loop: Option<usize>,
    min_hairpin_loop: Option<usize>,
    min_branch_separation: Option<usize>,
    consistency_tolerance: Option<f64>,
}

impl FoldConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn initial_scaling(mut self, scaling: f64) -> Self {
        self.initial_scaling = Some(scaling);
        self
    }
    pub fn rescale_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.rescale_lower = Some(lower);
        self.rescale_upper = Some(upper);
        self
    }
    pub fn max_internal_loop(mut self, size: usize) -> Self {
        self.max_internal_loop = Some(size);
        self
    }
    pub fn min_hairpin_loop(mut self, size: usize) -> Self {
        self.min_hairpin_loop = Some(size);
        self
    }
    pub fn min_branch_separation(mut self, bases: usize) -> Self {
        self.min_branch_separation = Some(bases);
        self
    }
    pub fn consistency_tolerance(mut self, tolerance: f64) -> Self {
        self.consistency_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> Result<FoldConfig, ConfigError> {
        let defaults = FoldConfig::default();
        let config = FoldConfig {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            initial_scaling: self.initial_scaling.unwrap_or(defaults.initial_scaling),
            rescale_upper: self.rescale_upper.unwrap_or(defaults.rescale_upper),
            rescale_lower: self.rescale_lower.unwrap_or(defaults.rescale_lower),
            max_internal_loop: self.max_internal_loop.unwrap_or(defaults.max_internal_loop),
            min_hairpin_loop: self.min_hairpin_loop.unwrap_or(defaults.min_hairpin_loop),
            min_branch_separation: self
                .min_branch_separation
                .unwrap_or(defaults.min_branch_separation),
            consistency_tolerance: self
                .consistency_tolerance
                .unwrap_or(defaults.consistency_tolerance),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default_config() {
        let built = FoldConfig::builder().build().unwrap();
        assert_eq!(built, FoldConfig::default());
    }

    #[test]
    fn builder_overrides_selected_fields() {
        let config = FoldConfig::builder()
            .temperature(300.0)
            .initial_scaling(0.5)
            .min_branch_separation(1)
            .build()
            .unwrap();
        assert_eq!(config.temperature, 300.0);
        assert_eq!(config.initial_scaling, 0.5);
        assert_eq!(config.min_branch_separation, 1);
        assert_eq!(config.max_internal_loop, 30);
    }

    #[test]
    fn rejects_non_positive_scaling() {
        let err = FoldConfig::builder().initial_scaling(0.0).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "initial_scaling",
                ..
            }
        ));
    }

    #[test]
    fn rejects_inverted_rescale_bounds() {
        let err = FoldConfig::builder()
            .rescale_bounds(1e10, 1e-10)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "rescale_lower",
                ..
            }
        ));
    }
}
