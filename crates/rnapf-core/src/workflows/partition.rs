use crate::core::energy::model::EnergyModel;
use crate::core::io::pfs::{PartitionSaveData, PartitionSaveFile, SaveError};
use crate::core::io::traits::SaveFile;
use crate::core::models::constraints::FoldConstraints;
use crate::core::models::sequence::RnaSequence;
use crate::engine::config::FoldConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::recurrence::RecurrenceEngine;
use crate::engine::tables::FoldTables;
use itertools::Itertools;
use std::path::Path;
use tracing::{info, instrument};

/// A completed fold: everything needed to extract base-pair probabilities
/// or persist the computation for later reuse.
#[derive(Debug, Clone)]
pub struct FoldState {
    sequence: RnaSequence,
    constraints: FoldConstraints,
    config: FoldConfig,
    fingerprint: [u8; 16],
    scaling: f64,
    tables: FoldTables,
}

/// Compute the equilibrium partition function of `sequence` under
/// `constraints`, with the Boltzmann weights of `model`.
///
/// The model's scaling factor is the starting point; the engine rescales in
/// flight as magnitudes drift, and the final factor is carried in the
/// returned state. One progress increment and one cancellation checkpoint
/// fire per span.
#[instrument(skip_all, name = "partition_workflow")]
pub fn run(
    sequence: &RnaSequence,
    constraints: &FoldConstraints,
    model: &EnergyModel,
    config: &FoldConfig,
    reporter: &ProgressReporter,
) -> Result<FoldState, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    config.validate()?;
    if constraints.len() != sequence.len() {
        return Err(EngineError::usage(format!(
            "constraint arrays cover {} positions but the sequence has {}",
            constraints.len(),
            sequence.len()
        )));
    }
    info!(
        n = sequence.len(),
        scaling = model.scaling(),
        temperature = model.temperature(),
        "starting partition function computation"
    );
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Partition Function Scan",
    });
    let mut working_model = model.clone();
    let engine = RecurrenceEngine::new(sequence, constraints, config);
    let tables = engine.fill(&mut working_model, reporter)?;
    reporter.report(Progress::PhaseFinish);

    let state = FoldState {
        sequence: sequence.clone(),
        constraints: constraints.clone(),
        config: config.clone(),
        fingerprint: working_model.fingerprint(),
        scaling: working_model.scaling(),
        tables,
    };
    info!(
        total = state.total_partition_function(),
        scaling = state.scaling,
        "fold complete"
    );
    Ok(state)
}

impl FoldState {
    pub fn sequence(&self) -> &RnaSequence {
        &self.sequence
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    /// The grand total partition function, reported unscaled so values are
    /// comparable across scaling choices. A length-1 sequence yields
    /// exactly 1.
    pub fn total_partition_function(&self) -> f64 {
        let n = self.sequence.len();
        self.tables.w5[n] / self.scaling.powi(n as i32)
    }

    /// Equilibrium probability that `i` and `j` are base paired.
    ///
    /// The argument order is symmetric; `i == j` is 0 by definition. A
    /// value outside `[0, 1]` beyond the configured tolerance indicates a
    /// recurrence or rescaling defect and surfaces as a consistency error,
    /// never a silent clamp.
    pub fn probability(&self, i: usize, j: usize) -> Result<f64, EngineError> {
        let n = self.sequence.len();
        if i == 0 || j == 0 || i > n || j > n {
            return Err(EngineError::usage(format!(
                "pair ({i}, {j}) outside sequence range 1..={n}"
            )));
        }
        if i == j {
            return Ok(0.0);
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };

        let q = self.tables.w5[n];
        if q == 0.0 {
            return Err(EngineError::usage(
                "the constraints admit no structure; the partition function is zero",
            ));
        }
        let interior = self.tables.v.get(i, j);
        if interior == 0.0 {
            return Ok(0.0);
        }
        let exterior = self.tables.v.get(j, i + n);
        let p = interior * exterior / (q * self.scaling * self.scaling);

        let tol = self.config.consistency_tolerance;
        if !(0.0..=1.0 + tol).contains(&p) {
            return Err(EngineError::consistency(format!(
                "probability({i}, {j}) = {p:e} outside [0, 1]"
            )));
        }
        Ok(p)
    }

    /// Probability that position `i` is unpaired, as the complement of all
    /// its pairing probabilities.
    pub fn unpaired_probability(&self, i: usize) -> Result<f64, EngineError> {
        let n = self.sequence.len();
        let mut paired = 0.0;
        for j in 1..=n {
            if j != i {
                paired += self.probability(i, j)?;
            }
        }
        let tol = self.config.consistency_tolerance;
        if paired > 1.0 + tol {
            return Err(EngineError::consistency(format!(
                "pairing probabilities of position {i} sum to {paired:e}"
            )));
        }
        Ok((1.0 - paired).max(0.0))
    }

    /// All pairs with nonzero probability, in lexicographic order.
    pub fn pair_probabilities(&self) -> Result<Vec<(usize, usize, f64)>, EngineError> {
        let n = self.sequence.len();
        let mut out = Vec::new();
        for (i, j) in (1..=n).tuple_combinations() {
            let p = self.probability(i, j)?;
            if p > 0.0 {
                out.push((i, j, p));
            }
        }
        Ok(out)
    }

    /// Persist the fold to the binary save format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        PartitionSaveFile::write_to_path(&self.to_save_data(), path)?;
        Ok(())
    }

    /// Reload a persisted fold for probability extraction, validating that
    /// the sequence and energy model match the ones it was computed with.
    pub fn load<P: AsRef<Path>>(
        path: P,
        sequence: &RnaSequence,
        model: &EnergyModel,
        config: &FoldConfig,
    ) -> Result<FoldState, EngineError> {
        let data = PartitionSaveFile::read_from_path(path)?;
        let n = sequence.len();
        if data.sequence_length != n {
            return Err(EngineError::Save(SaveError::LengthMismatch {
                found: data.sequence_length,
                expected: n,
            }));
        }
        let fingerprint = model.fingerprint();
        if data.fingerprint != fingerprint {
            return Err(EngineError::Save(SaveError::FingerprintMismatch));
        }

        let mut tables = FoldTables::new(n);
        for (array, band) in tables.arrays_mut().into_iter().zip(data.tables.iter()) {
            let mut cells = band.iter().copied();
            array.fill_from(|| cells.next().unwrap_or(0.0));
        }
        tables.w5 = data.w5;
        let mut w3 = vec![0.0];
        w3.extend_from_slice(&data.w3);
        tables.w3 = w3;

        Ok(FoldState {
            sequence: sequence.clone(),
            constraints: FoldConstraints::from_flags(data.forced_unpaired, data.forced_paired),
            config: config.clone(),
            fingerprint,
            scaling: data.scaling,
            tables,
        })
    }

    fn to_save_data(&self) -> PartitionSaveData {
        let n = self.sequence.len();
        let tables: [Vec<f64>; 6] = self.tables.arrays().map(|array| {
            let mut band = Vec::with_capacity(n * n);
            array.for_each(|_, _, value| band.push(value));
            band
        });
        PartitionSaveData {
            sequence_length: n,
            scaling: self.scaling,
            fingerprint: self.fingerprint,
            tables,
            w5: self.tables.w5.clone(),
            w3: self.tables.w3[1..].to_vec(),
            forced_unpaired: self.constraints.forced_unpaired_flags().to_vec(),
            forced_paired: self.constraints.forced_paired_flags().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::model::DEFAULT_TEMPERATURE;
    use crate::core::energy::params::fixtures::{test_params, test_params_full};
    use crate::core::energy::queries;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn fold(seq: &str, scaling: f64) -> FoldState {
        fold_with(seq, scaling, FoldConstraints::none(seq.len()), test_params())
    }

    fn fold_with(
        seq: &str,
        scaling: f64,
        cons: FoldConstraints,
        params: crate::core::energy::params::EnergyParams,
    ) -> FoldState {
        let sequence: RnaSequence = seq.parse().unwrap();
        let config = FoldConfig {
            initial_scaling: scaling,
            ..FoldConfig::default()
        };
        let model = EnergyModel::new(params, scaling, config.temperature);
        run(
            &sequence,
            &cons,
            &model,
            &config,
            &ProgressReporter::new(),
        )
        .expect("fold should succeed")
    }

    /// Exhaustive structure enumeration with the same point queries the
    /// engine uses; the reference the dynamic program is checked against.
    struct Brute<'a> {
        seq: &'a RnaSequence,
        cons: &'a FoldConstraints,
        model: &'a EnergyModel,
        config: &'a FoldConfig,
        n: usize,
    }

    type Weighted = (f64, Vec<(usize, usize)>);

    impl<'a> Brute<'a> {
        fn pair_ok(&self, i: usize, j: usize) -> bool {
            queries::can_pair(self.seq, self.cons, i, j)
                && j - i - 1 >= self.config.min_hairpin_loop
        }

        /// All structures of the suffix `[i..=n]` in an exterior context.
        fn exterior(&self, i: usize) -> Vec<Weighted> {
            if i > self.n {
                return vec![(1.0, Vec::new())];
            }
            let mut out = Vec::new();
            if !self.cons.is_forced_paired(i) {
                for (w, ps) in self.exterior(i + 1) {
                    out.push((self.model.base_scale() * w, ps));
                }
            }
            for k in i + 1..=self.n {
                if !self.pair_ok(i, k) {
                    continue;
                }
                let pen = queries::end_penalty(self.model, self.seq, i, k);
                for (vw, vps) in self.paired(i, k) {
                    for (rw, rps) in self.exterior(k + 1) {
                        let mut pairs = vps.clone();
                        pairs.push((i, k));
                        pairs.extend_from_slice(&rps);
                        out.push((pen * vw * rw, pairs));
                    }
                }
            }
            out
        }

        /// All structures in which `(i, j)` is a pair; weights follow the
        /// paired-table semantics (the pair's own closure included).
        fn paired(&self, i: usize, j: usize) -> Vec<Weighted> {
            let mut out = Vec::new();
            let hp = queries::hairpin(self.model, self.seq, self.cons, i, j);
            if hp > 0.0 {
                out.push((hp, Vec::new()));
            }
            // Exactly one inner pair: stack, bulge or internal loop.
            for ip in i + 1..j {
                for jp in ip + 1..j {
                    if !self.pair_ok(ip, jp) {
                        continue;
                    }
                    let l = (ip - i - 1) + (j - jp - 1);
                    let w = if l == 0 {
                        queries::stacked_pair(self.model, self.seq, i, j)
                    } else if l <= self.config.max_internal_loop {
                        queries::internal_loop(self.model, self.seq, self.cons, i, j, ip, jp)
                    } else {
                        continue;
                    };
                    for (vw, mut vps) in self.paired(ip, jp) {
                        vps.push((ip, jp));
                        out.push((w * vw, vps));
                    }
                }
            }
            // Multibranch closure: two or more inner branches.
            let pen = queries::end_penalty(self.model, self.seq, j, i);
            for (w, ps, branches) in self.ml_content(i + 1, j - 1) {
                if branches >= 2 {
                    out.push((self.model.ml_closure() * pen * w, ps));
                }
            }
            out
        }

        /// Arrangements of a multibranch interior: unpaired bases and
        /// branch helices.
        fn ml_content(&self, lo: usize, hi: usize) -> Vec<(f64, Vec<(usize, usize)>, usize)> {
            if lo > hi {
                return vec![(1.0, Vec::new(), 0)];
            }
            let mut out = Vec::new();
            if !self.cons.is_forced_paired(lo) {
                for (w, ps, m) in self.ml_content(lo + 1, hi) {
                    out.push((self.model.ml_base() * w, ps, m));
                }
            }
            for k in lo + 1..=hi {
                if !self.pair_ok(lo, k) {
                    continue;
                }
                let branch = self.model.ml_branch()
                    * queries::end_penalty(self.model, self.seq, lo, k);
                for (vw, vps) in self.paired(lo, k) {
                    for (rw, rps, m) in self.ml_content(k + 1, hi) {
                        let mut pairs = vps.clone();
                        pairs.push((lo, k));
                        pairs.extend_from_slice(&rps);
                        out.push((branch * vw * rw, pairs, m + 1));
                    }
                }
            }
            out
        }

        fn totals(&self) -> (f64, HashMap<(usize, usize), f64>) {
            let mut q = 0.0;
            let mut by_pair: HashMap<(usize, usize), f64> = HashMap::new();
            for (w, pairs) in self.exterior(1) {
                q += w;
                for pair in pairs {
                    *by_pair.entry(pair).or_insert(0.0) += w;
                }
            }
            (q, by_pair)
        }
    }

    fn assert_matches_brute_force(seq_str: &str, scaling: f64) {
        let sequence: RnaSequence = seq_str.parse().unwrap();
        let n = sequence.len();
        let cons = FoldConstraints::none(n);
        let config = FoldConfig {
            initial_scaling: scaling,
            ..FoldConfig::default()
        };
        let model = EnergyModel::new(test_params(), scaling, config.temperature);
        let state = run(
            &sequence,
            &cons,
            &model,
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();

        let brute = Brute {
            seq: &sequence,
            cons: &cons,
            model: &model,
            config: &config,
            n,
        };
        let (q_brute, by_pair) = brute.totals();

        assert_relative_eq!(state.tables.w5[n], q_brute, max_relative = 1e-9);
        assert_relative_eq!(state.tables.w3[1], q_brute, max_relative = 1e-9);

        for i in 1..=n {
            for j in i + 1..=n {
                let expected = by_pair.get(&(i, j)).copied().unwrap_or(0.0) / q_brute;
                let got = state.probability(i, j).unwrap();
                assert!(
                    (got - expected).abs() < 1e-9,
                    "probability({i}, {j}) = {got}, enumeration gives {expected}"
                );
            }
        }
    }

    #[test]
    fn matches_exhaustive_enumeration_for_a_hairpin() {
        assert_matches_brute_force("GGGAAACCC", 1.0);
    }

    #[test]
    fn matches_exhaustive_enumeration_with_competing_registers() {
        assert_matches_brute_force("GCGAAAUACGC", 1.0);
    }

    #[test]
    fn matches_exhaustive_enumeration_with_a_multibranch_loop() {
        // (1,12) can close a multiloop over the branches (2,6) and (7,11).
        assert_matches_brute_force("GGAAACGAAACC", 1.0);
    }

    #[test]
    fn matches_exhaustive_enumeration_under_scaling() {
        assert_matches_brute_force("GGGAAACCC", 0.5);
        assert_matches_brute_force("GCAUCAAAGAUGC", 0.8);
    }

    #[test]
    fn length_one_sequence_is_trivially_unpaired() {
        let state = fold("G", 0.7);
        assert_relative_eq!(state.total_partition_function(), 1.0, max_relative = 1e-12);
        assert_eq!(state.probability(1, 1).unwrap(), 0.0);
        assert!(state.pair_probabilities().unwrap().is_empty());
    }

    #[test]
    fn probabilities_lie_in_unit_interval_with_full_model() {
        let state = fold_with(
            "GGGAAACCCAGGGAAACCC",
            0.9,
            FoldConstraints::none(19),
            test_params_full(),
        );
        for (_, _, p) in state.pair_probabilities().unwrap() {
            assert!((0.0..=1.0 + 1e-9).contains(&p));
        }
    }

    #[test]
    fn pairing_probabilities_conserve_per_position() {
        let state = fold("GCGCAAAAGCGC", 1.0);
        for i in 1..=12 {
            let unpaired = state.unpaired_probability(i).unwrap();
            let mut total = unpaired;
            for j in 1..=12 {
                if j != i {
                    total += state.probability(i, j).unwrap();
                }
            }
            assert_relative_eq!(total, 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn stable_hairpin_dominates_the_ensemble() {
        let state = fold("GGGGAAAACCCC", 1.0);
        assert!(state.probability(1, 12).unwrap() > 0.5);
        assert!(state.probability(2, 11).unwrap() > 0.5);
        assert!(state.probability(3, 10).unwrap() > 0.5);
        // A shifted register is far less likely.
        assert!(state.probability(1, 9).unwrap() < 0.1);
    }

    #[test]
    fn probabilities_are_invariant_under_initial_scaling() {
        let a = fold("GGGGAAAACCCC", 1.0);
        let b = fold("GGGGAAAACCCC", 0.3);
        assert_relative_eq!(
            a.total_partition_function(),
            b.total_partition_function(),
            max_relative = 1e-6
        );
        for i in 1..=12 {
            for j in i + 1..=12 {
                assert_relative_eq!(
                    a.probability(i, j).unwrap(),
                    b.probability(i, j).unwrap(),
                    epsilon = 1e-9,
                    max_relative = 1e-6
                );
            }
        }
    }

    #[test]
    fn forced_unpaired_position_has_zero_pair_probabilities() {
        let mut cons = FoldConstraints::none(12);
        cons.force_unpaired(3).unwrap();
        let state = fold_with("GGGGAAAACCCC", 1.0, cons, test_params());
        for j in 1..=12 {
            if j != 3 {
                assert_eq!(state.probability(3, j).unwrap(), 0.0);
            }
        }
        assert_relative_eq!(state.unpaired_probability(3).unwrap(), 1.0);
    }

    #[test]
    fn out_of_range_pair_is_a_usage_error() {
        let state = fold("GGGAAACCC", 1.0);
        assert!(matches!(
            state.probability(0, 4),
            Err(EngineError::Usage(_))
        ));
        assert!(matches!(
            state.probability(2, 10),
            Err(EngineError::Usage(_))
        ));
    }

    #[test]
    fn save_and_load_reproduce_the_state_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fold.rpfs");
        let state = fold("GGGGAAAACCCC", 0.8);
        state.save(&path).unwrap();

        let sequence: RnaSequence = "GGGGAAAACCCC".parse().unwrap();
        let config = FoldConfig {
            initial_scaling: 0.8,
            ..FoldConfig::default()
        };
        let model = EnergyModel::new(test_params(), 0.8, config.temperature);
        let loaded = FoldState::load(&path, &sequence, &model, &config).unwrap();

        assert_eq!(loaded.scaling.to_bits(), state.scaling.to_bits());
        assert_eq!(loaded.tables, state.tables);
        for i in 1..=12 {
            for j in i + 1..=12 {
                assert_eq!(
                    loaded.probability(i, j).unwrap().to_bits(),
                    state.probability(i, j).unwrap().to_bits()
                );
            }
        }
    }

    #[test]
    fn load_rejects_a_different_sequence_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fold.rpfs");
        fold("GGGGAAAACCCC", 1.0).save(&path).unwrap();

        let other: RnaSequence = "GGGAAACCC".parse().unwrap();
        let config = FoldConfig::default();
        let model = EnergyModel::new(test_params(), 1.0, config.temperature);
        let result = FoldState::load(&path, &other, &model, &config);
        assert!(matches!(
            result,
            Err(EngineError::Save(SaveError::LengthMismatch {
                found: 12,
                expected: 9
            }))
        ));
    }

    #[test]
    fn load_rejects_a_different_parameter_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fold.rpfs");
        fold("GGGGAAAACCCC", 1.0).save(&path).unwrap();

        let sequence: RnaSequence = "GGGGAAAACCCC".parse().unwrap();
        let config = FoldConfig::default();
        let model = EnergyModel::new(test_params_full(), 1.0, config.temperature);
        let result = FoldState::load(&path, &sequence, &model, &config);
        assert!(matches!(
            result,
            Err(EngineError::Save(SaveError::FingerprintMismatch))
        ));
    }

    #[test]
    fn mismatched_constraint_length_is_a_usage_error() {
        let sequence: RnaSequence = "GGGAAACCC".parse().unwrap();
        let cons = FoldConstraints::none(5);
        let config = FoldConfig::default();
        let model = EnergyModel::new(test_params(), 1.0, config.temperature);
        let result = run(
            &sequence,
            &cons,
            &model,
            &config,
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::Usage(_))));
    }
}
