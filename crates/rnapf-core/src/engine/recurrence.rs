//! The mutually recursive span scan.
//!
//! The scan runs in two passes over increasing span `h = j - i`. Pass one
//! fills the interior entries (`j <= n`) and finalizes the accumulators
//! `w5[h+1]` and `w3[n-h]` as each span completes. Pass two fills the
//! wrapped entries (`j > n`): cell `(i, j)` is the exterior fragment
//! `[i..n]∪[1..j-n]` of the real pair `(j-n, i)`, the quantity the
//! probability formula multiplies against the interior `v`.
//!
//! Every cell reads only strictly smaller spans (or same-cell values passed
//! locally between stages), so the within-span compute pass is embarrassingly
//! parallel; the `parallel` feature fans it out with rayon and the commit,
//! accumulator update, rescale check and progress checkpoint stay sequential.

use super::config::FoldConfig;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use super::rescale::RescalingController;
use super::tables::FoldTables;
use crate::core::energy::model::EnergyModel;
use crate::core::energy::queries;
use crate::core::models::constraints::FoldConstraints;
use crate::core::models::sequence::RnaSequence;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Values of one cell, staged before the sequential commit.
#[derive(Debug, Clone, Copy, Default)]
struct CellUpdate {
    v: f64,
    wl: f64,
    wcoax: f64,
    w: f64,
    wmbl: f64,
    wmb: f64,
}

pub(crate) struct RecurrenceEngine<'a> {
    seq: &'a RnaSequence,
    cons: &'a FoldConstraints,
    config: &'a FoldConfig,
    n: usize,
}

impl<'a> RecurrenceEngine<'a> {
    pub(crate) fn new(
        seq: &'a RnaSequence,
        cons: &'a FoldConstraints,
        config: &'a FoldConfig,
    ) -> Self {
        Self {
            seq,
            cons,
            config,
            n: seq.len(),
        }
    }

    /// Run the full scan, returning the filled tables.
    pub(crate) fn fill(
        &self,
        model: &mut EnergyModel,
        reporter: &ProgressReporter,
    ) -> Result<FoldTables, EngineError> {
        let n = self.n;
        let mut tables = FoldTables::new(n);
        let mut rescaler = RescalingController::new(self.config);

        let total_spans = (2 * n).saturating_sub(2) as u64;
        reporter.report(Progress::TaskStart {
            total_steps: total_spans,
        });

        // Single-base prefixes before any span exists.
        tables.w5[1] = if self.cons.is_forced_paired(1) {
            0.0
        } else {
            model.base_scale()
        };
        tables.w3[n] = if self.cons.is_forced_paired(n) {
            0.0
        } else {
            model.base_scale()
        };

        // Pass one: interior spans.
        for h in 1..n {
            self.checkpoint(reporter, h)?;
            let starts: Vec<usize> = (1..=n - h).collect();
            self.fill_span(&mut tables, model, h, &starts);
            self.update_w5(&mut tables, model, h + 1);
            self.update_w3(&mut tables, model, n - h);
            let magnitude = tables.w5[h + 1].abs().max(tables.w3[n - h].abs());
            rescaler.observe(magnitude, h + 1, h, &mut tables, model)?;
            reporter.report(Progress::TaskIncrement);
        }

        // Pass two: wrapped (exterior) spans.
        for h in 1..n {
            let span = n - 1 + h;
            self.checkpoint(reporter, span)?;
            let starts: Vec<usize> = (n - h + 1..=n).collect();
            self.fill_span(&mut tables, model, h, &starts);
            let mut magnitude = 0.0f64;
            for &i in &starts {
                magnitude = magnitude.max(tables.v.get(i, i + h).abs());
            }
            rescaler.observe(magnitude, h + 1, span, &mut tables, model)?;
            reporter.report(Progress::TaskIncrement);
        }

        reporter.report(Progress::TaskFinish);
        debug!(
            n,
            rescales = rescaler.events(),
            scaling = model.scaling(),
            "recurrence scan complete"
        );

        self.check_accumulator_agreement(&tables)?;
        Ok(tables)
    }

    fn checkpoint(&self, reporter: &ProgressReporter, span: usize) -> Result<(), EngineError> {
        if reporter.is_cancelled() {
            return Err(EngineError::Cancelled { span });
        }
        Ok(())
    }

    fn fill_span(&self, tables: &mut FoldTables, model: &EnergyModel, h: usize, starts: &[usize]) {
        let snapshot: &FoldTables = tables;

        #[cfg(feature = "parallel")]
        let updates: Vec<(usize, CellUpdate)> = starts
            .par_iter()
            .map(|&i| (i, self.compute_cell(snapshot, model, i, i + h)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let updates: Vec<(usize, CellUpdate)> = starts
            .iter()
            .map(|&i| (i, self.compute_cell(snapshot, model, i, i + h)))
            .collect();

        for (i, update) in updates {
            let j = i + h;
            tables.v.set(i, j, update.v);
            tables.wl.set(i, j, update.wl);
            tables.wcoax.set(i, j, update.wcoax);
            tables.w.set(i, j, update.w);
            tables.wmbl.set(i, j, update.wmbl);
            tables.wmb.set(i, j, update.wmb);
        }
    }

    /// All six values of cell `(i, j)`. Cross-cell reads touch strictly
    /// smaller spans; same-cell stage dependencies flow through locals.
    fn compute_cell(
        &self,
        t: &FoldTables,
        model: &EnergyModel,
        i: usize,
        j: usize,
    ) -> CellUpdate {
        let v = self.compute_v(t, model, i, j);
        let wl = self.compute_wl(t, model, i, j, v);
        let wcoax = self.compute_wcoax(t, model, i, j);
        let w = self.compute_w(t, model, i, j, wl, wcoax);
        let wmbl = self.compute_wmbl(t, model, i, j, w);
        let wmb = self.compute_wmb(t, model, i, j, wmbl);
        CellUpdate {
            v,
            wl,
            wcoax,
            w,
            wmbl,
            wmb,
        }
    }

    /// Is `(p, q)` (doubled coordinates) a block that spans the strand nick?
    #[inline]
    fn wraps(&self, p: usize, q: usize) -> bool {
        p <= self.n && q > self.n
    }

    fn compute_v(&self, t: &FoldTables, model: &EnergyModel, i: usize, j: usize) -> f64 {
        let n = self.n;
        let wrapped = j > n;
        if !queries::can_pair(self.seq, self.cons, i, j) {
            return 0.0;
        }
        // The pair itself must leave room for at least a minimal hairpin:
        // for wrapped cells the interior sits between j-n and i.
        let interior = if wrapped { i - (j - n) } else { j - i };
        if interior - 1 < self.config.min_hairpin_loop {
            return 0.0;
        }

        let mut v = 0.0;

        if !wrapped {
            v += queries::hairpin(model, self.seq, self.cons, i, j);
        } else {
            v += self.exterior_context(t, model, i, j);
        }

        // Stack and bulge/internal closures. For wrapped cells the inner
        // entry must itself span the nick: ip stays on the 5' side, jp on
        // the wrapped side.
        let max_loop = self.config.max_internal_loop;
        let ip_hi = if wrapped {
            n.min(i + 1 + max_loop)
        } else {
            (i + 1 + max_loop).min(j.saturating_sub(2))
        };
        for ip in i + 1..=ip_hi {
            let l1 = ip - i - 1;
            if l1 > max_loop {
                break;
            }
            let jp_lo = (ip + 1)
                .max((j - 1).saturating_sub(max_loop - l1))
                .max(if wrapped { n + 1 } else { 0 });
            for jp in jp_lo..j {
                let inner = t.v.get(ip, jp);
                if inner == 0.0 {
                    continue;
                }
                let l2 = j - jp - 1;
                let weight = if l1 == 0 && l2 == 0 {
                    queries::stacked_pair(model, self.seq, i, j)
                } else {
                    queries::internal_loop(model, self.seq, self.cons, i, j, ip, jp)
                };
                v += weight * inner;
            }
        }

        v += self.multibranch_closure(t, model, i, j);
        v
    }

    /// Multibranch closure of the pair read as `(j, i)`: closing-pair dangle
    /// decorations over the ≥2-block content, plus coaxial stacking of the
    /// closing helix onto the first or last block.
    fn multibranch_closure(
        &self,
        t: &FoldTables,
        model: &EnergyModel,
        i: usize,
        j: usize,
    ) -> f64 {
        let n = self.n;
        let wrapped = j > n;
        if j - i < 4 {
            return 0.0;
        }
        let seq = self.seq;
        let cons = self.cons;
        let c1 = model.ml_unpaired_penalty();
        let b = model.ml_branch();

        // For wrapped cells the multibranch content must still span the
        // nick; otherwise the "closure" would re-count exterior-loop states
        // already enumerated by the accumulator product.
        let spans_nick = |p: usize, q: usize| !wrapped || self.wraps(p, q);

        let mut content = 0.0;
        if spans_nick(i + 1, j - 1) {
            content += self.m2(t, model, i + 1, j - 1);
            content += queries::dangle3(model, seq, cons, j, i, i + 1)
                * c1
                * self.m2(t, model, i + 2, j - 1);
        }
        if spans_nick(i + 1, j - 2) {
            content += queries::dangle5(model, seq, cons, j, i, j - 1)
                * c1
                * self.m2(t, model, i + 1, j - 2);
            content += queries::multi_mismatch(model, seq, cons, j, i, j - 1, i + 1)
                * c1
                * c1
                * self.m2(t, model, i + 2, j - 2);
        }

        // Closing helix coaxially stacked on the first block.
        for k in i + 2..j - 1 {
            if self.wraps(i + 1, k) || spans_nick(k + 1, j - 1) {
                let first = t.v.get(i + 1, k);
                if first != 0.0 {
                    content += queries::coax_flush(model, seq, j, i, i + 1, k)
                        * b
                        * queries::end_penalty(model, seq, i + 1, k)
                        * first
                        * t.wmb.get(k + 1, j - 1);
                }
            }
            if self.wraps(i + 2, k) || spans_nick(k + 2, j - 1) {
                let first_mm = t.v.get(i + 2, k);
                if first_mm != 0.0 {
                    content += queries::coax_mismatch_3side(
                        model,
                        seq,
                        cons,
                        i + 2,
                        k,
                        i + 1,
                        k + 1,
                    ) * b
                        * c1
                        * c1
                        * queries::end_penalty(model, seq, i + 2, k)
                        * first_mm
                        * t.wmb.get(k + 2, j - 1);
                }
            }
        }
        // Mismatch flanking the closing pair, stacked on the first block.
        let closer_mm5 = queries::coax_mismatch_5side(model, seq, cons, j, i, j - 1, i + 1);
        if closer_mm5 != 0.0 {
            let mut inner = 0.0;
            for k in i + 3..j - 2 {
                if wrapped && !(self.wraps(i + 2, k) || self.wraps(k + 1, j - 2)) {
                    continue;
                }
                let first = t.v.get(i + 2, k);
                if first != 0.0 {
                    inner += queries::end_penalty(model, seq, i + 2, k)
                        * first
                        * t.wmb.get(k + 1, j - 2);
                }
            }
            content += closer_mm5 * b * c1 * c1 * inner;
        }
        // Mismatch flanking the closing pair, stacked on the last block.
        let closer_mm3 = queries::coax_mismatch_3side(model, seq, cons, j, i, j - 1, i + 1);
        if closer_mm3 != 0.0 {
            let mut inner = 0.0;
            for m in i + 3..j - 2 {
                if wrapped && !(self.wraps(m, j - 2) || self.wraps(i + 2, m - 1)) {
                    continue;
                }
                let last = t.v.get(m, j - 2);
                if last != 0.0 {
                    inner += queries::end_penalty(model, seq, m, j - 2)
                        * last
                        * t.wmb.get(i + 2, m - 1);
                }
            }
            content += closer_mm3 * b * c1 * c1 * inner;
        }

        // Closing helix coaxially stacked on the last block.
        for m in i + 2..j - 1 {
            if self.wraps(m, j - 1) || spans_nick(i + 1, m - 1) {
                let last = t.v.get(m, j - 1);
                if last != 0.0 {
                    content += queries::coax_flush(model, seq, m, j - 1, j, i)
                        * b
                        * queries::end_penalty(model, seq, m, j - 1)
                        * last
                        * t.wmb.get(i + 1, m - 1);
                }
            }
            if self.wraps(m, j - 2) || spans_nick(i + 1, m - 2) {
                let last_mm = t.v.get(m, j - 2);
                if last_mm != 0.0 {
                    content += queries::coax_mismatch_5side(
                        model,
                        seq,
                        cons,
                        m,
                        j - 2,
                        m - 1,
                        j - 1,
                    ) * b
                        * c1
                        * c1
                        * queries::end_penalty(model, seq, m, j - 2)
                        * last_mm
                        * t.wmb.get(i + 1, m - 2);
                }
            }
        }

        model.ml_closure() * queries::end_penalty(model, seq, j, i) * content
    }

    /// The ≥2-block multibranch combination over `[p..q]` with leading
    /// unpaired bases: `Σ_m lead(p..m-1)·(wmbl(m,q) - w(m,q))`. For wrapped
    /// ranges the anchor stays on the 5' side of the nick so the wrapped
    /// block is never skipped over.
    fn m2(&self, t: &FoldTables, model: &EnergyModel, p: usize, q: usize) -> f64 {
        if q < p {
            return 0.0;
        }
        let m_hi = if q > self.n { self.n.min(q) } else { q };
        let mut lead = 1.0;
        let mut sum = 0.0;
        for m in p..=m_hi {
            sum += lead * (t.wmbl.get(m, q) - t.w.get(m, q));
            if self.cons.is_forced_paired(m) {
                break;
            }
            lead *= model.ml_base();
        }
        sum
    }

    /// Single-branch block spanning exactly `[i..j]`: the helix with its
    /// four decoration variants, times the per-branch weight.
    fn compute_wl(
        &self,
        t: &FoldTables,
        model: &EnergyModel,
        i: usize,
        j: usize,
        v_fresh: f64,
    ) -> f64 {
        let n = self.n;
        let wrapped = j > n;
        let seq = self.seq;
        let cons = self.cons;
        let c1 = model.ml_unpaired_penalty();

        let mut sum = v_fresh * queries::end_penalty(model, seq, i, j);

        // Decorated variants shrink the helix; for wrapped cells the helix
        // must keep spanning the nick.
        if !wrapped || i + 1 <= n {
            let inner = t.v.get(i + 1, j);
            if inner != 0.0 {
                sum += queries::dangle5(model, seq, cons, i + 1, j, i)
                    * c1
                    * inner
                    * queries::end_penalty(model, seq, i + 1, j);
            }
        }
        if !wrapped || j - 1 > n {
            let inner = t.v.get(i, j - 1);
            if inner != 0.0 {
                sum += queries::dangle3(model, seq, cons, i, j - 1, j)
                    * c1
                    * inner
                    * queries::end_penalty(model, seq, i, j - 1);
            }
        }
        if (!wrapped || (i + 1 <= n && j - 1 > n)) && j >= i + 2 {
            let inner = t.v.get(i + 1, j - 1);
            if inner != 0.0 {
                sum += queries::multi_mismatch(model, seq, cons, i + 1, j - 1, i, j)
                    * c1
                    * c1
                    * inner
                    * queries::end_penalty(model, seq, i + 1, j - 1);
            }
        }

        model.ml_branch() * sum
    }

    /// Two coaxially stacked branches spanning exactly `[i..j]`: flush and
    /// the two single-mismatch variants.
    fn compute_wcoax(&self, t: &FoldTables, model: &EnergyModel, i: usize, j: usize) -> f64 {
        let n = self.n;
        let wrapped = j > n;
        let seq = self.seq;
        let cons = self.cons;
        let b2 = model.ml_branch() * model.ml_branch();
        let c1 = model.ml_unpaired_penalty();
        let mut sum = 0.0;

        for k in i + 1..j - 1 {
            // Flush: helices (i,k) and (k+1,j) meeting at k|k+1. For
            // wrapped cells exactly one helix spans the nick, which also
            // keeps the interface off the nick itself.
            let a = t.v.get(i, k);
            let bb = t.v.get(k + 1, j);
            if a != 0.0 && bb != 0.0 && (!wrapped || self.wraps(i, k) || self.wraps(k + 1, j)) {
                sum += queries::coax_flush(model, seq, i, k, k + 1, j)
                    * a
                    * bb
                    * queries::end_penalty(model, seq, i, k)
                    * queries::end_penalty(model, seq, k + 1, j);
            }
            // Mismatch flanking the 3' helix: (i,k) + (k+2, j-1) with
            // unpaired k+1 and j.
            if k + 2 < j - 1 {
                let a = t.v.get(i, k);
                let bb = t.v.get(k + 2, j - 1);
                if a != 0.0
                    && bb != 0.0
                    && (!wrapped || self.wraps(i, k) || self.wraps(k + 2, j - 1))
                {
                    sum += queries::coax_mismatch_3side(model, seq, cons, k + 2, j - 1, k + 1, j)
                        * c1
                        * c1
                        * a
                        * bb
                        * queries::end_penalty(model, seq, i, k)
                        * queries::end_penalty(model, seq, k + 2, j - 1);
                }
            }
            // Mismatch flanking the 5' helix: (i+1,k) + (k+2, j) with
            // unpaired i and k+1.
            if k + 2 < j {
                let a = t.v.get(i + 1, k);
                let bb = t.v.get(k + 2, j);
                if a != 0.0
                    && bb != 0.0
                    && (!wrapped || self.wraps(i + 1, k) || self.wraps(k + 2, j))
                {
                    sum += queries::coax_mismatch_5side(model, seq, cons, i + 1, k, i, k + 1)
                        * c1
                        * c1
                        * a
                        * bb
                        * queries::end_penalty(model, seq, i + 1, k)
                        * queries::end_penalty(model, seq, k + 2, j);
                }
            }
        }
        b2 * sum
    }

    /// One block anchored at `i` with trailing unpaired bases.
    fn compute_w(
        &self,
        t: &FoldTables,
        model: &EnergyModel,
        i: usize,
        j: usize,
        wl_fresh: f64,
        wcoax_fresh: f64,
    ) -> f64 {
        let wrapped = j > self.n;
        let mut sum = wl_fresh + wcoax_fresh;
        // Trailing extension stops at the nick for wrapped cells: dropping
        // the last wrapped position would drop the wrapped block itself.
        if (!wrapped || j - 1 > self.n) && !self.cons.is_forced_paired(j) {
            sum += t.w.get(i, j - 1) * model.ml_base();
        }
        sum
    }

    /// One or more blocks anchored at `i`, trailing unpaired allowed.
    fn compute_wmbl(
        &self,
        t: &FoldTables,
        model: &EnergyModel,
        i: usize,
        j: usize,
        w_fresh: f64,
    ) -> f64 {
        let n = self.n;
        let wrapped = j > n;
        let g = self.config.min_branch_separation;
        let mut sum = w_fresh;

        for k in i + 1..j {
            let first = t.wl.get(i, k) + t.wcoax.get(i, k);
            if first == 0.0 {
                continue;
            }
            let next = k + 1 + g;
            if next > j {
                break;
            }
            // Keep the nick inside either the first block or the tail.
            if wrapped && !(k > n || next <= n) {
                continue;
            }
            let mut gap = 1.0;
            if g > 0 {
                if !self.cons.allows_unpaired_run(k + 1, k + g) {
                    continue;
                }
                gap = model.ml_base().powi(g as i32);
            }
            sum += first * gap * t.wmb.get(next, j);
        }
        sum
    }

    /// One or more blocks with leading and trailing unpaired bases.
    fn compute_wmb(
        &self,
        t: &FoldTables,
        model: &EnergyModel,
        i: usize,
        j: usize,
        wmbl_fresh: f64,
    ) -> f64 {
        let wrapped = j > self.n;
        let mut sum = wmbl_fresh;
        // Leading extension must not cross the nick.
        if (!wrapped || i + 1 <= self.n) && !self.cons.is_forced_paired(i) {
            sum += t.wmb.get(i + 1, j) * model.ml_base();
        }
        sum
    }

    /// Exterior-loop context of the wrapped pair `(j-n, i)`: both strand
    /// ends free, with the same block decorations the accumulators use —
    /// four dangle variants and the six coaxial arrangements with an
    /// exterior neighbor helix.
    fn exterior_context(&self, t: &FoldTables, model: &EnergyModel, i: usize, j: usize) -> f64 {
        let n = self.n;
        let jl = j - n;
        let seq = self.seq;
        let cons = self.cons;
        let w5 = &t.w5;
        let w3 = &t.w3;
        let s2 = model.base_scale() * model.base_scale();

        let mut ext = w5[jl - 1] * w3[i + 1];
        if jl >= 2 {
            ext += queries::dangle5(model, seq, cons, jl, i, jl - 1) * w5[jl - 2] * w3[i + 1];
        }
        if i + 1 <= n {
            ext += queries::dangle3(model, seq, cons, jl, i, i + 1) * w5[jl - 1] * w3[i + 2];
        }
        if jl >= 2 && i + 1 <= n {
            ext += queries::exterior_mismatch(model, seq, cons, jl, i, jl - 1, i + 1)
                * w5[jl - 2]
                * w3[i + 2];
        }

        // Coaxial stacking with the 5'-side neighbor helix.
        for m in 1..jl.saturating_sub(1) {
            let left = t.v.get(m, jl - 1);
            if left != 0.0 {
                ext += left
                    * queries::end_penalty(model, seq, m, jl - 1)
                    * queries::coax_flush(model, seq, m, jl - 1, jl, i)
                    * w5[m - 1]
                    * w3[i + 1];
            }
            if jl >= 3 && i + 1 <= n {
                let left_mm = t.v.get(m, jl - 2);
                if left_mm != 0.0 {
                    ext += left_mm
                        * queries::end_penalty(model, seq, m, jl - 2)
                        * queries::coax_mismatch_3side(model, seq, cons, jl, i, jl - 1, i + 1)
                        * w5[m - 1]
                        * w3[i + 2];
                }
            }
            if jl >= 3 && m >= 2 {
                let left_mm5 = t.v.get(m, jl - 2);
                if left_mm5 != 0.0 {
                    ext += left_mm5
                        * queries::end_penalty(model, seq, m, jl - 2)
                        * queries::coax_mismatch_5side(model, seq, cons, m, jl - 2, m - 1, jl - 1)
                        * w5[m - 2]
                        * w3[i + 1];
                }
            }
        }
        // Coaxial stacking with the 3'-side neighbor helix.
        for q in i + 2..=n {
            let right = t.v.get(i + 1, q);
            if right != 0.0 {
                ext += right
                    * queries::end_penalty(model, seq, i + 1, q)
                    * queries::coax_flush(model, seq, jl, i, i + 1, q)
                    * w5[jl - 1]
                    * w3[q + 1];
            }
            if i + 2 <= n {
                let right_mm = t.v.get(i + 2, q);
                if right_mm != 0.0 && q + 1 <= n {
                    ext += right_mm
                        * queries::end_penalty(model, seq, i + 2, q)
                        * queries::coax_mismatch_3side(model, seq, cons, i + 2, q, i + 1, q + 1)
                        * w5[jl - 1]
                        * w3[q + 2];
                }
                if right_mm != 0.0 && jl >= 2 {
                    ext += right_mm
                        * queries::end_penalty(model, seq, i + 2, q)
                        * queries::coax_mismatch_5side(model, seq, cons, jl, i, jl - 1, i + 1)
                        * w5[jl - 2]
                        * w3[q + 1];
                }
            }
        }

        queries::end_penalty(model, seq, jl, i) * s2 * ext
    }

    /// Finalize `w5[j]`: the partition function of `[1..j]`, decomposed by
    /// the last exterior block.
    fn update_w5(&self, tables: &mut FoldTables, model: &EnergyModel, j: usize) {
        if j > self.n {
            return;
        }
        let mut sum = if self.cons.is_forced_paired(j) {
            0.0
        } else {
            tables.w5[j - 1] * model.base_scale()
        };
        for k in 1..j {
            sum += tables.w5[k - 1] * self.exterior_block(tables, model, k, j);
        }
        tables.w5[j] = sum;
    }

    /// Finalize `w3[i]`: the partition function of `[i..n]`, decomposed by
    /// the first exterior block.
    fn update_w3(&self, tables: &mut FoldTables, model: &EnergyModel, i: usize) {
        let n = self.n;
        if i > n {
            return;
        }
        let mut sum = if self.cons.is_forced_paired(i) {
            0.0
        } else {
            tables.w3[i + 1] * model.base_scale()
        };
        for k in i + 1..=n {
            sum += self.exterior_block(tables, model, i, k) * tables.w3[k + 1];
        }
        tables.w3[i] = sum;
    }

    /// An exterior block spanning exactly `[k..j]`: one helix with its four
    /// decoration variants, or two coaxially stacked helices. No multibranch
    /// weights apply in the exterior loop.
    fn exterior_block(&self, t: &FoldTables, model: &EnergyModel, k: usize, j: usize) -> f64 {
        let seq = self.seq;
        let cons = self.cons;
        let mut sum = 0.0;

        let plain = t.v.get(k, j);
        if plain != 0.0 {
            sum += plain * queries::end_penalty(model, seq, k, j);
        }
        let d5 = t.v.get(k + 1, j);
        if d5 != 0.0 {
            sum += d5
                * queries::end_penalty(model, seq, k + 1, j)
                * queries::dangle5(model, seq, cons, k + 1, j, k);
        }
        if j >= k + 1 {
            let d3 = t.v.get(k, j - 1);
            if d3 != 0.0 {
                sum += d3
                    * queries::end_penalty(model, seq, k, j - 1)
                    * queries::dangle3(model, seq, cons, k, j - 1, j);
            }
        }
        if j >= k + 2 {
            let mm = t.v.get(k + 1, j - 1);
            if mm != 0.0 {
                sum += mm
                    * queries::end_penalty(model, seq, k + 1, j - 1)
                    * queries::exterior_mismatch(model, seq, cons, k + 1, j - 1, k, j);
            }
        }

        for m in k + 1..j {
            let a = t.v.get(k, m);
            let b = t.v.get(m + 1, j);
            if a != 0.0 && b != 0.0 {
                sum += a
                    * b
                    * queries::end_penalty(model, seq, k, m)
                    * queries::end_penalty(model, seq, m + 1, j)
                    * queries::coax_flush(model, seq, k, m, m + 1, j);
            }
            if m + 2 < j {
                let a = t.v.get(k, m);
                let b3 = t.v.get(m + 2, j - 1);
                if a != 0.0 && b3 != 0.0 {
                    sum += a
                        * b3
                        * queries::end_penalty(model, seq, k, m)
                        * queries::end_penalty(model, seq, m + 2, j - 1)
                        * queries::coax_mismatch_3side(model, seq, cons, m + 2, j - 1, m + 1, j);
                }
                let a5 = t.v.get(k + 1, m);
                let b5 = t.v.get(m + 2, j);
                if a5 != 0.0 && b5 != 0.0 {
                    sum += a5
                        * b5
                        * queries::end_penalty(model, seq, k + 1, m)
                        * queries::end_penalty(model, seq, m + 2, j)
                        * queries::coax_mismatch_5side(model, seq, cons, k + 1, m, k, m + 1);
                }
            }
        }
        sum
    }

    fn check_accumulator_agreement(&self, tables: &FoldTables) -> Result<(), EngineError> {
        let q5 = tables.w5[self.n];
        let q3 = tables.w3[1];
        let scale = q5.abs().max(q3.abs());
        if scale == 0.0 {
            return Ok(());
        }
        let relative = (q5 - q3).abs() / scale;
        if relative > self.config.consistency_tolerance {
            return Err(EngineError::consistency(format!(
                "5'/3' accumulator mismatch: w5[n]={q5:e}, w3[1]={q3:e}, \
                 relative error {relative:e} exceeds {:e}",
                self.config.consistency_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::params::fixtures::{test_params, test_params_full};
    use crate::engine::progress::ProgressReporter;
    use approx::assert_relative_eq;

    fn fold(
        seq: &str,
        params: crate::core::energy::params::EnergyParams,
        scaling: f64,
    ) -> (FoldTables, EnergyModel) {
        let seq: RnaSequence = seq.parse().unwrap();
        let cons = FoldConstraints::none(seq.len());
        let config = FoldConfig {
            initial_scaling: scaling,
            ..FoldConfig::default()
        };
        let mut model = EnergyModel::new(params, scaling, config.temperature);
        let engine = RecurrenceEngine::new(&seq, &cons, &config);
        let tables = engine
            .fill(&mut model, &ProgressReporter::new())
            .expect("fold should succeed");
        (tables, model)
    }

    #[test]
    fn single_base_partition_function_is_the_scale() {
        let (tables, model) = fold("G", test_params(), 0.7);
        assert_relative_eq!(tables.w5[1], model.scaling(), max_relative = 1e-12);
        assert_relative_eq!(tables.w3[1], model.scaling(), max_relative = 1e-12);
    }

    #[test]
    fn unpairable_sequence_stays_fully_unpaired() {
        let (tables, model) = fold("AAAAAA", test_params(), 0.9);
        let s = model.scaling();
        assert_relative_eq!(tables.w5[6], s.powi(6), max_relative = 1e-9);
        assert_relative_eq!(tables.w3[1], s.powi(6), max_relative = 1e-9);
        assert_eq!(tables.v.get(1, 6), 0.0);
    }

    #[test]
    fn accumulators_agree_for_structured_sequences() {
        for seq in ["GGGAAACCC", "GCGCAAAAGCGC", "GGACUUCGGUCC"] {
            let (tables, _) = fold(seq, test_params(), 1.0);
            let n = seq.len();
            assert_relative_eq!(tables.w5[n], tables.w3[1], max_relative = 1e-9);
        }
    }

    #[test]
    fn accumulators_agree_with_dangles_and_coax_enabled() {
        let (tables, _) = fold("GGGAAACCCAGGGAAACCC", test_params_full(), 0.8);
        assert_relative_eq!(tables.w5[19], tables.w3[1], max_relative = 1e-9);
    }

    #[test]
    fn hairpin_pair_weight_is_positive_only_for_viable_pairs() {
        let (tables, _) = fold("GGGAAACCC", test_params(), 1.0);
        assert!(tables.v.get(1, 9) > 0.0);
        assert!(tables.v.get(3, 7) > 0.0);
        // A and C cannot pair.
        assert_eq!(tables.v.get(5, 8), 0.0);
        // A and A cannot pair.
        assert_eq!(tables.v.get(4, 5), 0.0);
    }

    #[test]
    fn pairs_without_room_for_a_hairpin_weigh_zero() {
        let (tables, _) = fold("GAUC", test_params(), 1.0);
        // G-C with only two enclosed bases.
        assert_eq!(tables.v.get(1, 4), 0.0);
    }

    #[test]
    fn total_exceeds_unpaired_baseline_when_structure_forms() {
        let (tables, model) = fold("GGGAAACCC", test_params(), 1.0);
        let s = model.scaling();
        assert!(tables.w5[9] > s.powi(9));
    }

    #[test]
    fn forced_unpaired_position_zeroes_its_pairings() {
        let seq: RnaSequence = "GGGAAACCC".parse().unwrap();
        let mut cons = FoldConstraints::none(9);
        cons.force_unpaired(1).unwrap();
        let config = FoldConfig::default();
        let mut model = EnergyModel::new(test_params(), 1.0, config.temperature);
        let engine = RecurrenceEngine::new(&seq, &cons, &config);
        let tables = engine.fill(&mut model, &ProgressReporter::new()).unwrap();
        assert_eq!(tables.v.get(1, 9), 0.0);
        assert!(tables.v.get(2, 8) > 0.0);
    }

    #[test]
    fn cancellation_aborts_the_scan() {
        let seq: RnaSequence = "GGGAAACCC".parse().unwrap();
        let cons = FoldConstraints::none(9);
        let config = FoldConfig::default();
        let mut model = EnergyModel::new(test_params(), 1.0, config.temperature);
        let reporter = ProgressReporter::new();
        reporter.cancel_flag().cancel();
        let engine = RecurrenceEngine::new(&seq, &cons, &config);
        let result = engine.fill(&mut model, &reporter);
        assert!(matches!(result, Err(EngineError::Cancelled { span: 1 })));
    }

    #[test]
    fn wrapped_entries_mirror_interior_pairs() {
        let (tables, _) = fold("GGGAAACCC", test_params(), 1.0);
        // Pair (1, 9) has both an interior and an exterior entry; the
        // exterior consists of just the empty context here.
        assert!(tables.v.get(9, 10) > 0.0);
        // An unpairable combination has no exterior entry either.
        assert_eq!(tables.v.get(5, 4 + 9), 0.0);
    }

    #[test]
    fn rescaling_keeps_ratios_invariant() {
        let (t1, m1) = fold("GGGAAACCCAUGGGAAACCC", test_params(), 1.0);
        let (t2, m2) = fold("GGGAAACCCAUGGGAAACCC", test_params(), 0.4);
        let n = 20;
        // Unscaled totals agree.
        let q1 = t1.w5[n] / m1.scaling().powi(n as i32);
        let q2 = t2.w5[n] / m2.scaling().powi(n as i32);
        assert_relative_eq!(q1, q2, max_relative = 1e-6);
    }
}
