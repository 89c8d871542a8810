//! Stateless point queries over (positions, sequence, constraints, model).
//!
//! Positions are doubled 1-based indices (the sequence and constraint
//! accessors alias `p > n` to `p - n`), so the same queries serve the
//! interior scan and the exterior wraparound scan. Every query returns a
//! non-negative equilibrium weight that already reflects the current global
//! scaling; a structurally or constraint-forbidden configuration weighs 0.

use super::model::{EnergyModel, LoopKind};
use crate::core::models::constraints::FoldConstraints;
use crate::core::models::sequence::{Base, RnaSequence};

/// Base pairability combined with the explicit pairing constraints.
#[inline]
pub fn can_pair(seq: &RnaSequence, cons: &FoldConstraints, i: usize, j: usize) -> bool {
    seq.at(i).can_pair(seq.at(j)) && !cons.forbids_pair(i, j)
}

/// Helix-end penalty for the pair `(i, j)`: applies to AU and GU ends.
#[inline]
pub fn end_penalty(model: &EnergyModel, seq: &RnaSequence, i: usize, j: usize) -> f64 {
    match (seq.at(i), seq.at(j)) {
        (Base::A, Base::U) | (Base::U, Base::A) | (Base::G, Base::U) | (Base::U, Base::G) => {
            model.terminal_au()
        }
        _ => 1.0,
    }
}

/// Weight of stacking the pair `(i+1, j-1)` directly under `(i, j)`.
#[inline]
pub fn stacked_pair(model: &EnergyModel, seq: &RnaSequence, i: usize, j: usize) -> f64 {
    model.stack_weight(seq.at(i), seq.at(j), seq.at(i + 1), seq.at(j - 1))
}

/// Weight of a bulge or internal loop closed by `(i, j)` outside and
/// `(ip, jp)` inside. The caller guarantees `i < ip < jp < j` in doubled
/// coordinates and at least one unpaired base between the pairs.
pub fn internal_loop(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    i: usize,
    j: usize,
    ip: usize,
    jp: usize,
) -> f64 {
    let l1 = ip - i - 1;
    let l2 = j - jp - 1;
    debug_assert!(l1 + l2 >= 1, "internal loop requires unpaired bases");

    if (l1 > 0 && !cons.allows_unpaired_run(i + 1, ip - 1))
        || (l2 > 0 && !cons.allows_unpaired_run(jp + 1, j - 1))
    {
        return 0.0;
    }

    if l1 == 0 || l2 == 0 {
        let size = l1 + l2;
        let curve = model.loop_len_weight(LoopKind::Bulge, size);
        if size == 1 {
            // A single bulged base leaves the helix stack intact.
            let bulged = if l1 == 1 { seq.at(i + 1) } else { seq.at(jp + 1) };
            let c_bonus = if bulged == Base::C {
                model.single_c_bulge()
            } else {
                1.0
            };
            let stack = model.stack_weight(seq.at(i), seq.at(j), seq.at(ip), seq.at(jp));
            // Both the curve and the stack weight carry the inner pair's
            // scaling; divide one copy back out.
            let s = model.base_scale();
            return curve * stack * c_bonus / (s * s);
        }
        return curve
            * end_penalty(model, seq, i, j)
            * end_penalty(model, seq, jp, ip);
    }

    if l1 == 1 && l2 == 1 {
        let key = encode_positions(seq, &[i, j, ip, jp, i + 1, j - 1]);
        if let Some(exact) = model.internal_exact_weight(&key) {
            return exact;
        }
    }
    if l1 == 2 && l2 == 2 {
        let key = encode_positions(seq, &[i, j, ip, jp, i + 1, i + 2, j - 2, j - 1]);
        if let Some(exact) = model.internal_exact_weight(&key) {
            return exact;
        }
    }

    model.loop_len_weight(LoopKind::Internal, l1 + l2)
        * model.mismatch_internal_weight(seq.at(i), seq.at(j), seq.at(i + 1), seq.at(j - 1))
        * model.mismatch_internal_weight(seq.at(jp), seq.at(ip), seq.at(jp + 1), seq.at(ip - 1))
        * model.asymmetry_weight(l1, l2)
}

/// Weight of the hairpin loop closed by `(i, j)`, including the closing-pair
/// end penalty, the terminal-mismatch stack (loops of four or more), exact
/// short-loop bonuses and the poly-C penalty.
pub fn hairpin(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    i: usize,
    j: usize,
) -> f64 {
    let size = j - i - 1;
    if !cons.allows_unpaired_run(i + 1, j - 1) {
        return 0.0;
    }

    let mut weight = model.loop_len_weight(LoopKind::Hairpin, size) * end_penalty(model, seq, i, j);
    if size >= 4 {
        weight *=
            model.mismatch_hairpin_weight(seq.at(i), seq.at(j), seq.at(i + 1), seq.at(j - 1));
    }
    if matches!(size, 3 | 4 | 6) {
        let key = encode_positions(seq, &(i..=j).collect::<Vec<_>>());
        weight *= model.hairpin_bonus_weight(&key);
    }
    if (i + 1..j).all(|p| seq.at(p) == Base::C) {
        weight *= model.polyc_weight(size);
    }
    weight
}

/// Weight of base `x` dangling on the 3' side of the pair `(p5, p3)`.
/// Consumes `x`, so a forced-paired `x` weighs 0.
#[inline]
pub fn dangle3(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    p5: usize,
    p3: usize,
    x: usize,
) -> f64 {
    if cons.is_forced_paired(x) {
        return 0.0;
    }
    model.dangle3_weight(seq.at(p5), seq.at(p3), seq.at(x))
}

/// Weight of base `x` dangling on the 5' side of the pair `(p5, p3)`.
#[inline]
pub fn dangle5(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    p5: usize,
    p3: usize,
    x: usize,
) -> f64 {
    if cons.is_forced_paired(x) {
        return 0.0;
    }
    model.dangle5_weight(seq.at(p5), seq.at(p3), seq.at(x))
}

/// Terminal-mismatch decoration of a multibranch branch `(p5, p3)` by the
/// unpaired bases `x` (5' side) and `y` (3' side).
#[inline]
pub fn multi_mismatch(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    p5: usize,
    p3: usize,
    x: usize,
    y: usize,
) -> f64 {
    if cons.is_forced_paired(x) || cons.is_forced_paired(y) {
        return 0.0;
    }
    model.mismatch_multi_weight(seq.at(p5), seq.at(p3), seq.at(x), seq.at(y))
}

/// Terminal-mismatch decoration of an exterior-loop branch.
#[inline]
pub fn exterior_mismatch(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    p5: usize,
    p3: usize,
    x: usize,
    y: usize,
) -> f64 {
    if cons.is_forced_paired(x) || cons.is_forced_paired(y) {
        return 0.0;
    }
    model.mismatch_exterior_weight(seq.at(p5), seq.at(p3), seq.at(x), seq.at(y))
}

/// Flush coaxial stack between helix `(a5, a3)` and the immediately adjacent
/// helix `(b5, b3)` (with `b5 = a3 + 1` on the strand).
#[inline]
pub fn coax_flush(
    model: &EnergyModel,
    seq: &RnaSequence,
    a5: usize,
    a3: usize,
    b5: usize,
    b3: usize,
) -> f64 {
    model.coax_flush_weight(seq.at(a5), seq.at(a3), seq.at(b5), seq.at(b3))
}

/// Coaxial stack with a single intervening mismatch whose bases `x`, `y`
/// flank the 5'-side helix `(p5, p3)`.
#[inline]
pub fn coax_mismatch_5side(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    p5: usize,
    p3: usize,
    x: usize,
    y: usize,
) -> f64 {
    if cons.is_forced_paired(x) || cons.is_forced_paired(y) {
        return 0.0;
    }
    model.coax_mismatch_weight(seq.at(p5), seq.at(p3), seq.at(x), seq.at(y))
}

/// Coaxial stack with a single intervening mismatch whose bases `x`, `y`
/// flank the 3'-side helix `(p5, p3)`.
#[inline]
pub fn coax_mismatch_3side(
    model: &EnergyModel,
    seq: &RnaSequence,
    cons: &FoldConstraints,
    p5: usize,
    p3: usize,
    x: usize,
    y: usize,
) -> f64 {
    if cons.is_forced_paired(x) || cons.is_forced_paired(y) {
        return 0.0;
    }
    model.coax_mismatch_weight(seq.at(p3), seq.at(p5), seq.at(y), seq.at(x))
}

fn encode_positions(seq: &RnaSequence, positions: &[usize]) -> Vec<u8> {
    positions.iter().map(|&p| seq.at(p).index() as u8).collect()
}
