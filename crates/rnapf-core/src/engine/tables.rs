use super::array::PairArray;

/// The fixed aggregate of live fold state: six mutually recursive pair
/// arrays plus the two whole-prefix accumulators.
///
/// Table semantics (all Boltzmann-weighted sums over decorated structures,
/// every entry carrying one factor of the global scaling per covered
/// nucleotide):
///
/// - `v(i, j)` — structures in which `i` pairs `j`
/// - `wl(i, j)` — exactly one branch helix spanning `[i..j]`, dangle
///   decorations included, times the per-branch multibranch weight
/// - `wcoax(i, j)` — exactly two coaxially stacked branches spanning `[i..j]`
/// - `w(i, j)` — one block (branch or coax pair) anchored at `i`, trailing
///   unpaired bases allowed
/// - `wmbl(i, j)` — one or more blocks anchored at `i`, trailing unpaired
///   bases allowed
/// - `wmb(i, j)` — one or more blocks, leading and trailing unpaired allowed
///
/// `w5[j]` is the partition function of the prefix `[1..j]` (`w5[0] = 1`),
/// `w3[i]` of the suffix `[i..n]` (`w3[n + 1] = 1`). Entries with `j > n`
/// are the wrapped exterior fragments of the probability computation.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldTables {
    pub v: PairArray,
    pub wl: PairArray,
    pub wcoax: PairArray,
    pub w: PairArray,
    pub wmbl: PairArray,
    pub wmb: PairArray,
    pub w5: Vec<f64>,
    pub w3: Vec<f64>,
}

impl FoldTables {
    pub fn new(n: usize) -> Self {
        let mut w5 = vec![0.0; n + 1];
        let mut w3 = vec![0.0; n + 2];
        w5[0] = 1.0;
        w3[n + 1] = 1.0;
        Self {
            v: PairArray::new(n),
            wl: PairArray::new(n),
            wcoax: PairArray::new(n),
            w: PairArray::new(n),
            wmbl: PairArray::new(n),
            wmb: PairArray::new(n),
            w5,
            w3,
        }
    }

    pub fn size(&self) -> usize {
        self.v.size()
    }

    /// The six arrays in the fixed persistence order.
    pub fn arrays(&self) -> [&PairArray; 6] {
        [&self.v, &self.w, &self.wmb, &self.wl, &self.wmbl, &self.wcoax]
    }

    pub fn arrays_mut(&mut self) -> [&mut PairArray; 6] {
        [
            &mut self.v,
            &mut self.w,
            &mut self.wmb,
            &mut self.wl,
            &mut self.wmbl,
            &mut self.wcoax,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulators_start_with_unit_boundary_values() {
        let t = FoldTables::new(4);
        assert_eq!(t.w5[0], 1.0);
        assert_eq!(t.w3[5], 1.0);
        assert_eq!(t.w5.len(), 5);
        assert_eq!(t.w3.len(), 6);
    }

    #[test]
    fn arrays_expose_all_six_tables_in_persistence_order() {
        let mut t = FoldTables::new(3);
        t.v.set(1, 2, 1.0);
        t.wcoax.set(1, 2, 2.0);
        let arrays = t.arrays();
        assert_eq!(arrays[0].get(1, 2), 1.0);
        assert_eq!(arrays[5].get(1, 2), 2.0);
    }
}
