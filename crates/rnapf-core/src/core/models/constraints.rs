use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("Constraint position {position} outside sequence length {length}")]
    PositionOutOfRange { position: usize, length: usize },
    #[error("Position {position} is both forced paired and forced unpaired")]
    Contradiction { position: usize },
}

/// Per-position folding constraints.
///
/// Positions are 1-based; every query accepts doubled indices (`p > n` aliases
/// to `p - n`) so the exterior recursion can share the accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldConstraints {
    forced_unpaired: Vec<bool>,
    forced_paired: Vec<bool>,
    excluded_pairs: HashSet<(usize, usize)>,
}

impl FoldConstraints {
    /// Unconstrained fold of a length-`n` sequence.
    pub fn none(n: usize) -> Self {
        Self {
            forced_unpaired: vec![false; n],
            forced_paired: vec![false; n],
            excluded_pairs: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.forced_unpaired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forced_unpaired.is_empty()
    }

    /// Forbid any pairing of `position`.
    pub fn force_unpaired(&mut self, position: usize) -> Result<(), ConstraintError> {
        self.check(position)?;
        if self.forced_paired[position - 1] {
            return Err(ConstraintError::Contradiction { position });
        }
        self.forced_unpaired[position - 1] = true;
        Ok(())
    }

    /// Require `position` to be paired (to any non-excluded partner).
    pub fn force_paired(&mut self, position: usize) -> Result<(), ConstraintError> {
        self.check(position)?;
        if self.forced_unpaired[position - 1] {
            return Err(ConstraintError::Contradiction { position });
        }
        self.forced_paired[position - 1] = true;
        Ok(())
    }

    /// Remove one partner from `i`'s allowed set.
    pub fn exclude_pair(&mut self, i: usize, j: usize) -> Result<(), ConstraintError> {
        self.check(i)?;
        self.check(j)?;
        let key = if i <= j { (i, j) } else { (j, i) };
        self.excluded_pairs.insert(key);
        Ok(())
    }

    #[inline]
    pub fn is_forced_unpaired(&self, p: usize) -> bool {
        self.forced_unpaired[self.fold_index(p)]
    }

    #[inline]
    pub fn is_forced_paired(&self, p: usize) -> bool {
        self.forced_paired[self.fold_index(p)]
    }

    /// True when the pair `(i, j)` is explicitly excluded or either end is
    /// forced unpaired.
    #[inline]
    pub fn forbids_pair(&self, i: usize, j: usize) -> bool {
        if self.is_forced_unpaired(i) || self.is_forced_unpaired(j) {
            return true;
        }
        let n = self.forced_unpaired.len();
        let (a, b) = ((i - 1) % n + 1, (j - 1) % n + 1);
        let key = if a <= b { (a, b) } else { (b, a) };
        self.excluded_pairs.contains(&key)
    }

    /// True when every position in the doubled range `lo..=hi` may stay
    /// unpaired; used to gate plain unpaired extensions.
    #[inline]
    pub fn allows_unpaired_run(&self, lo: usize, hi: usize) -> bool {
        (lo..=hi).all(|p| !self.is_forced_paired(p))
    }

    pub fn forced_unpaired_flags(&self) -> &[bool] {
        &self.forced_unpaired
    }

    pub fn forced_paired_flags(&self) -> &[bool] {
        &self.forced_paired
    }

    /// Rebuild from persisted flag arrays; exclusions are not persisted.
    pub fn from_flags(forced_unpaired: Vec<bool>, forced_paired: Vec<bool>) -> Self {
        debug_assert_eq!(forced_unpaired.len(), forced_paired.len());
        Self {
            forced_unpaired,
            forced_paired,
            excluded_pairs: HashSet::new(),
        }
    }

    #[inline]
    fn fold_index(&self, p: usize) -> usize {
        let n = self.forced_unpaired.len();
        debug_assert!(p >= 1 && p <= 2 * n, "constraint position {p} out of range");
        (p - 1) % n
    }

    fn check(&self, position: usize) -> Result<(), ConstraintError> {
        let length = self.forced_unpaired.len();
        if position == 0 || position > length {
            return Err(ConstraintError::PositionOutOfRange { position, length });
        }
        Ok(())
    }
}
