//! Data models for the fold input: the nucleotide sequence and the
//! per-position structural constraints.
//!
//! Both types use 1-based positions with the doubled-index convention of the
//! exterior recursion: a position `p > n` aliases to `p - n`, so the same
//! accessors serve the interior scan and the wraparound (exterior) scan.

pub mod constraints;
pub mod sequence;
