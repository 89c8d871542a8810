//! Save-file input/output for computed fold state.
//!
//! The binary partition-save format stores everything probability extraction
//! needs — the six table bands, both accumulators, the scaling factor and
//! the constraint flags — so a finished fold can be reloaded and queried
//! without rerunning the recurrences. A unified trait-based interface keeps
//! path handling and buffering out of the codecs themselves.

pub mod pfs;
pub mod traits;
