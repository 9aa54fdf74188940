//! Sample-only profile normalization
//!
//! Sample-only profiles carry per-block event counts instead of branch
//! records; pseudo execution counts are derived from them. The active
//! normalization mode follows from the profile's declared event set and is
//! fixed once per load.

/// Active normalization modes for a sample-only profile. At most one is
/// expected to be set for a given profile, since multi-event profiles are
/// rejected at load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalization {
    /// Scale by the block's non-pseudo instruction count.
    pub by_insn_count: bool,
    /// Scale by the block's call count plus one.
    pub by_call_count: bool,
}

impl Normalization {
    /// Derive the modes from the profile's declared event names.
    pub fn from_event_names(event_names: &str) -> Self {
        Self {
            by_insn_count: event_names.contains("cycles") || event_names.contains("instructions"),
            by_call_count: event_names.contains("branches"),
        }
    }

    /// Pseudo execution count for a block with a nonzero event count `e`.
    ///
    /// `samples = e * 1000`, then scaled by non-pseudo instruction count
    /// (when that mode is active and the count is nonzero), else by call
    /// count + 1 (when that mode is active), else left unscaled.
    pub fn normalize(&self, event_count: u64, num_non_pseudo: usize, num_calls: usize) -> u64 {
        let mut samples = event_count * 1000;
        if self.by_insn_count && num_non_pseudo != 0 {
            samples /= num_non_pseudo as u64;
        } else if self.by_call_count {
            samples /= num_calls as u64 + 1;
        }
        samples
    }
}
