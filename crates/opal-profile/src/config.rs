//! Reader configuration
//!
//! The reference system kept these as process-wide option flags; here they
//! form one immutable value threaded into every matching and projection
//! operation, so repeated loads stay independent.

/// Configuration for one profile-load session.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Diagnostic verbosity: 0 silent, 1 warnings, 2 per-record detail.
    pub verbosity: u32,
    /// Skip structural-hash comparison; the match predicate degrades to
    /// block-count equality.
    pub ignore_hash: bool,
    /// Enable the global-hash matching pass (hashes every program function).
    pub match_with_function_hash: bool,
    /// Maximum edit distance for the name-similarity pass; 0 disables the
    /// pass entirely.
    pub name_similarity_threshold: u32,
    /// Hand structurally mismatched functions to the stale-profile
    /// inference hook.
    pub infer_stale_profile: bool,
    /// Drop unprofiled functions from further consideration when the
    /// global-hash pass is active.
    pub lite: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            ignore_hash: false,
            match_with_function_hash: false,
            name_similarity_threshold: 0,
            infer_stale_profile: false,
            lite: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_optional_passes() {
        let config = ReaderConfig::default();
        assert!(!config.match_with_function_hash);
        assert_eq!(config.name_similarity_threshold, 0);
        assert!(!config.infer_stale_profile);
        assert!(!config.ignore_hash);
        assert!(!config.lite);
    }
}
