//! Profile reader facade
//!
//! One `ProfileReader` value is one profile-load session: it owns the loaded
//! document, the name indices, the mapping, and the mismatch accounting, so
//! repeated loads stay independent. The driving optimizer calls
//! [`ProfileReader::preprocess`] once after loading, then
//! [`ProfileReader::read_profile`] to run matching and projection.

use crate::config::ReaderConfig;
use crate::matcher;
use crate::model::{FunctionProfile, ProfileDocument};
use crate::name_index::{lto_common_name, NameIndex};
use crate::project::{self, Projection};
use crate::sample::Normalization;
use crate::similarity::{Demangler, SystemDemangler};
use log::{info, warn};
use opal_core::{Function, Program};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The single profile format version this reader understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// Fatal profile-load errors. Everything else the reader encounters is
/// recoverable and lands in [`ReaderStats`] instead.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The profile file could not be read.
    #[error("cannot open profile {path}: {source}")]
    Io {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document failed to parse.
    #[error("malformed profile document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document declares an unsupported format version.
    #[error("cannot read profile: unsupported version {0}")]
    UnsupportedVersion(u32),

    /// Multi-event profiles are not supported.
    #[error("multiple events in profile are not supported: {0}")]
    MultipleEvents(String),
}

/// External stale-profile inference, invoked when a matched function's
/// profile disagrees with its current structure. A repair returns `true`
/// and flips the verdict back to matched.
pub trait StaleInference {
    /// Attempt to salvage a usable mapping for a structurally mismatched
    /// pair, mutating the function's counts as a side effect.
    fn infer(&self, function: &mut Function, profile: &FunctionProfile) -> bool;
}

/// Default hook: never repairs anything.
#[derive(Debug, Default)]
pub struct NoStaleInference;

impl StaleInference for NoStaleInference {
    fn infer(&self, _function: &mut Function, _profile: &FunctionProfile) -> bool {
        false
    }
}

/// Aggregate counters for one profile-load session. Recoverable conditions
/// never abort the load; they increment a counter here so downstream
/// tooling can decide whether the accumulated drift is acceptable.
#[derive(Debug, Clone, Default)]
pub struct ReaderStats {
    /// Functions matched by exact name with an agreeing predicate.
    pub matched_with_exact_name: u64,
    /// Functions matched by global structural hash.
    pub matched_with_hash: u64,
    /// Functions matched through LTO common-name grouping.
    pub matched_with_lto_common_name: u64,
    /// Functions matched by name despite a failed predicate.
    pub matched_with_lenient_name: u64,
    /// Functions matched by namespace + edit distance.
    pub matched_with_name_similarity: u64,
    /// Profiles dropped because their target already carried one.
    pub duplicate_profiles_dropped: u64,
    /// Profile records that never reached a program function.
    pub unused_profiled_objects: u64,
    /// Matched pairs whose structural hashes disagreed.
    pub hash_mismatches: u64,
    /// Matched pairs whose block counts disagreed.
    pub block_count_mismatches: u64,
    /// Profiled blocks whose index fell outside the function.
    pub mismatched_blocks: u64,
    /// Call sites that failed offset/instruction validation.
    pub mismatched_calls: u64,
    /// Successor records that resolved to no structural edge.
    pub mismatched_edges: u64,
    /// Annotation writes dropped because the slot was already set.
    pub duplicate_annotations: u64,
    /// Stale functions whose block count still agreed.
    pub stale_funcs_with_equal_block_count: u64,
    /// Functions that ended up carrying a projected profile.
    pub functions_profiled: u64,
}

/// Reads one execution profile and applies it to a program.
pub struct ProfileReader {
    doc: ProfileDocument,
    config: ReaderConfig,
    demangler: Box<dyn Demangler>,
    stale: Box<dyn StaleInference>,
    index: Option<NameIndex>,
    mapping: Vec<Option<usize>>,
    normalization: Normalization,
    stats: ReaderStats,
}

impl ProfileReader {
    /// Cheap check whether a file looks like a profile document.
    pub fn is_profile(path: impl AsRef<Path>) -> bool {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim_start().starts_with('{'),
            Err(_) => false,
        }
    }

    /// Load and validate a profile document from a file.
    pub fn from_path(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: ProfileDocument = serde_json::from_str(&content)?;
        Self::from_document(doc, config)
    }

    /// Validate an already-parsed document.
    pub fn from_document(doc: ProfileDocument, config: ReaderConfig) -> Result<Self, ReaderError> {
        if doc.header.version != SUPPORTED_VERSION {
            return Err(ReaderError::UnsupportedVersion(doc.header.version));
        }
        if doc.header.event_names.contains(',') {
            return Err(ReaderError::MultipleEvents(doc.header.event_names.clone()));
        }
        Ok(Self {
            doc,
            config,
            demangler: Box::new(SystemDemangler),
            stale: Box::new(NoStaleInference),
            index: None,
            mapping: Vec::new(),
            normalization: Normalization::default(),
            stats: ReaderStats::default(),
        })
    }

    /// Replace the demangler used by the name-similarity pass.
    pub fn with_demangler(mut self, demangler: Box<dyn Demangler>) -> Self {
        self.demangler = demangler;
        self
    }

    /// Replace the stale-profile inference hook.
    pub fn with_stale_inference(mut self, stale: Box<dyn StaleInference>) -> Self {
        self.stale = stale;
        self
    }

    /// The loaded document.
    pub fn document(&self) -> &ProfileDocument {
        &self.doc
    }

    /// The session configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Counters accumulated so far in this session.
    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Program function a profile id was mapped to, once
    /// [`ProfileReader::read_profile`] has run.
    pub fn function_for_profile(&self, profile_id: u32) -> Option<usize> {
        self.mapping.get(profile_id as usize).copied().flatten()
    }

    /// Build the name indices and make the preliminary best-effort
    /// execution-count assignment. A profile whose target function already
    /// carries an execution count from an earlier source is dropped with a
    /// warning.
    pub fn preprocess(&mut self, program: &mut Program) {
        let mut index = NameIndex::build(&self.doc, program);

        for (i, fp) in self.doc.functions.iter().enumerate() {
            let Some(function_id) = index.candidates[i] else {
                continue;
            };
            let function = &mut program[function_id];
            if !function.has_profile() {
                function.set_execution_count(Some(fp.exec_count));
            } else {
                if self.config.verbosity >= 1 {
                    warn!("dropping duplicate profile for {}", fp.name);
                }
                self.stats.duplicate_profiles_dropped += 1;
                index.candidates[i] = None;
            }
        }

        self.index = Some(index);
    }

    /// Whether a function can possibly receive data from this profile.
    /// Meaningful after [`ProfileReader::preprocess`]; drives lite mode.
    pub fn may_have_profile_data(&self, function: &Function) -> bool {
        if self.config.match_with_function_hash {
            return true;
        }
        let Some(index) = &self.index else {
            return false;
        };
        for name in function.names() {
            if index.profile_names.contains(name.as_str()) {
                return true;
            }
        }
        for name in function.names() {
            if let Some(common) = lto_common_name(name) {
                if index.lto_profile_groups.contains_key(common) {
                    return true;
                }
            }
        }
        false
    }

    /// Run the matching cascade and project every mapped profile onto its
    /// function. Returns the session counters.
    pub fn read_profile(&mut self, program: &mut Program) -> &ReaderStats {
        if self.index.is_none() {
            self.preprocess(program);
        }
        let index = self
            .index
            .take()
            .unwrap_or_else(|| NameIndex::build(&self.doc, program));

        if self.config.verbosity >= 1 {
            info!("profile uses {:?} structural hashes", self.doc.header.hash_function);
        }

        let (mapping, match_stats) = matcher::run(
            &mut self.doc,
            program,
            &index,
            &self.config,
            self.demangler.as_ref(),
        );
        self.stats.matched_with_exact_name = match_stats.matched_with_exact_name;
        self.stats.matched_with_hash = match_stats.matched_with_hash;
        self.stats.matched_with_lto_common_name = match_stats.matched_with_lto_common_name;
        self.stats.matched_with_lenient_name = match_stats.matched_with_lenient_name;
        self.stats.matched_with_name_similarity = match_stats.matched_with_name_similarity;

        if self.config.verbosity >= 1 {
            for fp in &self.doc.functions {
                if !fp.used {
                    warn!("profile ignored for function {}", fp.name);
                }
            }
            info!(
                "matched {} functions with identical names",
                match_stats.matched_with_exact_name
            );
            info!("matched {} functions with hash", match_stats.matched_with_hash);
            info!(
                "matched {} functions with matching LTO common names",
                match_stats.matched_with_lto_common_name
            );
            info!(
                "matched {} functions with similar names",
                match_stats.matched_with_name_similarity
            );
        }

        self.normalization = Normalization::from_event_names(&self.doc.header.event_names);

        let mut unused = 0u64;
        for i in 0..self.doc.functions.len() {
            let id = self.doc.functions[i].id as usize;
            let target = mapping.get(id).copied().flatten();
            match target {
                Some(function_id) => {
                    let cx = Projection {
                        config: &self.config,
                        header: &self.doc.header,
                        normalization: self.normalization,
                        mapping: &mapping,
                    };
                    project::apply_profile(
                        &cx,
                        program,
                        function_id,
                        &self.doc.functions[i],
                        self.stale.as_ref(),
                        &mut self.stats,
                    );
                }
                None => unused += 1,
            }
        }
        self.stats.unused_profiled_objects = unused;

        // Lite mode: with hash matching active, anything still unprofiled
        // cannot receive data later and is dropped from consideration.
        if self.config.lite && self.config.match_with_function_hash {
            for function in program.functions_mut() {
                if !function.has_profile() {
                    function.set_ignored(true);
                }
            }
        }

        self.index = Some(index);
        self.mapping = mapping;
        &self.stats
    }
}
