//! Function matching cascade
//!
//! Runs the matching strategies in fixed precedence to build a one-to-one
//! (partial) mapping from profile records to program functions:
//!
//! 1. exact name + match predicate
//! 2. global structural hash (opt-in)
//! 3. LTO common name, with a lenient single-candidate rule
//! 4. lenient exact name (name identity despite a failed predicate)
//! 5. name similarity by namespace + edit distance (opt-in)
//!
//! Once a profile record is marked used it is skipped by all later
//! strategies; once a program function is claimed it is skipped as a target.
//! An unmatched record on either side is a normal outcome, not an error.

use crate::config::ReaderConfig;
use crate::model::{FunctionProfile, ProfileDocument};
use crate::name_index::{strip_unique_suffix, NameIndex};
use crate::similarity::{edit_distance, Demangler};
use opal_core::{BlockOrder, Function, Program};
use rustc_hash::{FxHashMap, FxHashSet};

/// How many profile records each strategy matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Matched by exact name with an agreeing hash (or block count).
    pub matched_with_exact_name: u64,
    /// Matched by global structural hash.
    pub matched_with_hash: u64,
    /// Matched through LTO common-name grouping.
    pub matched_with_lto_common_name: u64,
    /// Matched by exact name despite a failed match predicate.
    pub matched_with_lenient_name: u64,
    /// Matched by namespace grouping and edit distance.
    pub matched_with_name_similarity: u64,
}

/// Session-scoped matching state: the claimed set and the mapping under
/// construction. Discarded once the mapping is produced.
pub(crate) struct MatchState {
    mapping: Vec<Option<usize>>,
    claimed: FxHashSet<usize>,
    stats: MatchStats,
}

/// The match predicate: under `ignore_hash` the block counts must agree,
/// otherwise the structural hashes must.
fn profile_matches(config: &ReaderConfig, fp: &FunctionProfile, function: &Function) -> bool {
    if config.ignore_hash {
        fp.num_blocks as usize == function.block_count()
    } else {
        function.hash() == Some(fp.hash)
    }
}

impl MatchState {
    pub(crate) fn new(profile_count: usize) -> Self {
        Self {
            mapping: vec![None; profile_count + 1],
            claimed: FxHashSet::default(),
            stats: MatchStats::default(),
        }
    }

    fn is_claimed(&self, function_id: usize) -> bool {
        self.claimed.contains(&function_id)
    }

    /// Enter a pair into the mapping. The pair is never unmatched again
    /// within the session.
    fn bind(&mut self, fp: &mut FunctionProfile, function_id: usize) {
        debug_assert!(!fp.used, "profile record matched twice");
        debug_assert!(!self.is_claimed(function_id), "program function claimed twice");
        fp.used = true;
        self.claimed.insert(function_id);
        let id = fp.id as usize;
        if id < self.mapping.len() {
            self.mapping[id] = Some(function_id);
        }
    }

    /// Strategy 1: exact-name candidates whose match predicate holds.
    ///
    /// Also clears each candidate's preliminary execution count (assigned
    /// during preprocessing) so only projected counts survive.
    pub(crate) fn match_with_exact_name(
        &mut self,
        doc: &mut ProfileDocument,
        program: &mut Program,
        index: &NameIndex,
        config: &ReaderConfig,
    ) {
        for (i, fp) in doc.functions.iter_mut().enumerate() {
            let Some(function_id) = index.candidates[i] else {
                continue;
            };
            program[function_id].set_execution_count(None);
            if fp.used || self.is_claimed(function_id) {
                continue;
            }
            if profile_matches(config, fp, &program[function_id]) {
                self.bind(fp, function_id);
                self.stats.matched_with_exact_name += 1;
            }
        }
    }

    /// Strategy 2: identical structural hash anywhere in the program.
    /// Serves renamed but otherwise unchanged functions. Collisions are
    /// tolerated: the first unclaimed function in enumeration order wins.
    pub(crate) fn match_with_global_hash(
        &mut self,
        doc: &mut ProfileDocument,
        program: &Program,
    ) {
        let mut by_hash: FxHashMap<u64, Vec<usize>> = FxHashMap::default();
        for (id, function) in program.functions().iter().enumerate() {
            if let Some(hash) = function.hash() {
                by_hash.entry(hash).or_default().push(id);
            }
        }

        for fp in doc.functions.iter_mut() {
            if fp.used {
                continue;
            }
            let Some(group) = by_hash.get(&fp.hash) else {
                continue;
            };
            let found = group.iter().copied().find(|id| !self.claimed.contains(id));
            if let Some(function_id) = found {
                self.bind(fp, function_id);
                self.stats.matched_with_hash += 1;
            }
        }
    }

    /// Strategy 3: name ambiguity for LTO-privatized clones. At most one
    /// profile record per common-name group matches through the predicate;
    /// failing that, a group reduced to a single unclaimed program function
    /// matches its first unused record unconditionally.
    pub(crate) fn match_with_lto_common_name(
        &mut self,
        doc: &mut ProfileDocument,
        program: &Program,
        index: &NameIndex,
        config: &ReaderConfig,
    ) {
        for (common, profiles) in &index.lto_profile_groups {
            let Some(group) = index.lto_program_groups.get(common) else {
                continue;
            };

            let mut group_matched = false;
            for &p in profiles {
                if doc.functions[p].used {
                    continue;
                }
                let found = group.iter().copied().find(|&id| {
                    !self.claimed.contains(&id)
                        && profile_matches(config, &doc.functions[p], &program[id])
                });
                if let Some(function_id) = found {
                    self.bind(&mut doc.functions[p], function_id);
                    self.stats.matched_with_lto_common_name += 1;
                    group_matched = true;
                    break;
                }
            }
            if group_matched {
                continue;
            }

            // Single-candidate rule: identity inferred purely from the
            // common-name grouping, bypassing the predicate.
            let mut unclaimed = group.iter().copied().filter(|id| !self.claimed.contains(id));
            if let (Some(function_id), None) = (unclaimed.next(), unclaimed.next()) {
                if let Some(&p) = profiles.iter().find(|&&p| !doc.functions[p].used) {
                    self.bind(&mut doc.functions[p], function_id);
                    self.stats.matched_with_lto_common_name += 1;
                }
            }
        }
    }

    /// Strategy 4: name identity is sufficient evidence even when the
    /// structural predicate disagreed; the projector records the drift.
    pub(crate) fn match_with_lenient_name(
        &mut self,
        doc: &mut ProfileDocument,
        index: &NameIndex,
    ) {
        for (i, fp) in doc.functions.iter_mut().enumerate() {
            if fp.used {
                continue;
            }
            let Some(function_id) = index.candidates[i] else {
                continue;
            };
            if self.is_claimed(function_id) {
                continue;
            }
            self.bind(fp, function_id);
            self.stats.matched_with_lenient_name += 1;
        }
    }

    /// Strategy 5: demangled-name similarity within a namespace, gated on
    /// equal block counts and the configured edit-distance threshold.
    pub(crate) fn match_with_name_similarity(
        &mut self,
        doc: &mut ProfileDocument,
        program: &Program,
        config: &ReaderConfig,
        demangler: &dyn Demangler,
    ) {
        // Demangle profile names once; collect the block counts present in
        // each namespace so program functions can be pruned early.
        let mut namespace_sizes: FxHashMap<String, FxHashSet<u32>> = FxHashMap::default();
        let mut demangled_names = Vec::with_capacity(doc.functions.len());
        let mut namespaces = Vec::with_capacity(doc.functions.len());
        for fp in &doc.functions {
            let demangled = demangler.demangle(strip_unique_suffix(&fp.name));
            let namespace = demangler.namespace_of(&demangled);
            namespace_sizes
                .entry(namespace.clone())
                .or_default()
                .insert(fp.num_blocks);
            demangled_names.push(demangled);
            namespaces.push(namespace);
        }

        // Group program functions by namespace, keeping only those with an
        // equal-sized profile record in the same namespace.
        let mut namespace_functions: FxHashMap<String, Vec<(usize, String)>> =
            FxHashMap::default();
        for (id, function) in program.functions().iter().enumerate() {
            let demangled = demangler.demangle(strip_unique_suffix(function.name()));
            let namespace = demangler.namespace_of(&demangled);
            let Some(sizes) = namespace_sizes.get(&namespace) else {
                continue;
            };
            if !sizes.contains(&(function.block_count() as u32)) {
                continue;
            }
            namespace_functions
                .entry(namespace)
                .or_default()
                .push((id, demangled));
        }

        for (i, fp) in doc.functions.iter_mut().enumerate() {
            if fp.used {
                continue;
            }
            let Some(group) = namespace_functions.get(&namespaces[i]) else {
                continue;
            };

            // Closest unclaimed same-sized function; ties keep the first
            // one in enumeration order.
            let mut min_distance = usize::MAX;
            let mut closest = None;
            for (function_id, demangled) in group {
                if self.claimed.contains(function_id) {
                    continue;
                }
                if program[*function_id].block_count() != fp.num_blocks as usize {
                    continue;
                }
                let distance = edit_distance(demangled, &demangled_names[i]);
                if distance < min_distance {
                    min_distance = distance;
                    closest = Some(*function_id);
                }
            }

            if let Some(function_id) = closest {
                if min_distance <= config.name_similarity_threshold as usize {
                    self.bind(fp, function_id);
                    self.stats.matched_with_name_similarity += 1;
                }
            }
        }
    }

    pub(crate) fn into_result(self) -> (Vec<Option<usize>>, MatchStats) {
        (self.mapping, self.stats)
    }
}

/// Run the full cascade and return the profile-id -> function mapping plus
/// per-strategy counts. Structural hashes are precomputed here under the
/// ordering and hash function the profile header declares.
pub(crate) fn run(
    doc: &mut ProfileDocument,
    program: &mut Program,
    index: &NameIndex,
    config: &ReaderConfig,
    demangler: &dyn Demangler,
) -> (Vec<Option<usize>>, MatchStats) {
    let order = if doc.header.dfs_order {
        BlockOrder::DepthFirst
    } else {
        BlockOrder::Layout
    };
    let hash_function = doc.header.hash_function;

    if config.match_with_function_hash {
        for function in program.functions_mut() {
            function.compute_hash(order, hash_function);
        }
    } else if !config.ignore_hash {
        for &function_id in index.candidates.iter().flatten() {
            program[function_id].compute_hash(order, hash_function);
        }
        // LTO-group members also face the match predicate.
        for group in index.lto_program_groups.values() {
            for &function_id in group {
                if program[function_id].hash().is_none() {
                    program[function_id].compute_hash(order, hash_function);
                }
            }
        }
    }

    let mut state = MatchState::new(doc.functions.len());
    state.match_with_exact_name(doc, program, index, config);
    if config.match_with_function_hash {
        state.match_with_global_hash(doc, program);
    }
    state.match_with_lto_common_name(doc, program, index, config);
    state.match_with_lenient_name(doc, index);
    if config.name_similarity_threshold > 0 {
        state.match_with_name_similarity(doc, program, config, demangler);
    }
    (state.mapping, state.stats)
}
