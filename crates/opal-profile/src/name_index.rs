//! Name indexing
//!
//! Lookup structures built once per profile load: the exact-name candidate
//! for every profile record, and the LTO common-name groupings on both the
//! profile and the program side.
//!
//! Groupings whose enumeration order affects tie-breaking use `BTreeMap`,
//! keeping match results reproducible across runs on the same inputs.

use crate::model::ProfileDocument;
use opal_core::Program;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// Markers appended by LTO privatization and related clone-producing
/// transforms. The common name retains the marker itself, so clones of
/// different transforms never collapse into one group.
const LTO_SUFFIXES: [&str; 4] = [".__uniq.", ".lto_priv.", ".constprop.", ".llvm."];

/// Truncate a profile name at the name-resolver uniquification marker.
pub fn strip_unique_suffix(name: &str) -> &str {
    match name.find("(*") {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// The LTO common name of `name`: the prefix up to and including the first
/// recognized privatization marker. `None` when no marker is present.
pub fn lto_common_name(name: &str) -> Option<&str> {
    for suffix in LTO_SUFFIXES {
        if let Some(pos) = name.find(suffix) {
            return Some(&name[..pos + suffix.len()]);
        }
    }
    None
}

/// Per-session name lookup structures.
#[derive(Debug)]
pub struct NameIndex {
    /// Exact-name candidate per profile record, parallel to the document's
    /// function list. `None` when no program function answers to the name,
    /// or after the candidate was dropped as a duplicate profile target.
    pub candidates: Vec<Option<usize>>,
    /// Every (suffix-stripped) profile function name.
    pub profile_names: FxHashSet<String>,
    /// LTO common name -> profile record indices sharing it, in profile
    /// order.
    pub lto_profile_groups: BTreeMap<String, Vec<usize>>,
    /// LTO common name -> program function ids sharing it, sorted.
    pub lto_program_groups: BTreeMap<String, Vec<usize>>,
}

impl NameIndex {
    /// Build the index from a loaded document and the program's name table.
    /// Pure read; a name with no candidate is recorded as `None`.
    pub fn build(doc: &ProfileDocument, program: &Program) -> Self {
        let mut candidates = Vec::with_capacity(doc.functions.len());
        let mut profile_names = FxHashSet::default();
        let mut lto_profile_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (i, fp) in doc.functions.iter().enumerate() {
            let name = strip_unique_suffix(&fp.name);
            profile_names.insert(name.to_string());
            candidates.push(program.function_by_name(name));
            if let Some(common) = lto_common_name(name) {
                lto_profile_groups.entry(common.to_string()).or_default().push(i);
            }
        }

        let mut lto_program_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (id, function) in program.functions().iter().enumerate() {
            for name in function.names() {
                if let Some(common) = lto_common_name(name) {
                    lto_program_groups.entry(common.to_string()).or_default().push(id);
                }
            }
        }
        for group in lto_program_groups.values_mut() {
            group.sort_unstable();
            group.dedup();
        }

        Self {
            candidates,
            profile_names,
            lto_profile_groups,
            lto_program_groups,
        }
    }

    /// Whether the profile carries local-symbol names qualified with a file
    /// name ("sym/file/discriminator").
    pub fn has_locals_with_file_name(&self) -> bool {
        self.profile_names
            .iter()
            .any(|name| name.matches('/').count() == 2 && !name.starts_with('/'))
    }
}
