//! Profile document model
//!
//! Passive data records describing one captured execution profile. The
//! document is populated once at load time and is read-only afterwards,
//! except for the `used` flag the matcher sets when a record enters the
//! final mapping.

use opal_core::HashFunction;
use serde::{Deserialize, Serialize};

/// Collection flags carried in the profile header.
pub mod flags {
    /// Profile was collected with branch records.
    pub const BRANCH: u8 = 0x1;
    /// Sample-only profile: per-block event counts, no branch records.
    pub const SAMPLE: u8 = 0x2;
}

/// Profile document header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileHeader {
    /// Format version; only [`crate::SUPPORTED_VERSION`] is readable.
    pub version: u32,
    /// Hash function that produced the structural fingerprints.
    #[serde(default)]
    pub hash_function: HashFunction,
    /// Name of the hardware event the profile was collected on. A profile
    /// covering multiple (comma-separated) events is rejected at load.
    #[serde(default)]
    pub event_names: String,
    /// Whether block indices refer to depth-first order rather than layout
    /// order.
    #[serde(default)]
    pub dfs_order: bool,
    /// Collection flags, see [`flags`].
    #[serde(default)]
    pub flags: u8,
}

/// A captured profile for one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProfile {
    /// Stable index into the profile's function list; the mapping produced
    /// by the matcher is keyed on it.
    pub id: u32,
    /// Function name as recorded at collection time. May carry an LTO
    /// privatization suffix or a uniquification marker.
    pub name: String,
    /// Structural fingerprint of the profiled function.
    #[serde(default)]
    pub hash: u64,
    /// Number of basic blocks the function had at collection time.
    #[serde(default)]
    pub num_blocks: u32,
    /// Function-level execution count.
    #[serde(default)]
    pub exec_count: u64,
    /// Set once the record is matched to a program function. Never reset
    /// within a session.
    #[serde(skip)]
    pub used: bool,
    /// Per-block records, in the profile's own block ordering.
    #[serde(default)]
    pub blocks: Vec<BlockProfile>,
}

/// A captured profile for one basic block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockProfile {
    /// Position in the profile's block ordering (layout or depth-first, per
    /// the header).
    pub index: u32,
    /// Block execution count.
    #[serde(default)]
    pub exec_count: u64,
    /// Sample event count; only present in sample-only profiles.
    #[serde(default)]
    pub event_count: Option<u64>,
    /// Observed successor edges.
    #[serde(default)]
    pub successors: Vec<SuccessorProfile>,
    /// Observed call sites.
    #[serde(default)]
    pub call_sites: Vec<CallSiteProfile>,
}

/// An observed successor edge of a profiled block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessorProfile {
    /// Target block index, in the same ordering as block indices.
    pub index: u32,
    /// Times the edge was taken.
    #[serde(default)]
    pub count: u64,
    /// Times the branch predictor missed.
    #[serde(default)]
    pub mispredicted: u64,
}

/// An observed call site within a profiled block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallSiteProfile {
    /// Profile id of the callee, or `None` for non-function targets.
    #[serde(default)]
    pub dest_id: Option<u32>,
    /// Observed call count.
    #[serde(default)]
    pub count: u64,
    /// Observed mispredictions.
    #[serde(default)]
    pub mispredicted: u64,
    /// Byte offset of the call site within the source block.
    #[serde(default)]
    pub offset: u64,
    /// Selects among multiple entry points of a multi-entry callee.
    #[serde(default)]
    pub entry_discriminator: u32,
}

/// A full profile document: header plus function records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    /// Document header.
    pub header: ProfileHeader,
    /// Function records, in collection order.
    #[serde(default)]
    pub functions: Vec<FunctionProfile>,
}

impl ProfileDocument {
    /// Whether the declared event names mention `name`.
    pub fn uses_event(&self, name: &str) -> bool {
        self.header.event_names.contains(name)
    }

    /// Whether this is a sample-only (no branch records) profile.
    pub fn is_sample_profile(&self) -> bool {
        self.header.flags & flags::SAMPLE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let doc: ProfileDocument = serde_json::from_str(
            r#"{
                "header": {"version": 1, "hash_function": "stable", "event_names": "cycles"},
                "functions": [
                    {"id": 0, "name": "main", "hash": 42, "num_blocks": 2, "exec_count": 7,
                     "blocks": [
                        {"index": 0, "exec_count": 7,
                         "successors": [{"index": 1, "count": 5}],
                         "call_sites": [{"dest_id": 1, "count": 3, "offset": 4}]}
                     ]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(doc.header.version, 1);
        assert!(!doc.header.dfs_order);
        assert_eq!(doc.functions.len(), 1);
        let f = &doc.functions[0];
        assert!(!f.used);
        assert_eq!(f.blocks[0].successors[0].count, 5);
        assert_eq!(f.blocks[0].call_sites[0].dest_id, Some(1));
        assert_eq!(f.blocks[0].call_sites[0].mispredicted, 0);
        assert_eq!(f.blocks[0].event_count, None);
    }

    #[test]
    fn test_uses_event_is_substring_match() {
        let doc = ProfileDocument {
            header: ProfileHeader {
                version: 1,
                hash_function: HashFunction::Legacy,
                event_names: "cycles:u".to_string(),
                dfs_order: false,
                flags: flags::SAMPLE,
            },
            functions: vec![],
        };
        assert!(doc.uses_event("cycles"));
        assert!(!doc.uses_event("branches"));
        assert!(doc.is_sample_profile());
    }
}
