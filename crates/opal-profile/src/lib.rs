//! Opal Profile Subsystem
//!
//! Reconciles an externally captured execution profile (block, branch, and
//! call-site counts) with the control-flow structure of the binary being
//! optimized. The binary may have drifted from the one the profile was
//! collected on — recompilation, renaming, LTO privatization — so a profile
//! record cannot be tied to a function by name alone:
//!
//! - **model**: passive profile records and the document header
//! - **name_index**: exact-name candidates and LTO common-name groupings
//! - **matcher**: the ordered matching-strategy cascade producing a
//!   one-to-one profile-to-function mapping
//! - **project**: per-function projection of block/edge/call-site counts
//!   onto the (possibly reordered) CFG, with mismatch accounting
//! - **sample**: pseudo execution counts for sample-only profiles
//! - **reader**: the session facade (`preprocess` / `read_profile`)
//!
//! # Example
//!
//! ```rust,ignore
//! use opal_profile::{ProfileReader, ReaderConfig};
//!
//! let mut reader = ProfileReader::from_path("perf.profile", ReaderConfig::default())?;
//! reader.preprocess(&mut program);
//! let stats = reader.read_profile(&mut program);
//! println!("matched {} functions by name", stats.matched_with_exact_name);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod matcher;
pub mod model;
pub mod name_index;
pub mod project;
pub mod reader;
pub mod sample;
pub mod similarity;

pub use config::ReaderConfig;
pub use matcher::MatchStats;
pub use model::{
    flags, BlockProfile, CallSiteProfile, FunctionProfile, ProfileDocument, ProfileHeader,
    SuccessorProfile,
};
pub use name_index::{lto_common_name, strip_unique_suffix, NameIndex};
pub use reader::{
    NoStaleInference, ProfileReader, ReaderError, ReaderStats, StaleInference, SUPPORTED_VERSION,
};
pub use sample::Normalization;
pub use similarity::{edit_distance, Demangler, SystemDemangler};
