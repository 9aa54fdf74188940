//! Opal Binary Program Model
//!
//! In-memory representation of the binary being optimized, as seen by the
//! profile subsystem:
//! - **Program**: the ordered set of disassembled functions with name lookup
//! - **Function**: control-flow graph, block orderings, structural hash
//! - **BasicBlock**: instructions, successor edges, branch counts
//! - **Instruction**: shape classification and profile annotations
//!
//! The profile reader (`opal-profile`) queries this model during matching and
//! mutates it in place during count projection. All mutation is confined to a
//! single function at a time.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod block;
pub mod function;
pub mod hash;
pub mod instruction;
pub mod program;

pub use block::{BasicBlock, BranchInfo, Edge};
pub use function::{BlockOrder, CallRecord, Function};
pub use hash::HashFunction;
pub use instruction::{CallTarget, InstrKind, Instruction};
pub use program::Program;
