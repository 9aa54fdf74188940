//! Functions: CFG container, block orderings, structural hash

use crate::block::BasicBlock;
use crate::hash::HashFunction;
use crate::instruction::Instruction;
use serde::{Deserialize, Serialize};

/// Ordering policy for a function's basic blocks.
///
/// Profile block indices are only meaningful relative to whichever ordering
/// the profile was collected under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrder {
    /// Current layout order, i.e. the order blocks are stored in.
    Layout,
    /// Preorder depth-first traversal from the entry points, following
    /// successor edges in edge order. Unreachable blocks are excluded.
    DepthFirst,
}

/// A raw profiled call site recorded on a function, kept regardless of
/// whether the per-instruction annotation later validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Callee entry symbol, or `None` for non-function targets.
    pub callee: Option<String>,
    /// Observed call count.
    pub count: u64,
    /// Observed mispredictions.
    pub mispredicted: u64,
    /// Byte offset of the call site within its source block.
    pub offset: u64,
}

/// A disassembled function of the program being optimized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// All names this function is known by; index 0 is the primary name.
    names: Vec<String>,
    /// Entry symbols, indexed by entry discriminator; index 0 is the primary
    /// entry point.
    #[serde(default)]
    entry_symbols: Vec<String>,
    #[serde(default)]
    hash: Option<u64>,
    #[serde(default)]
    execution_count: Option<u64>,
    #[serde(default)]
    raw_branch_count: u64,
    /// Basic blocks in layout order.
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
    #[serde(default)]
    call_records: Vec<CallRecord>,
    #[serde(default)]
    profile_flags: Option<u8>,
    #[serde(default)]
    ignored: bool,
}

impl Function {
    /// Create an empty function. The primary name doubles as the primary
    /// entry symbol.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            entry_symbols: vec![name.clone()],
            names: vec![name],
            hash: None,
            execution_count: None,
            raw_branch_count: 0,
            blocks: Vec::new(),
            call_records: Vec::new(),
            profile_flags: None,
            ignored: false,
        }
    }

    /// Register an alternative name (e.g. an alias symbol).
    pub fn add_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.names.push(name.into());
        self
    }

    /// Register a secondary entry symbol. Discriminators select entries in
    /// registration order.
    pub fn add_entry_symbol(&mut self, symbol: impl Into<String>) -> &mut Self {
        self.entry_symbols.push(symbol.into());
        self
    }

    /// Append a block. The first block becomes the primary entry point.
    pub fn push_block(&mut self, mut block: BasicBlock) -> &mut Self {
        if self.blocks.is_empty() {
            block.is_entry = true;
        }
        self.blocks.push(block);
        self
    }

    /// Primary name.
    pub fn name(&self) -> &str {
        &self.names[0]
    }

    /// Every name this function answers to.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Entry symbol for an entry discriminator. The primary name stands in
    /// for the primary entry when no symbols were registered explicitly.
    pub fn entry_symbol(&self, discriminator: u32) -> Option<&str> {
        if self.entry_symbols.is_empty() && discriminator == 0 {
            return Some(self.name());
        }
        self.entry_symbols
            .get(discriminator as usize)
            .map(String::as_str)
    }

    /// Number of basic blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the function has no body.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Cached structural hash, if computed or supplied.
    pub fn hash(&self) -> Option<u64> {
        self.hash
    }

    /// Function-level execution count; `None` means no profile.
    pub fn execution_count(&self) -> Option<u64> {
        self.execution_count
    }

    /// Set or clear the function-level execution count.
    pub fn set_execution_count(&mut self, count: Option<u64>) {
        self.execution_count = count;
    }

    /// Total branch events recorded for this function in the profile.
    pub fn raw_branch_count(&self) -> u64 {
        self.raw_branch_count
    }

    /// Set the raw branch event total.
    pub fn set_raw_branch_count(&mut self, count: u64) {
        self.raw_branch_count = count;
    }

    /// Raw profiled call sites recorded on this function.
    pub fn call_records(&self) -> &[CallRecord] {
        &self.call_records
    }

    /// Record a raw profiled call site.
    pub fn add_call_record(&mut self, record: CallRecord) {
        self.call_records.push(record);
    }

    /// Whether any profile data (counts or flags) is attached.
    pub fn has_profile(&self) -> bool {
        self.execution_count.is_some() || self.profile_flags.is_some()
    }

    /// Mark the function as carrying a projected profile, tagged with the
    /// profile's collection flags.
    pub fn mark_profiled(&mut self, flags: u8) {
        self.profile_flags = Some(flags);
    }

    /// Collection flags of the projected profile, if any.
    pub fn profile_flags(&self) -> Option<u8> {
        self.profile_flags
    }

    /// Drop this function from further optimization.
    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    /// Whether the function was dropped from further optimization.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Materialize the block ordering under `order` as indices into
    /// [`Function::blocks`].
    pub fn block_order(&self, order: BlockOrder) -> Vec<usize> {
        match order {
            BlockOrder::Layout => (0..self.blocks.len()).collect(),
            BlockOrder::DepthFirst => self.dfs_order(),
        }
    }

    fn dfs_order(&self) -> Vec<usize> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<usize> = Vec::new();

        // Entries seed the traversal in layout order.
        for (i, block) in self.blocks.iter().enumerate().rev() {
            if block.is_entry {
                stack.push(i);
            }
        }

        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            // Reverse push so the first successor is visited first.
            for edge in self.blocks[i].successors().iter().rev() {
                if edge.target < self.blocks.len() && !visited[edge.target] {
                    stack.push(edge.target);
                }
            }
        }
        order
    }

    /// Compute, cache, and return the structural hash under the given block
    /// ordering and hash function.
    pub fn compute_hash(&mut self, order: BlockOrder, hash_function: HashFunction) -> u64 {
        let order = self.block_order(order);
        // Position of each block within the ordering, so successor targets
        // hash the same regardless of layout permutations.
        let mut position = vec![u32::MAX; self.blocks.len()];
        for (pos, &b) in order.iter().enumerate() {
            position[b] = pos as u32;
        }

        let mut bytes = Vec::with_capacity(order.len() * 16);
        for &b in &order {
            let block = &self.blocks[b];
            bytes.extend_from_slice(&(block.num_non_pseudo() as u32).to_le_bytes());
            for instr in &block.instructions {
                if !instr.kind.is_pseudo() {
                    bytes.push(instr.kind as u8);
                }
            }
            bytes.extend_from_slice(&(block.succ_count() as u32).to_le_bytes());
            for edge in block.successors() {
                let target = position.get(edge.target).copied().unwrap_or(u32::MAX);
                bytes.extend_from_slice(&target.to_le_bytes());
            }
        }

        let hash = hash_function.digest(&bytes);
        self.hash = Some(hash);
        hash
    }

    /// Mutable instruction at an input-space offset, searching the block
    /// whose original span contains it.
    pub fn instruction_at_offset(&mut self, offset: u64) -> Option<&mut Instruction> {
        self.blocks
            .iter_mut()
            .find(|b| b.contains_offset(offset))
            .and_then(|b| b.instruction_at_offset(offset))
    }
}
