//! Basic blocks and successor edges

use crate::instruction::Instruction;
use serde::{Deserialize, Serialize};

/// Taken/mispredicted counters on a successor edge. Counts accumulate:
/// several profile records may resolve to the same structural edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Times the edge was taken.
    pub count: u64,
    /// Times the branch predictor missed.
    pub mispredicted: u64,
}

/// A successor edge of a basic block.
///
/// For two-successor blocks the edge order is significant: the first edge is
/// the taken target, the second is the fall-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Layout index of the target block within the owning function.
    pub target: usize,
    /// Accumulated branch counters.
    #[serde(default)]
    pub info: BranchInfo,
}

/// A basic block of a function's control-flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Byte offset of the block in the function's input address space.
    pub input_offset: u64,
    /// Size in bytes the block had in the input binary.
    pub original_size: u64,
    /// Whether this block is a function entry point (primary or secondary).
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    execution_count: Option<u64>,
    /// Instructions, with offsets relative to the function input space.
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    successors: Vec<Edge>,
}

impl BasicBlock {
    /// Create an empty block spanning `[input_offset, input_offset + original_size)`.
    pub fn new(input_offset: u64, original_size: u64) -> Self {
        Self {
            input_offset,
            original_size,
            is_entry: false,
            execution_count: None,
            instructions: Vec::new(),
            successors: Vec::new(),
        }
    }

    /// Append an instruction.
    pub fn push_instruction(&mut self, instr: Instruction) -> &mut Self {
        self.instructions.push(instr);
        self
    }

    /// Append a successor edge with zeroed counters.
    pub fn add_successor(&mut self, target: usize) -> &mut Self {
        self.successors.push(Edge {
            target,
            info: BranchInfo::default(),
        });
        self
    }

    /// Successor edges in CFG order.
    pub fn successors(&self) -> &[Edge] {
        &self.successors
    }

    /// Number of successor edges.
    pub fn succ_count(&self) -> usize {
        self.successors.len()
    }

    /// Whether `target` is a direct structural successor.
    pub fn has_successor(&self, target: usize) -> bool {
        self.successors.iter().any(|e| e.target == target)
    }

    /// Mutable counters of the edge to `target`, if it exists.
    pub fn branch_info_mut(&mut self, target: usize) -> Option<&mut BranchInfo> {
        self.successors
            .iter_mut()
            .find(|e| e.target == target)
            .map(|e| &mut e.info)
    }

    /// Fall-through target of a conditional branch: the second successor of a
    /// two-successor block. `None` for any other fan-out.
    pub fn fallthrough_successor(&self) -> Option<usize> {
        if self.successors.len() == 2 {
            Some(self.successors[1].target)
        } else {
            None
        }
    }

    /// Execution count, if one has been projected onto this block.
    pub fn execution_count(&self) -> Option<u64> {
        self.execution_count
    }

    /// Set the execution count.
    pub fn set_execution_count(&mut self, count: u64) {
        self.execution_count = Some(count);
    }

    /// Instructions that occupy an execution slot.
    pub fn num_non_pseudo(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| !i.kind.is_pseudo())
            .count()
    }

    /// Call instructions in this block.
    pub fn num_calls(&self) -> usize {
        self.instructions.iter().filter(|i| i.kind.is_call()).count()
    }

    /// Whether `offset` (function input space) falls inside this block.
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.input_offset && offset < self.input_offset + self.original_size
    }

    /// Mutable instruction at an exact input-space offset.
    pub fn instruction_at_offset(&mut self, offset: u64) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|i| i.offset == offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstrKind;

    #[test]
    fn test_branch_info_accumulates() {
        let mut bb = BasicBlock::new(0, 8);
        bb.add_successor(1).add_successor(2);
        {
            let info = bb.branch_info_mut(2).unwrap();
            info.count += 10;
            info.mispredicted += 1;
        }
        {
            let info = bb.branch_info_mut(2).unwrap();
            info.count += 5;
        }
        assert_eq!(bb.successors()[1].info.count, 15);
        assert_eq!(bb.successors()[1].info.mispredicted, 1);
    }

    #[test]
    fn test_fallthrough_requires_two_successors() {
        let mut one = BasicBlock::new(0, 4);
        one.add_successor(1);
        assert_eq!(one.fallthrough_successor(), None);

        let mut two = BasicBlock::new(0, 4);
        two.add_successor(3).add_successor(1);
        assert_eq!(two.fallthrough_successor(), Some(1));
    }

    #[test]
    fn test_instruction_counters() {
        let mut bb = BasicBlock::new(16, 12);
        bb.push_instruction(Instruction::new(16, InstrKind::Other))
            .push_instruction(Instruction::new(20, InstrKind::Pseudo))
            .push_instruction(Instruction::new(24, InstrKind::Call));
        assert_eq!(bb.num_non_pseudo(), 2);
        assert_eq!(bb.num_calls(), 1);
        assert!(bb.contains_offset(24));
        assert!(!bb.contains_offset(28));
        assert!(bb.instruction_at_offset(20).is_some());
        assert!(bb.instruction_at_offset(21).is_none());
    }
}
