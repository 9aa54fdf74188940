//! Instructions and profile annotations
//!
//! The profile reader only needs to know an instruction's shape (is it a
//! call, an indirect branch, ...) and where to attach observed counts, so
//! instructions carry a kind tag plus typed annotation slots instead of full
//! operand data.

use serde::{Deserialize, Serialize};

/// Shape classification of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrKind {
    /// Direct call to a known target.
    Call,
    /// Call through a register or memory operand.
    IndirectCall,
    /// Indirect jump (e.g. a jump table dispatch).
    IndirectBranch,
    /// Conditional tail call.
    CondTailCall,
    /// Direct branch, conditional or not.
    Branch,
    /// Directive or CFI pseudo-instruction; occupies no execution slot.
    Pseudo,
    /// Anything else.
    Other,
}

impl InstrKind {
    /// Whether this instruction transfers control via a call.
    pub fn is_call(self) -> bool {
        matches!(
            self,
            InstrKind::Call | InstrKind::IndirectCall | InstrKind::CondTailCall
        )
    }

    /// Whether this instruction dispatches through a computed target.
    pub fn is_indirect(self) -> bool {
        matches!(self, InstrKind::IndirectCall | InstrKind::IndirectBranch)
    }

    /// Whether this is a pseudo-instruction.
    pub fn is_pseudo(self) -> bool {
        self == InstrKind::Pseudo
    }
}

/// One observed callee of an indirect call or branch site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    /// Callee symbol, if the target resolved to a known function entry.
    pub symbol: Option<String>,
    /// Times this target was taken.
    pub count: u64,
    /// Times the branch predictor missed on it.
    pub mispredicted: u64,
}

/// An instruction with its profile annotation slots.
///
/// Scalar slots (`count`, the conditional-tail-call pair) are set-once:
/// a second write is reported as a duplicate and ignored. The indirect
/// call-profile list accumulates, since one site can observe many targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    /// Byte offset within the function's input address space.
    pub offset: u64,
    /// Shape of the instruction.
    pub kind: InstrKind,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    ctc_taken: Option<u64>,
    #[serde(default)]
    ctc_mispredicted: Option<u64>,
    #[serde(default)]
    call_profile: Vec<CallTarget>,
}

impl Instruction {
    /// Create an unannotated instruction.
    pub fn new(offset: u64, kind: InstrKind) -> Self {
        Self {
            offset,
            kind,
            count: None,
            ctc_taken: None,
            ctc_mispredicted: None,
            call_profile: Vec::new(),
        }
    }

    /// Set the direct-call execution count. Returns `false` if the slot was
    /// already set (the write is dropped).
    pub fn set_count(&mut self, count: u64) -> bool {
        if self.count.is_some() {
            return false;
        }
        self.count = Some(count);
        true
    }

    /// Direct-call execution count, if annotated.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Set the conditional-tail-call taken count. Set-once.
    pub fn set_ctc_taken(&mut self, count: u64) -> bool {
        if self.ctc_taken.is_some() {
            return false;
        }
        self.ctc_taken = Some(count);
        true
    }

    /// Conditional-tail-call taken count, if annotated.
    pub fn ctc_taken(&self) -> Option<u64> {
        self.ctc_taken
    }

    /// Set the conditional-tail-call mispredict count. Set-once.
    pub fn set_ctc_mispredicted(&mut self, count: u64) -> bool {
        if self.ctc_mispredicted.is_some() {
            return false;
        }
        self.ctc_mispredicted = Some(count);
        true
    }

    /// Conditional-tail-call mispredict count, if annotated.
    pub fn ctc_mispredicted(&self) -> Option<u64> {
        self.ctc_mispredicted
    }

    /// Append an observed callee to the indirect call profile.
    pub fn add_call_target(&mut self, target: CallTarget) {
        self.call_profile.push(target);
    }

    /// Observed callees of this site, in profile order.
    pub fn call_profile(&self) -> &[CallTarget] {
        &self.call_profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_annotations_are_set_once() {
        let mut instr = Instruction::new(4, InstrKind::Call);
        assert!(instr.set_count(10));
        assert!(!instr.set_count(99));
        assert_eq!(instr.count(), Some(10));

        let mut ctc = Instruction::new(8, InstrKind::CondTailCall);
        assert!(ctc.set_ctc_taken(5));
        assert!(ctc.set_ctc_mispredicted(1));
        assert!(!ctc.set_ctc_taken(7));
        assert_eq!(ctc.ctc_taken(), Some(5));
        assert_eq!(ctc.ctc_mispredicted(), Some(1));
    }

    #[test]
    fn test_call_profile_accumulates() {
        let mut instr = Instruction::new(0, InstrKind::IndirectCall);
        instr.add_call_target(CallTarget {
            symbol: Some("a".into()),
            count: 3,
            mispredicted: 0,
        });
        instr.add_call_target(CallTarget {
            symbol: None,
            count: 2,
            mispredicted: 1,
        });
        assert_eq!(instr.call_profile().len(), 2);
        assert_eq!(instr.call_profile()[1].count, 2);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(InstrKind::Call.is_call());
        assert!(InstrKind::CondTailCall.is_call());
        assert!(!InstrKind::IndirectBranch.is_call());
        assert!(InstrKind::IndirectBranch.is_indirect());
        assert!(InstrKind::Pseudo.is_pseudo());
        assert!(!InstrKind::Branch.is_call());
    }
}
