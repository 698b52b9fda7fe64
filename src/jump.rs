//! Jump tables: the compiled layout of one switch/case branch site.

use std::collections::HashMap;
use std::rc::Weak;

use crate::error::MachineError;
use crate::ids::StepId;
use crate::machine::MachineInner;
use crate::value::CaseKey;

/// One compiled block of a branch site: the case values that select it and
/// the number of step ids its body occupies.
#[derive(Debug, Clone)]
pub struct CaseBlock {
    pub keys: Vec<CaseKey>,
    pub len: u32,
}

impl CaseBlock {
    pub fn new<K: Into<CaseKey>>(keys: impl IntoIterator<Item = K>, len: u32) -> Self {
        CaseBlock {
            keys: keys.into_iter().map(Into::into).collect(),
            len,
        }
    }
}

/// Case-value to entry-step mapping for a single branch site.
///
/// Immutable once built; owned and cached by the machine for its lifetime,
/// holding only a non-owning back-reference to issue transfers.
pub struct JumpTable<C: 'static> {
    site: StepId,
    step_ids: HashMap<CaseKey, StepId>,
    beyond: StepId,
    machine: Weak<MachineInner<C>>,
}

impl<C: 'static> JumpTable<C> {
    /// Pack the blocks sequentially after the site id.
    ///
    /// The cursor starts at site + 1; each block maps its case keys to the
    /// cursor, then advances it by 1 + len, the extra id reserving the
    /// block's convergence landing. The final cursor is the shared
    /// `beyond` id every block converges to.
    pub(crate) fn build(
        machine: Weak<MachineInner<C>>,
        site: StepId,
        blocks: &[CaseBlock],
    ) -> Self {
        let mut step_ids = HashMap::new();
        let mut cursor = site.raw() + 1;
        for block in blocks {
            for key in &block.keys {
                step_ids.insert(key.clone(), StepId::from_raw(cursor));
            }
            cursor += 1 + block.len;
        }
        JumpTable {
            site,
            step_ids,
            beyond: StepId::from_raw(cursor),
            machine,
        }
    }

    pub fn site(&self) -> StepId {
        self.site
    }

    /// The convergence step reached after any block finishes normally.
    pub fn beyond(&self) -> StepId {
        self.beyond
    }

    /// Entry step for a case value, if any block handles it.
    pub fn step_id(&self, value: &CaseKey) -> Option<StepId> {
        self.step_ids.get(value).copied()
    }

    /// Transfer to the block selected by `value`.
    ///
    /// Pushes `beyond` onto the phi stack first, so whichever block is
    /// entered converges after it finishes. An unmapped value is a
    /// compiler-contract violation; the machine is left untouched.
    pub fn jump_to_case(&self, value: impl Into<CaseKey>) -> Result<(), MachineError> {
        let value = value.into();
        let step = self
            .step_ids
            .get(&value)
            .copied()
            .ok_or_else(|| MachineError::unhandled_case(self.site, value.clone()))?;
        let inner = self
            .machine
            .upgrade()
            .ok_or_else(|| MachineError::internal("jump table outlived its machine"))?;
        inner.push_phi(self.beyond);
        inner.go_to(step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_detached(site: u32, blocks: &[CaseBlock]) -> JumpTable<()> {
        JumpTable::build(Weak::new(), StepId::from_raw(site), blocks)
    }

    #[test]
    fn test_layout_packs_blocks_after_site() {
        let table = build_detached(
            10,
            &[
                CaseBlock::new([1i64, 2], 5),
                CaseBlock::new([3i64], 7),
            ],
        );

        assert_eq!(table.step_id(&CaseKey::Int(1)), Some(StepId::from_raw(11)));
        assert_eq!(table.step_id(&CaseKey::Int(2)), Some(StepId::from_raw(11)));
        assert_eq!(table.step_id(&CaseKey::Int(3)), Some(StepId::from_raw(17)));
        assert_eq!(table.beyond(), StepId::from_raw(25));
        assert_eq!(table.site(), StepId::from_raw(10));
    }

    #[test]
    fn test_empty_block_still_reserves_landing_id() {
        let table = build_detached(1, &[CaseBlock::new([0i64], 0), CaseBlock::new([1i64], 0)]);
        assert_eq!(table.step_id(&CaseKey::Int(0)), Some(StepId::from_raw(2)));
        assert_eq!(table.step_id(&CaseKey::Int(1)), Some(StepId::from_raw(3)));
        assert_eq!(table.beyond(), StepId::from_raw(4));
    }

    #[test]
    fn test_unmapped_value_is_unhandled_case() {
        let table = build_detached(10, &[CaseBlock::new([1i64], 2)]);
        let err = table.jump_to_case(9i64).unwrap_err();
        assert_eq!(
            err,
            MachineError::unhandled_case(StepId::from_raw(10), CaseKey::Int(9))
        );
    }

    #[test]
    fn test_string_case_keys() {
        let table = build_detached(4, &[CaseBlock::new(["alpha", "beta"], 3)]);
        assert_eq!(
            table.step_id(&CaseKey::from("beta")),
            Some(StepId::from_raw(5))
        );
    }
}
