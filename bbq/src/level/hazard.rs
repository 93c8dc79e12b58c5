//! Address-conflict windows.
//!
//! An op at stage `s` may race with the ops `1..=N` stages ahead of it on the same address of the next level. A
//! window names the `N` one-bit flags `<target>_addr_conflict_s{s+k}_s{s}` that record those races, and their
//! registered copies.

use static_assertions::const_assert;

/// Window of a bitmap (or steering) level: a bitmap level spans at most four stages.
pub const BITMAP_CONFLICT_WINDOW: usize = 4;

/// Window of the priority-bucket read stages.
pub const PB_CONFLICT_WINDOW: usize = 2;

const_assert!(PB_CONFLICT_WINDOW < BITMAP_CONFLICT_WINDOW);

/// Conflict flags for the level named `target`, computed at `stage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictWindow<const N: usize> {
    target: String,
    stage: usize,
}

/// Window computed by bitmap and steering levels for the next level.
pub type BitmapWindow = ConflictWindow<BITMAP_CONFLICT_WINDOW>;

/// Window carried through the priority-bucket stages.
pub type PbWindow = ConflictWindow<PB_CONFLICT_WINDOW>;

impl<const N: usize> ConflictWindow<N> {
    /// Creates new window.
    pub fn new(target: impl Into<String>, stage: usize) -> Self { Self { target: target.into(), stage } }

    /// The stage the flags belong to.
    pub fn stage(&self) -> usize { self.stage }

    /// The same flags one stage later.
    pub fn advance(&self) -> Self { Self { target: self.target.clone(), stage: self.stage + 1 } }

    /// Flag for the op `offset` stages ahead.
    pub fn wire(&self, offset: usize) -> String {
        format!("{}_addr_conflict_s{}_s{}", self.target, self.stage + offset, self.stage)
    }

    /// Registered flag for the op `offset` stages ahead.
    pub fn reg(&self, offset: usize) -> String { format!("reg_{}", self.wire(offset)) }

    /// All flags, nearest op first.
    pub fn wires(&self) -> [String; N] { std::array::from_fn(|i| self.wire(i + 1)) }

    /// All registered flags, nearest op first.
    pub fn regs(&self) -> [String; N] { std::array::from_fn(|i| self.reg(i + 1)) }

    /// `reg_<flag> <= <flag>;` for every flag.
    pub fn register(&self) -> [String; N] { std::array::from_fn(|i| format!("{} <= {};", self.reg(i + 1), self.wire(i + 1))) }

    /// Carries `prev`'s registered flags one stage forward into this window's registers.
    pub fn shift_from(&self, prev: &Self) -> [String; N] {
        std::array::from_fn(|i| format!("{} <= {};", self.reg(i + 1), prev.reg(i + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        let window = BitmapWindow::new("l2", 3);
        assert_eq!(window.wires()[0], "l2_addr_conflict_s4_s3");
        assert_eq!(window.regs()[3], "reg_l2_addr_conflict_s7_s3");
        assert_eq!(window.register()[1], "reg_l2_addr_conflict_s5_s3 <= l2_addr_conflict_s5_s3;");
    }

    #[test]
    fn shift() {
        let prev = PbWindow::new("pb", 4);
        let window = prev.advance();
        assert_eq!(
            window.shift_from(&prev),
            [
                "reg_pb_addr_conflict_s6_s5 <= reg_pb_addr_conflict_s5_s4;".to_string(),
                "reg_pb_addr_conflict_s7_s5 <= reg_pb_addr_conflict_s6_s4;".to_string(),
            ]
        );
    }
}
