//! Steering: routes ops to their logical partition.

use crate::codegen::{Assign, CodeGen, TernaryLayout};
use crate::level::{BitmapWindow, LevelCtx, Stage};
use crate::program::GenerateError;

/// Steering level.
///
/// With `N` logical partitions of a width-`W` tree, the top `log_W(num_lps)` bitmap levels only ever select the
/// partition, so they are replaced by a single stage that addresses the next level with the partition id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steering {
    depth: usize,
}

impl Steering {
    /// Creates new steering level replacing bitmap levels `1..=depth`.
    pub fn new(depth: usize) -> Self { Self { depth } }

    /// Deepest bitmap level subsumed by this level.
    pub fn depth(&self) -> usize { self.depth }
}

impl Stage for Steering {
    fn name(&self) -> String { "steering".to_string() }

    fn latency(&self) -> usize { 0 }

    fn declare_stage_state(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        let is_leaf = ctx.is_leaf()?;
        let window = BitmapWindow::new(ctx.next()?.name(), cycle);

        cg.comment(format!("Stage {} metadata", cycle));
        if is_leaf {
            cg.align_defs(&[("heap_priority_t", format!("priority_s{};", cycle))]);
        }
        for wire in window.wires() {
            cg.align_defs(&[("logic", format!("{};", wire))]);
        }
        if is_leaf {
            cg.align_defs(&[("counter_t", format!("reg_{}_counter_s{};", self.name(), cycle))]);
        }
        for reg in window.regs() {
            cg.align_defs(&[("logic", format!("{};", reg))]);
        }
        if is_leaf {
            cg.align_defs(&[
                ("counter_t", format!("reg_old_{}_counter_s{};", self.name(), cycle)),
                ("logic", format!("reg_{}_counter_non_zero_s{};", self.name(), cycle)),
            ]);
        }
        cg.newline();
        Ok(())
    }

    fn default_assigns(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        // As the leaf, the priority is the logical partition id.
        if ctx.is_leaf()? {
            cg.emit(format!("priority_s{} = reg_priority_s[{}];", cycle, cycle - 1));
        }
        Ok(())
    }

    fn normal_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.end_cycle() - 1;
        let next = ctx.next()?;
        let next_name = next.name();
        let is_leaf = next.is_priority_bucket();

        cg.block_comment(format!("Stage {}: Steer op to the appropriate logical BBQ.", seq + 1));

        if is_leaf {
            cg.comment("Read PB contents");
            cg.emit(format!("pb_rden = reg_valid_s[{}];", seq));
            cg.newline();
        } else if next.as_bitmap().map_or(false, |bitmap| bitmap.sram_bitmap()) {
            cg.comment(format!("Read L{} bitmap", self.depth + 1));
            cg.emit(format!("bm_{}_rden = reg_valid_s[{}];", next_name, seq));
            cg.emit(format!("bm_{}_rdaddress = reg_bbq_id_s[{}];", next_name, seq));
            cg.newline();
        }

        cg.comment("Compute conflicts");
        let window = BitmapWindow::new(next_name, seq + 1);
        for (offset, wire) in window.wires().iter().enumerate().map(|(i, w)| (i + 1, w)) {
            cg.align_assignment(
                wire,
                vec![
                    "(".to_string(),
                    format!("reg_valid_s[{}] && reg_valid_s[{}] &&", seq, seq + offset),
                    format!("(reg_bbq_id_s[{}] == reg_bbq_id_s[{}]));", seq, seq + offset),
                ],
                Assign::Blocking,
                true,
            );
            cg.newline();
        }

        if is_leaf {
            cg.comment("Disable conflicting reads during writes");
            cg.start_if(format!("pb_addr_conflict_s{}_s{}", next.end_cycle(), seq + 1));
            cg.emit(["pb_rdwr_conflict = 1;", "pb_rden = 0;"]);
            cg.end_if()?;
        }
        Ok(())
    }

    fn commit_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        let next = ctx.next()?;
        let next_name = next.name();
        let is_leaf = next.is_priority_bucket();

        cg.block_comment(format!("Stage {}: Steer op to the appropriate logical BBQ.", cycle));
        ctx.primary_signals(cycle).emit(cg);

        if !is_leaf {
            cg.emit(format!("reg_{}_addr_s[{}] <= reg_bbq_id_s[{}];", next_name, cycle, cycle - 1));
            cg.newline();
        }
        cg.emit(BitmapWindow::new(next_name.clone(), cycle).register());
        cg.newline();

        if is_leaf {
            cg.comment([
                "With a steering level that replaces the leaf-level".to_string(),
                "bitmaps, we can effectively substitute StOC values".to_string(),
                format!("(used in Stage {}) with logical occupancy counters.", cycle + 1),
            ]);
            cg.emit([
                format!("reg_{}_counter_s{} <= reg_new_occupancy_s{};", self.name(), cycle, cycle - 1),
                format!("reg_old_{}_counter_s{} <= reg_old_occupancy_s{};", self.name(), cycle, cycle - 1),
            ]);
            cg.align_assignment(
                &format!("reg_{}_counter_non_zero_s{}", self.name(), cycle),
                vec![
                    format!("(reg_is_enque_s[{}] |", cycle - 1),
                    format!("reg_new_occupancy_s{}[WATERLEVEL_IDX]);", cycle - 1),
                ],
                Assign::NonBlocking,
                false,
            );
            cg.newline();
        } else if next.as_bitmap().map_or(false, |bitmap| !bitmap.sram_bitmap()) {
            cg.comment(format!("Forward L{} bitmap updates", self.depth + 1));
            cg.align_ternary(
                &format!("reg_{}_bitmap_s[{}]", next_name, cycle),
                &[format!("{}_addr_conflict_s{}_s{}", next_name, next.end_cycle(), cycle)],
                vec![
                    format!("{}_bitmap_s{}", next_name, next.end_cycle()).into(),
                    format!("{}_bitmaps[reg_bbq_id_s[{}]]", next_name, cycle - 1).into(),
                ],
                Assign::NonBlocking,
                TernaryLayout::BROKEN_SAME_LINE,
            )?;
            cg.newline();
        }

        let target = if is_leaf { "PB".to_string() } else { format!("L{} bitmap", self.depth + 1) };
        cg.start_ifdef("DEBUG");
        cg.start_if(format!("reg_valid_s[{}]", cycle - 1));
        cg.emit("$display(");
        cg.emit_offset(
            [
                format!("\"[BBQ] At S{} (logical ID: %0d, op: %s),\",", cycle),
                format!("reg_bbq_id_s[{0}], reg_op_type_s[{0}].name,", cycle - 1),
                format!("\" steering op to the corresponding {}\");", target),
            ],
            4,
        );
        cg.end_if()?;
        cg.end_ifdef()?;
        Ok(())
    }
}
