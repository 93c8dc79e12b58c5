//! Priority buckets: one doubly-linked list of heap entries per priority.
//!
//! Stages, starting at the level's first cycle:
//!
//! 1. op colour (BLUE dequeues from the head, RED from the tail) and read delay for the bucket;
//! 2. read of the bucket and of the next/previous pointers of the entry to dequeue;
//! 3. read delay for the heap entry and pointers;
//! 4. commit of the bucket, free list, heap entry and pointers;
//! 5. spillover, keeping the committed bucket for one more cycle of forwarding.

use crate::codegen::{Assign, CodeGen};
use crate::level::{LevelCtx, PbWindow, Stage};
use crate::program::GenerateError;

/// Priority-bucket level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBucket;

impl PriorityBucket {
    /// Creates new priority-bucket level.
    pub fn new() -> Self { Self }

    /// Shifts the per-level address and bitmap registers, with the op colour in between if `color` is set.
    fn shift_levels(ctx: &LevelCtx<'_>, cg: &mut CodeGen, cycle: usize, color: bool) {
        ctx.shift_per_level(cg, "addr", cycle, |_| true);
        if color {
            cg.emit(format!("reg_op_color_s[{}] <= reg_op_color_s[{}];", cycle, cycle - 1));
        }
        ctx.shift_per_level(cg, "bitmap", cycle, |_| true);
    }

    fn shift_flags(cg: &mut CodeGen, cycle: usize) {
        cg.emit(
            ["reg_pb_data_conflict_s", "reg_pb_state_changes_s", "reg_pb_tail_pp_changes_s"]
                .map(|flag| format!("{0}{1} <= {0}{2};", flag, cycle, cycle - 1)),
        );
    }

    fn commit_comment(cycle: usize) -> [String; 2] {
        [
            format!("Stage {}: Perform writes: update the priority bucket,", cycle),
            "the free list, heap entries, next and prev pointers.".to_string(),
        ]
    }

    fn read_comment(cycle: usize) -> [String; 2] {
        [
            format!("Stage {}: Read the heap entry and prev/next pointer", cycle),
            "corresponding to the priority bucket to deque.".to_string(),
        ]
    }

    fn emit_display(cg: &mut CodeGen, cycle: usize, lines: Vec<String>) -> Result<(), GenerateError> {
        cg.start_ifdef("DEBUG");
        cg.start_if(format!("reg_valid_s[{}]", cycle - 1));
        cg.emit("$display(");
        cg.emit_offset(lines, 4);
        cg.end_if()?;
        cg.end_ifdef()?;
        cg.newline();
        Ok(())
    }

    fn for_pb(ctx: &LevelCtx<'_>, cycle: usize) -> Vec<String> {
        let tags = ctx.lp_tags(cycle);
        vec![
            format!("\"[BBQ] At S{} ({}op: %s)\",", cycle, tags.id_str),
            format!("{}reg_op_type_s[{}].name,", tags.id_val, cycle - 1),
            format!("\" for PB ({}priority = %0d)\",", tags.priority_str),
        ]
    }

    fn emit_spillover_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) {
        let cycle = ctx.end_cycle() + 1;
        cg.block_comment(format!("Stage {}: Spillover stage.", cycle));
        ctx.primary_signals(cycle).emit(cg);
        cg.emit(format!("reg_pb_data_s{} <= reg_pb_data_s{};", cycle, cycle - 1));
        Self::shift_levels(ctx, cg, cycle, true);
        cg.newline();
    }

    fn emit_commit_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.end_cycle();
        cg.block_comment(Self::commit_comment(cycle));
        ctx.primary_signals(cycle).with("reg_he_data_s", format!("he_data_s{}", cycle)).emit(cg);
        cg.emit([
            format!("reg_he_data_s{} <= he_data;", cycle),
            format!("reg_np_data_s{} <= np_data;", cycle),
            format!("reg_pp_data_s{} <= pp_data;", cycle),
            format!("reg_pb_data_s{} <= int_pb_data;", cycle),
        ]);
        Self::shift_levels(ctx, cg, cycle, true);
        cg.newline();

        let tags = ctx.lp_tags(cycle);
        let seq = cycle - 1;
        let header = |transition: &str| {
            vec![
                format!("\"[BBQ] At S{} ({}op: %s, color: %s),\",", cycle, tags.id_str),
                format!("{0}reg_op_type_s[{1}].name, reg_op_color_s[{1}].name,", tags.id_val, seq),
                format!("\" updating ({}priority = %0d),\",", tags.priority_str),
                format!("reg_priority_s[{}]{},", seq, tags.priority_val),
                "\" pb (head, tail) changes from \",".to_string(),
                transition.to_string(),
            ]
        };

        cg.start_ifdef("DEBUG");
        cg.start_if(format!("reg_valid_s[{}]", seq));
        cg.start_if(format!("!reg_pb_state_changes_s{}", seq));
        cg.emit("$display(");
        let mut lines = header(&format!("\"(%b, %b) to (%b, %b)\", reg_pb_q_s{}.head,", seq));
        lines.push(format!("reg_pb_q_s{}.tail, int_pb_data.head, int_pb_data.tail);", seq));
        cg.emit_offset(lines, 4);
        cg.end_if()?;

        cg.start_else_if(format!("reg_is_enque_s[{}]", seq));
        cg.emit("$display(");
        let mut lines = header("\"(INVALID_PTR, INVALID_PTR) to (%b, %b)\",");
        lines.push("int_pb_data.head, int_pb_data.tail);".to_string());
        cg.emit_offset(lines, 4);
        cg.end_else_if()?;

        cg.start_else();
        cg.emit("$display(");
        let mut lines = header("\"(%b, %b) to (INVALID_PTR, INVALID_PTR)\",");
        lines.push(format!("reg_pb_q_s{0}.head, reg_pb_q_s{0}.tail);", seq));
        cg.emit_offset(lines, 4);
        cg.end_else()?;
        cg.end_if()?;
        cg.end_ifdef()?;
        cg.newline();
        Ok(())
    }

    fn emit_read_delay_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.end_cycle() - 1;
        let fl_rd_delay = ctx.pipeline().fl_rd_delay();

        cg.block_comment(format!("Stage {}: Read delay for HE and pointers.", cycle));
        ctx.primary_signals(cycle).emit(cg);
        Self::shift_levels(ctx, cg, cycle, true);
        Self::shift_flags(cg, cycle);
        cg.emit([
            String::new(),
            format!("reg_he_q_s{0} <= he_q_s{0};", cycle),
            format!("reg_np_q_s{0} <= np_q_s{0};", cycle),
            format!("reg_pp_q_s{0} <= pp_q_s{0};", cycle),
        ]);
        cg.newline();

        for target in ["reg_pb_q_s", "reg_pb_new_s"] {
            cg.align_assignment(
                &format!("{}{}", target, cycle),
                vec![
                    "(".to_string(),
                    format!("reg_pb_addr_conflict_s{}_s{} ?", cycle, cycle - 1),
                    format!("   int_pb_data : reg_pb_q_s{});", cycle - 1),
                ],
                Assign::NonBlocking,
                true,
            );
            cg.newline();
        }

        cg.start_if(format!("reg_is_enque_s[{}]", cycle - 1));
        cg.comment("PB becomes non-empty, update tail");
        cg.start_if(format!("reg_pb_state_changes_s{}", cycle - 1));
        cg.emit(format!("reg_pb_new_s{}.tail <= fl_q_r[{}];", cycle, fl_rd_delay - 2));
        cg.end_if()?;
        cg.emit(format!("reg_pb_new_s{}.head <= fl_q_r[{}];", cycle, fl_rd_delay - 2));
        cg.end_if()?;
        cg.newline();

        cg.start_ifdef("SIM");
        cg.start_if(format!("reg_valid_s[{}]", cycle - 1));
        cg.start_if([
            "(he_wren && he_rden_r && (he_wraddress == he_rdaddress_r)) ||",
            "(np_wren && np_rden_r && (np_wraddress == np_rdaddress_r))",
        ]);
        cg.emit(["$display(\"[BBQ] Error: Unexpected conflict in R/W access\");", "$finish;"]);
        cg.end_if()?;
        cg.end_if()?;
        cg.end_ifdef()?;

        let mut lines = Self::for_pb(ctx, cycle);
        lines.push(format!("reg_priority_s[{}]{});", cycle - 1, ctx.lp_tags(cycle).priority_val));
        Self::emit_display(cg, cycle, lines)
    }

    fn emit_read_data_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle() + 1;
        let fl_rd_delay = ctx.pipeline().fl_rd_delay();

        cg.block_comment(Self::read_comment(cycle));
        ctx.primary_signals(cycle).emit(cg);
        cg.emit(format!("reg_pb_q_s{} <= int_pb_q;", cycle));
        Self::shift_levels(ctx, cg, cycle, true);
        Self::shift_flags(cg, cycle);
        cg.emit(PbWindow::new("pb", cycle).shift_from(&PbWindow::new("pb", cycle - 1)));
        cg.newline();

        cg.emit([
            format!(
                "reg_pp_data_s{0} <= pp_changes_s{1}_s{0} ? fl_q_r[{2}] : fl_q_r[{3}];",
                cycle,
                cycle + 1,
                fl_rd_delay - 3,
                fl_rd_delay - 2
            ),
            format!("reg_pp_data_valid_s{0} <= (pp_changes_s{1}_s{0} || pp_changes_s{2}_s{0});", cycle, cycle + 1, cycle + 2),
        ]);
        cg.newline();

        let mut lines = Self::for_pb(ctx, cycle);
        lines.push(format!("reg_priority_s[{}]{});", cycle - 1, ctx.lp_tags(cycle).priority_val));
        Self::emit_display(cg, cycle, lines)
    }

    fn emit_color_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        let prev = ctx.prev()?.name();

        cg.block_comment(format!("Stage {}: Compute op color, read delay for PB.", cycle));
        ctx.primary_signals(cycle).emit(cg);
        cg.emit(format!("reg_op_color_s[{0}] <= op_color_s{0};", cycle));
        Self::shift_levels(ctx, cg, cycle, false);
        cg.emit(format!("reg_pb_update_s{} <= reg_pb_addr_conflict_s{}_s{};", cycle, cycle + 2, cycle - 1));
        cg.emit(PbWindow::new("pb", cycle).shift_from(&PbWindow::new("pb", cycle - 1)));
        cg.newline();

        cg.comment([
            "Determine if this op is going to result in PB data",
            "conflict (dequeing a PB immediately after an enque",
            "operation that causes it to become non-empty).",
        ]);
        cg.align_assignment(
            &format!("reg_pb_data_conflict_s{}", cycle),
            vec![
                format!("(reg_is_enque_s[{}] &&", cycle),
                format!("!reg_{0}_counter_non_zero_s{1} && reg_pb_addr_conflict_s{2}_s{1});", prev, cycle - 1, cycle),
            ],
            Assign::NonBlocking,
            true,
        );
        cg.newline();

        cg.comment([
            "Determine if this op causes the PB state to change.",
            "Change of state is defined differently based on op:",
            "for enques, corresponds to a PB becoming non-empty,",
            "and for deques, corresponds to a PB becoming empty.",
        ]);
        cg.align_assignment(
            &format!("reg_pb_state_changes_s{}", cycle),
            vec![
                format!("(reg_is_enque_s[{}] ?", cycle - 1),
                format!("(!reg_{0}_counter_s{1}[WATERLEVEL_IDX] && reg_{0}_counter_s{1}[0]) :", prev, cycle - 1),
                format!("(!reg_{0}_counter_s{1}[WATERLEVEL_IDX] && !reg_{0}_counter_s{1}[0]));", prev, cycle - 1),
            ],
            Assign::NonBlocking,
            true,
        );
        cg.newline();

        cg.comment([
            "Determine if this op causes the previous pointer",
            "corresponding to the PB tail to change. High iff",
            "enqueing into a PB containing a single element.",
        ]);
        cg.align_assignment(
            &format!("reg_pb_tail_pp_changes_s{}", cycle),
            vec![
                format!("(reg_is_enque_s[{}] &&", cycle - 1),
                format!("!reg_old_{}_counter_s{}[WATERLEVEL_IDX]", prev, cycle - 1),
                format!("&& reg_old_{}_counter_s{}[0]);", prev, cycle - 1),
            ],
            Assign::NonBlocking,
            true,
        );
        cg.newline();

        let mut lines = Self::for_pb(ctx, cycle);
        lines.push(format!("reg_priority_s[{}]{},", cycle - 1, ctx.lp_tags(cycle).priority_val));
        lines.push(format!("\" assigned color %s\", op_color_s{}.name);", cycle));
        Self::emit_display(cg, cycle, lines)
    }

    fn emit_commit_comb(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.end_cycle() - 1;
        cg.block_comment(Self::commit_comment(seq + 1));
        cg.emit(format!("pb_wren = reg_valid_s[{}];", seq));
        cg.newline();

        cg.comment("Perform enque");
        cg.start_if(format!("reg_is_enque_s[{}]", seq));
        cg.start_if(format!("reg_valid_s[{}]", seq));
        cg.emit(["he_wren = 1; // Update the heap entry", "np_wren = 1; // Update the next pointer"]);
        cg.newline();
        cg.comment([
            "Update the entry's previous pointer. The",
            "pointer address is only valid if the PB",
            "was not previously empty, so write must",
            "be predicated on no change of state.",
        ]);
        cg.start_if(format!("!reg_pb_state_changes_s{}", seq));
        cg.emit("pp_wren = 1;");
        cg.end_if()?;
        cg.end_if()?;
        cg.newline();
        cg.comment("Update the data");
        cg.emit(format!("he_data_s{} = reg_he_data_s[{}];", seq + 1, seq));
        cg.end_if()?;

        cg.comment("Perform deque");
        cg.start_else();
        cg.start_if(format!("reg_op_color_s[{}] == OP_COLOR_BLUE", seq));
        cg.comment("BLUE-colored dequeue (from HEAD)");
        cg.emit(format!("int_pb_data.head = reg_np_q_s{};", seq));
        cg.end_if()?;
        cg.start_else();
        cg.comment("RED-colored dequeue (from TAIL)");
        cg.emit(format!("int_pb_data.tail = reg_pp_q_s{};", seq));
        cg.end_else()?;
        cg.newline();
        cg.comment("Update the data");
        cg.align_assignment(
            &format!("he_data_s{}", seq + 1),
            vec![
                "(".to_string(),
                format!("reg_pb_data_conflict_s{} ?", seq),
                format!("reg_he_data_s[{}] : reg_he_q_s{});", seq + 1, seq),
            ],
            Assign::Blocking,
            true,
        );
        cg.end_else()?;
        Ok(())
    }

    fn emit_read_delay_comb(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.end_cycle() - 2;
        cg.block_comment(format!("Stage {}: Read delay for HE and pointers.", seq + 1));

        for (mem, data) in [("he", "HE"), ("np", "NP")] {
            cg.comment(format!("This {} was updated on the last cycle, so the output is stale", data));
            cg.start_if(format!("{0}_wren_r && ({0}_wraddress_r == {0}_rdaddress_r)", mem));
            cg.emit(format!("{0}_q_s{1} = reg_{0}_data_s{2};", mem, seq + 1, seq + 2));
            cg.end_if()?;
            cg.comment(format!("Fallthrough: default to {}_q", mem));
            cg.newline();
        }

        cg.comment("This PP was updated in the last 2 cycles");
        cg.start_if(format!("reg_pp_data_valid_s{}", seq));
        cg.emit(format!("pp_q_s{} = reg_pp_data_s{};", seq + 1, seq));
        cg.end_if()?;
        cg.comment("Fallthrough: default to pp_q");
        cg.newline();
        Ok(())
    }

    fn emit_read_data_comb(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.start_cycle();
        cg.block_comment(Self::read_comment(seq + 1));

        cg.comment("The PB is being updated on this cycle");
        cg.start_if(format!("reg_pb_addr_conflict_s{}_s{}", seq + 2, seq));
        cg.emit("int_pb_q = int_pb_data;");
        cg.end_if()?;
        cg.comment("The PB was updated last cycle, so output is stale");
        cg.start_else_if(format!("reg_pb_update_s{}", seq));
        cg.emit(format!("int_pb_q = reg_pb_data_s{};", seq + 3));
        cg.end_else_if()?;
        cg.comment("The PB was updated 2 cycles ago (and thus never read)");
        cg.start_else_if("reg_pb_rdwr_conflict_r2");
        cg.emit(format!("int_pb_q = reg_pb_data_s{};", seq + 4));
        cg.end_else_if()?;
        cg.comment("Fallthrough: default to pb_q_r");
        cg.newline();

        cg.comment("Read next and prev pointers");
        cg.emit(["np_rdaddress = int_pb_q.head;", "pp_rdaddress = int_pb_q.tail;"]);
        cg.newline();

        cg.comment("Compute tail PP updates");
        for ahead in 1..=2 {
            cg.align_assignment(
                &format!("pp_changes_s{}_s{}", seq + 1 + ahead, seq + 1),
                vec![
                    format!("(reg_pb_tail_pp_changes_s{} &&", seq + ahead),
                    format!("reg_pb_addr_conflict_s{}_s{});", seq + ahead, seq),
                ],
                Assign::Blocking,
                false,
            );
            cg.newline();
        }

        cg.comment("Read HE data");
        cg.align_assignment(
            "he_rdaddress",
            vec![
                "(".to_string(),
                format!("(reg_op_color_s[{}] == OP_COLOR_BLUE) ?", seq),
                "int_pb_q.head : int_pb_q.tail);".to_string(),
            ],
            Assign::Blocking,
            true,
        );
        cg.newline();

        cg.start_if(format!("reg_valid_s[{}]", seq));
        cg.start_if(format!("!reg_is_enque_s[{}]", seq));
        cg.emit("he_rden = 1; // Dequeing, read HE and PP/NP");
        cg.start_if(format!("reg_op_color_s[{}] == OP_COLOR_BLUE", seq));
        cg.emit("np_rden = 1; // BLUE-colored dequeue (from HEAD)");
        cg.end_if()?;
        cg.start_else();
        cg.emit("pp_rden = 1; // RED-colored dequeue (from TAIL)");
        cg.end_else()?;
        cg.end_if()?;
        cg.end_if()?;
        Ok(())
    }

    fn emit_color_comb(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.start_cycle() - 1;
        cg.block_comment(format!("Stage {}: Compute op color, read delay for PB.", seq + 1));
        cg.start_if(format!("!reg_is_enque_s[{}]", seq));
        cg.comment("Dequeing, recolor this op if required");
        cg.start_if(format!("reg_pb_addr_conflict_s{}_s{}", seq + 1, seq));
        cg.align_assignment(
            &format!("op_color_s{}", seq + 1),
            vec![
                "(".to_string(),
                format!("(reg_op_color_s[{}] == OP_COLOR_BLUE)", seq + 1),
                format!("{}? OP_COLOR_RED : OP_COLOR_BLUE);", CodeGen::tab(1)),
            ],
            Assign::Blocking,
            true,
        );
        cg.end_if()?;
        cg.end_if()?;
        Ok(())
    }
}

impl Stage for PriorityBucket {
    fn name(&self) -> String { "pb".to_string() }

    fn latency(&self) -> usize { 3 }

    fn declare_stage_state(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let mut cycle = ctx.start_cycle();
        let flags = |cycle: usize| {
            [
                ("logic", format!("reg_pb_data_conflict_s{};", cycle)),
                ("logic", format!("reg_pb_state_changes_s{};", cycle)),
                ("logic", format!("reg_pb_tail_pp_changes_s{};", cycle)),
            ]
        };
        let window = |cg: &mut CodeGen, cycle: usize| {
            for reg in PbWindow::new("pb", cycle).regs() {
                cg.align_defs(&[("logic", format!("{};", reg))]);
            }
        };

        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[("op_color_t", format!("op_color_s{};", cycle)), ("logic", format!("reg_pb_update_s{};", cycle))]);
        cg.align_defs(&flags(cycle));
        window(cg, cycle);
        cg.newline();
        cycle += 1;

        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[
            ("logic", format!("pp_changes_s{}_s{};", cycle + 1, cycle)),
            ("logic", format!("pp_changes_s{}_s{};", cycle + 2, cycle)),
            ("list_t", format!("reg_pb_q_s{};", cycle)),
            ("heap_entry_ptr_t", format!("reg_pp_data_s{};", cycle)),
            ("logic", format!("reg_pp_data_valid_s{};", cycle)),
        ]);
        cg.align_defs(&flags(cycle));
        window(cg, cycle);
        cg.newline();
        cycle += 1;

        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[
            ("heap_entry_data_t", format!("he_q_s{};", cycle)),
            ("heap_entry_ptr_t", format!("np_q_s{};", cycle)),
            ("heap_entry_ptr_t", format!("pp_q_s{};", cycle)),
            ("heap_entry_data_t", format!("reg_he_q_s{};", cycle)),
            ("heap_entry_ptr_t", format!("reg_np_q_s{};", cycle)),
            ("heap_entry_ptr_t", format!("reg_pp_q_s{};", cycle)),
            ("list_t", format!("reg_pb_q_s{};", cycle)),
            ("list_t", format!("reg_pb_new_s{};", cycle)),
        ]);
        cg.align_defs(&flags(cycle));
        cg.newline();
        cycle += 1;

        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[
            ("heap_entry_data_t", format!("he_data_s{};", cycle)),
            ("heap_entry_data_t", format!("reg_he_data_s{};", cycle)),
            ("heap_entry_ptr_t", format!("reg_np_data_s{};", cycle)),
            ("heap_entry_ptr_t", format!("reg_pp_data_s{};", cycle)),
            ("list_t", format!("reg_pb_data_s{};", cycle)),
        ]);
        cg.newline();
        cycle += 1;

        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[("list_t", format!("reg_pb_data_s{};", cycle))]);
        cg.newline();
        Ok(())
    }

    fn default_assigns(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        cg.emit(format!("op_color_s{} = reg_is_enque_s[{}] ? OP_COLOR_BLUE : OP_COLOR_RED;", cycle, cycle - 1));
        let cycle = cycle + 2;
        cg.emit(["he", "np", "pp"].map(|mem| format!("{0}_q_s{1} = {0}_q;", mem, cycle)));
        Ok(())
    }

    fn init_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.end_cycle() - 1;
        cg.block_comment(Self::commit_comment(seq + 1));
        cg.align_assignment(
            "fl_data",
            vec![
                "(".to_string(),
                format!("(reg_op_color_s[{}] == OP_COLOR_BLUE) ?", seq),
                format!("reg_pb_q_s{0}.head : reg_pb_q_s{0}.tail);", seq),
            ],
            Assign::Blocking,
            true,
        );
        cg.newline();

        cg.comment("Perform deque");
        cg.start_if(format!("!reg_is_enque_s[{}]", seq));
        cg.comment("Update the free list");
        cg.emit(format!("fl_wrreq = reg_valid_s[{}];", seq));
        cg.end_if()?;
        Ok(())
    }

    fn normal_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.emit_commit_comb(ctx, cg)?;
        self.emit_read_delay_comb(ctx, cg)?;
        self.emit_read_data_comb(ctx, cg)?;
        self.emit_color_comb(ctx, cg)
    }

    fn commit_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.emit_spillover_seq(ctx, cg);
        self.emit_commit_seq(ctx, cg)?;
        self.emit_read_delay_seq(ctx, cg)?;
        self.emit_read_data_seq(ctx, cg)?;
        self.emit_color_seq(ctx, cg)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::Config;
    use crate::level::{render_phase, Level};

    // One bitmap level: the PB spans stages 4 to 7 and the free-list read delay is 5.
    fn render(phase: crate::level::Phase) -> String { render_phase(Config::new(1), "pb", phase) }

    #[test]
    fn default_color_follows_op() {
        assert_eq!(
            render(Level::default_assigns),
            "\
op_color_s4 = reg_is_enque_s[3] ? OP_COLOR_BLUE : OP_COLOR_RED;
he_q_s6 = he_q;
np_q_s6 = np_q;
pp_q_s6 = pp_q;
"
        );
    }

    #[test]
    fn racing_dequeue_is_recolored() {
        let text = render(Level::normal_phase_logic);
        let expected = "\
/**
 * Stage 4: Compute op color, read delay for PB.
 */
if (!reg_is_enque_s[3]) begin
    // Dequeing, recolor this op if required
    if (reg_pb_addr_conflict_s4_s3) begin
        op_color_s4 = (
            (reg_op_color_s[4] == OP_COLOR_BLUE)
                ? OP_COLOR_RED : OP_COLOR_BLUE);
    end
end
";
        assert!(text.ends_with(expected), "{}", text);
    }

    #[test]
    fn bucket_read_forwards_in_flight_writes() {
        let text = render(Level::normal_phase_logic);
        let expected = "\
// The PB is being updated on this cycle
if (reg_pb_addr_conflict_s6_s4) begin
    int_pb_q = int_pb_data;
end
// The PB was updated last cycle, so output is stale
else if (reg_pb_update_s4) begin
    int_pb_q = reg_pb_data_s7;
end
// The PB was updated 2 cycles ago (and thus never read)
else if (reg_pb_rdwr_conflict_r2) begin
    int_pb_q = reg_pb_data_s8;
end
// Fallthrough: default to pb_q_r
";
        assert!(text.contains(expected), "{}", text);

        let pad = " ".repeat("pp_changes_s6_s5 = ".len() + 1);
        assert!(text.contains(&format!(
            "pp_changes_s6_s5 = (reg_pb_tail_pp_changes_s5 &&\n{}reg_pb_addr_conflict_s5_s4);\n",
            pad
        )));
        assert!(text.contains(&format!(
            "pp_changes_s7_s5 = (reg_pb_tail_pp_changes_s6 &&\n{}reg_pb_addr_conflict_s6_s4);\n",
            pad
        )));
    }

    #[test]
    fn dequeue_end_follows_color() {
        let text = render(Level::normal_phase_logic);
        let expected = "
    if (reg_op_color_s[6] == OP_COLOR_BLUE) begin
        // BLUE-colored dequeue (from HEAD)
        int_pb_data.head = reg_np_q_s6;
    end
    else begin
        // RED-colored dequeue (from TAIL)
        int_pb_data.tail = reg_pp_q_s6;
    end
";
        assert!(text.contains(expected), "{}", text);
        assert!(text.contains("he_rdaddress = (\n    (reg_op_color_s[4] == OP_COLOR_BLUE) ?\n    int_pb_q.head : int_pb_q.tail);\n"));
        assert!(text.contains("    he_data_s7 = (\n        reg_pb_data_conflict_s6 ?\n        reg_he_data_s[7] : reg_he_q_s6);\n"));

        let init = render(Level::init_phase_logic);
        assert!(init.contains("fl_data = (\n    (reg_op_color_s[6] == OP_COLOR_BLUE) ?\n    reg_pb_q_s6.head : reg_pb_q_s6.tail);\n"));
    }

    #[test]
    fn conflict_window_is_carried() {
        let text = render(Level::commit_logic);
        for line in [
            // Stage 4 takes over the window computed by L1 at stage 3.
            "reg_pb_update_s4 <= reg_pb_addr_conflict_s6_s3;",
            "reg_pb_addr_conflict_s5_s4 <= reg_pb_addr_conflict_s4_s3;",
            "reg_pb_addr_conflict_s6_s4 <= reg_pb_addr_conflict_s5_s3;",
            "reg_pb_addr_conflict_s6_s5 <= reg_pb_addr_conflict_s5_s4;",
            "reg_pb_addr_conflict_s7_s5 <= reg_pb_addr_conflict_s6_s4;",
            "reg_pp_data_s5 <= pp_changes_s6_s5 ? fl_q_r[2] : fl_q_r[3];",
            "reg_pp_data_valid_s5 <= (pp_changes_s6_s5 || pp_changes_s7_s5);",
            "reg_pb_new_s6.head <= fl_q_r[3];",
            "reg_pb_new_s6.tail <= fl_q_r[3];",
        ] {
            assert!(text.contains(line), "{}", line);
        }
        assert!(text.contains("reg_pb_q_s6 <= (\n    reg_pb_addr_conflict_s6_s5 ?\n       int_pb_data : reg_pb_q_s5);\n"));
        assert!(text.contains(
            "reg_pb_data_conflict_s4 <= (reg_is_enque_s[4] &&\n    !reg_l1_counter_non_zero_s3 && reg_pb_addr_conflict_s4_s3);\n"
        ));
    }

    #[test]
    fn steering_leaf_feeds_data_conflict() {
        let config = Config::new(2).with_bitmap_width(2).with_num_lps(4);
        let text = render_phase(config, "pb", Level::commit_logic);
        assert!(text.contains(
            "reg_pb_data_conflict_s3 <= (reg_is_enque_s[3] &&\n    !reg_steering_counter_non_zero_s2 && reg_pb_addr_conflict_s3_s2);\n"
        ));
        assert!(text.contains("reg_bbq_id_s[7] <= reg_bbq_id_s[6];"));
    }
}
