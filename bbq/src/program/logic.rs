//! Combinational and sequential blocks.

use itertools::Itertools;

use super::{GenerateError, Program};
use crate::codegen::Assign;
use crate::level::BitmapLevel;

/// Number of init-done conditions per line of the readiness check.
const DONE_CONDITIONS_PER_LINE: usize = 3;

impl Program<'_> {
    fn sram_bitmaps(&self) -> impl Iterator<Item = &BitmapLevel> + '_ {
        self.pipeline.bitmap_levels().filter(|b| b.sram_bitmap())
    }

    fn sram_counters(&self) -> impl Iterator<Item = &BitmapLevel> + '_ {
        self.pipeline.bitmap_levels().filter(|b| b.sram_counters())
    }

    pub(super) fn emit_initial(&mut self) {
        let cg = &mut self.cg;
        cg.emit("assign pb_data = int_pb_data;");
        cg.newline();

        cg.comment("Output assignments");
        cg.emit([
            "assign ready = !rst & (state == FSM_STATE_READY);",
            "assign out_valid = reg_valid_s[NUM_PIPELINE_STAGES-1];",
            "assign out_op_type = reg_op_type_s[NUM_PIPELINE_STAGES-1];",
            "assign out_he_data = reg_he_data_s[NUM_PIPELINE_STAGES-1];",
            "assign out_he_priority = reg_priority_s[NUM_PIPELINE_STAGES-1];",
        ]);
        cg.newline();
    }

    /// Memory initialization: every SRAM is written with zeroes (the free list with every entry address) by a
    /// per-memory address counter. The queue becomes ready once all of them are done.
    fn emit_init_state(&mut self) -> Result<(), GenerateError> {
        let bitmaps = self.pipeline.bitmap_levels().collect::<Vec<_>>();
        let cg = &mut self.cg;

        cg.comment("Free list");
        cg.emit("fl_data = fl_wraddress_counter_r;");
        cg.start_if("!fl_init_done_r");
        cg.emit("fl_wrreq = 1;");
        cg.align_assignment(
            "fl_init_done",
            ["(fl_wraddress_counter_r ==", "(HEAP_MAX_NUM_ENTRIES - 1));"],
            Assign::Blocking,
            false,
        );
        cg.end_if()?;

        let mut done = vec!["fl_init_done_r".to_string()];
        for bitmap in bitmaps {
            let name = bitmap.name();
            let memories = [
                (bitmap.sram_bitmap(), "bitmaps", "bm", "NUM_BITMAPS"),
                (bitmap.sram_counters(), "counters", "counter", "NUM_COUNTERS"),
            ];
            for &(_, title, prefix, depth) in memories.iter().filter(|memory| memory.0) {
                cg.comment(format!("L{} {}", bitmap.id(), title));
                cg.emit([
                    format!("{}_{}_data = 0;", prefix, name),
                    format!("{0}_{1}_wraddress = {0}_{1}_wraddress_counter_r;", prefix, name),
                ]);
                cg.start_if(format!("!{}_{}_init_done_r", prefix, name));
                done.push(format!("{}_{}_init_done_r", prefix, name));
                cg.emit(format!("{}_{}_wren = 1;", prefix, name));
                cg.align_assignment(
                    &format!("{}_{}_init_done", prefix, name),
                    [format!("({}_{}_wraddress_counter_r ==", prefix, name), format!("({}_L{} - 1));", depth, bitmap.id())],
                    Assign::Blocking,
                    false,
                );
                cg.end_if()?;
            }
        }

        cg.comment([
            "Finished initializing the queue (including priority buckets,",
            "free list, and the LX bitmaps). Proceed to the ready state.",
        ]);
        let last = done.len() - 1;
        let condition = done
            .iter()
            .enumerate()
            .map(|(i, signal)| if i == last { signal.clone() } else { format!("{} & ", signal) })
            .chunks(DONE_CONDITIONS_PER_LINE)
            .into_iter()
            .map(|chunk| chunk.collect::<String>().trim().to_string())
            .collect::<Vec<_>>();
        cg.start_if(condition);
        cg.emit("state_next = FSM_STATE_READY;");
        cg.end_if()?;
        Ok(())
    }

    pub(super) fn emit_state_dependent_logic(&mut self) -> Result<(), GenerateError> {
        let pipeline = self.pipeline;
        let bitmaps = self.sram_bitmaps().map(BitmapLevel::name).collect::<Vec<_>>();
        let counters = self.sram_counters().map(BitmapLevel::name).collect::<Vec<_>>();
        let cg = &mut self.cg;

        cg.block_comment([
            "State-dependent signals (data, wraddress, and wren) for the",
            "FL, priority buckets and SRAM-based LX bitmaps and counters.",
        ]);
        cg.start_block("always_comb");
        cg.emit(["state_next = state;", "fl_init_done = fl_init_done_r;"]);
        for name in &bitmaps {
            cg.emit(format!("bm_{0}_init_done = bm_{0}_init_done_r;", name));
        }
        for name in &counters {
            cg.emit(format!("counter_{0}_init_done = counter_{0}_init_done_r;", name));
        }
        cg.newline();

        cg.emit("fl_wrreq = 0;");
        for name in &bitmaps {
            cg.emit(format!("bm_{}_wren = 0;", name));
        }
        for name in &counters {
            cg.emit(format!("counter_{}_wren = 0;", name));
        }
        cg.newline();

        cg.comment("Initialization state");
        cg.start_if("state == FSM_STATE_INIT");
        self.emit_init_state()?;
        self.cg.end_if()?;

        self.cg.start_else();
        for level in pipeline.levels().iter().rev() {
            level.init_phase_logic(pipeline, &mut self.cg)?;
        }
        self.cg.end_else()?;
        self.cg.end_block("always_comb")?;
        self.cg.newline();
        Ok(())
    }

    fn emit_default_assigns(&mut self) -> Result<(), GenerateError> {
        let pipeline = self.pipeline;
        if self.is_partitioned() {
            self.cg.align_assignment(
                "bbq_id_s0",
                ["in_he_priority[HEAP_PRIORITY_BUCKETS_AWIDTH-1:", "              HEAP_PRIORITY_BUCKETS_LP_AWIDTH];"],
                Assign::Blocking,
                false,
            );
        }
        for level in pipeline.levels() {
            level.default_assigns(pipeline, &mut self.cg)?;
        }

        let pb_end = pipeline.priority_bucket().map_or(0, |pb| pb.end_cycle());
        let leaf_end = pipeline.leaf().map_or(0, |leaf| leaf.end_cycle());
        let fl_q = format!("fl_q_r[{}]", pipeline.fl_rd_delay() - 1);
        let bitmaps = self.sram_bitmaps().map(BitmapLevel::name).collect::<Vec<_>>();
        let counters = self.sram_counters().map(BitmapLevel::name).collect::<Vec<_>>();
        let cg = &mut self.cg;

        cg.newline();
        cg.emit("int_pb_q = pb_q_r;");
        cg.newline();
        cg.emit("fl_rdreq = 0;");
        cg.newline();
        cg.emit([
            "he_rden = 0;".to_string(),
            "he_wren = 0;".to_string(),
            format!("he_data = reg_he_data_s[{}];", pb_end - 1),
            format!("he_wraddress = {};", fl_q),
        ]);
        cg.newline();
        cg.emit([
            "np_rden = 0;".to_string(),
            "np_wren = 0;".to_string(),
            format!("np_data = reg_pb_q_s{}.head;", pb_end - 1),
            format!("np_wraddress = {};", fl_q),
        ]);
        cg.newline();
        cg.emit([
            "pp_rden = 0;".to_string(),
            "pp_wren = 0;".to_string(),
            format!("pp_data = {};", fl_q),
            format!("pp_wraddress = reg_pb_q_s{}.head;", pb_end - 1),
        ]);
        cg.newline();
        cg.emit([
            "pb_rdwr_conflict = 0;".to_string(),
            format!("pb_rdaddress = priority_s{};", leaf_end),
            format!("int_pb_data = reg_pb_new_s{};", pb_end - 1),
            format!("pb_wraddress = reg_priority_s[{}];", pb_end - 1),
        ]);
        cg.newline();

        for name in &bitmaps {
            cg.emit(format!("bm_{}_rden = 0;", name));
        }
        for name in &counters {
            cg.emit(format!("counter_{}_rden = 0;", name));
        }
        if pipeline.config().num_bitmap_levels() > 1 {
            cg.newline();
        }
        Ok(())
    }

    pub(super) fn emit_state_agnostic_logic(&mut self) -> Result<(), GenerateError> {
        let pipeline = self.pipeline;
        self.cg.block_comment("State-independent logic.");
        self.cg.start_block("always_comb");
        self.emit_default_assigns()?;

        for level in pipeline.levels().iter().rev() {
            level.normal_phase_logic(pipeline, &mut self.cg)?;
        }

        let cg = &mut self.cg;
        cg.start_ifdef("DEBUG");
        cg.block_comment("Print a newline between pipeline output across timesteps.");
        cg.emit("debug_newline = in_valid;");
        cg.start_for("j", "j < (NUM_PIPELINE_STAGES - 1)");
        cg.emit("debug_newline |= reg_valid_s[j];");
        cg.end_for()?;
        cg.end_ifdef()?;

        cg.end_block("always_comb")?;
        cg.newline();
        Ok(())
    }

    fn emit_reset_state(&mut self) -> Result<(), GenerateError> {
        let partitioned = self.is_partitioned();
        let bitmaps = self.pipeline.bitmap_levels().collect::<Vec<_>>();
        let cg = &mut self.cg;

        cg.comment("Reset occupancy");
        if partitioned {
            cg.start_for("i", "i < HEAP_NUM_LPS");
            cg.emit("occupancy[i] <= 0;");
            cg.end_for()?;
        } else {
            cg.emit("occupancy <= 0;");
        }
        cg.newline();

        cg.comment("Reset bitmaps");
        for bitmap in &bitmaps {
            if !bitmap.sram_bitmap() {
                if bitmap.id() == 1 {
                    cg.emit("l1_bitmap <= 0;");
                } else {
                    cg.start_for("i", &format!("i < NUM_BITMAPS_L{}", bitmap.id()));
                    cg.emit(format!("{}_bitmaps[i] <= 0;", bitmap.name()));
                    cg.end_for()?;
                }
            }
            if !bitmap.sram_counters() {
                cg.start_for("i", &format!("i < NUM_COUNTERS_L{}", bitmap.id()));
                cg.emit(format!("{}_counters[i] <= 0;", bitmap.name()));
                cg.end_for()?;
            }
        }
        cg.newline();

        cg.comment("Reset pipeline stages");
        cg.start_for("i", "i <= NUM_PIPELINE_STAGES");
        cg.emit("reg_valid_s[i] <= 0;");
        cg.end_for()?;
        cg.newline();

        cg.comment("Reset init signals");
        cg.emit("fl_init_done_r <= 0;");
        for bitmap in bitmaps.iter().filter(|b| b.sram_bitmap()) {
            cg.emit(format!("bm_{}_init_done_r <= 0;", bitmap.name()));
        }
        cg.emit("fl_wraddress_counter_r <= 0;");
        for bitmap in bitmaps.iter().filter(|b| b.sram_counters()) {
            cg.emit(format!("counter_{}_init_done_r <= 0;", bitmap.name()));
        }
        for bitmap in bitmaps.iter().filter(|b| b.sram_bitmap()) {
            cg.emit(format!("bm_{}_wraddress_counter_r <= 0;", bitmap.name()));
        }
        for bitmap in bitmaps.iter().filter(|b| b.sram_counters()) {
            cg.emit(format!("counter_{}_wraddress_counter_r <= 0;", bitmap.name()));
        }
        cg.newline();

        cg.comment("Reset FSM state");
        cg.emit("state <= FSM_STATE_INIT;");
        Ok(())
    }

    fn emit_common_sequential_logic(&mut self) -> Result<(), GenerateError> {
        let partitioned = self.is_partitioned();
        let fl_rd_delay = self.pipeline.fl_rd_delay();
        let bitmaps = self.pipeline.bitmap_levels().collect::<Vec<_>>();
        let cg = &mut self.cg;

        cg.block_comment("Stage 0: Register inputs.");
        if partitioned {
            cg.emit("reg_bbq_id_s[0] <= bbq_id_s0;");
        }
        cg.emit([
            "reg_op_type_s[0] <= in_op_type;",
            "reg_he_data_s[0] <= in_he_data;",
            "reg_priority_s[0] <= in_he_priority;",
            "reg_valid_s[0] <= (ready & in_valid);",
            "reg_is_enque_s[0] <= (in_op_type == HEAP_OP_ENQUE);",
            "reg_is_deque_max_s[0] <= (in_op_type == HEAP_OP_DEQUE_MAX);",
            "reg_is_deque_min_s[0] <= (in_op_type == HEAP_OP_DEQUE_MIN);",
        ]);
        cg.newline();

        let (id_str, id_val, priority_prefix, priority_suffix) = if partitioned {
            (" (logical ID: %0d)", "bbq_id_s0, ", "relative ", " & (HEAP_NUM_PRIORITIES_PER_LP - 1)")
        } else {
            ("", "", "", "")
        };
        cg.start_ifdef("DEBUG");
        cg.start_if("in_valid");
        cg.start_if("in_op_type == HEAP_OP_ENQUE");
        cg.emit([
            format!("$display(\"[BBQ] At S0{}, enqueing %0d with {}priority %0d\",", id_str, priority_prefix),
            format!("         {}in_he_data, in_he_priority{});", id_val, priority_suffix),
        ]);
        cg.end_if()?;
        cg.start_else();
        cg.emit([
            format!("$display(\"[BBQ] At S0{}, performing %s\",", id_str),
            format!("         {}in_op_type.name);", id_val),
        ]);
        cg.end_else()?;
        cg.end_if()?;
        cg.newline();

        cg.start_if("debug_newline");
        cg.emit("$display(\"\");");
        cg.end_if()?;
        cg.start_if(["(state == FSM_STATE_INIT) &&", "(state_next == FSM_STATE_READY)"]);
        cg.emit("$display(\"[BBQ] Heap initialization complete!\");");
        cg.end_if()?;
        cg.end_ifdef()?;
        cg.newline();

        // Memories in placement order, bitmaps before counters within a level.
        let memories = bitmaps
            .iter()
            .flat_map(|bitmap| {
                let name = bitmap.name();
                [
                    bitmap.sram_bitmap().then(|| format!("bm_{}", name)),
                    bitmap.sram_counters().then(|| format!("counter_{}", name)),
                ]
            })
            .flatten()
            .collect::<Vec<_>>();

        cg.comment("Register init signals");
        let done = std::iter::once("fl_init_done".to_string())
            .chain(memories.iter().map(|memory| format!("{}_init_done", memory)));
        for signal in done.sorted_by_key(String::len) {
            cg.emit(format!("{0}_r <= {0};", signal));
        }
        cg.newline();

        let counters = std::iter::once("fl_wraddress_counter_r".to_string())
            .chain(memories.iter().map(|memory| format!("{}_wraddress_counter_r", memory)));
        for signal in counters.sorted_by_key(String::len) {
            cg.emit(format!("{0} <= {0} + 1;", signal));
        }
        cg.newline();

        cg.comment("Register read signals");
        cg.emit([
            "pb_q_r <= pb_q;",
            "he_rden_r <= he_rden;",
            "np_rden_r <= np_rden;",
            "pp_rden_r <= pp_rden;",
            "he_rdaddress_r <= he_rdaddress;",
            "np_rdaddress_r <= np_rdaddress;",
            "pp_rdaddress_r <= pp_rdaddress;",
        ]);
        cg.newline();

        cg.comment("Register write signals");
        cg.emit(["he_wren_r <= he_wren;", "np_wren_r <= np_wren;", "pp_wren_r <= pp_wren;"]);
        for bitmap in bitmaps.iter().filter(|b| b.sram_bitmap()) {
            cg.emit(format!("bm_{0}_data_r <= bm_{0}_data;", bitmap.name()));
        }
        cg.emit([
            "he_wraddress_r <= he_wraddress;",
            "np_wraddress_r <= np_wraddress;",
            "pp_wraddress_r <= pp_wraddress;",
        ]);
        cg.newline();

        cg.emit("fl_q_r[0] <= fl_q;");
        cg.start_for("i", &format!("i < {}", fl_rd_delay - 1));
        cg.emit("fl_q_r[i + 1] <= fl_q_r[i];");
        cg.end_for()?;
        cg.newline();

        cg.comment("Register R/W conflict signals");
        cg.emit([
            "reg_pb_rdwr_conflict_r1 <= pb_rdwr_conflict;",
            "reg_pb_rdwr_conflict_r2 <= reg_pb_rdwr_conflict_r1;",
        ]);
        cg.newline();

        cg.comment("Update FSM state");
        cg.emit("state <= state_next;");
        Ok(())
    }

    pub(super) fn emit_sequential_logic(&mut self) -> Result<(), GenerateError> {
        const BLOCK: &str = "always @(posedge clk)";
        let pipeline = self.pipeline;

        self.cg.start_block(BLOCK);
        self.cg.start_if("rst");
        self.emit_reset_state()?;
        self.cg.end_if()?;

        self.cg.start_else();
        for level in pipeline.levels().iter().rev() {
            level.commit_logic(pipeline, &mut self.cg)?;
        }
        self.emit_common_sequential_logic()?;
        self.cg.end_else()?;
        self.cg.end_block(BLOCK)?;
        self.cg.newline();
        Ok(())
    }
}
