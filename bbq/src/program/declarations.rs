//! State declarations.

use super::{GenerateError, Program};
use crate::codegen::CodeGen;

/// Emits the declarations of a memory interface: one line per `(type, suffix)` pair, as `<type> <prefix>_<suffix>;`.
fn emit_memory(cg: &mut CodeGen, title: &str, prefix: &str, signals: &[(&str, &str)]) {
    cg.comment(title);
    cg.emit(
        signals
            .iter()
            .map(|(ty, suffix)| format!("{} {}_{};", ty, prefix, suffix))
            .collect::<Vec<_>>(),
    );
    cg.newline();
}

impl Program<'_> {
    pub(super) fn emit_declarations(&mut self) -> Result<(), GenerateError> {
        let pipeline = self.pipeline;
        let partitioned = self.is_partitioned();
        let fl_rd_delay = pipeline.fl_rd_delay();

        {
            let cg = &mut self.cg;
            cg.comment("Heap state");
            for bitmap in pipeline.bitmap_levels().filter(|b| !b.sram_bitmap()) {
                if bitmap.id() == 1 {
                    cg.emit("bitmap_t l1_bitmap; // L1 bitmap");
                } else {
                    cg.emit(format!(
                        "bitmap_t {0}_bitmaps[NUM_BITMAPS_L{1}-1:0]; // L{1} bitmaps",
                        bitmap.name(),
                        bitmap.id()
                    ));
                }
            }
            for bitmap in pipeline.bitmap_levels().filter(|b| !b.sram_counters()) {
                cg.emit(format!(
                    "counter_t {0}_counters[NUM_COUNTERS_L{1}-1:0]; // L{1} counters",
                    bitmap.name(),
                    bitmap.id()
                ));
            }
            cg.newline();

            cg.comment("Free list");
            cg.emit([
                "logic fl_empty;".to_string(),
                "logic fl_rdreq;".to_string(),
                "logic fl_wrreq;".to_string(),
                "logic [HEAP_ENTRY_AWIDTH-1:0] fl_q;".to_string(),
                "logic [HEAP_ENTRY_AWIDTH-1:0] fl_data;".to_string(),
                format!("logic [HEAP_ENTRY_AWIDTH-1:0] fl_q_r[{}:0];", fl_rd_delay - 1),
                "logic [HEAP_ENTRY_AWIDTH-1:0] fl_wraddress_counter_r;".to_string(),
            ]);
            cg.newline();

            let pointer_memory = |data: &'static str| {
                [
                    ("logic", "rden"),
                    ("logic", "wren"),
                    ("logic", "rden_r"),
                    ("logic", "wren_r"),
                    (data, "q"),
                    (data, "data"),
                    ("logic [HEAP_ENTRY_AWIDTH-1:0]", "rdaddress"),
                    ("logic [HEAP_ENTRY_AWIDTH-1:0]", "wraddress"),
                    ("logic [HEAP_ENTRY_AWIDTH-1:0]", "rdaddress_r"),
                    ("logic [HEAP_ENTRY_AWIDTH-1:0]", "wraddress_r"),
                ]
            };
            emit_memory(cg, "Heap entries", "he", &pointer_memory("logic [HEAP_ENTRY_DWIDTH-1:0]"));
            emit_memory(cg, "Next pointers", "np", &pointer_memory("logic [HEAP_ENTRY_AWIDTH-1:0]"));
            emit_memory(cg, "Previous pointers", "pp", &pointer_memory("logic [HEAP_ENTRY_AWIDTH-1:0]"));

            cg.comment("Priority buckets");
            cg.emit([
                "logic pb_rden;",
                "logic pb_wren;",
                "logic pb_rdwr_conflict;",
                "logic reg_pb_rdwr_conflict_r1;",
                "logic reg_pb_rdwr_conflict_r2;",
                "logic [LIST_T_WIDTH-1:0] pb_q;",
                "logic [LIST_T_WIDTH-1:0] pb_q_r;",
                "logic [LIST_T_WIDTH-1:0] pb_data;",
                "logic [HEAP_PRIORITY_BUCKETS_AWIDTH-1:0] pb_rdaddress;",
                "logic [HEAP_PRIORITY_BUCKETS_AWIDTH-1:0] pb_wraddress;",
            ]);
            cg.newline();

            for bitmap in pipeline.bitmap_levels() {
                let name = bitmap.name();
                if bitmap.sram_bitmap() {
                    let address = format!("logic [BITMAP_L{}_AWIDTH-1:0]", bitmap.id());
                    emit_memory(cg, &format!("L{} bitmaps", bitmap.id()), &format!("bm_{}", name), &[
                        ("logic", "rden"),
                        ("logic", "wren"),
                        ("logic [HEAP_BITMAP_WIDTH-1:0]", "q"),
                        ("logic [HEAP_BITMAP_WIDTH-1:0]", "data"),
                        ("logic [HEAP_BITMAP_WIDTH-1:0]", "data_r"),
                        (address.as_str(), "rdaddress"),
                        (address.as_str(), "wraddress"),
                        (address.as_str(), "wraddress_counter_r"),
                    ]);
                }
                if bitmap.sram_counters() {
                    let address = format!("logic [COUNTER_L{}_AWIDTH-1:0]", bitmap.id());
                    emit_memory(cg, &format!("L{} counters", bitmap.id()), &format!("counter_{}", name), &[
                        ("logic", "rden"),
                        ("logic", "wren"),
                        ("logic [COUNTER_T_WIDTH-1:0]", "q"),
                        ("logic [COUNTER_T_WIDTH-1:0]", "data"),
                        (address.as_str(), "rdaddress"),
                        (address.as_str(), "wraddress"),
                        (address.as_str(), "wraddress_counter_r"),
                    ]);
                }
            }

            if partitioned {
                cg.comment("Heap occupancy per logical BBQ");
                cg.emit("counter_t occupancy[HEAP_NUM_LPS-1:0];");
            } else {
                cg.comment("Heap occupancy");
                cg.emit("counter_t occupancy;");
            }
            cg.newline();
        }

        self.emit_pipeline_metadata();

        for level in pipeline.levels() {
            level.declare_stage_state(pipeline, &mut self.cg)?;
        }

        self.emit_init_signals();

        let cg = &mut self.cg;
        cg.comment("Intermediate signals");
        cg.align_defs(&[("list_t", "int_pb_data;"), ("list_t", "int_pb_q;")]);
        cg.newline();

        cg.comment("Miscellaneous signals");
        for bitmap in pipeline.bitmap_levels() {
            let (name, last) = (bitmap.name(), bitmap.num_ffs_instances() - 1);
            cg.align_defs(&[
                ("logic [HEAP_LOG_BITMAP_WIDTH-1:0]", format!("ffs_{}_inst_msb[{}:0];", name, last)),
                ("logic [HEAP_LOG_BITMAP_WIDTH-1:0]", format!("ffs_{}_inst_lsb[{}:0];", name, last)),
                ("logic", format!("ffs_{}_inst_zero[{}:0];", name, last)),
                ("bitmap_t", format!("ffs_{}_inst_msb_onehot[{}:0];", name, last)),
                ("bitmap_t", format!("ffs_{}_inst_lsb_onehot[{}:0];", name, last)),
            ]);
            cg.newline();
        }

        cg.start_ifdef("DEBUG");
        cg.align_defs(&[("logic", "debug_newline;")]);
        cg.end_ifdef()?;
        cg.newline();
        Ok(())
    }

    /// Per-stage registers shared by every level: `reg_<signal>_s[NUM_PIPELINE_STAGES:0]`.
    fn emit_pipeline_metadata(&mut self) {
        let pipeline = self.pipeline;
        let partitioned = self.is_partitioned();
        let cg = &mut self.cg;
        let stages = |signal: &str| format!("reg_{}_s[NUM_PIPELINE_STAGES:0];", signal);

        cg.block_comment("Housekeeping.");
        cg.comment("Common pipeline metadata");
        cg.align_defs(&[("logic", stages("valid"))]);
        if partitioned {
            cg.align_defs(&[("bbq_id_t", stages("bbq_id"))]);
        }
        cg.align_defs(&[("heap_op_t", stages("op_type")), ("heap_entry_data_t", stages("he_data"))]);
        for bitmap in pipeline.bitmap_levels().filter(|b| b.id() > 1) {
            cg.align_defs(&[(
                format!("logic [BITMAP_L{}_AWIDTH-1:0]", bitmap.id()),
                stages(&format!("{}_addr", bitmap.name())),
            )]);
        }
        cg.align_defs(&[
            ("op_color_t", stages("op_color")),
            ("logic", stages("is_enque")),
            ("heap_priority_t", stages("priority")),
        ]);
        for bitmap in pipeline.bitmap_levels().filter(|b| b.id() > 1) {
            cg.align_defs(&[("bitmap_t", stages(&format!("{}_bitmap", bitmap.name())))]);
        }
        cg.align_defs(&[("logic", stages("is_deque_min")), ("logic", stages("is_deque_max"))]);
        cg.newline();

        if partitioned {
            cg.comment("Stage 0 metadata");
            cg.align_defs(&[("bbq_id_t", "bbq_id_s0;")]);
            cg.newline();
        }
    }

    fn emit_init_signals(&mut self) {
        let pipeline = self.pipeline;
        let cg = &mut self.cg;
        let counters = || pipeline.bitmap_levels().filter(|b| b.sram_counters());
        let bitmaps = || pipeline.bitmap_levels().filter(|b| b.sram_bitmap());

        cg.comment("Init signals");
        cg.align_defs(&[("fsm_state_t", "state = FSM_STATE_IDLE;")]);
        for bitmap in counters() {
            cg.align_defs(&[("logic", format!("counter_{}_init_done_r;", bitmap.name()))]);
        }
        for bitmap in bitmaps() {
            cg.align_defs(&[("logic", format!("bm_{}_init_done_r;", bitmap.name()))]);
        }
        cg.align_defs(&[("logic", "fl_init_done_r;")]);
        for bitmap in counters() {
            cg.align_defs(&[("logic", format!("counter_{}_init_done;", bitmap.name()))]);
        }
        for bitmap in bitmaps() {
            cg.align_defs(&[("logic", format!("bm_{}_init_done;", bitmap.name()))]);
        }
        cg.align_defs(&[("logic", "fl_init_done;"), ("fsm_state_t", "state_next;")]);
        cg.newline();
    }
}
