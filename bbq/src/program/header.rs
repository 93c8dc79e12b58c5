//! Module header: parameters, ports, derived parameters and typedefs.

use super::{GenerateError, Program};
use crate::vir::PortDeclaration;

/// Renders a group of ports; every port is followed by a comma unless it closes the port list.
fn port_group(ports: &[PortDeclaration], closes_list: bool) -> Vec<String> {
    ports
        .iter()
        .enumerate()
        .map(|(i, port)| if closes_list && i + 1 == ports.len() { port.to_string() } else { format!("{},", port) })
        .collect()
}

impl Program<'_> {
    pub(super) fn emit_prologue(&mut self) -> Result<(), GenerateError> {
        let config = self.config();
        let partitioned = self.is_partitioned();
        let cg = &mut self.cg;

        cg.emit("import heap_ops::*;");
        cg.comment("`define DEBUG");
        cg.newline();
        cg.block_comment([
            "Implements an integer priority queue in hardware using a configurable",
            "Hierarchical Find First Set (HFFS) Queue. The implementation is fully",
            "pipelined, capable of performing one operation (enqueue, dequeue-*,",
            "or peek) every cycle.",
        ]);

        cg.start_list("module bbq #(");
        if !partitioned {
            cg.emit(format!("parameter HEAP_BITMAP_WIDTH = {},", config.bitmap_width()));
        }
        cg.emit(["parameter HEAP_ENTRY_DWIDTH = 17,", "parameter HEAP_MAX_NUM_ENTRIES = ((1 << 17) - 1),"]);
        if partitioned {
            cg.emit([
                format!("localparam HEAP_BITMAP_WIDTH = {}, // Bitmap bit-width", config.bitmap_width()),
                format!("localparam HEAP_NUM_LPS = {}, // Number of logical BBQs", config.num_lps()),
                "localparam HEAP_LOGICAL_BBQ_AWIDTH = ($clog2(HEAP_NUM_LPS)),".to_string(),
            ]);
        }
        cg.emit([
            "localparam HEAP_ENTRY_AWIDTH = ($clog2(HEAP_MAX_NUM_ENTRIES)),".to_string(),
            format!("localparam HEAP_NUM_LEVELS = {}, // Number of bitmap tree levels", config.num_bitmap_levels()),
            "localparam HEAP_NUM_PRIORITIES = (HEAP_BITMAP_WIDTH ** HEAP_NUM_LEVELS),".to_string(),
            format!(
                "localparam HEAP_PRIORITY_BUCKETS_AWIDTH = ($clog2(HEAP_NUM_PRIORITIES)){}",
                if partitioned { "," } else { "" }
            ),
        ]);
        if partitioned {
            cg.emit([
                "localparam HEAP_NUM_PRIORITIES_PER_LP = (HEAP_NUM_PRIORITIES / HEAP_NUM_LPS),",
                "localparam HEAP_PRIORITY_BUCKETS_LP_AWIDTH = ($clog2(HEAP_NUM_PRIORITIES_PER_LP))",
            ]);
        }
        cg.continue_list(") (")?;

        let data = "logic [HEAP_ENTRY_DWIDTH-1:0]";
        let priority = "logic [HEAP_PRIORITY_BUCKETS_AWIDTH-1:0]";
        cg.comment("General I/O");
        cg.emit(port_group(
            &[
                PortDeclaration::input("logic", "clk"),
                PortDeclaration::input("logic", "rst"),
                PortDeclaration::output("logic", "ready"),
            ],
            false,
        ));
        cg.newline();

        cg.comment("Operation input");
        cg.emit(port_group(
            &[
                PortDeclaration::input("logic", "in_valid"),
                PortDeclaration::input("heap_op_t", "in_op_type"),
                PortDeclaration::input(data, "in_he_data"),
                PortDeclaration::input(priority, "in_he_priority"),
            ],
            false,
        ));
        cg.newline();

        cg.comment("Operation output");
        cg.emit(port_group(
            &[
                PortDeclaration::output("logic", "out_valid"),
                PortDeclaration::output("heap_op_t", "out_op_type"),
                PortDeclaration::output(data, "out_he_data"),
                PortDeclaration::output(priority, "out_he_priority"),
            ],
            true,
        ));
        cg.end_list(");")?;
        cg.newline();
        Ok(())
    }

    pub(super) fn emit_typedefs(&mut self) -> Result<(), GenerateError> {
        let levels = self.config().num_bitmap_levels();
        let num_pipeline_stages = self.pipeline.num_pipeline_stages();
        let partitioned = self.is_partitioned();
        let cg = &mut self.cg;

        cg.comment([
            "Optimization: Subtree occupancy counters (StOCs) must represent",
            "values in the range [0, HEAP_MAX_NUM_ENTRIES]. Consequently, to",
            "support 2^k entries, every StOC must be (k + 1)-bits wide; this",
            "is wasteful because the MSb is only ever used to encode maximum",
            "occupancy (2^k). Instead, by supporting one less entry (2^k - 1)",
            "we can reduce memory usage by using 1 fewer bit per StOC.",
        ]);
        cg.emit("localparam ROUNDED_MAX_NUM_ENTRIES = (1 << HEAP_ENTRY_AWIDTH);");
        cg.start_if("HEAP_MAX_NUM_ENTRIES != (ROUNDED_MAX_NUM_ENTRIES - 1)");
        cg.emit("$error(\"HEAP_MAX_NUM_ENTRIES must be of the form (2^k - 1)\");");
        cg.end_if()?;
        cg.newline();

        cg.emit(["integer i;", "integer j;"]);
        cg.newline();

        cg.block_comment("Derived parameters.");
        cg.align_defs(&[("localparam NUM_PIPELINE_STAGES", format!("= {};", num_pipeline_stages))]);
        cg.newline();

        for id in 1..=levels {
            let count = if id == 1 { "1".to_string() } else { format!("(HEAP_BITMAP_WIDTH ** {})", id - 1) };
            cg.align_defs(&[(format!("localparam NUM_BITMAPS_L{}", id), format!("= {};", count))]);
        }
        for id in 2..=levels {
            cg.align_defs(&[(format!("localparam BITMAP_L{}_AWIDTH", id), format!("= ($clog2(NUM_BITMAPS_L{}));", id))]);
        }
        cg.newline();

        for id in 1..=levels {
            let count =
                if id == levels { "(HEAP_NUM_PRIORITIES)".to_string() } else { format!("(NUM_BITMAPS_L{})", id + 1) };
            cg.align_defs(&[(format!("localparam NUM_COUNTERS_L{}", id), format!("= {};", count))]);
        }
        cg.align_defs(&[("localparam COUNTER_T_WIDTH", "= (HEAP_ENTRY_AWIDTH + 1);")]);
        for id in 1..=levels {
            cg.align_defs(&[(format!("localparam COUNTER_L{}_AWIDTH", id), format!("= ($clog2(NUM_COUNTERS_L{}));", id))]);
        }
        cg.newline();

        cg.align_defs(&[
            ("localparam WATERLEVEL_IDX", "= (COUNTER_T_WIDTH - 1);"),
            ("localparam LIST_T_WIDTH", "= (HEAP_ENTRY_AWIDTH * 2);"),
            ("localparam BITMAP_IDX_MASK", "= (HEAP_BITMAP_WIDTH - 1);"),
            ("localparam HEAP_LOG_BITMAP_WIDTH", "= ($clog2(HEAP_BITMAP_WIDTH));"),
        ]);
        cg.newline();

        cg.block_comment("Local typedefs.");
        cg.emit(["typedef logic [COUNTER_T_WIDTH-1:0] counter_t;", "typedef logic [HEAP_BITMAP_WIDTH-1:0] bitmap_t;"]);
        if partitioned {
            cg.emit("typedef logic [HEAP_LOGICAL_BBQ_AWIDTH-1:0] bbq_id_t;");
        }
        cg.emit([
            "typedef logic [HEAP_ENTRY_AWIDTH-1:0] heap_entry_ptr_t;",
            "typedef logic [HEAP_ENTRY_DWIDTH-1:0] heap_entry_data_t;",
            "typedef logic [HEAP_PRIORITY_BUCKETS_AWIDTH-1:0] heap_priority_t;",
            "typedef struct packed { heap_entry_ptr_t head; heap_entry_ptr_t tail; } list_t;",
        ]);
        cg.newline();

        cg.enum_typedef("fsm_state_t", &["FSM_STATE_IDLE", "FSM_STATE_INIT", "FSM_STATE_READY"])?;
        cg.newline();
        cg.enum_typedef("op_color_t", &["OP_COLOR_BLUE", "OP_COLOR_RED"])?;
        cg.newline();
        cg.enum_typedef("read_carry_direction_t", &["READ_CARRY_RIGHT", "READ_CARRY_DOWN", "READ_CARRY_UP"])?;
        cg.newline();
        Ok(())
    }
}
