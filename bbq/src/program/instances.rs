//! Submodule instantiations.

use super::Program;
use crate::vir::ModuleInstantiation;

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect()
}

impl Program<'_> {
    fn emit_module(&mut self, inst: &ModuleInstantiation) {
        self.cg.emit(inst.to_string().lines().map(str::to_string).collect::<Vec<_>>());
        self.cg.newline();
    }

    fn emit_instantiation(&mut self, title: &str, inst: &ModuleInstantiation) {
        self.cg.comment(title);
        self.emit_module(inst);
    }

    pub(super) fn emit_instantiations(&mut self) {
        let pipeline = self.pipeline;

        let free_list = ModuleInstantiation::new(
            "sc_fifo".to_string(),
            "free_list".to_string(),
            pairs(&[
                ("DWIDTH", "HEAP_ENTRY_AWIDTH"),
                ("DEPTH", "HEAP_MAX_NUM_ENTRIES"),
                ("IS_SHOWAHEAD", "0"),
                ("IS_OUTDATA_REG", "1"),
            ]),
            pairs(&[
                ("clock", "clk"),
                ("data", "fl_data"),
                ("rdreq", "fl_rdreq"),
                ("wrreq", "fl_wrreq"),
                ("empty", "fl_empty"),
                ("full", ""),
                ("q", "fl_q"),
                ("usedw", ""),
            ]),
        );
        self.emit_instantiation("Free list", &free_list);

        let entries = "HEAP_MAX_NUM_ENTRIES";
        for (title, inst, prefix, dwidth) in [
            ("Heap entries", "heap_entries", "he", "HEAP_ENTRY_DWIDTH"),
            ("Next pointers", "next_pointers", "np", "HEAP_ENTRY_AWIDTH"),
            ("Previous pointers", "previous_pointers", "pp", "HEAP_ENTRY_AWIDTH"),
        ] {
            self.emit_instantiation(title, &ModuleInstantiation::bram(inst, prefix, dwidth, "HEAP_ENTRY_AWIDTH", entries));
        }
        self.emit_instantiation(
            "Priority buckets",
            &ModuleInstantiation::bram(
                "priority_buckets",
                "pb",
                "LIST_T_WIDTH",
                "HEAP_PRIORITY_BUCKETS_AWIDTH",
                "HEAP_NUM_PRIORITIES",
            ),
        );

        for bitmap in pipeline.bitmap_levels().filter(|b| b.sram_bitmap()) {
            let name = format!("bm_{}", bitmap.name());
            let inst = ModuleInstantiation::bram(
                &name,
                &name,
                "HEAP_BITMAP_WIDTH",
                &format!("BITMAP_L{}_AWIDTH", bitmap.id()),
                &format!("NUM_BITMAPS_L{}", bitmap.id()),
            );
            self.emit_instantiation(&format!("L{} bitmaps", bitmap.id()), &inst);
        }
        for bitmap in pipeline.bitmap_levels().filter(|b| b.sram_counters()) {
            let inst = ModuleInstantiation::bram(
                &format!("counters_{}", bitmap.name()),
                &format!("counter_{}", bitmap.name()),
                "COUNTER_T_WIDTH",
                &format!("COUNTER_L{}_AWIDTH", bitmap.id()),
                &format!("NUM_COUNTERS_L{}", bitmap.id()),
            );
            self.emit_instantiation(&format!("L{} counters", bitmap.id()), &inst);
        }

        for (level, bitmap) in pipeline.placed_bitmap_levels() {
            self.cg.comment(format!("L{} FFSs", bitmap.id()));
            for ffs in bitmap.ffs_instances(level.start_cycle()) {
                self.emit_module(&ffs.instantiation());
            }
        }
    }
}
