//! Bitmap-tree levels.
//!
//! A bitmap level at depth `id` holds one `HEAP_BITMAP_WIDTH`-bit bitmap per node at that depth and one subtree
//! occupancy counter (StOC) per child. Its stages are, in order:
//!
//! 1. (memory-backed bitmaps only) read delay for the bitmap;
//! 2. bitmap index computation: FFS over the (forwarded) bitmap for dequeues, priority digit for enqueues;
//! 3. (memory-backed counters only) read delay for the counter, resolving the read-carry direction;
//! 4. write-back of the counter and bitmap, and conflict detection for the next level.

use arrayvec::ArrayVec;
use static_assertions::const_assert;

use crate::codegen::{Assign, CodeGen, Lines, TernaryLayout};
use crate::level::{BitmapWindow, Level, LevelCtx, Stage};
use crate::program::GenerateError;
use crate::vir::ModuleInstantiation;

/// Depth from which StOC arrays are memory-backed.
pub const SRAM_COUNTERS_DEPTH: usize = 2;

/// Depth from which bitmap arrays are memory-backed.
pub const SRAM_BITMAP_DEPTH: usize = 3;

/// Maximum number of FFS instances per level.
pub const MAX_FFS_INSTANCES: usize = 3;

const_assert!(SRAM_COUNTERS_DEPTH <= SRAM_BITMAP_DEPTH);

/// One level of the bitmap tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapLevel {
    id: usize,
    sram_bitmap: bool,
    sram_counters: bool,
}

/// An FFS instance of a bitmap level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfsInstance {
    /// Name of the owning level.
    pub level: String,
    /// Index among the level's instances.
    pub index: usize,
    /// Bitmap the instance scans.
    pub input: String,
}

impl FfsInstance {
    /// Instantiation of the `ffs` module.
    pub fn instantiation(&self) -> ModuleInstantiation {
        let output = |port: &str| (port.to_string(), format!("ffs_{}_inst_{}[{}]", self.level, port, self.index));
        ModuleInstantiation::new(
            "ffs".to_string(),
            format!("ffs_{}_inst{}", self.level, self.index),
            vec![("WIDTH_LOG".to_string(), "HEAP_LOG_BITMAP_WIDTH".to_string())],
            vec![
                ("x".to_string(), self.input.clone()),
                output("msb"),
                output("lsb"),
                output("msb_onehot"),
                output("lsb_onehot"),
                output("zero"),
            ],
        )
    }
}

impl BitmapLevel {
    /// Creates new bitmap level at depth `id` (1-based), placing its state in memory by depth.
    pub fn new(id: usize) -> Self {
        Self { id, sram_bitmap: id >= SRAM_BITMAP_DEPTH, sram_counters: id >= SRAM_COUNTERS_DEPTH }
    }

    /// Depth in the tree (1-based).
    pub fn id(&self) -> usize { self.id }

    /// Whether the bitmaps live in memory.
    pub fn sram_bitmap(&self) -> bool { self.sram_bitmap }

    /// Whether the counters live in memory.
    pub fn sram_counters(&self) -> bool { self.sram_counters }

    /// Canonical name.
    pub fn name(&self) -> String { format!("l{}", self.id) }

    /// Number of FFS instances: the fetched bitmap, and the postop bitmap of every later stage of this level.
    pub fn num_ffs_instances(&self) -> usize { 2 + usize::from(self.sram_counters) }

    /// FFS instances of this level, given its first stage.
    pub fn ffs_instances(&self, start_cycle: usize) -> ArrayVec<FfsInstance, MAX_FFS_INSTANCES> {
        (0..self.num_ffs_instances())
            .map(|index| {
                let cycle = start_cycle + usize::from(self.sram_bitmap) + index - 1;
                let input = match (index, self.id) {
                    (0, 1) => "l1_bitmap".to_string(),
                    (0, _) => format!("reg_{}_bitmap_s[{}]", self.name(), cycle),
                    _ => format!("reg_{}_bitmap_postop_s{}", self.name(), cycle),
                };
                FfsInstance { level: self.name(), index, input }
            })
            .collect()
    }

    fn b(&self) -> usize { usize::from(self.sram_bitmap) }

    fn u(&self) -> usize { usize::from(self.sram_counters) }

    fn reads(&self, is_leaf: bool) -> String {
        if is_leaf {
            "PB (head and tail)".to_string()
        } else {
            format!("L{} bitmap", self.id + 1)
        }
    }

    fn write_back_comment(&self, cycle: usize, is_leaf: bool) -> [String; 2] {
        [
            format!("Stage {}: Write-back the L{} counter and bitmap,", cycle, self.id),
            format!("and read the corresponding {}.", self.reads(is_leaf)),
        ]
    }

    /// `lhs = term | onehot` on enqueue; on dequeue, clears the bit only if the child counter drops to zero.
    fn emit_bitmap_update(&self, cg: &mut CodeGen, lhs: &str, term: &str, seq: usize) -> Result<(), GenerateError> {
        let n = self.name();
        cg.start_if(format!("reg_is_enque_s[{}]", seq));
        cg.align_assignment(
            lhs,
            vec![format!("({} |", term), format!("reg_{}_bitmap_idx_onehot_s{});", n, seq)],
            Assign::Blocking,
            false,
        );
        cg.end_if()?;
        cg.start_else();
        cg.align_assignment(
            lhs,
            vec![
                "(".to_string(),
                format!("{}_counter_non_zero_s{} ? {} :", n, seq + 1, term),
                format!("({} & ~reg_{}_bitmap_idx_onehot_s{}));", term, n, seq),
            ],
            Assign::Blocking,
            true,
        );
        cg.end_else()?;
        Ok(())
    }

    fn emit_write_back_comb(&self, ctx: &LevelCtx<'_>, next: &Level, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let seq = ctx.end_cycle() - 1;
        let is_leaf = next.is_priority_bucket();
        let next_name = next.name();

        cg.block_comment(self.write_back_comment(seq + 1, is_leaf));

        let counter =
            if self.sram_counters { format!("reg_{}_counter_rc_s{}", n, seq) } else { format!("reg_{}_counter_s{}", n, seq) };
        cg.align_ternary(
            &format!("{}_counter_s{}[WATERLEVEL_IDX-1:0]", n, seq + 1),
            &[format!("reg_is_enque_s[{}]", seq)],
            vec![
                format!("({}[WATERLEVEL_IDX-1:0] + 1)", counter).into(),
                format!("({}[WATERLEVEL_IDX-1:0] - 1)", counter).into(),
            ],
            Assign::Blocking,
            TernaryLayout::BROKEN,
        )?;
        cg.newline();
        cg.align_assignment(
            &format!("{}_counter_s{}[WATERLEVEL_IDX]", n, seq + 1),
            vec![
                format!("(reg_is_enque_s[{}] ?", seq),
                format!("({0}[WATERLEVEL_IDX] | {0}[0]) :", counter),
                format!("((|{0}[WATERLEVEL_IDX-1:2]) | (&{0}[1:0])));", counter),
            ],
            Assign::Blocking,
            true,
        );
        cg.newline();
        cg.align_assignment(
            &format!("{}_counter_non_zero_s{}", n, seq + 1),
            vec![format!("(reg_is_enque_s[{}] |", seq), format!("{}[WATERLEVEL_IDX]);", counter)],
            Assign::Blocking,
            false,
        );

        if !self.sram_bitmap {
            cg.comment(format!("Write L{} bitmap", self.id));
            let term = if self.id == 1 { "l1_bitmap".to_string() } else { format!("reg_{}_bitmap_s[{}]", n, seq) };
            self.emit_bitmap_update(cg, &format!("{}_bitmap_s{}", n, seq + 1), &term, seq)?;
        }

        if is_leaf {
            cg.comment("Read PB contents");
            cg.emit(format!("pb_rden = reg_valid_s[{}];", seq));
            cg.newline();
        } else if next.as_bitmap().map_or(false, |bitmap| bitmap.sram_bitmap) {
            cg.comment(format!("Read L{} bitmap", self.id + 1));
            cg.emit(format!("bm_{}_rden = reg_valid_s[{}];", next_name, seq));

            let lhs = format!("bm_{}_rdaddress", next_name);
            let idx = format!("reg_{}_bitmap_idx_s{}", n, seq);
            if self.id == 1 {
                cg.emit(format!("{} = {};", lhs, idx));
            } else {
                cg.align_assignment(
                    &lhs,
                    vec![format!("{{reg_{}_addr_s[{}],", n, seq), format!("{}}};", idx)],
                    Assign::Blocking,
                    false,
                );
            }
            cg.newline();
        }

        cg.comment("Compute conflicts");
        let window = BitmapWindow::new(next_name.clone(), seq + 1);
        let own = BitmapWindow::new(n.clone(), seq);
        for offset in 1..=window.wires().len() {
            let rhs = if self.id == 1 {
                let addr = if ctx.config().num_bitmap_levels() == 1 {
                    "priority".to_string()
                } else {
                    format!("{}_addr", next_name)
                };
                vec![
                    "(".to_string(),
                    format!("reg_valid_s[{}] && reg_valid_s[{}] &&", seq, seq + offset),
                    format!("(reg_l1_bitmap_idx_s{} == reg_{}_s[{}]));", seq, addr, seq + offset),
                ]
            } else {
                let addr = if is_leaf { "reg_priority_s".to_string() } else { format!("reg_{}_addr_s", next_name) };
                vec![
                    "(".to_string(),
                    own.reg(offset),
                    format!("{}&& (reg_{}_bitmap_idx_s{} ==", CodeGen::tab(1), n, seq),
                    format!("{}{}[{}][HEAP_LOG_BITMAP_WIDTH-1:0]));", CodeGen::tab(2), addr, seq + offset),
                ]
            };
            cg.align_assignment(&window.wire(offset), rhs, Assign::Blocking, true);
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

    fn emit_counter_delay_comb(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let seq = ctx.end_cycle() - 2;

        cg.block_comment(format!("Stage {}: NOOP, read delay for L{} counter.", seq + 1, self.id));
        cg.comment([
            "Compute the read carry direction. If the".to_string(),
            format!("active op in Stage {} is of the same type", seq + 2),
            "or the bitmap is empty, carry right.".to_string(),
        ]);
        let align_to = format!("(reg_{}_bitmap_empty_s{} || (", n, seq);
        cg.start_if(vec![
            format!("!reg_is_enque_s[{}] &&", seq),
            format!("{}_counter_non_zero_s{} &&", n, seq + 2),
            format!("reg_{}_addr_conflict_s{}_s{} &&", n, seq + 1, seq),
            format!("{}reg_op_type_s[{}] ==", align_to, seq),
            format!("{}reg_op_type_s[{}]))", " ".repeat(align_to.len()), seq + 1),
        ]);
        cg.emit(format!("rcd_s{} = READ_CARRY_RIGHT;", seq + 1));
        cg.end_if()?;
        cg.comment("Fallthrough: default to carry down");
        cg.newline();

        cg.comment("Counter is updating this cycle, so output is stale");
        cg.start_if(vec![
            format!("(reg_{0}_bitmap_idx_s{1} == reg_{0}_bitmap_idx_s{2})", n, seq, seq + 1),
            format!("&& reg_{}_addr_conflict_s{}_s{}", n, seq + 1, seq),
        ]);
        cg.emit([
            format!("{0}_counter_q_s{1} = {0}_counter_s{2};", n, seq + 1, seq + 2),
            format!("{0}_counter_s{1} = {0}_counter_s{2};", n, seq + 1, seq + 2),
        ]);
        cg.end_if()?;

        cg.comment("Counter was updated last cycle (there was R/W conflict)");
        cg.start_else_if(vec![
            format!("(reg_{0}_bitmap_idx_s{1} == reg_{0}_bitmap_idx_s{2})", n, seq, seq + 2),
            format!("&& reg_{}_addr_conflict_s{}_s{}", n, seq + 2, seq),
        ]);
        cg.emit([
            format!("{0}_counter_q_s{1} = reg_{0}_counter_s{2};", n, seq + 1, seq + 2),
            format!("{0}_counter_s{1} = reg_{0}_counter_s{2};", n, seq + 1, seq + 2),
        ]);
        cg.end_else_if()?;
        cg.comment([
            "Fallthrough, defaults to:".to_string(),
            format!("counter_{0}_q for {0}_counter_q_s{1}", n, seq + 1),
            format!("reg_{0}_counter_s{1} for {0}_counter_s{1}", n, seq + 1),
        ]);
        cg.newline();
        Ok(())
    }

    fn emit_index_comb(&self, ctx: &LevelCtx<'_>, is_leaf: bool, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let u = self.u();
        let seq = ctx.start_cycle() + self.b() - 1;

        cg.block_comment([
            format!("Stage {}: Compute the L{} bitmap index and postop", seq + 1, self.id),
            format!("bitmap, and read the corresponding L{} counter.", self.id),
        ]);

        cg.comment(format!("L{} bitmap changes?", self.id));
        let changes = format!("{}_bitmap_changes_s{}_s{}", n, seq + 2 + u, seq + 1);
        let changes_rhs = if self.id == 1 {
            vec![
                "(".to_string(),
                format!("reg_valid_s[{0}] && (reg_is_enque_s[{0}] ||", seq + 1),
                format!("                   !{}_counter_non_zero_s{}));", n, seq + 2),
            ]
        } else {
            vec![
                "(".to_string(),
                format!("reg_{}_addr_conflict_s{}_s{} &&", n, seq + 1 + u, seq),
                format!("(reg_is_enque_s[{}] || !{}_counter_non_zero_s{}));", seq + 1 + u, n, seq + 2 + u),
            ]
        };
        cg.align_assignment(&changes, changes_rhs, Assign::Blocking, true);
        cg.newline();

        cg.comment(format!("Compute L{} bitmap idx and postop", self.id));
        let term = if self.id == 1 { "l1_bitmap".to_string() } else { format!("reg_{}_bitmap_s[{}]", n, seq) };
        let idx = format!("{}_bitmap_idx_s{}", n, seq + 1);
        let empty = format!("{}_bitmap_empty_s{}", n, seq + 1);
        let onehot = format!("{}_bitmap_idx_onehot_s{}", n, seq + 1);
        let postop = format!("{}_bitmap_postop_s{}", n, seq + 1);

        // Sources, nearest in-flight update first: the op one stage ahead (memory-backed counters only), the op in
        // the write-back stage, then the fetched bitmap.
        let mut conditions = Vec::new();
        if self.sram_counters {
            conditions.push(format!("reg_{}_addr_conflict_s{}_s{}", n, seq + 1, seq));
        }
        conditions.push(changes.clone());
        let sources = |f: &dyn Fn(usize) -> Lines| -> Vec<Lines> {
            let mut values = Vec::new();
            if self.sram_counters {
                values.push(f(1));
            }
            values.push(f(1 + u));
            values.push(f(0));
            values
        };
        let postop_sources = |op: &str| -> Vec<Lines> {
            let mut values = Vec::new();
            if self.sram_counters {
                values.push(vec![format!("{} {}", onehot, op), format!("reg_{}_bitmap_postop_s{}", n, seq + 1)].into());
            }
            values.push(vec![format!("{} {}", onehot, op), format!("reg_{}_bitmap_postop_s{}", n, seq + 1 + u)].into());
            values.push(vec![format!("{} {}", onehot, op), term.clone()].into());
            values
        };

        cg.start_switch(&format!("reg_op_type_s[{}]", seq));
        for (case, end) in [("MAX", "msb"), ("MIN", "lsb")] {
            cg.start_case(&format!("HEAP_OP_DEQUE_{}", case));
            let ffs = |port: String| sources(&|j| format!("ffs_{}_inst_{}[{}]", n, port, j).into());
            cg.align_ternary(&idx, &conditions, ffs(end.to_string()), Assign::Blocking, TernaryLayout::BROKEN)?;
            cg.newline();
            cg.align_ternary(&empty, &conditions, ffs("zero".to_string()), Assign::Blocking, TernaryLayout::BROKEN)?;
            cg.newline();
            let onehots = ffs(format!("{}_onehot", end));
            cg.align_ternary(&onehot, &conditions, onehots, Assign::Blocking, TernaryLayout::BROKEN)?;
            cg.newline();
            cg.align_ternary(&postop, &conditions, postop_sources("^"), Assign::Blocking, TernaryLayout::BROKEN)?;
            cg.end_case()?;
        }

        cg.comment("HEAP_OP_ENQUE");
        cg.start_case("default");
        let levels = ctx.config().num_bitmap_levels();
        let upper = format!("({} * HEAP_LOG_BITMAP_WIDTH) - 1", levels - self.id + 1);
        let lower = if is_leaf { "0".to_string() } else { format!("({} * HEAP_LOG_BITMAP_WIDTH)", levels - self.id) };
        cg.emit([
            format!("{} = 0;", empty),
            format!("{} = (reg_priority_s[{}][(", idx, seq),
            format!("{}{})", CodeGen::tab(2), upper),
            format!("{}: {}]);", CodeGen::tab(2), lower),
        ]);
        cg.newline();
        cg.emit(format!("{} = (1 << {});", onehot, idx));
        cg.align_ternary(&postop, &conditions, postop_sources("|"), Assign::Blocking, TernaryLayout::BROKEN)?;
        cg.end_case()?;
        cg.end_switch()?;

        let valid_and = if self.id == 1 { format!("reg_valid_s[{}] && ", seq + 1) } else { String::new() };
        if self.sram_counters {
            cg.comment([
                "Compute the read carry direction. If the active".to_string(),
                format!("op in Stage {} is of the same type, carry up.", seq + 3),
            ]);
            cg.start_if(vec![
                format!("!reg_is_enque_s[{}] &&", seq),
                format!("{}{}_counter_non_zero_s{} &&", valid_and, n, seq + 3),
                format!("reg_{}_addr_conflict_s{}_s{} &&", n, seq + 2, seq),
                format!("(reg_op_type_s[{}] == reg_op_type_s[{}])", seq, seq + 2),
            ]);
            cg.emit(format!("rcd_s{} = READ_CARRY_UP;", seq + 1));
            cg.newline();
            cg.comment([
                format!("Special case: The active op in Stage {} is also", seq + 2),
                "of the same type, which means that it's bound".to_string(),
                "to carry right; here, we do the same.".to_string(),
            ]);
            cg.start_if(vec![
                format!("(reg_op_type_s[{}] == reg_op_type_s[{}]) &&", seq, seq + 1),
                conditions[0].clone(),
            ]);
            cg.emit(format!("rcd_s{} = READ_CARRY_RIGHT;", seq + 1));
            cg.end_if()?;
            cg.end_if()?;
            cg.comment("Fallthrough: default to carry down");
            cg.newline();

            cg.comment(format!("Read the L{} counter", self.id));
            cg.emit(format!("counter_{}_rden = reg_valid_s[{}];", n, seq));
            cg.align_assignment(
                &format!("counter_{}_rdaddress", n),
                vec![format!("{{reg_{}_addr_s[{}],", n, seq), format!("{}}};", idx)],
                Assign::Blocking,
                false,
            );
        } else {
            cg.comment([
                "Compute the read carry direction. If the".to_string(),
                format!("active op in Stage {} is of the same type", seq + 2),
                "or the bitmap is empty, carry right.".to_string(),
            ]);
            let align_to = format!("({} || (", empty);
            cg.start_if(vec![
                format!("!reg_is_enque_s[{}] &&", seq),
                format!("{}{}_counter_non_zero_s{} &&", valid_and, n, seq + 2),
                format!("{}reg_op_type_s[{}] ==", align_to, seq),
                format!("{}reg_op_type_s[{}]))", " ".repeat(align_to.len()), seq + 1),
            ]);
            cg.emit(format!("rcd_s{} = READ_CARRY_RIGHT;", seq + 1));
            cg.end_if()?;
            cg.comment("Fallthrough: default to carry down");
            cg.newline();
        }
        Ok(())
    }

    fn emit_bitmap_delay_comb(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let seq = ctx.start_cycle() - 1;
        let end = ctx.end_cycle();

        cg.block_comment(format!("Stage {}: NOOP, read delay for L{} bitmap.", seq + 1, self.id));
        cg.comment(format!("L{} bitmap updated this cycle, so output is stale", self.id));
        cg.start_if(format!("reg_{}_addr_conflict_s{}_s{}", n, end - 1, seq));
        cg.emit(format!("{0}_bitmap_s{1} = bm_{0}_data;", n, seq + 1));
        cg.end_if()?;
        cg.comment(format!("L{} bitmap was updated last cycle (R/W conflict)", self.id));
        cg.start_else_if(format!("reg_{}_addr_conflict_s{}_s{}", n, end, seq));
        cg.emit(format!("{0}_bitmap_s{1} = bm_{0}_data_r;", n, seq + 1));
        cg.end_else_if()?;
        cg.comment(format!("Fallthrough: default to bm_{}_q", n));
        cg.newline();
        Ok(())
    }

    fn shift_ancestors(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen, cycle: usize) {
        ctx.shift_per_level(cg, "addr", cycle, |depth| depth <= self.id);
        ctx.shift_per_level(cg, "bitmap", cycle, |depth| depth < self.id);
    }

    fn emit_debug(cg: &mut CodeGen, cycle: usize, lines: Vec<String>) -> Result<(), GenerateError> {
        cg.start_ifdef("DEBUG");
        cg.start_if(format!("reg_valid_s[{}]", cycle - 1));
        cg.emit("$display(");
        cg.emit_offset(lines, 4);
        cg.end_if()?;
        cg.end_ifdef()?;
        Ok(())
    }

    fn emit_write_back_seq(&self, ctx: &LevelCtx<'_>, next: &Level, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let cycle = ctx.end_cycle();
        let is_leaf = next.is_priority_bucket();
        let next_name = next.name();
        let reg_idx = format!("reg_{}_bitmap_idx_s{}", n, cycle - 1);

        cg.block_comment(self.write_back_comment(cycle, is_leaf));
        let mut signals = ctx.primary_signals(cycle);
        if is_leaf {
            signals = signals.with("reg_priority_s", format!("priority_s{}", cycle));
        }
        signals.emit(cg);

        let mut blank = false;
        if self.id > 1 {
            let bitmap = if self.sram_bitmap { format!("bm_{}_data", n) } else { format!("{}_bitmap_s{}", n, cycle) };
            cg.emit(format!("reg_{}_bitmap_s[{}] <= {};", n, cycle, bitmap));
            self.shift_ancestors(ctx, cg, cycle);
            blank = true;
        }
        if !is_leaf {
            let next_addr = format!("reg_{}_addr_s[{}]", next_name, cycle);
            if self.id > 1 {
                cg.emit(format!("{} <= {{reg_{}_addr_s[{}], {}}};", next_addr, n, cycle - 1, reg_idx));
            } else {
                cg.emit(format!("{} <= {};", next_addr, reg_idx));
            }
            blank = true;
        }
        if blank {
            cg.newline();
        }

        cg.emit(format!("reg_{0}_counter_s{1} <= {0}_counter_s{1};", n, cycle));
        let mut blank = false;
        if self.sram_counters {
            cg.emit(format!("reg_{}_bitmap_idx_s{} <= {};", n, cycle, reg_idx));
            blank = true;
        }
        if is_leaf {
            let rc = if self.sram_counters { "rc_" } else { "" };
            cg.emit([
                format!("reg_old_{0}_counter_s{1} <= reg_{0}_counter_{3}s{2};", n, cycle, cycle - 1, rc),
                format!("reg_{0}_counter_non_zero_s{1} <= {0}_counter_non_zero_s{1};", n, cycle),
            ]);
            blank = true;
        }
        if blank {
            cg.newline();
        }
        cg.emit(BitmapWindow::new(next_name.clone(), cycle).register());
        cg.newline();

        let (reg_bitmap, reg_counters) = (!self.sram_bitmap, !self.sram_counters);
        if reg_bitmap || reg_counters {
            let what = match (reg_bitmap, reg_counters) {
                (true, true) => "bitmap and counter",
                (true, false) => "bitmap",
                _ => "counter",
            };
            cg.comment(format!("Write-back L{} {}", self.id, what));
            cg.start_if(format!("reg_valid_s[{}]", cycle - 1));
            if reg_bitmap {
                let lhs = if self.id == 1 {
                    "l1_bitmap".to_string()
                } else {
                    format!("{0}_bitmaps[reg_{0}_addr_s[{1}]]", n, cycle - 1)
                };
                cg.emit(format!("{} <= {}_bitmap_s{};", lhs, n, cycle));
            }
            if reg_counters {
                cg.emit(format!("{0}_counters[{1}] <= {0}_counter_s{2};", n, reg_idx, cycle));
            }
            cg.end_if()?;
            cg.newline();
        }

        if next.as_bitmap().map_or(false, |bitmap| !bitmap.sram_bitmap) {
            cg.comment(format!("Forward L{} bitmap updates", self.id + 1));
            cg.align_ternary(
                &format!("reg_{}_bitmap_s[{}]", next_name, cycle),
                &[format!("{}_addr_conflict_s{}_s{}", next_name, next.end_cycle(), cycle)],
                vec![
                    format!("{}_bitmap_s{}", next_name, next.end_cycle()).into(),
                    format!("{}_bitmaps[{}]", next_name, reg_idx).into(),
                ],
                Assign::NonBlocking,
                TernaryLayout::BROKEN_SAME_LINE,
            )?;
            cg.newline();
        }

        let tags = ctx.lp_tags(cycle);
        let lines = if self.id == 1 {
            vec![
                format!("\"[BBQ] At S{} ({}op: %s), updating L1 counter (L1_idx = %0d) to %0d\",", cycle, tags.id_str),
                format!(
                    "{}reg_op_type_s[{}].name, {}, {}_counter_s{}[WATERLEVEL_IDX-1:0]);",
                    tags.id_val,
                    cycle - 1,
                    reg_idx,
                    n,
                    cycle
                ),
            ]
        } else {
            vec![
                format!(
                    "\"[BBQ] At S{0} ({1}op: %s), updating L{2} counter (L{2}_addr, L{2}_idx) \",",
                    cycle, tags.id_str, self.id
                ),
                format!(
                    "{0}reg_op_type_s[{1}].name, \"= (%0d, %0d) to %0d\", reg_{2}_addr_s[{1}],",
                    tags.id_val,
                    cycle - 1,
                    n
                ),
                format!("{}, {}_counter_s{}[WATERLEVEL_IDX-1:0]);", reg_idx, n, cycle),
            ]
        };
        Self::emit_debug(cg, cycle, lines)?;
        cg.newline();
        Ok(())
    }

    fn emit_counter_delay_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let cycle = ctx.end_cycle() - 1;

        cg.block_comment(format!("Stage {}: NOOP, read delay for L{} counter.", cycle, self.id));
        ctx.primary_signals(cycle).emit(cg);
        self.shift_ancestors(ctx, cg, cycle);
        cg.emit(BitmapWindow::new(n.clone(), cycle).shift_from(&BitmapWindow::new(n.clone(), cycle - 1)));
        cg.newline();

        let rdvalid = format!("reg_{}_counter_rdvalid_r1_s{}", n, cycle - 1);
        let fetched = || -> Vec<Lines> {
            vec![format!("{}_counter_q_s{}", n, cycle).into(), format!("{}_counter_s{}", n, cycle).into()]
        };
        let carried = format!("reg_{}_counter_rc_s{}", n, cycle);

        cg.align_ternary(
            &format!("reg_{}_counter_s{}", n, cycle),
            &[&rdvalid],
            fetched(),
            Assign::NonBlocking,
            TernaryLayout::INLINE_SAME_LINE,
        )?;
        cg.start_switch(&format!("rcd_s{}", cycle));
        cg.start_case("READ_CARRY_DOWN");
        cg.emit(
            ["bitmap_idx_s", "bitmap_postop_s", "bitmap_idx_onehot_s"]
                .map(|what| format!("reg_{0}_{1}{2} <= reg_{0}_{1}{3};", n, what, cycle, cycle - 1)),
        );
        cg.newline();
        cg.align_ternary(&carried, &[&rdvalid], fetched(), Assign::NonBlocking, TernaryLayout::INLINE_SAME_LINE)?;
        cg.end_case()?;
        cg.start_case("READ_CARRY_RIGHT");
        cg.emit(format!("{} <= {}_counter_s{};", carried, n, cycle + 1));
        cg.end_case()?;
        cg.emit("default: ;");
        cg.end_switch()?;
        cg.newline();

        if self.id > 1 {
            let data = if self.sram_bitmap { format!("bm_{}_data", n) } else { format!("{}_bitmap_s{}", n, cycle + 1) };
            cg.comment(format!("Forward L{} bitmap updates", self.id));
            cg.align_ternary(
                &format!("reg_{}_bitmap_s[{}]", n, cycle),
                &[format!("reg_{}_addr_conflict_s{}_s{}", n, cycle, cycle - 1)],
                vec![data.into(), format!("reg_{}_bitmap_s[{}]", n, cycle - 1).into()],
                Assign::NonBlocking,
                TernaryLayout::BROKEN_SAME_LINE,
            )?;
            cg.newline();
        }

        let tags = ctx.lp_tags(cycle);
        Self::emit_debug(
            cg,
            cycle,
            vec![
                format!("\"[BBQ] At S{} ({}op: %s) for (L{} addr = %0d),\",", cycle, tags.id_str, self.id),
                format!("{0}reg_op_type_s[{1}].name, reg_{2}_addr_s[{1}],", tags.id_val, cycle - 1, n),
                format!("\" RCD is %s\", rcd_s{}.name);", cycle),
            ],
        )?;
        cg.newline();
        Ok(())
    }

    fn emit_index_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let cycle = ctx.start_cycle() + self.b();

        cg.block_comment([
            format!("Stage {}: Compute the L{} bitmap index and postop", cycle, self.id),
            format!("bitmap, and read the corresponding L{} counter.", self.id),
        ]);
        ctx.primary_signals(cycle).emit(cg);
        self.shift_ancestors(ctx, cg, cycle);
        if self.id > 1 {
            cg.emit(BitmapWindow::new(n.clone(), cycle).shift_from(&BitmapWindow::new(n.clone(), cycle - 1)));
            cg.newline();
        }

        let rdvalid = format!("reg_{}_counter_rdvalid_r1_s{}", n, cycle);
        if self.sram_counters {
            cg.emit(format!("{} <= 0;", rdvalid));
        } else {
            cg.emit(format!("reg_{}_bitmap_empty_s{} <= 0;", n, cycle));
        }
        cg.newline();

        cg.start_switch(&format!("rcd_s{}", cycle));
        cg.start_case("READ_CARRY_DOWN");
        cg.emit(
            ["bitmap_idx_s", "bitmap_empty_s", "bitmap_postop_s", "bitmap_idx_onehot_s"]
                .map(|what| format!("reg_{0}_{1}{2} <= {0}_{1}{2};", n, what, cycle)),
        );
        cg.newline();
        if self.sram_counters {
            cg.emit(format!("{} <= (!{}_bitmap_empty_s{});", rdvalid, n, cycle));
        } else {
            let guard = if self.id == 1 {
                format!("(reg_valid_s[{}] &&", cycle)
            } else {
                format!("reg_valid_s[{0}] && reg_{1}_addr_conflict_s{0}_s{2} &&", cycle, n, cycle - 1)
            };
            cg.align_assignment(
                &format!("reg_{}_counter_s{}", n, cycle),
                vec![
                    "(".to_string(),
                    guard,
                    format!("{0}({1}_bitmap_idx_s{2} == reg_{1}_bitmap_idx_s{2})) ?", CodeGen::tab(1), n, cycle),
                    format!("{0}{1}_counter_s{2} : {1}_counters[{1}_bitmap_idx_s{3}]);", CodeGen::tab(1), n, cycle + 1, cycle),
                ],
                Assign::NonBlocking,
                true,
            );
        }
        cg.end_case()?;

        if self.sram_counters {
            cg.start_case("READ_CARRY_UP");
            cg.emit([
                format!("reg_{}_bitmap_empty_s{} <= 0;", n, cycle),
                format!("reg_{0}_bitmap_idx_s{1} <= reg_{0}_bitmap_idx_s{2};", n, cycle, cycle + 1),
                format!("reg_{0}_bitmap_idx_onehot_s{1} <= reg_{0}_bitmap_idx_onehot_s{2};", n, cycle, cycle + 1),
            ]);
            cg.newline();
            cg.start_if(format!("!reg_{}_addr_conflict_s{}_s{}", n, cycle, cycle - 1));
            cg.emit([
                format!("reg_{}_bitmap_postop_s{} <= (", n, cycle),
                format!("{}reg_{}_bitmap_postop_s{});", CodeGen::tab(1), n, cycle + 1),
            ]);
            cg.end_if()?;
            cg.end_case()?;
        } else {
            cg.start_case("READ_CARRY_RIGHT");
            cg.emit(format!("reg_{0}_counter_s{1} <= {0}_counter_s{2};", n, cycle, cycle + 1));
            cg.end_case()?;
        }
        cg.emit("default: ;");
        cg.end_switch()?;
        cg.newline();

        if self.id > 1 {
            let end = ctx.end_cycle();
            let data = if self.sram_bitmap { format!("bm_{}_data", n) } else { format!("{}_bitmap_s{}", n, end) };
            cg.comment(format!("Forward L{} bitmap updates", self.id));
            cg.align_ternary(
                &format!("reg_{}_bitmap_s[{}]", n, cycle),
                &[format!("reg_{}_addr_conflict_s{}_s{}", n, end - 1, cycle - 1)],
                vec![data.into(), format!("reg_{}_bitmap_s[{}]", n, cycle - 1).into()],
                Assign::NonBlocking,
                TernaryLayout::BROKEN_SAME_LINE,
            )?;
            cg.newline();
        }

        let tags = ctx.lp_tags(cycle);
        let lines = if self.id > 1 {
            vec![
                format!("\"[BBQ] At S{} ({}op: %s) for (L{} addr = %0d),\",", cycle, tags.id_str, self.id),
                format!("{0}reg_op_type_s[{1}].name, reg_{2}_addr_s[{1}],", tags.id_val, cycle - 1, n),
                format!("\" RCD is %s\", rcd_s{}.name);", cycle),
            ]
        } else {
            vec![
                format!("\"[BBQ] At S{} ({}op: %s),\",", cycle, tags.id_str),
                format!("{}reg_op_type_s[{}].name,", tags.id_val, cycle - 1),
                format!("\" RCD is %s\", rcd_s{}.name);", cycle),
            ]
        };
        Self::emit_debug(cg, cycle, lines)?;
        cg.newline();
        Ok(())
    }

    fn emit_bitmap_delay_seq(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let cycle = ctx.start_cycle();

        cg.block_comment(format!("Stage {}: NOOP, read delay for L{} bitmap.", cycle, self.id));
        ctx.primary_signals(cycle).emit(cg);
        cg.emit(format!("reg_{0}_bitmap_s[{1}] <= {0}_bitmap_s{1};", n, cycle));
        self.shift_ancestors(ctx, cg, cycle);
        if self.id > 1 {
            cg.emit(BitmapWindow::new(n.clone(), cycle).shift_from(&BitmapWindow::new(n.clone(), cycle - 1)));
            cg.newline();
        }

        let tags = ctx.lp_tags(cycle);
        Self::emit_debug(
            cg,
            cycle,
            vec![
                format!("\"[BBQ] At S{} ({}op: %s) for (L{} addr = %0d)\",", cycle, tags.id_str, self.id),
                format!("{0}reg_op_type_s[{1}].name, reg_{2}_addr_s[{1}]);", tags.id_val, cycle - 1, n),
            ],
        )?;
        cg.newline();
        Ok(())
    }
}

impl Stage for BitmapLevel {
    fn name(&self) -> String { BitmapLevel::name(self) }

    fn latency(&self) -> usize { 1 + self.b() + self.u() }

    fn declare_stage_state(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let next = ctx.next()?;
        let is_leaf = next.is_priority_bucket();
        let idx_t = "logic [HEAP_LOG_BITMAP_WIDTH-1:0]";
        let mut cycle = ctx.start_cycle();

        let declare_regs = |cg: &mut CodeGen, window: BitmapWindow| {
            for reg in window.regs() {
                cg.align_defs(&[("logic", format!("{};", reg))]);
            }
        };

        if self.sram_bitmap {
            cg.comment(format!("Stage {} metadata", cycle));
            cg.align_defs(&[("bitmap_t", format!("{}_bitmap_s{};", n, cycle))]);
            declare_regs(cg, BitmapWindow::new(n.clone(), cycle));
            cg.newline();
            cycle += 1;
        }

        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[
            ("read_carry_direction_t", format!("rcd_s{};", cycle)),
            (idx_t, format!("{}_bitmap_idx_s{};", n, cycle)),
            ("logic", format!("{}_bitmap_empty_s{};", n, cycle)),
            ("bitmap_t", format!("{}_bitmap_postop_s{};", n, cycle)),
            ("bitmap_t", format!("{}_bitmap_idx_onehot_s{};", n, cycle)),
            ("logic", format!("{}_bitmap_changes_s{}_s{};", n, cycle + 1 + self.u(), cycle)),
        ]);
        if !self.sram_counters {
            cg.align_defs(&[("counter_t", format!("reg_{}_counter_s{};", n, cycle))]);
        }
        cg.align_defs(&[
            (idx_t, format!("reg_{}_bitmap_idx_s{};", n, cycle)),
            ("logic", format!("reg_{}_bitmap_empty_s{};", n, cycle)),
            ("bitmap_t", format!("reg_{}_bitmap_postop_s{};", n, cycle)),
            ("bitmap_t", format!("reg_{}_bitmap_idx_onehot_s{};", n, cycle)),
        ]);
        if self.sram_counters {
            cg.align_defs(&[("logic", format!("reg_{}_counter_rdvalid_r1_s{};", n, cycle))]);
        }
        if self.id > 1 {
            declare_regs(cg, BitmapWindow::new(n.clone(), cycle));
        }
        cg.newline();
        cycle += 1;

        if self.sram_counters {
            cg.comment(format!("Stage {} metadata", cycle));
            cg.align_defs(&[
                ("read_carry_direction_t", format!("rcd_s{};", cycle)),
                ("counter_t", format!("{}_counter_s{};", n, cycle)),
                ("counter_t", format!("{}_counter_q_s{};", n, cycle)),
                ("counter_t", format!("reg_{}_counter_s{};", n, cycle)),
                ("counter_t", format!("reg_{}_counter_rc_s{};", n, cycle)),
                (idx_t, format!("reg_{}_bitmap_idx_s{};", n, cycle)),
                ("bitmap_t", format!("reg_{}_bitmap_postop_s{};", n, cycle)),
                ("bitmap_t", format!("reg_{}_bitmap_idx_onehot_s{};", n, cycle)),
            ]);
            declare_regs(cg, BitmapWindow::new(n.clone(), cycle));
            cg.newline();
            cycle += 1;
        }

        let window = BitmapWindow::new(next.name(), cycle);
        cg.comment(format!("Stage {} metadata", cycle));
        if is_leaf {
            cg.align_defs(&[("heap_priority_t", format!("priority_s{};", cycle))]);
        }
        if !self.sram_bitmap {
            cg.align_defs(&[("bitmap_t", format!("{}_bitmap_s{};", n, cycle))]);
        }
        cg.align_defs(&[
            ("counter_t", format!("{}_counter_s{};", n, cycle)),
            ("logic", format!("{}_counter_non_zero_s{};", n, cycle)),
        ]);
        for wire in window.wires() {
            cg.align_defs(&[("logic", format!("{};", wire))]);
        }
        cg.align_defs(&[("counter_t", format!("reg_{}_counter_s{};", n, cycle))]);
        if self.sram_counters {
            cg.align_defs(&[(idx_t, format!("reg_{}_bitmap_idx_s{};", n, cycle))]);
        }
        if is_leaf {
            cg.align_defs(&[
                ("counter_t", format!("reg_old_{}_counter_s{};", n, cycle)),
                ("logic", format!("reg_{}_counter_non_zero_s{};", n, cycle)),
            ]);
        }
        declare_regs(cg, window);
        cg.newline();
        Ok(())
    }

    fn default_assigns(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let mut cycle = ctx.start_cycle();

        if self.sram_bitmap {
            cg.emit(format!("{0}_bitmap_s{1} = bm_{0}_q;", n, cycle));
            cycle += 1;
        }
        cg.emit(format!("rcd_s{} = READ_CARRY_DOWN;", cycle));
        cycle += 1;

        if self.sram_counters {
            cg.emit([
                format!("rcd_s{} = READ_CARRY_DOWN;", cycle),
                format!("{0}_counter_s{1} = reg_{0}_counter_s{1};", n, cycle),
                format!("{0}_counter_q_s{1} = counter_{0}_q;", n, cycle),
            ]);
            cycle += 1;
        }

        if ctx.is_leaf()? {
            if self.id == 1 {
                cg.emit(format!("priority_s{} = reg_{}_bitmap_idx_s{};", cycle, n, cycle - 1));
            } else {
                cg.emit(format!("priority_s{0} = {{reg_{1}_addr_s[{2}], reg_{1}_bitmap_idx_s{2}}};", cycle, n, cycle - 1));
            }
        }
        Ok(())
    }

    fn init_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let n = self.name();
        let seq = ctx.end_cycle() - 1;

        if self.sram_counters || self.sram_bitmap {
            cg.block_comment(self.write_back_comment(seq + 1, ctx.is_leaf()?));
        }

        if self.sram_counters {
            cg.comment(format!("Write L{} counter", self.id));
            cg.emit([
                format!("counter_{}_wren = reg_valid_s[{}];", n, seq),
                format!("counter_{0}_data = {0}_counter_s{1};", n, seq + 1),
            ]);
            cg.align_assignment(
                &format!("counter_{}_wraddress", n),
                vec![format!("{{reg_{}_addr_s[{}],", n, seq), format!("reg_{}_bitmap_idx_s{}}};", n, seq)],
                Assign::Blocking,
                false,
            );
        }

        if self.sram_bitmap {
            cg.comment(format!("Write L{} bitmap", self.id));
            cg.emit([format!("bm_{}_wren = reg_valid_s[{}];", n, seq), format!("bm_{0}_wraddress = reg_{0}_addr_s[{1}];", n, seq)]);
            self.emit_bitmap_update(cg, &format!("bm_{}_data", n), &format!("reg_{}_bitmap_s[{}]", n, seq), seq)?;
        }
        Ok(())
    }

    fn normal_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let next = ctx.next()?;
        self.emit_write_back_comb(ctx, next, cg)?;
        if self.sram_counters {
            self.emit_counter_delay_comb(ctx, cg)?;
        }
        self.emit_index_comb(ctx, next.is_priority_bucket(), cg)?;
        if self.sram_bitmap {
            self.emit_bitmap_delay_comb(ctx, cg)?;
        }
        Ok(())
    }

    fn commit_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let next = ctx.next()?;
        self.emit_write_back_seq(ctx, next, cg)?;
        if self.sram_counters {
            self.emit_counter_delay_seq(ctx, cg)?;
        }
        self.emit_index_seq(ctx, cg)?;
        if self.sram_bitmap {
            self.emit_bitmap_delay_seq(ctx, cg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::level::render_phase;

    #[test]
    fn placement_policy() {
        let l1 = BitmapLevel::new(1);
        let l2 = BitmapLevel::new(2);
        let l3 = BitmapLevel::new(3);
        assert_eq!((l1.sram_bitmap(), l1.sram_counters()), (false, false));
        assert_eq!((l2.sram_bitmap(), l2.sram_counters()), (false, true));
        assert_eq!((l3.sram_bitmap(), l3.sram_counters()), (true, true));
        assert_eq!([l1.latency(), l2.latency(), l3.latency()], [1, 2, 3]);
    }

    #[test]
    fn ffs_inputs() {
        let l1 = BitmapLevel::new(1).ffs_instances(2);
        assert_eq!(l1.len(), 2);
        assert_eq!(l1[0].input, "l1_bitmap");
        assert_eq!(l1[1].input, "reg_l1_bitmap_postop_s2");

        let l3 = BitmapLevel::new(3).ffs_instances(6);
        assert_eq!(l3.len(), 3);
        assert_eq!(l3[0].input, "reg_l3_bitmap_s[6]");
        assert_eq!(l3[2].input, "reg_l3_bitmap_postop_s8");
    }

    #[test]
    fn ffs_instantiation() {
        let inst = BitmapLevel::new(1).ffs_instances(2)[0].instantiation();
        let text = inst.to_string();
        assert!(text.starts_with("ffs #(\n    .WIDTH_LOG(HEAP_LOG_BITMAP_WIDTH)\n)\nffs_l1_inst0 (\n    .x(l1_bitmap),"));
        assert!(text.ends_with("    .zero(ffs_l1_inst_zero[0])\n);"));
    }

    // Three levels: L1 spans stages 2 to 3, L2 stages 4 to 6, L3 stages 7 to 10 and the PB stages 11 to 14.
    fn render(name: &str, phase: crate::level::Phase) -> String { render_phase(Config::new(3), name, phase) }

    #[test]
    fn memory_bitmap_read_is_forwarded() {
        let text = render("l3", Level::normal_phase_logic);
        let expected = "\
// L3 bitmap updated this cycle, so output is stale
if (reg_l3_addr_conflict_s9_s6) begin
    l3_bitmap_s7 = bm_l3_data;
end
// L3 bitmap was updated last cycle (R/W conflict)
else if (reg_l3_addr_conflict_s10_s6) begin
    l3_bitmap_s7 = bm_l3_data_r;
end
";
        assert!(text.contains(expected), "{}", text);
        assert!(text.contains("if (pb_addr_conflict_s14_s10) begin\n    pb_rdwr_conflict = 1;\n    pb_rden = 0;\nend\n"));
    }

    #[test]
    fn memory_counter_read_is_forwarded() {
        let text = render("l2", Level::normal_phase_logic);
        let expected = "\
if ((reg_l2_bitmap_idx_s4 == reg_l2_bitmap_idx_s5)
    && reg_l2_addr_conflict_s5_s4) begin
    l2_counter_q_s5 = l2_counter_s6;
    l2_counter_s5 = l2_counter_s6;
end
// Counter was updated last cycle (there was R/W conflict)
else if ((reg_l2_bitmap_idx_s4 == reg_l2_bitmap_idx_s6)
         && reg_l2_addr_conflict_s6_s4) begin
    l2_counter_q_s5 = reg_l2_counter_s6;
    l2_counter_s5 = reg_l2_counter_s6;
end
";
        assert!(text.contains(expected), "{}", text);
    }

    #[test]
    fn read_carry_direction() {
        let text = render("l2", Level::normal_phase_logic);
        let right = format!(
            "\
if (!reg_is_enque_s[4] &&
    l2_counter_non_zero_s6 &&
    reg_l2_addr_conflict_s5_s4 &&
    (reg_l2_bitmap_empty_s4 || (reg_op_type_s[4] ==
{}reg_op_type_s[5]))) begin
    rcd_s5 = READ_CARRY_RIGHT;
end
",
            " ".repeat(32)
        );
        assert!(text.contains(&right), "{}", text);

        let up = "\
if (!reg_is_enque_s[3] &&
    l2_counter_non_zero_s6 &&
    reg_l2_addr_conflict_s5_s3 &&
    (reg_op_type_s[3] == reg_op_type_s[5])) begin
    rcd_s4 = READ_CARRY_UP;
";
        assert!(text.contains(up), "{}", text);
        let special = "\
    if ((reg_op_type_s[3] == reg_op_type_s[4]) &&
        reg_l2_addr_conflict_s4_s3) begin
        rcd_s4 = READ_CARRY_RIGHT;
    end
end
";
        assert!(text.contains(special), "{}", text);
    }

    #[test]
    fn next_level_conflicts() {
        let l1 = render("l1", Level::normal_phase_logic);
        assert!(l1.contains(
            "l2_addr_conflict_s4_s3 = (\n    reg_valid_s[2] && reg_valid_s[3] &&\n    (reg_l1_bitmap_idx_s2 == reg_l2_addr_s[3]));\n"
        ));

        let l2 = render("l2", Level::normal_phase_logic);
        let expected = "\
l3_addr_conflict_s7_s6 = (
    reg_l2_addr_conflict_s6_s5
        && (reg_l2_bitmap_idx_s5 ==
            reg_l3_addr_s[6][HEAP_LOG_BITMAP_WIDTH-1:0]));
";
        assert!(l2.contains(expected), "{}", l2);
    }

    #[test]
    fn register_bitmap_updates_are_forwarded() {
        let l1 = render("l1", Level::commit_logic);
        assert!(l1.contains(
            "reg_l2_bitmap_s[3] <= (\n    l2_addr_conflict_s6_s3 ?\n    l2_bitmap_s6 : l2_bitmaps[reg_l1_bitmap_idx_s2]);\n"
        ));

        let l2 = render("l2", Level::commit_logic);
        assert!(l2.contains("reg_l2_bitmap_s[4] <= (\n    reg_l2_addr_conflict_s5_s3 ?\n    l2_bitmap_s6 : reg_l2_bitmap_s[3]);\n"));
        assert!(l2.contains("reg_l2_bitmap_s[5] <= (\n    reg_l2_addr_conflict_s5_s4 ?\n    l2_bitmap_s6 : reg_l2_bitmap_s[4]);\n"));
    }
}
