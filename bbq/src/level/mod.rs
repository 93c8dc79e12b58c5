//! Pipeline levels.
//!
//! A level owns a contiguous range of pipeline stages and emits the logic for those stages. Every level kind
//! implements the same per-phase contract ([`Stage`]); the pipeline stores levels in an arena and dispatches through
//! [`LevelKind`] without special-casing any kind by name.

mod bitmap;
mod hazard;
mod ingress;
mod pb;
mod steering;

pub use bitmap::{BitmapLevel, FfsInstance, MAX_FFS_INSTANCES, SRAM_BITMAP_DEPTH, SRAM_COUNTERS_DEPTH};
pub use hazard::{BitmapWindow, ConflictWindow, PbWindow, BITMAP_CONFLICT_WINDOW, PB_CONFLICT_WINDOW};
pub use ingress::Ingress;
pub use pb::PriorityBucket;
pub use steering::Steering;

use linked_hash_map::LinkedHashMap;

use crate::codegen::CodeGen;
use crate::config::Config;
use crate::pipeline::{Pipeline, TopologyError};
use crate::program::GenerateError;

/// Per-phase emission contract shared by every level kind.
///
/// Each phase writes the level's contribution to one section of the generated module. Phases that emit logic for
/// several stages emit them from the last stage backwards, matching the order of the enclosing `always` blocks.
pub trait Stage {
    /// Canonical name, used as a prefix of the level's signals.
    fn name(&self) -> String;

    /// Number of stages after the first one.
    fn latency(&self) -> usize;

    /// Declares the per-stage registers and wires.
    fn declare_stage_state(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError>;

    /// Assigns default values to the combinational signals owned by this level.
    fn default_assigns(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError>;

    /// Emits the logic driving memory write ports that are shared with the initialization sequencer.
    fn init_phase_logic(&self, _ctx: &LevelCtx<'_>, _cg: &mut CodeGen) -> Result<(), GenerateError> { Ok(()) }

    /// Emits the state-independent combinational logic.
    fn normal_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError>;

    /// Emits the registered updates.
    fn commit_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError>;
}

/// Level kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelKind {
    /// Admission control and occupancy tracking.
    Ingress(Ingress),

    /// Steers ops to their logical partition, replacing the top bitmap levels.
    Steering(Steering),

    /// One level of the bitmap tree.
    Bitmap(BitmapLevel),

    /// Priority buckets and the heap-entry linked lists.
    PriorityBucket(PriorityBucket),
}

impl LevelKind {
    fn stage(&self) -> &dyn Stage {
        match self {
            LevelKind::Ingress(ingress) => ingress,
            LevelKind::Steering(steering) => steering,
            LevelKind::Bitmap(bitmap) => bitmap,
            LevelKind::PriorityBucket(pb) => pb,
        }
    }
}

/// A level placed in the pipeline arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub(crate) index: usize,
    pub(crate) start_cycle: usize,
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
    pub(crate) kind: LevelKind,
}

impl Level {
    /// Position in the arena.
    pub fn index(&self) -> usize { self.index }

    /// First stage owned by this level.
    pub fn start_cycle(&self) -> usize { self.start_cycle }

    /// Last stage owned by this level.
    pub fn end_cycle(&self) -> usize { self.start_cycle + self.latency() }

    /// Index of the previous level.
    pub fn prev(&self) -> Option<usize> { self.prev }

    /// Index of the next level.
    pub fn next(&self) -> Option<usize> { self.next }

    /// Kind of the level.
    pub fn kind(&self) -> &LevelKind { &self.kind }

    /// Canonical name.
    pub fn name(&self) -> String { self.kind.stage().name() }

    /// Latency in cycles.
    pub fn latency(&self) -> usize { self.kind.stage().latency() }

    /// Returns the bitmap level, if this is one.
    pub fn as_bitmap(&self) -> Option<&BitmapLevel> {
        match &self.kind {
            LevelKind::Bitmap(bitmap) => Some(bitmap),
            _ => None,
        }
    }

    /// Returns `true` for the priority-bucket level.
    pub fn is_priority_bucket(&self) -> bool { matches!(self.kind, LevelKind::PriorityBucket(_)) }

    pub(crate) fn declare_stage_state(&self, pipeline: &Pipeline, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.kind.stage().declare_stage_state(&LevelCtx::new(pipeline, self), cg)
    }

    pub(crate) fn default_assigns(&self, pipeline: &Pipeline, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.kind.stage().default_assigns(&LevelCtx::new(pipeline, self), cg)
    }

    pub(crate) fn init_phase_logic(&self, pipeline: &Pipeline, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.kind.stage().init_phase_logic(&LevelCtx::new(pipeline, self), cg)
    }

    pub(crate) fn normal_phase_logic(&self, pipeline: &Pipeline, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.kind.stage().normal_phase_logic(&LevelCtx::new(pipeline, self), cg)
    }

    pub(crate) fn commit_logic(&self, pipeline: &Pipeline, cg: &mut CodeGen) -> Result<(), GenerateError> {
        self.kind.stage().commit_logic(&LevelCtx::new(pipeline, self), cg)
    }
}

/// A level viewed from its place in the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct LevelCtx<'a> {
    pipeline: &'a Pipeline,
    level: &'a Level,
}

impl<'a> LevelCtx<'a> {
    /// Creates new context.
    pub fn new(pipeline: &'a Pipeline, level: &'a Level) -> Self { Self { pipeline, level } }

    /// The enclosing pipeline.
    pub fn pipeline(&self) -> &'a Pipeline { self.pipeline }

    /// The generator configuration.
    pub fn config(&self) -> &'a Config { self.pipeline.config() }

    /// Whether the queue is logically partitioned.
    pub fn is_partitioned(&self) -> bool { self.config().is_partitioned() }

    /// First stage owned by this level.
    pub fn start_cycle(&self) -> usize { self.level.start_cycle() }

    /// Last stage owned by this level.
    pub fn end_cycle(&self) -> usize { self.level.end_cycle() }

    /// The next level.
    pub fn next(&self) -> Result<&'a Level, TopologyError> {
        self.level
            .next()
            .and_then(|index| self.pipeline.levels().get(index))
            .ok_or_else(|| TopologyError::MissingNext { level: self.level.name() })
    }

    /// The previous level.
    pub fn prev(&self) -> Result<&'a Level, TopologyError> {
        self.level
            .prev()
            .and_then(|index| self.pipeline.levels().get(index))
            .ok_or_else(|| TopologyError::MissingPrev { level: self.level.name() })
    }

    /// Whether the next level holds the priority buckets.
    pub fn is_leaf(&self) -> Result<bool, TopologyError> { Ok(self.next()?.is_priority_bucket()) }

    /// Primary pipeline signals to register at `cycle`.
    pub fn primary_signals(&self, cycle: usize) -> PrimarySignals {
        PrimarySignals::new(self.is_partitioned(), cycle)
    }

    /// Logical-partition annotations for `$display` traces of the op registered at `cycle - 1`.
    pub fn lp_tags(&self, cycle: usize) -> LpTags { LpTags::new(self.is_partitioned(), cycle) }

    /// Shifts `reg_<level>_<what>_s` from `cycle - 1` to `cycle` for every bitmap level of depth ≥ 2 accepted by
    /// `depth`.
    pub fn shift_per_level(&self, cg: &mut CodeGen, what: &str, cycle: usize, depth: impl Fn(usize) -> bool) {
        for level in self.pipeline.bitmap_levels().filter(|level| level.id() >= 2 && depth(level.id())) {
            cg.emit(format!("reg_{0}_{1}_s[{2}] <= reg_{0}_{1}_s[{3}];", level.name(), what, cycle, cycle - 1));
        }
    }
}

/// Primary signals carried by every pipeline stage, in emission order.
const PRIMARY_SIGNALS: [&str; 7] = [
    "reg_valid_s",
    "reg_he_data_s",
    "reg_op_type_s",
    "reg_is_enque_s",
    "reg_priority_s",
    "reg_is_deque_max_s",
    "reg_is_deque_min_s",
];

/// Registers the primary pipeline signals of one stage, by default from the previous stage.
#[derive(Debug, Clone)]
pub struct PrimarySignals {
    cycle: usize,
    values: LinkedHashMap<&'static str, String>,
}

impl PrimarySignals {
    /// Creates the default shift of every primary signal into `cycle`.
    pub fn new(partitioned: bool, cycle: usize) -> Self {
        let mut values = LinkedHashMap::new();
        for (i, signal) in PRIMARY_SIGNALS.iter().enumerate() {
            let _ = values.insert(*signal, format!("{}[{}]", signal, cycle - 1));
            if i == 0 && partitioned {
                let _ = values.insert("reg_bbq_id_s", format!("reg_bbq_id_s[{}]", cycle - 1));
            }
        }
        Self { cycle, values }
    }

    /// Overrides the value registered for `signal`.
    pub fn with(mut self, signal: &str, value: impl Into<String>) -> Self {
        if let Some(slot) = self.values.get_mut(signal) {
            *slot = value.into();
        }
        self
    }

    /// Emits the register updates followed by a blank line.
    pub fn emit(&self, cg: &mut CodeGen) {
        for (signal, value) in self.values.iter() {
            cg.emit(format!("{}[{}] <= {};", signal, self.cycle, value));
        }
        cg.newline();
    }
}

/// Fragments that annotate `$display` traces with the logical partition of an op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpTags {
    /// Format prefix for the logical ID.
    pub id_str: &'static str,
    /// Argument prefix for the logical ID.
    pub id_val: String,
    /// Qualifier of printed priorities.
    pub priority_str: &'static str,
    /// Mask applied to printed priorities.
    pub priority_val: &'static str,
}

impl LpTags {
    fn new(partitioned: bool, cycle: usize) -> Self {
        if partitioned {
            Self {
                id_str: "logical ID: %0d, ",
                id_val: format!("reg_bbq_id_s[{}], ", cycle - 1),
                priority_str: "relative ",
                priority_val: " & (HEAP_NUM_PRIORITIES_PER_LP - 1)",
            }
        } else {
            Self { id_str: "", id_val: String::new(), priority_str: "", priority_val: "" }
        }
    }
}

/// Emission phase of a placed level.
#[cfg(test)]
pub(crate) type Phase = fn(&Level, &Pipeline, &mut CodeGen) -> Result<(), GenerateError>;

/// Renders one phase of the level named `name` in the pipeline of `config`.
#[cfg(test)]
pub(crate) fn render_phase(config: Config, name: &str, phase: Phase) -> String {
    let pipeline = Pipeline::new(config).unwrap();
    let level = pipeline.levels().iter().find(|level| level.name() == name).unwrap();
    let mut cg = CodeGen::new();
    phase(level, &pipeline, &mut cg).unwrap();
    cg.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn primary_signals_with_override() {
        let mut cg = CodeGen::new();
        PrimarySignals::new(false, 3).with("reg_valid_s", "valid_s3").emit(&mut cg);
        let expected = "\
reg_valid_s[3] <= valid_s3;
reg_he_data_s[3] <= reg_he_data_s[2];
reg_op_type_s[3] <= reg_op_type_s[2];
reg_is_enque_s[3] <= reg_is_enque_s[2];
reg_priority_s[3] <= reg_priority_s[2];
reg_is_deque_max_s[3] <= reg_is_deque_max_s[2];
reg_is_deque_min_s[3] <= reg_is_deque_min_s[2];

";
        assert_eq!(cg.finish().unwrap(), expected);
    }

    #[test]
    fn primary_signals_carry_partition_id() {
        let mut cg = CodeGen::new();
        PrimarySignals::new(true, 5).emit(&mut cg);
        let out = cg.finish().unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "reg_valid_s[5] <= reg_valid_s[4];");
        assert_eq!(lines[1], "reg_bbq_id_s[5] <= reg_bbq_id_s[4];");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn lp_tags() {
        assert_eq!(LpTags::new(false, 4).id_val, "");
        let tags = LpTags::new(true, 4);
        assert_eq!(tags.id_val, "reg_bbq_id_s[3], ");
        assert_eq!(tags.priority_str, "relative ");
    }
}
