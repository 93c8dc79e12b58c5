//! Ingress: admission control and occupancy tracking.

use crate::codegen::{Assign, CodeGen, TernaryLayout};
use crate::level::{LevelCtx, Stage};
use crate::program::GenerateError;

/// Ingress level.
///
/// Rejects dequeues from an empty queue and enqueues when the free list is empty, and keeps the (per-partition)
/// occupancy counter up to date.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ingress;

impl Ingress {
    /// Creates new ingress level.
    pub fn new() -> Self { Self }
}

impl Stage for Ingress {
    fn name(&self) -> String { "ingress".to_string() }

    fn latency(&self) -> usize { 0 }

    fn declare_stage_state(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        cg.comment(format!("Stage {} metadata", cycle));
        cg.align_defs(&[
            ("logic", format!("valid_s{};", cycle)),
            ("counter_t", format!("old_occupancy_s{};", cycle)),
            ("counter_t", format!("new_occupancy_s{};", cycle)),
            ("counter_t", format!("reg_old_occupancy_s{};", cycle)),
            ("counter_t", format!("reg_new_occupancy_s{};", cycle)),
        ]);
        cg.newline();
        Ok(())
    }

    fn default_assigns(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.start_cycle();
        cg.emit(format!("valid_s{} = 0;", cycle));
        if ctx.is_partitioned() {
            cg.emit(format!("old_occupancy_s{} = occupancy[reg_bbq_id_s[{}]];", cycle, cycle - 1));
        } else {
            cg.emit(format!("old_occupancy_s{} = occupancy;", cycle));
        }
        Ok(())
    }

    fn normal_phase_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let seq = ctx.start_cycle() - 1;
        let cycle = seq + 1;
        let old = format!("old_occupancy_s{}", cycle);

        cg.block_comment([
            format!("Stage {}: Determine operation validity. Disables the pipeline", cycle),
            "stage if the BBQ is empty (deques), or FL is empty (enques).".to_string(),
        ]);
        cg.start_if(format!("reg_valid_s[{}]", seq));
        cg.align_assignment(
            &format!("valid_s{}", cycle),
            vec![
                "(".to_string(),
                format!("(reg_is_enque_s[{}] && !fl_empty) ||", seq),
                format!("(!reg_is_enque_s[{}] && ({}[0] |", seq, old),
                format!("                        {}[WATERLEVEL_IDX])));", old),
            ],
            Assign::Blocking,
            true,
        );
        cg.end_if()?;

        cg.comment("Update the occupancy counter");
        cg.align_ternary(
            &format!("new_occupancy_s{}[WATERLEVEL_IDX-1:0]", cycle),
            &[format!("reg_is_enque_s[{}]", seq)],
            vec![
                format!("({}[WATERLEVEL_IDX-1:0] + 1)", old).into(),
                format!("({}[WATERLEVEL_IDX-1:0] - 1)", old).into(),
            ],
            Assign::Blocking,
            TernaryLayout::BROKEN,
        )?;
        cg.newline();
        cg.align_assignment(
            &format!("new_occupancy_s{}[WATERLEVEL_IDX]", cycle),
            vec![
                format!("(reg_is_enque_s[{}] ?", seq),
                format!("({0}[WATERLEVEL_IDX] | {0}[0]) :", old),
                format!("((|{0}[WATERLEVEL_IDX-1:2]) | (&{0}[1:0])));", old),
            ],
            Assign::Blocking,
            true,
        );
        cg.newline();

        cg.comment("If enqueing, also deque the free list");
        cg.start_if(format!("valid_s{} && reg_is_enque_s[{}]", cycle, seq));
        cg.emit("fl_rdreq = 1;");
        cg.end_if()?;
        cg.newline();
        Ok(())
    }

    fn commit_logic(&self, ctx: &LevelCtx<'_>, cg: &mut CodeGen) -> Result<(), GenerateError> {
        let cycle = ctx.end_cycle();
        cg.block_comment([
            format!("Stage {}: Determine operation validity. Disables the pipeline", cycle),
            "stage if the BBQ is empty (deques) or FL is empty (enqueues).".to_string(),
        ]);
        ctx.primary_signals(cycle).with("reg_valid_s", format!("valid_s{}", cycle)).emit(cg);

        cg.emit([
            format!("reg_old_occupancy_s{0} <= old_occupancy_s{0};", cycle),
            format!("reg_new_occupancy_s{0} <= new_occupancy_s{0};", cycle),
        ]);
        cg.newline();

        let occupancy =
            if ctx.is_partitioned() { format!("occupancy[reg_bbq_id_s[{}]]", cycle - 1) } else { "occupancy".to_string() };
        cg.start_if(format!("valid_s{}", cycle));
        cg.emit(format!("{} <= new_occupancy_s{};", occupancy, cycle));
        cg.end_if()?;
        cg.newline();

        let tags = ctx.lp_tags(cycle);
        cg.start_ifdef("DEBUG");
        cg.start_if(format!("reg_valid_s[{}] && !valid_s{}", cycle - 1, cycle));
        cg.emit("$display(");
        cg.emit_offset(
            [
                format!("\"[BBQ] At S{0} ({1}op: %s), rejected at Stage {2}->{0}\",", cycle, tags.id_str, cycle - 1),
                format!("{}reg_op_type_s[{}].name);", tags.id_val, cycle - 1),
            ],
            4,
        );
        cg.end_if()?;

        cg.start_if(format!("valid_s{}", cycle));
        cg.emit("$display(");
        cg.emit_offset(
            [
                format!("\"[BBQ] At S{} ({}op: %s), updating occupancy\",", cycle, tags.id_str),
                format!("{}reg_op_type_s[{}].name, \" from %0d to %0d\",", tags.id_val, cycle - 1),
                format!("old_occupancy_s{}[WATERLEVEL_IDX-1:0],", cycle),
                format!("new_occupancy_s{}[WATERLEVEL_IDX-1:0]);", cycle),
            ],
            4,
        );
        cg.end_if()?;
        cg.end_ifdef()?;
        cg.newline();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::Config;
    use crate::level::{render_phase, Level};

    #[test]
    fn admission_checks_occupancy_and_free_list() {
        let text = render_phase(Config::new(1), "ingress", Level::normal_phase_logic);
        let expected = format!(
            "\
if (reg_valid_s[0]) begin
    valid_s1 = (
        (reg_is_enque_s[0] && !fl_empty) ||
        (!reg_is_enque_s[0] && (old_occupancy_s1[0] |
{}old_occupancy_s1[WATERLEVEL_IDX])));
end
",
            " ".repeat(32)
        );
        assert!(text.contains(&expected), "{}", text);
        assert!(text.contains("if (valid_s1 && reg_is_enque_s[0]) begin\n    fl_rdreq = 1;\nend\n"));
    }

    #[test]
    fn occupancy_counter_update() {
        let text = render_phase(Config::new(1), "ingress", Level::normal_phase_logic);
        let pad = " ".repeat("    reg_is_enque_s[0] ?".len() + 1);
        assert!(text.contains(&format!(
            "new_occupancy_s1[WATERLEVEL_IDX-1:0] = (\n    reg_is_enque_s[0] ? (old_occupancy_s1[WATERLEVEL_IDX-1:0] + 1) :\n{}(old_occupancy_s1[WATERLEVEL_IDX-1:0] - 1));\n",
            pad
        )));
        assert!(text.contains(
            "\
new_occupancy_s1[WATERLEVEL_IDX] = (reg_is_enque_s[0] ?
    (old_occupancy_s1[WATERLEVEL_IDX] | old_occupancy_s1[0]) :
    ((|old_occupancy_s1[WATERLEVEL_IDX-1:2]) | (&old_occupancy_s1[1:0])));
"
        ));

        let commit = render_phase(Config::new(1), "ingress", Level::commit_logic);
        assert!(commit.contains("reg_valid_s[1] <= valid_s1;"));
        assert!(commit.contains("if (valid_s1) begin\n    occupancy <= new_occupancy_s1;\nend\n"));
    }

    #[test]
    fn partitioned_occupancy_is_indexed() {
        let config = || Config::new(2).with_bitmap_width(2).with_num_lps(4);
        assert_eq!(
            render_phase(config(), "ingress", Level::default_assigns),
            "valid_s1 = 0;\nold_occupancy_s1 = occupancy[reg_bbq_id_s[0]];\n"
        );
        let commit = render_phase(config(), "ingress", Level::commit_logic);
        assert!(commit.contains("    occupancy[reg_bbq_id_s[0]] <= new_occupancy_s1;\n"));
        assert!(commit.contains("reg_bbq_id_s[1] <= reg_bbq_id_s[0];"));
    }
}
