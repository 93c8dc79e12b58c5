//! Structured emission of SystemVerilog text.
//!
//! [`CodeGen`] is a text accumulator with an indent level and a stack of open constructs. Every construct that is
//! opened must be closed by the matching closer; closing the wrong construct is reported as a [`CodegenError`] rather
//! than producing unbalanced text.

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::utils::clog2;

/// Number of spaces per indent level.
pub const SPACING: usize = 4;

/// Column at which declaration names are aligned by [`CodeGen::align_defs`].
pub const DEFS_COLUMN: usize = 40;

/// An open construct on the block stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `<name> begin ... end`
    Named(String),
    /// `if (..) begin ... end`
    If,
    /// `else if (..) begin ... end`
    ElseIf,
    /// `else begin ... end`
    Else,
    /// `for (..) begin ... end`
    For,
    /// `case (..) ... endcase`
    Switch,
    /// `<label>: begin ... end`
    Case,
    /// `` `ifdef .. `endif ``
    Ifdef,
    /// An indented list such as a parameter or port list.
    List,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Named(name) => write!(f, "{}", name),
            Block::If => write!(f, "if"),
            Block::ElseIf => write!(f, "else if"),
            Block::Else => write!(f, "else"),
            Block::For => write!(f, "for"),
            Block::Switch => write!(f, "case"),
            Block::Case => write!(f, "case item"),
            Block::Ifdef => write!(f, "`ifdef"),
            Block::List => write!(f, "list"),
        }
    }
}

/// Emission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// A closer does not match the innermost open construct.
    #[error("block mismatch: closing `{expected}` while `{found}` is open")]
    BlockMismatch {
        /// Construct the closer belongs to.
        expected: Block,
        /// Innermost open construct.
        found: Block,
    },

    /// A closer was emitted with no open construct.
    #[error("closing `{expected}` with no open block")]
    EmptyStack {
        /// Construct the closer belongs to.
        expected: Block,
    },

    /// Constructs were left open when the output was finished.
    #[error("unbalanced output: {} block(s) left open ({})", open.len(), open.iter().join(", "))]
    Unbalanced {
        /// Open constructs, outermost first.
        open: Vec<Block>,
    },

    /// An enum typedef was requested inside an open construct, or with fewer than two values.
    #[error("invalid enum typedef `{name}`")]
    InvalidEnum {
        /// Name of the typedef.
        name: String,
    },

    /// A ternary assignment without conditions, or whose values do not match its conditions.
    #[error("invalid ternary assignment to `{lhs}`")]
    InvalidTernary {
        /// Assigned signal.
        lhs: String,
    },
}

/// One or more lines of text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Lines(Vec<String>);

impl Lines {
    /// Returns the lines.
    pub fn as_slice(&self) -> &[String] { &self.0 }
}

impl From<&str> for Lines {
    fn from(line: &str) -> Self { Self(vec![line.to_string()]) }
}

impl From<String> for Lines {
    fn from(line: String) -> Self { Self(vec![line]) }
}

impl From<&String> for Lines {
    fn from(line: &String) -> Self { Self(vec![line.clone()]) }
}

impl From<Vec<String>> for Lines {
    fn from(lines: Vec<String>) -> Self { Self(lines) }
}

impl From<Vec<&str>> for Lines {
    fn from(lines: Vec<&str>) -> Self { Self(lines.into_iter().map(str::to_string).collect()) }
}

impl<const N: usize> From<[&str; N]> for Lines {
    fn from(lines: [&str; N]) -> Self { Self(lines.iter().map(|l| l.to_string()).collect()) }
}

impl<const N: usize> From<[String; N]> for Lines {
    fn from(lines: [String; N]) -> Self { Self(lines.into_iter().collect()) }
}

/// Assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assign {
    /// `=`
    Blocking,
    /// `<=`
    NonBlocking,
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assign::Blocking => write!(f, "="),
            Assign::NonBlocking => write!(f, "<="),
        }
    }
}

/// Layout of a single-condition ternary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TernaryLayout {
    /// Break the line after `lhs = (`.
    pub break_first: bool,
    /// Put both values on one line.
    pub same_line: bool,
}

impl TernaryLayout {
    /// Condition on its own line, values staggered below it.
    pub const BROKEN: Self = Self { break_first: true, same_line: false };
    /// Condition on its own line, both values on the next line.
    pub const BROKEN_SAME_LINE: Self = Self { break_first: true, same_line: true };
    /// Condition inline with the assignment, values staggered.
    pub const INLINE: Self = Self { break_first: false, same_line: false };
    /// Condition inline with the assignment, both values on the next line.
    pub const INLINE_SAME_LINE: Self = Self { break_first: false, same_line: true };
}

impl Default for TernaryLayout {
    fn default() -> Self { Self::BROKEN }
}

/// SystemVerilog text builder.
#[derive(Debug, Default)]
pub struct CodeGen {
    out: String,
    level: usize,
    stack: Vec<Block>,
}

impl CodeGen {
    /// Creates new, empty code generator.
    pub fn new() -> Self { Self::default() }

    /// Returns the text emitted so far.
    pub fn out(&self) -> &str { &self.out }

    /// Returns the current indent level.
    pub fn level(&self) -> usize { self.level }

    /// Returns the open constructs, outermost first.
    pub fn open_blocks(&self) -> &[Block] { &self.stack }

    /// Returns `num` indents worth of spaces.
    pub fn tab(num: usize) -> String { " ".repeat(SPACING * num) }

    /// Finishes emission and returns the text, or an error if constructs are still open.
    pub fn finish(self) -> Result<String, CodegenError> {
        if !self.stack.is_empty() {
            return Err(CodegenError::Unbalanced { open: self.stack });
        }
        Ok(self.out)
    }

    fn indent(&self) -> usize { self.level * SPACING }

    fn push_formatted(&mut self, line: &str, offset: usize) {
        if line.is_empty() {
            return;
        }
        let pad = self.indent() + offset;
        self.out.extend(std::iter::repeat(' ').take(pad));
        self.out.push_str(line);
    }

    fn write(&mut self, lines: &[String], indent_first: bool, offset: usize, trailing_newline: bool) {
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                if indent_first {
                    self.push_formatted(line, offset);
                } else {
                    self.out.push_str(line);
                }
            } else {
                self.out.push('\n');
                self.push_formatted(line, offset);
            }
        }
        if trailing_newline {
            self.out.push('\n');
        }
    }

    /// Emits lines at the current indent.
    pub fn emit(&mut self, lines: impl Into<Lines>) {
        let lines = lines.into();
        self.write(lines.as_slice(), true, 0, true);
    }

    /// Emits lines at the current indent plus `offset` spaces.
    pub fn emit_offset(&mut self, lines: impl Into<Lines>, offset: usize) {
        let lines = lines.into();
        self.write(lines.as_slice(), true, offset, true);
    }

    /// Emits an empty line.
    pub fn newline(&mut self) { self.out.push('\n'); }

    /// Emits `//` comments, one per line.
    pub fn comment(&mut self, lines: impl Into<Lines>) {
        for line in lines.into().as_slice() {
            self.emit(format!("// {}", line));
        }
    }

    /// Emits a `/** ... */` block comment.
    pub fn block_comment(&mut self, lines: impl Into<Lines>) {
        self.emit("/**");
        for line in lines.into().as_slice() {
            self.emit(format!(" * {}", line));
        }
        self.emit(" */");
    }

    /// Emits an enum typedef whose width fits all values.
    pub fn enum_typedef<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> Result<(), CodegenError> {
        if self.level != 0 || values.len() < 2 {
            return Err(CodegenError::InvalidEnum { name: name.to_string() });
        }

        let width = clog2(values.len());
        let logic = if width == 1 { "logic".to_string() } else { format!("logic [{}:0]", width - 1) };
        self.emit(format!("typedef enum {} {{", logic));
        self.level += 1;
        for (i, value) in values.iter().enumerate() {
            let sep = if i + 1 == values.len() { "" } else { "," };
            self.emit(format!("{}{}", value.as_ref(), sep));
        }
        self.level -= 1;
        self.emit(format!("}} {};", name));
        Ok(())
    }

    /// Emits `lhs = rhs`, where continuation lines of `rhs` are aligned after the opening bracket (or one tab in).
    pub fn align_assignment(&mut self, lhs: &str, rhs: impl Into<Lines>, assign: Assign, tab_indent: bool) {
        let head = format!("{} {} ", lhs, assign);
        self.write(&[head.clone()], true, 0, false);

        let offset = if tab_indent { SPACING } else { head.len() + 1 };
        let rhs = rhs.into();
        self.write(rhs.as_slice(), false, offset, true);
    }

    /// Emits declarations with names aligned at [`DEFS_COLUMN`].
    pub fn align_defs<L: AsRef<str>, R: AsRef<str>>(&mut self, defs: &[(L, R)]) {
        for (lhs, rhs) in defs {
            let lhs = lhs.as_ref();
            let padding = DEFS_COLUMN.saturating_sub(lhs.len()).max(1);
            self.emit(format!("{}{}{}", lhs, " ".repeat(padding), rhs.as_ref()));
        }
    }

    /// Emits a ternary assignment. With one condition the [`TernaryLayout`] applies; with more, the conditions are
    /// right-aligned into a priority chain and the last value is the fallback.
    ///
    /// Fails with [`CodegenError::InvalidTernary`] unless there is one more value than there are conditions, and at
    /// least one condition.
    pub fn align_ternary<S: AsRef<str>>(
        &mut self,
        lhs: &str,
        conditions: &[S],
        values: Vec<Lines>,
        assign: Assign,
        layout: TernaryLayout,
    ) -> Result<(), CodegenError> {
        if conditions.is_empty() || values.len() != conditions.len() + 1 {
            return Err(CodegenError::InvalidTernary { lhs: lhs.to_string() });
        }

        let mut output = Vec::new();
        let mut values = values.into_iter();
        let mut next_value = || values.next().unwrap_or_default();

        if conditions.len() == 1 {
            let mut line = format!("{} {} (", lhs, assign);
            let pad_same_line = if layout.break_first { SPACING } else { line.len() };

            if layout.break_first {
                output.push(line);
                line = format!("{}{} ?", Self::tab(1), conditions[0].as_ref());
            } else {
                line.push_str(&format!("{} ?", conditions[0].as_ref()));
            }
            let pad_staggered = line.len() + 1;

            if layout.same_line {
                output.push(line);
                let (v0, v1) = (next_value(), next_value());
                output.push(format!(
                    "{}{} : {});",
                    " ".repeat(pad_same_line),
                    v0.as_slice().join(" "),
                    v1.as_slice().join(" ")
                ));
            } else {
                let mut value = align_value(next_value(), pad_staggered);
                value[0] = format!("{} {}", line, value[0]);
                push_last(&mut value, " :");
                output.extend(value);

                let mut value = align_value(next_value(), pad_staggered);
                value[0] = format!("{}{}", " ".repeat(pad_staggered), value[0]);
                push_last(&mut value, ");");
                output.extend(value);
            }
        } else {
            output.push(format!("{} {} (", lhs, assign));
            let pad_max = SPACING + conditions.iter().map(|c| c.as_ref().len()).max().unwrap_or(0);
            let pad_rhs = pad_max + " ? ".len();

            for condition in conditions {
                let condition = condition.as_ref();
                let mut value = align_value(next_value(), pad_rhs);
                value[0] = format!("{}{} ? {}", " ".repeat(pad_max - condition.len()), condition, value[0]);
                push_last(&mut value, " :");
                output.extend(value);
            }

            let mut value = align_value(next_value(), pad_rhs);
            value[0] = format!("{}{}", " ".repeat(pad_rhs), value[0]);
            push_last(&mut value, ");");
            output.extend(value);
        }

        self.emit(output);
        Ok(())
    }

    fn open(&mut self, block: Block, indent: bool) {
        self.stack.push(block);
        if indent {
            self.level += 1;
        }
    }

    fn close(&mut self, expected: Block, indent: bool) -> Result<(), CodegenError> {
        match self.stack.last() {
            None => return Err(CodegenError::EmptyStack { expected }),
            Some(found) if *found != expected => {
                return Err(CodegenError::BlockMismatch { expected, found: found.clone() })
            }
            Some(_) => {}
        }
        let _ = self.stack.pop();
        if indent {
            self.level -= 1;
        }
        Ok(())
    }

    /// Opens `name begin`.
    pub fn start_block(&mut self, name: &str) {
        self.emit(format!("{} begin", name));
        self.open(Block::Named(name.to_string()), true);
    }

    /// Closes a block opened by [`CodeGen::start_block`] with the same name.
    pub fn end_block(&mut self, name: &str) -> Result<(), CodegenError> {
        self.close(Block::Named(name.to_string()), true)?;
        self.emit("end");
        Ok(())
    }

    fn start_conditional(&mut self, keyword: &str, condition: Lines) {
        self.write(&[format!("{} (", keyword)], true, 0, false);
        self.write(condition.as_slice(), false, keyword.len() + 2, false);
        self.write(&[") begin".to_string()], false, 0, true);
    }

    /// Opens `if (condition) begin`. Continuation lines of the condition are aligned after the bracket.
    pub fn start_if(&mut self, condition: impl Into<Lines>) {
        self.start_conditional("if", condition.into());
        self.open(Block::If, true);
    }

    /// Opens `else if (condition) begin`.
    pub fn start_else_if(&mut self, condition: impl Into<Lines>) {
        self.start_conditional("else if", condition.into());
        self.open(Block::ElseIf, true);
    }

    /// Opens `else begin`.
    pub fn start_else(&mut self) {
        self.emit("else begin");
        self.open(Block::Else, true);
    }

    /// Closes an `if`.
    pub fn end_if(&mut self) -> Result<(), CodegenError> {
        self.close(Block::If, true)?;
        self.emit("end");
        Ok(())
    }

    /// Closes an `else if`.
    pub fn end_else_if(&mut self) -> Result<(), CodegenError> {
        self.close(Block::ElseIf, true)?;
        self.emit("end");
        Ok(())
    }

    /// Closes an `else`.
    pub fn end_else(&mut self) -> Result<(), CodegenError> {
        self.close(Block::Else, true)?;
        self.emit("end");
        Ok(())
    }

    /// Opens `for (var = 0; condition; var = var + 1) begin`.
    pub fn start_for(&mut self, var: &str, condition: &str) {
        self.emit(format!("for ({0} = 0; {1}; {0} = {0} + 1) begin", var, condition));
        self.open(Block::For, true);
    }

    /// Closes a `for`.
    pub fn end_for(&mut self) -> Result<(), CodegenError> {
        self.close(Block::For, true)?;
        self.emit("end");
        Ok(())
    }

    /// Opens `case (expr)`. Does not indent.
    pub fn start_switch(&mut self, expr: &str) {
        self.emit(format!("case ({})", expr));
        self.open(Block::Switch, false);
    }

    /// Closes a `case` with `endcase`.
    pub fn end_switch(&mut self) -> Result<(), CodegenError> {
        self.close(Block::Switch, false)?;
        self.emit("endcase");
        Ok(())
    }

    /// Opens a case arm `label: begin`.
    pub fn start_case(&mut self, label: &str) {
        self.emit(format!("{}: begin", label));
        self.open(Block::Case, true);
    }

    /// Closes a case arm.
    pub fn end_case(&mut self) -> Result<(), CodegenError> {
        self.close(Block::Case, true)?;
        self.emit("end");
        Ok(())
    }

    /// Emits `head` and indents the following lines.
    pub fn start_list(&mut self, head: &str) {
        self.emit(head);
        self.open(Block::List, true);
    }

    /// Closes the innermost list with `separator` and opens the next one, as in `#( .. ) ( .. );`.
    pub fn continue_list(&mut self, separator: &str) -> Result<(), CodegenError> {
        self.end_list(separator)?;
        self.open(Block::List, true);
        Ok(())
    }

    /// Closes a list opened by [`CodeGen::start_list`] with `closer`.
    pub fn end_list(&mut self, closer: &str) -> Result<(), CodegenError> {
        self.close(Block::List, true)?;
        self.emit(closer);
        Ok(())
    }

    /// Opens `` `ifdef name ``. Does not indent.
    pub fn start_ifdef(&mut self, name: &str) {
        self.emit(format!("`ifdef {}", name));
        self.open(Block::Ifdef, false);
    }

    /// Closes an `` `ifdef `` with `` `endif ``.
    pub fn end_ifdef(&mut self) -> Result<(), CodegenError> {
        self.close(Block::Ifdef, false)?;
        self.emit("`endif");
        Ok(())
    }
}

fn align_value(value: Lines, pad: usize) -> Vec<String> {
    let mut lines = value.0;
    if lines.is_empty() {
        lines.push(String::new());
    }
    if lines.len() == 1 {
        return lines;
    }
    let last = lines.len() - 1;
    for (i, line) in lines.iter_mut().enumerate() {
        *line = if i == 0 { format!("({}", line) } else { format!("{}{}", " ".repeat(pad + 1), line) };
        if i == last {
            line.push(')');
        }
    }
    lines
}

fn push_last(lines: &mut [String], suffix: &str) {
    if let Some(last) = lines.last_mut() {
        last.push_str(suffix);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn nested_blocks_indent() {
        let mut cg = CodeGen::new();
        cg.start_block("always_comb");
        cg.start_if("a");
        cg.emit("x = 1;");
        cg.end_if().unwrap();
        cg.start_else();
        cg.emit("x = 0;");
        cg.end_else().unwrap();
        cg.end_block("always_comb").unwrap();

        let expected = "\
always_comb begin
    if (a) begin
        x = 1;
    end
    else begin
        x = 0;
    end
end
";
        assert_eq!(cg.finish().unwrap(), expected);
    }

    #[test]
    fn switch_and_ifdef_do_not_indent() {
        let mut cg = CodeGen::new();
        cg.start_ifdef("DEBUG");
        cg.start_switch("state");
        cg.start_case("INIT");
        cg.emit("y = 2;");
        cg.end_case().unwrap();
        cg.end_switch().unwrap();
        cg.end_ifdef().unwrap();

        assert_eq!(cg.finish().unwrap(), "`ifdef DEBUG\ncase (state)\nINIT: begin\n    y = 2;\nend\nendcase\n`endif\n");
    }

    #[test]
    fn multi_line_condition_is_aligned() {
        let mut cg = CodeGen::new();
        cg.start_else_if(vec!["a &", "b"]);
        cg.end_else_if().unwrap();
        assert_eq!(cg.finish().unwrap(), "else if (a &\n         b) begin\nend\n");
    }

    #[test]
    fn mismatched_closer_is_reported() {
        let mut cg = CodeGen::new();
        cg.start_for("i", "i < 4");
        assert_eq!(cg.end_if(), Err(CodegenError::BlockMismatch { expected: Block::If, found: Block::For }));
        assert_eq!(cg.end_for(), Ok(()));
        assert_eq!(cg.end_case(), Err(CodegenError::EmptyStack { expected: Block::Case }));
    }

    #[test]
    fn unfinished_output_is_rejected() {
        let mut cg = CodeGen::new();
        cg.start_block("initial");
        assert_eq!(
            cg.finish(),
            Err(CodegenError::Unbalanced { open: vec![Block::Named("initial".to_string())] })
        );
    }

    #[test]
    fn enum_width() {
        let mut cg = CodeGen::new();
        cg.enum_typedef("op_color_t", &["OP_COLOR_BLUE", "OP_COLOR_RED"]).unwrap();
        cg.enum_typedef("fsm_state_t", &["FSM_STATE_IDLE", "FSM_STATE_INIT", "FSM_STATE_READY"]).unwrap();
        let expected = "\
typedef enum logic {
    OP_COLOR_BLUE,
    OP_COLOR_RED
} op_color_t;
typedef enum logic [1:0] {
    FSM_STATE_IDLE,
    FSM_STATE_INIT,
    FSM_STATE_READY
} fsm_state_t;
";
        assert_eq!(cg.finish().unwrap(), expected);
    }

    #[test]
    fn enum_inside_block_is_rejected() {
        let mut cg = CodeGen::new();
        cg.start_block("initial");
        assert!(cg.enum_typedef("e", &["A", "B"]).is_err());
    }

    #[test]
    fn aligned_assignment() {
        let mut cg = CodeGen::new();
        cg.align_assignment("a", vec!["(b |", "c);"], Assign::Blocking, false);
        cg.align_assignment("d", vec!["{", "e};"], Assign::NonBlocking, true);
        assert_eq!(cg.finish().unwrap(), "a = (b |\n     c);\nd <= {\n    e};\n");
    }

    #[test]
    fn aligned_defs() {
        let mut cg = CodeGen::new();
        cg.align_defs(&[("logic", "valid;")]);
        assert_eq!(cg.finish().unwrap(), format!("logic{}valid;\n", " ".repeat(35)));
    }

    #[test]
    fn single_ternary_layouts() {
        let mut cg = CodeGen::new();
        for layout in [
            TernaryLayout::BROKEN,
            TernaryLayout::INLINE,
            TernaryLayout::INLINE_SAME_LINE,
            TernaryLayout::BROKEN_SAME_LINE,
        ] {
            cg.align_ternary("x", &["c"], vec!["a".into(), "b".into()], Assign::Blocking, layout).unwrap();
        }
        let expected = "\
x = (
    c ? a :
        b);
x = (c ? a :
         b);
x = (c ?
     a : b);
x = (
    c ?
    a : b);
";
        assert_eq!(cg.finish().unwrap(), expected);
    }

    #[test]
    fn ternary_chain() {
        let mut cg = CodeGen::new();
        cg.align_ternary(
            "y",
            &["long_cond", "c"],
            vec!["v0".into(), vec!["a |", "b"].into(), "v2".into()],
            Assign::Blocking,
            TernaryLayout::BROKEN,
        )
        .unwrap();
        let expected = "\
y = (
    long_cond ? v0 :
            c ? (a |
                 b) :
                v2);
";
        assert_eq!(cg.finish().unwrap(), expected);
    }

    #[test]
    fn malformed_ternary_is_rejected() {
        let mut cg = CodeGen::new();
        let no_fallback = cg.align_ternary("x", &["c"], vec!["a".into()], Assign::Blocking, TernaryLayout::BROKEN);
        assert_eq!(no_fallback, Err(CodegenError::InvalidTernary { lhs: "x".to_string() }));
        let no_condition = cg.align_ternary::<&str>("y", &[], vec!["a".into()], Assign::Blocking, TernaryLayout::BROKEN);
        assert_eq!(no_condition, Err(CodegenError::InvalidTernary { lhs: "y".to_string() }));
        assert_eq!(cg.finish().unwrap(), "");
    }
}
