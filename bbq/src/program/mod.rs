//! Program driver: emits the complete `bbq` module for an assembled pipeline.
//!
//! The module is emitted in a fixed order: prologue (parameters and ports), derived parameters and typedefs, state
//! declarations, output assignments, the state-dependent combinational block (initialization sequencer and memory
//! write ports), the state-independent combinational block, the sequential block, and finally the submodule
//! instantiations.

mod declarations;
mod header;
mod instances;
mod logic;

use thiserror::Error;

use crate::codegen::{CodeGen, CodegenError};
use crate::config::{Config, ConfigError};
use crate::pipeline::{Pipeline, TopologyError};

/// Generation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unbalanced or mismatched emission.
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// A level refers to a level that does not exist.
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Generates the SystemVerilog text of the queue described by `config`.
pub fn generate(config: &Config) -> Result<String, GenerateError> {
    let pipeline = Pipeline::new(*config)?;
    generate_pipeline(&pipeline)
}

/// Generates the SystemVerilog text of an assembled pipeline.
pub fn generate_pipeline(pipeline: &Pipeline) -> Result<String, GenerateError> {
    let mut program = Program { pipeline, cg: CodeGen::new() };
    program.emit_prologue()?;
    program.emit_typedefs()?;
    program.emit_declarations()?;
    program.emit_initial();
    program.emit_state_dependent_logic()?;
    program.emit_state_agnostic_logic()?;
    program.emit_sequential_logic()?;
    program.emit_instantiations();

    let mut text = program.cg.finish()?;
    text.push_str("endmodule");
    tracing::info!(bytes = text.len(), lines = text.lines().count(), "generated module");
    Ok(text)
}

/// Emission state shared by the sections of the module.
#[derive(Debug)]
struct Program<'p> {
    pipeline: &'p Pipeline,
    cg: CodeGen,
}

impl<'p> Program<'p> {
    fn config(&self) -> &'p Config { self.pipeline.config() }

    fn is_partitioned(&self) -> bool { self.config().is_partitioned() }
}
