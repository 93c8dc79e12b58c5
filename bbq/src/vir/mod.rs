//! Verilog IR for the structural parts of the generated module: its port list and submodule instantiations.

use std::fmt;

/// Column at which port names start.
const PORT_NAME_COLUMN: usize = 52;

/// Width of the direction column.
const PORT_DIRECTION_WIDTH: usize = 8;

/// Port declaration.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PortDeclaration {
    /// Input declaration (type, name).
    Input(String, String),

    /// Output declaration (type, name).
    Output(String, String),
}

impl PortDeclaration {
    /// Creates new input port.
    pub fn input(ty: &str, name: &str) -> Self { Self::Input(ty.to_string(), name.to_string()) }

    /// Creates new output port.
    pub fn output(ty: &str, name: &str) -> Self { Self::Output(ty.to_string(), name.to_string()) }
}

impl fmt::Display for PortDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (direction, ty, name) = match self {
            Self::Input(ty, name) => ("input", ty, name),
            Self::Output(ty, name) => ("output", ty, name),
        };
        let ty_width = PORT_NAME_COLUMN - PORT_DIRECTION_WIDTH;
        write!(f, "{:<dw$}{:<tw$}{}", direction, ty, name, dw = PORT_DIRECTION_WIDTH, tw = ty_width)
    }
}

/// Module instantiation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ModuleInstantiation {
    /// Module name.
    pub module_name: String,

    /// Inst name.
    pub inst_name: String,

    /// Params.
    pub params: Vec<(String, String)>,

    /// Port connections. An empty expression leaves the port unconnected.
    pub port_connections: Vec<(String, String)>,
}

impl ModuleInstantiation {
    /// Creates new module instantiation.
    pub fn new(
        module_name: String, inst_name: String, params: Vec<(String, String)>, port_connections: Vec<(String, String)>,
    ) -> Self {
        Self { module_name, inst_name, params, port_connections }
    }

    /// Instantiation of a simple dual-port BRAM named `inst_name`, whose signals are prefixed by `prefix`.
    pub fn bram(inst_name: &str, prefix: &str, dwidth: &str, awidth: &str, depth: &str) -> Self {
        let port = |port: &str, signal: &str| (port.to_string(), format!("{}_{}", prefix, signal));
        Self::new(
            "bram_simple2port".to_string(),
            inst_name.to_string(),
            vec![
                ("DWIDTH".to_string(), dwidth.to_string()),
                ("AWIDTH".to_string(), awidth.to_string()),
                ("DEPTH".to_string(), depth.to_string()),
                ("IS_OUTDATA_REG".to_string(), "0".to_string()),
            ],
            vec![
                ("clock".to_string(), "clk".to_string()),
                port("data", "data"),
                port("rden", "rden"),
                port("wren", "wren"),
                port("rdaddress", "rdaddress"),
                port("wraddress", "wraddress"),
                port("q", "q"),
            ],
        )
    }
}

impl fmt::Display for ModuleInstantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #(\n{}\n)\n{} (\n{}\n);",
            self.module_name,
            self.params.iter().map(|(name, value)| format!("    .{}({})", name, value)).collect::<Vec<_>>().join(",\n"),
            self.inst_name,
            self.port_connections
                .iter()
                .map(|(port_name, expr)| format!("    .{}({})", port_name, expr))
                .collect::<Vec<_>>()
                .join(",\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn port_columns() {
        assert_eq!(
            PortDeclaration::input("logic", "clk").to_string(),
            "input   logic                                       clk"
        );
        assert_eq!(
            PortDeclaration::output("logic [HEAP_PRIORITY_BUCKETS_AWIDTH-1:0]", "out_he_priority").to_string(),
            "output  logic [HEAP_PRIORITY_BUCKETS_AWIDTH-1:0]    out_he_priority"
        );
    }

    #[test]
    fn bram() {
        let expected = "\
bram_simple2port #(
    .DWIDTH(HEAP_BITMAP_WIDTH),
    .AWIDTH(BITMAP_L3_AWIDTH),
    .DEPTH(NUM_BITMAPS_L3),
    .IS_OUTDATA_REG(0)
)
bm_l3 (
    .clock(clk),
    .data(bm_l3_data),
    .rden(bm_l3_rden),
    .wren(bm_l3_wren),
    .rdaddress(bm_l3_rdaddress),
    .wraddress(bm_l3_wraddress),
    .q(bm_l3_q)
);";
        let inst = ModuleInstantiation::bram("bm_l3", "bm_l3", "HEAP_BITMAP_WIDTH", "BITMAP_L3_AWIDTH", "NUM_BITMAPS_L3");
        assert_eq!(inst.to_string(), expected);
    }
}
