//! BBQ: generator for a pipelined hardware priority queue built on a Hierarchical Find-First-Set (HFFS) bitmap tree.
//!
//! A [`Config`] selects the depth of the bitmap tree, its fan-out, and the number of logical partitions. The
//! [`Pipeline`] places the levels of the queue on the stage timeline, and [`generate`] emits the complete
//! SystemVerilog module. [`model::HffsQueue`] is a functional model of the same queue.

// # Tries to deny all lints (`rustc -W help`).
#![deny(absolute_paths_not_starting_with_crate)]
#![deny(anonymous_parameters)]
#![deny(deprecated_in_future)]
#![deny(explicit_outlives_requirements)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(missing_debug_implementations)]
#![deny(non_ascii_idents)]
#![deny(rust_2018_idioms)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_extern_crates)]
#![deny(unused_import_braces)]
//
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_html_tags)]
#![deny(rustdoc::bare_urls)]
#![warn(unreachable_pub)]
//
#![allow(clippy::needless_lifetimes)]
#![allow(elided_lifetimes_in_paths)]

pub mod codegen;
pub mod config;
pub mod level;
pub mod model;
pub mod pipeline;
pub mod program;
pub mod utils;
pub mod vir;

pub use config::{Config, ConfigError};
pub use pipeline::Pipeline;
pub use program::{generate, generate_pipeline, GenerateError};
