use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use bbq::{Config, Pipeline};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bbqgen",
    about = "Generates a SystemVerilog implementation of BBQ for the specified number of bitmap tree levels."
)]
struct Args {
    /// Number of bitmap tree levels
    num_bitmap_levels: usize,

    /// Number of logical partitions (a power of the bitmap width)
    #[arg(long, value_name = "N", default_value_t = 1)]
    num_lps: usize,

    /// Bitmap width; required when partitioning (defaults to 4 otherwise)
    #[arg(long, value_name = "W")]
    bitmap_width: Option<usize>,

    /// Write the module to this path instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the pipeline structure to stderr
    #[arg(long, action = clap::ArgAction::SetTrue)]
    summary: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(io::stderr).init();

    let args = Args::parse();
    let mut config = Config::new(args.num_bitmap_levels).with_num_lps(args.num_lps);
    if let Some(width) = args.bitmap_width {
        config = config.with_bitmap_width(width);
    }

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    if args.summary {
        eprintln!("{}", pipeline.summary());
    }
    let text = bbq::generate_pipeline(&pipeline).context("failed to generate the module")?;

    match args.output {
        Some(path) => {
            fs::write(&path, format!("{}\n", text)).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote module");
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", text).context("failed to write to stdout")?;
        }
    }
    Ok(())
}
