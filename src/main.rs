use clap::Parser;
use pipeline_convert::cli::{self, Args};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::run(args)
}
