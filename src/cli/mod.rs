pub mod args;
pub mod commands;

pub use args::ConvertArgs;
use crate::core::SourceFormat;
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
SOURCE FORMATS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "pipeline-convert")]
#[command(version = crate::VERSION)]
#[command(about = "Convert CI pipeline definitions into Harness v1 YAML")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Diagnostics are logged to stderr; the converted document goes to stdout unless --output is given."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Convert a CircleCI configuration",
        long_about = "Circle converts the first workflow of a CircleCI 2.1 config; each job invocation becomes a stage.",
        after_help = "Example:\n    pipeline-convert circle .circleci/config.yml --output harness.yaml"
    )]
    Circle(ConvertArgs),
    #[command(
        about = "Convert a Harness v0 pipeline",
        long_about = "Harness rewrites a v0 pipeline (pipeline.stages[].stage) into the v1 schema.",
        after_help = "Example:\n    pipeline-convert harness pipeline.yaml --strict"
    )]
    Harness(ConvertArgs),
}

impl Command {
    pub fn format(&self) -> SourceFormat {
        match self {
            Command::Circle(_) => SourceFormat::Circle,
            Command::Harness(_) => SourceFormat::HarnessV0,
        }
    }
}

pub fn run(args: Args) -> crate::Result<()> {
    let format = args.command.format();
    match args.command {
        Command::Circle(convert_args) | Command::Harness(convert_args) => {
            commands::convert(format, convert_args)
        }
    }
}
