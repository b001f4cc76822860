// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Arguments are parsed
// with `clap`; every command is routed to its Layer 2 use case.
//
//   train      — train or resume a model
//   translate  — beam search over standard input
//   sample     — random translations of standard input
//   replace    — UNK replacement over a translated file
//   evaluate   — per-sentence cost (and AER) of a corpus
//
// A missing or unknown command prints usage and exits cleanly.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser};
use commands::Commands;

use crate::application::{
    evaluate_use_case::EvaluateUseCase,
    replace_use_case::ReplaceUseCase,
    sample_use_case::SampleUseCase,
    train_use_case::TrainUseCase,
    translate_use_case::TranslateUseCase,
};

#[derive(Parser, Debug)]
#[command(
    name = "rnnsearch",
    version,
    about = "Attention-based neural machine translation: train, translate, sample, replace UNK, evaluate."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Parse the process arguments and run the chosen command.
    pub fn parse_and_run() -> Result<()> {
        match Cli::try_parse() {
            Ok(cli) => cli.run(),
            Err(e) => match e.kind() {
                ErrorKind::MissingSubcommand
                | ErrorKind::InvalidSubcommand
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    Cli::command().print_help()?;
                    println!();
                    Ok(())
                }
                _ => e.exit(),
            },
        }
    }

    /// Route to the use case; nothing is computed here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => {
                TrainUseCase::new(args.into()).execute()?;
                tracing::info!("Training complete");
                Ok(())
            }
            Commands::Translate(args) => TranslateUseCase::new(args.into()).execute(),
            Commands::Sample(args)    => SampleUseCase::new(args.into()).execute(),
            Commands::Replace(args)   => ReplaceUseCase::new(args.into()).execute(),
            Commands::Evaluate(args)  => EvaluateUseCase::new(args.into()).execute(),
        }
    }
}
