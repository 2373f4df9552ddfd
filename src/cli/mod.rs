//! CLI module for Prompt Pipeline
//!
//! - `serve`: HTTP admin surface over the configured stores
//! - `run`: process the queue once with a workflow file

pub mod run;
pub mod serve;

use clap::{Parser, Subcommand};

/// Prompt Pipeline - replays queued inputs through multi-step AI workflows
#[derive(Parser)]
#[command(name = "prompt-pipeline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP admin server
    Serve,

    /// Process queue items with a workflow file and exit
    Run(run::RunArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["prompt-pipeline", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn test_parse_run_with_selection() {
        let cli = Cli::try_parse_from([
            "prompt-pipeline",
            "run",
            "--workflow",
            "article.json",
            "--item",
            "b",
            "--item",
            "a",
            "--reset-failed",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.workflow.to_str(), Some("article.json"));
        assert_eq!(args.items, vec!["b", "a"]);
        assert!(args.reset_failed);
        assert!(args.import.is_none());
    }

    #[test]
    fn test_run_requires_workflow() {
        assert!(Cli::try_parse_from(["prompt-pipeline", "run"]).is_err());
    }
}
