use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "queue-dedupe")]
#[command(about = "Deduplicate an upload queue before anything is uploaded", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest each folder as one batch and verify the queue after each
    Process {
        /// Folders to ingest, in order. Defaults to the configured batches
        paths: Vec<PathBuf>,

        /// Write the final queue to a .csv or .json file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Print configuration values
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_takes_paths_and_report() {
        let cli = Cli::try_parse_from(["queue-dedupe", "process", "a", "b", "--report", "out.csv"]).unwrap();
        match cli.command {
            Some(Commands::Process { paths, report }) => {
                assert_eq!(paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert_eq!(report, Some(PathBuf::from("out.csv")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["queue-dedupe"]).unwrap();
        assert!(cli.command.is_none());
    }
}
