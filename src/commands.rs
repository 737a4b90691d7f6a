//! Command-line interface for `asb`, built with `clap`.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use awful_support::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question, .. } => println!("asked: {question}"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::graph::CooccurrenceStrategy;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to config.yaml. Defaults to the per-platform config directory.
    #[arg(long, short = 'c', global = true, env = "AWFUL_SUPPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config.yaml and prompt template to the config directory.
    Init,

    /// Load a support dataset (CSV) into the database.
    #[clap(name = "ingest", visible_aliases = ["setup", "process"])]
    Ingest {
        /// CSV with user_input, bot_response and optional category, intent columns.
        data_file: PathBuf,
    },

    /// Answer a single question and exit.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The customer's question.
        question: String,

        /// Prompt template name under <config_dir>/templates.
        #[arg(name = "template", short = 't')]
        template: Option<String>,
    },

    /// Answer questions line by line until `exit`.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        /// Prompt template name under <config_dir>/templates.
        #[arg(name = "template", short = 't')]
        template: Option<String>,
    },

    /// Build, export or query the entity co-occurrence graph.
    Graph {
        #[command(subcommand)]
        action: GraphCommand,
    },
}

/// Subcommands of `asb graph`.
#[derive(Subcommand, Debug)]
pub enum GraphCommand {
    /// Rebuild the graph, persist its edges and print counts.
    Build {
        #[arg(long, value_enum, default_value_t = StrategyArg::Scan)]
        strategy: StrategyArg,
    },

    /// Rebuild the graph and write it as Graphviz DOT.
    Dot {
        #[arg(long, short = 'o', default_value = "knowledge_graph.dot")]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = StrategyArg::Scan)]
        strategy: StrategyArg,
    },

    /// List the entities most strongly linked to `name`.
    Related {
        name: String,

        #[arg(short = 'k', default_value_t = 5)]
        k: usize,
    },
}

/// Co-occurrence counting strategy as spelled on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    Scan,
    Index,
}

impl From<StrategyArg> for CooccurrenceStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Scan => CooccurrenceStrategy::Scan,
            StrategyArg::Index => CooccurrenceStrategy::InvertedIndex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_aliases() {
        for name in ["ingest", "setup", "process"] {
            let cli = Cli::try_parse_from(["asb", name, "data.csv"]).unwrap();
            match cli.command {
                Commands::Ingest { data_file } => assert_eq!(data_file, PathBuf::from("data.csv")),
                other => panic!("unexpected command {other:?}"),
            }
        }
    }

    #[test]
    fn test_ask_with_global_config() {
        let cli = Cli::try_parse_from(["asb", "ask", "Where is my refund?", "--config", "/tmp/c.yaml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        match cli.command {
            Commands::Ask { question, template } => {
                assert_eq!(question, "Where is my refund?");
                assert_eq!(template, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_graph_dot_defaults() {
        let cli = Cli::try_parse_from(["asb", "graph", "dot"]).unwrap();
        match cli.command {
            Commands::Graph {
                action: GraphCommand::Dot { output, strategy },
            } => {
                assert_eq!(output, PathBuf::from("knowledge_graph.dot"));
                assert_eq!(CooccurrenceStrategy::from(strategy), CooccurrenceStrategy::Scan);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_graph_related_k() {
        let cli = Cli::try_parse_from(["asb", "graph", "related", "refund", "-k", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Graph { action: GraphCommand::Related { ref name, k: 2 } } if name == "refund"
        ));
    }

    #[test]
    fn test_graph_build_index_strategy() {
        let cli = Cli::try_parse_from(["asb", "graph", "build", "--strategy", "index"]).unwrap();
        match cli.command {
            Commands::Graph {
                action: GraphCommand::Build { strategy },
            } => assert_eq!(CooccurrenceStrategy::from(strategy), CooccurrenceStrategy::InvertedIndex),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
