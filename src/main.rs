//! Main module for the Awful Support CLI application (`asb`).
//!
//! Parses the command line, loads configuration and dispatches to the library.
//!
//! # Examples
//!
//! ```sh
//! asb init
//! asb ingest customer_support.csv
//! asb ask "How do I cancel my subscription?"
//! asb interactive
//! asb graph dot --output knowledge_graph.dot
//! asb graph related refund -k 3
//! ```

use awful_support::{
    api::{OpenAiCompleter, ResponseGenerator},
    commands::{Cli, Commands, GraphCommand},
    config::{self, SupportConfig},
    config_dir,
    error::EmbeddingError,
    graph::GraphBuilder,
    ingest::DataProcessor,
    pretty::print_pretty,
    store::SupportStore,
    template::{self, PromptTemplate},
    vector_store::{Embedder, SentenceEmbeddingsModel},
};
use clap::Parser;
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

static TRACING: OnceCell<()> = OnceCell::new();

const DEFAULT_TEMPLATE: &str = "support";

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}

/// Execute the parsed command.
async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let Cli { config, command } = cli;

    match command {
        Commands::Init => {
            debug!("Initializing configuration");
            init()
        }
        Commands::Ingest { data_file } => {
            let config = resolve_config(config.as_deref())?;
            let embedder = load_embedder(&config)?;
            let mut store = open_store(&config)?;

            println!("Processing {} ...", data_file.display());
            let summary = DataProcessor::new(&embedder).ingest_file(&mut store, &data_file)?;
            println!(
                "Data processing completed! {} conversations, {} new entities ({} already known).",
                summary.conversations, summary.entities_inserted, summary.entities_skipped
            );
            Ok(())
        }
        Commands::Ask { question, template } => {
            let config = resolve_config(config.as_deref())?;
            let embedder = load_embedder(&config)?;
            let completer = OpenAiCompleter::new(&config);
            let mut store = open_store(&config)?;
            let generator = ResponseGenerator::new(&embedder, &completer)
                .with_template(resolve_template(template, &config))
                .with_top_k(config.conversation_top_k, config.entity_top_k);

            debug!("Asking question: {:?}", question);
            let answer = generator.generate_response(&mut store, &question).await;
            print_pretty(&answer)
        }
        Commands::Interactive { template } => {
            let config = resolve_config(config.as_deref())?;
            let embedder = load_embedder(&config)?;
            let completer = OpenAiCompleter::new(&config);
            let mut store = open_store(&config)?;
            let generator = ResponseGenerator::new(&embedder, &completer)
                .with_template(resolve_template(template, &config))
                .with_top_k(config.conversation_top_k, config.entity_top_k);

            println!("Customer support assistant. Type 'exit' to quit.");
            let stdin = io::stdin();
            let mut lines = stdin.lock().lines();
            loop {
                print!("You: ");
                io::stdout().flush()?;
                let Some(line) = lines.next() else { break };
                let question = line?;
                let question = question.trim();
                if question.eq_ignore_ascii_case("exit") {
                    break;
                }
                if question.is_empty() {
                    continue;
                }
                let answer = generator.generate_response(&mut store, question).await;
                print_pretty(&answer)?;
            }
            Ok(())
        }
        Commands::Graph { action } => {
            let config = resolve_config(config.as_deref())?;
            let mut store = open_store(&config)?;
            match action {
                GraphCommand::Build { strategy } => {
                    let graph = GraphBuilder::with_strategy(strategy.into()).build_graph(&mut store)?;
                    println!(
                        "Knowledge graph: {} entities, {} relationships",
                        graph.node_count(),
                        graph.edge_count()
                    );
                    for node in graph.nodes() {
                        let degree = graph.neighbors(node.id, usize::MAX).len();
                        println!("  {} ({}) {} related", node.name, node.entity_type, degree);
                    }
                }
                GraphCommand::Dot { output, strategy } => {
                    let graph = GraphBuilder::with_strategy(strategy.into()).build_graph(&mut store)?;
                    fs::write(&output, graph.to_dot())?;
                    println!("Graph written to {}", output.display());
                }
                GraphCommand::Related { name, k } => {
                    let name = name.to_lowercase();
                    let Some(entity) = store.entity_by_name(&name)? else {
                        println!("No entity named {name:?}");
                        return Ok(());
                    };
                    let graph = GraphBuilder::default().load_graph(&mut store)?;
                    let related = graph.neighbors(entity.id, k);
                    if related.is_empty() {
                        println!("{} has no related entities", entity.name);
                    }
                    for (node, weight) in related {
                        println!("{} ({}) {:.1}", node.name, node.entity_type, weight);
                    }
                }
            }
            Ok(())
        }
    }
}

/// Load config from `explicit`, or from the config directory. A missing default
/// config falls back to built-in defaults.
fn resolve_config(explicit: Option<&Path>) -> Result<SupportConfig, Box<dyn Error>> {
    let path: PathBuf = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_dir()?.join("config.yaml");
            if !path.exists() {
                warn!(
                    "No config at {}, using defaults (run `asb init` to create one)",
                    path.display()
                );
                return Ok(SupportConfig::default());
            }
            path
        }
    };

    debug!("Loading config from: {}", path.display());
    let config = config::load_config(&path.to_string_lossy())?;
    debug!("Config loaded: {:?}", config);
    Ok(config)
}

fn resolve_template(name: Option<String>, config: &SupportConfig) -> PromptTemplate {
    let Some(name) = name.or_else(|| config.template.clone()) else {
        return PromptTemplate::default();
    };
    template::load_template(&name).unwrap_or_else(|e| {
        warn!("Could not load template {:?}, using built-in prompt: {}", name, e);
        PromptTemplate::default()
    })
}

fn load_embedder(config: &SupportConfig) -> Result<SentenceEmbeddingsModel, Box<dyn Error>> {
    info!("Loading embedding model {}", config.embedding_model);
    let embedder = SentenceEmbeddingsModel::load(&config.embedding_model)?;
    if embedder.dimension() != config.embedding_dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: config.embedding_dimension,
            actual: embedder.dimension(),
        }
        .into());
    }
    Ok(embedder)
}

fn open_store(config: &SupportConfig) -> Result<SupportStore, Box<dyn Error>> {
    Ok(SupportStore::open(
        &config.db_url,
        config.embedding_dimension,
        config.distance_metric,
    )?)
}

/// Write a default config.yaml and prompt template to the config directory.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    let path = config_dir.join("templates");
    info!("Creating template config directory: {}", path.display());
    fs::create_dir_all(&path)?;

    let template_path = path.join(format!("{DEFAULT_TEMPLATE}.yaml"));
    info!("Creating template file: {}", template_path.display());
    fs::write(&template_path, serde_yaml::to_string(&PromptTemplate::default())?)?;

    let config_path = config_dir.join("config.yaml");
    info!("Creating config file: {}", config_path.display());
    let config = SupportConfig {
        template: Some(DEFAULT_TEMPLATE.to_string()),
        ..SupportConfig::default()
    };
    fs::write(&config_path, serde_yaml::to_string(&config)?)?;

    println!("Wrote {} and {}", config_path.display(), template_path.display());
    Ok(())
}
