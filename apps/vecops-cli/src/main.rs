//! Thin operational CLI over the consistency core.
//!
//! Presentation glue only: argument parsing, table/json rendering, exit
//! codes. Expected failures print a human-readable message; raw driver
//! errors are reserved for genuinely unexpected conditions.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use vecops_core::config::Config;
use vecops_core::types::{CanonicalEmbedding, EngineUsed, IndexParams, SearchEnvelope};
use vecops_search::probe::{apply_post_filter, tag_contains, ProbeOptions};
use vecops_search::provision::{
    ensure_search_ready, resource_key, ProvisionCache, SearchSetup, UpdatePolicy,
};
use vecops_search::{index_repair, normalize, probe};
use vecops_store::http::HttpStore;

#[derive(Parser)]
#[command(name = "vecops", about = "Consistency and search tooling for the document database")]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Report embedding conformance for every document in a collection
    Scan { collection: String },

    /// Rewrite non-conforming embedding metadata to the canonical config
    RepairMeta {
        collection: String,
        /// Compute counts without mutating any document
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the vector index and create it if missing or malformed
    RepairIndex {
        collection: String,
        #[arg(long, default_value = "embedding")]
        field: String,
        /// Defaults to the canonical embedding dimension from config
        #[arg(long)]
        dimension: Option<usize>,
        #[arg(long, default_value = "cosine")]
        metric: String,
        #[arg(long, default_value_t = 2)]
        n_lists: u32,
    },

    /// Probe approximate similarity with an explicit query vector
    Search {
        collection: String,
        /// Comma-separated floats, e.g. "0.12,-0.3,0.5"
        #[arg(long)]
        vector: String,
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Provision the index and search view before probing, going
        /// through the update-policy cache
        #[arg(long)]
        repair: bool,
        /// Client-side stage-two filter: keep documents whose `tags`
        /// array contains this value
        #[arg(long)]
        tag: Option<String>,
    },

    /// Provision the vector index and search view for a collection
    Provision {
        collection: String,
        #[arg(long, default_value = "embedding")]
        field: String,
        /// Defaults to the canonical embedding dimension from config
        #[arg(long)]
        dimension: Option<usize>,
    },

    /// Show index state and conformance summary for a collection
    Status {
        collection: String,
        #[arg(long, default_value = "embedding")]
        field: String,
    },
}

fn search_setup(collection: &str, field: &str, dimension: usize) -> SearchSetup {
    SearchSetup {
        collection: collection.to_string(),
        field: field.to_string(),
        params: IndexParams::for_dimension(dimension),
        analyzed_fields: vec![("title".to_string(), vec!["text_en".to_string()])],
    }
}

fn parse_vector(raw: &str) -> anyhow::Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("bad vector component '{}'", part.trim()))
        })
        .collect()
}

fn print_envelope(envelope: &SearchEnvelope, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(envelope)?),
        OutputFormat::Table => {
            println!("engine: {}", envelope.engine);
            println!("total:  {}", envelope.total);
            for hit in &envelope.results {
                let title = hit.document.body["title"].as_str().unwrap_or("-");
                println!("{:>8.4}  {:<24} {}", hit.score, hit.document.key, title);
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = config.database()?;
    let store = HttpStore::new(&db);
    let cache = ProvisionCache::new(UpdatePolicy::from_config(
        config.view_update_policy().as_deref(),
    )?);

    match cli.command {
        Command::Scan { collection } => {
            let canonical = config.canonical_embedding()?;
            let statuses = normalize::scan(&store, &collection, &canonical).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
                OutputFormat::Table => {
                    for (key, status) in &statuses {
                        println!("{key:<24} {status:?}");
                    }
                    let bad = statuses.iter().filter(|(_, s)| s.is_non_conforming()).count();
                    println!("{} documents, {} non-conforming", statuses.len(), bad);
                }
            }
        }
        Command::RepairMeta {
            collection,
            dry_run,
        } => {
            let canonical = config.canonical_embedding()?;
            let report = normalize::repair(&store, &collection, &canonical, dry_run).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Table => {
                    println!(
                        "total {} | fixed {} | skipped {} | errors {}",
                        report.total, report.fixed, report.skipped, report.errors
                    );
                    for detail in &report.details {
                        println!("{:<24} {} ({:?})", detail.key, detail.reason, detail.outcome);
                    }
                }
            }
            if report.errors > 0 {
                bail!("{} documents failed to repair", report.errors);
            }
        }
        Command::RepairIndex {
            collection,
            field,
            dimension,
            metric,
            n_lists,
        } => {
            let dimension = match dimension {
                Some(d) => d,
                None => config.canonical_embedding()?.dim,
            };
            let params = IndexParams {
                dimension,
                metric: metric.parse()?,
                n_lists,
            };
            let action = index_repair::repair(&store, &collection, &field, &params).await?;
            println!("{collection}.{field}: {action:?}");
        }
        Command::Search {
            collection,
            vector,
            min_score,
            top,
            repair,
            tag,
        } => {
            let query = parse_vector(&vector)?;
            if repair {
                let setup = search_setup(&collection, "embedding", query.len());
                ensure_search_ready(&store, &cache, &db.database, &setup).await?;
            }
            // Filtered search is two stages: probe a larger candidate set
            // unfiltered, then cut client-side.
            let candidates = if tag.is_some() { top * 10 } else { top };
            let opts = ProbeOptions {
                min_score,
                top_n: candidates,
                auto_repair: false,
            };
            let mut envelope =
                probe::probe(&store, &[collection], "embedding", &query, &opts).await?;
            if let Some(tag) = tag {
                envelope = apply_post_filter(envelope, tag_contains("tags", &tag));
                envelope.results.truncate(top);
                envelope.total = envelope.results.len();
            }
            print_envelope(&envelope, cli.format)?;
            if envelope.engine != EngineUsed::NativeApprox {
                bail!("search degraded: {}", envelope.engine);
            }
        }
        Command::Provision {
            collection,
            field,
            dimension,
        } => {
            let dimension = match dimension {
                Some(d) => d,
                None => config.canonical_embedding()?.dim,
            };
            let setup = search_setup(&collection, &field, dimension);
            let ran = ensure_search_ready(&store, &cache, &db.database, &setup).await?;
            let state = if ran { "provisioned" } else { "cached" };
            println!("{}: {state}", resource_key(&db.database, &collection));
        }
        Command::Status { collection, field } => {
            let canonical: CanonicalEmbedding = config.canonical_embedding()?;
            let state = index_repair::validate(&store, &collection, &field, canonical.dim).await?;
            let statuses = normalize::scan(&store, &collection, &canonical).await?;
            let bad = statuses.iter().filter(|(_, s)| s.is_non_conforming()).count();
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "collection": collection,
                        "field": field,
                        "index_state": state,
                        "documents": statuses.len(),
                        "non_conforming": bad,
                    }))?
                ),
                OutputFormat::Table => {
                    println!("collection:     {collection}");
                    println!("index state:    {state:?}");
                    println!("documents:      {}", statuses.len());
                    println!("non-conforming: {bad}");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
