use clap::{Parser, Subcommand, ValueEnum};
use layerdb::codec::{self, jsonl};
use layerdb::schema::parse_schema;
use layerdb::{AnyText, AnyValue, Corpus, FileBackend, LayerDbError};
use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

/// layerdb CLI: inspect, convert and query annotated corpus files
#[derive(Parser)]
#[command(name = "layerdb", version, about)]
struct Cli {
    /// Output format for reports
    #[arg(long, global = true, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a corpus file between formats (chosen by extension)
    Convert {
        input: PathBuf,
        output: PathBuf,
    },

    /// Add documents to a corpus file, creating it if needed
    Load {
        /// Corpus or JSONL file to read documents from
        input: PathBuf,
        /// Corpus file to add them to
        output: PathBuf,
        /// Schema YAML to declare before loading
        #[arg(long)]
        meta: Option<PathBuf>,
        /// Treat the input as one JSON document per line
        #[arg(long)]
        jsonl: bool,
    },

    /// Print a single document
    Get {
        file: PathBuf,
        id: String,
    },

    /// Remove a document
    Remove {
        file: PathBuf,
        id: String,
        /// Show what would be removed without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// List IDs of documents matching a JSON filter (e.g. '{"pos": "NOUN"}')
    Search {
        file: PathBuf,
        query: String,
    },

    /// Count the surface strings of a layer
    TextFreq {
        file: PathBuf,
        layer: String,
    },

    /// Count the stored values of a layer
    ValFreq {
        file: PathBuf,
        layer: String,
    },

    /// Check all documents against the schema
    Validate {
        file: PathBuf,
    },

    /// Replace the schema of a corpus file with the one in a schema YAML
    Migrate {
        file: PathBuf,
        /// Schema YAML holding the new declarations
        #[arg(long)]
        meta: PathBuf,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show schema and document counts
    Status {
        file: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Convert { input, output } => {
            let corpus = codec::read_path(&input)?;
            codec::write_path(&corpus, &output)?;
            log::info!(
                "Converted {} documents from {} to {}",
                corpus.len(),
                input.display(),
                output.display()
            );
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "documents": corpus.len(),
                    "output": output.display().to_string(),
                }),
                &cli.format,
            );
        }

        Command::Load {
            input,
            output,
            meta,
            jsonl,
        } => {
            let mut corpus = Corpus::open(Box::new(FileBackend::new(&output)?))?;
            let mut changes = Vec::new();
            if let Some(meta) = meta {
                let schema = parse_schema(&meta)?;
                changes = corpus.replace_schema(schema.get_schema().clone())?;
            }
            let added = if jsonl || is_jsonl(&input) {
                let file = std::fs::File::open(&input)?;
                jsonl::read_into(&mut corpus, BufReader::new(file))?
            } else {
                let source = codec::read_path(&input)?;
                let mut added = Vec::new();
                for doc in source.docs() {
                    added.push(corpus.add_document(doc.document().clone())?);
                }
                added
            };
            corpus.flush()?;
            log::info!("Added {} documents to {}", added.len(), output.display());
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "added": added,
                    "schema_changes": changes.iter().map(|c| c.describe()).collect::<Vec<_>>(),
                    "documents": corpus.len(),
                }),
                &cli.format,
            );
        }

        Command::Get { file, id } => {
            let corpus = codec::read_path(&file)?;
            let doc = corpus.get(&id)?;
            print_output(&doc.to_json(), &cli.format);
        }

        Command::Remove { file, id, dry_run } => {
            let mut corpus = Corpus::open(Box::new(FileBackend::new(&file)?))?;
            if dry_run {
                let doc = corpus.get(&id)?;
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_remove": id,
                        "document": doc.to_json(),
                    }),
                    &cli.format,
                );
            } else {
                corpus.remove_document(&id)?;
                corpus.flush()?;
                log::info!("Removed {id} from {}", file.display());
                print_output(&serde_json::json!({ "ok": true, "removed": id }), &cli.format);
            }
        }

        Command::Search { file, query } => {
            let corpus = codec::read_path(&file)?;
            let filter: serde_json::Value = serde_json::from_str(&query)
                .map_err(|e| LayerDbError::Query(format!("Query is not valid JSON: {e}")))?;
            let ids = corpus.search_json(&filter)?;
            print_output(&serde_json::json!(ids), &cli.format);
        }

        Command::TextFreq { file, layer } => {
            let corpus = codec::read_path(&file)?;
            let counts = corpus.text_freq(&layer, AnyText)?;
            print_output(&counts_to_value(counts), &cli.format);
        }

        Command::ValFreq { file, layer } => {
            let corpus = codec::read_path(&file)?;
            let counts = corpus
                .val_freq(&layer, AnyValue)?
                .into_iter()
                .map(|(value, n)| (value.to_string(), n))
                .collect();
            print_output(&counts_to_value(counts), &cli.format);
        }

        Command::Validate { file } => {
            let corpus = codec::read_path(&file)?;
            let report = corpus.validate_all();
            print_output(&serde_json::to_value(&report)?, &cli.format);
        }

        Command::Migrate {
            file,
            meta,
            dry_run,
        } => {
            let mut corpus = Corpus::open(Box::new(FileBackend::new(&file)?))?;
            let schema = parse_schema(&meta)?;
            let changes = corpus.replace_schema(schema.get_schema().clone())?;
            let unsafe_changes = layerdb::migration::has_unsafe_migrations(&changes);
            let report = corpus.validate_all();
            for (id, errors) in &report.invalid {
                log::warn!("Document {id} fails the new schema: {}", errors.join("; "));
            }
            if !dry_run {
                if !report.is_ok() {
                    return Err(format!(
                        "Migration would leave {} documents invalid; fix them or rerun with --dry-run to inspect",
                        report.invalid.len()
                    )
                    .into());
                }
                corpus.flush()?;
            }
            print_output(
                &serde_json::json!({
                    "dry_run": dry_run,
                    "changes": changes.iter().map(|c| c.describe()).collect::<Vec<_>>(),
                    "unsafe": unsafe_changes.len(),
                    "invalid_documents": report.invalid,
                }),
                &cli.format,
            );
        }

        Command::Status { file } => {
            let corpus = codec::read_path(&file)?;
            let layers: serde_json::Map<String, serde_json::Value> = corpus
                .schema()
                .iter()
                .map(|(name, desc)| {
                    let holding = corpus.docs().filter(|d| d.layer(name).is_some()).count();
                    (
                        name.to_string(),
                        serde_json::json!({
                            "type": desc.layer_type().as_str(),
                            "base": desc.base(),
                            "documents": holding,
                        }),
                    )
                })
                .collect();
            print_output(
                &serde_json::json!({
                    "file": file.display().to_string(),
                    "documents": corpus.len(),
                    "layers": layers,
                }),
                &cli.format,
            );
        }
    }

    Ok(())
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jsonl")
}

/// Most frequent first; ties by key so output is stable.
fn counts_to_value(counts: HashMap<String, u32>) -> serde_json::Value {
    let mut entries: Vec<(String, u32)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let map: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .map(|(key, n)| (key, serde_json::json!(n)))
        .collect();
    serde_json::Value::Object(map)
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map(|s| s + "\n").map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(text) => print!("{text}"),
        Err(e) => eprintln!("ERROR:{e}"),
    }
}
