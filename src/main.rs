use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jigyasa::analysis::{AnalysisDraft, AnalysisPatch, Caller, PlotConfiguration, PlotDraft};
use jigyasa::config::Config;
use jigyasa::graph::PlottersRenderer;
use jigyasa::ir::{ChartKind, PlotRequest};
use jigyasa::runtime::Artifact;
use jigyasa::store::JsonFileStore;
use jigyasa::{OutputFormat, Workspace};
use log::debug;
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "jigyasa")]
#[command(about = "Turn survey CSV uploads into charts and shareable analyses", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Id of the acting user
    #[arg(long, global = true, env = "JIGYASA_USER", default_value = "local")]
    user: String,

    /// Display name used as the default author
    #[arg(long, global = true, env = "JIGYASA_DISPLAY_NAME")]
    display_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a CSV file ('-' reads stdin)
    Ingest {
        file: String,
        /// Treat the input as a JSON array of records
        #[arg(long)]
        json: bool,
    },
    /// List your tables
    Tables,
    /// Build a chart descriptor from a stored table
    Plot {
        #[arg(long)]
        table: String,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        x: Option<String>,
        /// Repeat for several y columns
        #[arg(long = "y")]
        ys: Vec<String>,
        /// Also save the chart as a new single-plot analysis with this title
        #[arg(long)]
        save_as: Option<String>,
    },
    /// Group a table's rows by one or more columns
    GroupBy {
        #[arg(long)]
        table: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Save an analysis from a JSON draft ('-' reads stdin)
    Save { file: String },
    /// List your analyses
    Analyses,
    /// Show one analysis
    Show { id: String },
    /// Apply a JSON patch to an analysis ('-' reads stdin)
    Update { id: String, file: String },
    /// Delete an analysis
    Delete { id: String },
    /// Make an analysis public and write the rendered document
    Publish {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
        /// png or svg (defaults to the configured format)
        #[arg(long)]
        format: Option<OutputFormat>,
    },
    /// Render an already public analysis
    Export {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        format: Option<OutputFormat>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();
    debug!("Using data directory {}", config.data_dir.display());

    let store = JsonFileStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open store in '{}'", config.data_dir.display()))?;
    let workspace = Workspace::new(store, PlottersRenderer);

    let mut caller = Caller::new(args.user.clone());
    if let Some(name) = args.display_name.clone() {
        caller = caller.with_display_name(name);
    }

    match args.command {
        Command::Ingest { file, json } => {
            let text = read_input(&file)?;
            let summary = if json {
                let value = serde_json::from_str(&text).context("Input is not valid JSON")?;
                workspace.ingest_json(&value, &caller)?
            } else {
                workspace.ingest(&text, &caller)?
            };
            print_json(&summary)
        }
        Command::Tables => print_json(&workspace.list_tables(&caller)?),
        Command::Plot { table, kind, x, ys, save_as } => {
            let request = PlotRequest { table_id: table, kind, x, ys };
            let chart = workspace.build_plot(&request, &caller)?;
            match save_as {
                Some(title) => {
                    let kind: ChartKind = request.kind.parse()?;
                    let configuration = PlotConfiguration {
                        x_axis: request.x.clone().unwrap_or_default(),
                        y_axes: request.ys.clone(),
                    };
                    let plot = PlotDraft::from_chart(kind, Some(title.clone()), configuration, &chart)?;
                    let draft = AnalysisDraft {
                        title: Some(title),
                        plots: vec![plot],
                        ..Default::default()
                    };
                    print_json(&workspace.save_analysis(&caller, draft)?)
                }
                None => print_json(&chart),
            }
        }
        Command::GroupBy { table, columns } => print_json(&workspace.group_by(&table, &columns, &caller)?),
        Command::Save { file } => {
            let draft: AnalysisDraft =
                serde_json::from_str(&read_input(&file)?).context("Draft is not a valid analysis")?;
            print_json(&workspace.save_analysis(&caller, draft)?)
        }
        Command::Analyses => print_json(&workspace.list_analyses(&caller)?),
        Command::Show { id } => print_json(&workspace.get_analysis(&id, &caller)?),
        Command::Update { id, file } => {
            let patch: AnalysisPatch =
                serde_json::from_str(&read_input(&file)?).context("Patch is not a valid analysis update")?;
            print_json(&workspace.update_analysis(&id, &caller, patch)?)
        }
        Command::Delete { id } => {
            workspace.delete_analysis(&id, &caller)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Command::Publish { id, out, format } => {
            let mut options = config.render.clone();
            if let Some(format) = format {
                options.format = format;
            }
            let artifact = workspace.publish(&id, &caller, &options)?;
            write_artifact(&artifact, out.as_deref())
        }
        Command::Export { id, out, format } => {
            let mut options = config.render.clone();
            if let Some(format) = format {
                options.format = format;
            }
            let artifact = workspace.export_public(&id, &options)?;
            write_artifact(&artifact, out.as_deref())
        }
    }
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(file).with_context(|| format!("Failed to read '{}'", file))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).context("Failed to write to stdout")?;
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Write the document to `out` (or its own file name) and report where it went.
fn write_artifact(artifact: &Artifact, out: Option<&Path>) -> Result<()> {
    let path = out.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    fs::write(&path, &artifact.bytes).with_context(|| format!("Failed to write '{}'", path.display()))?;
    print_json(&serde_json::json!({
        "file_name": artifact.file_name,
        "content_type": artifact.content_type,
        "path": path.display().to_string(),
        "bytes": artifact.bytes.len(),
    }))
}
