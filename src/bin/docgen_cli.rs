//! DocGen CLI - Bridge interface for the presentation layer
//!
//! Commands: inspect, summary, generate, export
//! Outputs JSON to stdout, logs to stderr
//! Returns non-zero on failure

use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use docgen_core::{
    ConfigPatch, ExportFormat, Pipeline, PipelineError, SessionConfig, SourceFile, SourceKind,
};

#[derive(Parser)]
#[command(name = "docgen-cli")]
#[command(about = "DocGen CLI - turn spreadsheets and JSON into batch documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Session configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct InputArgs {
    /// Spreadsheet or JSON file to ingest
    #[arg(short, long)]
    input: PathBuf,

    /// File kind (EXCEL or JSON); inferred from the extension when omitted
    #[arg(short, long)]
    kind: Option<SourceKind>,
}

#[derive(Args)]
struct DocumentArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Document type: DISBURSE, PENERUSAN, INVOICE, PURCHASE_ORDER, CUSTOM
    #[arg(short = 't', long = "type")]
    document_type: String,

    /// Document-type name written into the payload (jsonName)
    #[arg(long)]
    json_name: Option<String>,

    #[arg(long)]
    source_system: Option<String>,

    #[arg(long)]
    sender_doc_no: Option<String>,

    #[arg(long)]
    fast_seq_no: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized record set
    Inspect(InputArgs),

    /// Print the aggregate summary of a file
    Summary(InputArgs),

    /// Print the generated document
    Generate(DocumentArgs),

    /// Export the generated document
    Export {
        #[command(flatten)]
        document: DocumentArgs,

        /// Output format: json or xlsx
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Directory to write into; prints the artifact base64-encoded when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docgen_core=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match SessionConfig::from_json_file(path) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        },
        None => SessionConfig::default(),
    };
    let pipeline = Pipeline::new(config);

    let output = match cli.command {
        Commands::Inspect(input) => ingest(&pipeline, &input)
            .await
            .and_then(|_| json_value(&pipeline.records().as_deref())),

        Commands::Summary(input) => ingest(&pipeline, &input)
            .await
            .and_then(|_| json_value(&pipeline.summary())),

        Commands::Generate(args) => generate(&pipeline, args)
            .await
            .and_then(|_| json_value(&pipeline.document().as_deref())),

        Commands::Export { document, format, out } => match generate(&pipeline, document).await {
            Ok(()) => export(&pipeline, format, out.as_deref()).await,
            Err(e) => Err(e),
        },
    };

    match output {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => fail(&PipelineError::ExportFailed(e.to_string())),
        },
        Err(e) => fail(&e),
    }
}

async fn ingest(pipeline: &Pipeline, args: &InputArgs) -> Result<(), PipelineError> {
    let kind = args
        .kind
        .or_else(|| SourceKind::from_path(&args.input))
        .ok_or_else(|| PipelineError::InvalidFormat(format!("cannot infer file kind of {}", args.input.display())))?;
    pipeline.select_file_kind(kind);

    let file = SourceFile::open(&args.input)
        .await
        .map_err(|e| PipelineError::InvalidFormat(format!("{}: {e}", args.input.display())))?;
    pipeline.ingest(Some(file)).await.map(|_| ())
}

async fn generate(pipeline: &Pipeline, args: DocumentArgs) -> Result<(), PipelineError> {
    pipeline.configure(ConfigPatch {
        json_name: args.json_name,
        source_system: args.source_system,
        sender_doc_no: args.sender_doc_no,
        fast_seq_no: args.fast_seq_no,
        ..Default::default()
    });
    ingest(pipeline, &args.input).await?;
    pipeline.generate(&args.document_type).map(|_| ())
}

async fn export(
    pipeline: &Pipeline,
    format: ExportFormat,
    out: Option<&Path>,
) -> Result<serde_json::Value, PipelineError> {
    match out {
        Some(dir) => {
            let path = pipeline.export_as(format, dir).await?;
            Ok(serde_json::json!({
                "success": true,
                "path": path.display().to_string(),
            }))
        }
        None => {
            let artifact = pipeline.render(format).await?;
            Ok(serde_json::json!({
                "success": true,
                "filename": artifact.filename,
                "mimeType": artifact.format.mime_type(),
                "dataBase64": base64::engine::general_purpose::STANDARD.encode(&artifact.bytes),
            }))
        }
    }
}

fn json_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, PipelineError> {
    serde_json::to_value(value).map_err(|e| PipelineError::ExportFailed(e.to_string()))
}

fn fail(error: &PipelineError) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
    });
    println!("{output}");
    ExitCode::FAILURE
}
