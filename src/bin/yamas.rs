use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use yamas::app::{App, ContinueRequest, DownloadRequest, ExportRequest, QiitaRequest};
use yamas::config::ConfigLoader;
use yamas::domain::{DataType, DatasetId};
use yamas::error::YamasError;
use yamas::exec::SystemToolRunner;
use yamas::ncbi::EutilsClient;
use yamas::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "yamas")]
#[command(about = "Download, convert and profile 16S/18S amplicon and shotgun sequencing datasets")]
#[command(version)]
struct Cli {
    /// JSON config file; defaults to ./yamas.json, then the user config directory
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Print the run report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and process datasets from scratch")]
    Download(DownloadArgs),
    #[command(about = "Resume an interrupted run")]
    Continue(ContinueArgs),
    #[command(about = "Import a preprocessed Qiita study (multiplexed fastq + prep info)")]
    Qiita(QiitaArgs),
    #[command(about = "Denoise, classify and export a finished amplicon run")]
    Export(ExportArgs),
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(required = true)]
    datasets: Vec<String>,

    #[arg(long = "type", value_enum, ignore_case = true)]
    data_type: DataType,

    /// Use this accession list instead of querying the run-info service
    #[arg(long)]
    acc_list: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ContinueArgs {
    dataset: String,

    path: Utf8PathBuf,

    #[arg(long = "type", value_enum, ignore_case = true)]
    data_type: DataType,

    /// Re-derive the run state from converted reads instead of the checkpoint
    #[arg(long)]
    from_reads: bool,
}

#[derive(Args)]
struct QiitaArgs {
    /// Name of the workspace created under the storage location
    dataset: String,

    /// The study's "preprocessed fastq" download
    fastq: Utf8PathBuf,

    /// The study's prep information file; must have a `barcode` column
    metadata: Utf8PathBuf,

    #[arg(long = "type", value_enum, ignore_case = true)]
    data_type: DataType,
}

#[derive(Args)]
struct ExportArgs {
    path: Utf8PathBuf,

    /// Trim position; give it twice for paired-end reads (forward, reverse)
    #[arg(long, required = true)]
    trim: Vec<u32>,

    /// Truncation length; give it twice for paired-end reads (forward, reverse)
    #[arg(long, required = true)]
    trunc: Vec<u32>,

    #[arg(long)]
    classifier: Utf8PathBuf,

    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<YamasError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &YamasError) -> u8 {
    match error {
        YamasError::Input(_)
        | YamasError::InvalidDatasetId(_)
        | YamasError::InvalidDataType(_)
        | YamasError::Resumption(_) => 2,
        YamasError::Stage { .. }
        | YamasError::ToolFailed { .. }
        | YamasError::MissingOutput(_)
        | YamasError::MissingTool(_)
        | YamasError::RunInfoHttp(_)
        | YamasError::RunInfoStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(SystemToolRunner::new(), EutilsClient::new()?, config);

    match cli.command {
        Commands::Download(args) => {
            let datasets = args
                .datasets
                .iter()
                .map(|value| value.parse::<DatasetId>())
                .collect::<Result<Vec<_>, _>>()?;
            let request = DownloadRequest {
                datasets,
                data_type: args.data_type,
                accession_list: args.acc_list,
            };
            match output_mode {
                OutputMode::Json => {
                    let result = app.download(request, &JsonOutput)?;
                    JsonOutput::print_download(&result).into_diagnostic()?;
                }
                OutputMode::Human => {
                    let result = app.download(request, &ConsoleOutput)?;
                    ConsoleOutput::print_download(&result);
                }
            }
        }
        Commands::Continue(args) => {
            let request = ContinueRequest {
                dataset: args.dataset.parse()?,
                root: args.path,
                data_type: args.data_type,
                from_reads: args.from_reads,
            };
            match output_mode {
                OutputMode::Json => {
                    let report = app.continue_run(request, &JsonOutput)?;
                    JsonOutput::print_report(&report).into_diagnostic()?;
                }
                OutputMode::Human => {
                    let report = app.continue_run(request, &ConsoleOutput)?;
                    ConsoleOutput::print_report(&report);
                }
            }
        }
        Commands::Qiita(args) => {
            let request = QiitaRequest {
                dataset: args.dataset.parse()?,
                preprocessed_fastq: args.fastq,
                prep_metadata: args.metadata,
                data_type: args.data_type,
            };
            match output_mode {
                OutputMode::Json => {
                    let report = app.qiita(request, &JsonOutput)?;
                    JsonOutput::print_report(&report).into_diagnostic()?;
                }
                OutputMode::Human => {
                    let report = app.qiita(request, &ConsoleOutput)?;
                    ConsoleOutput::print_report(&report);
                }
            }
        }
        Commands::Export(args) => {
            let request = ExportRequest {
                root: args.path,
                trim: args.trim,
                trunc: args.trunc,
                classifier: args.classifier,
                threads: args.threads,
            };
            match output_mode {
                OutputMode::Json => {
                    let report = app.export(request, &JsonOutput)?;
                    JsonOutput::print_report(&report).into_diagnostic()?;
                }
                OutputMode::Human => {
                    let report = app.export(request, &ConsoleOutput)?;
                    ConsoleOutput::print_report(&report);
                }
            }
        }
    }
    Ok(())
}
