use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rnaseq_utilities::app::{
    App, DownloadRequest, FetchResult, MergeRequest, RrnaRequest, RunResult, sheet_indexes,
};
use rnaseq_utilities::config::{ConfigLoader, Credentials};
use rnaseq_utilities::domain::{MergeBackend, ReadLayout};
use rnaseq_utilities::error::PipelineError;
use rnaseq_utilities::output::{JsonOutput, OutputMode};
use rnaseq_utilities::progress::TracingSink;
use rnaseq_utilities::remote::FtpRemote;
use rnaseq_utilities::tpm;

#[derive(Parser)]
#[command(name = "rnaseq-utils")]
#[command(about = "Utilities for RNA-Seq data: download, rRNA removal, lane merging, TPM statistics")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./rnaseq-utils.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print the run result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download RNA-Seq files from the sequencing FTP server and verify their MD5 sums")]
    Download(DownloadArgs),
    #[command(about = "Remove rRNA reads from RNA-Seq data with bowtie2")]
    RemoveRrna(RrnaArgs),
    #[command(about = "Merge RNA-Seq files across lanes")]
    MergeLanes(MergeArgs),
    #[command(about = "Generate mean and standard deviation of TPM values per condition")]
    TpmStats(TpmArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct LayoutArgs {
    /// RNA-Seq data are single end reads
    #[arg(short = 's', long)]
    single_end: bool,

    /// RNA-Seq data are paired end reads, identified by these two pair tags (e.g. r_1 r_2)
    #[arg(short = 'p', long, num_args = 2, value_names = ["PAIR_TAG", "PAIR_TAG"])]
    paired_end: Option<Vec<String>>,
}

impl LayoutArgs {
    fn layout(self) -> miette::Result<ReadLayout> {
        ReadLayout::from_flags(self.single_end, self.paired_end)
            .ok_or_else(|| miette::Report::msg("choose either --single-end or --paired-end <TAG> <TAG>"))
    }
}

#[derive(Args)]
struct DownloadArgs {
    /// Directory to download into
    #[arg(short = 'd', long)]
    directory: Utf8PathBuf,

    /// Remote file prefix, usually the SLX identifier (e.g. SLX-12345)
    #[arg(long)]
    prefix: String,

    /// Tab-separated sample sheet with Name and Index columns; enables samples.csv
    #[arg(short = 'f', long)]
    sample_sheet: Option<Utf8PathBuf>,

    /// FTP host, overriding the config
    #[arg(long)]
    host: Option<String>,
}

#[derive(Args)]
struct RrnaArgs {
    /// Location of the RNA-Seq data
    #[arg(short = 'd', long)]
    directory: Utf8PathBuf,

    /// Path to the rRNA library .fa file, with its bowtie2 index alongside
    #[arg(short = 'l', long)]
    library: Utf8PathBuf,

    #[command(flatten)]
    layout: LayoutArgs,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct IndexSource {
    /// Tab-separated sample sheet with an Index column
    #[arg(short = 'f', long)]
    sample_sheet: Option<Utf8PathBuf>,

    /// Sample indexes to merge, instead of a sample sheet
    #[arg(long, num_args = 1..)]
    index: Vec<String>,
}

#[derive(Args)]
struct MergeArgs {
    /// Location of the RNA-Seq data
    #[arg(short = 'd', long)]
    directory: Utf8PathBuf,

    /// Tags that identify the samples' lanes, e.g. s_1 s_2
    #[arg(short = 'l', long, num_args = 1.., required = true)]
    lane_tags: Vec<String>,

    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    indexes: IndexSource,

    #[arg(long)]
    backend: Option<MergeBackend>,
}

#[derive(Args)]
struct TpmArgs {
    /// TPM table; the sample table is the same path without `_tpm.txt`
    #[arg(short = 't', long)]
    tpm_file: Utf8PathBuf,

    /// Gene id reference (CSV: x,geneName,gene,transcript_id,...)
    #[arg(short = 'g', long)]
    gene_ids: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::InvalidDirectory { .. }
        | PipelineError::MissingReferenceFasta(_)
        | PipelineError::MissingReferenceIndex(_)
        | PipelineError::NoInputFiles(_)
        | PipelineError::MissingCredentials(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_) => 2,
        PipelineError::Remote(_) | PipelineError::MissingTool(_) => 3,
        PipelineError::RetryBudgetExhausted { .. } | PipelineError::UnitsFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(config);
    let sink = TracingSink;

    match cli.command {
        Commands::Download(args) => {
            let mut settings = app.config().remote.clone();
            if let Some(host) = args.host {
                settings.host = host;
            }
            let mut remote = FtpRemote::new(settings, Credentials::from_env()?);
            let result = app.download(
                DownloadRequest {
                    directory: args.directory,
                    prefix: args.prefix,
                    sample_sheet: args.sample_sheet,
                },
                &mut remote,
                &sink,
            )?;
            remote.quit();
            print_fetch(&result, output_mode)?;
        }
        Commands::RemoveRrna(args) => {
            let result = app.remove_rrna(
                RrnaRequest {
                    directory: args.directory,
                    library: args.library,
                    layout: args.layout.layout()?,
                },
                &sink,
            )?;
            finish_run(result, output_mode)?;
        }
        Commands::MergeLanes(args) => {
            let indexes = match args.indexes.sample_sheet {
                Some(path) => sheet_indexes(&path, &sink)?,
                None => args
                    .indexes
                    .index
                    .iter()
                    .map(|index| index.replace('-', "_"))
                    .collect(),
            };
            let result = app.merge_lanes(
                MergeRequest {
                    directory: args.directory,
                    lane_tags: args.lane_tags,
                    layout: args.layout.layout()?,
                    indexes,
                    backend: args.backend,
                },
                &sink,
            )?;
            finish_run(result, output_mode)?;
        }
        Commands::TpmStats(args) => {
            let result = tpm::summarise(&args.tpm_file, args.gene_ids.as_deref(), &sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_tpm(&result).into_diagnostic()?,
                OutputMode::Text => {
                    for path in &result.outputs {
                        println!("{path}");
                    }
                }
            }
        }
    }

    tracing::info!("Process complete");
    Ok(())
}

fn print_fetch(result: &FetchResult, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_fetch(result).into_diagnostic(),
        OutputMode::Text => {
            println!(
                "{} files in {} verified after {} attempt(s)",
                result.download.files.len(),
                result.download.directory,
                result.download.attempts
            );
            if let Some(path) = &result.samples_table {
                println!("sample table: {path}");
            }
            Ok(())
        }
    }
}

fn finish_run(result: RunResult, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Text => {
            let summary = &result.summary;
            println!(
                "{}: {} processed, {} already done, {} failed",
                result.output_dir,
                summary.processed.len(),
                summary.skipped.len(),
                summary.failed.len()
            );
            for failed in &summary.failed {
                println!("  failed {}: {}", failed.key, failed.reason);
            }
        }
    }
    result.summary.into_result()?;
    Ok(())
}
