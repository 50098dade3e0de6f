use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use langual_import::app::{ProgressSink, ReconciliationDriver, RunOptions, emit};
use langual_import::config::{ConfigLoader, ResolvedConfig};
use langual_import::eol::EolHttpClient;
use langual_import::error::LangualError;
use langual_import::output::{JsonOutput, OutputMode, TextOutput};
use langual_import::report::ImportReport;

#[derive(Parser)]
#[command(name = "langual-import")]
#[command(about = "Differential importer for the LanguaL food description thesaurus")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Merge a LanguaL release into the database and regenerate the ontology")]
    Run(RunArgs),
    #[command(about = "Regenerate the ontology and OntoFox specs from the database only")]
    Emit(EmitArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    /// Do not contact EOL; taxon lookups stay queued for the next run.
    #[arg(long)]
    offline: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct EmitArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(langual) = report.downcast_ref::<LangualError>() {
            return ExitCode::from(map_exit_code(langual));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LangualError) -> u8 {
    match error {
        LangualError::MissingConfig
        | LangualError::ConfigRead(_)
        | LangualError::ConfigParse(_)
        | LangualError::InvalidConfig(_)
        | LangualError::SourceRead { .. } => 2,
        LangualError::EolHttp(_) | LangualError::EolStatus { .. } | LangualError::EolResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            let config = ConfigLoader::resolve(args.config.as_deref())?;
            let mode = output_mode(args.json);
            let options = RunOptions {
                offline: args.offline,
            };
            let reports = run_imports(&config, options, sink_for(mode))?;
            print_reports(mode, &reports)
        }
        Commands::Emit(args) => {
            let config = ConfigLoader::resolve(args.config.as_deref())?;
            let mode = output_mode(args.json);
            let reports = emit(&config, sink_for(mode))?;
            print_reports(mode, &reports)
        }
    }
}

/// Each import may point at its own EOL mirror, so clients are per job.
fn run_imports(
    config: &ResolvedConfig,
    options: RunOptions,
    sink: &dyn ProgressSink,
) -> Result<Vec<ImportReport>, LangualError> {
    let mut reports = Vec::with_capacity(config.imports.len());
    for job in &config.imports {
        let client = EolHttpClient::new(&job.taxon.base_url)?;
        let driver = ReconciliationDriver::new(client);
        reports.push(driver.run_job(job, options, sink)?);
    }
    Ok(reports)
}

fn output_mode(json: bool) -> OutputMode {
    if json {
        OutputMode::Json
    } else {
        OutputMode::Text
    }
}

fn sink_for(mode: OutputMode) -> &'static dyn ProgressSink {
    match mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &TextOutput,
    }
}

fn print_reports(mode: OutputMode, reports: &[ImportReport]) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print_reports(reports).into_diagnostic(),
        OutputMode::Text => TextOutput::print_reports(reports).into_diagnostic(),
    }
}
