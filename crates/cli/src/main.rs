use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use photocopy_core::{
    app_paths, execute_plan, generate_plan, load_config, rollback, validate_template,
    CancellationToken, DuplicateHandling, Geocoder, OperationKind, Plan, Progress,
    ProgressReporter, RelatedFileMode, RunConfig,
};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "photocopy")]
#[command(about = "Organizes photo and video collections by their metadata")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan and optionally execute an organize run
    Organize(OrganizeArgs),
    /// Undo a completed run from its transaction log
    Rollback(RollbackArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
}

#[derive(Debug, Args)]
struct RollbackArgs {
    /// Path to the transaction log file
    log: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Copy,
    Move,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DuplicatesArg {
    None,
    Skip,
    Rename,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RelatedArg {
    None,
    Strict,
    Loose,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Args)]
struct OrganizeArgs {
    #[arg(long)]
    source: PathBuf,
    #[arg(long)]
    destination: PathBuf,
    #[arg(long, value_enum, default_value_t = ModeArg::Copy)]
    mode: ModeArg,
    #[arg(long)]
    template: Option<String>,
    /// Execute the plan; without this flag only the plan is shown
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, default_value_t = false)]
    checksum: bool,
    #[arg(long, value_enum, default_value_t = DuplicatesArg::None)]
    duplicates: DuplicatesArg,
    #[arg(long)]
    duplicates_format: Option<String>,
    /// Allowed extensions; repeat for several (defaults to common media)
    #[arg(long = "ext")]
    extensions: Vec<String>,
    #[arg(long, value_parser = parse_date)]
    min_date: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date)]
    max_date: Option<NaiveDate>,
    #[arg(long, default_value_t = false)]
    skip_existing: bool,
    #[arg(long, default_value_t = false)]
    overwrite: bool,
    #[arg(long, value_enum, default_value_t = RelatedArg::None)]
    related: RelatedArg,
    #[arg(long)]
    gazetteer: Option<PathBuf>,
    #[arg(long)]
    min_population: Option<u64>,
    /// Worker threads; defaults to the CPU count
    #[arg(long)]
    parallel: Option<usize>,
    /// Skip the transaction log entirely (disables rollback)
    #[arg(long, default_value_t = false)]
    no_rollback: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("expected yyyy-mm-dd, got {value}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Organize(args) => cmd_organize(args),
        Commands::Rollback(args) => cmd_rollback(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn cmd_organize(args: OrganizeArgs) -> Result<()> {
    let defaults = load_config()?;

    let template = args.template.unwrap_or_else(|| defaults.template.clone());
    validate_template(&template)?;

    let allowed_extensions: HashSet<String> = if args.extensions.is_empty() {
        defaults
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    } else {
        args.extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    };

    let config = RunConfig {
        source: args.source,
        destination: args.destination,
        mode: match args.mode {
            ModeArg::Copy => OperationKind::Copy,
            ModeArg::Move => OperationKind::Move,
        },
        template,
        dry_run: !args.apply,
        enable_rollback: !args.no_rollback,
        calculate_checksums: args.checksum
            || defaults.calculate_checksums
            || !matches!(args.duplicates, DuplicatesArg::None),
        duplicate_handling: match args.duplicates {
            DuplicatesArg::None => DuplicateHandling::None,
            DuplicatesArg::Skip => DuplicateHandling::SkipDuplicates,
            DuplicatesArg::Rename => DuplicateHandling::RenameNumbered,
        },
        duplicates_format: args
            .duplicates_format
            .unwrap_or_else(|| defaults.duplicates_format.clone()),
        allowed_extensions,
        min_date: args.min_date,
        max_date: args.max_date,
        skip_existing: args.skip_existing,
        overwrite: args.overwrite,
        related_file_mode: match args.related {
            RelatedArg::None => RelatedFileMode::None,
            RelatedArg::Strict => RelatedFileMode::Strict,
            RelatedArg::Loose => RelatedFileMode::Loose,
        },
        gazetteer_path: args.gazetteer.or_else(|| defaults.gazetteer_path.clone()),
        minimum_population: args.min_population.unwrap_or(defaults.minimum_population),
        parallelism: args.parallel.unwrap_or_else(num_cpus::get),
    };

    let geocoder = Geocoder::new(config.gazetteer_path.clone(), config.minimum_population);
    geocoder.initialize();

    let cancel = CancellationToken::new();
    let plan = generate_plan(&config, &geocoder, &cancel)?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Table => print_plan(&plan),
    }

    if args.apply {
        let reporter = ConsoleReporter;
        let result = execute_plan(&plan, &config, &reporter, &cancel)?;
        eprintln!(
            "done: processed={} failed={} skipped={} bytes={}",
            result.processed, result.failed, result.skipped, result.total_bytes
        );
        for error in &result.errors {
            eprintln!(
                "  error: {} -> {}: {}",
                error.source_path.display(),
                error.destination_path.display(),
                error.message
            );
        }
        if let Some(log_path) = &result.log_path {
            eprintln!("transaction log: {}", log_path.display());
        }
    } else {
        eprintln!("dry-run: nothing was executed; pass --apply to run the plan");
    }

    Ok(())
}

fn cmd_rollback(args: RollbackArgs) -> Result<()> {
    let result = rollback(&args.log)?;
    println!(
        "rollback: restored={} failed={} directories_removed={}",
        result.files_restored, result.files_failed, result.directories_removed
    );
    for error in &result.errors {
        eprintln!("  {}", error);
    }
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("source -> destination");
    for operation in &plan.operations {
        println!(
            "{} -> {} ({:?})",
            operation.source_path.display(),
            operation.destination_path.display(),
            operation.kind
        );
        for related in &operation.related {
            println!(
                "  + {} -> {}",
                related.source_path.display(),
                related.destination_path.display()
            );
        }
    }
    for skipped in &plan.skipped {
        println!(
            "skip {} ({})",
            skipped.source_path.display(),
            skipped.reason
        );
    }

    println!(
        "\nsummary: operations={} skipped={} directories={} bytes={}",
        plan.operations.len(),
        plan.skipped.len(),
        plan.directories.len(),
        plan.total_bytes
    );
}

struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn report(&self, progress: &Progress) {
        eprint!(
            "\rprocessed={} failed={} skipped={} bytes={}",
            progress.processed, progress.failed, progress.skipped, progress.bytes
        );
    }

    fn complete(&self, _progress: &Progress) {
        eprintln!();
    }
}
