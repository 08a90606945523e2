use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tarkovdata_core::ammo::load_ammo_database;
use tarkovdata_core::ammo_sync::sync_ammunition;
use tarkovdata_core::apply::ApplyOptions;
use tarkovdata_core::caliber::fetch_caliber_list;
use tarkovdata_core::config::load_config;
use tarkovdata_core::confirm::{AssumeYes, Confirm, PromptConfirm};
use tarkovdata_core::export::build_export;
use tarkovdata_core::fetch::{PageFetcher, WikiClient};
use tarkovdata_core::hideout_sync::sync_hideout;
use tarkovdata_core::inspect::fetch_and_inspect;
use tarkovdata_core::levels::sync_levels;
use tarkovdata_core::quests::migrate_quest_storylines;
use tarkovdata_core::report::report_missing;
use tarkovdata_core::runtime::{
    AMMUNITION_FILE, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, resolve_paths,
};
use tarkovdata_core::status::{DatasetShape, scan_datasets};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "tarkovdata",
    version,
    about = "Keeps the Tarkov dataset in sync with the community wiki"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    export_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            export_dir: cli.export_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    #[command(about = "Show resolved paths and the datasets under the data directory")]
    Status,
    #[command(about = "List calibers linked from the wiki Ammunition page")]
    Calibers,
    #[command(about = "Print the first table layout of a wiki page")]
    Inspect(InspectArgs),
    Sync(SyncArgs),
    Report(ReportArgs),
    Migrate(MigrateArgs),
    #[command(about = "Rebuild the export directory from the data directory")]
    Export,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    url: String,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    #[arg(long, help = "Answer yes to every confirmation")]
    yes: bool,
    #[arg(long, help = "Show the planned changes without writing")]
    dry_run: bool,
}

impl ApplyArgs {
    fn options(&self) -> ApplyOptions {
        ApplyOptions {
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[command(subcommand)]
    command: SyncSubcommand,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    Ammo(ApplyArgs),
    Hideout(ApplyArgs),
    Levels(ApplyArgs),
}

#[derive(Debug, Args)]
struct ReportArgs {
    #[command(subcommand)]
    command: ReportSubcommand,
}

#[derive(Debug, Subcommand)]
enum ReportSubcommand {
    #[command(name = "missing-ammo")]
    MissingAmmo,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[command(subcommand)]
    command: MigrateSubcommand,
}

#[derive(Debug, Subcommand)]
enum MigrateSubcommand {
    Storyline(ApplyArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Calibers) => run_calibers(&runtime),
        Some(Commands::Inspect(InspectArgs { url })) => run_inspect(&runtime, &url),
        Some(Commands::Sync(SyncArgs { command })) => match command {
            SyncSubcommand::Ammo(args) => run_sync_ammo(&runtime, args),
            SyncSubcommand::Hideout(args) => run_sync_hideout(&runtime, args),
            SyncSubcommand::Levels(args) => run_sync_levels(&runtime, args),
        },
        Some(Commands::Report(ReportArgs { command })) => match command {
            ReportSubcommand::MissingAmmo => run_report_missing_ammo(&runtime),
        },
        Some(Commands::Migrate(MigrateArgs { command })) => match command {
            MigrateSubcommand::Storyline(args) => run_migrate_storyline(&runtime, args),
        },
        Some(Commands::Export) => run_export(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;

    println!("Initialized tarkovdata layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("export_dir: {}", normalize_path(&paths.export_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = scan_datasets(&paths)?;

    println!("runtime status");
    println!(
        "project_root: {} ({})",
        normalize_path(&paths.project_root),
        paths.root_source.as_str()
    );
    println!(
        "data_dir: {} ({})",
        normalize_path(&paths.data_dir),
        paths.data_source.as_str()
    );
    println!(
        "export_dir: {} ({})",
        normalize_path(&paths.export_dir),
        paths.export_source.as_str()
    );
    println!("data_dir_exists: {}", format_flag(report.data_dir_exists));
    println!("export_dir_exists: {}", format_flag(report.export_dir_exists));
    println!("config_exists: {}", format_flag(report.config_exists));
    println!("datasets.count: {}", report.datasets.len());
    for dataset in &report.datasets {
        let shape = match &dataset.shape {
            DatasetShape::Object => "object".to_string(),
            DatasetShape::Array => "array".to_string(),
            DatasetShape::Scalar => "scalar".to_string(),
            DatasetShape::Invalid(error) => format!("invalid ({error})"),
        };
        println!(
            "datasets.file: {} {shape} entries={} bytes={} hash={}",
            dataset.relative_path, dataset.entries, dataset.bytes, dataset.hash
        );
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_calibers(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut client = WikiClient::from_config(&config)?;
    let calibers = fetch_caliber_list(&mut client, &config)?;

    println!("calibers.count: {}", calibers.len());
    for caliber in &calibers {
        println!("{} -> {} ({})", caliber.name, caliber.caliber_id, caliber.wiki_url);
    }
    log_request_count(&client);
    Ok(())
}

fn run_inspect(runtime: &RuntimeOptions, url: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut client = WikiClient::from_config(&config)?;
    let target = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        config.page_url(url)
    };
    let inspection = fetch_and_inspect(&mut client, &target)?;

    println!("inspect {target}");
    println!("tables: {}", inspection.table_count);
    if inspection.table_count == 0 {
        println!("No tables found");
        return Ok(());
    }
    println!("headers: {}", inspection.headers.join(" | "));
    if inspection.first_row.is_empty() {
        println!("first_row: <none>");
    } else {
        for (index, cell) in inspection.first_row.iter().enumerate() {
            println!("first_row[{index}]: {cell}");
        }
    }
    Ok(())
}

fn run_sync_ammo(runtime: &RuntimeOptions, args: ApplyArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut client = WikiClient::from_config(&config)?;
    let mut confirm = confirmer(args.yes);

    let outcome = sync_ammunition(
        &paths,
        &config,
        &mut client,
        confirm.as_mut(),
        args.options(),
        &mut io::stdout(),
    )?;
    tracing::debug!(outcome = outcome.as_str(), "ammunition sync finished");
    log_request_count(&client);
    Ok(())
}

fn run_sync_hideout(runtime: &RuntimeOptions, args: ApplyArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut client = WikiClient::from_config(&config)?;
    let mut confirm = confirmer(args.yes);

    let outcome = sync_hideout(
        &paths,
        &config,
        &mut client,
        confirm.as_mut(),
        args.options(),
        &mut io::stdout(),
    )?;
    tracing::debug!(outcome = outcome.as_str(), "hideout sync finished");
    log_request_count(&client);
    Ok(())
}

fn run_sync_levels(runtime: &RuntimeOptions, args: ApplyArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut client = WikiClient::from_config(&config)?;
    let mut confirm = confirmer(args.yes);

    let outcome = sync_levels(
        &paths,
        &config,
        &mut client,
        confirm.as_mut(),
        args.options(),
        &mut io::stdout(),
    )?;
    tracing::debug!(outcome = outcome.as_str(), "levels sync finished");
    log_request_count(&client);
    Ok(())
}

fn run_report_missing_ammo(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let database = load_ammo_database(&paths.data_file(AMMUNITION_FILE))?;
    let mut client = WikiClient::from_config(&config)?;

    let calibers = fetch_caliber_list(&mut client, &config)?;
    let report = report_missing(&database, &calibers, &mut client)?;

    println!("ammunition file");
    println!("  total: {}", report.total_in_file);
    println!("  complete: {}", report.complete_entries());
    println!("  empty: {}", report.empty_entries);
    println!(
        "  calibers: {}",
        report
            .calibers_in_file
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("wiki");
    println!("  calibers: {}", report.calibers_on_wiki.len());
    println!("  ammunition: {}", report.total_on_wiki);
    if report.missing_calibers.is_empty() {
        println!("missing calibers: <none>");
    } else {
        println!("missing calibers: {}", report.missing_calibers.join(", "));
    }
    for coverage in &report.coverage {
        if coverage.is_complete() {
            println!(
                "{}: {} on the wiki, all present",
                coverage.caliber.name, coverage.wiki_count
            );
        } else {
            println!(
                "{}: {} on the wiki, {} missing",
                coverage.caliber.name,
                coverage.wiki_count,
                coverage.missing.len()
            );
            for name in &coverage.missing {
                println!("  - {name}");
            }
        }
    }
    for (caliber, error) in &report.failed {
        println!("skipped {caliber}: {error}");
    }
    println!(
        "missing from file: {}",
        report.missing_from_file().count()
    );
    log_request_count(&client);
    Ok(())
}

fn run_migrate_storyline(runtime: &RuntimeOptions, args: ApplyArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let mut confirm = confirmer(args.yes);
    let outcome = migrate_quest_storylines(
        &paths,
        confirm.as_mut(),
        args.options(),
        &mut io::stdout(),
    )?;
    tracing::debug!(outcome = outcome.as_str(), "storyline migration finished");
    Ok(())
}

fn run_export(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let exported = build_export(&paths)?;

    println!("export");
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("export_dir: {}", normalize_path(&paths.export_dir));
    for file in &exported {
        println!(
            "{} -> {} ({} entries, {})",
            file.source,
            file.output,
            file.entries,
            file.outcome.as_str()
        );
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn confirmer(assume_yes: bool) -> Box<dyn Confirm> {
    if assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(PromptConfirm::stdio())
    }
}

fn log_request_count<F: PageFetcher>(fetcher: &F) {
    tracing::debug!(requests = fetcher.request_count(), "wiki requests made");
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        export_dir: runtime.export_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

