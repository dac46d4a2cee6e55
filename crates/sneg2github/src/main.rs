use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use sneg2github_core::export::{ExportOptions, ExportReport, export_from_forum};
use sneg2github_core::http::{PageClient, PageClientConfig};
use sneg2github_core::import::{
    ImportOptions, ImportReport, IssueAction, import_to_tracker,
};
use sneg2github_core::runtime::{
    ResolutionContext, ResolvedRuntime, RuntimeOverrides, normalize_for_display, resolve_runtime,
};
use sneg2github_core::storage::Database;
use sneg2github_core::tracker::{GitHubClient, GitHubClientConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sneg2github",
    version,
    about = "Export snegopat.ru/forum bug reports to GitHub issues"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Path to database")]
    db: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(name = "init-db", about = "Init script database")]
    InitDb,
    #[command(
        name = "export-from-forum",
        about = "Export forum topics to database"
    )]
    ExportFromForum(ExportArgs),
    #[command(name = "import-to-github", about = "Import issues to github")]
    ImportToGithub(ImportArgs),
    #[command(name = "list-topics", about = "Print topics stored in the database")]
    ListTopics(ListArgs),
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(
        long = "offset",
        value_name = "N",
        help = "Listing page offset (repeatable; overrides configured offsets)"
    )]
    offsets: Vec<u32>,
    #[arg(long, help = "Print the export report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long, help = "Show what would be created without calling GitHub")]
    dry_run: bool,
    #[arg(long, help = "Print the import report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, help = "Print topics as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };

    let runtime = resolve(&cli.db, &cli.config)?;
    if cli.diagnostics {
        println!("[diagnostics]\n{}\n", runtime.diagnostics());
    }

    match command {
        Commands::InitDb => run_init_db(&runtime),
        Commands::ExportFromForum(args) => run_export(&runtime, args),
        Commands::ImportToGithub(args) => run_import(&runtime, args),
        Commands::ListTopics(args) => run_list_topics(&runtime, args),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env("SNEG2GITHUB_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

fn resolve(db: &Option<PathBuf>, config: &Option<PathBuf>) -> Result<ResolvedRuntime> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = RuntimeOverrides {
        db: db.clone(),
        config: config.clone(),
    };
    resolve_runtime(&context, &overrides)
}

fn open_database(runtime: &ResolvedRuntime) -> Result<Database> {
    let db = Database::open(&runtime.db_path)?;
    if !db.table_exists("topics")? {
        anyhow::bail!(
            "database {} has no topics table; run `sneg2github init-db` first",
            normalize_for_display(&runtime.db_path)
        );
    }
    Ok(db)
}

fn run_init_db(runtime: &ResolvedRuntime) -> Result<()> {
    tracing::info!("Initializing database - Start");
    let db = Database::open(&runtime.db_path)?;
    let tables = db.init_schema()?;
    for table in &tables {
        tracing::info!("Created table `{table}`");
    }
    tracing::info!("Initializing database - Done");

    println!("init-db");
    println!("db_path: {}", normalize_for_display(&runtime.db_path));
    println!("tables: {}", tables.join(", "));
    Ok(())
}

fn run_export(runtime: &ResolvedRuntime, args: ExportArgs) -> Result<()> {
    let db = open_database(runtime)?;
    let mut options = ExportOptions::from_config(&runtime.config);
    if !args.offsets.is_empty() {
        options.page_offsets = args.offsets.clone();
    }
    let mut source = PageClient::new(PageClientConfig::from_config(&runtime.config))?;

    tracing::info!("Loading forum topics");
    let report = export_from_forum(&db, &mut source, &options)?;
    if args.json {
        return print_json(&report);
    }
    print_export_report(runtime, &report);
    Ok(())
}

fn print_export_report(runtime: &ResolvedRuntime, report: &ExportReport) {
    println!("export-from-forum");
    println!("db_path: {}", normalize_for_display(&runtime.db_path));
    for page in &report.pages {
        println!(
            "page.{}: listed={} inserted={} already_stored={}",
            page.offset, page.listed, page.inserted, page.already_stored
        );
    }
    println!("listed: {}", report.listed);
    println!("inserted: {}", report.inserted);
    println!("already_stored: {}", report.already_stored);
    println!("requests: {}", report.request_count);
}

fn run_import(runtime: &ResolvedRuntime, args: ImportArgs) -> Result<()> {
    let db = open_database(runtime)?;
    let options = ImportOptions::from_config(&runtime.config, args.dry_run);

    let report = if args.dry_run {
        import_to_tracker::<GitHubClient>(&db, None, &options)?
    } else {
        let token = runtime.require_github_token()?;
        let config = GitHubClientConfig::from_config(&runtime.config, token)?;
        if !args.json {
            println!("target: {}", config.target.slug());
        }
        let mut client = GitHubClient::new(config)?;
        import_to_tracker(&db, Some(&mut client), &options)?
    };
    if args.json {
        return print_json(&report);
    }
    print_import_report(&report);
    Ok(())
}

fn print_import_report(report: &ImportReport) {
    println!("import-to-github");
    println!("dry_run: {}", report.dry_run);
    println!("considered: {}", report.considered);
    println!("created: {}", report.created);
    println!("failed: {}", report.failed);
    println!("requests: {}", report.request_count);
    for issue in &report.issues {
        let action = match issue.action {
            IssueAction::Created => "created",
            IssueAction::Rejected => "rejected",
            IssueAction::WouldCreate => "would_create",
        };
        match (&issue.status, &issue.detail) {
            (Some(status), Some(detail)) => {
                println!("issue.{action}: {} [{status}] {detail}", issue.title)
            }
            (Some(status), None) => println!("issue.{action}: {} [{status}]", issue.title),
            _ => println!("issue.{action}: {}", issue.title),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON output")?
    );
    Ok(())
}

fn run_list_topics(runtime: &ResolvedRuntime, args: ListArgs) -> Result<()> {
    let db = open_database(runtime)?;
    let topics = db.list_topics()?;

    if args.json {
        return print_json(&topics);
    }

    println!("topics.count: {}", topics.len());
    for topic in &topics {
        println!(
            "{}\t{}\t{}\t{}\t{} bytes",
            topic.id,
            topic.title,
            topic.href,
            if topic.author.is_empty() {
                "<none>"
            } else {
                &topic.author
            },
            topic.text.len()
        );
    }
    Ok(())
}
