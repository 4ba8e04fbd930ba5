use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::thread;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use serial_mirror::app::{App, CycleReport, PollReport, ProgressSink};
use serial_mirror::config::{ConfigLoader, ResolvedConfig};
use serial_mirror::domain::MatchMode;
use serial_mirror::error::MirrorError;
use serial_mirror::output::{JsonOutput, LogSink, OutputMode};
use serial_mirror::site::HttpSiteClient;
use serial_mirror::store::Store;

#[derive(Parser)]
#[command(name = "smirror")]
#[command(about = "Keep a resumable local mirror of serialized works in sync with their source site")]
#[command(version, author)]
struct Cli {
    /// Path to the JSON config (defaults to ./smirror.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON reports on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Poll the remote index and mirror every work, forever")]
    Run(RunArgs),
    #[command(about = "Sync, verify and download a single work")]
    Cycle(UrlArgs),
    #[command(about = "Bootstrap or update the catalog of a single work")]
    Sync(SyncArgs),
    #[command(about = "Download every incomplete item of a cataloged work")]
    Download(TitleArgs),
    #[command(about = "Repair completion flags against the files on disk")]
    Check(TitleArgs),
    #[command(about = "List cataloged works")]
    List,
    #[command(about = "Show the installments of a cataloged work")]
    Show(TitleArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,

    /// Stop after one pass over the index
    #[arg(long)]
    once: bool,
}

#[derive(Args)]
struct UrlArgs {
    url: String,
}

#[derive(Args)]
struct SyncArgs {
    url: String,

    /// Which installment field identifies an installment already cataloged
    #[arg(long, value_enum, default_value_t = MatchMode::ByLabel)]
    mode: MatchMode,
}

#[derive(Args)]
struct TitleArgs {
    title: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MirrorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MirrorError) -> u8 {
    match error {
        MirrorError::CatalogNotFound(_) => 2,
        MirrorError::ConfigRead(_)
        | MirrorError::ConfigParse(_)
        | MirrorError::InvalidSelector { .. } => 2,
        MirrorError::Http { .. } | MirrorError::HttpStatus { .. } => 3,
        MirrorError::Extract { .. } | MirrorError::InvalidUrl(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(&config)?;
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    };

    match cli.command {
        Commands::Run(args) => run_loop(&app, &config, args, output_mode, sink),
        Commands::Cycle(args) => {
            let report = app.run_cycle(&args.url, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_cycle(&report).into_diagnostic(),
                OutputMode::Human => {
                    print_cycle_summary(&report);
                    Ok(())
                }
            }
        }
        Commands::Sync(args) => {
            let report = app.sync_url(&args.url, args.mode, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_sync(&report).into_diagnostic(),
                OutputMode::Human => {
                    println!(
                        "{}: {} added, {} relisted, {} skipped{}",
                        report.title,
                        report.added.len(),
                        report.relisted.len(),
                        report.skipped.len(),
                        if report.bootstrapped { " (bootstrap)" } else { "" }
                    );
                    Ok(())
                }
            }
        }
        Commands::Download(args) => {
            let report = app.advance(&args.title, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_advance(&report).into_diagnostic(),
                OutputMode::Human => {
                    println!(
                        "{}: {} downloaded, {} fetch failures, {} decode failures{}",
                        report.title,
                        report.downloaded,
                        report.fetch_failures.len(),
                        report.decode_failures.len(),
                        if report.needs_resync { ", needs resync" } else { "" }
                    );
                    Ok(())
                }
            }
        }
        Commands::Check(args) => {
            let report = app.reconcile(&args.title, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_reconcile(&report).into_diagnostic(),
                OutputMode::Human => {
                    println!(
                        "{}: {} marked incomplete, {} marked complete",
                        report.title, report.downgraded, report.upgraded
                    );
                    Ok(())
                }
            }
        }
        Commands::List => {
            let result = app.list(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic(),
                OutputMode::Human => {
                    for work in &result.works {
                        println!(
                            "{}  {}/{} items  {}{}",
                            work.title,
                            work.complete_items,
                            work.items,
                            if work.complete { "complete" } else { "incomplete" },
                            if work.needs_resync { "  (needs resync)" } else { "" }
                        );
                    }
                    Ok(())
                }
            }
        }
        Commands::Show(args) => {
            let result = app.show(&args.title, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_show(&result).into_diagnostic(),
                OutputMode::Human => {
                    println!("{} <{}>", result.work.title, result.work.url);
                    for installment in &result.installments {
                        println!(
                            "  {}  {}/{}{}",
                            installment.label,
                            installment.complete_items,
                            installment.items,
                            if installment.complete { "  done" } else { "" }
                        );
                    }
                    Ok(())
                }
            }
        }
    }
}

fn build_app(config: &ResolvedConfig) -> miette::Result<App<HttpSiteClient>> {
    let store = Store::new(config.catalog_dir.clone(), config.library_dir.clone());
    let client = HttpSiteClient::new(config.timeout)?;
    let app = App::new(
        store,
        client,
        &config.layout,
        config.options.clone(),
        config.index.clone(),
    )?;
    Ok(app)
}

fn run_loop(
    app: &App<HttpSiteClient>,
    config: &ResolvedConfig,
    args: RunArgs,
    output_mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    if !args.yes && !confirm()? {
        return Ok(());
    }
    loop {
        let report = app.poll_once(sink)?;
        match output_mode {
            OutputMode::Json => JsonOutput::print_poll(&report).into_diagnostic()?,
            OutputMode::Human => print_poll_summary(&report),
        }
        if args.once {
            return Ok(());
        }
        info!(
            seconds = config.poll_interval.as_secs(),
            "pass finished, waiting before the next one"
        );
        thread::sleep(config.poll_interval);
    }
}

fn confirm() -> miette::Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "[Press Enter to start mirroring, or type 'n' to abort] ").into_diagnostic()?;
    stdout.flush().into_diagnostic()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).into_diagnostic()?;
    Ok(!matches!(answer.trim(), "n" | "N" | "no"))
}

fn print_cycle_summary(report: &CycleReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    let color = if report.advance.complete { green } else { yellow };
    println!("{color}{}{reset}", report.title);
    println!("   new installments: {}", report.sync.added.len());
    println!(
        "   flags repaired: {} down, {} up",
        report.reconcile.downgraded, report.reconcile.upgraded
    );
    println!("   downloaded: {}", report.advance.downloaded);
    if !report.advance.fetch_failures.is_empty() || !report.advance.decode_failures.is_empty() {
        println!(
            "{yellow}   failures: {} fetch, {} decode{reset}",
            report.advance.fetch_failures.len(),
            report.advance.decode_failures.len()
        );
    }
    if let Some(resync) = &report.resync {
        println!(
            "   hard resync: {} added, {} relisted",
            resync.added.len(),
            resync.relisted.len()
        );
    }
}

fn print_poll_summary(report: &PollReport) {
    println!(
        "pass over {} works: {} mirrored, {} skipped",
        report.discovered,
        report.cycles.len(),
        report.failures.len()
    );
    for cycle in &report.cycles {
        print_cycle_summary(cycle);
    }
    for failure in &report.failures {
        println!("\x1b[31m   skipped {}: {}\x1b[0m", failure.url, failure.reason);
    }
}
