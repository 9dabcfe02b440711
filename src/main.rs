mod demos;
mod ui;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::info;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use asymptote::{Config, ConfigOverrides, Coordinator, Report, SystemInfo};

use crate::ui::App;

// ---------------------------------------------------------------------------
// Global quit flag, set by the SIGINT handler or key events
// ---------------------------------------------------------------------------

static QUIT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    QUIT.store(true, Ordering::Relaxed);
}

fn quitting() -> bool {
    QUIT.load(Ordering::Relaxed)
}

fn is_quit_event(ev: &TermEvent) -> bool {
    match ev {
        TermEvent::Key(key) if key.kind == KeyEventKind::Press => {
            key.code == KeyCode::Char('q')
                || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "asymptote",
    about = "Micro-benchmarks with latency statistics and inferred complexity"
)]
struct Cli {
    /// Pure-measurement trials per benchmark
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Size-varying trials per benchmark
    #[arg(short, long)]
    complexity_iterations: Option<usize>,

    /// Initial number of calls folded into one sample
    #[arg(long)]
    iterations_per_sample: Option<usize>,

    /// Batch time in ms below which batches grow
    #[arg(long)]
    target_latency: Option<f64>,

    /// Candidate expressions per complexity model
    #[arg(short, long)]
    population_size: Option<usize>,

    /// Worker thread count (default: CPUs - 1)
    #[arg(short = 't', long)]
    workers: Option<usize>,

    /// Largest size drawn for complexity trials
    #[arg(long)]
    max_size: Option<u64>,

    /// Write raw durations of finished benchmarks here
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// JSON config file, overridden by flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only run benchmarks whose name contains this
    #[arg(short, long)]
    filter: Option<String>,

    /// Print events as JSON lines instead of the dashboard
    #[arg(long, conflicts_with = "plain")]
    json: bool,

    /// Print one line per finished benchmark instead of the dashboard
    #[arg(long)]
    plain: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            iterations: self.iterations,
            complexity_iterations: self.complexity_iterations,
            iterations_per_sample: self.iterations_per_sample,
            target_latency: self.target_latency,
            population_size: self.population_size,
            workers_count: self.workers,
            max_size: self.max_size,
            results_dir: self.results_dir.clone(),
        }
    }

    fn dashboard(&self) -> bool {
        !(self.json || self.plain)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    // the dashboard owns the terminal, so logging stays off unless asked for
    let default_filter = if cli.dashboard() { "off" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let system = SystemInfo::detect();
    let base = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::for_host(&system),
    };
    let config = base.with_overrides(cli.overrides()).normalized();

    let registry = demos::registry(cli.filter.as_deref()).context("failed to build demo benchmarks")?;
    if registry.is_empty() {
        bail!(
            "no benchmark matches filter {:?}",
            cli.filter.as_deref().unwrap_or_default()
        );
    }

    unsafe {
        libc::signal(
            libc::SIGINT,
            handle_sigint as *const () as libc::sighandler_t,
        );
    }

    let coordinator =
        Coordinator::start(&registry, &config).context("failed to start benchmark workers")?;
    let mut app = App::new(
        system,
        config,
        coordinator.workers(),
        Report::new(&registry),
    );
    coordinator.run();

    if cli.json {
        run_json(&coordinator, &mut app)?;
    } else if cli.plain {
        run_plain(&coordinator, &mut app);
    } else {
        run_dashboard(&coordinator, &mut app)?;
    }

    coordinator.join()?;
    info!(
        "{}/{} benchmark(s) finished, {} failed",
        app.report.finished(),
        app.report.total(),
        app.report.failed()
    );
    if !cli.json {
        ui::print_summary(&app);
    }
    Ok(())
}

fn abort_on_quit(coordinator: &Coordinator, app: &mut App) {
    if quitting() && !app.aborted {
        coordinator.abort();
        app.aborted = true;
    }
}

// ---------------------------------------------------------------------------
// Output modes
// ---------------------------------------------------------------------------

fn run_json(coordinator: &Coordinator, app: &mut App) -> Result<()> {
    let mut out = io::stdout().lock();
    loop {
        abort_on_quit(coordinator, app);
        match coordinator.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                app.report.apply(&event);
                serde_json::to_writer(&mut out, &event)?;
                writeln!(out)?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    out.flush()?;
    app.finished = true;
    Ok(())
}

fn run_plain(coordinator: &Coordinator, app: &mut App) {
    loop {
        abort_on_quit(coordinator, app);
        match coordinator.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                app.report.apply(&event);
                if event.is_terminal() {
                    if let Some(bench) = app.report.benches().get(event.bench_id()) {
                        println!("{}", ui::summary_line(bench));
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    app.finished = true;
}

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn run_dashboard(coordinator: &Coordinator, app: &mut App) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    io::stdout()
        .execute(EnterAlternateScreen)
        .context("failed to enter alternate screen")?;
    let result = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to create terminal")
        .and_then(|mut terminal| {
            let result = dashboard_loop(&mut terminal, coordinator, app);
            terminal.show_cursor().ok();
            result
        });

    // --- Cleanup (always runs) ---
    disable_raw_mode().ok();
    io::stdout().execute(LeaveAlternateScreen).ok();

    if result.is_err() {
        coordinator.abort();
        app.aborted = true;
    }
    // drain whatever the workers still send after an early exit
    while let Some(event) = coordinator.recv() {
        app.report.apply(&event);
    }
    app.finished = true;
    result
}

fn dashboard_loop(terminal: &mut Term, coordinator: &Coordinator, app: &mut App) -> Result<()> {
    loop {
        abort_on_quit(coordinator, app);
        loop {
            match coordinator.try_recv() {
                Ok(event) => app.report.apply(&event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    app.finished = true;
                    break;
                }
            }
        }
        terminal.draw(|f| ui::draw(f, app))?;

        // after an abort there is nothing left to look at
        if app.finished && app.aborted {
            return Ok(());
        }

        if event::poll(Duration::from_millis(50)).unwrap_or(false) {
            if let Ok(ev) = event::read() {
                if is_quit_event(&ev) {
                    if app.finished {
                        return Ok(());
                    }
                    QUIT.store(true, Ordering::Relaxed);
                }
            }
        }
    }
}
