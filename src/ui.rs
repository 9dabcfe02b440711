use std::time::Instant;

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

use asymptote::{BenchReport, BenchState, Config, Report, SystemInfo};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct App {
    pub system: SystemInfo,
    pub config: Config,
    pub workers: usize,
    pub report: Report,
    pub started: Instant,
    pub aborted: bool,
    pub finished: bool,
}

impl App {
    pub fn new(system: SystemInfo, config: Config, workers: usize, report: Report) -> Self {
        Self {
            system,
            config,
            workers,
            report,
            started: Instant::now(),
            aborted: false,
            finished: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Color constants
// ---------------------------------------------------------------------------

const COL_DIM: Color = Color::DarkGray;
const COL_LABEL: Color = Color::Cyan;
const COL_FORMULA: Color = Color::Magenta;

fn state_color(state: BenchState) -> Color {
    match state {
        BenchState::Pending => COL_DIM,
        BenchState::Running => Color::Yellow,
        BenchState::Done => Color::Green,
        BenchState::Failed => Color::Red,
    }
}

// ---------------------------------------------------------------------------
// Draw
// ---------------------------------------------------------------------------

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // header
            Constraint::Length(3), // progress
            Constraint::Min(6),    // benchmarks
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], app);
    draw_progress(f, chunks[1], app);
    draw_table(f, chunks[2], app);
    draw_footer(f, chunks[3], app);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let c = &app.config;
    let lines = vec![
        Line::from(vec![
            Span::styled(
                &app.system.cpu_model,
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" \u{2502} {} CPUs", app.system.ncpus),
                Style::default().fg(COL_DIM),
            ),
            Span::styled(
                format!(
                    " \u{2502} {} worker{}",
                    app.workers,
                    if app.workers == 1 { "" } else { "s" }
                ),
                Style::default().fg(COL_DIM),
            ),
        ]),
        Line::from(Span::styled(
            format!(
                "{} iterations \u{00b7} {} complexity \u{00b7} target {:.1} ms \u{00b7} population {} \u{00b7} sizes \u{2264} {}",
                c.iterations,
                c.complexity_iterations,
                c.target_latency,
                c.population_size,
                c.max_size,
            ),
            Style::default().fg(COL_DIM),
        )),
    ];

    let block = Block::default()
        .title(" asymptote ")
        .title_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .borders(Borders::TOP | Borders::LEFT | Borders::RIGHT);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_progress(f: &mut Frame, area: Rect, app: &App) {
    let report = &app.report;
    let label = if app.aborted && !app.finished {
        "Aborting...".to_string()
    } else if app.finished {
        format!(
            "Complete: {}/{} ({} failed) in {:.1}s",
            report.finished(),
            report.total(),
            report.failed(),
            app.started.elapsed().as_secs_f64()
        )
    } else {
        format!(
            "{}/{} done \u{00b7} {} running",
            report.finished(),
            report.total(),
            report.running()
        )
    };

    let color = if app.aborted {
        Color::Red
    } else if app.finished {
        Color::Green
    } else {
        Color::Blue
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::LEFT | Borders::RIGHT))
        .gauge_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
        .label(label)
        .ratio(report.progress().clamp(0.0, 1.0));
    f.render_widget(gauge, area);
}

const HEADINGS: [&str; 8] = ["state", "samples", "avg", "stdev", "p50", "p99", "max", "model"];

fn draw_table(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(" Benchmarks ")
        .title_style(Style::default().fg(COL_LABEL))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let name_w = name_width(app.report.benches());

    let mut header = vec![Span::styled(
        format!("{:<name_w$} ", "name"),
        Style::default().fg(COL_LABEL).add_modifier(Modifier::BOLD),
    )];
    header.extend(HEADINGS.iter().enumerate().map(|(i, h)| {
        let text = if i == 0 {
            format!("{h:<8}")
        } else if i + 1 == HEADINGS.len() {
            format!("  {h}")
        } else {
            format!("{h:>10}")
        };
        Span::styled(
            text,
            Style::default().fg(COL_LABEL).add_modifier(Modifier::BOLD),
        )
    }));

    let mut lines = vec![Line::from(header)];
    for bench in app.report.benches() {
        if lines.len() >= inner.height as usize {
            break;
        }
        lines.push(bench_line(bench, name_w));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn bench_line(bench: &BenchReport, name_w: usize) -> Line<'static> {
    let stats = bench.stats.as_ref();
    let cell = |v: Option<f64>| Span::raw(format!("{:>10}", format_ms(v)));
    let mut spans = vec![
        Span::styled(
            format!("{:<name_w$} ", truncate(&bench.name, name_w)),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("{:<8}", state_label(bench.state)),
            Style::default().fg(state_color(bench.state)),
        ),
        Span::raw(format!("{:>10}", samples(bench))),
        cell(stats.and_then(|s| s.avg)),
        cell(stats.and_then(|s| s.stdev)),
        cell(stats.and_then(|s| s.p50)),
        cell(stats.and_then(|s| s.p99)),
        cell(stats.and_then(|s| s.max)),
    ];
    match (&bench.error, &bench.complexity) {
        (Some(error), _) => spans.push(Span::styled(
            format!("  {error}"),
            Style::default().fg(Color::Red),
        )),
        (None, Some(expr)) => spans.push(Span::styled(
            format!("  {expr}"),
            Style::default().fg(COL_FORMULA),
        )),
        (None, None) => {}
    }
    Line::from(spans)
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let text = if app.finished {
        "Press q to exit"
    } else {
        "Press q to abort"
    };
    let p = Paragraph::new(Line::from(Span::styled(text, Style::default().fg(COL_DIM))))
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Width of the name column, in chars.
fn name_width(benches: &[BenchReport]) -> usize {
    benches
        .iter()
        .map(|b| b.name.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(4, 24)
}

fn state_label(state: BenchState) -> &'static str {
    match state {
        BenchState::Pending => "pending",
        BenchState::Running => "running",
        BenchState::Done => "done",
        BenchState::Failed => "failed",
    }
}

fn samples(bench: &BenchReport) -> String {
    let pure = bench.stats.as_ref().map_or(0, |s| s.count);
    match (pure, bench.complexity_samples) {
        (0, 0) => "-".into(),
        (n, 0) => n.to_string(),
        (0, m) => format!("~{m}"),
        (n, m) => format!("{n}+~{m}"),
    }
}

/// Human-scaled rendering of a millisecond value.
pub fn format_ms(v: Option<f64>) -> String {
    match v {
        None => "-".into(),
        Some(ms) if ms < 1e-3 => format!("{:.1} ns", ms * 1e6),
        Some(ms) if ms < 1.0 => format!("{:.2} \u{03bc}s", ms * 1e3),
        Some(ms) if ms < 1e3 => format!("{:.2} ms", ms),
        Some(ms) => format!("{:.2} s", ms / 1e3),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('\u{2026}');
        out
    }
}

// ---------------------------------------------------------------------------
// Plain-text summary (printed after TUI exits)
// ---------------------------------------------------------------------------

pub fn print_summary(app: &App) {
    let report = &app.report;
    println!();
    println!("=== asymptote results ===");
    println!("CPU: {} ({} CPUs)", app.system.cpu_model, app.system.ncpus);
    println!(
        "Config: {} iterations, {} complexity iterations, {} worker(s)",
        app.config.iterations, app.config.complexity_iterations, app.workers
    );
    println!();
    for bench in report.benches() {
        println!("{}", summary_line(bench));
    }
    println!();
    println!(
        "{}/{} finished, {} failed{}",
        report.finished(),
        report.total(),
        report.failed(),
        if app.aborted { " (aborted)" } else { "" }
    );
}

pub fn summary_line(bench: &BenchReport) -> String {
    let mut line = format!("{:<24} {:<8}", bench.name, state_label(bench.state));
    if let Some(stats) = &bench.stats {
        line.push_str(&format!(
            " n={} avg={} stdev={} p50={} p99={} max={}",
            stats.count,
            format_ms(stats.avg),
            format_ms(stats.stdev),
            format_ms(stats.p50),
            format_ms(stats.p99),
            format_ms(stats.max),
        ));
        if let Some(ops) = stats.ops_per_sec() {
            line.push_str(&format!(" ops/s={ops:.0}"));
        }
    }
    if let Some(expr) = &bench.complexity {
        line.push_str(&format!(" model={expr}"));
        if let Some(objective) = bench.objective {
            line.push_str(&format!(" (err {objective:.4}, {} samples)", bench.complexity_samples));
        }
    }
    if let Some(error) = &bench.error {
        line.push_str(&format!(" error={error}"));
        if !bench.failed_sizes.is_empty() {
            line.push_str(&format!(" sizes={:?}", bench.failed_sizes));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_units() {
        assert_eq!(format_ms(None), "-");
        assert_eq!(format_ms(Some(0.0005)), "500.0 ns");
        assert_eq!(format_ms(Some(0.25)), "250.00 \u{03bc}s");
        assert_eq!(format_ms(Some(12.5)), "12.50 ms");
        assert_eq!(format_ms(Some(2500.0)), "2.50 s");
    }

    #[test]
    fn name_column_counts_chars() {
        let mut registry = asymptote::Registry::new();
        registry
            .register(asymptote::Benchmark::pure("größe-ü", || Ok(())))
            .unwrap();
        let report = Report::new(&registry);
        assert_eq!(name_width(report.benches()), 7);

        let line = bench_line(&report.benches()[0], 7);
        let name_cell = &line.spans[0].content;
        assert_eq!(name_cell.chars().count(), 8);
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("short", 8), "short");
        assert_eq!(truncate("much-too-long", 5), "much\u{2026}");
    }
}
