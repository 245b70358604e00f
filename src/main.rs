use bilat::{
    app::App,
    clock::Side,
    error::SinkError,
    history::export_csv,
    runtime::{CrosstermEventSource, FixedTicker, Outcome, Runner},
    session::SessionController,
    settings::DOT_COLORS,
    stats::recent_improvements,
    stimulus::{AudioSink, Sinks, VisualSink},
    sud::{SessionSummary, SudValue},
    timer::{format_clock, set_progress_percent, Phase},
};
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin, BufRead, Stdout, Write},
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// paced bilateral stimulation sessions with distress tracking
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Runs paced left/right stimulation in sets separated by rest periods, \
                  checks in on your distress level along the way, and keeps a history of \
                  how each session went."
)]
pub struct Cli {
    /// log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[clap(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run a guided session (the default)
    Run {
        /// distress before starting, 0-10; asked for when omitted
        #[clap(long)]
        pre: Option<i64>,

        /// what you want to focus on; shown briefly when the session starts
        #[clap(short = 'g', long)]
        goal: Option<String>,

        /// start straight away without the 3-2-1 countdown
        #[clap(long)]
        no_countdown: bool,
    },
    /// show aggregate statistics over past sessions
    Stats,
    /// list past sessions, newest first
    History {
        /// how many sessions to list
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// write the full history to a CSV file
        #[clap(long)]
        export: Option<PathBuf>,

        /// delete all stored sessions
        #[clap(long)]
        clear: bool,
    },
    /// show or change session settings
    Settings {
        #[clap(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// print the current settings as JSON
    Show,
    /// change one setting, e.g. `set speed 1.2` or `set dotColor green`
    Set { field: String, value: String },
    /// restore the defaults
    Reset,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "off",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .try_init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("bilat started with verbosity level: {}", cli.verbose);

    let mut app = App::open_default()?;

    match cli.command.unwrap_or(Command::Run {
        pre: None,
        goal: None,
        no_countdown: false,
    }) {
        Command::Run {
            pre,
            goal,
            no_countdown,
        } => {
            if !app.history_persistent() {
                eprintln!("History is unavailable; this session will not be saved.");
            }
            run(&app, pre, goal, !no_countdown)?
        }
        Command::Stats => print_stats(&app)?,
        Command::History {
            limit,
            export,
            clear,
        } => {
            if clear {
                app.clear_history()?;
                println!("History cleared.");
            } else if let Some(path) = export {
                let history = app.history()?;
                export_csv(&history, File::create(&path)?)?;
                println!("Exported {} sessions to {}", history.len(), path.display());
            } else {
                print_history(&app, limit)?;
            }
        }
        Command::Settings { action } => match action.unwrap_or(SettingsAction::Show) {
            SettingsAction::Show => println!("{}", serde_json::to_string_pretty(app.settings())?),
            SettingsAction::Set { field, value } => {
                let value = palette_hex(&field, &value).unwrap_or(value);
                let updated = app.set_field(&field, &value)?;
                println!("{}", serde_json::to_string_pretty(updated)?);
            }
            SettingsAction::Reset => {
                app.reset_settings();
                println!("Settings restored to defaults.");
            }
        },
    }

    app.flush()?;
    Ok(())
}

/// Lets `dotColor` take a palette name as well as a hex value
fn palette_hex(field: &str, value: &str) -> Option<String> {
    if field != "dotColor" {
        return None;
    }
    DOT_COLORS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value.trim()))
        .map(|(_, hex)| hex.to_string())
}

fn run(
    app: &App,
    pre: Option<i64>,
    goal: Option<String>,
    countdown: bool,
) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let (pre, goal) = match pre {
        Some(v) => (SudValue::new(v)?, goal),
        None => {
            let pre = prompt_sud("How distressing does it feel right now? (0-10): ")?;
            let goal = match goal {
                Some(g) => Some(g),
                None => Some(prompt_line("What would you like to focus on? (enter to skip): ")?),
            };
            (pre, goal)
        }
    };

    let sinks = Sinks {
        visual: Some(Box::new(TerminalDot::new())),
        audio: Some(Box::new(TerminalBell::new())),
        haptic: None,
    };
    let mut controller = app.new_session(sinks, pre, goal);

    let outcome = {
        let _screen = ScreenGuard::enter()?;
        let now = Instant::now();
        if countdown {
            controller.begin_countdown(now)?;
        } else {
            controller.start(now)?;
        }
        let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());
        let mut status = StatusLines::default();
        status.draw(&controller);
        runner.run(&mut controller, |c, _| status.draw(c))
    };

    match outcome {
        Outcome::Abandoned => {
            println!("Session abandoned; nothing was saved.");
            Ok(())
        }
        Outcome::Completed(reason) => {
            debug!("session ended: {reason}");
            let pending = controller.finish()?;
            println!("Session finished after {} sets.", pending.total_sets);
            let post = prompt_sud("How distressing does it feel now? (0-10): ")?;
            let summary = pending.record_post(post);
            print_summary(&summary);
            app.complete_session(summary, controller.settings());
            Ok(())
        }
    }
}

fn prompt_line(question: &str) -> io::Result<String> {
    print!("{question}");
    io::stdout().flush()?;
    let mut line = String::new();
    if stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no input"));
    }
    Ok(line.trim().to_string())
}

fn prompt_sud(question: &str) -> io::Result<SudValue> {
    loop {
        let answer = prompt_line(question)?;
        match answer.parse::<i64>().ok().and_then(|v| SudValue::new(v).ok()) {
            Some(value) => return Ok(value),
            None => println!("Please enter a whole number from 0 to 10."),
        }
    }
}

fn print_summary(summary: &SessionSummary) {
    let improvement = summary.improvement();
    println!();
    println!("Session complete");
    println!("  Sets:      {}", summary.total_sets);
    println!("  Duration:  {}", format_clock(Duration::from_secs(summary.total_duration)));
    println!(
        "  Distress:  {} -> {} ({})",
        summary.pre_sud.value,
        summary.post_sud.value,
        match improvement {
            0 => "unchanged".to_string(),
            n if n > 0 => format!("down {n}"),
            n => format!("up {}", -n),
        }
    );
    if !summary.mid_suds.is_empty() {
        let mids: Vec<String> = summary.mid_suds.iter().map(|r| r.value.to_string()).collect();
        println!("  Check-ins: {}", mids.join(", "));
    }
    if let Some(goal) = &summary.goal {
        println!("  Goal:      {goal}");
    }
}

fn print_stats(app: &App) -> Result<(), Box<dyn Error>> {
    let stats = app.stats()?;
    if stats.total_sessions == 0 {
        println!("No sessions recorded yet.");
        return Ok(());
    }
    println!("Sessions:            {}", stats.total_sessions);
    println!("Average improvement: {:.1}", stats.average_sud_improvement);
    println!("Success rate:        {:.0}%", stats.success_rate);
    println!(
        "Total time:          {}",
        format_clock(Duration::from_secs(stats.total_duration))
    );
    println!(
        "Average session:     {}",
        format_clock(Duration::from_secs_f64(stats.average_session_duration))
    );
    if let Some(recent) = &stats.most_recent_session {
        println!(
            "Most recent:         {}",
            recent.summary.completed_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
    }

    let recent: Vec<String> = recent_improvements(&app.history()?, 7)
        .iter()
        .map(|n| format!("{n:+}"))
        .collect();
    println!("Last improvements:   {}", recent.join(" "));

    println!();
    println!("Distress ratings (before and after):");
    let widest = stats.sud_distribution.values().copied().max().unwrap_or(0).max(1);
    for (level, count) in &stats.sud_distribution {
        let bar = "#".repeat(count * 30 / widest);
        println!("  {level:>2} | {bar} {count}");
    }
    Ok(())
}

fn print_history(app: &App, limit: usize) -> Result<(), Box<dyn Error>> {
    let history = app.history()?;
    if history.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }
    for entry in history.iter().take(limit) {
        let s = &entry.summary;
        println!(
            "{}  {:>2} -> {:<2}  {:>3} sets  {}  {}",
            s.completed_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            s.pre_sud.value,
            s.post_sud.value,
            s.total_sets,
            format_clock(Duration::from_secs(s.total_duration)),
            entry.goal.as_deref().unwrap_or("")
        );
    }
    if history.len() > limit {
        println!("... {} more", history.len() - limit);
    }
    Ok(())
}

const DOT_ROW: u16 = 5;
const PROMPT_ROW: u16 = 8;

/// Raw mode plus alternate screen, restored on drop
struct ScreenGuard;

impl ScreenGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide, Clear(ClearType::All))?;
        Ok(Self)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn hex_color(hex: &str) -> Color {
    let channel =
        |i: usize| u8::from_str_radix(hex.get(i..i + 2).unwrap_or("ff"), 16).unwrap_or(255);
    Color::Rgb {
        r: channel(1),
        g: channel(3),
        b: channel(5),
    }
}

fn dot_glyph(size: u32) -> &'static str {
    match size {
        0..=44 => "•",
        45..=64 => "●",
        _ => "⬤",
    }
}

/// Draws the dot on its own row of the terminal
struct TerminalDot {
    out: Stdout,
    last_col: Option<u16>,
}

impl TerminalDot {
    fn new() -> Self {
        Self {
            out: io::stdout(),
            last_col: None,
        }
    }
}

impl VisualSink for TerminalDot {
    fn render(&mut self, position: f64, color: &str, size: u32) -> Result<(), SinkError> {
        let (width, _) = terminal::size().map_err(|e| SinkError::Playback(e.to_string()))?;
        let track = width.saturating_sub(3) as f64;
        let col = 1 + (position * track).round() as u16;
        if self.last_col == Some(col) {
            return Ok(());
        }
        self.last_col = Some(col);
        queue!(
            self.out,
            MoveTo(0, DOT_ROW),
            Clear(ClearType::CurrentLine),
            MoveTo(col, DOT_ROW),
            SetForegroundColor(hex_color(color)),
            Print(dot_glyph(size)),
            ResetColor
        )
        .and_then(|_| self.out.flush())
        .map_err(|e| SinkError::Playback(e.to_string()))
    }
}

/// Terminal bell on every side change; a terminal has no stereo
struct TerminalBell {
    out: Stdout,
    muted: bool,
}

impl TerminalBell {
    fn new() -> Self {
        Self {
            out: io::stdout(),
            muted: false,
        }
    }
}

impl AudioSink for TerminalBell {
    fn trigger(&mut self, _side: Side) -> Result<(), SinkError> {
        if self.muted {
            return Ok(());
        }
        self.out
            .write_all(b"\x07")
            .and_then(|_| self.out.flush())
            .map_err(|e| SinkError::Playback(e.to_string()))
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), SinkError> {
        self.muted = volume <= 0.0;
        Ok(())
    }
}

/// Text rows above and below the dot, redrawn only when they change
#[derive(Default)]
struct StatusLines {
    drawn: Vec<(u16, String)>,
}

impl StatusLines {
    fn lines(c: &SessionController) -> Vec<(u16, String)> {
        let state = c.state();
        let settings = c.settings();
        let phase = match (c.phase(), c.countdown()) {
            (Phase::Idle, Some(n)) => format!("starting in {n}"),
            (Phase::Idle, None) => "ready".to_string(),
            (Phase::Stopped, _) => "finished".to_string(),
            _ if state.is_paused => "paused".to_string(),
            (Phase::Resting, _) => format!("resting {}", format_clock(state.remaining_rest_time)),
            (Phase::ActiveSet, _) => "follow the dot".to_string(),
        };
        let filled = (set_progress_percent(state, settings) / 100.0 * 30.0).round() as usize;

        let mut lines = vec![
            (
                0,
                format!(
                    "set {}/{}   {}   {}",
                    state.current_set,
                    settings.max_sets,
                    format_clock(state.elapsed_session_time),
                    phase
                ),
            ),
            (1, format!("[{}{}]", "=".repeat(filled), " ".repeat(30 - filled.min(30)))),
        ];
        if c.reminder_visible() {
            if let Some(goal) = c.goal() {
                lines.push((3, format!("focus: {goal}")));
            }
        }
        if let Some(set) = c.open_prompt() {
            lines.push((
                PROMPT_ROW,
                format!(
                    "check-in after set {set}: how distressing is it now (0-10)? {}_   \
                     enter to rate, s to skip",
                    c.mid_sud_entry()
                ),
            ));
        }
        lines.push((
            PROMPT_ROW + 2,
            "space pause/resume   q stop   ctrl-c quit without saving".to_string(),
        ));
        lines
    }

    fn draw(&mut self, c: &SessionController) {
        let lines = Self::lines(c);
        if lines == self.drawn {
            return;
        }
        let mut out = io::stdout();
        let mut result = Ok(());
        for row in [0, 1, 3, PROMPT_ROW, PROMPT_ROW + 2] {
            let text = lines.iter().find(|(r, _)| *r == row).map(|(_, t)| t.as_str()).unwrap_or("");
            result = result.and_then(|_| {
                queue!(
                    out,
                    MoveTo(0, row),
                    Clear(ClearType::CurrentLine),
                    Print(text)
                )
            });
        }
        if let Err(e) = result.and_then(|_| out.flush()) {
            warn!("failed to draw status: {e}");
        }
        self.drawn = lines;
    }
}
