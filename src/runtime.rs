use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;

use crate::session::{SessionController, SessionEvent};
use crate::sud::SudValue;
use crate::timer::{Phase, StopReason};

/// Roughly one frame at 60Hz
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// What the user can do while a session runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionInput {
    TogglePause,
    Stop,
    /// A whole check-in rating
    MidSud(u8),
    /// One typed digit of a check-in rating
    Digit(u8),
    Erase,
    Confirm,
    SkipMidSud,
    /// Leave without finishing; nothing is saved
    Quit,
}

/// Unified event type consumed by the session runner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeEvent {
    Input(SessionInput),
    Resize,
    Tick,
}

/// Source of runtime events (keyboard, resize, etc.)
pub trait RuntimeEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<RuntimeEvent, RecvTimeoutError>;
}

pub fn map_key(key: KeyEvent) -> Option<SessionInput> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(SessionInput::Quit)
        }
        KeyCode::Char(' ') => Some(SessionInput::TogglePause),
        KeyCode::Char('q') | KeyCode::Esc => Some(SessionInput::Stop),
        KeyCode::Char('s') => Some(SessionInput::SkipMidSud),
        KeyCode::Char(c) => c.to_digit(10).map(|d| SessionInput::Digit(d as u8)),
        KeyCode::Enter => Some(SessionInput::Confirm),
        KeyCode::Backspace => Some(SessionInput::Erase),
        _ => None,
    }
}

/// How often the reader thread checks whether it should exit
const INPUT_POLL: Duration = Duration::from_millis(50);

/// Production event source using crossterm. The reader thread is stopped and
/// joined on drop so stdin is free for line input afterwards.
pub struct CrosstermEventSource {
    rx: Receiver<RuntimeEvent>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let reader = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                match event::poll(INPUT_POLL) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(_) => break,
                }
                let ev = match event::read() {
                    Ok(CtEvent::Key(key)) => map_key(key).map(RuntimeEvent::Input),
                    Ok(CtEvent::Resize(_, _)) => Some(RuntimeEvent::Resize),
                    Ok(_) => None,
                    Err(_) => break,
                };
                if let Some(ev) = ev {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            rx,
            stop,
            reader: Some(reader),
        }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CrosstermEventSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl RuntimeEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RuntimeEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Event source fed from a channel, for headless runs and tests
pub struct ChannelEventSource {
    rx: Receiver<RuntimeEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<RuntimeEvent>) -> Self {
        Self { rx }
    }
}

impl RuntimeEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RuntimeEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// How a driven session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed(StopReason),
    Abandoned,
}

/// Runner that advances a session one event/tick at a time
pub struct Runner<E: RuntimeEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: RuntimeEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> RuntimeEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                RuntimeEvent::Tick
            }
        }
    }

    /// Drives `controller` until it stops or the user quits. `observer` sees
    /// the controller after every step along with what changed in it.
    pub fn run<F>(&self, controller: &mut SessionController, mut observer: F) -> Outcome
    where
        F: FnMut(&SessionController, &[SessionEvent]),
    {
        loop {
            let ev = self.step();
            let now = Instant::now();
            let mut events = match ev {
                RuntimeEvent::Input(SessionInput::Quit) => {
                    controller.teardown();
                    return Outcome::Abandoned;
                }
                RuntimeEvent::Input(input) => apply_input(controller, input, now),
                RuntimeEvent::Resize | RuntimeEvent::Tick => vec![],
            };
            events.extend(controller.tick(now));
            observer(controller, &events);

            match controller.phase() {
                Phase::Stopped => {
                    return controller
                        .stop_reason()
                        .map(Outcome::Completed)
                        .unwrap_or(Outcome::Abandoned)
                }
                // stopping during the countdown abandons the session
                Phase::Idle if ev == RuntimeEvent::Input(SessionInput::Stop) => {
                    controller.teardown();
                    return Outcome::Abandoned;
                }
                _ => {}
            }
        }
    }
}

fn apply_input(
    controller: &mut SessionController,
    input: SessionInput,
    now: Instant,
) -> Vec<SessionEvent> {
    let result = match input {
        SessionInput::TogglePause => controller.toggle_pause(now),
        SessionInput::Stop => controller.stop(now),
        SessionInput::SkipMidSud => controller.skip_mid_sud(),
        SessionInput::MidSud(v) => match SudValue::new(v as i64) {
            Ok(value) => controller.submit_mid_sud(value),
            Err(e) => Err(e.into()),
        },
        SessionInput::Digit(d) => controller.type_mid_sud_digit(d).map(|_| vec![]),
        SessionInput::Erase => {
            controller.erase_mid_sud_digit();
            Ok(vec![])
        }
        SessionInput::Confirm => controller.confirm_mid_sud_entry(),
        SessionInput::Quit => Ok(vec![]),
    };
    result.unwrap_or_else(|e| {
        debug!("ignored {input:?}: {e}");
        vec![]
    })
}
