//! Set/rest cycling for one session.
//!
//! All elapsed values are derived from wall-clock deltas against stored start
//! instants, never from tick counts, so scheduler jitter does not accumulate.

use crate::error::SessionError;
use crate::settings::BlsSettings;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Idle,
    ActiveSet,
    Resting,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StopReason {
    User,
    MaxSets,
    MaxDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTransition {
    RestStarted { completed_set: u32 },
    SetStarted { set: u32 },
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub is_active: bool,
    pub is_paused: bool,
    pub is_resting: bool,
    /// 1-based once started, 0 before
    pub current_set: u32,
    /// Snapshot of `current_set` taken at stop
    pub total_sets: u32,
    pub session_start_time: Option<Instant>,
    pub set_start_time: Option<Instant>,
    pub rest_start_time: Option<Instant>,
    pub elapsed_session_time: Duration,
    pub elapsed_set_time: Duration,
    pub remaining_rest_time: Duration,
}

impl SessionState {
    /// Stimulation should run: active, unpaused, and not resting
    pub fn is_stimulating(&self) -> bool {
        self.is_active && !self.is_paused && !self.is_resting
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Limits {
    set_len: Duration,
    rest_len: Duration,
    max_sets: u32,
    session_len: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionTimer {
    state: SessionState,
    limits: Limits,
    paused_at: Option<Instant>,
    stop_reason: Option<StopReason>,
}

impl SessionTimer {
    pub fn new(settings: &BlsSettings) -> Self {
        Self {
            state: SessionState::default(),
            limits: Limits {
                set_len: settings.set_length(),
                rest_len: settings.rest_length(),
                max_sets: settings.max_sets.max(1),
                session_len: settings.session_limit(),
            },
            paused_at: None,
            stop_reason: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn phase(&self) -> Phase {
        if self.stop_reason.is_some() {
            Phase::Stopped
        } else if !self.state.is_active {
            Phase::Idle
        } else if self.state.is_resting {
            Phase::Resting
        } else {
            Phase::ActiveSet
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        match self.phase() {
            Phase::Idle => {}
            Phase::Stopped => return Err(SessionError::AlreadyStopped),
            _ => return Err(SessionError::AlreadyStarted),
        }
        self.state = SessionState {
            is_active: true,
            current_set: 1,
            session_start_time: Some(now),
            set_start_time: Some(now),
            ..SessionState::default()
        };
        info!("session started, set 1");
        Ok(())
    }

    /// Freezes all counters at `now`. Returns false if already paused.
    pub fn pause(&mut self, now: Instant) -> Result<bool, SessionError> {
        self.ensure_running()?;
        if self.state.is_paused {
            return Ok(false);
        }
        self.refresh(now);
        self.state.is_paused = true;
        self.paused_at = Some(now);
        debug!("session paused at set {}", self.state.current_set);
        Ok(true)
    }

    /// Continues from the frozen counters by shifting every start instant
    /// forward by the time spent paused. Returns false if not paused.
    pub fn resume(&mut self, now: Instant) -> Result<bool, SessionError> {
        self.ensure_running()?;
        let Some(paused_at) = self.paused_at.take() else {
            return Ok(false);
        };
        let gap = now.saturating_duration_since(paused_at);
        for start in [
            &mut self.state.session_start_time,
            &mut self.state.set_start_time,
            &mut self.state.rest_start_time,
        ] {
            if let Some(t) = start.as_mut() {
                *t += gap;
            }
        }
        self.state.is_paused = false;
        debug!("session resumed after {:?}", gap);
        Ok(true)
    }

    pub fn stop(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure_running()?;
        if !self.state.is_paused {
            self.refresh(now);
        }
        self.finish(StopReason::User);
        Ok(())
    }

    /// Advances the state machine to `now`. No-op while idle, paused or stopped.
    pub fn tick(&mut self, now: Instant) -> Option<TimerTransition> {
        if !self.state.is_active || self.state.is_paused {
            return None;
        }
        let session_start = self.state.session_start_time?;
        let limits = self.limits;

        let elapsed_session = now.saturating_duration_since(session_start);
        self.state.elapsed_session_time = elapsed_session;
        if elapsed_session >= limits.session_len {
            self.finish(StopReason::MaxDuration);
            return Some(TimerTransition::Stopped(StopReason::MaxDuration));
        }

        match (self.state.set_start_time, self.state.rest_start_time) {
            (Some(set_start), None) => {
                let elapsed_set = now.saturating_duration_since(set_start);
                if elapsed_set < limits.set_len {
                    self.state.elapsed_set_time = elapsed_set;
                    return None;
                }
                self.state.elapsed_set_time = limits.set_len;
                // no rest period once the set cap is reached
                if self.state.current_set >= limits.max_sets {
                    self.finish(StopReason::MaxSets);
                    return Some(TimerTransition::Stopped(StopReason::MaxSets));
                }
                let rest_start = set_start + limits.set_len;
                self.state.is_resting = true;
                self.state.set_start_time = None;
                self.state.rest_start_time = Some(rest_start);
                self.state.remaining_rest_time = limits
                    .rest_len
                    .saturating_sub(now.saturating_duration_since(rest_start));
                debug!("set {} complete, resting", self.state.current_set);
                Some(TimerTransition::RestStarted {
                    completed_set: self.state.current_set,
                })
            }
            (None, Some(rest_start)) => {
                let elapsed_rest = now.saturating_duration_since(rest_start);
                if elapsed_rest < limits.rest_len {
                    self.state.remaining_rest_time = limits.rest_len - elapsed_rest;
                    return None;
                }
                let set_start = rest_start + limits.rest_len;
                self.state.is_resting = false;
                self.state.rest_start_time = None;
                self.state.set_start_time = Some(set_start);
                self.state.current_set += 1;
                self.state.elapsed_set_time = now.saturating_duration_since(set_start);
                self.state.remaining_rest_time = Duration::ZERO;
                debug!("set {} started", self.state.current_set);
                Some(TimerTransition::SetStarted {
                    set: self.state.current_set,
                })
            }
            (set, rest) => unreachable!(
                "active timer with set_start={set:?} rest_start={rest:?}"
            ),
        }
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        match self.phase() {
            Phase::Idle => Err(SessionError::NotStarted),
            Phase::Stopped => Err(SessionError::AlreadyStopped),
            _ => Ok(()),
        }
    }

    /// Recomputes counters without evaluating transitions
    fn refresh(&mut self, now: Instant) {
        if let Some(start) = self.state.session_start_time {
            self.state.elapsed_session_time = now.saturating_duration_since(start);
        }
        if let Some(start) = self.state.set_start_time {
            self.state.elapsed_set_time = now
                .saturating_duration_since(start)
                .min(self.limits.set_len);
        }
        if let Some(start) = self.state.rest_start_time {
            self.state.remaining_rest_time = self
                .limits
                .rest_len
                .saturating_sub(now.saturating_duration_since(start));
        }
    }

    fn finish(&mut self, reason: StopReason) {
        self.state.is_active = false;
        self.state.is_paused = false;
        self.state.is_resting = false;
        self.state.set_start_time = None;
        self.state.rest_start_time = None;
        self.state.remaining_rest_time = Duration::ZERO;
        self.state.total_sets = self.state.current_set;
        self.paused_at = None;
        self.stop_reason = Some(reason);
        info!(
            "session stopped ({reason}) after {} sets, {:?}",
            self.state.total_sets, self.state.elapsed_session_time
        );
    }
}

/// `MM:SS` for whole seconds
pub fn format_clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Progress through the current set in percent; a full bar while resting
pub fn set_progress_percent(state: &SessionState, settings: &BlsSettings) -> f64 {
    if state.is_resting {
        return 100.0;
    }
    let set_len = settings.set_length().as_secs_f64();
    if set_len <= 0.0 {
        return 0.0;
    }
    (state.elapsed_set_time.as_secs_f64() / set_len * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn settings(set: u32, rest: u32, max_sets: u32, minutes: u32) -> BlsSettings {
        BlsSettings {
            set_duration: set,
            rest_interval: rest,
            max_sets,
            max_session_duration: minutes,
            ..Default::default()
        }
    }

    /// Ticks every `step` until stopped, returning the stop offset and transitions
    fn run_to_completion(
        timer: &mut SessionTimer,
        t0: Instant,
        step: Duration,
    ) -> (Duration, Vec<TimerTransition>) {
        let mut offset = Duration::ZERO;
        let mut transitions = vec![];
        for _ in 0..1_000_000 {
            offset += step;
            if let Some(t) = timer.tick(t0 + offset) {
                transitions.push(t);
                if let TimerTransition::Stopped(_) = t {
                    return (offset, transitions);
                }
            }
        }
        panic!("timer never stopped");
    }

    #[test]
    fn idle_timer_has_no_set() {
        let timer = SessionTimer::new(&BlsSettings::default());
        assert_eq!(timer.phase(), Phase::Idle);
        assert_eq!(timer.state().current_set, 0);
        assert!(timer.state().set_start_time.is_none());
        assert!(timer.state().rest_start_time.is_none());
    }

    #[test]
    fn tick_right_after_start() {
        let mut timer = SessionTimer::new(&BlsSettings::default());
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        assert_eq!(timer.tick(t0), None);
        let state = timer.state();
        assert_eq!(state.elapsed_set_time, Duration::ZERO);
        assert_eq!(state.current_set, 1);
        assert!(!state.is_resting);
        assert!(state.is_stimulating());
        assert_eq!(timer.phase(), Phase::ActiveSet);
    }

    #[test]
    fn set_rest_set_cycle() {
        let mut timer = SessionTimer::new(&settings(20, 10, 5, 20));
        let t0 = Instant::now();
        timer.start(t0).unwrap();

        assert_eq!(timer.tick(t0 + secs(19)), None);
        assert_eq!(timer.state().elapsed_set_time, secs(19));

        assert_eq!(
            timer.tick(t0 + secs(20)),
            Some(TimerTransition::RestStarted { completed_set: 1 })
        );
        assert!(timer.state().is_resting);
        assert!(timer.state().set_start_time.is_none());
        assert_eq!(timer.state().remaining_rest_time, secs(10));

        assert_eq!(timer.tick(t0 + secs(24)), None);
        assert_eq!(timer.state().remaining_rest_time, secs(6));

        assert_eq!(
            timer.tick(t0 + secs(30)),
            Some(TimerTransition::SetStarted { set: 2 })
        );
        assert!(!timer.state().is_resting);
        assert!(timer.state().rest_start_time.is_none());
        assert_eq!(timer.state().elapsed_set_time, Duration::ZERO);
        assert_eq!(timer.state().elapsed_session_time, secs(30));
    }

    #[test]
    fn exactly_one_start_time_while_running() {
        let mut timer = SessionTimer::new(&settings(15, 5, 4, 20));
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        let mut offset = Duration::ZERO;
        while timer.state().is_active {
            offset += Duration::from_millis(100);
            timer.tick(t0 + offset);
            let s = timer.state();
            if s.is_active {
                assert!(s.set_start_time.is_some() ^ s.rest_start_time.is_some());
                assert_eq!(s.is_resting, s.rest_start_time.is_some());
            }
        }
        assert!(timer.state().set_start_time.is_none());
        assert!(timer.state().rest_start_time.is_none());
    }

    #[test]
    fn completed_session_runs_exactly_max_sets() {
        for (set, rest, max_sets) in [(15, 5, 1), (24, 10, 3), (45, 30, 6), (20, 7, 10)] {
            let mut timer = SessionTimer::new(&settings(set, rest, max_sets, 120));
            let t0 = Instant::now();
            timer.start(t0).unwrap();
            let step = Duration::from_millis(100);
            let (stopped_at, transitions) = run_to_completion(&mut timer, t0, step);

            let expected = secs((max_sets * set + (max_sets - 1) * rest) as u64);
            assert!(stopped_at >= expected);
            assert!(stopped_at - expected < step);
            assert_eq!(timer.state().total_sets, max_sets);
            assert_eq!(timer.stop_reason(), Some(StopReason::MaxSets));
            let rests = transitions
                .iter()
                .filter(|t| matches!(t, TimerTransition::RestStarted { .. }))
                .count();
            assert_eq!(rests as u32, max_sets - 1);
        }
    }

    #[test]
    fn session_duration_cap_stops_first() {
        // 1 minute cap with 45s sets and 30s rests: stops during the first rest
        let mut timer = SessionTimer::new(&settings(45, 30, 30, 1));
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        let (stopped_at, _) = run_to_completion(&mut timer, t0, Duration::from_millis(50));
        assert!(stopped_at >= secs(60) && stopped_at < secs(60) + Duration::from_millis(50));
        assert_eq!(timer.stop_reason(), Some(StopReason::MaxDuration));
        assert_eq!(timer.state().total_sets, 1);
        assert!(!timer.state().is_resting);
        assert_eq!(timer.phase(), Phase::Stopped);
    }

    #[test]
    fn coarse_ticks_do_not_lose_time_at_transitions() {
        let mut timer = SessionTimer::new(&settings(20, 10, 3, 20));
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        // 20.9s: rest anchored at 20s, so 0.9s of the rest is already gone
        timer.tick(t0 + Duration::from_millis(20_900));
        assert_eq!(timer.state().rest_start_time, Some(t0 + secs(20)));
        assert_eq!(timer.state().remaining_rest_time, Duration::from_millis(9_100));
    }

    #[test]
    fn pause_freezes_and_resume_continues_without_jump() {
        let mut timer = SessionTimer::new(&settings(20, 10, 5, 20));
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        timer.tick(t0 + secs(5));
        assert!(timer.pause(t0 + secs(7)).unwrap());
        assert!(!timer.state().is_stimulating());

        let frozen = timer.state().clone();
        assert_eq!(frozen.elapsed_set_time, secs(7));
        assert_eq!(frozen.elapsed_session_time, secs(7));

        // ticks during a pause change nothing
        assert_eq!(timer.tick(t0 + secs(100)), None);
        assert_eq!(timer.state(), &frozen);

        assert!(timer.resume(t0 + secs(200)).unwrap());
        timer.tick(t0 + secs(201));
        assert_eq!(timer.state().elapsed_set_time, secs(8));
        assert_eq!(timer.state().elapsed_session_time, secs(8));
    }

    #[test]
    fn pause_during_rest_keeps_remaining_rest() {
        let mut timer = SessionTimer::new(&settings(20, 10, 5, 20));
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        timer.tick(t0 + secs(20));
        timer.pause(t0 + secs(23)).unwrap();
        assert_eq!(timer.state().remaining_rest_time, secs(7));
        timer.resume(t0 + secs(60)).unwrap();
        assert_eq!(timer.tick(t0 + secs(66)), None);
        assert_eq!(timer.state().remaining_rest_time, secs(1));
        assert_eq!(
            timer.tick(t0 + secs(67)),
            Some(TimerTransition::SetStarted { set: 2 })
        );
    }

    #[test]
    fn repeated_pause_and_resume_are_idempotent() {
        let mut timer = SessionTimer::new(&BlsSettings::default());
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        assert!(!timer.resume(t0).unwrap());
        assert!(timer.pause(t0 + secs(1)).unwrap());
        assert!(!timer.pause(t0 + secs(2)).unwrap());
        assert!(timer.resume(t0 + secs(3)).unwrap());
    }

    #[test]
    fn stop_snapshots_sets_and_is_terminal() {
        let mut timer = SessionTimer::new(&settings(15, 5, 10, 20));
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        timer.tick(t0 + secs(15));
        timer.tick(t0 + secs(20));
        timer.stop(t0 + secs(22)).unwrap();

        let state = timer.state();
        assert!(!state.is_active);
        assert_eq!(state.total_sets, 2);
        assert_eq!(state.elapsed_session_time, secs(22));
        assert_eq!(timer.stop_reason(), Some(StopReason::User));
        assert_eq!(timer.tick(t0 + secs(40)), None);
        assert_matches!(timer.stop(t0 + secs(41)), Err(SessionError::AlreadyStopped));
        assert_matches!(timer.start(t0 + secs(41)), Err(SessionError::AlreadyStopped));
        assert_matches!(timer.pause(t0 + secs(41)), Err(SessionError::AlreadyStopped));
    }

    #[test]
    fn stop_while_paused_keeps_frozen_duration() {
        let mut timer = SessionTimer::new(&BlsSettings::default());
        let t0 = Instant::now();
        timer.start(t0).unwrap();
        timer.pause(t0 + secs(10)).unwrap();
        timer.stop(t0 + secs(500)).unwrap();
        assert_eq!(timer.state().elapsed_session_time, secs(10));
        assert!(!timer.state().is_paused);
    }

    #[test]
    fn operations_before_start_are_rejected() {
        let mut timer = SessionTimer::new(&BlsSettings::default());
        let t0 = Instant::now();
        assert_matches!(timer.pause(t0), Err(SessionError::NotStarted));
        assert_matches!(timer.stop(t0), Err(SessionError::NotStarted));
        assert_eq!(timer.tick(t0), None);
        timer.start(t0).unwrap();
        assert_matches!(timer.start(t0), Err(SessionError::AlreadyStarted));
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(Duration::ZERO), "00:00");
        assert_eq!(format_clock(Duration::from_millis(59_999)), "00:59");
        assert_eq!(format_clock(secs(754)), "12:34");
    }

    #[test]
    fn set_progress() {
        let cfg = settings(20, 10, 5, 20);
        let mut state = SessionState {
            elapsed_set_time: secs(5),
            ..Default::default()
        };
        assert_eq!(set_progress_percent(&state, &cfg), 25.0);
        state.is_resting = true;
        assert_eq!(set_progress_percent(&state, &cfg), 100.0);
    }
}
