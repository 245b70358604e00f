//! One guided session from countdown to the final stop.
//!
//! [`SessionController`] is the single owner of the timer state. It is
//! driven by one loop calling [`SessionController::tick`]; stimulation,
//! delayed prompts and reminders all hang off that loop, so tearing the
//! controller down leaves nothing running behind it.

use crate::clock::{timing_source_for, Side, SideTimingSource, TimingAuthority};
use crate::error::SessionError;
use crate::scheduler::OneShotQueue;
use crate::settings::BlsSettings;
use crate::stimulus::{ChannelKind, Sinks, StimulusCoordinator};
use crate::sud::{PendingSummary, SudCollector, SudValue};
use crate::timer::{Phase, SessionState, SessionTimer, StopReason, TimerTransition};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;

pub const COUNTDOWN_SECS: u32 = 3;
/// Pause on "0" before the session begins
pub const COUNTDOWN_HOLD: Duration = Duration::from_millis(500);
pub const GOAL_REMINDER_DURATION: Duration = Duration::from_secs(5);
pub const MID_SUD_PROMPT_DELAY: Duration = Duration::from_secs(1);
/// Longest rating ("10") that can be typed into an open check-in
const MAX_ENTRY_DIGITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Countdown(u32),
    Begin,
    DismissGoalReminder,
    PromptMidSud { set: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Countdown(u32),
    Started,
    GoalReminderShown(String),
    GoalReminderDismissed,
    Side(Side),
    RestStarted { completed_set: u32 },
    SetStarted { set: u32 },
    MidSudPrompt { set: u32 },
    MidSudPromptClosed { set: u32 },
    Paused,
    Resumed,
    Stopped(StopReason),
}

pub struct SessionController {
    settings: BlsSettings,
    timer: SessionTimer,
    source: Box<dyn SideTimingSource>,
    coordinator: StimulusCoordinator,
    tasks: OneShotQueue<Task>,
    sud: Option<SudCollector>,
    /// Sets whose check-in was answered or skipped
    resolved_sets: HashSet<u32>,
    open_prompt: Option<u32>,
    /// Digits typed into the open check-in
    entry: String,
    countdown: Option<u32>,
    reminder_visible: bool,
}

impl SessionController {
    /// Captures `settings` for the lifetime of the session; later changes to
    /// the caller's copy are not observed.
    pub fn new(
        settings: &BlsSettings,
        sinks: Sinks,
        pre_sud: SudValue,
        goal: Option<String>,
    ) -> Self {
        let source = timing_source_for(settings);
        debug!("side timing authority: {}", source.authority());
        Self {
            settings: settings.clone(),
            timer: SessionTimer::new(settings),
            source,
            coordinator: StimulusCoordinator::new(settings, sinks),
            tasks: OneShotQueue::new(),
            sud: Some(SudCollector::record_pre(pre_sud, goal)),
            resolved_sets: HashSet::new(),
            open_prompt: None,
            entry: String::new(),
            countdown: None,
            reminder_visible: false,
        }
    }

    pub fn settings(&self) -> &BlsSettings {
        &self.settings
    }

    pub fn state(&self) -> &SessionState {
        self.timer.state()
    }

    pub fn phase(&self) -> Phase {
        self.timer.phase()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.timer.stop_reason()
    }

    pub fn side(&self) -> Side {
        self.source.side()
    }

    pub fn timing_authority(&self) -> TimingAuthority {
        self.source.authority()
    }

    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    pub fn open_prompt(&self) -> Option<u32> {
        self.open_prompt
    }

    pub fn mid_sud_entry(&self) -> &str {
        &self.entry
    }

    pub fn goal(&self) -> Option<&str> {
        self.sud.as_ref().and_then(|s| s.goal())
    }

    pub fn reminder_visible(&self) -> bool {
        self.reminder_visible
    }

    pub fn live_channels(&self) -> Vec<ChannelKind> {
        self.coordinator.live_channels()
    }

    pub fn set_channel_enabled(&mut self, kind: ChannelKind, enabled: bool) {
        self.coordinator.set_enabled(kind, enabled);
    }

    /// Mid-session ratings recorded so far, as raw values
    pub fn mid_suds(&self) -> Vec<u8> {
        self.sud
            .as_ref()
            .map(|s| s.mids().iter().map(|r| r.value.get()).collect())
            .unwrap_or_default()
    }

    /// Shows the pre-session countdown; the session starts on its own once
    /// it has run out.
    pub fn begin_countdown(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        if self.timer.phase() != Phase::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        self.tasks.cancel_where(|t| matches!(t, Task::Countdown(_) | Task::Begin));
        self.countdown = Some(COUNTDOWN_SECS);
        for step in 1..=COUNTDOWN_SECS {
            self.tasks.schedule(
                now + Duration::from_secs(step as u64),
                Task::Countdown(COUNTDOWN_SECS - step),
            );
        }
        self.tasks.schedule(
            now + Duration::from_secs(COUNTDOWN_SECS as u64) + COUNTDOWN_HOLD,
            Task::Begin,
        );
        Ok(vec![SessionEvent::Countdown(COUNTDOWN_SECS)])
    }

    /// Starts immediately, skipping any countdown still running
    pub fn start(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        self.start_into(now, &mut events)?;
        Ok(events)
    }

    fn start_into(
        &mut self,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), SessionError> {
        self.timer.start(now)?;
        self.tasks.cancel_where(|t| matches!(t, Task::Countdown(_) | Task::Begin));
        self.countdown = None;
        events.push(SessionEvent::Started);
        if let Some(goal) = self.goal().map(str::to_string) {
            self.reminder_visible = true;
            self.tasks.schedule(now + GOAL_REMINDER_DURATION, Task::DismissGoalReminder);
            events.push(SessionEvent::GoalReminderShown(goal));
        }
        self.begin_stimulation(now, events);
        Ok(())
    }

    /// Advances countdown, timer, prompts and stimulation to `now`
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        // transitions first so a prompt never opens after its rest has ended
        match self.timer.tick(now) {
            Some(TimerTransition::RestStarted { completed_set }) => {
                self.end_stimulation();
                events.push(SessionEvent::RestStarted { completed_set });
                self.schedule_prompt_if_due(now);
            }
            Some(TimerTransition::SetStarted { set }) => {
                self.tasks.cancel_where(|t| matches!(t, Task::PromptMidSud { .. }));
                if let Some(open) = self.open_prompt.take() {
                    self.entry.clear();
                    events.push(SessionEvent::MidSudPromptClosed { set: open });
                }
                events.push(SessionEvent::SetStarted { set });
                self.begin_stimulation(now, &mut events);
            }
            Some(TimerTransition::Stopped(reason)) => {
                self.teardown();
                events.push(SessionEvent::Stopped(reason));
            }
            None => {}
        }

        for task in self.tasks.take_due(now) {
            self.run_task(task, now, &mut events);
        }

        if self.timer.state().is_stimulating() {
            if let Some(side) = self.source.poll(now, self.settings.speed) {
                if self.coordinator.dispatch(side) {
                    events.push(SessionEvent::Side(side));
                }
            }
            if let Some(position) = self.source.position(now) {
                self.coordinator.render(position);
            }
        }

        events
    }

    pub fn pause(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        if !self.timer.pause(now)? {
            return Ok(vec![]);
        }
        self.end_stimulation();
        // re-armed on resume if the rest period is still going
        self.tasks.cancel_where(|t| matches!(t, Task::PromptMidSud { .. }));
        Ok(vec![SessionEvent::Paused])
    }

    pub fn resume(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        if !self.timer.resume(now)? {
            return Ok(vec![]);
        }
        let mut events = vec![SessionEvent::Resumed];
        if self.timer.state().is_resting {
            self.schedule_prompt_if_due(now);
        } else {
            self.begin_stimulation(now, &mut events);
        }
        Ok(events)
    }

    pub fn toggle_pause(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        if self.timer.state().is_paused {
            self.resume(now)
        } else {
            self.pause(now)
        }
    }

    pub fn stop(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        self.timer.stop(now)?;
        self.teardown();
        Ok(vec![SessionEvent::Stopped(StopReason::User)])
    }

    /// Records the rating for the open check-in. Without an open prompt the
    /// rating is refused, so each rest period takes at most one.
    pub fn submit_mid_sud(&mut self, value: SudValue) -> Result<Vec<SessionEvent>, SessionError> {
        self.ensure_running()?;
        let set = self.open_prompt.ok_or(SessionError::NoPromptOpen)?;
        let collector = self.sud.as_mut().ok_or(SessionError::AlreadyFinished)?;
        collector.record_mid(value);
        Ok(self.resolve(set))
    }

    /// Appends a typed digit to the open check-in
    pub fn type_mid_sud_digit(&mut self, digit: u8) -> Result<(), SessionError> {
        self.ensure_running()?;
        if self.open_prompt.is_none() {
            return Err(SessionError::NoPromptOpen);
        }
        if digit <= 9 && self.entry.len() < MAX_ENTRY_DIGITS {
            self.entry.push(char::from(b'0' + digit));
        }
        Ok(())
    }

    pub fn erase_mid_sud_digit(&mut self) {
        self.entry.pop();
    }

    /// Submits the typed digits. An out-of-range entry is cleared and the
    /// prompt stays open for another try.
    pub fn confirm_mid_sud_entry(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        self.ensure_running()?;
        if self.open_prompt.is_none() {
            return Err(SessionError::NoPromptOpen);
        }
        let typed = std::mem::take(&mut self.entry);
        match typed.parse::<i64>() {
            Ok(v) => self.submit_mid_sud(SudValue::new(v)?),
            Err(_) => Ok(vec![]),
        }
    }

    pub fn skip_mid_sud(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        self.ensure_running()?;
        match self.open_prompt.take() {
            Some(set) => Ok(self.resolve(set)),
            None => Ok(vec![]),
        }
    }

    /// Hands over the session figures once stopped. The post rating is
    /// collected separately on the returned value.
    pub fn finish(&mut self) -> Result<PendingSummary, SessionError> {
        match self.timer.phase() {
            Phase::Stopped => {}
            Phase::Idle => return Err(SessionError::NotStarted),
            _ => return Err(SessionError::StillRunning),
        }
        let collector = self.sud.take().ok_or(SessionError::AlreadyFinished)?;
        let state = self.timer.state();
        Ok(collector.finish(state.elapsed_session_time, state.total_sets))
    }

    /// Cancels every pending task and silences all channels. Safe to call
    /// repeatedly; used when the session is abandoned as well as on stop.
    pub fn teardown(&mut self) {
        self.tasks.clear();
        self.end_stimulation();
        self.open_prompt = None;
        self.entry.clear();
        self.countdown = None;
        self.reminder_visible = false;
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        match self.timer.phase() {
            Phase::Idle => Err(SessionError::NotStarted),
            Phase::Stopped => Err(SessionError::AlreadyStopped),
            _ => Ok(()),
        }
    }

    fn resolve(&mut self, set: u32) -> Vec<SessionEvent> {
        self.open_prompt = None;
        self.entry.clear();
        self.resolved_sets.insert(set);
        self.tasks
            .cancel_where(|t| matches!(t, Task::PromptMidSud { set: s } if *s == set));
        vec![SessionEvent::MidSudPromptClosed { set }]
    }

    fn run_task(&mut self, task: Task, now: Instant, events: &mut Vec<SessionEvent>) {
        match task {
            Task::Countdown(n) => {
                self.countdown = Some(n);
                events.push(SessionEvent::Countdown(n));
            }
            Task::Begin => {
                if let Err(e) = self.start_into(now, events) {
                    debug!("countdown finished on a session that cannot start: {e}");
                }
            }
            Task::DismissGoalReminder => {
                self.reminder_visible = false;
                events.push(SessionEvent::GoalReminderDismissed);
            }
            Task::PromptMidSud { set } => {
                let state = self.timer.state();
                if state.is_resting
                    && state.current_set == set
                    && !self.resolved_sets.contains(&set)
                {
                    self.open_prompt = Some(set);
                    events.push(SessionEvent::MidSudPrompt { set });
                }
            }
        }
    }

    /// Check-ins start from the second set's rest, once per set
    fn schedule_prompt_if_due(&mut self, now: Instant) {
        let set = self.timer.state().current_set;
        if set > 1
            && !self.resolved_sets.contains(&set)
            && self.open_prompt.is_none()
            && !self.tasks.contains(|t| matches!(t, Task::PromptMidSud { .. }))
        {
            self.tasks.schedule(now + MID_SUD_PROMPT_DELAY, Task::PromptMidSud { set });
        }
    }

    fn begin_stimulation(&mut self, now: Instant, events: &mut Vec<SessionEvent>) {
        let side = self.source.activate(now, self.settings.speed);
        if self.coordinator.dispatch(side) {
            events.push(SessionEvent::Side(side));
        }
        if let Some(position) = self.source.position(now) {
            self.coordinator.render(position);
        }
    }

    fn end_stimulation(&mut self) {
        if self.source.is_active() {
            self.source.deactivate();
            self.coordinator.silence();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::{recording_sinks, SinkLog, REST_POSITION};
    use assert_matches::assert_matches;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn settings() -> BlsSettings {
        BlsSettings {
            set_duration: 15,
            rest_interval: 10,
            max_sets: 4,
            ..Default::default()
        }
    }

    fn controller(settings: &BlsSettings, goal: Option<&str>) -> (SessionController, SinkLog) {
        let (sinks, log) = recording_sinks();
        let c = SessionController::new(
            settings,
            sinks,
            SudValue::new(6).unwrap(),
            goal.map(str::to_string),
        );
        (c, log)
    }

    /// Ticks every 10ms over (from, to], collecting events
    fn drive(
        c: &mut SessionController,
        t0: Instant,
        from: Duration,
        to: Duration,
    ) -> Vec<SessionEvent> {
        let mut events = vec![];
        let mut offset = from;
        while offset < to {
            offset += ms(10);
            events.extend(c.tick(t0 + offset));
        }
        events
    }

    #[test]
    fn start_publishes_left_and_begins_first_set() {
        let (mut c, log) = controller(&settings(), None);
        let t0 = Instant::now();
        let events = c.start(t0).unwrap();
        assert_eq!(events, vec![SessionEvent::Started, SessionEvent::Side(Side::Left)]);
        assert_eq!(c.state().current_set, 1);
        assert_eq!(log.tones(), vec![Side::Left]);
        assert_eq!(log.positions(), vec![0.0]);
        assert_eq!(c.timing_authority(), TimingAuthority::Visual);
    }

    #[test]
    fn stimulation_alternates_during_a_set_and_stops_for_rest() {
        let (mut c, log) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        let events = drive(&mut c, t0, Duration::ZERO, secs(16));

        // 1 Hz: 30 half cycles in the 15s set, the first at start
        assert_eq!(log.tones().len(), 30);
        assert!(log.tones().windows(2).all(|w| w[0] != w[1]));
        assert!(events.contains(&SessionEvent::RestStarted { completed_set: 1 }));
        assert!(!c.state().is_stimulating());
        assert_eq!(log.positions().last(), Some(&REST_POSITION));

        let tones_at_rest = log.tones().len();
        drive(&mut c, t0, secs(16), secs(24));
        assert_eq!(log.tones().len(), tones_at_rest);
    }

    #[test]
    fn pulses_escalate_on_the_right() {
        let (mut c, log) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, ms(1200));
        let pulses = log.pulses();
        assert!(pulses.len() >= 3);
        for (side, intensity) in pulses {
            let expected = match side {
                Side::Left => crate::settings::HapticIntensity::Medium,
                Side::Right => crate::settings::HapticIntensity::Heavy,
            };
            assert_eq!(intensity, expected);
        }
    }

    #[test]
    fn clock_driven_session_without_visual() {
        let cfg = BlsSettings {
            visual_enabled: false,
            ..settings()
        };
        let (mut c, log) = controller(&cfg, None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, ms(2000));
        assert_eq!(c.timing_authority(), TimingAuthority::Clock);
        assert!(log.positions().is_empty());
        assert_eq!(log.tones().len(), 5);
    }

    #[test]
    fn no_prompt_after_first_rest() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        let events = drive(&mut c, t0, Duration::ZERO, secs(24));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::MidSudPrompt { .. })));
    }

    #[test]
    fn prompt_after_second_set_arrives_with_delay() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        // set 1: 0-15, rest: 15-25, set 2: 25-40, rest from 40
        let events = drive(&mut c, t0, Duration::ZERO, secs(40));
        assert!(events.contains(&SessionEvent::RestStarted { completed_set: 2 }));
        assert_eq!(c.open_prompt(), None);

        let events = drive(&mut c, t0, secs(40), ms(40_990));
        assert!(events.is_empty());
        let events = drive(&mut c, t0, ms(40_990), secs(41));
        assert_eq!(events, vec![SessionEvent::MidSudPrompt { set: 2 }]);
        assert_eq!(c.open_prompt(), Some(2));
    }

    #[test]
    fn submitted_check_in_is_recorded_once() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(42));
        assert_eq!(c.open_prompt(), Some(2));

        let events = c.submit_mid_sud(SudValue::new(4).unwrap()).unwrap();
        assert_eq!(events, vec![SessionEvent::MidSudPromptClosed { set: 2 }]);
        assert_eq!(c.open_prompt(), None);
        assert_eq!(c.mid_suds(), vec![4]);

        // pausing and resuming in the same rest does not re-prompt
        c.pause(t0 + secs(43)).unwrap();
        c.resume(t0 + secs(44)).unwrap();
        let events = drive(&mut c, t0, secs(44), secs(48));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::MidSudPrompt { .. })));
    }

    #[test]
    fn rating_without_an_open_prompt_is_refused() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(2));
        for v in [1, 0, 7] {
            assert_matches!(
                c.submit_mid_sud(SudValue::new(v).unwrap()),
                Err(SessionError::NoPromptOpen)
            );
        }
        assert_matches!(c.type_mid_sud_digit(1), Err(SessionError::NoPromptOpen));
        assert_eq!(c.mid_sud_entry(), "");
        assert!(c.mid_suds().is_empty());
    }

    #[test]
    fn resolved_set_takes_no_second_rating() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(42));
        c.submit_mid_sud(SudValue::new(5).unwrap()).unwrap();
        assert_matches!(
            c.submit_mid_sud(SudValue::new(2).unwrap()),
            Err(SessionError::NoPromptOpen)
        );
        drive(&mut c, t0, secs(42), secs(49));
        assert_matches!(
            c.submit_mid_sud(SudValue::new(2).unwrap()),
            Err(SessionError::NoPromptOpen)
        );
        assert_eq!(c.mid_suds(), vec![5]);
    }

    #[test]
    fn typed_ten_is_one_rating() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(42));

        c.type_mid_sud_digit(1).unwrap();
        c.type_mid_sud_digit(0).unwrap();
        c.type_mid_sud_digit(7).unwrap();
        assert_eq!(c.mid_sud_entry(), "10");
        assert_eq!(
            c.confirm_mid_sud_entry().unwrap(),
            vec![SessionEvent::MidSudPromptClosed { set: 2 }]
        );
        assert_eq!(c.mid_suds(), vec![10]);
        assert_eq!(c.mid_sud_entry(), "");
    }

    #[test]
    fn out_of_range_entry_keeps_the_prompt_open() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(42));

        c.type_mid_sud_digit(4).unwrap();
        c.type_mid_sud_digit(2).unwrap();
        assert_matches!(c.confirm_mid_sud_entry(), Err(SessionError::Sud(_)));
        assert_eq!(c.open_prompt(), Some(2));
        assert_eq!(c.mid_sud_entry(), "");

        c.type_mid_sud_digit(9).unwrap();
        c.erase_mid_sud_digit();
        c.type_mid_sud_digit(3).unwrap();
        let events = c.confirm_mid_sud_entry().unwrap();
        assert!(events.contains(&SessionEvent::MidSudPromptClosed { set: 2 }));
        assert_eq!(c.mid_suds(), vec![3]);
    }

    #[test]
    fn skipped_check_in_is_not_re_prompted() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(42));
        assert_eq!(
            c.skip_mid_sud().unwrap(),
            vec![SessionEvent::MidSudPromptClosed { set: 2 }]
        );
        assert!(c.mid_suds().is_empty());
        assert!(c.skip_mid_sud().unwrap().is_empty());
    }

    #[test]
    fn leaving_rest_cancels_pending_prompt() {
        let cfg = BlsSettings {
            set_duration: 15,
            rest_interval: 5,
            max_sets: 4,
            ..Default::default()
        };
        let (mut c, _) = controller(&cfg, None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        // set 2 ends at 35; pause before the prompt fires
        drive(&mut c, t0, Duration::ZERO, ms(35_500));
        c.pause(t0 + ms(35_500)).unwrap();
        c.resume(t0 + secs(60)).unwrap();
        // rest had 4.5s left; prompt re-armed for 61s
        let events = drive(&mut c, t0, secs(60), ms(61_010));
        assert!(events.contains(&SessionEvent::MidSudPrompt { set: 2 }));

        // unanswered prompt closes when the next set starts
        let events = drive(&mut c, t0, ms(61_010), ms(64_600));
        assert!(events.contains(&SessionEvent::MidSudPromptClosed { set: 2 }));
        assert!(events.contains(&SessionEvent::SetStarted { set: 3 }));
        assert_eq!(c.open_prompt(), None);
    }

    #[test]
    fn prompt_pending_when_rest_ends_never_fires() {
        let cfg = BlsSettings {
            set_duration: 15,
            rest_interval: 5,
            max_sets: 4,
            ..Default::default()
        };
        let (mut c, _) = controller(&cfg, None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(35));
        // jump past both the prompt deadline and the rest end in one tick
        let events = c.tick(t0 + secs(41));
        assert!(events.contains(&SessionEvent::SetStarted { set: 3 }));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::MidSudPrompt { .. })));
        let later = drive(&mut c, t0, secs(41), secs(45));
        assert!(!later.iter().any(|e| matches!(e, SessionEvent::MidSudPrompt { .. })));
    }

    #[test]
    fn pause_silences_and_resume_restarts_from_left() {
        let (mut c, log) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, ms(520));
        assert_eq!(log.tones(), vec![Side::Left, Side::Right]);

        assert_eq!(c.pause(t0 + ms(600)).unwrap(), vec![SessionEvent::Paused]);
        drive(&mut c, t0, ms(600), secs(5));
        assert_eq!(log.tones().len(), 2);
        assert_eq!(log.positions().last(), Some(&REST_POSITION));

        let events = c.resume(t0 + secs(5)).unwrap();
        assert_eq!(events, vec![SessionEvent::Resumed, SessionEvent::Side(Side::Left)]);
        assert_eq!(c.state().elapsed_set_time, ms(600));
    }

    #[test]
    fn countdown_then_automatic_start() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        assert_eq!(c.begin_countdown(t0).unwrap(), vec![SessionEvent::Countdown(3)]);
        let events = drive(&mut c, t0, Duration::ZERO, ms(3490));
        assert_eq!(
            events,
            vec![
                SessionEvent::Countdown(2),
                SessionEvent::Countdown(1),
                SessionEvent::Countdown(0)
            ]
        );
        assert_eq!(c.phase(), Phase::Idle);
        let events = drive(&mut c, t0, ms(3490), ms(3500));
        assert_eq!(events[0], SessionEvent::Started);
        assert_eq!(c.phase(), Phase::ActiveSet);
        assert_eq!(c.countdown(), None);
    }

    #[test]
    fn goal_reminder_dismisses_itself() {
        let (mut c, _) = controller(&settings(), Some("let go of the meeting"));
        let t0 = Instant::now();
        let events = c.start(t0).unwrap();
        assert!(events.contains(&SessionEvent::GoalReminderShown("let go of the meeting".into())));
        assert!(c.reminder_visible());
        let events = drive(&mut c, t0, Duration::ZERO, secs(5));
        assert!(events.contains(&SessionEvent::GoalReminderDismissed));
        assert!(!c.reminder_visible());
    }

    #[test]
    fn stop_cancels_everything_and_yields_pending_summary() {
        let (mut c, log) = controller(&settings(), Some("sleep"));
        let t0 = Instant::now();
        c.start(t0).unwrap();
        drive(&mut c, t0, Duration::ZERO, secs(2));
        assert_eq!(c.stop(t0 + secs(2)).unwrap(), vec![SessionEvent::Stopped(StopReason::User)]);
        let tones = log.tones().len();

        // reminder would have fired at 5s
        let events = drive(&mut c, t0, secs(2), secs(10));
        assert!(events.is_empty());
        assert_eq!(log.tones().len(), tones);

        assert_matches!(
            c.submit_mid_sud(SudValue::new(3).unwrap()),
            Err(SessionError::AlreadyStopped)
        );
        let pending = c.finish().unwrap();
        assert_eq!(pending.total_sets, 1);
        assert_eq!(pending.total_duration, 2);
        assert_eq!(pending.goal.as_deref(), Some("sleep"));
        assert_matches!(c.finish(), Err(SessionError::AlreadyFinished));
    }

    #[test]
    fn finish_requires_a_stopped_session() {
        let (mut c, _) = controller(&settings(), None);
        assert_matches!(c.finish(), Err(SessionError::NotStarted));
        c.start(Instant::now()).unwrap();
        assert_matches!(c.finish(), Err(SessionError::StillRunning));
    }

    #[test]
    fn full_session_runs_to_set_cap() {
        let (mut c, _) = controller(&settings(), None);
        let t0 = Instant::now();
        c.start(t0).unwrap();
        // 4 sets of 15s with 3 rests of 10s
        let events = drive(&mut c, t0, Duration::ZERO, secs(91));
        assert!(events.contains(&SessionEvent::Stopped(StopReason::MaxSets)));
        assert_eq!(c.state().total_sets, 4);
        assert_eq!(c.state().elapsed_session_time, secs(90));
        let prompts = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::MidSudPrompt { .. }))
            .count();
        assert_eq!(prompts, 2);
    }

    #[test]
    fn session_ignores_later_settings_changes() {
        let mut cfg = settings();
        let (c, _) = controller(&cfg, None);
        cfg.set_duration = 45;
        assert_eq!(c.settings().set_duration, 15);
    }
}
