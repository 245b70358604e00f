//! Fan-out of the shared side value to the visual, audio and haptic channels.
//!
//! The coordinator holds no timer of its own. It is handed side changes by
//! whichever [`crate::clock::SideTimingSource`] is authoritative and forwards
//! them to every enabled channel in the same call. A channel whose sink fails
//! is switched off for the rest of the session; the others carry on.

use crate::clock::Side;
use crate::error::SinkError;
use crate::settings::{BlsSettings, HapticIntensity};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Dot position while stimulation is not running
pub const REST_POSITION: f64 = 0.5;

pub trait VisualSink: Send {
    /// `position` is the fraction of travel, 0 = left extreme, 1 = right
    fn render(&mut self, position: f64, color: &str, size: u32) -> Result<(), SinkError>;
}

pub trait AudioSink: Send {
    fn trigger(&mut self, side: Side) -> Result<(), SinkError>;
    fn set_volume(&mut self, volume: f64) -> Result<(), SinkError>;
}

pub trait HapticSink: Send {
    fn trigger(&mut self, side: Side, intensity: HapticIntensity) -> Result<(), SinkError>;
}

/// Platform backends handed to a session. Missing backends act like
/// disabled channels.
#[derive(Default)]
pub struct Sinks {
    pub visual: Option<Box<dyn VisualSink>>,
    pub audio: Option<Box<dyn AudioSink>>,
    pub haptic: Option<Box<dyn HapticSink>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ChannelKind {
    Visual,
    Audio,
    Haptic,
}

struct Channel<S: ?Sized> {
    kind: ChannelKind,
    sink: Option<Box<S>>,
    enabled: bool,
    failed: bool,
}

impl<S: ?Sized> Channel<S> {
    fn new(kind: ChannelKind, sink: Option<Box<S>>, enabled: bool) -> Self {
        Self {
            kind,
            sink,
            enabled,
            failed: false,
        }
    }

    fn is_live(&self) -> bool {
        self.enabled && !self.failed && self.sink.is_some()
    }

    /// Runs `f` against the sink if the channel is live; a failure retires
    /// the channel for the rest of the session.
    fn call(&mut self, f: impl FnOnce(&mut S) -> Result<(), SinkError>) {
        if !self.enabled || self.failed {
            return;
        }
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        if let Err(e) = f(sink) {
            warn!("{} channel failed, disabling for this session: {e}", self.kind);
            self.failed = true;
        }
    }
}

pub struct StimulusCoordinator {
    visual: Channel<dyn VisualSink>,
    audio: Channel<dyn AudioSink>,
    haptic: Channel<dyn HapticSink>,
    dot_color: String,
    dot_size: u32,
    intensity: HapticIntensity,
    last_side: Option<Side>,
}

impl StimulusCoordinator {
    pub fn new(settings: &BlsSettings, sinks: Sinks) -> Self {
        let mut coordinator = Self {
            visual: Channel::new(ChannelKind::Visual, sinks.visual, settings.visual_enabled),
            audio: Channel::new(ChannelKind::Audio, sinks.audio, settings.audio_enabled),
            haptic: Channel::new(ChannelKind::Haptic, sinks.haptic, settings.haptic_enabled),
            dot_color: settings.dot_color.clone(),
            dot_size: settings.dot_size,
            intensity: settings.haptic_intensity,
            last_side: None,
        };
        let volume = settings.audio_volume;
        coordinator.audio.call(|sink| sink.set_volume(volume));
        coordinator
    }

    /// Forwards a side change to the audio and haptic channels. A repeat of
    /// the previously dispatched side is dropped so consumers always see a
    /// strict left/right alternation. Returns whether it was dispatched.
    pub fn dispatch(&mut self, side: Side) -> bool {
        if self.last_side == Some(side) {
            return false;
        }
        self.last_side = Some(side);
        self.audio.call(|sink| sink.trigger(side));
        let intensity = self.intensity.for_side(side);
        self.haptic.call(|sink| sink.trigger(side, intensity));
        true
    }

    /// Draws one frame of the dot
    pub fn render(&mut self, position: f64) {
        let position = position.clamp(0.0, 1.0);
        let (color, size) = (self.dot_color.as_str(), self.dot_size);
        self.visual.call(|sink| sink.render(position, color, size));
    }

    /// Ends a stimulation window: the next window may start on either side,
    /// and the dot is parked in the centre.
    pub fn silence(&mut self) {
        self.last_side = None;
        self.render(REST_POSITION);
    }

    pub fn last_side(&self) -> Option<Side> {
        self.last_side
    }

    pub fn set_enabled(&mut self, kind: ChannelKind, enabled: bool) {
        match kind {
            ChannelKind::Visual => self.visual.enabled = enabled,
            ChannelKind::Audio => self.audio.enabled = enabled,
            ChannelKind::Haptic => self.haptic.enabled = enabled,
        }
    }

    pub fn is_live(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Visual => self.visual.is_live(),
            ChannelKind::Audio => self.audio.is_live(),
            ChannelKind::Haptic => self.haptic.is_live(),
        }
    }

    pub fn has_failed(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Visual => self.visual.failed,
            ChannelKind::Audio => self.audio.failed,
            ChannelKind::Haptic => self.haptic.failed,
        }
    }

    pub fn live_channels(&self) -> Vec<ChannelKind> {
        [ChannelKind::Visual, ChannelKind::Audio, ChannelKind::Haptic]
            .into_iter()
            .filter(|k| self.is_live(*k))
            .collect()
    }
}

/// What a recording sink observed
#[derive(Debug, Clone, PartialEq)]
pub enum StimulusEvent {
    Render { position: f64, color: String, size: u32 },
    Tone(Side),
    Volume(f64),
    Pulse(Side, HapticIntensity),
}

/// Shared log of everything the recording sinks received, in call order
#[derive(Debug, Clone, Default)]
pub struct SinkLog(Arc<Mutex<Vec<StimulusEvent>>>);

impl SinkLog {
    pub fn events(&self) -> Vec<StimulusEvent> {
        self.0.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn tones(&self) -> Vec<Side> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StimulusEvent::Tone(side) => Some(side),
                _ => None,
            })
            .collect()
    }

    pub fn pulses(&self) -> Vec<(Side, HapticIntensity)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StimulusEvent::Pulse(side, intensity) => Some((side, intensity)),
                _ => None,
            })
            .collect()
    }

    pub fn positions(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StimulusEvent::Render { position, .. } => Some(position),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: StimulusEvent) {
        if let Ok(mut v) = self.0.lock() {
            v.push(event);
        }
    }
}

/// Headless sink that records calls, optionally failing every one of them
#[derive(Debug, Clone)]
pub struct RecordingSink {
    log: SinkLog,
    fail: bool,
}

impl RecordingSink {
    pub fn new(log: SinkLog) -> Self {
        Self { log, fail: false }
    }

    pub fn failing(log: SinkLog) -> Self {
        Self { log, fail: true }
    }

    fn record(&self, event: StimulusEvent) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Unavailable("recording"));
        }
        self.log.push(event);
        Ok(())
    }
}

impl VisualSink for RecordingSink {
    fn render(&mut self, position: f64, color: &str, size: u32) -> Result<(), SinkError> {
        self.record(StimulusEvent::Render {
            position,
            color: color.to_string(),
            size,
        })
    }
}

impl AudioSink for RecordingSink {
    fn trigger(&mut self, side: Side) -> Result<(), SinkError> {
        self.record(StimulusEvent::Tone(side))
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), SinkError> {
        self.record(StimulusEvent::Volume(volume))
    }
}

impl HapticSink for RecordingSink {
    fn trigger(&mut self, side: Side, intensity: HapticIntensity) -> Result<(), SinkError> {
        self.record(StimulusEvent::Pulse(side, intensity))
    }
}

/// All three channels backed by recording sinks sharing one log
pub fn recording_sinks() -> (Sinks, SinkLog) {
    let log = SinkLog::default();
    let sinks = Sinks {
        visual: Some(Box::new(RecordingSink::new(log.clone()))),
        audio: Some(Box::new(RecordingSink::new(log.clone()))),
        haptic: Some(Box::new(RecordingSink::new(log.clone()))),
    };
    (sinks, log)
}
