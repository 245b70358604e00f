//! Side alternation timing.
//!
//! Exactly one [`SideTimingSource`] publishes side changes for a session.
//! When the visual channel is on screen the dot animation is the authority
//! ([`VisualMotion`]); otherwise a plain [`AlternationClock`] paces audio and
//! haptic triggers. Consumers never time themselves.

use crate::settings::{half_cycle_for, BlsSettings};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[strum(serialize = "left")]
    Left,
    #[strum(serialize = "right")]
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum TimingAuthority {
    Clock,
    Visual,
}

/// Publisher of the shared side value
pub trait SideTimingSource: Send {
    /// Start alternating from `now`. Publishes `Left` immediately and returns it.
    fn activate(&mut self, now: Instant, speed: f64) -> Side;

    /// Stop publishing. The last side is kept for late readers.
    fn deactivate(&mut self);

    fn is_active(&self) -> bool;

    /// Advance to `now`. Returns the new side when a half-cycle boundary has
    /// been crossed since the previous poll. At most one change per poll, so a
    /// coarse scheduler alternates at its own granularity.
    fn poll(&mut self, now: Instant, speed: f64) -> Option<Side>;

    fn side(&self) -> Side;

    fn authority(&self) -> TimingAuthority;

    /// Dot position as a fraction of travel (0 = left extreme, 1 = right).
    /// Only the visual source animates.
    fn position(&self, _now: Instant) -> Option<f64> {
        None
    }
}

/// Picks the timing authority once, when a session is configured
pub fn timing_source_for(settings: &BlsSettings) -> Box<dyn SideTimingSource> {
    if settings.visual_enabled {
        Box::new(VisualMotion::new())
    } else {
        Box::new(AlternationClock::new())
    }
}

/// Half-cycle legs anchored to the previous boundary so phase does not drift
/// with poll jitter. Falls back to re-anchoring on `now` when a whole leg was
/// missed.
#[derive(Debug, Clone, Copy)]
struct Cadence {
    leg_start: Instant,
    leg_len: Duration,
}

impl Cadence {
    fn new(now: Instant, speed: f64) -> Self {
        Self {
            leg_start: now,
            leg_len: half_cycle_for(speed),
        }
    }

    fn leg_end(&self) -> Instant {
        self.leg_start + self.leg_len
    }

    fn crossed(&mut self, now: Instant, speed: f64) -> bool {
        let boundary = self.leg_end();
        if now < boundary {
            return false;
        }
        let next_len = half_cycle_for(speed);
        self.leg_start = if boundary + next_len <= now { now } else { boundary };
        self.leg_len = next_len;
        true
    }

    fn progress(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.leg_start).as_secs_f64();
        (elapsed / self.leg_len.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// What a timing source does on top of plain alternation
pub trait Motion: Send {
    const AUTHORITY: TimingAuthority;

    /// Position for a leg heading away from `side`, `progress` through it
    fn position(side: Side, progress: f64) -> Option<f64>;
}

/// No animation; alternation paces audio and haptic triggers only
#[derive(Debug, Clone, Copy)]
pub struct Steady;

impl Motion for Steady {
    const AUTHORITY: TimingAuthority = TimingAuthority::Clock;

    fn position(_side: Side, _progress: f64) -> Option<f64> {
        None
    }
}

fn ease_in_out(p: f64) -> f64 {
    p * p * (3.0 - 2.0 * p)
}

/// Dot sweep between the two screen extremes. Each completed sweep publishes
/// the side it arrived at, keeping pulses locked to the dot.
#[derive(Debug, Clone, Copy)]
pub struct Sweep;

impl Motion for Sweep {
    const AUTHORITY: TimingAuthority = TimingAuthority::Visual;

    fn position(side: Side, progress: f64) -> Option<f64> {
        let eased = ease_in_out(progress);
        Some(match side {
            // leaving the left extreme, heading right
            Side::Left => eased,
            Side::Right => 1.0 - eased,
        })
    }
}

/// Left/right alternation on a half-cycle cadence, shaped by `M`
#[derive(Debug, Clone)]
pub struct Alternation<M> {
    side: Side,
    cadence: Option<Cadence>,
    motion: PhantomData<M>,
}

/// Periodic left/right signal for sessions without a visual channel
pub type AlternationClock = Alternation<Steady>;

/// The dot animation as timing authority
pub type VisualMotion = Alternation<Sweep>;

impl<M> Alternation<M> {
    pub fn new() -> Self {
        Self {
            side: Side::Left,
            cadence: None,
            motion: PhantomData,
        }
    }
}

impl<M> Default for Alternation<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Motion> SideTimingSource for Alternation<M> {
    fn activate(&mut self, now: Instant, speed: f64) -> Side {
        self.side = Side::Left;
        self.cadence = Some(Cadence::new(now, speed));
        self.side
    }

    fn deactivate(&mut self) {
        self.cadence = None;
    }

    fn is_active(&self) -> bool {
        self.cadence.is_some()
    }

    fn poll(&mut self, now: Instant, speed: f64) -> Option<Side> {
        let cadence = self.cadence.as_mut()?;
        if cadence.crossed(now, speed) {
            self.side = self.side.opposite();
            Some(self.side)
        } else {
            None
        }
    }

    fn side(&self) -> Side {
        self.side
    }

    fn authority(&self) -> TimingAuthority {
        M::AUTHORITY
    }

    fn position(&self, now: Instant) -> Option<f64> {
        let cadence = self.cadence.as_ref()?;
        M::position(self.side, cadence.progress(now))
    }
}
