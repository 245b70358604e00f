use crate::app_dirs::AppDirs;
use crate::clock::Side;
use crate::error::{SettingsError, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const SPEED_HZ: RangeInclusive<f64> = 0.5..=1.8;
pub const DOT_SIZE: RangeInclusive<u32> = 30..=80;
pub const AUDIO_VOLUME: RangeInclusive<f64> = 0.0..=1.0;
pub const SET_DURATION_SECS: RangeInclusive<u32> = 15..=45;
pub const REST_INTERVAL_SECS: RangeInclusive<u32> = 5..=30;
pub const MAX_SETS: RangeInclusive<u32> = 1..=100;
pub const MAX_SESSION_MINUTES: RangeInclusive<u32> = 1..=120;

/// Named dot colours offered by the settings screen
pub const DOT_COLORS: [(&str, &str); 8] = [
    ("Blue", "#00A8E8"),
    ("Green", "#00C853"),
    ("Purple", "#9C27B0"),
    ("Orange", "#FF6F00"),
    ("Cyan", "#00E5FF"),
    ("Pink", "#F50057"),
    ("Yellow", "#FFD600"),
    ("White", "#FFFFFF"),
];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
pub enum HapticIntensity {
    Light,
    Medium,
    Heavy,
}

impl HapticIntensity {
    /// One step stronger, saturating at Heavy
    pub fn escalated(self) -> Self {
        match self {
            HapticIntensity::Light => HapticIntensity::Medium,
            HapticIntensity::Medium | HapticIntensity::Heavy => HapticIntensity::Heavy,
        }
    }

    /// Pulse strength for a side: left keeps the configured level, right is
    /// escalated so single-actuator devices still feel a left/right difference.
    pub fn for_side(self, side: Side) -> Self {
        match side {
            Side::Left => self,
            Side::Right => self.escalated(),
        }
    }
}

impl FromStr for HapticIntensity {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(HapticIntensity::Light),
            "medium" => Ok(HapticIntensity::Medium),
            "heavy" => Ok(HapticIntensity::Heavy),
            _ => Err(SettingsError::Unparseable {
                field: "hapticIntensity".into(),
                value: s.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlsSettings {
    pub visual_enabled: bool,
    pub audio_enabled: bool,
    pub haptic_enabled: bool,
    /// Alternation frequency in Hz (one full left-right-left cycle per period)
    pub speed: f64,
    pub dot_color: String,
    pub dot_size: u32,
    pub audio_volume: f64,
    pub haptic_intensity: HapticIntensity,
    /// Seconds of stimulation per set
    pub set_duration: u32,
    /// Seconds of rest between sets
    pub rest_interval: u32,
    pub max_sets: u32,
    /// Minutes
    pub max_session_duration: u32,
}

impl Default for BlsSettings {
    fn default() -> Self {
        Self {
            visual_enabled: true,
            audio_enabled: true,
            haptic_enabled: true,
            speed: 1.0,
            dot_color: "#00A8E8".to_string(),
            dot_size: 50,
            audio_volume: 0.7,
            haptic_intensity: HapticIntensity::Medium,
            set_duration: 24,
            rest_interval: 10,
            max_sets: 30,
            max_session_duration: 20,
        }
    }
}

fn check_f64(
    field: &'static str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<(), SettingsError> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn check_u32(
    field: &'static str,
    value: u32,
    range: &RangeInclusive<u32>,
) -> Result<(), SettingsError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value: value as f64,
            min: *range.start() as f64,
            max: *range.end() as f64,
        })
    }
}

pub fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl BlsSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_f64("speed", self.speed, &SPEED_HZ)?;
        check_u32("dotSize", self.dot_size, &DOT_SIZE)?;
        check_f64("audioVolume", self.audio_volume, &AUDIO_VOLUME)?;
        check_u32("setDuration", self.set_duration, &SET_DURATION_SECS)?;
        check_u32("restInterval", self.rest_interval, &REST_INTERVAL_SECS)?;
        check_u32("maxSets", self.max_sets, &MAX_SETS)?;
        check_u32("maxSessionDuration", self.max_session_duration, &MAX_SESSION_MINUTES)?;
        if !is_hex_color(&self.dot_color) {
            return Err(SettingsError::InvalidColor(self.dot_color.clone()));
        }
        Ok(())
    }

    /// Pull every field back into its domain. Used for values read from disk,
    /// which may have been edited by hand.
    pub fn clamped(mut self) -> Self {
        if let Err(e) = self.validate() {
            warn!("stored settings out of range, clamping: {e}");
        }
        let defaults = Self::default();
        self.speed = if self.speed.is_finite() {
            self.speed.clamp(*SPEED_HZ.start(), *SPEED_HZ.end())
        } else {
            defaults.speed
        };
        self.audio_volume = if self.audio_volume.is_finite() {
            self.audio_volume.clamp(*AUDIO_VOLUME.start(), *AUDIO_VOLUME.end())
        } else {
            defaults.audio_volume
        };
        self.dot_size = self.dot_size.clamp(*DOT_SIZE.start(), *DOT_SIZE.end());
        self.set_duration = self
            .set_duration
            .clamp(*SET_DURATION_SECS.start(), *SET_DURATION_SECS.end());
        self.rest_interval = self
            .rest_interval
            .clamp(*REST_INTERVAL_SECS.start(), *REST_INTERVAL_SECS.end());
        self.max_sets = self.max_sets.clamp(*MAX_SETS.start(), *MAX_SETS.end());
        self.max_session_duration = self
            .max_session_duration
            .clamp(*MAX_SESSION_MINUTES.start(), *MAX_SESSION_MINUTES.end());
        if !is_hex_color(&self.dot_color) {
            self.dot_color = defaults.dot_color;
        }
        self
    }

    /// Returns a copy with one field changed, addressed by its stored name.
    /// The result is validated; the receiver is left untouched on error.
    pub fn with_field(&self, field: &str, value: &str) -> Result<Self, SettingsError> {
        fn parse<T: FromStr>(field: &str, value: &str) -> Result<T, SettingsError> {
            value.trim().parse().map_err(|_| SettingsError::Unparseable {
                field: field.into(),
                value: value.into(),
            })
        }

        let mut next = self.clone();
        match field {
            "visualEnabled" => next.visual_enabled = parse(field, value)?,
            "audioEnabled" => next.audio_enabled = parse(field, value)?,
            "hapticEnabled" => next.haptic_enabled = parse(field, value)?,
            "speed" => next.speed = parse(field, value)?,
            "dotColor" => next.dot_color = value.trim().to_uppercase(),
            "dotSize" => next.dot_size = parse(field, value)?,
            "audioVolume" => next.audio_volume = parse(field, value)?,
            "hapticIntensity" => next.haptic_intensity = value.parse()?,
            "setDuration" => next.set_duration = parse(field, value)?,
            "restInterval" => next.rest_interval = parse(field, value)?,
            "maxSets" => next.max_sets = parse(field, value)?,
            "maxSessionDuration" => next.max_session_duration = parse(field, value)?,
            other => return Err(SettingsError::UnknownField(other.into())),
        }
        next.validate()?;
        Ok(next)
    }

    /// Time each side is held: half of one full cycle
    pub fn half_cycle(&self) -> Duration {
        half_cycle_for(self.speed)
    }

    pub fn set_length(&self) -> Duration {
        Duration::from_secs(self.set_duration as u64)
    }

    pub fn rest_length(&self) -> Duration {
        Duration::from_secs(self.rest_interval as u64)
    }

    pub fn session_limit(&self) -> Duration {
        Duration::from_secs(self.max_session_duration as u64 * 60)
    }
}

/// Half of the `1000 / speed` ms cycle. Non-positive speeds fall back to the
/// slowest supported rate instead of producing a zero-length period.
pub fn half_cycle_for(speed: f64) -> Duration {
    let speed = if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        *SPEED_HZ.start()
    };
    Duration::from_secs_f64(0.5 / speed)
}

pub trait SettingsStore {
    fn load(&self) -> BlsSettings;
    fn save(&self, settings: &BlsSettings) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> BlsSettings {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<BlsSettings>(&bytes) {
                Ok(settings) => return settings.clamped(),
                Err(e) => warn!("ignoring unreadable settings at {:?}: {e}", self.path),
            }
        }
        BlsSettings::default()
    }

    fn save(&self, settings: &BlsSettings) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
