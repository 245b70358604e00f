use crate::history::SessionHistory;
use crate::sud::SudValue;
use std::collections::BTreeMap;

/// Aggregates over the stored session history. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub total_sessions: usize,
    /// Mean of pre minus post; negative when distress rose on average
    pub average_sud_improvement: f64,
    /// Percentage of sessions whose post rating was below the pre rating
    pub success_rate: f64,
    /// Seconds
    pub total_duration: u64,
    pub average_session_duration: f64,
    pub most_recent_session: Option<SessionHistory>,
    /// How often each level 0..=10 appears among pre and post ratings
    pub sud_distribution: BTreeMap<u8, usize>,
}

fn empty_distribution() -> BTreeMap<u8, usize> {
    (0..=SudValue::MAX).map(|level| (level, 0)).collect()
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            total_sessions: 0,
            average_sud_improvement: 0.0,
            success_rate: 0.0,
            total_duration: 0,
            average_session_duration: 0.0,
            most_recent_session: None,
            sud_distribution: empty_distribution(),
        }
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

/// `history` must be newest first, as the history store returns it
pub fn calculate_stats(history: &[SessionHistory]) -> SessionStats {
    if history.is_empty() {
        return SessionStats::default();
    }

    let total_sessions = history.len();
    let improvements: Vec<f64> = history
        .iter()
        .map(|h| h.summary.improvement() as f64)
        .collect();
    let successful = history.iter().filter(|h| h.summary.improved()).count();
    let total_duration: u64 = history.iter().map(|h| h.summary.total_duration).sum();

    let sud_distribution = history
        .iter()
        .flat_map(|h| [h.summary.pre_sud.value.get(), h.summary.post_sud.value.get()])
        .fold(empty_distribution(), |mut dist, level| {
            *dist.entry(level).or_insert(0) += 1;
            dist
        });

    SessionStats {
        total_sessions,
        average_sud_improvement: mean(&improvements).unwrap_or(0.0),
        success_rate: successful as f64 / total_sessions as f64 * 100.0,
        total_duration,
        average_session_duration: total_duration as f64 / total_sessions as f64,
        most_recent_session: history.first().cloned(),
        sud_distribution,
    }
}

/// Improvement of the newest `n` sessions, oldest of them first
pub fn recent_improvements(history: &[SessionHistory], n: usize) -> Vec<i32> {
    let mut recent: Vec<i32> = history
        .iter()
        .take(n)
        .map(|h| h.summary.improvement())
        .collect();
    recent.reverse();
    recent
}
