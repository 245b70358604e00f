use thiserror::Error;

/// A settings value outside the domain the session engine accepts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("dot colour {0:?} is not a #RRGGBB hex value")]
    InvalidColor(String),
    #[error("unknown setting {0:?}")]
    UnknownField(String),
    #[error("could not parse {value:?} for {field}")]
    Unparseable { field: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SudError {
    #[error("SUD rating {0} is outside 0..=10")]
    OutOfRange(i64),
}

/// Failure reported by a stimulus backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("{0} backend unavailable")]
    Unavailable(&'static str),
    #[error("playback failed: {0}")]
    Playback(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("persistence worker is gone")]
    WorkerGone,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session has not been started")]
    NotStarted,
    #[error("session has already been started")]
    AlreadyStarted,
    #[error("session has already stopped")]
    AlreadyStopped,
    #[error("session is still running")]
    StillRunning,
    #[error("session summary was already taken")]
    AlreadyFinished,
    #[error("no check-in is open")]
    NoPromptOpen,
    #[error(transparent)]
    Sud(#[from] SudError),
}
