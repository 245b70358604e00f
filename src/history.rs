use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::settings::BlsSettings;
use crate::sud::SessionSummary;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Most sessions kept; older ones are evicted on append
pub const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub id: String,
    pub summary: SessionSummary,
    /// Settings the session ran with
    pub settings: BlsSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl SessionHistory {
    pub fn new(summary: SessionSummary, settings: BlsSettings) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            goal: summary.goal.clone(),
            summary,
            settings,
        }
    }
}

pub trait HistoryStore {
    /// Records a session as the newest entry, evicting beyond [`MAX_HISTORY`]
    fn append(
        &self,
        summary: SessionSummary,
        settings: BlsSettings,
    ) -> Result<SessionHistory, StoreError>;
    /// Newest first
    fn load_all(&self) -> Result<Vec<SessionHistory>, StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Session log in SQLite, one row per session with the records kept as JSON
#[derive(Debug)]
pub struct SqliteHistoryStore {
    conn: Connection,
}

impl SqliteHistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Where the history lives under the user's state directory
    pub fn default_path() -> PathBuf {
        AppDirs::history_db_path().unwrap_or_else(|| PathBuf::from("bilat_history.db"))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS session_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                completed_at INTEGER NOT NULL,
                goal TEXT,
                summary TEXT NOT NULL,
                settings TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM session_history", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn insert(&self, entry: &SessionHistory) -> Result<(), StoreError> {
        let summary = serde_json::to_string(&entry.summary)?;
        let settings = serde_json::to_string(&entry.settings)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO session_history (id, completed_at, goal, summary, settings)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.id,
                entry.summary.completed_at.timestamp_millis(),
                entry.goal,
                summary,
                settings,
            ],
        )?;
        let evicted = tx.execute(
            r#"
            DELETE FROM session_history WHERE seq NOT IN (
                SELECT seq FROM session_history ORDER BY seq DESC LIMIT ?1
            )
            "#,
            params![MAX_HISTORY as i64],
        )?;
        tx.commit()?;
        if evicted > 0 {
            debug!("evicted {evicted} old session(s) from history");
        }
        Ok(())
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(
        &self,
        summary: SessionSummary,
        settings: BlsSettings,
    ) -> Result<SessionHistory, StoreError> {
        let entry = SessionHistory::new(summary, settings);
        self.insert(&entry)?;
        Ok(entry)
    }

    fn load_all(&self) -> Result<Vec<SessionHistory>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, goal, summary, settings FROM session_history ORDER BY seq DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (id, goal, summary, settings) = row?;
            let parsed = serde_json::from_str::<SessionSummary>(&summary).and_then(|summary| {
                serde_json::from_str::<BlsSettings>(&settings).map(|settings| (summary, settings))
            });
            match parsed {
                Ok((summary, settings)) => history.push(SessionHistory {
                    id,
                    summary,
                    settings,
                    goal,
                }),
                Err(e) => warn!("skipping unreadable history entry {id}: {e}"),
            }
        }
        Ok(history)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM session_history", [])?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    completed_at: String,
    pre_sud: u8,
    post_sud: u8,
    improvement: i32,
    mid_suds: String,
    total_sets: u32,
    total_duration_secs: u64,
    goal: &'a str,
}

/// Writes one CSV row per session, in the order given
pub fn export_csv<W: Write>(history: &[SessionHistory], writer: W) -> Result<(), StoreError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for entry in history {
        let s = &entry.summary;
        wtr.serialize(CsvRow {
            completed_at: s.completed_at.to_rfc3339(),
            pre_sud: s.pre_sud.value.get(),
            post_sud: s.post_sud.value.get(),
            improvement: s.improvement(),
            mid_suds: s
                .mid_suds
                .iter()
                .map(|r| r.value.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            total_sets: s.total_sets,
            total_duration_secs: s.total_duration,
            goal: entry.goal.as_deref().unwrap_or(""),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
