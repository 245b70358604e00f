use crate::error::{SettingsError, StoreError};
use crate::history::{HistoryStore, SessionHistory, SqliteHistoryStore};
use crate::persist::Persister;
use crate::session::SessionController;
use crate::settings::{BlsSettings, FileSettingsStore, SettingsStore};
use crate::stats::{calculate_stats, SessionStats};
use crate::stimulus::Sinks;
use crate::sud::{SessionSummary, SudValue};
use std::path::Path;
use tracing::{info, warn};

/// Settings held in memory for the process lifetime plus the persistence
/// worker behind them. Settings are read from disk once, on construction.
pub struct App {
    settings: BlsSettings,
    persister: Persister,
    history_persistent: bool,
}

impl App {
    pub fn new<S, H>(settings_store: S, history_store: H) -> Self
    where
        S: SettingsStore + Send + 'static,
        H: HistoryStore + Send + 'static,
    {
        let settings = settings_store.load();
        Self {
            settings,
            persister: Persister::spawn(settings_store, history_store),
            history_persistent: true,
        }
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Self::open_at(FileSettingsStore::new(), &SqliteHistoryStore::default_path())
    }

    /// Opens the history database at `history_path`. When it cannot be
    /// opened, history is kept in memory for this run only.
    pub fn open_at(
        settings_store: FileSettingsStore,
        history_path: &Path,
    ) -> Result<Self, StoreError> {
        match SqliteHistoryStore::open(history_path) {
            Ok(store) => Ok(Self::new(settings_store, store)),
            Err(e) => {
                warn!("history at {history_path:?} unavailable, not saving sessions: {e}");
                let mut app = Self::new(settings_store, SqliteHistoryStore::open_in_memory()?);
                app.history_persistent = false;
                Ok(app)
            }
        }
    }

    /// False when sessions from this run will not outlive the process
    pub fn history_persistent(&self) -> bool {
        self.history_persistent
    }

    pub fn settings(&self) -> &BlsSettings {
        &self.settings
    }

    /// Replaces the settings wholesale. Out-of-range values are refused and
    /// leave the current settings untouched.
    pub fn update_settings(&mut self, settings: BlsSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.persister.save_settings(&settings);
        self.settings = settings;
        Ok(())
    }

    pub fn set_field(&mut self, field: &str, value: &str) -> Result<&BlsSettings, SettingsError> {
        let updated = self.settings.with_field(field, value)?;
        self.update_settings(updated)?;
        Ok(&self.settings)
    }

    pub fn reset_settings(&mut self) {
        self.settings = BlsSettings::default();
        self.persister.save_settings(&self.settings);
    }

    /// Session using a snapshot of the current settings
    pub fn new_session(
        &self,
        sinks: Sinks,
        pre_sud: SudValue,
        goal: Option<String>,
    ) -> SessionController {
        SessionController::new(&self.settings, sinks, pre_sud, goal)
    }

    /// Queues a finished session for the history store
    pub fn complete_session(&self, summary: SessionSummary, settings: &BlsSettings) {
        info!(
            "session complete: SUD {} -> {} over {} sets",
            summary.pre_sud.value, summary.post_sud.value, summary.total_sets
        );
        self.persister.append_history(summary, settings.clone());
    }

    pub fn history(&self) -> Result<Vec<SessionHistory>, StoreError> {
        self.persister.load_history()
    }

    pub fn stats(&self) -> Result<SessionStats, StoreError> {
        Ok(calculate_stats(&self.history()?))
    }

    pub fn clear_history(&self) -> Result<(), StoreError> {
        self.persister.clear_history()
    }

    /// Waits for queued writes to land
    pub fn flush(&self) -> Result<(), StoreError> {
        self.persister.flush()
    }
}
