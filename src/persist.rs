use crate::error::StoreError;
use crate::history::{HistoryStore, SessionHistory};
use crate::settings::{BlsSettings, SettingsStore};
use crate::sud::SessionSummary;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

enum Command {
    SaveSettings(BlsSettings),
    AppendHistory(Box<SessionSummary>, BlsSettings),
    LoadHistory(Sender<Result<Vec<SessionHistory>, StoreError>>),
    ClearHistory(Sender<Result<(), StoreError>>),
    Flush(Sender<()>),
}

/// Owns the stores on a background thread so writes never hold up the
/// session loop. Saves are fire-and-forget: failures are logged and the
/// data for that write is dropped.
pub struct Persister {
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn spawn<S, H>(settings_store: S, history_store: H) -> Self
    where
        S: SettingsStore + Send + 'static,
        H: HistoryStore + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Command>();
        let worker = thread::spawn(move || {
            for cmd in rx {
                match cmd {
                    Command::SaveSettings(settings) => {
                        if let Err(e) = settings_store.save(&settings) {
                            warn!("failed to save settings: {e}");
                        }
                    }
                    Command::AppendHistory(summary, settings) => {
                        match history_store.append(*summary, settings) {
                            Ok(entry) => debug!("saved session {}", entry.id),
                            Err(e) => warn!("failed to save session history: {e}"),
                        }
                    }
                    Command::LoadHistory(reply) => {
                        let _ = reply.send(history_store.load_all());
                    }
                    Command::ClearHistory(reply) => {
                        let _ = reply.send(history_store.clear());
                    }
                    Command::Flush(reply) => {
                        let _ = reply.send(());
                    }
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    fn send(&self, cmd: Command) -> Result<(), StoreError> {
        self.tx
            .as_ref()
            .ok_or(StoreError::WorkerGone)?
            .send(cmd)
            .map_err(|_| StoreError::WorkerGone)
    }

    pub fn save_settings(&self, settings: &BlsSettings) {
        if let Err(e) = self.send(Command::SaveSettings(settings.clone())) {
            warn!("settings not saved: {e}");
        }
    }

    pub fn append_history(&self, summary: SessionSummary, settings: BlsSettings) {
        if let Err(e) = self.send(Command::AppendHistory(Box::new(summary), settings)) {
            warn!("session not saved: {e}");
        }
    }

    pub fn load_history(&self) -> Result<Vec<SessionHistory>, StoreError> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::LoadHistory(reply))?;
        rx.recv().map_err(|_| StoreError::WorkerGone)?
    }

    pub fn clear_history(&self) -> Result<(), StoreError> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::ClearHistory(reply))?;
        rx.recv().map_err(|_| StoreError::WorkerGone)?
    }

    /// Blocks until every command queued so far has been handled
    pub fn flush(&self) -> Result<(), StoreError> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Flush(reply))?;
        rx.recv().map_err(|_| StoreError::WorkerGone)
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        // closing the channel ends the worker loop after queued writes
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
