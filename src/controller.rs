//! Async driver for a [`Session`].
//!
//! The controller owns the session and is its only writer. Commands
//! arrive over an mpsc channel; every change is published as a
//! [`SessionSnapshot`] on a watch channel. It also owns the timers:
//! the keystroke debounce and the restore suppression window.

use crate::debounce::{Debouncer, DEFAULT_QUIET_PERIOD};
use crate::history::{HistoryEntry, HistoryStore};
use crate::session::{CycleOutcome, Session, SessionError, SessionSnapshot};
use crate::translation::Translator;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// How long automatic translation stays off after a restore
pub const RESTORE_SUPPRESSION: Duration = Duration::from_millis(3000);

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub debounce: Duration,
    pub restore_suppression: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_QUIET_PERIOD,
            restore_suppression: RESTORE_SUPPRESSION,
        }
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    SetText(String),
    SetSourceLanguage(String),
    AddPanel(String),
    RemovePanel(String),
    SaveConfiguration,
    SaveCheckpoint {
        label: Option<String>,
        reply: oneshot::Sender<Result<HistoryEntry, SessionError>>,
    },
    Restore(HistoryEntry),
}

pub struct SessionController {
    session: Session,
    translator: Arc<dyn Translator>,
    history: HistoryStore,
    settings: ControllerSettings,
    debouncer: Debouncer<String>,
    /// Generation and end of the current restore window
    restore_window: Option<(u64, Instant)>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    pub fn new(session: Session, translator: Arc<dyn Translator>, history: HistoryStore) -> Self {
        let (snapshots, _) = watch::channel(session.snapshot());
        let settings = ControllerSettings::default();
        Self {
            session,
            translator,
            history,
            settings,
            debouncer: Debouncer::new(settings.debounce),
            restore_window: None,
            snapshots,
        }
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self.debouncer = Debouncer::new(settings.debounce);
        self
    }

    /// Run on a new task and return a handle for sending commands.
    pub fn spawn(self) -> SessionHandle {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let snapshots = self.snapshots.subscribe();
        let task = tokio::spawn(self.run(receiver));
        SessionHandle {
            commands,
            snapshots,
            task,
        }
    }

    /// Process commands until every sender is dropped, then hand the
    /// session back. Translations still in flight at that point are
    /// dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> Session {
        let mut in_flight: FuturesUnordered<BoxFuture<'static, CycleOutcome>> =
            FuturesUnordered::new();

        loop {
            let debounce_due = self.debouncer.deadline();
            let restore_due = self.restore_window.map(|(_, until)| until);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sleep_until_some(debounce_due) => {
                    if let Some(text) = self.debouncer.take_due(Instant::now()) {
                        if let Some(cycle) = self.session.begin_translation(&text) {
                            debug!(
                                "Translating into {} panels (generation {})",
                                cycle.targets.len(),
                                cycle.generation
                            );
                            in_flight.push(cycle.run(self.translator.clone()).boxed());
                        }
                    }
                }
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    self.session.apply_translation(outcome);
                }
                _ = sleep_until_some(restore_due) => {
                    if let Some((generation, _)) = self.restore_window.take() {
                        if self.session.finish_restore(generation) {
                            debug!("Restore window closed");
                        }
                    }
                }
            }

            self.publish();
        }

        info!("Session controller stopped");
        self.session
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetText(text) => {
                if text != self.session.source_text() {
                    self.session.set_source_text(&text);
                    self.debouncer.push(text, Instant::now());
                }
            }
            SessionCommand::SetSourceLanguage(language) => {
                if let Err(e) = self.session.set_source_language(&language) {
                    warn!("Could not switch source language to {}: {}", language, e);
                }
            }
            SessionCommand::AddPanel(language) => {
                if !self.session.add_panel(&language) {
                    debug!("Panel {} not added", language);
                }
            }
            SessionCommand::RemovePanel(language) => {
                self.session.remove_panel(&language);
            }
            SessionCommand::SaveConfiguration => {
                self.session.save_configuration(&self.history);
            }
            SessionCommand::SaveCheckpoint { label, reply } => {
                let result = self.session.save_checkpoint(&self.history, label);
                if reply.send(result).is_err() {
                    debug!("Checkpoint requester went away");
                }
            }
            SessionCommand::Restore(entry) => {
                let generation = self.session.restore(&entry);
                self.debouncer.cancel();
                self.restore_window =
                    Some((generation, Instant::now() + self.settings.restore_suppression));
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_if_modified(|current| {
            let next = self.session.snapshot();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Client side of a spawned [`SessionController`].
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<Session>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Session controller is not running"))
    }

    pub async fn set_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetText(text.into())).await
    }

    pub async fn set_source_language(&self, language: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetSourceLanguage(language.into())).await
    }

    pub async fn add_panel(&self, language: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::AddPanel(language.into())).await
    }

    pub async fn remove_panel(&self, language: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::RemovePanel(language.into())).await
    }

    pub async fn save_configuration(&self) -> Result<()> {
        self.send(SessionCommand::SaveConfiguration).await
    }

    pub async fn save_checkpoint(&self, label: Option<String>) -> Result<HistoryEntry> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::SaveCheckpoint { label, reply }).await?;
        let entry = response
            .await
            .context("Session controller dropped the checkpoint request")??;
        Ok(entry)
    }

    pub async fn restore(&self, entry: HistoryEntry) -> Result<()> {
        self.send(SessionCommand::Restore(entry)).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the controller and take the final session.
    pub async fn shutdown(self) -> Result<Session> {
        drop(self.commands);
        self.task.await.context("Session controller task failed")
    }
}
