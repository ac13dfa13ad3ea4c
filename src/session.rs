//! Panel state machine.
//!
//! A [`Session`] is one source language plus an ordered list of target
//! [`Panel`]s. Source and panel languages are always pairwise distinct.
//!
//! The session moves through three phases:
//!
//! - `Idle`: nothing outstanding
//! - `Translating`: one fan-out of per-panel translation requests is in
//!   flight; results land all at once when every request has settled
//! - `Restoring`: a history entry was just restored and automatic
//!   translation is suppressed until the window closes
//!
//! Every translation cycle and every restore takes a new generation
//! number. Results tagged with an older generation are discarded, so a
//! slow cycle can never overwrite newer state.
//!
//! The session does no I/O itself except through the [`HistoryStore`]
//! handed to the save operations; timers live in `controller`.

use crate::history::{create_entry, HistoryEntry, HistoryStore, HistoryTargetPanel, SavedPanelConfig};
use crate::languages::{language_code_or_fallback, LanguageRegistry};
use crate::translation::{TranslationError, Translator};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Placeholder shown in a panel whose translation failed
pub const ERROR_TEXT: &str = "Error";

pub const DEFAULT_SOURCE_LANGUAGE: &str = "English";
pub const DEFAULT_TARGET_LANGUAGES: [&str; 4] = ["Spanish", "French", "Italian", "Portuguese"];

/// One target-language translation slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub language: String,
    pub translated_text: String,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub language_code: String,
}

impl Panel {
    /// Empty panel; code and voice come from the catalog when known.
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            translated_text: String::new(),
            loading: false,
            voice: LanguageRegistry::get()
                .lookup(language)
                .map(|spec| spec.voice.to_string()),
            language_code: language_code_or_fallback(language),
        }
    }
}

impl From<&Panel> for HistoryTargetPanel {
    fn from(panel: &Panel) -> Self {
        Self {
            language: panel.language.clone(),
            translated_text: panel.translated_text.clone(),
            voice: panel.voice.clone(),
            language_code: panel.language_code.clone(),
        }
    }
}

impl From<&Panel> for SavedPanelConfig {
    fn from(panel: &Panel) -> Self {
        Self {
            language: panel.language.clone(),
            translated_text: panel.translated_text.clone(),
            loading: false,
            voice: panel.voice.clone(),
            language_code: panel.language_code.clone(),
        }
    }
}

impl From<&HistoryTargetPanel> for Panel {
    fn from(panel: &HistoryTargetPanel) -> Self {
        Self {
            language: panel.language.clone(),
            translated_text: panel.translated_text.clone(),
            loading: false,
            voice: panel.voice.clone(),
            language_code: panel.language_code.clone(),
        }
    }
}

impl From<&SavedPanelConfig> for Panel {
    fn from(panel: &SavedPanelConfig) -> Self {
        Self {
            language: panel.language.clone(),
            translated_text: panel.translated_text.clone(),
            loading: false,
            voice: panel.voice.clone(),
            language_code: panel.language_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Translating { generation: u64 },
    Restoring { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("panel language '{0}' would appear twice")]
    DuplicatePanel(String),

    #[error("panel language '{0}' equals the source language")]
    PanelMatchesSource(String),

    #[error("a checkpoint needs source text")]
    EmptySourceText,
}

/// Everything observers need to render a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub source_language: String,
    pub source_text: String,
    pub panels: Vec<Panel>,
    pub dirty: bool,
    pub phase: Phase,
}

/// A fan-out of one translation request per panel.
#[derive(Debug, Clone)]
pub struct TranslationCycle {
    pub generation: u64,
    pub text: String,
    pub source_language: String,
    pub targets: Vec<String>,
}

/// Settled results of a [`TranslationCycle`], one per target in order.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub generation: u64,
    pub results: Vec<(String, Result<String, TranslationError>)>,
}

impl TranslationCycle {
    /// Issue every request together and wait for all of them to settle.
    /// A failed request only affects its own panel.
    pub async fn run(self, translator: Arc<dyn Translator>) -> CycleOutcome {
        let requests = self.targets.iter().map(|target| {
            let translator = translator.clone();
            let text = self.text.as_str();
            let source = self.source_language.as_str();
            async move {
                let result = translator.translate(text, source, target).await;
                (target.clone(), result)
            }
        });

        CycleOutcome {
            generation: self.generation,
            results: join_all(requests).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    source_language: String,
    source_text: String,
    panels: Vec<Panel>,
    dirty: bool,
    phase: Phase,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Session {
    /// Build a session from a source language and panel languages.
    /// Languages equal to the source, and repeats, are skipped.
    pub fn new(source_language: &str, panel_languages: &[&str]) -> Self {
        let mut session = Self::empty(source_language);
        for language in panel_languages {
            session.push_panel_if_valid(Panel::new(language));
        }
        session
    }

    /// English source with Spanish, French, Italian and Portuguese panels
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SOURCE_LANGUAGE, &DEFAULT_TARGET_LANGUAGES)
    }

    /// Session shaped by a saved configuration, or the defaults when none
    /// was saved.
    pub fn from_saved_config(config: &[SavedPanelConfig]) -> Self {
        if config.is_empty() {
            return Self::with_defaults();
        }

        let mut session = Self::empty(DEFAULT_SOURCE_LANGUAGE);
        for saved in config {
            session.push_panel_if_valid(Panel::from(saved));
        }
        session
    }

    fn empty(source_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            source_text: String::new(),
            panels: Vec::new(),
            dirty: false,
            phase: Phase::Idle,
            generation: 0,
        }
    }

    fn push_panel_if_valid(&mut self, panel: Panel) -> bool {
        if panel.language == self.source_language || self.has_panel(&panel.language) {
            warn!("Skipping conflicting panel language '{}'", panel.language);
            return false;
        }
        self.panels.push(panel);
        true
    }

    // ==================== Accessors ====================

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, language: &str) -> Option<&Panel> {
        self.panels.iter().find(|p| p.language == language)
    }

    pub fn has_panel(&self, language: &str) -> bool {
        self.panel(language).is_some()
    }

    /// Panel set changed since the configuration was last saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_language: self.source_language.clone(),
            source_text: self.source_text.clone(),
            panels: self.panels.clone(),
            dirty: self.dirty,
            phase: self.phase,
        }
    }

    /// Source and panel languages are pairwise distinct.
    pub fn check_invariants(&self) -> Result<(), SessionError> {
        let mut seen = HashSet::new();
        for panel in &self.panels {
            if panel.language == self.source_language {
                return Err(SessionError::PanelMatchesSource(panel.language.clone()));
            }
            if !seen.insert(panel.language.as_str()) {
                return Err(SessionError::DuplicatePanel(panel.language.clone()));
            }
        }
        Ok(())
    }

    // ==================== Transitions ====================

    pub fn set_source_text(&mut self, text: &str) {
        self.source_text = text.to_string();
    }

    /// Switch the source language.
    ///
    /// Picking a language already used by a panel swaps: that panel takes
    /// the previous source language and loses its text. A swap that would
    /// duplicate a panel language is refused and nothing changes.
    ///
    /// Any translation in flight is abandoned, since its results are for
    /// the old direction.
    pub fn set_source_language(&mut self, language: &str) -> Result<(), SessionError> {
        if language == self.source_language {
            return Ok(());
        }

        let previous = self.source_language.clone();
        let swap_index = self.panels.iter().position(|p| p.language == language);

        if let Some(index) = swap_index {
            if self.has_panel(&previous) {
                return Err(SessionError::DuplicatePanel(previous));
            }
            self.panels[index] = Panel::new(&previous);
            self.dirty = true;
            debug!("Swapped panel {} -> {}", language, previous);
        }

        self.source_language = language.to_string();
        self.abandon_translation();
        debug_assert!(self.check_invariants().is_ok());
        Ok(())
    }

    /// Append an empty panel. Returns false (and changes nothing) when the
    /// language is the source or already has a panel.
    pub fn add_panel(&mut self, language: &str) -> bool {
        if !self.push_panel_if_valid(Panel::new(language)) {
            return false;
        }
        self.dirty = true;
        true
    }

    /// Remove a panel. Returns false when there was none.
    ///
    /// An in-flight cycle keeps running; its result for the removed
    /// language is dropped when it lands.
    pub fn remove_panel(&mut self, language: &str) -> bool {
        let before = self.panels.len();
        self.panels.retain(|p| p.language != language);
        let removed = self.panels.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Start a translation cycle for `text`.
    ///
    /// Returns `None` while restoring, for empty text, or when there are
    /// no panels. Otherwise every panel is marked loading and any older
    /// cycle is superseded.
    pub fn begin_translation(&mut self, text: &str) -> Option<TranslationCycle> {
        if let Phase::Restoring { .. } = self.phase {
            debug!("Translation suppressed while restoring");
            return None;
        }
        if text.is_empty() || self.panels.is_empty() {
            return None;
        }

        self.generation += 1;
        self.phase = Phase::Translating {
            generation: self.generation,
        };
        for panel in &mut self.panels {
            panel.loading = true;
        }

        Some(TranslationCycle {
            generation: self.generation,
            text: text.to_string(),
            source_language: self.source_language.clone(),
            targets: self.panels.iter().map(|p| p.language.clone()).collect(),
        })
    }

    /// Land a settled cycle. Stale outcomes are discarded and false is
    /// returned. Otherwise all panels update in one step.
    pub fn apply_translation(&mut self, outcome: CycleOutcome) -> bool {
        if self.phase
            != (Phase::Translating {
                generation: outcome.generation,
            })
        {
            debug!(
                "Discarding stale translation results (generation {}, current {})",
                outcome.generation, self.generation
            );
            return false;
        }

        let mut updated = self.panels.clone();
        for panel in &mut updated {
            let result = outcome
                .results
                .iter()
                .find(|(language, _)| *language == panel.language);
            if let Some((_, result)) = result {
                panel.translated_text = match result {
                    Ok(text) => text.clone(),
                    Err(e) => {
                        warn!("Translation to {} failed: {}", panel.language, e);
                        ERROR_TEXT.to_string()
                    }
                };
            }
            panel.loading = false;
        }

        self.panels = updated;
        self.phase = Phase::Idle;
        true
    }

    fn abandon_translation(&mut self) {
        if let Phase::Translating { .. } = self.phase {
            self.generation += 1;
            self.phase = Phase::Idle;
            for panel in &mut self.panels {
                panel.loading = false;
            }
        }
    }

    /// Persist the panel shape (loading always false) and clear dirty.
    pub fn save_configuration(&mut self, history: &HistoryStore) {
        let config: Vec<SavedPanelConfig> = self.panels.iter().map(SavedPanelConfig::from).collect();
        history.save_config(&config);
        self.dirty = false;
        info!("Saved panel configuration ({} panels)", config.len());
    }

    /// Store the full session as a checkpoint entry.
    pub fn save_checkpoint(
        &mut self,
        history: &HistoryStore,
        label: Option<String>,
    ) -> Result<HistoryEntry, SessionError> {
        if self.source_text.is_empty() {
            return Err(SessionError::EmptySourceText);
        }

        let entry = create_entry(
            &self.source_text,
            &self.source_language,
            self.panels.iter().map(HistoryTargetPanel::from).collect(),
            label,
            true,
        );
        history.save_entry(entry.clone());
        self.dirty = false;
        info!("Saved checkpoint {}", entry.id);
        Ok(entry)
    }

    /// Replace text, source language and panels with a history entry's.
    ///
    /// Opens a restoring phase that suppresses automatic translation and
    /// returns its generation, which [`Session::finish_restore`] needs.
    /// Panels that would break the language invariant are skipped.
    pub fn restore(&mut self, entry: &HistoryEntry) -> u64 {
        self.source_text = entry.source_text.clone();
        self.source_language = entry.source_language.clone();
        self.panels.clear();
        for panel in &entry.target_panels {
            self.push_panel_if_valid(Panel::from(panel));
        }
        self.dirty = false;

        self.generation += 1;
        self.phase = Phase::Restoring {
            generation: self.generation,
        };
        info!("Restored history entry {}", entry.id);
        self.generation
    }

    /// Close the restoring phase opened by `restore`. A later restore or
    /// anything else that moved the phase on makes this a no-op.
    pub fn finish_restore(&mut self, generation: u64) -> bool {
        if self.phase == (Phase::Restoring { generation }) {
            self.phase = Phase::Idle;
            true
        } else {
            false
        }
    }
}
