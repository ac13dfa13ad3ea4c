//! Terminal client - a translation session driven from stdin
//!
//! Usage:
//!   cargo run --bin translator-cli
//!
//! Plain lines become the source text and are translated into every
//! panel after a short pause. Lines starting with `:` are commands
//! (`:help` lists them).
//!
//! Optional environment variables:
//! - TRANSLATOR_API_URL (defaults to http://localhost:8080)
//! - TRANSLATOR_TOKEN
//! - HISTORY_DIR (defaults to .translator)

use anyhow::{Context, Result};
use multi_translator::client::ApiClient;
use multi_translator::config::Config;
use multi_translator::controller::{SessionController, SessionHandle};
use multi_translator::history::HistoryStore;
use multi_translator::languages::{Language, LanguageRegistry};
use multi_translator::session::{Session, SessionSnapshot};
use multi_translator::speech::{AudioCache, CachedSpeech, SpeechSource};
use multi_translator::storage::FileStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
Commands:
  <text>               set the source text
  :source <language>   change the source language
  :add <language>      add a panel
  :remove <language>   remove a panel
  :save                save the panel configuration
  :checkpoint [label]  save the session to history
  :history             list history entries
  :restore <id>        restore a history entry
  :delete <id>         delete a history entry
  :clear               delete all history
  :speak <language>    synthesize a panel (or the source) to an MP3 file
  :quit                exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Text(String),
    Source(String),
    Add(String),
    Remove(String),
    Save,
    Checkpoint(Option<String>),
    History,
    Restore(String),
    Delete(String),
    Clear,
    Speak(String),
    Help,
    Quit,
    Invalid(String),
}

fn parse_command(line: &str) -> Command {
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Text(line.to_string());
    };

    let (name, arg) = match rest.split_once(' ') {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest.trim(), None),
    };

    match (name, arg) {
        ("source", Some(arg)) => Command::Source(arg.to_string()),
        ("add", Some(arg)) => Command::Add(arg.to_string()),
        ("remove", Some(arg)) => Command::Remove(arg.to_string()),
        ("save", None) => Command::Save,
        ("checkpoint", label) => Command::Checkpoint(label.map(str::to_string)),
        ("history", None) => Command::History,
        ("restore", Some(arg)) => Command::Restore(arg.to_string()),
        ("delete", Some(arg)) => Command::Delete(arg.to_string()),
        ("clear", None) => Command::Clear,
        ("speak", Some(arg)) => Command::Speak(arg.to_string()),
        ("help", _) => Command::Help,
        ("quit", _) | ("q", _) => Command::Quit,
        _ => Command::Invalid(line.to_string()),
    }
}

fn render(snapshot: &SessionSnapshot) -> String {
    let mut out = format!(
        "[{}] {}{}\n",
        snapshot.source_language,
        snapshot.source_text,
        if snapshot.dirty { "  (unsaved panels)" } else { "" }
    );
    for panel in &snapshot.panels {
        let text = if panel.loading { "..." } else { panel.translated_text.as_str() };
        out.push_str(&format!("  {:<11} {}\n", panel.language, text));
    }
    out
}

fn known_language(name: &str) -> bool {
    if LanguageRegistry::get().lookup(name).is_some() {
        return true;
    }
    let names: Vec<&str> = LanguageRegistry::get().all().iter().map(|l| l.name).collect();
    println!("Unknown language '{}'. Available: {}", name, names.join(", "));
    false
}

struct Cli {
    handle: SessionHandle,
    history: HistoryStore,
    speech: CachedSpeech<ApiClient>,
    audio_dir: PathBuf,
}

impl Cli {
    /// Returns false when the user asked to quit.
    async fn execute(&self, command: Command) -> Result<bool> {
        match command {
            Command::Text(text) => self.handle.set_text(text).await?,
            Command::Source(language) => {
                if known_language(&language) {
                    self.handle.set_source_language(language).await?;
                }
            }
            Command::Add(language) => {
                if known_language(&language) {
                    self.handle.add_panel(language).await?;
                }
            }
            Command::Remove(language) => self.handle.remove_panel(language).await?,
            Command::Save => {
                self.handle.save_configuration().await?;
                println!("Panel configuration saved");
            }
            Command::Checkpoint(label) => match self.handle.save_checkpoint(label).await {
                Ok(entry) => println!("Checkpoint {} saved", entry.id),
                Err(e) => println!("Checkpoint not saved: {}", e),
            },
            Command::History => {
                let entries = self.history.list_entries();
                if entries.is_empty() {
                    println!("History is empty");
                }
                for entry in entries {
                    println!(
                        "{}  {}  {}{}  [{}] {}",
                        entry.id,
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        if entry.is_checkpoint { "*" } else { " " },
                        entry.label.as_deref().unwrap_or(""),
                        entry.source_language,
                        entry.source_text.chars().take(40).collect::<String>()
                    );
                }
            }
            Command::Restore(id) => match self.history.get_entry(&id) {
                Some(entry) => self.handle.restore(entry).await?,
                None => println!("No history entry {}", id),
            },
            Command::Delete(id) => {
                self.history.delete_entry(&id);
                println!("Deleted {}", id);
            }
            Command::Clear => {
                self.history.clear_all();
                println!("History cleared");
            }
            Command::Speak(language) => self.speak(&language).await?,
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
            Command::Invalid(line) => println!("Unknown command '{}'. Try :help", line),
        }
        Ok(true)
    }

    async fn speak(&self, language: &str) -> Result<()> {
        let snapshot = self.handle.snapshot();
        let text = if language == snapshot.source_language {
            snapshot.source_text.clone()
        } else {
            match snapshot.panels.iter().find(|p| p.language == language) {
                Some(panel) => panel.translated_text.clone(),
                None => {
                    println!("No panel for {}", language);
                    return Ok(());
                }
            }
        };

        match self.speech.synthesize(&text, language).await {
            Ok(audio) => {
                let code = Language::from_name(language)
                    .map(|l| l.code().to_string())
                    .unwrap_or_else(|_| "audio".to_string());
                let path = self.audio_dir.join(format!("speech-{}.mp3", code));
                tokio::fs::create_dir_all(&self.audio_dir)
                    .await
                    .with_context(|| format!("Failed to create {}", self.audio_dir.display()))?;
                tokio::fs::write(&path, &audio)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote {} bytes to {}", audio.len(), path.display());
            }
            // Speech failures never interrupt the session
            Err(e) => warn!("Speech failed for {}: {}", language, e),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multi_translator=warn".parse()?)
                .add_directive("translator_cli=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    let store = FileStore::new(&config.history_dir);
    let history = HistoryStore::new(Arc::new(store));
    let session = Session::from_saved_config(&history.load_config());

    let client = ApiClient::new(&config.api_url, config.api_token.clone())?;
    info!("Using translator API at {}", config.api_url);

    let handle =
        SessionController::new(session, Arc::new(client.clone()), history.clone()).spawn();

    // Print every settled state
    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.panels.iter().all(|p| !p.loading) {
                print!("{}", render(&snapshot));
            }
        }
    });

    print!("{}", render(&handle.snapshot()));
    println!("Type text to translate, :help for commands");

    let cli = Cli {
        handle,
        history,
        speech: CachedSpeech::new(client, Arc::new(AudioCache::new())),
        audio_dir: PathBuf::from(&config.history_dir),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match cli.execute(parse_command(&line)).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!("{:#}", e);
                break;
            }
        }
    }

    let session = cli.handle.shutdown().await?;
    printer.abort();
    if session.is_dirty() {
        println!("Panel changes were not saved (use :save next time)");
    }
    Ok(())
}
