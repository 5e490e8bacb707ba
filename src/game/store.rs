//! Confession store - the append-only log of game rounds.
//!
//! File format:
//! ```json
//! { "questions": [ { "question": "...", "answer": "...", "isComplete": false,
//!                    "incorrectGuesses": 0, "timestamp": "2024-01-01T00:00:00.000Z" } ] }
//! ```
//!
//! Every operation reads the whole document, mutates it and writes it back.
//! Cycles are serialised by an in-process mutex plus an on-disk lock file,
//! and writes replace the file atomically.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::lock::with_lock;

/// One round of the game.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfessionRecord {
    pub question: String,
    pub answer: String,
    pub is_complete: bool,
    pub incorrect_guesses: u32,
    pub timestamp: String,
}

impl ConfessionRecord {
    pub fn new(question: &str, answer: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            is_complete: false,
            incorrect_guesses: 0,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct GameDocument {
    #[serde(default)]
    questions: Vec<ConfessionRecord>,
}

/// Result of a `/guess`.
#[derive(Clone, Debug, PartialEq)]
pub enum GuessOutcome {
    Correct { confession: String, answer: String },
    Wrong { confession: String, remaining: u32 },
    /// The guess limit was reached and the round closed unsolved.
    GameOver { confession: String },
    NoActiveGame,
}

impl GuessOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, GuessOutcome::Correct { .. })
    }
}

/// Lowercase, trimmed, one leading `@` removed.
pub fn normalize_handle(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('@').unwrap_or(s).trim().to_lowercase()
}

pub struct GameStore {
    path: PathBuf,
    max_incorrect_guesses: u32,
    guard: Mutex<()>,
}

impl GameStore {
    /// Handle on an existing document. Nothing is created on disk.
    pub fn existing(path: impl Into<PathBuf>, max_incorrect_guesses: u32) -> Self {
        Self {
            path: path.into(),
            max_incorrect_guesses,
            guard: Mutex::new(()),
        }
    }

    /// Open the store, creating an empty document if none exists.
    pub fn open(path: impl Into<PathBuf>, max_incorrect_guesses: u32) -> Result<Self> {
        let store = Self::existing(path, max_incorrect_guesses);

        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::persistence)?;
            }
        }

        if !store.path.exists() {
            store.save(&GameDocument::default())?;
            tracing::info!("Created game store at {}", store.path.display());
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<GameDocument> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, doc: &GameDocument) -> Result<()> {
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        let content = serde_json::to_string_pretty(doc).map_err(Error::persistence)?;
        std::fs::write(&tmp, content).map_err(Error::persistence)?;
        std::fs::rename(&tmp, &self.path).map_err(Error::persistence)?;
        Ok(())
    }

    /// Locked read-modify-write. The closure returns its value plus whether
    /// the document changed and must be written back.
    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut GameDocument) -> Result<(T, bool)>,
    {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::Persistence("game store mutex poisoned".to_string()))?;

        let result = with_lock(&self.path, || {
            let mut doc = self.load()?;
            let (value, dirty) = f(&mut doc)?;
            if dirty {
                self.save(&doc)?;
            }
            Ok(value)
        });

        if let Err(e) = &result {
            tracing::warn!("Game store operation failed: {}", e);
        }
        result
    }

    /// All rounds, oldest first.
    pub fn rounds(&self) -> Result<Vec<ConfessionRecord>> {
        self.transact(|doc| Ok((doc.questions.clone(), false)))
    }

    pub fn has_open_round(&self) -> Result<bool> {
        self.transact(|doc| Ok((doc.questions.iter().any(|q| !q.is_complete), false)))
    }

    /// The oldest unfinished round.
    pub fn open_round(&self) -> Result<Option<ConfessionRecord>> {
        self.transact(|doc| {
            let open = doc.questions.iter().find(|q| !q.is_complete).cloned();
            Ok((open, false))
        })
    }

    /// Start a new round. Refused while another round is open.
    pub fn append_confession(&self, question: &str, answer: &str) -> Result<()> {
        self.transact(|doc| {
            if doc.questions.iter().any(|q| !q.is_complete) {
                return Err(Error::Game("a round is already open".to_string()));
            }
            doc.questions.push(ConfessionRecord::new(question, answer));
            Ok(((), true))
        })?;
        tracing::info!("Saved new confession round");
        Ok(())
    }

    /// Resolve a guess against the oldest open round.
    pub fn record_guess(&self, guess: &str) -> Result<GuessOutcome> {
        let max = self.max_incorrect_guesses;
        let guess = normalize_handle(guess);

        self.transact(|doc| {
            let Some(round) = doc.questions.iter_mut().find(|q| !q.is_complete) else {
                return Ok((GuessOutcome::NoActiveGame, false));
            };

            if normalize_handle(&round.answer) == guess {
                round.is_complete = true;
                return Ok((
                    GuessOutcome::Correct {
                        confession: round.question.clone(),
                        answer: round.answer.clone(),
                    },
                    true,
                ));
            }

            round.incorrect_guesses += 1;
            if round.incorrect_guesses >= max {
                round.is_complete = true;
                return Ok((
                    GuessOutcome::GameOver {
                        confession: round.question.clone(),
                    },
                    true,
                ));
            }

            Ok((
                GuessOutcome::Wrong {
                    confession: round.question.clone(),
                    remaining: max - round.incorrect_guesses,
                },
                true,
            ))
        })
    }
}
