//! Slash-command routing for the confession game.
//!
//! Commands are matched on the first word of a message, case-sensitively.
//! At most one command runs per message.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::game::{GameStore, GuessOutcome};
use crate::transport::{Conversation, GroupHandle, Transport};

use super::replies;

/// Parsed slash-command with its trimmed argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Guess(&'a str),
    Confess(&'a str),
    Shh(&'a str),
}

/// Recognise a command by its first word.
pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let text = text.trim_start();
    let (head, rest) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    };

    match head {
        "/guess" => Some(Command::Guess(rest)),
        "/confess" => Some(Command::Confess(rest)),
        "/shh" => Some(Command::Shh(rest)),
        _ => None,
    }
}

/// Split `<confession> @<name>` on the last `@`. Both halves must be non-empty.
pub fn split_confession(rest: &str) -> Option<(&str, &str)> {
    let at = rest.rfind('@')?;
    let confession = rest[..at].trim();
    let identity = rest[at + 1..].trim();
    if confession.is_empty() || identity.is_empty() {
        return None;
    }
    Some((confession, identity))
}

pub struct CommandRouter {
    transport: Arc<dyn Transport>,
    store: Arc<GameStore>,
    group: GroupHandle,
}

impl CommandRouter {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<GameStore>, group: GroupHandle) -> Self {
        Self {
            transport,
            store,
            group,
        }
    }

    /// Run the command in `text`, if any. Returns whether a command matched.
    ///
    /// Failures are logged and answered with an apology in direct messages;
    /// they never propagate and the group never sees the apology.
    pub async fn handle(&self, text: &str, origin: &Conversation) -> bool {
        let Some(command) = parse_command(text) else {
            return false;
        };

        tracing::debug!("Command {:?} in {}", command, origin.id);

        let result = match command {
            Command::Guess(guess) => self.guess(guess, origin).await,
            Command::Confess(rest) => self.confess(rest, origin).await,
            Command::Shh(text) => self.shh(text, origin).await,
        };

        if let Err(e) = result {
            tracing::error!("Command failed in {}: {}", origin.id, e);
            if origin.is_group() {
                return true;
            }
            if let Err(e) = self.reply(origin, replies::APOLOGY).await {
                tracing::warn!("Failed to send apology to {}: {}", origin.id, e);
            }
        }
        true
    }

    async fn reply(&self, origin: &Conversation, text: &str) -> Result<()> {
        self.transport.send(&origin.id, text).await?;
        Ok(())
    }

    async fn broadcast(&self, text: &str) -> Result<()> {
        self.transport.send(&self.group.id, text).await?;
        Ok(())
    }

    /// Run a store operation on the blocking pool; it may wait on the file lock.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&GameStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    async fn confess(&self, rest: &str, origin: &Conversation) -> Result<()> {
        let Some((confession, identity)) = split_confession(rest) else {
            return self.reply(origin, replies::CONFESS_USAGE).await;
        };

        if self.with_store(|store| store.has_open_round()).await? {
            return self.reply(origin, replies::CONFESS_WAIT).await;
        }

        if let Err(e) = self.broadcast(&replies::confession_broadcast(confession)).await {
            tracing::error!("Failed to post confession to {}: {}", self.group.name, e);
            return self.reply(origin, replies::CONFESSION_NOT_POSTED).await;
        }

        let (question, answer) = (confession.to_string(), identity.to_string());
        let saved = self
            .with_store(move |store| store.append_confession(&question, &answer))
            .await;
        if let Err(e) = saved {
            tracing::error!("Confession posted but not saved: {}", e);
            return self.reply(origin, replies::CONFESSION_NOT_SAVED).await;
        }

        tracing::info!("New confession round started in {}", self.group.name);
        if origin.id != self.group.id {
            self.reply(origin, replies::CONFESSION_POSTED).await?;
        }
        Ok(())
    }

    async fn guess(&self, guess: &str, origin: &Conversation) -> Result<()> {
        if guess.is_empty() {
            return self.reply(origin, replies::GUESS_USAGE).await;
        }

        let guess = guess.to_string();
        match self.with_store(move |store| store.record_guess(&guess)).await? {
            GuessOutcome::Correct { confession, answer } => {
                tracing::info!("Round solved");
                if origin.id != self.group.id {
                    self.reply(origin, &replies::correct_guess(&answer)).await?;
                }
                self.broadcast(&replies::round_solved(&confession, &answer))
                    .await
            }
            GuessOutcome::Wrong {
                confession,
                remaining,
            } => {
                self.reply(origin, &replies::wrong_guess(&confession, remaining))
                    .await
            }
            GuessOutcome::GameOver { confession } => {
                tracing::info!("Round closed after too many wrong guesses");
                self.reply(origin, &replies::game_over(&confession)).await
            }
            GuessOutcome::NoActiveGame => self.reply(origin, replies::NO_ACTIVE_GAME).await,
        }
    }

    async fn shh(&self, text: &str, origin: &Conversation) -> Result<()> {
        if text.is_empty() {
            return self.reply(origin, replies::SHH_USAGE).await;
        }
        self.broadcast(&replies::anonymous(text)).await?;
        if origin.id != self.group.id {
            self.reply(origin, replies::SHH_SENT).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use tempfile::TempDir;

    #[test]
    fn parses_commands_by_first_word() {
        assert_eq!(parse_command("/guess nick"), Some(Command::Guess("nick")));
        assert_eq!(parse_command("/guess   @nick  "), Some(Command::Guess("@nick")));
        assert_eq!(parse_command("/guess"), Some(Command::Guess("")));
        assert_eq!(
            parse_command("/confess I like pancakes @nick"),
            Some(Command::Confess("I like pancakes @nick"))
        );
        assert_eq!(parse_command("/shh\thello there"), Some(Command::Shh("hello there")));
        assert_eq!(parse_command("/GUESS nick"), None);
        assert_eq!(parse_command("/guessing nick"), None);
        assert_eq!(parse_command("hello /guess nick"), None);
    }

    #[test]
    fn splits_on_last_at() {
        assert_eq!(
            split_confession("I like pancakes @nick"),
            Some(("I like pancakes", "nick"))
        );
        assert_eq!(
            split_confession("mail me at a@b.com @ nick "),
            Some(("mail me at a@b.com", "nick"))
        );
        assert_eq!(split_confession(""), None);
        assert_eq!(split_confession("no name here"), None);
        assert_eq!(split_confession("@nick"), None);
        assert_eq!(split_confession("secret @"), None);
    }

    struct Fixture {
        _dir: TempDir,
        transport: MemoryTransport,
        store: Arc<GameStore>,
        router: CommandRouter,
        dm: Conversation,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let transport = MemoryTransport::new("bot");
        let group = transport.add_group("g1", "Confessions");
        let dm = transport.add_direct("d1");
        let store = Arc::new(GameStore::open(dir.path().join("c.json"), 5).unwrap());
        let router = CommandRouter::new(Arc::new(transport.clone()), store.clone(), group);
        Fixture {
            _dir: dir,
            transport,
            store,
            router,
            dm,
        }
    }

    #[tokio::test]
    async fn non_commands_are_not_handled() {
        let f = fixture();
        assert!(!f.router.handle("hi there", &f.dm).await);
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn confess_then_guess() {
        let f = fixture();

        assert!(f.router.handle("/confess I like pancakes @nick", &f.dm).await);
        let group_msgs = f.transport.sent_to("g1");
        assert_eq!(group_msgs.len(), 1);
        assert!(group_msgs[0].contains("I like pancakes"));
        assert!(!group_msgs[0].contains("nick"));
        assert_eq!(f.transport.sent_to("d1"), vec![replies::CONFESSION_POSTED]);

        let rounds = f.store.rounds().unwrap();
        assert_eq!(rounds[0].question, "I like pancakes");
        assert_eq!(rounds[0].answer, "nick");

        assert!(f.router.handle("/guess nick", &f.dm).await);
        assert_eq!(f.transport.sent_to("d1")[1], replies::correct_guess("nick"));
        assert_eq!(
            f.transport.sent_to("g1")[1],
            replies::round_solved("I like pancakes", "nick")
        );
        assert!(!f.store.has_open_round().unwrap());
    }

    #[tokio::test]
    async fn empty_confession_gets_usage_and_no_mutation() {
        let f = fixture();
        f.router.handle("/confess ", &f.dm).await;
        f.router.handle("/confess just text", &f.dm).await;

        assert_eq!(
            f.transport.sent_to("d1"),
            vec![replies::CONFESS_USAGE, replies::CONFESS_USAGE]
        );
        assert!(f.transport.sent_to("g1").is_empty());
        assert!(f.store.rounds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confess_rejected_while_round_open() {
        let f = fixture();
        f.router.handle("/confess first @amy", &f.dm).await;
        f.router.handle("/confess second @ben", &f.dm).await;

        assert_eq!(f.transport.sent_to("d1")[1], replies::CONFESS_WAIT);
        assert_eq!(f.transport.sent_to("g1").len(), 1);
        assert_eq!(f.store.rounds().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_broadcast_does_not_save() {
        let f = fixture();
        f.transport.fail_sends_to("g1");
        f.router.handle("/confess secret @amy", &f.dm).await;

        assert_eq!(f.transport.sent_to("d1"), vec![replies::CONFESSION_NOT_POSTED]);
        assert!(f.store.rounds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_store_answers_with_apology() {
        let f = fixture();
        std::fs::write(f.store.path(), "garbage").unwrap();
        f.router.handle("/confess secret @amy", &f.dm).await;

        assert_eq!(f.transport.sent_to("d1"), vec![replies::APOLOGY]);
        assert!(f.transport.sent_to("g1").is_empty());
    }

    #[tokio::test]
    async fn failing_command_in_the_group_gets_no_apology() {
        let f = fixture();
        std::fs::write(f.store.path(), "garbage").unwrap();
        let group = Conversation::group(GroupHandle {
            id: "g1".into(),
            name: "Confessions".into(),
        });

        assert!(f.router.handle("/guess nick", &group).await);

        assert!(f.transport.sent_to("g1").is_empty());
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_save_is_reported_distinctly() {
        let f = fixture();
        // A directory where the temp file goes makes every write fail.
        let tmp = format!("{}.tmp", f.store.path().display());
        std::fs::create_dir(&tmp).unwrap();

        f.router.handle("/confess secret @amy", &f.dm).await;

        assert_eq!(f.transport.sent_to("g1").len(), 1);
        assert_eq!(f.transport.sent_to("d1"), vec![replies::CONFESSION_NOT_SAVED]);
        assert!(f.store.rounds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn guess_usage_and_no_active_game() {
        let f = fixture();
        f.router.handle("/guess", &f.dm).await;
        f.router.handle("/guess nick", &f.dm).await;

        assert_eq!(
            f.transport.sent_to("d1"),
            vec![replies::GUESS_USAGE, replies::NO_ACTIVE_GAME]
        );
    }

    #[tokio::test]
    async fn five_wrong_guesses_end_the_round() {
        let f = fixture();
        f.router.handle("/confess secret @amy", &f.dm).await;
        for _ in 0..5 {
            f.router.handle("/guess ben", &f.dm).await;
        }
        f.router.handle("/guess amy", &f.dm).await;

        let replies_sent = f.transport.sent_to("d1");
        assert_eq!(replies_sent[1], replies::wrong_guess("secret", 4));
        assert_eq!(replies_sent[5], replies::game_over("secret"));
        assert_eq!(replies_sent[6], replies::NO_ACTIVE_GAME);
        assert_eq!(f.store.rounds().unwrap()[0].incorrect_guesses, 5);
    }

    #[tokio::test]
    async fn shh_relays_anonymously() {
        let f = fixture();
        f.router.handle("/shh the cake is a lie", &f.dm).await;
        f.router.handle("/shh", &f.dm).await;

        assert_eq!(f.transport.sent_to("g1"), vec![replies::anonymous("the cake is a lie")]);
        assert_eq!(
            f.transport.sent_to("d1"),
            vec![replies::SHH_SENT, replies::SHH_USAGE]
        );
    }

    #[tokio::test]
    async fn commands_from_the_group_do_not_double_post() {
        let f = fixture();
        let group = Conversation::group(GroupHandle {
            id: "g1".into(),
            name: "Confessions".into(),
        });
        f.router.handle("/shh psst", &group).await;
        assert_eq!(f.transport.sent_to("g1"), vec![replies::anonymous("psst")]);
    }

    #[tokio::test]
    async fn send_failure_answers_with_apology() {
        let f = fixture();
        f.transport.fail_sends_to("g1");
        assert!(f.router.handle("/shh hello", &f.dm).await);
        assert_eq!(f.transport.sent_to("d1"), vec![replies::APOLOGY]);
    }
}
