//! User-facing chat text.

use crate::bot::membership::EnrollmentReport;

pub const APOLOGY: &str = "Sorry, something went wrong handling that message. Please try again.";

pub const CONFESS_USAGE: &str =
    "To confess, use: /confess <your confession> @<name>\nExample: /confess I like pancakes @nick";
pub const CONFESS_WAIT: &str =
    "There's already a confession in play. Wait for the current game to finish before confessing.";
pub const CONFESSION_POSTED: &str = "🤫 Your confession is live. Let the guessing begin!";
pub const CONFESSION_NOT_POSTED: &str =
    "Sorry, I couldn't post your confession to the group. Nothing was saved, please try again.";
pub const CONFESSION_NOT_SAVED: &str =
    "Your confession was posted, but I couldn't save the game. Guesses may not be tracked.";

pub const GUESS_USAGE: &str = "To guess, use: /guess <name>";
pub const NO_ACTIVE_GAME: &str =
    "There's no active confession to guess right now. Start one with /confess <text> @<name>";

pub const SHH_USAGE: &str = "To post anonymously, use: /shh <message>";
pub const SHH_SENT: &str = "🤐 Sent anonymously.";

pub const ENROLL_FAILED: &str =
    "Sorry, I couldn't add you to any group right now. Send me another message to retry.";

pub fn confession_broadcast(confession: &str) -> String {
    format!(
        "🤫 New confession:\n\"{}\"\n\nWho said it? Reply with /guess <name>",
        confession
    )
}

pub fn correct_guess(answer: &str) -> String {
    format!("🎉 Correct! It was @{}.", answer.trim_start_matches('@'))
}

pub fn round_solved(confession: &str, answer: &str) -> String {
    format!(
        "🎉 Solved! \"{}\" was confessed by @{}.",
        confession,
        answer.trim_start_matches('@')
    )
}

pub fn wrong_guess(confession: &str, remaining: u32) -> String {
    let guesses = if remaining == 1 { "guess" } else { "guesses" };
    format!(
        "❌ Wrong guess for \"{}\". {} {} left.",
        confession, remaining, guesses
    )
}

pub fn game_over(confession: &str) -> String {
    format!(
        "💀 Game over! Out of guesses for \"{}\". That secret stays safe.",
        confession
    )
}

pub fn anonymous(text: &str) -> String {
    format!("🤫 Anonymous: {}", text)
}

/// "A", "A and B", "A, B and C".
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// One message covering every target group's outcome.
pub fn enrollment_confirmation(report: &EnrollmentReport) -> String {
    let added = join_names(&report.added);
    let already = join_names(&report.already);

    match (report.added.is_empty(), report.already.is_empty()) {
        (true, true) => ENROLL_FAILED.to_string(),
        (false, true) => format!("👋 Welcome! I've added you to {}.", added),
        (true, false) => format!("You're already a member of {}. 👍", already),
        (false, false) => format!(
            "👋 I've added you to {}. You're already a member of {}.",
            added, already
        ),
    }
}
