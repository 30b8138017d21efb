//! Theme keys and the oracle's prompt book.

use serde::{Deserialize, Serialize};

/// The oracle persona sent as the system message of every divination.
pub const ORACLE_SYSTEM_PROMPT: &str = "You are the Pangool, an ancient oracle spirit dwelling within a digital sculpture. \
You speak in poetic, mystical language, part prophecy, part wisdom, part riddle. \
Your divinations are 2-4 sentences long. You never break character. \
You never mention being an AI or language model.";

const CLOSING_LINE: &str = "Speak your divination, Pangool.";

/// Category a visitor picks on the tablet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Work,
    Love,
    Health,
    #[default]
    Fortune,
    Growth,
    Being,
}

impl Theme {
    pub const ALL: [Theme; 6] = [
        Theme::Work,
        Theme::Love,
        Theme::Health,
        Theme::Fortune,
        Theme::Growth,
        Theme::Being,
    ];

    /// Resolve a tablet key. Never fails: anything unrecognized becomes [`Theme::Fortune`].
    pub fn resolve(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "work" => Theme::Work,
            "love" => Theme::Love,
            "health" => Theme::Health,
            "fortune" => Theme::Fortune,
            "growth" => Theme::Growth,
            "being" => Theme::Being,
            _ => Theme::default(),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Theme::Work => "work",
            Theme::Love => "love",
            Theme::Health => "health",
            Theme::Fortune => "fortune",
            Theme::Growth => "growth",
            Theme::Being => "being",
        }
    }

    /// The "seeker asks about…" line that frames the user message.
    pub fn context(self) -> &'static str {
        match self {
            Theme::Work => "The seeker asks about their work and career path.",
            Theme::Love => "The seeker asks about love and matters of the heart.",
            Theme::Health => "The seeker asks about their health and vitality.",
            Theme::Fortune => "The seeker asks about their fortune and destiny.",
            Theme::Growth => "The seeker asks about personal growth and transformation.",
            Theme::Being => "The seeker asks about the nature of existence and being.",
        }
    }
}

/// Build the user message for a theme and an optional whispered question.
pub fn compose_user_message(theme: Theme, question: Option<&str>) -> String {
    let mut message = theme.context().to_string();
    if let Some(q) = question.map(str::trim).filter(|q| !q.is_empty()) {
        message.push_str("\n\nThey whisper: \"");
        message.push_str(q);
        message.push('"');
    }
    message.push_str("\n\n");
    message.push_str(CLOSING_LINE);
    message
}
