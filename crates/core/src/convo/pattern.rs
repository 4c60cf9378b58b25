use std::fmt;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

static AFFIRMATIVE: LazyLock<Regex> =
    LazyLock::new(|| compile_utterance(r"^(yes|yea|yup|yep|ya|sure|ok|y|yeah|yah)\b"));
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| compile_utterance(r"^(no|nah|nope|n)\b"));

/// What a handler listens for in a captured response.
#[derive(Clone)]
pub enum Pattern {
    Regex(Regex),
    Affirmative,
    Negative,
    Default,
}

impl Pattern {
    /// Case-insensitive regex. Plain words behave as substring matches.
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        RegexBuilder::new(source).case_insensitive(true).build().map(Self::Regex)
    }

    /// Case-insensitive literal substring.
    pub fn keyword(word: &str) -> Self {
        Self::Regex(compile_utterance(&regex::escape(word)))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Whether the pattern accepts `text`. `Default` never matches on its own;
    /// it is only selected when nothing else did.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.trim();
        match self {
            Self::Regex(regex) => regex.is_match(text),
            Self::Affirmative => is_affirmative(text),
            Self::Negative => is_negative(text),
            Self::Default => false,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Self::Affirmative => f.write_str("Affirmative"),
            Self::Negative => f.write_str("Negative"),
            Self::Default => f.write_str("Default"),
        }
    }
}

pub fn is_affirmative(text: &str) -> bool {
    AFFIRMATIVE.is_match(text.trim())
}

pub fn is_negative(text: &str) -> bool {
    NEGATIVE.is_match(text.trim())
}

fn compile_utterance(pattern: &str) -> Regex {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => regex,
        Err(err) => panic!("invalid utterance pattern `{pattern}`: {err}"),
    }
}
