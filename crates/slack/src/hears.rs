//! Keyword listeners in the style of `controller.hears`.
//!
//! Triggers are checked in registration order and the first one with a
//! matching pattern wins. Patterns are case-insensitive regexes.

use regex::{Regex, RegexBuilder};

use crate::events::MessageKind;

/// Every way of addressing the bot. Ambient channel chatter is left out.
pub const ALL_KINDS: &[MessageKind] =
    &[MessageKind::DirectMessage, MessageKind::DirectMention, MessageKind::Mention];

struct Trigger<T> {
    patterns: Vec<Regex>,
    kinds: Vec<MessageKind>,
    action: T,
}

/// A matched trigger and the capture groups of the pattern that fired.
/// Groups that did not participate are empty strings.
#[derive(Debug, PartialEq, Eq)]
pub struct TriggerMatch<'a, T> {
    pub action: &'a T,
    pub captures: Vec<String>,
}

pub struct TriggerRouter<T> {
    triggers: Vec<Trigger<T>>,
}

impl<T> Default for TriggerRouter<T> {
    fn default() -> Self {
        Self { triggers: Vec::new() }
    }
}

impl<T> TriggerRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hears(
        &mut self,
        patterns: &[&str],
        kinds: &[MessageKind],
        action: T,
    ) -> Result<&mut Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        self.triggers.push(Trigger { patterns, kinds: kinds.to_vec(), action });
        Ok(self)
    }

    pub fn route(&self, text: &str, kind: MessageKind) -> Option<TriggerMatch<'_, T>> {
        let text = text.trim();
        self.triggers.iter().filter(|trigger| trigger.kinds.contains(&kind)).find_map(|trigger| {
            trigger.patterns.iter().find_map(|pattern| {
                pattern.captures(text).map(|captures| TriggerMatch {
                    action: &trigger.action,
                    captures: captures
                        .iter()
                        .skip(1)
                        .map(|group| group.map_or_else(String::new, |m| m.as_str().to_owned()))
                        .collect(),
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
