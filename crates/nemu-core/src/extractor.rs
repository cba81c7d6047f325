//! Query extraction.
//!
//! Decides whether an incoming message is addressed to nemu and, if so, which
//! text should be looked up. In conversations that require the trigger token
//! the token is cut out of the message along with any address word glued to
//! it ("hey nemu, ..." or a trailing "... nemu ok").

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ExtractorConfig;
use crate::error::{NemuError, NemuResult};
use crate::types::Classification;

static EXTRA_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Classifies raw message text into `Ignore` or `Respond(query)`.
#[derive(Debug, Clone)]
pub struct QueryExtractor {
    trigger_lower: String,
    trigger_pattern: Regex,
    min_query_chars: usize,
}

impl QueryExtractor {
    /// Build an extractor from configuration.
    pub fn new(config: &ExtractorConfig) -> NemuResult<Self> {
        let trigger = config.trigger_token.trim();
        if trigger.is_empty() {
            return Err(NemuError::validation("trigger token must not be blank"));
        }

        let token = regex::escape(trigger);
        let words: Vec<String> = config
            .address_words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();

        let pattern = if words.is_empty() {
            format!(r"(?i)\b{}\b", token)
        } else {
            let words = words.join("|");
            // Leading address word always goes; a trailing one only when it
            // ends the message, so "nemu hello world" keeps "hello world".
            format!(
                r"(?i)(?:\b(?:{words})\b[,\s]*)?\b{token}\b(?:[,\s]*\b(?:{words})\b[[:punct:]\s]*$)?",
                words = words,
                token = token
            )
        };

        let trigger_pattern = Regex::new(&pattern)
            .map_err(|e| NemuError::Configuration(format!("Invalid trigger pattern: {}", e)))?;

        Ok(Self {
            trigger_lower: trigger.to_lowercase(),
            trigger_pattern,
            min_query_chars: config.min_query_chars,
        })
    }

    /// Classify a message.
    ///
    /// Replies to pending teaching prompts never reach this point; the
    /// correlator handles them first.
    pub fn classify(
        &self,
        raw_text: &str,
        is_reply_to_known_message: bool,
        requires_trigger: bool,
    ) -> Classification {
        let query = if is_reply_to_known_message || !requires_trigger {
            raw_text.to_string()
        } else if self.contains_trigger(raw_text) {
            self.strip_trigger(raw_text)
        } else {
            return Classification::Ignore;
        };

        if query.trim().chars().count() < self.min_query_chars {
            return Classification::Ignore;
        }

        Classification::Respond(query)
    }

    /// Case-insensitive substring check for the trigger token.
    pub fn contains_trigger(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.trigger_lower)
    }

    /// Remove every whole-word occurrence of the trigger token.
    pub fn strip_trigger(&self, text: &str) -> String {
        let removed = self.trigger_pattern.replace_all(text, " ");
        let collapsed = EXTRA_WHITESPACE.replace_all(&removed, " ");
        collapsed
            .trim_matches(|c: char| c == ',' || c.is_whitespace())
            .to_string()
    }
}
