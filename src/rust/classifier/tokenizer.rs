use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::lemmatizer::Lemmatizer;

/// Token classes recognised by the casual tokenizer, in priority order.
///
/// Numbers are tried before emoticons so that times and fractions such as
/// `8:30` or `8/10` are not split into an emoticon and a remainder.
const CASUAL_PATTERNS: &[&str] = &[
    // URLs
    r#"(?:https?://|www\.)[^\s<>"]*[^\s<>".,;:!?)\]']"#,
    // Phone numbers
    r"(?:\+?[01][\-\s.]*)?(?:\(?\d{3}[\-\s.)]*)?\d{3}[\-\s.]*\d{4}",
    // Numbers, fractions, decimals
    r"[+\-]?\d+[,/.:\-]\d+[+\-]?",
    // Emoticons
    r"[<>]?[:;=8][\-o*']?[)\](\[dDpP/:}{@|\\]|[)\](\[dDpP/:}{@|\\][\-o*']?[:;=8][<>]?|<3",
    // HTML tags
    r"<[^>\s]+>",
    // ASCII arrows
    r"-+>|<-+",
    // Handles
    r"@\w+",
    // Hashtags
    r"#+\w+[\w'\-]*\w+",
    // Email addresses
    r"[\w.+\-]+@[\w\-]+\.(?:[\w\-]\.?)+[\w\-]",
    // Words with internal apostrophes or dashes
    r"[^\W\d_](?:[^\W\d_]|['\-_])+[^\W\d_]",
    // Plain word runs
    r"\w+",
    // Ellipsis
    r"\.(?:\s*\.)+",
    // Anything else that is not whitespace
    r"\S",
];

/// Options of the casual tokenizer. Stored with a trained model so that
/// prediction tokenizes exactly like training did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Reduce each token to its noun lemma.
    pub lemmatize: bool,
    /// Collapse runs of three or more identical characters to three.
    pub reduce_lengthening: bool,
    /// Drop `@username` tokens.
    pub strip_handles: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lemmatize: true,
            reduce_lengthening: false,
            strip_handles: false,
        }
    }
}

/// Social-text aware tokenizer: lowercases, splits on casual-text rules,
/// then lemmatizes each token.
#[derive(Debug, Clone)]
pub struct CasualTokenizer {
    config: TokenizerConfig,
    pattern: Arc<Regex>,
    lemmatizer: Lemmatizer,
}

impl CasualTokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self, ClassifierError> {
        let joined = CASUAL_PATTERNS
            .iter()
            .map(|p| format!("(?:{p})"))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&joined)
            .map_err(|e| ClassifierError::TokenizerError(format!("Invalid token pattern: {e}")))?;

        Ok(Self {
            config,
            pattern: Arc::new(pattern),
            lemmatizer: Lemmatizer::new(),
        })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Splits `text` into a lazily evaluated token sequence.
    pub fn tokenize(&self, text: &str) -> TokenSequence<'_> {
        let mut lowered = text.to_lowercase();
        if self.config.reduce_lengthening {
            lowered = reduce_lengthening(&lowered);
        }
        TokenSequence {
            text: lowered,
            tokenizer: self,
        }
    }

    fn normalize(&self, raw: &str) -> String {
        let token = if self.config.lemmatize {
            self.lemmatizer.lemmatize(raw)
        } else {
            raw.to_string()
        };
        token.to_lowercase().trim().to_string()
    }
}

/// Tokens of one document. Iteration is lazy and can be restarted any
/// number of times; every pass yields the same tokens in document order.
#[derive(Debug, Clone)]
pub struct TokenSequence<'t> {
    text: String,
    tokenizer: &'t CasualTokenizer,
}

impl<'t> TokenSequence<'t> {
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        let strip_handles = self.tokenizer.config.strip_handles;
        self.tokenizer
            .pattern
            .find_iter(&self.text)
            .map(|m| m.as_str())
            .filter(move |raw| !(strip_handles && raw.len() > 1 && raw.starts_with('@')))
            .map(|raw| self.tokenizer.normalize(raw))
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().collect()
    }
}

fn reduce_lengthening(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous = None;
    let mut run = 0usize;
    for c in text.chars() {
        if Some(c) == previous {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }
        if run <= 3 {
            out.push(c);
        }
    }
    out
}
