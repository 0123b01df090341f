//! Whole-word keyword matching against permit descriptions.
//!
//! The policy is fixed: `\b<keyword>\b`, case-insensitive, keyword text
//! escaped. Compiled patterns are cached process-wide; client keyword sets
//! are small and recur every cycle.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static PATTERNS: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// True when `keyword` appears in `text` as a whole word,
/// case-insensitively. Blank keywords never match.
pub fn whole_word_match(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    let key = keyword.to_lowercase();

    if let Ok(cache) = PATTERNS.read() {
        if let Some(regex) = cache.get(&key) {
            return regex.is_match(text);
        }
    }

    let pattern = format!(r"(?i)\b{}\b", regex::escape(&key));
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(err) => {
            warn!(keyword, error = %err, "unusable keyword pattern");
            return false;
        }
    };
    let matched = regex.is_match(text);
    if let Ok(mut cache) = PATTERNS.write() {
        cache.insert(key, regex);
    }
    matched
}

/// First keyword in `keywords` that whole-word-matches `text`.
pub fn first_matching_keyword<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    keywords
        .iter()
        .find(|kw| whole_word_match(text, kw))
        .map(|kw| kw.as_str())
}
