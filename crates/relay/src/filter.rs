//! Per-guild banned-word filter.
//!
//! Matching works on a normalized copy of the text: compatibility
//! decomposition, combining marks dropped, lowercased, and everything that is
//! neither a letter nor whitespace removed. The normalized text is split on
//! whitespace into tokens; a banned word matches only a whole token.
//!
//! Masking works on the raw text, token by token: a whitespace-delimited raw
//! segment whose normalized form equals a matched word has the span from its
//! first to its last letter replaced by `#`, one per character. Words glued
//! to other letters (`hellobadword`) are never masked, and neither is a word
//! that merely appears inside a longer token.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, RwLock},
};

use {crosschat_common::GuildId, unicode_normalization::UnicodeNormalization};

const MASK: char = '#';

static BUILTIN_WORDS: &str = include_str!("../static/words.txt");

/// The shared baseline list shipped with the bot.
pub fn builtin_baseline() -> BTreeSet<String> {
    BUILTIN_WORDS
        .lines()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Normalize free text for matching. Whitespace runs collapse to one space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
    {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_alphabetic() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Normalize a single word: like [`normalize`] with whitespace dropped.
pub fn normalize_word(word: &str) -> String {
    normalize(word).replace(' ', "")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub text: String,
    pub changed: bool,
    /// Normalized banned words found in the text, sorted.
    pub matched: Vec<String>,
}

/// Banned words of one guild on top of the shared baseline.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    baseline: Arc<BTreeSet<String>>,
    words: BTreeSet<String>,
}

impl MessageFilter {
    pub fn new<I, S>(words: I, baseline: Arc<BTreeSet<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| normalize_word(w.as_ref()))
            .filter(|w| !w.is_empty() && !baseline.contains(w))
            .collect();
        Self { baseline, words }
    }

    /// Add a guild word. `false` when it is empty after normalization or
    /// already filtered.
    pub fn add(&mut self, word: &str) -> bool {
        let word = normalize_word(word);
        if word.is_empty() || self.baseline.contains(&word) {
            return false;
        }
        self.words.insert(word)
    }

    /// Remove a guild word. Baseline words cannot be removed.
    pub fn remove(&mut self, word: &str) -> bool {
        let word = normalize_word(word);
        if self.baseline.contains(&word) {
            return false;
        }
        self.words.remove(&word)
    }

    /// Guild-specific words, without the baseline.
    pub fn guild_words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn apply(&self, text: &str) -> FilterResult {
        let normalized = normalize(text);
        let tokens: BTreeSet<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();

        let matched: BTreeSet<&str> = tokens
            .into_iter()
            .filter(|t| self.baseline.contains(*t) || self.words.contains(*t))
            .collect();

        if matched.is_empty() {
            return FilterResult {
                text: text.to_string(),
                changed: false,
                matched: Vec::new(),
            };
        }

        FilterResult {
            text: mask_tokens(text, &matched),
            changed: true,
            matched: matched.into_iter().map(str::to_string).collect(),
        }
    }
}

fn mask_tokens(text: &str, matched: &BTreeSet<&str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut segment = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            push_segment(&mut out, &segment, matched);
            segment.clear();
            out.push(ch);
        } else {
            segment.push(ch);
        }
    }
    push_segment(&mut out, &segment, matched);
    out
}

fn push_segment(out: &mut String, segment: &str, matched: &BTreeSet<&str>) {
    if segment.is_empty() {
        return;
    }
    if !matched.contains(normalize_word(segment).as_str()) {
        out.push_str(segment);
        return;
    }
    let chars: Vec<char> = segment.chars().collect();
    let first = chars.iter().position(|c| c.is_alphabetic());
    let last = chars.iter().rposition(|c| c.is_alphabetic());
    match (first, last) {
        (Some(first), Some(last)) => {
            for (i, ch) in chars.into_iter().enumerate() {
                out.push(if (first..=last).contains(&i) {
                    MASK
                } else {
                    ch
                });
            }
        },
        _ => out.push_str(segment),
    }
}

/// Filters of every guild, swapped wholesale on registry rebuild.
pub struct FilterRegistry {
    baseline: Arc<BTreeSet<String>>,
    guilds: RwLock<HashMap<GuildId, MessageFilter>>,
}

impl FilterRegistry {
    pub fn new(baseline: BTreeSet<String>) -> Self {
        Self {
            baseline: Arc::new(baseline),
            guilds: RwLock::new(HashMap::new()),
        }
    }

    /// A filter for `words` sharing this registry's baseline.
    pub fn build<I, S>(&self, words: I) -> MessageFilter
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        MessageFilter::new(words, Arc::clone(&self.baseline))
    }

    pub(crate) fn replace_all(&self, filters: HashMap<GuildId, MessageFilter>) {
        let mut guilds = self.guilds.write().unwrap_or_else(|e| e.into_inner());
        *guilds = filters;
    }

    /// Current filter of a guild; guilds without words get the baseline.
    pub fn filter_for(&self, guild_id: GuildId) -> MessageFilter {
        let guilds = self.guilds.read().unwrap_or_else(|e| e.into_inner());
        guilds
            .get(&guild_id)
            .cloned()
            .unwrap_or_else(|| self.build(std::iter::empty::<&str>()))
    }

    pub fn apply(&self, guild_id: GuildId, text: &str) -> FilterResult {
        let guilds = self.guilds.read().unwrap_or_else(|e| e.into_inner());
        match guilds.get(&guild_id) {
            Some(filter) => filter.apply(text),
            None => self.build(std::iter::empty::<&str>()).apply(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn baseline() -> Arc<BTreeSet<String>> {
        Arc::new(["darn".to_string()].into_iter().collect())
    }

    fn filter(words: &[&str]) -> MessageFilter {
        MessageFilter::new(words.iter().copied(), baseline())
    }

    #[rstest]
    #[case("Héllo  Wörld!", "hello world")]
    #[case("ＦＵＬＬ width", "full width")]
    #[case("don't stop", "dont stop")]
    #[case("  123 ", "")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn masks_any_case_with_same_length() {
        let f = filter(&["heck"]);
        let r = f.apply("what the HECK, Heck and heck!");
        assert!(r.changed);
        assert_eq!(r.text, "what the ####, #### and ####!");
        assert_eq!(r.matched, vec!["heck"]);
    }

    #[test]
    fn clean_text_is_untouched() {
        let f = filter(&["heck"]);
        let r = f.apply("hello there");
        assert!(!r.changed);
        assert_eq!(r.text, "hello there");
        assert!(r.matched.is_empty());
    }

    #[test]
    fn substring_is_not_a_match() {
        let f = filter(&["ass"]);
        let r = f.apply("a classic passage");
        assert!(!r.changed);
        assert_eq!(r.text, "a classic passage");
    }

    #[test]
    fn diacritics_still_match_and_mask() {
        let f = filter(&["heck"]);
        let r = f.apply("oh hëck");
        assert!(r.changed);
        assert_eq!(r.text, "oh ####");
    }

    #[test]
    fn baseline_words_always_apply() {
        let f = filter(&[]);
        let r = f.apply("darn it");
        assert_eq!(r.text, "#### it");
        assert_eq!(r.matched, vec!["darn"]);
    }

    #[test]
    fn add_and_remove() {
        let mut f = filter(&[]);
        assert!(f.add("Heck"));
        assert!(!f.add("heck"));
        assert!(f.apply("heck").changed);

        assert!(f.remove("HECK"));
        assert!(!f.remove("heck"));
        assert!(!f.apply("heck").changed);
    }

    #[test]
    fn baseline_cannot_be_added_or_removed() {
        let mut f = filter(&[]);
        assert!(!f.add("darn"));
        assert!(!f.remove("darn"));
        assert!(f.apply("DARN").changed);
        assert_eq!(f.guild_words().count(), 0);
    }

    #[test]
    fn empty_word_is_rejected() {
        let mut f = filter(&[]);
        assert!(!f.add("!!!"));
    }

    #[test]
    fn registry_falls_back_to_baseline() {
        let registry = FilterRegistry::new(["darn".to_string()].into_iter().collect());
        let mut guilds = HashMap::new();
        guilds.insert(1, registry.build(["heck"]));
        registry.replace_all(guilds);

        assert!(registry.apply(1, "heck").changed);
        assert!(!registry.apply(2, "heck").changed);
        assert!(registry.apply(2, "darn").changed);
        let guild = registry.filter_for(1);
        assert_eq!(guild.guild_words().collect::<Vec<_>>(), vec!["heck"]);
    }

    #[test]
    fn builtin_baseline_is_normalized() {
        let words = builtin_baseline();
        assert!(!words.is_empty());
        assert!(words.iter().all(|w| *w == normalize_word(w)));
    }
}
