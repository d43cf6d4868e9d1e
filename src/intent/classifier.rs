//! Intent classifier.
//!
//! Matching order, first hit wins:
//! 1. a choice id of the form `intent:<slug>`
//! 2. exact phrase match
//! 3. greeting (typed text only)
//! 4. phrase contained on word boundaries, in catalog priority order
//! 5. fuzzy match above `FUZZY_THRESHOLD`

use std::sync::LazyLock;

use regex::Regex;

use super::Intent;
use super::catalog::{CATALOG, GREETINGS};

/// Minimum similarity (exclusive) for a fuzzy match to count.
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// One alternation per catalog entry, in catalog order.
static PHRASE_PATTERNS: LazyLock<Vec<(Intent, Regex)>> = LazyLock::new(|| {
    CATALOG
        .iter()
        .map(|entry| {
            let alternation = entry
                .phrases
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?:^|[^\p{{L}}\p{{N}}])(?:{alternation})(?:$|[^\p{{L}}\p{{N}}])");
            let regex = Regex::new(&pattern).expect("escaped phrases form a valid pattern");
            (entry.intent, regex)
        })
        .collect()
});

static GREETING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = GREETINGS
        .iter()
        .map(|g| regex::escape(g))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("^(?:{alternation})$")).expect("escaped greetings form a valid pattern")
});

/// Trim, lowercase and collapse inner whitespace.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolve `text` (and the id of a tapped choice, if any) to an intent.
///
/// For a tapped choice pass its title as `text`; an empty title falls back
/// to the id. Greetings are only recognized in typed text.
pub fn classify(text: &str, selection: Option<&str>) -> Intent {
    if let Some(intent) = selection.and_then(Intent::from_selection_id) {
        return intent;
    }

    let mut text = normalize(text);
    if text.is_empty() {
        text = selection.map(normalize).unwrap_or_default();
    }
    if text.is_empty() {
        return Intent::None;
    }

    if let Some(intent) = exact_match(&text) {
        return intent;
    }
    if selection.is_none() && GREETING_PATTERN.is_match(&text) {
        return Intent::Greeting;
    }
    if let Some(intent) = substring_match(&text) {
        return intent;
    }
    fuzzy_match(&text).unwrap_or(Intent::None)
}

fn exact_match(text: &str) -> Option<Intent> {
    CATALOG
        .iter()
        .find(|entry| entry.phrases.contains(&text))
        .map(|entry| entry.intent)
}

pub(crate) fn substring_match(text: &str) -> Option<Intent> {
    PHRASE_PATTERNS
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(intent, _)| *intent)
}

/// Best-scoring phrase across the catalog; ties go to the earlier entry.
fn fuzzy_match(text: &str) -> Option<Intent> {
    let mut best: Option<(Intent, f64)> = None;
    for entry in CATALOG {
        for phrase in entry.phrases {
            let score = similarity(text, phrase);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((entry.intent, score));
            }
        }
    }
    best.filter(|(_, score)| *score > FUZZY_THRESHOLD)
        .map(|(intent, _)| intent)
}

/// Normalized Levenshtein similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_phrase_matches_exactly() {
        for entry in CATALOG {
            for phrase in entry.phrases {
                assert_eq!(classify(phrase, None), entry.intent, "phrase '{phrase}'");
            }
        }
    }

    #[test]
    fn exact_match_ignores_case_and_spacing() {
        assert_eq!(classify("  Check   BALANCE ", None), Intent::Balance);
        assert_eq!(classify("Bank Transfer (NGN)", None), Intent::FiatFund);
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(classify("", None), Intent::None);
        assert_eq!(classify("   \t\n", None), Intent::None);
    }

    #[test]
    fn greetings_only_for_typed_text() {
        assert_eq!(classify("hi", None), Intent::Greeting);
        assert_eq!(classify("Good Morning", None), Intent::Greeting);
        assert_ne!(classify("hi", Some("btn_1")), Intent::Greeting);
        // Greeting must be the whole message.
        assert_eq!(classify("hi, what is toki?", None), Intent::About);
    }

    #[test]
    fn selection_id_wins_over_title() {
        assert_eq!(classify("Help", Some("intent:balance")), Intent::Balance);
        assert_eq!(classify("", Some("intent:fiat-fund")), Intent::FiatFund);
    }

    #[test]
    fn selection_title_matches_exactly() {
        assert_eq!(classify("Show Card", Some("legacy-button")), Intent::Card);
        assert_eq!(classify("Activate Card", Some("legacy-button")), Intent::Register);
        // Unknown id with no title falls back to the id text.
        assert_eq!(classify("", Some("fund")), Intent::Fund);
    }

    #[test]
    fn substring_follows_priority_order() {
        assert_eq!(classify("i want to fund with crypto", None), Intent::CryptoFund);
        assert_eq!(classify("tell me about the fees", None), Intent::About);
        assert_eq!(classify("what is toki card", None), Intent::About);
        assert_eq!(classify("please show my card", None), Intent::Card);
        assert_eq!(classify("can i deposit via bank transfer", None), Intent::FiatFund);
    }

    #[test]
    fn action_verbs_win_over_card_phrases() {
        assert_eq!(classify("fund my card", None), Intent::Fund);
        assert_eq!(classify("top up my card", None), Intent::Fund);
        assert_eq!(classify("check my card balance", None), Intent::Balance);
        assert_eq!(classify("i want to activate my card", None), Intent::Register);
        assert_eq!(classify("where is my card", None), Intent::Card);
    }

    #[test]
    fn substring_respects_word_boundaries() {
        // "how" inside "show" and "ok" inside "book" must not match.
        assert_eq!(classify("show me my balance", None), Intent::Balance);
        assert_eq!(classify("book", None), Intent::None);
        assert_eq!(classify("is this safe?", None), Intent::Security);
    }

    #[test]
    fn fuzzy_catches_typos() {
        assert_eq!(classify("balanse", None), Intent::Balance);
        assert_eq!(classify("registr", None), Intent::Register);
        assert_eq!(classify("featurse", None), Intent::None);
        assert_eq!(classify("xyzzy", None), Intent::None);
    }

    #[test]
    fn fuzzy_never_overrides_substring() {
        let inputs = [
            "please help with my balanse",
            "fund my acount",
            "ok thnks",
            "how do i verfy",
            "need card detials and balance",
        ];
        for input in inputs {
            let text = normalize(input);
            if let Some(hit) = substring_match(&text) {
                assert_eq!(classify(input, None), hit, "input '{input}'");
            }
        }
    }

    #[test]
    fn classification_is_deterministic() {
        for input in ["fund", "balanse", "hello", "what now", "random words"] {
            assert_eq!(classify(input, None), classify(input, None));
        }
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("fund", ""), 4);
        assert!((similarity("balance", "balanse") - (1.0 - 1.0 / 7.0)).abs() < 1e-9);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Show\tMy   CARD \n"), "show my card");
    }
}
