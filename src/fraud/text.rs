use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Phrases that indicate a concrete waste-handling problem.
pub const ISSUE_KEYWORDS: [&str; 21] = [
    "penuh",
    "meluap",
    "overflow",
    "tercampur",
    "campur",
    "kontaminasi",
    "contamination",
    "bau",
    "odor",
    "berserakan",
    "sembarangan",
    "tidak dipilah",
    "tidak terpilah",
    "bocor",
    "rusak",
    "tumpah",
    "menumpuk",
    "kotor",
    "lalat",
    "tidak tersedia",
    "hilang",
];

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static regex"))
}

/// Lowercase, punctuation to spaces, whitespace collapsed.
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word tokens of two or more characters.
pub fn tokens(text: &str) -> Vec<String> {
    token_re().find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// `1 - unique/total` over the tokens; 0 for empty text.
pub fn repetition_score(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
    1.0 - unique.len() as f64 / tokens.len() as f64
}

/// Any issue keyword inside normalized text. Substring match, so suffixed
/// forms ("penuhnya", "kotoran") count.
pub fn has_issue_keyword(normalized: &str) -> bool {
    ISSUE_KEYWORDS.iter().any(|k| normalized.contains(*k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("  Tong PENUH!!  (area-B) "), "tong penuh area b");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn tokens_skip_single_characters() {
        assert_eq!(tokens("tong a penuh b2"), vec!["tong", "penuh", "b2"]);
    }

    #[test]
    fn repetition_counts_repeated_tokens() {
        let t = tokens("ok ok ok ok");
        assert_eq!(repetition_score(&t), 0.75);
        assert_eq!(repetition_score(&tokens("sampah tercampur")), 0.0);
        assert_eq!(repetition_score(&[]), 0.0);
    }

    #[test]
    fn keywords_match_plain_and_multi_word() {
        assert!(has_issue_keyword("tong sampah penuh"));
        assert!(has_issue_keyword("sampah tidak dipilah oleh pekerja"));
        assert!(!has_issue_keyword("area bersih"));
    }

    #[test]
    fn keywords_match_suffixed_forms() {
        assert!(has_issue_keyword(&normalize("Ditemukan KOTORAN di area")));
        assert!(has_issue_keyword(&normalize("tong penuhnya sudah lama")));
        assert!(has_issue_keyword("sampah dicampur"));
        assert!(!has_issue_keyword(&normalize("area sekitar tong terlihat rapi")));
    }
}
