//! # Query Planner (C8)
//!
//! Deterministic query classification and keyword extraction. Generalized
//! from an intent classifier that scored an embedding against a handful of
//! labeled example questions, into the exact, pattern-based classifier the
//! design notes require: no embedding fallback, no ambiguity between calls
//! with the same input.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::ChunkType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryClass {
    Definition,
    Requirement,
    Fee,
    Process,
    Limit,
    General,
}

impl QueryClass {
    /// The `chunk_type` a candidate must match for a full `query_type_match`
    /// bonus in the reranker (spec.md §4.10). Classes with no direct
    /// `ChunkType` counterpart (fee/process/limit) fall back to `Content`.
    pub fn matching_chunk_type(self) -> ChunkType {
        match self {
            QueryClass::Definition => ChunkType::Definition,
            QueryClass::Requirement | QueryClass::Fee | QueryClass::Process | QueryClass::Limit => ChunkType::Content,
            QueryClass::General => ChunkType::Content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Keyword,
    Vector,
    Entity,
    Hybrid,
    Community,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub use_vector: bool,
    pub use_rerank: bool,
    pub division_filter: Option<String>,
    pub category_filter: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            use_vector: true,
            use_rerank: true,
            division_filter: None,
            category_filter: None,
        }
    }
}

/// The planner's output: which strategy to run and the keywords/class it
/// derived, carried alongside the caller's own options untouched.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub raw_query: String,
    pub strategy: Strategy,
    pub class: QueryClass,
    pub keywords: Vec<String>,
    pub options: QueryOptions,
}

struct ClassPattern {
    class: QueryClass,
    regex: &'static str,
    /// Extra stopwords beyond the base list, and required-keyword regex
    /// promoted regardless of the stopword filter (spec.md §4.8).
    extra_stopwords: &'static [&'static str],
    required_keyword_regex: Option<&'static str>,
}

const CLASS_PATTERNS: &[ClassPattern] = &[
    ClassPattern {
        class: QueryClass::Definition,
        regex: r"(?i)\bwhat (is|are)\b|\bdefine\b|\bmeaning of\b",
        extra_stopwords: &["what", "is", "are", "the", "a", "an"],
        required_keyword_regex: None,
    },
    ClassPattern {
        class: QueryClass::Fee,
        regex: r"(?i)\bfee\b|\bcharge\b|\bcost\b|\bpremium\b|\bpricing\b",
        extra_stopwords: &["how", "much", "does", "cost"],
        required_keyword_regex: Some(r"(?i)\b(fee|charge|cost|premium)\b"),
    },
    ClassPattern {
        class: QueryClass::Requirement,
        regex: r"(?i)\brequire[ds]?\b|\bneed to\b|\bmust\b|\beligib\w*\b",
        extra_stopwords: &["do", "i", "need", "to"],
        required_keyword_regex: None,
    },
    ClassPattern {
        class: QueryClass::Process,
        regex: r"(?i)\bhow (do|can|to)\b|\bprocess\b|\bsteps?\b|\bprocedure\b",
        extra_stopwords: &["how", "do", "can", "to"],
        required_keyword_regex: None,
    },
    ClassPattern {
        class: QueryClass::Limit,
        regex: r"(?i)\blimit\b|\bmaximum\b|\bminimum\b|\bcap\b|\bthreshold\b",
        extra_stopwords: &["what", "is", "the"],
        required_keyword_regex: None,
    },
];

/// Banking-generic stopwords dropped from keyword extraction unless they
/// carry a required-keyword promotion (spec.md §4.8: "account", "bank" are
/// dropped when not part of a longer noun phrase — this implementation
/// drops them unconditionally, which is the same behavior for single-token
/// keyword extraction since a noun-phrase match never occurs at that
/// granularity).
const BASE_STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "to", "for", "and", "or", "in", "on", "at", "by", "with", "my", "your", "i", "you",
    "can", "could", "would", "should", "please", "account", "bank",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[[:alnum:]]+(?:\.[[:alnum:]]+)?").unwrap())
}

/// Classify a raw query against the fixed pattern classes, in table order
/// (first match wins), defaulting to `General`.
pub fn classify(query: &str) -> QueryClass {
    for pattern in CLASS_PATTERNS {
        if Regex::new(pattern.regex).expect("class patterns are valid regex").is_match(query) {
            return pattern.class;
        }
    }
    QueryClass::General
}

fn class_pattern(class: QueryClass) -> Option<&'static ClassPattern> {
    CLASS_PATTERNS.iter().find(|p| p.class == class)
}

/// Lowercase, tokenize, strip stopwords (base plus class-specific), keep
/// numbers verbatim, and promote any class-required keyword regex matches
/// even if they would otherwise be filtered.
pub fn extract_keywords(query: &str, class: QueryClass) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut stopwords: HashSet<&str> = BASE_STOPWORDS.iter().copied().collect();
    let pattern = class_pattern(class);
    if let Some(p) = pattern {
        stopwords.extend(p.extra_stopwords.iter().copied());
    }

    let mut keywords: Vec<String> = word_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|w| !stopwords.contains(w.as_str()))
        .collect();

    if let Some(p) = pattern.and_then(|p| p.required_keyword_regex) {
        let re = Regex::new(p).expect("required-keyword patterns are valid regex");
        for m in re.find_iter(&lower) {
            let word = m.as_str().to_string();
            if !keywords.contains(&word) {
                keywords.push(word);
            }
        }
    }

    keywords.sort();
    keywords.dedup();
    keywords
}

/// Build a full plan for a raw query: classify, extract keywords, and
/// resolve the effective strategy (an explicit hint from `options` takes
/// priority; classification never overrides an explicit strategy choice).
pub fn plan(raw_query: &str, strategy_hint: Strategy, options: QueryOptions) -> QueryPlan {
    let class = classify(raw_query);
    let keywords = extract_keywords(raw_query, class);
    QueryPlan {
        raw_query: raw_query.to_string(),
        strategy: strategy_hint,
        class,
        keywords,
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_definition_queries() {
        assert_eq!(classify("What is an FX Forward?"), QueryClass::Definition);
    }

    #[test]
    fn classifies_fee_queries() {
        assert_eq!(classify("How much does the annual fee cost?"), QueryClass::Fee);
    }

    #[test]
    fn falls_back_to_general_class() {
        assert_eq!(classify("Tell me about currency hedging."), QueryClass::General);
    }

    #[test]
    fn keyword_extraction_drops_stopwords() {
        let kws = extract_keywords("What is an FX Forward?", QueryClass::Definition);
        assert!(kws.contains(&"fx".to_string()));
        assert!(kws.contains(&"forward".to_string()));
        assert!(!kws.contains(&"what".to_string()));
        assert!(!kws.contains(&"is".to_string()));
    }

    #[test]
    fn fee_query_promotes_required_keyword() {
        let kws = extract_keywords("Can I reduce my Option Premium?", QueryClass::Fee);
        assert!(kws.contains(&"premium".to_string()));
    }

    #[test]
    fn keywords_keep_numbers_verbatim() {
        let kws = extract_keywords("Is the 30 day limit fixed?", QueryClass::Limit);
        assert!(kws.contains(&"30".to_string()));
    }
}
