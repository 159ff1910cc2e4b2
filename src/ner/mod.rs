//! # Entity Extractor (C4)
//!
//! Multi-source extraction with fixed per-source confidences, generalized
//! from a multi-stage pipeline (quoted spans → capitalized phrases →
//! n-grams, each stage deduplicating via a lowercase `HashSet`) built for
//! free narrative text, narrowed here to three fixed sources: a
//! statistical-NER stand-in, a curated pattern library, and numeric
//! extractors.

pub mod patterns;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::EntityType;

/// One extracted mention before graph upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub surface: String,
    pub normalized: String,
    pub entity_type: EntityType,
    pub confidence: f32,
    /// Byte span within the chunk text.
    pub span: (usize, usize),
}

const STATISTICAL_CONFIDENCE: f32 = 0.90;
const PATTERN_CONFIDENCE: f32 = 0.85;
const NUMERIC_CONFIDENCE: f32 = 0.95;

fn capitalized_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,3})\b").unwrap())
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$€£]\s?\d[\d,]*(?:\.\d+)?|\b\d[\d,]*(?:\.\d+)?\s?(?:USD|EUR|GBP|dollars)\b").unwrap())
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\s?%").unwrap())
}

/// Casefold, strip punctuation except `/` and `-`, collapse whitespace.
pub fn normalize(surface: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    // NFKD + dropping combining marks folds accented forms ("Café") onto
    // their plain ASCII base ("cafe") before casefolding, so entity keys
    // match regardless of how a PDF's text layer encoded the accent.
    let decomposed: String = surface.nfkd().filter(|c| !unicode_normalization::char::is_combining_mark(*c)).collect();
    let lower = decomposed.to_lowercase();
    let stripped: String = lower
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '/' || c == '-' || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Well-known organization/person surface forms used by the statistical-NER
/// stand-in. A real deployment would wrap an actual NER model behind this
/// same extraction stage; the heuristic here (capitalized multi-word phrase
/// plus a closed suffix list) is the seam that model would fill.
const ORG_SUFFIXES: &[&str] = &["Bank", "Holdings", "Group", "Corporation", "Inc", "Ltd", "PLC"];

fn looks_like_org(phrase: &str) -> bool {
    ORG_SUFFIXES.iter().any(|s| phrase.ends_with(s))
}

pub struct Extractor {
    product_patterns: Vec<(String, Regex)>,
    term_patterns: Vec<(String, Regex)>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        let product_patterns = patterns::product_patterns()
            .iter()
            .map(|p| (p.clone(), pattern_to_regex(p)))
            .collect();
        let term_patterns = patterns::term_patterns()
            .iter()
            .map(|p| (p.clone(), pattern_to_regex(p)))
            .collect();
        Self { product_patterns, term_patterns }
    }

    /// Extract entities from a single chunk, deduplicated by
    /// `(normalized, entity_type)` with confidence = max across sources.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut found: HashMap<(String, EntityType), ExtractedEntity> = HashMap::new();

        self.extract_patterns(text, &mut found);
        self.extract_numeric(text, &mut found);
        self.extract_statistical(text, &mut found);

        let mut out: Vec<_> = found.into_values().collect();
        out.sort_by(|a, b| a.span.0.cmp(&b.span.0));
        out
    }

    fn upsert(
        found: &mut HashMap<(String, EntityType), ExtractedEntity>,
        surface: &str,
        entity_type: EntityType,
        confidence: f32,
        span: (usize, usize),
    ) {
        let normalized = patterns::canonicalize(&normalize(surface));
        let key = (normalized.clone(), entity_type);
        found
            .entry(key)
            .and_modify(|e| {
                if confidence > e.confidence {
                    e.confidence = confidence;
                }
            })
            .or_insert(ExtractedEntity {
                surface: surface.to_string(),
                normalized,
                entity_type,
                confidence,
                span,
            });
    }

    fn extract_patterns(&self, text: &str, found: &mut HashMap<(String, EntityType), ExtractedEntity>) {
        let lower = text.to_lowercase();
        for (pattern, re) in &self.product_patterns {
            if let Some(m) = re.find(&lower) {
                Self::upsert(found, pattern, EntityType::Product, PATTERN_CONFIDENCE, (m.start(), m.end()));
            }
        }
        for (pattern, re) in &self.term_patterns {
            if let Some(m) = re.find(&lower) {
                Self::upsert(found, pattern, EntityType::Term, PATTERN_CONFIDENCE, (m.start(), m.end()));
            }
        }
    }

    fn extract_numeric(&self, text: &str, found: &mut HashMap<(String, EntityType), ExtractedEntity>) {
        for m in money_re().find_iter(text) {
            Self::upsert(found, m.as_str(), EntityType::Amount, NUMERIC_CONFIDENCE, (m.start(), m.end()));
        }
        for m in percent_re().find_iter(text) {
            Self::upsert(found, m.as_str(), EntityType::Percent, NUMERIC_CONFIDENCE, (m.start(), m.end()));
        }
    }

    fn extract_statistical(&self, text: &str, found: &mut HashMap<(String, EntityType), ExtractedEntity>) {
        for m in capitalized_phrase_re().find_iter(text) {
            let phrase = m.as_str();
            if looks_like_org(phrase) {
                Self::upsert(found, phrase, EntityType::Org, STATISTICAL_CONFIDENCE, (m.start(), m.end()));
            } else if phrase.split_whitespace().count() == 2 && !phrase.chars().any(|c| c.is_ascii_digit()) {
                // Two-capitalized-word phrases with no digits are treated as
                // person-name candidates, mirroring a common NER heuristic.
                Self::upsert(found, phrase, EntityType::Person, STATISTICAL_CONFIDENCE, (m.start(), m.end()));
            }
        }
    }
}

/// Build a whole-word, case-insensitive-by-construction matcher for a
/// (already-lowercase) phrase pattern.
fn pattern_to_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern);
    Regex::new(&format!(r"\b{escaped}\b")).expect("generated patterns are always valid regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize("  FX  Forward! "), "fx forward");
    }

    #[test]
    fn normalize_folds_accented_characters_onto_their_base_form() {
        assert_eq!(normalize("Café Crédit"), normalize("Cafe Credit"));
    }

    #[test]
    fn extracts_money_and_percent() {
        let extractor = Extractor::new();
        let found = extractor.extract("The fee is $1,500.00 and the rate is 3.5% per annum.");
        assert!(found.iter().any(|e| e.entity_type == EntityType::Amount));
        assert!(found.iter().any(|e| e.entity_type == EntityType::Percent));
    }

    #[test]
    fn extracts_product_pattern_with_fixed_confidence() {
        let extractor = Extractor::new();
        let found = extractor.extract("An FX Forward is a contract to exchange currencies.");
        let fx = found.iter().find(|e| e.normalized == "fx_forward");
        assert!(fx.is_some());
        assert!((fx.unwrap().confidence - PATTERN_CONFIDENCE).abs() < 1e-6);
    }

    #[test]
    fn deduplicates_same_normalized_type_within_chunk() {
        let extractor = Extractor::new();
        let found = extractor.extract("An FX Forward. Another FX Forward mention here.");
        let count = found.iter().filter(|e| e.normalized == "fx_forward").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn recognizes_org_suffix() {
        let extractor = Extractor::new();
        let found = extractor.extract("Acme Holdings issued the bond.");
        assert!(found.iter().any(|e| e.entity_type == EntityType::Org));
    }
}
