//! Relevance scoring and ordering.
//!
//! Every candidate starts from a base score: its semantic similarity, or
//! `1.0` when it came from structured lookup alone. Each term or phrase the
//! candidate's text contains adds `base × weight`, where the weight is the
//! boost or `1.0` without one. Each boosted constraint it satisfies adds
//! `base × boost`. Negated terms and phrases remove a candidate outright.

use std::cmp::Ordering;
use std::collections::HashMap;

use kissql_core::predicate::parse_date;
use kissql_core::{ArticleId, FieldValue, Metadata, Predicate, SearchHit};

use crate::ast::{Meta, SortDirection, StructuredQuery};
use crate::compiler::CompiledConstraint;

/// Score given to candidates without a semantic similarity.
pub const STRUCTURED_BASE_SCORE: f32 = 1.0;

/// A word sequence to look for in an article's text.
#[derive(Debug, Clone, PartialEq)]
struct TextPattern {
    words: Vec<String>,
    /// Extra positions allowed between the first and last word
    slack: u32,
}

impl TextPattern {
    fn new(text: &str, slack: u32) -> Option<Self> {
        let words = words(text);
        (!words.is_empty()).then_some(Self { words, slack })
    }

    /// Whether the words occur in order, spanning at most
    /// `words - 1 + slack` positions.
    fn is_in(&self, doc: &[String]) -> bool {
        let max_span = self.words.len() - 1 + self.slack as usize;
        let first = &self.words[0];

        doc.iter()
            .enumerate()
            .filter(|(_, w)| *w == first)
            .any(|(start, _)| {
                let mut at = start;
                for word in &self.words[1..] {
                    let limit = (start + max_span + 1).min(doc.len());
                    match doc[at + 1..limit].iter().position(|w| w == word) {
                        Some(offset) => at += 1 + offset,
                        None => return false,
                    }
                }
                true
            })
    }
}

/// Lowercased alphanumeric words.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Scores and filters candidates for one query.
#[derive(Debug, Clone)]
pub struct Ranker {
    text_fields: Vec<String>,
    excluded: Vec<TextPattern>,
    weighted_text: Vec<(TextPattern, f32)>,
    boosted_constraints: Vec<(Predicate, f32)>,
}

impl Ranker {
    pub fn new(
        query: &StructuredQuery,
        compiled: &[CompiledConstraint],
        text_fields: &[String],
    ) -> Self {
        let mut excluded = Vec::new();
        let mut weighted_text = Vec::new();

        for term in &query.text_terms {
            let Some(pattern) = TextPattern::new(&term.term, 0) else {
                continue;
            };
            if term.negated {
                excluded.push(pattern);
            } else {
                weighted_text.push((pattern, term.weight()));
            }
        }
        for phrase in &query.phrases {
            let Some(pattern) = TextPattern::new(&phrase.phrase, phrase.proximity.unwrap_or(0))
            else {
                continue;
            };
            if phrase.negated {
                excluded.push(pattern);
            } else {
                weighted_text.push((pattern, phrase.weight()));
            }
        }

        let boosted_constraints = compiled
            .iter()
            .filter_map(|c| c.boost.map(|b| (c.predicate.clone(), b)))
            .collect();

        Self {
            text_fields: text_fields.to_vec(),
            excluded,
            weighted_text,
            boosted_constraints,
        }
    }

    /// Whether scoring or exclusion has to look at metadata.
    pub fn needs_metadata(&self) -> bool {
        !self.excluded.is_empty()
            || !self.weighted_text.is_empty()
            || !self.boosted_constraints.is_empty()
    }

    fn doc_words(&self, metadata: &Metadata) -> Vec<String> {
        let mut doc = Vec::new();
        for field in &self.text_fields {
            match metadata.get(field) {
                Some(FieldValue::Text(text)) => doc.extend(words(text)),
                Some(FieldValue::List(items)) => {
                    for text in items.iter().filter_map(FieldValue::as_text) {
                        doc.extend(words(text));
                    }
                }
                _ => {}
            }
        }
        doc
    }

    /// Score a candidate, or `None` if a negated term excludes it.
    pub fn score(&self, base: f32, metadata: &Metadata) -> Option<f32> {
        if !self.needs_metadata() {
            return Some(base);
        }

        let doc = if self.excluded.is_empty() && self.weighted_text.is_empty() {
            Vec::new()
        } else {
            self.doc_words(metadata)
        };

        if self.excluded.iter().any(|p| p.is_in(&doc)) {
            return None;
        }

        let text_bonus: f32 = self
            .weighted_text
            .iter()
            .filter(|(p, _)| p.is_in(&doc))
            .map(|(_, w)| base * w)
            .sum();
        let constraint_bonus: f32 = self
            .boosted_constraints
            .iter()
            .filter(|(p, _)| p.matches(metadata))
            .map(|(_, w)| base * w)
            .sum();

        Some(base + text_bonus + constraint_bonus)
    }
}

/// A field value reduced to something orderable.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Date(i64),
    Text(String),
}

impl SortKey {
    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(Self::Number(if *b { 1.0 } else { 0.0 })),
            FieldValue::Number(n) => Some(Self::Number(*n)),
            FieldValue::Text(s) => {
                let s = s.trim();
                if let Ok(n) = s.parse::<f64>() {
                    if n.is_finite() {
                        return Some(Self::Number(n));
                    }
                }
                Some(match parse_date(s) {
                    Some(d) => Self::Date(d.timestamp_millis()),
                    None => Self::Text(s.to_lowercase()),
                })
            }
            FieldValue::List(items) => items.first().and_then(Self::from_value),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Date(_) => 1,
            Self::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn by_score(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.id.cmp(&b.id))
}

/// Order hits by relevance, or by `meta.sort_field` when set.
///
/// Hits missing the sort field go last whichever the direction. Ties fall
/// back to relevance, then to article id.
pub fn sort_hits(hits: &mut [SearchHit], meta: &Meta, metadata: &HashMap<ArticleId, Metadata>) {
    let Some(field) = &meta.sort_field else {
        hits.sort_by(by_score);
        return;
    };

    let key = |id: &ArticleId| {
        metadata
            .get(id)
            .and_then(|m| m.get(field))
            .and_then(SortKey::from_value)
    };
    let mut keyed: Vec<(Option<SortKey>, SearchHit)> =
        hits.iter().map(|h| (key(&h.id), h.clone())).collect();

    keyed.sort_by(|(ka, a), (kb, b)| {
        let by_field = match (ka, kb) {
            (Some(ka), Some(kb)) => match meta.sort_dir {
                SortDirection::Asc => ka.compare(kb),
                SortDirection::Desc => kb.compare(ka),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_field.then_with(|| by_score(a, b))
    });

    for (slot, (_, hit)) in hits.iter_mut().zip(keyed) {
        *slot = hit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::compiler::compile_all;

    fn fields() -> Vec<String> {
        vec!["title".into(), "content".into()]
    }

    fn ranker(query: &str) -> Ranker {
        let query = parse(query).unwrap();
        let (compiled, _) = compile_all(&query.constraints);
        Ranker::new(&query, &compiled, &fields())
    }

    fn doc(title: &str, content: &str) -> Metadata {
        Metadata::new().with("title", title).with("content", content)
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            id: ArticleId::new(id),
            score,
        }
    }

    #[test]
    fn test_filter_only_query_keeps_base() {
        let r = ranker("category=tech");
        assert!(!r.needs_metadata());
        assert_eq!(r.score(0.7, &Metadata::new()), Some(0.7));
    }

    #[test]
    fn test_plain_terms_weigh_one() {
        let r = ranker("AI chips");
        assert!(r.needs_metadata());
        assert_eq!(r.score(0.5, &doc("AI chips", "")), Some(1.5));
        assert_eq!(r.score(0.5, &doc("AI news", "")), Some(1.0));
        assert_eq!(r.score(0.5, &doc("markets", "")), Some(0.5));
    }

    #[test]
    fn test_unit_boost_equals_default() {
        let meta = doc("AI chips", "");
        let implicit = ranker("AI").score(0.5, &meta);
        let explicit = ranker("AI^1").score(0.5, &meta);
        assert_eq!(implicit, explicit);

        let implicit = ranker(r#""AI chips""#).score(0.5, &meta);
        let explicit = ranker(r#""AI chips"^1"#).score(0.5, &meta);
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn test_low_boost_lowers_contribution() {
        let meta = doc("AI chips", "");
        let lowered = ranker("AI^0.5").score(0.5, &meta).unwrap();
        let default = ranker("AI").score(0.5, &meta).unwrap();
        assert!((lowered - 0.75).abs() < 1e-6);
        assert!(lowered < default);
    }

    #[test]
    fn test_negated_term_excludes() {
        let r = ranker("AI NOT Google");
        assert_eq!(r.score(0.5, &doc("Google unveils Gemini", "")), None);
        assert_eq!(r.score(0.5, &doc("OpenAI ships", "no mention")), Some(0.5));
    }

    #[test]
    fn test_negated_phrase_needs_adjacent_words() {
        let r = ranker(r#"NOT "open source""#);
        assert_eq!(r.score(1.0, &doc("", "the open-source model")), None);
        assert_eq!(r.score(1.0, &doc("", "open the source")), Some(1.0));
    }

    #[test]
    fn test_boosts_add_base_times_weight() {
        let r = ranker(r#"AI^2 "neural network"^0.5 category^3=tech"#);
        let meta = doc("AI news", "a neural network").with("category", "Tech");
        let score = r.score(0.5, &meta).unwrap();
        assert!((score - (0.5 + 1.0 + 0.25 + 1.5)).abs() < 1e-6);

        let meta = doc("AI news", "nothing");
        let score = r.score(0.5, &meta).unwrap();
        assert!((score - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_proximity() {
        let pattern = TextPattern::new("open source", 2).unwrap();
        assert!(pattern.is_in(&words("open and free source")));
        assert!(pattern.is_in(&words("open source")));
        assert!(!pattern.is_in(&words("open a b c source")));
        assert!(!pattern.is_in(&words("source open")));
    }

    #[test]
    fn test_proximity_retries_later_starts() {
        let pattern = TextPattern::new("a b", 0).unwrap();
        assert!(pattern.is_in(&words("a x a b")));
    }

    #[test]
    fn test_list_text_fields_are_searched() {
        let r = ranker("NOT robotics");
        let meta = Metadata::new().with(
            "title",
            FieldValue::List(vec!["Robotics".into(), "LLM".into()]),
        );
        assert_eq!(r.score(1.0, &meta), None);
    }

    #[test]
    fn test_default_order_score_then_id() {
        let mut hits = vec![hit("b", 0.5), hit("c", 0.9), hit("a", 0.5)];
        sort_hits(&mut hits, &Meta::default(), &HashMap::new());
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_sort_by_date_with_missing_last() {
        let mut metadata = HashMap::new();
        metadata.insert(
            ArticleId::new("old"),
            Metadata::new().with("publication_date", "2023-01-01"),
        );
        metadata.insert(
            ArticleId::new("new"),
            Metadata::new().with("publication_date", "2024-06-01T12:00:00Z"),
        );
        metadata.insert(ArticleId::new("none"), Metadata::new());

        let mut meta = Meta {
            sort_field: Some("publication_date".into()),
            ..Default::default()
        };

        let mut hits = vec![hit("none", 0.9), hit("old", 0.1), hit("new", 0.2)];
        sort_hits(&mut hits, &meta, &metadata);
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "none"]);

        meta.sort_dir = SortDirection::Asc;
        sort_hits(&mut hits, &meta, &metadata);
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new", "none"]);
    }

    #[test]
    fn test_sort_ties_fall_back_to_score() {
        let mut metadata = HashMap::new();
        for id in ["a", "b"] {
            metadata.insert(ArticleId::new(id), Metadata::new().with("Score", 3.0));
        }
        let meta = Meta {
            sort_field: Some("Score".into()),
            ..Default::default()
        };
        let mut hits = vec![hit("a", 0.1), hit("b", 0.8)];
        sort_hits(&mut hits, &meta, &metadata);
        assert_eq!(hits[0].id.as_str(), "b");
    }
}
