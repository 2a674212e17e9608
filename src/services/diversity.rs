//! Diversity Validator (C3): hybrid word/char TF-IDF cosine similarity over
//! a batch of query strings, with a perspective-prefix rewrite strategy for
//! sets that fail validation (§4.3).
//!
//! No external TF-IDF/numeric crate is introduced for this (§9's design
//! note): term vectors are built directly over stopword-stripped n-gram
//! sets and cosine similarity is computed by hand over sparse maps.

use std::collections::HashMap;

/// Rotation of perspective tags applied to query 1..N when a batch fails
/// diversity validation. Query 0 is never modified.
const PERSPECTIVES: &[&str] = &[
    "technical implementation details",
    "recent developments",
    "practical applications",
    "theoretical foundations",
    "performance",
    "security",
    "comparison",
    "future implications",
];

/// A representative English stopword set, matched against lowercased
/// tokens before building word n-grams (char n-grams are unaffected, as is
/// the case with `char_wb` analyzers generally).
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

const MAX_FEATURES: usize = 500;

/// A sparse document vector: feature string -> L2-normalized TF-IDF weight.
type Vector = HashMap<String, f64>;

/// Diversity validator holding the cosine-similarity threshold above which
/// two query proxies are considered duplicates (default 0.8, §2 GLOSSARY).
#[derive(Debug, Clone, Copy)]
pub struct DiversityValidator {
    threshold: f64,
}

impl Default for DiversityValidator {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl DiversityValidator {
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// `validate(queries) -> bool` (§4.3). Trivially true for `|queries| <= 1`.
    #[must_use]
    pub fn validate(&self, queries: &[String]) -> bool {
        let non_empty: Vec<&str> = queries.iter().map(String::as_str).filter(|q| !q.trim().is_empty()).collect();
        if non_empty.len() <= 1 {
            return true;
        }

        let word_vectors = tfidf_vectors(&non_empty, true);
        let char_vectors = tfidf_vectors(&non_empty, false);

        for i in 0..non_empty.len() {
            for j in (i + 1)..non_empty.len() {
                let word_sim = cosine(&word_vectors[i], &word_vectors[j]);
                let char_sim = cosine(&char_vectors[i], &char_vectors[j]);
                if word_sim.max(char_sim) >= self.threshold {
                    return false;
                }
            }
        }
        true
    }

    /// `diversify(queries) -> Vec<String>` (§4.3). Query 0 is never
    /// modified. Applies a perspective-prefix rewrite, then — if the
    /// rewritten set still fails validation — a stronger `[Query i -
    /// perspective]` prefix.
    #[must_use]
    pub fn diversify(&self, queries: &[String]) -> Vec<String> {
        if self.validate(queries) {
            return queries.to_vec();
        }

        let mut rewritten: Vec<String> = queries
            .iter()
            .enumerate()
            .map(|(i, q)| {
                if i == 0 {
                    q.clone()
                } else {
                    format!("Focusing on {}: {q}", PERSPECTIVES[i % PERSPECTIVES.len()])
                }
            })
            .collect();

        if !self.validate(&rewritten) {
            for (i, query) in queries.iter().enumerate().skip(1) {
                rewritten[i] = format!(
                    "[Query {} - {}] {query}",
                    i + 1,
                    PERSPECTIVES[i % PERSPECTIVES.len()]
                );
            }
        }

        rewritten
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds document feature lists: word 1-2-grams (stopwords stripped) when
/// `word_mode`, else char 2-4-grams over whitespace-padded words.
fn document_features(text: &str, word_mode: bool) -> Vec<String> {
    if word_mode {
        let tokens: Vec<String> = tokenize(text).into_iter().filter(|t| !STOPWORDS.contains(&t.as_str())).collect();
        let mut features: Vec<String> = tokens.clone();
        for window in tokens.windows(2) {
            features.push(format!("{} {}", window[0], window[1]));
        }
        features
    } else {
        let lowered = text.to_lowercase();
        let mut features = Vec::new();
        for word in lowered.split_whitespace() {
            let padded = format!(" {word} ");
            let chars: Vec<char> = padded.chars().collect();
            for n in 2..=4 {
                if chars.len() < n {
                    continue;
                }
                for window in chars.windows(n) {
                    features.push(window.iter().collect());
                }
            }
        }
        features
    }
}

/// Builds L2-normalized TF-IDF vectors for `documents`, capping the
/// vocabulary to the `MAX_FEATURES` most frequent features corpus-wide
/// (sklearn's `max_features` semantics).
fn tfidf_vectors(documents: &[&str], word_mode: bool) -> Vec<Vector> {
    let doc_features: Vec<Vec<String>> = documents.iter().map(|d| document_features(d, word_mode)).collect();

    let mut corpus_term_count: HashMap<&str, u64> = HashMap::new();
    let mut doc_freq: HashMap<&str, u64> = HashMap::new();
    for features in &doc_features {
        for f in features {
            *corpus_term_count.entry(f.as_str()).or_insert(0) += 1;
        }
        let unique: std::collections::HashSet<&str> = features.iter().map(String::as_str).collect();
        for f in unique {
            *doc_freq.entry(f).or_insert(0) += 1;
        }
    }

    let mut vocab: Vec<&str> = corpus_term_count.keys().copied().collect();
    vocab.sort_by(|a, b| corpus_term_count[b].cmp(&corpus_term_count[a]).then_with(|| a.cmp(b)));
    vocab.truncate(MAX_FEATURES);
    let vocab: std::collections::HashSet<&str> = vocab.into_iter().collect();

    let n_docs = documents.len() as f64;
    let idf: HashMap<&str, f64> = vocab
        .iter()
        .map(|&term| {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            // smooth idf, matching sklearn's default: ln((1+n)/(1+df)) + 1
            (term, (((1.0 + n_docs) / (1.0 + df)).ln()) + 1.0)
        })
        .collect();

    doc_features
        .iter()
        .map(|features| {
            let mut term_freq: HashMap<&str, f64> = HashMap::new();
            for f in features {
                if vocab.contains(f.as_str()) {
                    *term_freq.entry(f.as_str()).or_insert(0.0) += 1.0;
                }
            }

            let mut vector: Vector = term_freq
                .into_iter()
                .map(|(term, tf)| (term.to_string(), tf * idf[term]))
                .collect();

            let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for weight in vector.values_mut() {
                    *weight /= norm;
                }
            }
            vector
        })
        .collect()
}

fn cosine(a: &Vector, b: &Vector) -> f64 {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    smaller.iter().filter_map(|(term, weight)| larger.get(term).map(|other| weight * other)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(strings: &[&str]) -> Vec<String> {
        strings.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_single_query_trivially_diverse() {
        let validator = DiversityValidator::default();
        assert!(validator.validate(&q(&["anything"])));
    }

    #[test]
    fn test_empty_batch_trivially_diverse() {
        let validator = DiversityValidator::default();
        assert!(validator.validate(&[]));
    }

    #[test]
    fn test_near_duplicate_queries_fail_validation() {
        let validator = DiversityValidator::default();
        let queries = q(&[
            "machine learning",
            "ML overview",
            "introduction to machine learning",
        ]);
        assert!(!validator.validate(&queries));
    }

    #[test]
    fn test_clearly_distinct_queries_pass_validation() {
        let validator = DiversityValidator::default();
        let queries = q(&[
            "rust async runtime internals",
            "best sourdough bread recipes",
            "history of the roman empire",
        ]);
        assert!(validator.validate(&queries));
    }

    #[test]
    fn test_diversify_preserves_first_query() {
        let validator = DiversityValidator::default();
        let queries = q(&["machine learning", "ML overview"]);
        let rewritten = validator.diversify(&queries);
        assert_eq!(rewritten[0], "machine learning");
        assert_ne!(rewritten[1], "ML overview");
    }

    #[test]
    fn test_diversify_result_validates() {
        let validator = DiversityValidator::default();
        let queries = q(&[
            "machine learning",
            "ML overview",
            "introduction to machine learning",
        ]);
        let rewritten = validator.diversify(&queries);
        assert!(validator.validate(&rewritten));
    }

    #[test]
    fn test_diversify_is_noop_for_already_diverse_set() {
        let validator = DiversityValidator::default();
        let queries = q(&["quantum computing hardware", "medieval european history"]);
        let rewritten = validator.diversify(&queries);
        assert_eq!(rewritten, queries);
    }
}
