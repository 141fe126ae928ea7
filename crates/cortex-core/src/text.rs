//! Shared text utilities
//!
//! A single tokenizer and similarity metric used by both the knowledge
//! graph's fuzzy trigger matching and the intent router's context budget
//! truncation, so the two components agree on what a "token" is.

use std::collections::HashSet;

/// Lowercase, punctuation-stripped whitespace tokenization. Deliberately
/// simple: trigger phrases and user requests are short, so a stopword list
/// or stemmer would add guesswork without improving match quality.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Fraction of `query`'s tokens that also appear in `candidate`.
/// Used by Tier 2's fuzzy trigger matching: `|intersection| / |query tokens|`.
pub fn token_overlap(query: &str, candidate: &str) -> f64 {
    let query_tokens = token_set(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = token_set(candidate);
    let overlap = query_tokens.intersection(&candidate_tokens).count();
    overlap as f64 / query_tokens.len() as f64
}

/// Jaccard similarity between two token sets: `|A∩B| / |A∪B|`.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(tokenize("Run the Tests!"), vec!["run", "the", "tests"]);
    }

    #[test]
    fn token_overlap_is_fraction_of_query_tokens() {
        let overlap = token_overlap("run the tests please", "run tests now");
        // "run" and "tests" match out of 4 query tokens => 0.5
        assert!((overlap - 0.5).abs() < 1e-9);
    }

    #[test]
    fn jaccard_similarity_identical_sets_is_one() {
        let a = token_set("run the tests");
        let b = token_set("tests the run");
        assert!((jaccard_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_similarity_disjoint_sets_is_zero() {
        let a = token_set("alpha beta");
        let b = token_set("gamma delta");
        assert_eq!(jaccard_similarity(&a, &b), 0.0);
    }
}
