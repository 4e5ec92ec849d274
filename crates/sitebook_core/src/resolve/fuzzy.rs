//! Approximate matching of query text against canonical names.
//!
//! # Invariants
//! - Edit distance is plain Levenshtein: unit-cost insert/delete/substitute,
//!   no transpositions.
//! - Domain-suffix words never contribute to a score, on either side.
//! - Ranking is deterministic: score descending, then name ascending.

use std::collections::HashSet;

/// Similarity credited when one side contains the other.
const CONTAINMENT_SIMILARITY: f64 = 0.85;
/// Shortest token or segment allowed to match by containment.
const MIN_CONTAINMENT_LEN: usize = 3;

/// Query words that never identify a project.
const QUERY_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "by", "can", "do", "for", "from", "in", "into", "is", "it",
    "me", "my", "of", "on", "or", "our", "please", "project", "projects", "run", "show", "site",
    "that", "the", "this", "to", "use", "with", "what", "which",
];

/// Outcome of ranking every name against one query.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialMatch {
    /// Exactly one candidate clears the threshold with a clear margin.
    Unique(String),
    /// Several candidates sit within the ambiguity margin of the best.
    Ambiguous(Vec<String>),
    NoMatch,
}

/// Scoring knobs taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy<'a> {
    pub threshold: f64,
    pub margin: f64,
    /// Domain suffix, e.g. `wind-farm`.
    pub suffix: &'a str,
}

/// Unit-cost edit distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars = a.chars().collect::<Vec<_>>();
    let b_chars = b.chars().collect::<Vec<_>>();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous = (0..=b_chars.len()).collect::<Vec<_>>();
    let mut current = vec![0usize; b_chars.len() + 1];
    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(a_char != b_char);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

/// Similarity in `[0, 1]` between one query token and one name segment.
pub fn token_similarity(token: &str, segment: &str) -> f64 {
    if token == segment {
        return 1.0;
    }
    let token_len = token.chars().count();
    let segment_len = segment.chars().count();
    if (token_len >= MIN_CONTAINMENT_LEN && segment.contains(token))
        || (segment_len >= MIN_CONTAINMENT_LEN && token.contains(segment))
    {
        return CONTAINMENT_SIMILARITY;
    }
    let longest = token_len.max(segment_len);
    if longest == 0 {
        return 0.0;
    }
    1.0 - levenshtein(token, segment) as f64 / longest as f64
}

/// Lower-cased alphanumeric words of `query` minus stop words and suffix
/// words.
pub fn query_tokens(query: &str, suffix: &str) -> Vec<String> {
    let suffix_words = suffix_words(suffix);
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 2)
        .filter(|word| !QUERY_STOP_WORDS.contains(word))
        .filter(|word| !suffix_words.contains(word))
        .filter(|word| seen.insert(word.to_string()))
        .map(str::to_string)
        .collect()
}

/// Hyphen-separated segments of `name` minus suffix words.
pub fn name_segments<'n>(name: &'n str, suffix: &str) -> Vec<&'n str> {
    let suffix_words = suffix_words(suffix);
    name.split('-')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !suffix_words.contains(segment))
        .collect()
}

/// Sum of each token's best segment similarity, counting only tokens at or
/// above `threshold`.
pub fn score_name(tokens: &[String], segments: &[&str], threshold: f64) -> f64 {
    tokens
        .iter()
        .filter_map(|token| {
            segments
                .iter()
                .map(|segment| token_similarity(token, segment))
                .fold(None, |best: Option<f64>, value| {
                    Some(best.map_or(value, |b| b.max(value)))
                })
        })
        .filter(|best| *best >= threshold)
        .sum()
}

/// Ranks `names` against `tokens` and classifies the outcome.
pub fn rank_names<'n>(
    tokens: &[String],
    names: impl IntoIterator<Item = &'n String>,
    policy: MatchPolicy<'_>,
) -> PartialMatch {
    if tokens.is_empty() {
        return PartialMatch::NoMatch;
    }

    let mut scored = names
        .into_iter()
        .map(|name| {
            let segments = name_segments(name, policy.suffix);
            (score_name(tokens, &segments, policy.threshold), name)
        })
        .filter(|(score, _)| *score >= policy.threshold)
        .collect::<Vec<_>>();
    scored.sort_by(|(left_score, left_name), (right_score, right_name)| {
        right_score
            .total_cmp(left_score)
            .then_with(|| left_name.cmp(right_name))
    });

    let Some((best, best_name)) = scored.first().copied() else {
        return PartialMatch::NoMatch;
    };
    let contenders = scored
        .iter()
        .take_while(|(score, _)| best - *score < policy.margin)
        .map(|(_, name)| (*name).clone())
        .collect::<Vec<_>>();

    if contenders.len() > 1 {
        PartialMatch::Ambiguous(contenders)
    } else {
        PartialMatch::Unique(best_name.clone())
    }
}

fn suffix_words(suffix: &str) -> Vec<&str> {
    suffix.split('-').filter(|word| !word.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::{levenshtein, query_tokens, rank_names, token_similarity, MatchPolicy, PartialMatch};

    const POLICY: MatchPolicy<'static> = MatchPolicy {
        threshold: 0.75,
        margin: 0.15,
        suffix: "wind-farm",
    };

    #[test]
    fn levenshtein_matches_textbook_cases() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        // Transposition costs two edits.
        assert_eq!(levenshtein("texas", "texsa"), 2);
    }

    #[test]
    fn similarity_prefers_exact_then_containment() {
        assert_eq!(token_similarity("texas", "texas"), 1.0);
        assert_eq!(token_similarity("amar", "amarillo"), 0.85);
        assert!((token_similarity("texs", "texas") - 0.8).abs() < 1e-9);
        assert!(token_similarity("wake", "north") < 0.5);
        // Two-letter tokens only match exactly.
        assert!(token_similarity("tx", "txu") < 0.75);
    }

    #[test]
    fn tokens_drop_stop_and_suffix_words() {
        assert_eq!(
            query_tokens("Run the wind farm analysis for Texas project", "wind-farm"),
            vec!["analysis".to_string(), "texas".to_string()]
        );
    }

    #[test]
    fn shared_segment_is_ambiguous() {
        let names = vec![
            "north-texas-wind-farm".to_string(),
            "south-texas-wind-farm".to_string(),
            "amarillo-tx-wind-farm".to_string(),
        ];
        let tokens = query_tokens("for texas", "wind-farm");
        assert_eq!(
            rank_names(&tokens, &names, POLICY),
            PartialMatch::Ambiguous(vec![
                "north-texas-wind-farm".to_string(),
                "south-texas-wind-farm".to_string(),
            ])
        );
    }

    #[test]
    fn extra_matching_token_breaks_the_tie() {
        let names = vec![
            "north-texas-wind-farm".to_string(),
            "south-texas-wind-farm".to_string(),
        ];
        let tokens = query_tokens("north texas", "wind-farm");
        assert_eq!(
            rank_names(&tokens, &names, POLICY),
            PartialMatch::Unique("north-texas-wind-farm".to_string())
        );
    }

    #[test]
    fn unrelated_query_has_no_match() {
        let names = vec!["north-texas-wind-farm".to_string()];
        let tokens = query_tokens("run wake simulation", "wind-farm");
        assert_eq!(rank_names(&tokens, &names, POLICY), PartialMatch::NoMatch);
    }
}
