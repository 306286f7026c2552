// Fuzzy title scoring. Scores are in [0, 1], lower is better; candidates
// scoring above `MATCH_THRESHOLD` are not matches.
//
// Tiers, best first: exact, substring, in-order subsequence, and substring
// within a small edit distance.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Worst score still counted as a match.
pub const MATCH_THRESHOLD: f64 = 0.6;

const SUBSTRING_BASE: f64 = 0.05;
const SUBSEQUENCE_BASE: f64 = 0.3;
const TYPO_BASE: f64 = 0.35;
/// Largest share of query characters that may be edits in the typo tier.
const MAX_TYPO_RATIO: f64 = 0.25;

pub struct TitleScorer {
    matcher: SkimMatcherV2,
}

impl Default for TitleScorer {
    fn default() -> Self {
        Self { matcher: SkimMatcherV2::default().ignore_case() }
    }
}

impl TitleScorer {
    pub fn score(&self, query: &str, candidate: &str) -> Option<f64> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        let candidate = candidate.to_lowercase();
        if candidate.is_empty() {
            return None;
        }
        if candidate == query {
            return Some(0.0);
        }

        let query_len = query.chars().count();
        let candidate_len = candidate.chars().count() as f64;

        if let Some(byte_pos) = candidate.find(&query) {
            let position = candidate[..byte_pos].chars().count() as f64;
            let coverage = query_len as f64 / candidate_len;
            // Earlier and fuller matches rank higher.
            return Some(SUBSTRING_BASE + 0.1 * (position / candidate_len) + 0.1 * (1.0 - coverage));
        }

        if let Some((_, indices)) = self.matcher.fuzzy_indices(&candidate, &query) {
            if let (Some(first), Some(last)) = (indices.first(), indices.last()) {
                let gaps = (last - first + 1).saturating_sub(query_len) as f64;
                let value = SUBSEQUENCE_BASE + 0.3 * (gaps / candidate_len);
                if value <= MATCH_THRESHOLD {
                    return Some(value);
                }
            }
        }

        let query_chars: Vec<char> = query.chars().collect();
        let candidate_chars: Vec<char> = candidate.chars().collect();
        let edits = substring_edit_distance(&query_chars, &candidate_chars) as f64;
        let ratio = edits / query_len as f64;
        if query_len >= 3 && ratio <= MAX_TYPO_RATIO {
            return Some(TYPO_BASE + ratio);
        }

        None
    }
}

/// Minimum edits turning `query` into any substring of `candidate`.
fn substring_edit_distance(query: &[char], candidate: &[char]) -> usize {
    // previous[j]: best distance of query[..i] ending at candidate[..j].
    let mut previous = vec![0usize; candidate.len() + 1];
    let mut current = vec![0usize; candidate.len() + 1];

    for (i, q) in query.iter().enumerate() {
        current[0] = i + 1;
        for (j, c) in candidate.iter().enumerate() {
            let substitution = previous[j] + usize::from(q != c);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous.into_iter().min().unwrap_or(query.len())
}
