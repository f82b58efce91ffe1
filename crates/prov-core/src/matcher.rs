//! Tiered name matching
//!
//! Listing text is compared to the query with progressively looser rules:
//! trimmed equality, then case-folded equality, then equality after
//! collapsing whitespace runs. All rows are tried at one tier before moving
//! to the next, so an exact hit anywhere beats a looser hit earlier in the
//! listing.

use crate::types::MatchTier;

/// Collapse every whitespace run to one space and trim
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

fn fold_collapsed(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

/// Tier at which `candidate` matches `query`
#[must_use]
pub fn tier_for(candidate: &str, query: &str) -> MatchTier {
    if candidate.trim() == query.trim() {
        MatchTier::Exact
    } else if fold(candidate) == fold(query) {
        MatchTier::CaseInsensitive
    } else if fold_collapsed(candidate) == fold_collapsed(query) {
        MatchTier::WhitespaceNormalized
    } else {
        MatchTier::NotFound
    }
}

/// Best match for `query` among `candidates`
///
/// Returns the tier and the index of the first candidate matching at the
/// strongest tier, or `None` when nothing matches.
#[must_use]
pub fn best_match<S: AsRef<str>>(candidates: &[S], query: &str) -> Option<(MatchTier, usize)> {
    let query_trimmed = query.trim();
    if let Some(i) = candidates
        .iter()
        .position(|c| c.as_ref().trim() == query_trimmed)
    {
        return Some((MatchTier::Exact, i));
    }

    let query_folded = fold(query);
    if let Some(i) = candidates.iter().position(|c| fold(c.as_ref()) == query_folded) {
        return Some((MatchTier::CaseInsensitive, i));
    }

    let query_collapsed = fold_collapsed(query);
    candidates
        .iter()
        .position(|c| fold_collapsed(c.as_ref()) == query_collapsed)
        .map(|i| (MatchTier::WhitespaceNormalized, i))
}

/// Up to `limit` candidates that share text with `query`
///
/// Candidates containing the query (or contained by it) rank first, then
/// candidates by longest shared substring of at least three characters.
/// Diagnostic output only; never a match.
#[must_use]
pub fn similar_candidates<S: AsRef<str>>(candidates: &[S], query: &str, limit: usize) -> Vec<String> {
    let q = fold_collapsed(query);
    if q.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &str)> = Vec::new();
    for candidate in candidates {
        let original = candidate.as_ref().trim();
        let c = fold_collapsed(original);
        if c.is_empty() || scored.iter().any(|(_, seen)| *seen == original) {
            continue;
        }
        let score = if c.contains(&q) || q.contains(&c) {
            1000 + c.chars().count().min(q.chars().count())
        } else {
            let common = longest_common_substring(&c, &q);
            if common < 3 {
                continue;
            }
            common
        };
        scored.push((score, original));
    }

    // stable: equal scores keep listing order
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, s)| s.to_string())
        .collect()
}

fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;

    for ca in &a {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                row[j + 1] = prev[j] + 1;
                best = best.max(row[j + 1]);
            }
        }
        prev = row;
    }
    best
}
