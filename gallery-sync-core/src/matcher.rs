//! # matcher: best-match-by-title over two collections
//!
//! Pairs entities that are "probably the same" across two sites by comparing a
//! string key of each (usually the title) with a gestalt similarity ratio.
//!
//! - [`ratio`] scores two strings in `[0, 1]`.
//! - [`match_objects`] picks, for every subject, its single most similar
//!   candidate and accepts it according to a [`MatchPolicy`].
//!
//! When several subjects choose the same candidate, only the last of them is
//! kept. Callers rely on that ordering, so it is part of the contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::tables::DEFAULT_MATCH_THRESHOLD;

/// Minimum length of the second sequence before popular characters are
/// excluded from seeding matches.
const POPULAR_MIN_LEN: usize = 200;

/// How a subject's best candidate is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Accept only when the ratio is at least the given value.
    Threshold(f64),
    /// Accept the best candidate whatever its ratio.
    BestAvailable,
}

impl MatchPolicy {
    pub fn accepts(&self, score: f64) -> bool {
        match self {
            MatchPolicy::Threshold(min) => score >= *min,
            MatchPolicy::BestAvailable => true,
        }
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::Threshold(DEFAULT_MATCH_THRESHOLD)
    }
}

/// An accepted pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<S, C> {
    pub subject: S,
    pub candidate: C,
    pub score: f64,
}

/// Precomputed index over one string, reusable against many others.
pub struct SequenceMatcher {
    b: Vec<char>,
    b2j: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    pub fn new(b: &str) -> Self {
        let b: Vec<char> = b.chars().collect();
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }
        if b.len() >= POPULAR_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }
        Self { b, b2j }
    }

    /// `2 * M / (|a| + |b|)` where `M` is the number of matched characters.
    pub fn ratio_with(&self, a: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let total = a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * self.matched_len(&a) as f64 / total as f64
    }

    fn matched_len(&self, a: &[char]) -> usize {
        let mut matched = 0;
        let mut pending = vec![(0, a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, k) = self.longest_match(a, alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            matched += k;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }
        matched
    }

    /// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`, earliest in `a`
    /// then earliest in `b` on ties.
    fn longest_match(
        &self,
        a: &[char],
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let b = &self.b;
        let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
        let mut run_at: HashMap<usize, usize> = HashMap::new();
        for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut next_run_at = HashMap::new();
            if let Some(positions) = self.b2j.get(c) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = match j.checked_sub(1) {
                        Some(p) => run_at.get(&p).copied().unwrap_or(0),
                        None => 0,
                    };
                    let len = prev + 1;
                    next_run_at.insert(j, len);
                    if len > best_len {
                        best_i = i + 1 - len;
                        best_j = j + 1 - len;
                        best_len = len;
                    }
                }
            }
            run_at = next_run_at;
        }

        // Popular characters never seed a run, but may extend one.
        while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_len += 1;
        }
        while best_i + best_len < ahi
            && best_j + best_len < bhi
            && a[best_i + best_len] == b[best_j + best_len]
        {
            best_len += 1;
        }
        (best_i, best_j, best_len)
    }
}

/// Similarity of two strings in `[0, 1]`; `1.0` for identical strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(b).ratio_with(a)
}

/// Pair every subject with its most similar candidate.
///
/// For each subject, the candidate with the highest [`ratio`] is chosen (the
/// first one on ties) and kept if `policy` accepts its score. Results are
/// keyed by candidate: a later subject choosing an already chosen candidate
/// replaces the earlier pairing in place. Pairs come out in the order their
/// candidate was first chosen.
pub fn match_objects<'s, 'c, S, C, KS, KC>(
    subjects: &'s [S],
    subject_key: KS,
    candidates: &'c [C],
    candidate_key: KC,
    policy: MatchPolicy,
) -> Vec<Match<&'s S, &'c C>>
where
    KS: Fn(&S) -> &str,
    KC: Fn(&C) -> &str,
{
    if subjects.is_empty() || candidates.is_empty() {
        return Vec::new();
    }

    let indexed: Vec<SequenceMatcher> = candidates
        .iter()
        .map(|c| SequenceMatcher::new(candidate_key(c)))
        .collect();

    let mut chosen: Vec<Option<(usize, f64)>> = vec![None; candidates.len()];
    let mut first_chosen: Vec<usize> = Vec::new();

    for (s_idx, subject) in subjects.iter().enumerate() {
        let key = subject_key(subject);
        let mut best: Option<(usize, f64)> = None;
        for (c_idx, matcher) in indexed.iter().enumerate() {
            let score = matcher.ratio_with(key);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((c_idx, score));
            }
        }

        let Some((c_idx, score)) = best else { continue };
        if !policy.accepts(score) {
            trace!(subject = key, score, "Best candidate rejected");
            continue;
        }
        if chosen[c_idx].is_none() {
            first_chosen.push(c_idx);
        }
        chosen[c_idx] = Some((s_idx, score));
    }

    first_chosen
        .into_iter()
        .filter_map(|c_idx| {
            chosen[c_idx].map(|(s_idx, score)| Match {
                subject: &subjects[s_idx],
                candidate: &candidates[c_idx],
                score,
            })
        })
        .collect()
}
