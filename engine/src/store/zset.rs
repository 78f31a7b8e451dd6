//! Ordered set keyed by an exact u64 score.
//!
//! Members are unique; inserting an existing member replaces its score.
//! Iteration order is (score, member) ascending, which gives the packed
//! scores their FIFO tiebreak for free.

use std::collections::BTreeSet;

use compact_str::CompactString;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct ZSet {
    ordered: BTreeSet<(u64, CompactString)>,
    scores: FxHashMap<CompactString, u64>,
}

impl ZSet {
    pub fn insert(&mut self, member: &str, score: u64) {
        let member = CompactString::from(member);
        if let Some(old) = self.scores.insert(member.clone(), score) {
            self.ordered.remove(&(old, member.clone()));
        }
        self.ordered.insert((score, member));
    }

    #[inline]
    pub fn score(&self, member: &str) -> Option<u64> {
        self.scores.get(member).copied()
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, CompactString::from(member)));
                true
            }
            None => false,
        }
    }

    pub fn pop_min(&mut self) -> Option<(CompactString, u64)> {
        let (score, member) = self.ordered.iter().next().cloned()?;
        self.ordered.remove(&(score, member.clone()));
        self.scores.remove(&member);
        Some((member, score))
    }

    pub fn peek_min(&self) -> Option<(CompactString, u64)> {
        self.ordered
            .iter()
            .next()
            .map(|(score, member)| (member.clone(), *score))
    }

    /// Remove and return up to `limit` members with score <= `max_score`,
    /// lowest first.
    pub fn pop_below(&mut self, max_score: u64, limit: usize) -> Vec<(CompactString, u64)> {
        let mut out = Vec::new();
        while out.len() < limit {
            let next = match self.ordered.iter().next() {
                Some(&(score, ref member)) if score <= max_score => (member.clone(), score),
                _ => break,
            };
            self.ordered.remove(&(next.1, next.0.clone()));
            self.scores.remove(&next.0);
            out.push(next);
        }
        out
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[inline]
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, u64)> {
        self.ordered.iter().map(|(score, member)| (member, *score))
    }
}
