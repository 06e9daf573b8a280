//! Revision identifiers.
//!
//! A revision id is `<generation>-<digest>`. The generation counts saves
//! along one line of history; the digest is a SHA-256 prefix over the
//! parent revision, the deletion flag and the encoded body. Two stores that
//! derive a revision from the same inputs get the same id, which is what
//! lets replicas recognise revisions they already hold.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of digest bytes kept in a revision id.
const DIGEST_BYTES: usize = 20;

/// Identifier of one persisted version of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId {
    generation: u64,
    digest: String,
}

impl RevisionId {
    /// Builds a revision id from its parts.
    ///
    /// # Errors
    ///
    /// Returns a validation error for generation 0 or a digest that is
    /// empty or not lowercase hex.
    pub fn new(generation: u64, digest: impl Into<String>) -> CoreResult<Self> {
        let digest = digest.into();
        if generation == 0 {
            return Err(CoreError::validation("revision generation must be >= 1"));
        }
        if digest.is_empty()
            || !digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(CoreError::validation(format!(
                "revision digest {digest:?} is not lowercase hex"
            )));
        }
        Ok(Self { generation, digest })
    }

    /// Derives the revision that follows `parent`.
    pub fn derive(parent: Option<&RevisionId>, deleted: bool, body: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        if let Some(parent) = parent {
            hasher.update(parent.to_string().as_bytes());
        }
        hasher.update([0u8, u8::from(deleted)]);
        hasher.update(body);
        Self {
            generation: parent.map_or(1, |p| p.generation + 1),
            digest: hex::encode(&hasher.finalize()[..DIGEST_BYTES]),
        }
    }

    /// Derives the revision that resolves the conflict between `a` and `b`.
    ///
    /// The result does not depend on argument order, so every replica that
    /// resolves the same pair the same way reaches the same id.
    pub fn merged(a: &RevisionId, b: &RevisionId, deleted: bool, body: &[u8]) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(low.to_string().as_bytes());
        hasher.update([b'+']);
        hasher.update(high.to_string().as_bytes());
        hasher.update([1u8, u8::from(deleted)]);
        hasher.update(body);
        Self {
            generation: a.generation.max(b.generation) + 1,
            digest: hex::encode(&hasher.finalize()[..DIGEST_BYTES]),
        }
    }

    /// The generation number.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The digest part.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.digest)
    }
}

impl FromStr for RevisionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, digest) = s
            .split_once('-')
            .ok_or_else(|| CoreError::validation(format!("malformed revision id {s:?}")))?;
        let generation = generation
            .parse::<u64>()
            .map_err(|_| CoreError::validation(format!("malformed revision id {s:?}")))?;
        Self::new(generation, digest)
    }
}

impl TryFrom<String> for RevisionId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RevisionId> for String {
    fn from(rev: RevisionId) -> Self {
        rev.to_string()
    }
}

/// Prepends `current` to `parent_history`, newest first, capped at `max`.
pub(crate) fn extend_history(
    current: &RevisionId,
    parent_history: &[RevisionId],
    max: usize,
) -> Vec<RevisionId> {
    let mut history = Vec::with_capacity(max.min(parent_history.len() + 1));
    history.push(current.clone());
    history.extend(
        parent_history
            .iter()
            .take(max.saturating_sub(1))
            .cloned(),
    );
    history
}

/// History of a merge revision: the union of both sides, newest first.
pub(crate) fn merge_history(
    merged: &RevisionId,
    left: &[RevisionId],
    right: &[RevisionId],
    max: usize,
) -> Vec<RevisionId> {
    let mut ancestors: Vec<RevisionId> = left.iter().chain(right).cloned().collect();
    ancestors.sort_unstable_by(|a, b| b.cmp(a));
    ancestors.dedup();
    extend_history(merged, &ancestors, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_revision_is_generation_one() {
        let rev = RevisionId::derive(None, false, b"body");
        assert_eq!(rev.generation(), 1);
        assert_eq!(rev.digest().len(), DIGEST_BYTES * 2);
        assert!(rev.to_string().starts_with("1-"));
    }

    #[test]
    fn derivation_is_deterministic() {
        let parent = RevisionId::derive(None, false, b"a");
        let x = RevisionId::derive(Some(&parent), false, b"b");
        let y = RevisionId::derive(Some(&parent), false, b"b");
        assert_eq!(x, y);
        assert_eq!(x.generation(), 2);

        let tombstone = RevisionId::derive(Some(&parent), true, b"b");
        assert_ne!(x, tombstone);
    }

    #[test]
    fn merged_ignores_argument_order() {
        let base = RevisionId::derive(None, false, b"base");
        let left = RevisionId::derive(Some(&base), false, b"left");
        let right = RevisionId::derive(Some(&left), false, b"right");

        let one = RevisionId::merged(&left, &right, false, b"right");
        let two = RevisionId::merged(&right, &left, false, b"right");
        assert_eq!(one, two);
        assert_eq!(one.generation(), 4);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<RevisionId>().is_err());
        assert!("abc".parse::<RevisionId>().is_err());
        assert!("0-abc".parse::<RevisionId>().is_err());
        assert!("3-XYZ".parse::<RevisionId>().is_err());
        assert!("3-".parse::<RevisionId>().is_err());
        assert_eq!("3-0af".parse::<RevisionId>().unwrap().generation(), 3);
    }

    #[test]
    fn history_is_capped_and_newest_first() {
        let mut history = Vec::new();
        let mut parent = None;
        for i in 0..10u8 {
            let rev = RevisionId::derive(parent.as_ref(), false, &[i]);
            history = extend_history(&rev, &history, 4);
            parent = Some(rev);
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].generation(), 10);
        assert_eq!(history[3].generation(), 7);
    }

    #[test]
    fn merge_history_unions_both_sides() {
        let a1 = RevisionId::derive(None, false, b"a");
        let b2 = RevisionId::derive(Some(&a1), false, b"b");
        let c2 = RevisionId::derive(Some(&a1), false, b"c");
        let merged = RevisionId::merged(&b2, &c2, false, b"c");

        let history = merge_history(&merged, &[b2.clone(), a1.clone()], &[c2.clone(), a1.clone()], 20);
        assert_eq!(history[0], merged);
        assert_eq!(history.len(), 4);
        assert!(history.contains(&b2) && history.contains(&c2) && history.contains(&a1));
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(generation in 1u64..1_000_000, body in prop::collection::vec(any::<u8>(), 0..64)) {
            let rev = RevisionId::derive(None, false, &body);
            let rev = RevisionId::new(generation, rev.digest()).unwrap();
            let parsed: RevisionId = rev.to_string().parse().unwrap();
            prop_assert_eq!(parsed, rev);
        }
    }
}
