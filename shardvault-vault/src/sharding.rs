//! Deterministic splitting of a buffer into ordered shards.

use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fewest shards a record may be split into.
pub const MIN_SHARDS: u32 = 2;

/// Most shards a record may be split into.
pub const MAX_SHARDS: u32 = 10;

/// A shard count within `MIN_SHARDS..=MAX_SHARDS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct ShardCount(u32);

impl ShardCount {
    /// Clamps `n` into range. Out-of-range values are a configuration slip,
    /// not a fatal error, so they are logged and corrected.
    pub fn new(n: u32) -> Self {
        let clamped = n.clamp(MIN_SHARDS, MAX_SHARDS);
        if clamped != n {
            warn!("shard count {n} out of range, clamped to {clamped}");
        }
        Self(clamped)
    }

    /// Rejects out-of-range values instead of clamping.
    pub fn try_new(n: u32) -> VaultResult<Self> {
        if (MIN_SHARDS..=MAX_SHARDS).contains(&n) {
            Ok(Self(n))
        } else {
            Err(VaultError::InvalidShardCount(n))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for ShardCount {
    fn default() -> Self {
        Self(3)
    }
}

impl From<u32> for ShardCount {
    fn from(n: u32) -> Self {
        Self::new(n)
    }
}

impl From<ShardCount> for u32 {
    fn from(n: ShardCount) -> Self {
        n.0
    }
}

/// Splits `data` into exactly `n` contiguous slices.
///
/// Every slice is at most `ceil(len / n)` bytes. Trailing slices take the
/// remainder and may be shorter or empty; an empty input yields `n` empty
/// slices. Concatenating the slices in order reproduces `data`.
pub fn split(data: &[u8], n: ShardCount) -> Vec<&[u8]> {
    let n = n.get() as usize;
    let len = data.len();
    let size = len.div_ceil(n);

    (0..n)
        .map(|i| {
            let start = (i * size).min(len);
            let end = ((i + 1) * size).min(len);
            &data[start..end]
        })
        .collect()
}

/// Concatenates shards in the order given.
///
/// Completeness and ordering are the caller's responsibility.
pub fn combine<S: AsRef<[u8]>>(shards: &[S]) -> Vec<u8> {
    let total = shards.iter().map(|s| s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for shard in shards {
        out.extend_from_slice(shard.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_counts() {
        assert_eq!(ShardCount::new(0).get(), MIN_SHARDS);
        assert_eq!(ShardCount::new(1).get(), MIN_SHARDS);
        assert_eq!(ShardCount::new(7).get(), 7);
        assert_eq!(ShardCount::new(11).get(), MAX_SHARDS);
        assert_eq!(ShardCount::new(u32::MAX).get(), MAX_SHARDS);
    }

    #[test]
    fn strict_constructor_rejects() {
        assert!(matches!(ShardCount::try_new(1), Err(VaultError::InvalidShardCount(1))));
        assert!(matches!(ShardCount::try_new(11), Err(VaultError::InvalidShardCount(11))));
        assert_eq!(ShardCount::try_new(10).unwrap().get(), 10);
    }

    #[test]
    fn sizes_follow_ceiling_rule() {
        let data = b"0123456789";
        let shards = split(data, ShardCount::new(4));
        let sizes: Vec<usize> = shards.iter().map(|s| s.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn trailing_shards_may_be_empty() {
        let shards = split(b"abcd", ShardCount::new(3));
        assert_eq!(shards, vec![&b"ab"[..], &b"cd"[..], &b""[..]]);
    }

    #[test]
    fn empty_input_yields_n_empty_shards() {
        let shards = split(b"", ShardCount::new(5));
        assert_eq!(shards.len(), 5);
        assert!(shards.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn combine_inverts_split() {
        let data = "héllo wörld, ünïcode ✓".as_bytes();
        for n in MIN_SHARDS..=MAX_SHARDS {
            let shards = split(data, ShardCount::new(n));
            assert_eq!(shards.len(), n as usize);
            assert_eq!(combine(&shards), data);
        }
    }

    #[test]
    fn serde_clamps() {
        let n: ShardCount = serde_json::from_str("42").unwrap();
        assert_eq!(n.get(), MAX_SHARDS);
        assert_eq!(serde_json::to_string(&ShardCount::new(4)).unwrap(), "4");
    }
}
