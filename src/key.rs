//! Partition and clustering keys.

use bytes::Bytes;

/// A partition key together with its token.
///
/// Partitions are ordered by `(token, key)`; the token is a stable hash of
/// the raw key bytes, so partition order is scattered relative to key
/// order, like any hash-partitioned store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratedKey {
    token: u64,
    key: Bytes,
}

impl DecoratedKey {
    pub fn new(key: impl Into<Bytes>) -> Self {
        let key = key.into();
        let token = token_of(key.as_ref());
        Self { token, key }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// The clustering key of a row within its partition, ordered bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusteringKey(Bytes);

impl ClusteringKey {
    pub fn new(key: impl Into<Bytes>) -> Self {
        Self(key.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl AsRef<[u8]> for ClusteringKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

pub fn token_of(key: &[u8]) -> u64 {
    use std::hash::Hasher;
    let mut hasher = ahash::AHasher::default();
    hasher.write(key);
    hasher.finish()
}
