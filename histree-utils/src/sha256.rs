//! sha2-256 based aggregation
use crate::error::Error;
use histree::Aggregation;
use sha2::{Digest, Sha256};
use std::{convert::TryInto, fmt, str::FromStr};

const LEAF: u8 = 0;
const BRANCH: u8 = 1;
const OPEN_BRANCH: u8 = 2;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    fn hash(prefix: u8, left: &[u8], right: &[u8]) -> Self {
        let result = Sha256::new()
            .chain_update([prefix])
            .chain_update(left)
            .chain_update(right)
            .finalize();
        Sha256Digest(result.into())
    }

    pub fn read(data: &[u8]) -> Result<Self, Error> {
        let digest: [u8; 32] = data
            .try_into()
            .map_err(|_| Error::InvalidDigestLength(data.len()))?;
        Ok(Self(digest))
    }
}

impl AsRef<[u8]> for Sha256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // abbreviated, the full digest makes tree dumps unreadable
        write!(f, "{}", &hex::encode(self.as_ref())[..8])
    }
}

impl FromStr for Sha256Digest {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::read(&hex::decode(s)?)
    }
}

/// Domain separated sha2-256 over byte values.
///
/// Leaves, complete branches and branches with an empty right subtree get distinct prefixes, so
/// an aggregate can never be mistaken for one of a different kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Agg;

impl Aggregation for Sha256Agg {
    type Agg = Sha256Digest;
    type Value = Vec<u8>;

    fn map_value(&self, value: &Vec<u8>) -> Sha256Digest {
        Sha256Digest::hash(LEAF, value, &[])
    }

    fn combine(&self, left: &Sha256Digest, right: &Sha256Digest) -> Sha256Digest {
        Sha256Digest::hash(BRANCH, left.as_ref(), right.as_ref())
    }

    fn combine_open(&self, left: &Sha256Digest) -> Sha256Digest {
        Sha256Digest::hash(OPEN_BRANCH, left.as_ref(), &[])
    }

    fn serialize_agg(&self, agg: &Sha256Digest) -> Vec<u8> {
        agg.as_ref().to_vec()
    }

    fn serialize_value(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }

    fn parse_agg(&self, data: &[u8]) -> anyhow::Result<Sha256Digest> {
        Ok(Sha256Digest::read(data)?)
    }

    fn parse_value(&self, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_separated() {
        let agg = Sha256Agg;
        let a = agg.map_value(&b"a".to_vec());
        assert_ne!(agg.combine_open(&a), agg.combine(&a, &a));
        assert_ne!(agg.combine_open(&a), agg.map_value(&a.as_ref().to_vec()));
    }

    #[test]
    fn hex_roundtrip() -> anyhow::Result<()> {
        let digest = Sha256Agg.map_value(&b"hello".to_vec());
        let text = digest.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<Sha256Digest>()?, digest);
        assert!("abcd".parse::<Sha256Digest>().is_err());
        assert!("not hex".parse::<Sha256Digest>().is_err());
        Ok(())
    }
}
