//! Deterministic keyword-to-shard assignment.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Truncates SHA-256 of the keyword to its first 64 bits,
/// little-endian.
pub fn keyword_hash(keyword: &[u8]) -> u64 {
	let digest = Sha256::digest(keyword);
	u64::from_le_bytes(digest[..8].try_into().expect("digest has 32 bytes"))
}

/// The pure function assigning keywords to shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardingFunction {
	/// `shard(k) = truncate64(SHA256(k)) mod shardCount`.
	Sha256,
	/// `shard(k) = (truncate64(SHA256(k)) mod otherShardCount) mod
	/// shardCount`; useful when one usecase logically sub-shards
	/// another.
	DoubleMod {
		/// The outer shard count being sub-sharded.
		other_shard_count: usize,
	},
}

impl ShardingFunction {
	/// Computes the shard for a keyword.
	pub fn shard(&self, keyword: &[u8], shard_count: usize) -> usize {
		debug_assert!(shard_count > 0);
		let hash = keyword_hash(keyword);
		match self {
			ShardingFunction::Sha256 => (hash % shard_count as u64) as usize,
			ShardingFunction::DoubleMod {
				other_shard_count,
			} => ((hash % *other_shard_count as u64) % shard_count as u64) as usize,
		}
	}
}

/// How the number of shards is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sharding {
	/// An exact shard count.
	ShardCount(usize),
	/// A target entry count per shard, resolved to
	/// `⌊totalRows / entryCountPerShard⌋` shards (minimum 1). The floor
	/// guarantees a lower bound on shard size, which bounds the
	/// information a shard choice leaks.
	EntryCountPerShard(usize),
}

impl Sharding {
	/// Validates the variant's parameter.
	pub fn validate(&self) -> Result<()> {
		match self {
			Sharding::ShardCount(0) => {
				Err(Error::InvalidConfig("shard count must be positive".to_string()))
			}
			Sharding::EntryCountPerShard(0) => Err(Error::InvalidConfig(
				"entry count per shard must be positive".to_string(),
			)),
			_ => Ok(()),
		}
	}

	/// Resolves the shard count for a database of `total_rows` rows.
	pub fn shard_count(&self, total_rows: usize) -> usize {
		match self {
			Sharding::ShardCount(n) => *n,
			Sharding::EntryCountPerShard(e) => (total_rows / e).max(1),
		}
	}
}
