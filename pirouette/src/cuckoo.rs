//! Cuckoo hashing of keyword-value pairs into serialized buckets.

use rand::{thread_rng, Rng, RngCore};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};
use crate::sharding::keyword_hash;

/// Per-entry overhead inside a serialized bucket: the 64-bit keyword
/// tag and the 16-bit value length.
const ENTRY_OVERHEAD: usize = 10;
/// The bucket header: a single entry count byte.
const BUCKET_HEADER: usize = 1;

/// How the bucket count evolves under insertion pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketCountConfig {
	/// Rebuild into `⌈count · expansion_factor⌉` buckets when the
	/// eviction budget runs out.
	AllowExpansion {
		/// Growth factor per expansion; must exceed 1.
		expansion_factor: f64,
		/// Initial buckets are sized for `expected_entries` at this
		/// load.
		target_load_factor: f64,
	},
	/// A fixed number of buckets; exhausting evictions is fatal.
	FixedSize {
		/// The immutable bucket count.
		bucket_count: usize,
	},
}

/// Parameters of a cuckoo table.
#[derive(Debug, Clone, PartialEq)]
pub struct CuckooTableConfig {
	/// Number of hash functions, i.e. candidate buckets per keyword.
	/// At most 4: the hashes consume disjoint 64-bit windows of a
	/// single SHA-256 digest.
	pub hash_function_count: usize,
	/// Eviction budget per insert before expanding or failing.
	pub max_eviction_count: usize,
	/// Upper bound on any bucket's serialized size in bytes.
	pub max_serialized_bucket_size: usize,
	/// Maximum entries per bucket.
	pub bucket_count: BucketCountConfig,
	/// Maximum number of entries a bucket may hold.
	pub slot_count: usize,
	/// Partition the table into one sub-table per hash function, the
	/// `j`-th hash addressing only sub-table `j`.
	pub multiple_tables: bool,
}

impl CuckooTableConfig {
	/// Validates the configuration.
	pub fn validate(&self) -> Result<()> {
		if self.hash_function_count == 0 || self.hash_function_count > 4 {
			return Err(Error::InvalidConfig(format!(
				"hash function count must be in 1..=4, got {}",
				self.hash_function_count
			)));
		}
		if self.slot_count == 0 {
			return Err(Error::InvalidConfig("slot count must be positive".to_string()));
		}
		if self.max_serialized_bucket_size < BUCKET_HEADER + ENTRY_OVERHEAD + 1 {
			return Err(Error::InvalidConfig(format!(
				"max serialized bucket size {} cannot hold any entry",
				self.max_serialized_bucket_size
			)));
		}
		match self.bucket_count {
			BucketCountConfig::AllowExpansion {
				expansion_factor,
				target_load_factor,
			} => {
				if expansion_factor <= 1.0 {
					return Err(Error::InvalidConfig(format!(
						"expansion factor must exceed 1, got {expansion_factor}"
					)));
				}
				if !(0.0..=1.0).contains(&target_load_factor) || target_load_factor == 0.0 {
					return Err(Error::InvalidConfig(format!(
						"target load factor must be in (0, 1], got {target_load_factor}"
					)));
				}
			}
			BucketCountConfig::FixedSize {
				bucket_count,
			} => {
				if bucket_count == 0 {
					return Err(Error::InvalidConfig(
						"bucket count must be positive".to_string(),
					));
				}
			}
		}
		Ok(())
	}

	fn table_count(&self) -> usize {
		if self.multiple_tables {
			self.hash_function_count
		} else {
			1
		}
	}
}

/// One stored keyword-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CuckooEntry {
	keyword: Vec<u8>,
	value: Vec<u8>,
}

impl CuckooEntry {
	fn serialized_size(&self) -> usize {
		ENTRY_OVERHEAD + self.value.len()
	}
}

/// A bucket: up to `slot_count` entries whose concatenated
/// serialization fits `max_serialized_bucket_size`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashBucket {
	entries: Vec<CuckooEntry>,
}

impl HashBucket {
	/// Serialized size of a bucket holding values of the given sizes.
	pub fn serialized_size(value_sizes: impl IntoIterator<Item = usize>) -> usize {
		BUCKET_HEADER
			+ value_sizes
				.into_iter()
				.map(|len| ENTRY_OVERHEAD + len)
				.sum::<usize>()
	}

	fn current_size(&self) -> usize {
		Self::serialized_size(self.entries.iter().map(|e| e.value.len()))
	}

	/// Serializes the bucket: an entry count byte, the per-entry
	/// keyword tags and value lengths, then the concatenated values.
	pub fn serialize(&self) -> Result<Vec<u8>> {
		if self.entries.len() > u8::MAX as usize {
			return Err(Error::InvalidSerialization(format!(
				"{} entries exceed the bucket header",
				self.entries.len()
			)));
		}
		let mut out = Vec::with_capacity(self.current_size());
		out.push(self.entries.len() as u8);
		for entry in &self.entries {
			let len = u16::try_from(entry.value.len()).map_err(|_| {
				Error::InvalidSerialization(format!(
					"value of {} bytes exceeds the length field",
					entry.value.len()
				))
			})?;
			out.extend_from_slice(&keyword_hash(&entry.keyword).to_le_bytes());
			out.extend_from_slice(&len.to_le_bytes());
		}
		for entry in &self.entries {
			out.extend_from_slice(&entry.value);
		}
		Ok(out)
	}

	/// Parses a serialized bucket into `(keyword_tag, value)` pairs.
	/// Trailing zero padding is tolerated.
	pub fn deserialize(bytes: &[u8]) -> Result<Vec<(u64, Vec<u8>)>> {
		let count = *bytes
			.first()
			.ok_or_else(|| Error::InvalidSerialization("empty bucket".to_string()))?
			as usize;
		let mut headers = Vec::with_capacity(count);
		let mut offset = BUCKET_HEADER;
		for _ in 0..count {
			let tag = u64::from_le_bytes(
				bytes
					.get(offset..offset + 8)
					.and_then(|b| b.try_into().ok())
					.ok_or_else(|| {
						Error::InvalidSerialization("truncated bucket header".to_string())
					})?,
			);
			let len = u16::from_le_bytes(
				bytes
					.get(offset + 8..offset + 10)
					.and_then(|b| b.try_into().ok())
					.ok_or_else(|| {
						Error::InvalidSerialization("truncated bucket header".to_string())
					})?,
			) as usize;
			headers.push((tag, len));
			offset += ENTRY_OVERHEAD;
		}
		let mut out = Vec::with_capacity(count);
		for (tag, len) in headers {
			let value = bytes
				.get(offset..offset + len)
				.ok_or_else(|| Error::InvalidSerialization("truncated bucket value".to_string()))?
				.to_vec();
			offset += len;
			out.push((tag, value));
		}
		Ok(out)
	}
}

/// A multi-hash table resolving collisions by random eviction walks.
#[derive(Debug, Clone)]
pub struct CuckooTable {
	config: CuckooTableConfig,
	buckets: Vec<HashBucket>,
	entry_count: usize,
}

impl CuckooTable {
	/// Creates an empty table sized for `expected_entries`.
	pub fn new(config: CuckooTableConfig, expected_entries: usize) -> Result<Self> {
		config.validate()?;
		let table_count = config.table_count();
		let bucket_count = match config.bucket_count {
			BucketCountConfig::FixedSize {
				bucket_count,
			} => bucket_count,
			BucketCountConfig::AllowExpansion {
				target_load_factor,
				..
			} => {
				let per_slot_entries = config.slot_count.max(1);
				let wanted = ((expected_entries.max(1) as f64)
					/ (per_slot_entries as f64 * target_load_factor))
					.ceil() as usize;
				round_up_to_multiple(wanted.max(table_count), table_count)
			}
		};
		if bucket_count % table_count != 0 {
			return Err(Error::InvalidConfig(format!(
				"bucket count {bucket_count} is not a multiple of the {table_count} sub-tables"
			)));
		}
		Ok(Self {
			config,
			buckets: vec![HashBucket::default(); bucket_count],
			entry_count: 0,
		})
	}

	/// Returns the table configuration.
	pub fn config(&self) -> &CuckooTableConfig {
		&self.config
	}

	/// Returns the number of buckets.
	pub fn bucket_count(&self) -> usize {
		self.buckets.len()
	}

	/// Returns the number of stored entries.
	pub fn entry_count(&self) -> usize {
		self.entry_count
	}

	/// The candidate bucket indices of a keyword: hash `j` consumes the
	/// `j`-th disjoint 64-bit window of SHA-256 of the keyword. With
	/// multiple tables, hash `j` addresses only sub-table `j`.
	pub fn bucket_indices(keyword: &[u8], config: &CuckooTableConfig, bucket_count: usize) -> Vec<usize> {
		let digest = Sha256::digest(keyword);
		let table_count = config.table_count();
		let per_table = bucket_count / table_count;
		(0..config.hash_function_count)
			.map(|j| {
				let window = u64::from_le_bytes(
					digest[8 * j..8 * (j + 1)].try_into().expect("32-byte digest"),
				);
				if config.multiple_tables {
					j * per_table + (window % per_table as u64) as usize
				} else {
					(window % bucket_count as u64) as usize
				}
			})
			.collect()
	}

	fn indices(&self, keyword: &[u8]) -> Vec<usize> {
		Self::bucket_indices(keyword, &self.config, self.buckets.len())
	}

	/// Inserts a keyword-value pair, evicting and expanding as
	/// configured. Re-inserting an existing keyword overwrites its
	/// value. After a [`Error::CuckooInsertionFailed`] the table state
	/// is undefined and the caller discards it.
	pub fn insert(&mut self, keyword: &[u8], value: &[u8]) -> Result<()> {
		let entry = CuckooEntry {
			keyword: keyword.to_vec(),
			value: value.to_vec(),
		};
		let single = HashBucket::serialized_size([entry.value.len()]);
		if single > self.config.max_serialized_bucket_size || entry.value.len() > u16::MAX as usize
		{
			return Err(Error::EntryTooLarge {
				size: single,
				max: self.config.max_serialized_bucket_size,
			});
		}
		self.insert_entry(entry, &mut thread_rng())
	}

	fn insert_entry<R: RngCore>(&mut self, entry: CuckooEntry, rng: &mut R) -> Result<()> {
		// An existing keyword is overwritten in place.
		let indices = self.indices(&entry.keyword);
		for &b in &indices {
			if let Some(slot) = self.buckets[b]
				.entries
				.iter_mut()
				.find(|e| e.keyword == entry.keyword)
			{
				slot.value = entry.value;
				return Ok(());
			}
		}

		let mut pending = entry;
		let mut remaining_evictions = self.config.max_eviction_count;
		loop {
			let indices = self.indices(&pending.keyword);

			// A bucket with a free slot that still fits the value.
			if let Some(&target) = indices.iter().find(|&&b| {
				let bucket = &self.buckets[b];
				bucket.entries.len() < self.config.slot_count
					&& bucket.current_size() + pending.serialized_size()
						<= self.config.max_serialized_bucket_size
			}) {
				self.buckets[target].entries.push(pending);
				self.entry_count += 1;
				return Ok(());
			}

			if remaining_evictions == 0 {
				if let BucketCountConfig::AllowExpansion {
					expansion_factor,
					..
				} = self.config.bucket_count
				{
					self.expand(expansion_factor, rng)?;
					remaining_evictions = self.config.max_eviction_count;
					continue;
				}
				return Err(Error::CuckooInsertionFailed(self.config.max_eviction_count));
			}

			// Candidate positions whose eviction leaves room.
			let pending_size = pending.serialized_size();
			let max_size = self.config.max_serialized_bucket_size;
			let candidates: Vec<(usize, usize)> = indices
				.iter()
				.flat_map(|&b| {
					let bucket = &self.buckets[b];
					let current = bucket.current_size();
					bucket.entries.iter().enumerate().filter_map(move |(slot, e)| {
						let size_after = current - e.serialized_size() + pending_size;
						(size_after <= max_size).then_some((b, slot))
					})
				})
				.collect();
			if candidates.is_empty() {
				// No eviction can make room; force the expansion path.
				remaining_evictions = 0;
				continue;
			}
			let (bucket, slot) = candidates[rng.gen_range(0..candidates.len())];
			std::mem::swap(&mut self.buckets[bucket].entries[slot], &mut pending);
			remaining_evictions -= 1;
		}
	}

	/// Rebuilds into `⌈count · factor⌉` buckets (rounded up to a
	/// multiple of the sub-table count) and re-inserts every entry.
	fn expand<R: RngCore>(&mut self, factor: f64, rng: &mut R) -> Result<()> {
		let table_count = self.config.table_count();
		let new_count = round_up_to_multiple(
			((self.buckets.len() as f64) * factor).ceil() as usize,
			table_count,
		)
		.max(self.buckets.len() + table_count);
		warn!(
			old = self.buckets.len(),
			new = new_count,
			"expanding cuckoo table"
		);
		let old = std::mem::replace(&mut self.buckets, vec![HashBucket::default(); new_count]);
		self.entry_count = 0;
		for bucket in old {
			for entry in bucket.entries {
				self.insert_entry(entry, rng)?;
			}
		}
		Ok(())
	}

	/// Looks a keyword up: scan the candidate buckets for a matching
	/// tag, then confirm with a full keyword comparison. Client-side
	/// testing only; the PIR server never compares keywords.
	pub fn get(&self, keyword: &[u8]) -> Option<&[u8]> {
		let tag = keyword_hash(keyword);
		for b in self.indices(keyword) {
			for entry in &self.buckets[b].entries {
				if keyword_hash(&entry.keyword) == tag && entry.keyword == keyword {
					return Some(&entry.value);
				}
			}
		}
		None
	}

	/// Serializes every bucket in index order.
	pub fn serialized_buckets(&self) -> Result<Vec<Vec<u8>>> {
		self.buckets.iter().map(HashBucket::serialize).collect()
	}

	/// The largest serialized bucket size currently in the table.
	pub fn max_bucket_size(&self) -> usize {
		self.buckets
			.iter()
			.map(HashBucket::current_size)
			.max()
			.unwrap_or(BUCKET_HEADER)
	}
}

fn round_up_to_multiple(value: usize, multiple: usize) -> usize {
	value.div_ceil(multiple) * multiple
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> CuckooTableConfig {
		CuckooTableConfig {
			hash_function_count: 2,
			max_eviction_count: 100,
			max_serialized_bucket_size: 128,
			bucket_count: BucketCountConfig::AllowExpansion {
				expansion_factor: 1.5,
				target_load_factor: 0.5,
			},
			slot_count: 4,
			multiple_tables: false,
		}
	}

	#[test]
	fn config_validation() {
		assert!(config().validate().is_ok());
		let mut c = config();
		c.hash_function_count = 5;
		assert!(c.validate().is_err());
		let mut c = config();
		c.bucket_count = BucketCountConfig::AllowExpansion {
			expansion_factor: 0.9,
			target_load_factor: 0.5,
		};
		assert!(c.validate().is_err());
		let mut c = config();
		c.max_serialized_bucket_size = 4;
		assert!(c.validate().is_err());
	}

	#[test]
	fn inserted_keys_resolve_to_their_last_value() {
		let mut table = CuckooTable::new(config(), 50).unwrap();
		for i in 0..50u32 {
			table
				.insert(&i.to_le_bytes(), format!("value-{i}").as_bytes())
				.unwrap();
		}
		assert_eq!(table.entry_count(), 50);
		for i in 0..50u32 {
			assert_eq!(
				table.get(&i.to_le_bytes()),
				Some(format!("value-{i}").as_bytes())
			);
		}
		assert_eq!(table.get(b"missing"), None);

		// Overwrites keep the table idempotent per keyword.
		table.insert(&7u32.to_le_bytes(), b"updated").unwrap();
		assert_eq!(table.entry_count(), 50);
		assert_eq!(table.get(&7u32.to_le_bytes()), Some(b"updated".as_slice()));
	}

	#[test]
	fn bucket_sizes_respect_the_limit() {
		let mut table = CuckooTable::new(config(), 100).unwrap();
		for i in 0..100u32 {
			table.insert(&i.to_le_bytes(), &[0u8; 20]).unwrap();
		}
		for bucket in table.serialized_buckets().unwrap() {
			assert!(bucket.len() <= table.config().max_serialized_bucket_size);
		}
	}

	#[test]
	fn expansion_preserves_entries() {
		let mut c = config();
		// Start intentionally tiny so inserts force expansion.
		c.bucket_count = BucketCountConfig::AllowExpansion {
			expansion_factor: 2.0,
			target_load_factor: 0.9,
		};
		let mut table = CuckooTable::new(c, 1).unwrap();
		let initial = table.bucket_count();
		for i in 0..200u32 {
			table.insert(&i.to_le_bytes(), &[1u8; 8]).unwrap();
		}
		assert!(table.bucket_count() > initial);
		for i in 0..200u32 {
			assert_eq!(table.get(&i.to_le_bytes()), Some([1u8; 8].as_slice()));
		}
	}

	#[test]
	fn fixed_size_tables_fail_when_full() {
		let c = CuckooTableConfig {
			hash_function_count: 2,
			max_eviction_count: 10,
			max_serialized_bucket_size: 64,
			bucket_count: BucketCountConfig::FixedSize {
				bucket_count: 2,
			},
			slot_count: 1,
			multiple_tables: false,
		};
		let mut table = CuckooTable::new(c, 4).unwrap();
		let mut failed = false;
		for i in 0..16u32 {
			if table.insert(&i.to_le_bytes(), &[0u8; 4]).is_err() {
				failed = true;
				break;
			}
		}
		assert!(failed);
	}

	#[test]
	fn oversized_entries_are_rejected_up_front() {
		let mut table = CuckooTable::new(config(), 4).unwrap();
		let err = table.insert(b"k", &[0u8; 1000]).unwrap_err();
		assert!(matches!(err, Error::EntryTooLarge { .. }));
	}

	#[test]
	fn multiple_tables_partition_the_buckets() {
		let c = CuckooTableConfig {
			hash_function_count: 2,
			max_eviction_count: 50,
			max_serialized_bucket_size: 128,
			bucket_count: BucketCountConfig::FixedSize {
				bucket_count: 8,
			},
			slot_count: 4,
			multiple_tables: true,
		};
		let indices = CuckooTable::bucket_indices(b"keyword", &c, 8);
		assert_eq!(indices.len(), 2);
		assert!(indices[0] < 4);
		assert!((4..8).contains(&indices[1]));
	}

	#[test]
	fn bucket_serialization_roundtrip() {
		let mut table = CuckooTable::new(config(), 8).unwrap();
		table.insert(b"alpha", b"first").unwrap();
		table.insert(b"beta", b"second").unwrap();
		let mut found = 0;
		for bytes in table.serialized_buckets().unwrap() {
			for (tag, value) in HashBucket::deserialize(&bytes).unwrap() {
				if tag == keyword_hash(b"alpha") {
					assert_eq!(value, b"first");
					found += 1;
				}
				if tag == keyword_hash(b"beta") {
					assert_eq!(value, b"second");
					found += 1;
				}
			}
		}
		assert_eq!(found, 2);

		// Zero padding after the payload is tolerated.
		let mut padded = table.serialized_buckets().unwrap()[0].clone();
		padded.resize(padded.len() + 32, 0);
		HashBucket::deserialize(&padded).unwrap();
	}
}
