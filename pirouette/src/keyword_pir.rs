//! Keyword PIR: cuckoo-hashed buckets retrieved through index PIR.

use std::collections::BTreeMap;
use std::sync::Arc;

use pirouette_bfv::{Context, EvaluationKey, EvaluationKeyConfig, SecretKey};
use rayon::prelude::*;
use tracing::info;

use crate::config::PirAlgorithm;
use crate::cuckoo::{CuckooTable, CuckooTableConfig, HashBucket};
use crate::error::Result;
use crate::index_pir::{
	IndexPirClient, IndexPirConfig, IndexPirParameter, IndexPirServer, KeyCompression, Query,
	Response,
};
use crate::sharding::{keyword_hash, Sharding, ShardingFunction};

/// Configuration of a keyword-PIR deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordPirConfig {
	/// The cuckoo table holding the keyword-value pairs.
	pub cuckoo: CuckooTableConfig,
	/// Hypercube dimensions of the underlying index PIR.
	pub dimension_count: usize,
	/// Galois key thinning strategy.
	pub key_compression: KeyCompression,
	/// The PIR algorithm; only MulPIR is accepted.
	pub algorithm: PirAlgorithm,
}

impl KeywordPirConfig {
	/// Validates the configuration.
	pub fn validate(&self) -> Result<()> {
		self.algorithm.validate()?;
		self.cuckoo.validate()
	}
}

/// The parameters a keyword-PIR client needs: the cuckoo geometry and
/// the derived index-PIR parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordPirParameter {
	/// The cuckoo table configuration (hash count, bucket limits).
	pub cuckoo: CuckooTableConfig,
	/// The frozen bucket count.
	pub bucket_count: usize,
	/// The padded serialized bucket size, i.e. the index-PIR entry size.
	pub entry_size: usize,
	/// The underlying index-PIR parameters.
	pub index: IndexPirParameter,
}

/// The server side of keyword PIR over one shard.
pub struct KeywordPirServer {
	parameter: KeywordPirParameter,
	index: IndexPirServer,
}

impl KeywordPirServer {
	/// Builds the cuckoo table from the shard's rows, freezes it, and
	/// packs the zero-padded buckets as the index-PIR database.
	pub fn process(
		context: &Arc<Context>,
		config: &KeywordPirConfig,
		rows: &[(Vec<u8>, Vec<u8>)],
	) -> Result<Self> {
		config.validate()?;
		let mut table = CuckooTable::new(config.cuckoo.clone(), rows.len())?;
		for (keyword, value) in rows {
			table.insert(keyword, value)?;
		}

		let entry_size = table.max_bucket_size().max(1);
		let buckets: Vec<Vec<u8>> = table
			.serialized_buckets()?
			.into_iter()
			.map(|mut bucket| {
				bucket.resize(entry_size, 0);
				bucket
			})
			.collect();

		let index_config = IndexPirConfig {
			entry_count: buckets.len(),
			entry_size,
			dimension_count: config.dimension_count,
			key_compression: config.key_compression,
			batch_size: config.cuckoo.hash_function_count,
			algorithm: config.algorithm,
		};
		let index = IndexPirServer::new(context, &index_config, &buckets)?;

		info!(
			rows = rows.len(),
			buckets = buckets.len(),
			bucket_size = entry_size,
			"processed keyword PIR shard"
		);

		Ok(Self {
			parameter: KeywordPirParameter {
				cuckoo: table.config().clone(),
				bucket_count: buckets.len(),
				entry_size,
				index: index.parameter().clone(),
			},
			index,
		})
	}

	/// Returns the parameters a client needs.
	pub fn parameter(&self) -> &KeywordPirParameter {
		&self.parameter
	}

	/// Answers the batched bucket queries.
	pub fn respond(&self, query: &Query, key: &EvaluationKey) -> Result<Response> {
		self.index.respond(query, key)
	}

	/// Probes the full pipeline under the caller's own key, returning
	/// the measured noise budget.
	pub fn validate(&self, secret_key: &SecretKey, key: &EvaluationKey) -> Result<u32> {
		self.index.validate(secret_key, key)
	}
}

/// The client side of keyword PIR.
pub struct KeywordPirClient {
	context: Arc<Context>,
	parameter: KeywordPirParameter,
	index: IndexPirClient,
}

impl KeywordPirClient {
	/// Creates a client for the given deployment parameters.
	pub fn new(context: &Arc<Context>, parameter: KeywordPirParameter) -> Self {
		let index = IndexPirClient::new(context, parameter.index.clone());
		Self {
			context: context.clone(),
			parameter,
			index,
		}
	}

	/// Issues the `hashFunctionCount` bucket queries of a keyword,
	/// batched into shared ciphertexts when they fit.
	pub fn generate_query(&self, keyword: &[u8], secret_key: &SecretKey) -> Result<Query> {
		let indices =
			CuckooTable::bucket_indices(keyword, &self.parameter.cuckoo, self.parameter.bucket_count);
		self.index.generate_query(&indices, secret_key)
	}

	/// Decrypts the returned buckets and searches them locally for the
	/// keyword, returning its value when present.
	pub fn decode_response(
		&self,
		response: &Response,
		keyword: &[u8],
		secret_key: &SecretKey,
	) -> Result<Option<Vec<u8>>> {
		let buckets =
			self.index
				.decode_response(response, self.parameter.entry_size, secret_key)?;
		let tag = keyword_hash(keyword);
		for bucket in buckets {
			for (entry_tag, value) in HashBucket::deserialize(&bucket)? {
				if entry_tag == tag {
					return Ok(Some(value));
				}
			}
		}
		Ok(None)
	}

	/// Returns the context this client operates over.
	pub fn context(&self) -> &Arc<Context> {
		&self.context
	}
}

/// A keyword database split into shards by a deterministic sharding
/// function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordDatabase {
	/// Rows grouped by shard identifier.
	pub shards: BTreeMap<usize, Vec<(Vec<u8>, Vec<u8>)>>,
}

impl KeywordDatabase {
	/// Shards rows; the shard of a row is a pure function of its
	/// keyword, the sharding function, and the shard count.
	pub fn shard(
		rows: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
		function: ShardingFunction,
		sharding: Sharding,
	) -> Result<Self> {
		sharding.validate()?;
		let rows: Vec<(Vec<u8>, Vec<u8>)> = rows.into_iter().collect();
		let shard_count = sharding.shard_count(rows.len());
		let mut shards: BTreeMap<usize, Vec<(Vec<u8>, Vec<u8>)>> = BTreeMap::new();
		for (keyword, value) in rows {
			let shard = function.shard(&keyword, shard_count);
			shards.entry(shard).or_default().push((keyword, value));
		}
		Ok(Self {
			shards,
		})
	}
}

/// All shards of a processed keyword database, plus the union of their
/// evaluation-key requirements.
pub struct ProcessedKeywordDatabase {
	/// Processed servers by shard identifier.
	pub shards: BTreeMap<usize, KeywordPirServer>,
	/// The pointwise union of every shard's key config; one evaluation
	/// key generated from it serves all shards.
	pub evaluation_key_config: EvaluationKeyConfig,
}

/// Processes every shard of a database, in parallel across shards.
pub fn process_database(
	context: &Arc<Context>,
	config: &KeywordPirConfig,
	database: &KeywordDatabase,
) -> Result<ProcessedKeywordDatabase> {
	config.validate()?;
	let shards: BTreeMap<usize, KeywordPirServer> = database
		.shards
		.par_iter()
		.map(|(&id, rows)| Ok((id, KeywordPirServer::process(context, config, rows)?)))
		.collect::<Result<_>>()?;
	let evaluation_key_config = shards
		.values()
		.map(|s| s.parameter().index.evaluation_key_config.clone())
		.fold(EvaluationKeyConfig::default(), |acc, c| acc.union(&c));
	Ok(ProcessedKeywordDatabase {
		shards,
		evaluation_key_config,
	})
}
