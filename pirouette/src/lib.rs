//! Private information retrieval over BFV homomorphic encryption.
//!
//! The crate layers the MulPIR index protocol and keyword PIR (cuckoo
//! hashing, sharding, optional OPRF-based symmetric PIR) on top of the
//! [`pirouette_bfv`] engine.
//!
//! # Example
//!
//! ```rust
//! use pirouette::{
//!     BucketCountConfig, CuckooTableConfig, KeyCompression, KeywordPirClient,
//!     KeywordPirConfig, KeywordPirServer, PirAlgorithm,
//! };
//! use pirouette_bfv::{Context, EncryptionParametersBuilder, EvaluationKeyBuilder, SecretKey};
//!
//! fn main() -> anyhow::Result<()> {
//!     let context = Context::new(
//!         EncryptionParametersBuilder::new()
//!             .set_degree(64)
//!             .set_plain_modulus(257)
//!             .set_coefficient_moduli_bits(vec![30, 30])
//!             .build()?,
//!     )?;
//!     let rows = vec![(b"key".to_vec(), b"value".to_vec())];
//!     let config = KeywordPirConfig {
//!         cuckoo: CuckooTableConfig {
//!             hash_function_count: 2,
//!             max_eviction_count: 100,
//!             max_serialized_bucket_size: 64,
//!             bucket_count: BucketCountConfig::AllowExpansion {
//!                 expansion_factor: 1.5,
//!                 target_load_factor: 0.7,
//!             },
//!             slot_count: 3,
//!             multiple_tables: false,
//!         },
//!         dimension_count: 2,
//!         key_compression: KeyCompression::None,
//!         algorithm: PirAlgorithm::MulPir,
//!     };
//!     let server = KeywordPirServer::process(&context, &config, &rows)?;
//!
//!     let secret_key = SecretKey::random(&context)?;
//!     let evaluation_key = EvaluationKeyBuilder::with_config(
//!         &secret_key,
//!         &server.parameter().index.evaluation_key_config,
//!     )
//!     .build()?;
//!
//!     let client = KeywordPirClient::new(&context, server.parameter().clone());
//!     let query = client.generate_query(b"key", &secret_key)?;
//!     let response = server.respond(&query, &evaluation_key)?;
//!     let value = client.decode_response(&response, b"key", &secret_key)?;
//!     assert_eq!(value.as_deref(), Some(b"value".as_slice()));
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

mod config;
mod cuckoo;
mod database;
mod error;
mod format;
mod index_pir;
mod keyword_pir;
mod sharding;
mod symmetric_pir;

pub use config::PirAlgorithm;
pub use cuckoo::{BucketCountConfig, CuckooTable, CuckooTableConfig, HashBucket};
pub use database::{
	bits_per_coefficient, bytes_per_plaintext, bytes_to_coefficients, coefficients_to_bytes,
	decode_entry, encode_entry,
};
pub use error::{Error, Result};
pub use format::{
	read_shard_rows, write_shard_rows, KeywordPirParametersRecord, PirParametersRecord,
	PlaintextRecord, ProcessedDatabaseRecord, SchemeTag,
};
pub use index_pir::{
	derive_dimensions, expand_ciphertext, expansion_key_config, IndexPirClient, IndexPirConfig,
	IndexPirParameter, IndexPirServer, KeyCompression, Query, Response,
};
pub use keyword_pir::{
	process_database, KeywordDatabase, KeywordPirClient, KeywordPirConfig, KeywordPirParameter,
	KeywordPirServer, ProcessedKeywordDatabase,
};
pub use sharding::{keyword_hash, Sharding, ShardingFunction};
pub use symmetric_pir::{
	keyword_tag, open_value, seal_value, OprfBlindState, OprfClient, OprfSecretKey, OprfServer,
	SymmetricPirConfig, SymmetricPirConfigType, KEYWORD_TAG_SIZE, NONCE_SIZE, OPRF_OUTPUT_SIZE,
	VALUE_KEY_SIZE,
};
