//! Processed-database records and shard files.
//!
//! A processed database travels in two isomorphic encodings: a textual
//! form with one JSON record per line (byte fields hex-encoded), and a
//! compact binary form with length-prefixed raw plaintext streams.

use std::sync::Arc;

use pirouette_bfv::{Context, EncryptionParameters, EvaluationKeyConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index_pir::{IndexPirParameter, IndexPirServer, KeyCompression};
use crate::sharding::ShardingFunction;
use crate::symmetric_pir::SymmetricPirConfig;

const BINARY_MAGIC: &[u8; 4] = b"PPDB";

/// The scheme a processed database was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemeTag {
	/// The BFV scheme.
	Bfv,
}

/// The index-PIR section of a processed-database record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PirParametersRecord {
	/// Number of database entries.
	pub entry_count: usize,
	/// Entry size in bytes.
	pub entry_size: usize,
	/// Hypercube dimensions.
	pub dimensions: Vec<usize>,
	/// Plaintexts per entry.
	pub chunk_count: usize,
	/// Indices per query.
	pub batch_size: usize,
	/// Required key material.
	pub evaluation_key_config: EvaluationKeyConfig,
}

/// The optional keyword-PIR section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPirParametersRecord {
	/// Number of cuckoo hash functions.
	pub hash_function_count: usize,
	/// The sharding function of the deployment.
	pub sharding_function: ShardingFunction,
	/// The symmetric-PIR ciphersuite, when configured.
	pub symmetric_pir_config: Option<SymmetricPirConfig>,
}

/// One plaintext polynomial's byte stream, hex-encoded in the textual
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextRecord {
	/// Coefficient-packed polynomial bytes; empty for padding cells.
	#[serde(with = "hex")]
	pub bytes: Vec<u8>,
}

/// The logical processed-database record of one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDatabaseRecord {
	/// The scheme tag.
	pub scheme: SchemeTag,
	/// The encryption parameters of the deployment.
	pub encryption_parameters: EncryptionParameters,
	/// The index-PIR parameters.
	pub pir: PirParametersRecord,
	/// The keyword-PIR parameters, when the shard serves keyword PIR.
	pub keyword: Option<KeywordPirParametersRecord>,
	/// The Galois key thinning strategy.
	pub key_compression: KeyCompression,
	/// The hypercube cells, chunk-major.
	#[serde(skip)]
	pub plaintexts: Vec<Vec<u8>>,
}

impl ProcessedDatabaseRecord {
	/// Captures a processed index-PIR server into a record.
	pub fn from_server(
		server: &IndexPirServer,
		context: &Context,
		key_compression: KeyCompression,
		keyword: Option<KeywordPirParametersRecord>,
	) -> Result<Self> {
		Ok(Self {
			scheme: SchemeTag::Bfv,
			encryption_parameters: context.params().clone(),
			pir: PirParametersRecord {
				entry_count: server.entry_count(),
				entry_size: server.entry_size(),
				dimensions: server.parameter().dimensions.clone(),
				chunk_count: server.parameter().chunk_count,
				batch_size: server.parameter().batch_size,
				evaluation_key_config: server.parameter().evaluation_key_config.clone(),
			},
			keyword,
			key_compression,
			plaintexts: server.plaintext_bytes()?,
		})
	}

	/// Rebuilds the server this record was captured from. The caller's
	/// context must match the recorded encryption parameters.
	pub fn into_server(&self, context: &Arc<Context>) -> Result<IndexPirServer> {
		if context.params() != &self.encryption_parameters {
			return Err(Error::InvalidConfig(
				"context parameters do not match the record".to_string(),
			));
		}
		let parameter = IndexPirParameter {
			dimensions: self.pir.dimensions.clone(),
			chunk_count: self.pir.chunk_count,
			batch_size: self.pir.batch_size,
			evaluation_key_config: self.pir.evaluation_key_config.clone(),
		};
		IndexPirServer::from_processed(
			context,
			parameter,
			self.pir.entry_count,
			self.pir.entry_size,
			&self.plaintexts,
		)
	}

	/// The textual encoding: the header record on the first line, then
	/// one hex plaintext record per line.
	pub fn to_text(&self) -> Result<String> {
		let mut out = serde_json::to_string(self)
			.map_err(|e| Error::InvalidSerialization(e.to_string()))?;
		out.push('\n');
		for bytes in &self.plaintexts {
			let record = PlaintextRecord {
				bytes: bytes.clone(),
			};
			out.push_str(
				&serde_json::to_string(&record)
					.map_err(|e| Error::InvalidSerialization(e.to_string()))?,
			);
			out.push('\n');
		}
		Ok(out)
	}

	/// Parses the textual encoding.
	pub fn from_text(text: &str) -> Result<Self> {
		let mut lines = text.lines();
		let header = lines
			.next()
			.ok_or_else(|| Error::InvalidSerialization("empty record".to_string()))?;
		let mut record: Self = serde_json::from_str(header)
			.map_err(|e| Error::InvalidSerialization(e.to_string()))?;
		record.plaintexts = lines
			.filter(|l| !l.is_empty())
			.map(|line| {
				serde_json::from_str::<PlaintextRecord>(line)
					.map(|r| r.bytes)
					.map_err(|e| Error::InvalidSerialization(e.to_string()))
			})
			.collect::<Result<_>>()?;
		Ok(record)
	}

	/// The compact binary encoding: a magic, the length-prefixed header
	/// record, then length-prefixed raw plaintext streams.
	pub fn to_binary(&self) -> Result<Vec<u8>> {
		let header = serde_json::to_vec(self)
			.map_err(|e| Error::InvalidSerialization(e.to_string()))?;
		let mut out = Vec::with_capacity(header.len() + 16);
		out.extend_from_slice(BINARY_MAGIC);
		out.extend_from_slice(&(header.len() as u32).to_le_bytes());
		out.extend_from_slice(&header);
		out.extend_from_slice(&(self.plaintexts.len() as u32).to_le_bytes());
		for bytes in &self.plaintexts {
			out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
			out.extend_from_slice(bytes);
		}
		Ok(out)
	}

	/// Parses the binary encoding.
	pub fn from_binary(bytes: &[u8]) -> Result<Self> {
		if bytes.get(..4) != Some(BINARY_MAGIC.as_slice()) {
			return Err(Error::InvalidSerialization("bad magic".to_string()));
		}
		let (header_len, offset) = read_u32(bytes, 4)?;
		let header = bytes
			.get(offset..offset + header_len as usize)
			.ok_or_else(|| Error::InvalidSerialization("truncated header".to_string()))?;
		let mut record: Self = serde_json::from_slice(header)
			.map_err(|e| Error::InvalidSerialization(e.to_string()))?;
		let mut offset = offset + header_len as usize;
		let (count, next) = read_u32(bytes, offset)?;
		offset = next;
		let mut plaintexts = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let (len, next) = read_u32(bytes, offset)?;
			let body = bytes
				.get(next..next + len as usize)
				.ok_or_else(|| Error::InvalidSerialization("truncated plaintext".to_string()))?;
			plaintexts.push(body.to_vec());
			offset = next + len as usize;
		}
		record.plaintexts = plaintexts;
		Ok(record)
	}
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
	let v = bytes
		.get(offset..offset + 4)
		.and_then(|b| b.try_into().ok())
		.map(u32::from_le_bytes)
		.ok_or_else(|| Error::InvalidSerialization("truncated integer".to_string()))?;
	Ok((v, offset + 4))
}

/// Writes a database-shard file: a sequence of length-prefixed
/// keyword and value byte strings.
pub fn write_shard_rows(rows: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
	let mut out = Vec::new();
	for (keyword, value) in rows {
		out.extend_from_slice(&(keyword.len() as u32).to_le_bytes());
		out.extend_from_slice(keyword);
		out.extend_from_slice(&(value.len() as u32).to_le_bytes());
		out.extend_from_slice(value);
	}
	out
}

/// Parses a database-shard file.
pub fn read_shard_rows(bytes: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
	let mut rows = Vec::new();
	let mut offset = 0usize;
	while offset < bytes.len() {
		let (klen, next) = read_u32(bytes, offset)?;
		let keyword = bytes
			.get(next..next + klen as usize)
			.ok_or_else(|| Error::InvalidSerialization("truncated keyword".to_string()))?
			.to_vec();
		offset = next + klen as usize;
		let (vlen, next) = read_u32(bytes, offset)?;
		let value = bytes
			.get(next..next + vlen as usize)
			.ok_or_else(|| Error::InvalidSerialization("truncated value".to_string()))?
			.to_vec();
		offset = next + vlen as usize;
		rows.push((keyword, value));
	}
	Ok(rows)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PirAlgorithm;
	use crate::index_pir::{IndexPirClient, IndexPirConfig};
	use pirouette_bfv::{
		EncryptionParametersBuilder, EvaluationKeyBuilder, SecretKey,
	};

	fn context() -> Arc<Context> {
		Context::new(
			EncryptionParametersBuilder::new()
				.set_degree(32)
				.set_plain_modulus(257)
				.set_coefficient_moduli_bits(vec![30, 30])
				.build()
				.unwrap(),
		)
		.unwrap()
	}

	fn sample_record(ctx: &Arc<Context>) -> (ProcessedDatabaseRecord, Vec<Vec<u8>>) {
		let entries: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 8]).collect();
		let config = IndexPirConfig {
			entry_count: 10,
			entry_size: 8,
			dimension_count: 2,
			key_compression: KeyCompression::None,
			batch_size: 1,
			algorithm: PirAlgorithm::MulPir,
		};
		let server = IndexPirServer::new(ctx, &config, &entries).unwrap();
		let record = ProcessedDatabaseRecord::from_server(
			&server,
			ctx,
			KeyCompression::None,
			Some(KeywordPirParametersRecord {
				hash_function_count: 2,
				sharding_function: ShardingFunction::Sha256,
				symmetric_pir_config: None,
			}),
		)
		.unwrap();
		(record, entries)
	}

	#[test]
	fn text_and_binary_forms_are_isomorphic() {
		let ctx = context();
		let (record, _) = sample_record(&ctx);

		let text = record.to_text().unwrap();
		assert_eq!(ProcessedDatabaseRecord::from_text(&text).unwrap(), record);

		let binary = record.to_binary().unwrap();
		assert_eq!(ProcessedDatabaseRecord::from_binary(&binary).unwrap(), record);

		// Crossing the encodings preserves the record.
		let via_text = ProcessedDatabaseRecord::from_text(&text).unwrap();
		assert_eq!(via_text.to_binary().unwrap(), binary);
	}

	#[test]
	fn rebuilt_servers_answer_queries() {
		let ctx = context();
		let (record, entries) = sample_record(&ctx);
		let server = record.into_server(&ctx).unwrap();

		let sk = SecretKey::random(&ctx).unwrap();
		let ek = EvaluationKeyBuilder::with_config(&sk, &server.parameter().evaluation_key_config)
			.build()
			.unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());
		let query = client.generate_query(&[7], &sk).unwrap();
		let response = server.respond(&query, &ek).unwrap();
		let decoded = client.decode_response(&response, 8, &sk).unwrap();
		assert_eq!(decoded[0], entries[7]);
	}

	#[test]
	fn mismatched_context_is_rejected() {
		let ctx = context();
		let (record, _) = sample_record(&ctx);
		let other = Context::new(
			EncryptionParametersBuilder::new()
				.set_degree(32)
				.set_plain_modulus(97)
				.set_coefficient_moduli_bits(vec![30])
				.build()
				.unwrap(),
		)
		.unwrap();
		assert!(record.into_server(&other).is_err());
	}

	#[test]
	fn shard_file_roundtrip() {
		let rows = vec![
			(b"alpha".to_vec(), b"one".to_vec()),
			(b"beta".to_vec(), Vec::new()),
			(Vec::new(), b"anonymous".to_vec()),
		];
		let bytes = write_shard_rows(&rows);
		assert_eq!(read_shard_rows(&bytes).unwrap(), rows);
		assert!(read_shard_rows(&bytes[..bytes.len() - 1]).is_err());
	}
}
