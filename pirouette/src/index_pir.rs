//! MulPIR: compressed queries, server-side expansion, and the
//! selection dot product over a hypercube of plaintexts.

use std::sync::Arc;

use pirouette_bfv::{
	deserialize_ciphertext, serialize_for_decryption, serialize_seeded, Ciphertext, Context,
	Decryptor, Encoder, EncodingFormat, Encryptor, EvaluationKey, EvaluationKeyConfig, Evaluator,
	GaloisElement, Plaintext, SecretKey, MIN_NOISE_BUDGET,
};
use rayon::prelude::*;
use tracing::info;

use crate::config::PirAlgorithm;
use crate::database::{
	bits_per_coefficient, bytes_per_plaintext, decode_entry, encode_entry,
};
use crate::error::{Error, Result};

/// How aggressively the Galois key set is thinned. Missing rotations
/// are recovered at runtime by composing the kept ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KeyCompression {
	/// Every expansion element ships in the key.
	None,
	/// Only the lower half of the ladder ships; higher elements cost
	/// doubling compositions at runtime.
	Maximum,
	/// One extra key above the lower half, roughly square-rooting the
	/// runtime compositions of `Maximum`.
	Hybrid,
}

/// Client-chosen index-PIR configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPirConfig {
	/// Number of database entries.
	pub entry_count: usize,
	/// Size of every entry in bytes.
	pub entry_size: usize,
	/// Number of hypercube dimensions; typically 2.
	pub dimension_count: usize,
	/// Galois key thinning strategy.
	pub key_compression: KeyCompression,
	/// Number of indices a single query retrieves.
	pub batch_size: usize,
	/// The PIR algorithm; only MulPIR is accepted.
	pub algorithm: PirAlgorithm,
}

impl IndexPirConfig {
	/// Validates the configuration.
	pub fn validate(&self) -> Result<()> {
		self.algorithm.validate()?;
		if self.entry_count == 0 {
			return Err(Error::EmptyDatabase);
		}
		if self.entry_size == 0 {
			return Err(Error::InvalidConfig("entry size must be positive".to_string()));
		}
		if self.dimension_count == 0 || self.dimension_count > 8 {
			return Err(Error::InvalidConfig(format!(
				"dimension count must be in 1..=8, got {}",
				self.dimension_count
			)));
		}
		if self.batch_size == 0 {
			return Err(Error::InvalidConfig("batch size must be positive".to_string()));
		}
		Ok(())
	}
}

/// Derived, shareable parameters of an index-PIR deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPirParameter {
	/// Hypercube dimensions, `∏ d_i >= entry_count`.
	pub dimensions: Vec<usize>,
	/// Plaintexts per entry.
	pub chunk_count: usize,
	/// Indices per query.
	pub batch_size: usize,
	/// The key material the server computation needs.
	pub evaluation_key_config: EvaluationKeyConfig,
}

impl IndexPirParameter {
	/// The total selection-vector length of one query.
	pub fn selection_length(&self) -> usize {
		self.dimensions.iter().sum()
	}
}

/// Splits `entry_count` over `dimension_count` dimensions as evenly as
/// possible; with two dimensions the first is `⌈√M⌉` rounded up to a
/// power of two.
pub fn derive_dimensions(entry_count: usize, dimension_count: usize) -> Result<Vec<usize>> {
	if entry_count == 0 {
		return Err(Error::EmptyDatabase);
	}
	match dimension_count {
		1 => Ok(vec![entry_count]),
		2 => {
			let d1 = ((entry_count as f64).sqrt().ceil() as usize).next_power_of_two();
			let d2 = entry_count.div_ceil(d1);
			Ok(vec![d1, d2])
		}
		_ => {
			let mut dims = Vec::with_capacity(dimension_count);
			let mut remaining = entry_count;
			for i in 0..dimension_count {
				let left = dimension_count - i;
				let d = (remaining as f64).powf(1.0 / left as f64).ceil() as usize;
				let d = d.max(1);
				dims.push(d);
				remaining = remaining.div_ceil(d);
			}
			Ok(dims)
		}
	}
}

/// The per-ciphertext layout of a batched query: how many selection
/// coefficients each ciphertext carries.
fn coefficient_layout(batch_size: usize, selection_length: usize, degree: usize) -> Vec<usize> {
	let total = batch_size * selection_length;
	if selection_length <= degree {
		let per_ct = degree / selection_length;
		let ct_count = batch_size.div_ceil(per_ct);
		(0..ct_count)
			.map(|c| {
				let queries = per_ct.min(batch_size - c * per_ct);
				queries * selection_length
			})
			.collect()
	} else {
		let ct_count = total.div_ceil(degree);
		(0..ct_count).map(|c| degree.min(total - c * degree)).collect()
	}
}

fn ceil_log2(x: usize) -> u32 {
	x.next_power_of_two().trailing_zeros()
}

/// The Galois elements the expansion of `output_count` coefficients
/// needs under a compression strategy, plus the relinearization flag
/// for multi-dimensional databases.
pub fn expansion_key_config(
	degree: usize,
	max_output_count: usize,
	key_compression: KeyCompression,
	needs_relinearization: bool,
) -> EvaluationKeyConfig {
	let log_degree = degree.trailing_zeros();
	let levels = ceil_log2(max_output_count).min(log_degree);
	let needed: Vec<u32> = (0..levels).map(|l| log_degree - l).collect();
	// The composition ladder climbs from the largest kept element by
	// repeated squaring, valid from ⌈(log N + 1)/2⌉ upward.
	let half = (log_degree + 1).div_ceil(2);
	let kept: Vec<u32> = match key_compression {
		KeyCompression::None => needed,
		KeyCompression::Maximum => (1..=half).collect(),
		KeyCompression::Hybrid => {
			let mut kept: Vec<u32> = (1..=half).collect();
			let extra = (half + log_degree).div_ceil(2);
			if extra > half && extra <= log_degree {
				kept.push(extra);
			}
			kept
		}
	};
	let mut config = EvaluationKeyConfig::with_galois_elements(
		kept.into_iter().map(|j| GaloisElement::expansion_step(j)),
	);
	config.has_relinearization_key = needs_relinearization;
	config
}

/// Applies the expansion element `2^j + 1`, falling back to repeated
/// application of the largest kept ladder element when the key was
/// compressed away.
fn apply_expansion_galois(
	evaluator: &Evaluator,
	ct: &Ciphertext,
	j: u32,
	key: &EvaluationKey,
	log_degree: u32,
) -> Result<Ciphertext> {
	let element = GaloisElement::expansion_step(j);
	if key.has_galois_key(element) {
		return Ok(evaluator.apply_galois(ct, element, key)?);
	}
	// Largest available j' whose squaring ladder reaches j.
	let fallback = (1..j)
		.rev()
		.find(|&jj| {
			2 * jj >= log_degree + 1 && key.has_galois_key(GaloisElement::expansion_step(jj))
		})
		.ok_or(pirouette_bfv::Error::MissingGaloisKey(element))?;
	let g = GaloisElement::expansion_step(fallback);
	let mut out = ct.clone();
	for _ in 0..(1usize << (j - fallback)) {
		out = evaluator.apply_galois(&out, g, key)?;
	}
	Ok(out)
}

/// Expands one query ciphertext into `output_count` ciphertexts whose
/// plaintexts are the original coefficients, each scaled by
/// `2^⌈log2 outputCount⌉`.
pub fn expand_ciphertext(
	evaluator: &Evaluator,
	ct: &Ciphertext,
	output_count: usize,
	key: &EvaluationKey,
	degree: usize,
) -> Result<Vec<Ciphertext>> {
	let log_degree = degree.trailing_zeros();
	let levels = ceil_log2(output_count).min(log_degree);
	let mut cts = vec![ct.clone()];
	for l in 0..levels {
		let j = log_degree - l;
		let shift = 2 * degree - (1usize << l);
		let mut sums = Vec::with_capacity(cts.len());
		let mut shifted = Vec::with_capacity(cts.len());
		for c in &cts {
			let c_sub = apply_expansion_galois(evaluator, c, j, key, log_degree)?;
			sums.push(evaluator.add(c, &c_sub)?);
			let diff = evaluator.sub(c, &c_sub)?;
			shifted.push(evaluator.multiply_by_monomial(&diff, shift)?);
		}
		sums.extend(shifted);
		cts = sums;
	}
	cts.truncate(output_count);
	Ok(cts)
}

/// A compressed PIR query: one or a few seeded ciphertexts.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
	/// The query ciphertexts, in layout order.
	pub ciphertexts: Vec<Ciphertext>,
}

impl Query {
	/// Serializes every ciphertext in its seeded form.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut out = Vec::new();
		out.extend_from_slice(&(self.ciphertexts.len() as u16).to_le_bytes());
		for ct in &self.ciphertexts {
			let bytes = serialize_seeded(ct).map_err(Error::Bfv)?;
			out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
			out.extend_from_slice(&bytes);
		}
		Ok(out)
	}

	/// Recovers a query from bytes.
	pub fn from_bytes(context: &Arc<Context>, bytes: &[u8]) -> Result<Self> {
		let (count, mut offset) = read_u16(bytes, 0)?;
		let mut ciphertexts = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let (len, next) = read_u32(bytes, offset)?;
			let body = bytes
				.get(next..next + len as usize)
				.ok_or_else(|| Error::InvalidSerialization("truncated query".to_string()))?;
			ciphertexts.push(deserialize_ciphertext(context, body).map_err(Error::Bfv)?);
			offset = next + len as usize;
		}
		Ok(Self {
			ciphertexts,
		})
	}
}

/// A PIR response: for each queried index, one serialized ciphertext
/// per entry chunk, in the for-decryption layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
	/// `chunks[q][c]` answers query `q`, entry chunk `c`.
	pub chunks: Vec<Vec<Vec<u8>>>,
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<(u16, usize)> {
	let v = bytes
		.get(offset..offset + 2)
		.and_then(|b| b.try_into().ok())
		.map(u16::from_le_bytes)
		.ok_or_else(|| Error::InvalidSerialization("truncated integer".to_string()))?;
	Ok((v, offset + 2))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
	let v = bytes
		.get(offset..offset + 4)
		.and_then(|b| b.try_into().ok())
		.map(u32::from_le_bytes)
		.ok_or_else(|| Error::InvalidSerialization("truncated integer".to_string()))?;
	Ok((v, offset + 4))
}

/// The server side: a processed hypercube of plaintexts and the
/// response computation.
pub struct IndexPirServer {
	context: Arc<Context>,
	parameter: IndexPirParameter,
	entry_size: usize,
	entry_count: usize,
	/// `database[chunk][cell]`, cells beyond the entry count absent.
	database: Vec<Vec<Option<Plaintext>>>,
}

impl IndexPirServer {
	/// Packs a database of equal-size entries into the plaintext
	/// hypercube.
	pub fn new(
		context: &Arc<Context>,
		config: &IndexPirConfig,
		entries: &[Vec<u8>],
	) -> Result<Self> {
		config.validate()?;
		if entries.len() != config.entry_count {
			return Err(Error::InvalidConfig(format!(
				"{} entries provided for an entry count of {}",
				entries.len(),
				config.entry_count
			)));
		}
		for entry in entries {
			if entry.len() != config.entry_size {
				return Err(Error::UnequalEntrySizes(entry.len(), config.entry_size));
			}
		}

		let dimensions = derive_dimensions(config.entry_count, config.dimension_count)?;
		let chunk_count = config
			.entry_size
			.div_ceil(bytes_per_plaintext(context).max(1))
			.max(1);
		let cell_count: usize = dimensions.iter().product();

		// Entries encode independently; the results land in distinct
		// cells of the pre-sized hypercube.
		let encoded: Vec<Vec<Plaintext>> = entries
			.par_iter()
			.map(|entry| encode_entry(context, entry, chunk_count))
			.collect::<Result<_>>()?;
		let mut database = vec![vec![None; cell_count]; chunk_count];
		for (i, chunks) in encoded.into_iter().enumerate() {
			for (c, plaintext) in chunks.into_iter().enumerate() {
				database[c][i] = Some(plaintext);
			}
		}

		let selection_length: usize = dimensions.iter().sum();
		let layout = coefficient_layout(config.batch_size, selection_length, context.degree());
		let max_output = layout.iter().copied().max().unwrap_or(1);
		let evaluation_key_config = expansion_key_config(
			context.degree(),
			max_output,
			config.key_compression,
			config.dimension_count >= 2,
		);

		info!(
			entries = config.entry_count,
			entry_size = config.entry_size,
			dimensions = ?dimensions,
			chunks = chunk_count,
			"processed index PIR database"
		);

		Ok(Self {
			context: context.clone(),
			parameter: IndexPirParameter {
				dimensions,
				chunk_count,
				batch_size: config.batch_size,
				evaluation_key_config,
			},
			entry_size: config.entry_size,
			entry_count: config.entry_count,
			database,
		})
	}

	/// Returns the derived parameters a client needs.
	pub fn parameter(&self) -> &IndexPirParameter {
		&self.parameter
	}

	/// Returns the entry size in bytes.
	pub fn entry_size(&self) -> usize {
		self.entry_size
	}

	/// Returns the number of entries.
	pub fn entry_count(&self) -> usize {
		self.entry_count
	}

	/// Serializes the hypercube cells, chunk-major; absent padding
	/// cells become empty streams.
	pub fn plaintext_bytes(&self) -> Result<Vec<Vec<u8>>> {
		use pirouette_bfv::ToBytes;
		let mut out = Vec::new();
		for chunk in &self.database {
			for cell in chunk {
				out.push(match cell {
					Some(plaintext) => plaintext.to_bytes().map_err(Error::Bfv)?,
					None => Vec::new(),
				});
			}
		}
		Ok(out)
	}

	/// Rebuilds a server from previously processed parts, the inverse
	/// of [`IndexPirServer::plaintext_bytes`].
	pub fn from_processed(
		context: &Arc<Context>,
		parameter: IndexPirParameter,
		entry_count: usize,
		entry_size: usize,
		plaintexts: &[Vec<u8>],
	) -> Result<Self> {
		use pirouette_bfv::FromBytes;
		let cell_count: usize = parameter.dimensions.iter().product();
		if plaintexts.len() != cell_count * parameter.chunk_count {
			return Err(Error::InvalidSerialization(format!(
				"{} plaintext streams for {} cells",
				plaintexts.len(),
				cell_count * parameter.chunk_count
			)));
		}
		let database = plaintexts
			.chunks(cell_count)
			.map(|chunk| {
				chunk
					.iter()
					.map(|bytes| {
						if bytes.is_empty() {
							Ok(None)
						} else {
							Plaintext::from_bytes(context, bytes).map(Some).map_err(Error::Bfv)
						}
					})
					.collect::<Result<Vec<_>>>()
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(Self {
			context: context.clone(),
			parameter,
			entry_size,
			entry_count,
			database,
		})
	}

	/// Expands the query, contracts the hypercube dimension by
	/// dimension, and returns one for-decryption ciphertext per chunk
	/// and queried index.
	pub fn respond(&self, query: &Query, key: &EvaluationKey) -> Result<Response> {
		if !key.config().contains(&self.parameter.evaluation_key_config) {
			let missing = self
				.parameter
				.evaluation_key_config
				.galois_elements
				.iter()
				.find(|g| !key.has_galois_key(**g));
			if let Some(g) = missing {
				return Err(Error::Bfv(pirouette_bfv::Error::MissingGaloisKey(*g)));
			}
			return Err(Error::Bfv(pirouette_bfv::Error::MissingRelinearizationKey));
		}
		let evaluator = Evaluator::new(&self.context);
		let degree = self.context.degree();
		let selection_length = self.parameter.selection_length();
		let layout = coefficient_layout(self.parameter.batch_size, selection_length, degree);
		if query.ciphertexts.len() != layout.len() {
			return Err(Error::InvalidConfig(format!(
				"query has {} ciphertexts, layout needs {}",
				query.ciphertexts.len(),
				layout.len()
			)));
		}

		// Expanded selection ciphertexts, in global coefficient order.
		let mut selection = Vec::with_capacity(self.parameter.batch_size * selection_length);
		for (ct, &count) in query.ciphertexts.iter().zip(&layout) {
			selection.extend(expand_ciphertext(&evaluator, ct, count, key, degree)?);
		}

		let mut chunks = Vec::with_capacity(self.parameter.batch_size);
		for q in 0..self.parameter.batch_size {
			let per_query = &selection[q * selection_length..(q + 1) * selection_length];
			let mut responses = Vec::with_capacity(self.parameter.chunk_count);
			for chunk in 0..self.parameter.chunk_count {
				let ct = self.contract(&evaluator, per_query, chunk, key)?;
				let single = evaluator.mod_switch_to_single(&ct)?;
				let coefficients_used =
					(self.entry_size * 8).div_ceil(bits_per_coefficient(&self.context));
				let indices: Vec<usize> = (0..coefficients_used.min(degree)).collect();
				responses.push(
					serialize_for_decryption(&single, Some(&indices)).map_err(Error::Bfv)?,
				);
			}
			chunks.push(responses);
		}
		Ok(Response {
			chunks,
		})
	}

	/// The selection dot product for one chunk: contract dimension 1
	/// with plaintext products, then each further dimension with
	/// ciphertext products followed by relinearization.
	fn contract(
		&self,
		evaluator: &Evaluator,
		selection: &[Ciphertext],
		chunk: usize,
		key: &EvaluationKey,
	) -> Result<Ciphertext> {
		let dims = &self.parameter.dimensions;
		let d1 = dims[0];
		let rest_cells: usize = dims[1..].iter().product::<usize>().max(1);

		// Dimension 1: plaintext-times-ciphertext inner products.
		let mut current: Vec<Option<Ciphertext>> = Vec::with_capacity(rest_cells);
		for r in 0..rest_cells {
			let mut acc: Option<Ciphertext> = None;
			for i1 in 0..d1 {
				let cell = r * d1 + i1;
				if cell >= self.entry_count {
					continue;
				}
				if let Some(plaintext) = &self.database[chunk][cell] {
					let term = evaluator.multiply_plain(&selection[i1], plaintext)?;
					acc = Some(match acc {
						Some(sum) => evaluator.add(&sum, &term)?,
						None => term,
					});
				}
			}
			current.push(acc);
		}

		// Remaining dimensions: ciphertext-times-ciphertext selection.
		let mut offset = d1;
		let mut cells = rest_cells;
		for &d in &dims[1..] {
			let s = &selection[offset..offset + d];
			cells /= d;
			let mut next = Vec::with_capacity(cells);
			for r in 0..cells {
				let mut acc: Option<Ciphertext> = None;
				for (i, sel) in s.iter().enumerate() {
					if let Some(inner) = &current[r * d + i] {
						let term = evaluator.multiply(inner, sel)?;
						acc = Some(match acc {
							Some(sum) => evaluator.add(&sum, &term)?,
							None => term,
						});
					}
				}
				let acc = match acc {
					Some(sum) if sum.size() == 3 => {
						Some(evaluator.relinearize(&sum, key.relinearization_key()?)?)
					}
					other => other,
				};
				next.push(acc);
			}
			current = next;
			offset += d;
		}

		current
			.into_iter()
			.next()
			.flatten()
			.ok_or(Error::EmptyDatabase)
	}

	/// Runs the full protocol against a probe query under the caller's
	/// own key and reports the response's noise budget, refusing
	/// parameter sets that land under the safe floor.
	pub fn validate(
		&self,
		secret_key: &SecretKey,
		key: &EvaluationKey,
	) -> Result<u32> {
		let client = IndexPirClient::new(&self.context, self.parameter.clone());
		let query = client.generate_query(&vec![0; self.parameter.batch_size], secret_key)?;
		let response = self.respond(&query, key)?;
		let decryptor = Decryptor::new(&self.context, secret_key).map_err(Error::Bfv)?;
		let mut budget = u32::MAX;
		for per_query in &response.chunks {
			for bytes in per_query {
				let ct = deserialize_ciphertext(&self.context, bytes).map_err(Error::Bfv)?;
				budget = budget.min(decryptor.noise_budget(&ct).map_err(Error::Bfv)?);
			}
		}
		if budget < MIN_NOISE_BUDGET {
			return Err(Error::InsufficientNoiseBudget(budget));
		}
		info!(budget, "validated processed database");
		Ok(budget)
	}
}

/// The client side: query generation and response decoding.
pub struct IndexPirClient {
	context: Arc<Context>,
	parameter: IndexPirParameter,
}

impl IndexPirClient {
	/// Creates a client for the given deployment parameters.
	pub fn new(context: &Arc<Context>, parameter: IndexPirParameter) -> Self {
		Self {
			context: context.clone(),
			parameter,
		}
	}

	/// Returns the deployment parameters.
	pub fn parameter(&self) -> &IndexPirParameter {
		&self.parameter
	}

	/// Encodes `indices` (one per batch position) into the compressed
	/// query: a sparse selection vector scaled by
	/// `2^{-⌈log2 outputCount⌉}` so the expansion doublings cancel.
	pub fn generate_query(&self, indices: &[usize], secret_key: &SecretKey) -> Result<Query> {
		if indices.len() != self.parameter.batch_size {
			return Err(Error::InvalidConfig(format!(
				"{} indices for a batch size of {}",
				indices.len(),
				self.parameter.batch_size
			)));
		}
		let degree = self.context.degree();
		let t = self.context.plain_modulus();
		let selection_length = self.parameter.selection_length();
		let layout = coefficient_layout(self.parameter.batch_size, selection_length, degree);

		// Global coefficient positions of every selected component.
		let mut positions = Vec::new();
		for (q, &index) in indices.iter().enumerate() {
			let mut remaining = index;
			let mut offset = 0usize;
			for &d in &self.parameter.dimensions {
				let coordinate = remaining % d;
				positions.push(q * selection_length + offset + coordinate);
				remaining /= d;
				offset += d;
			}
		}

		let encoder = Encoder::new(&self.context);
		let encryptor = Encryptor::new(&self.context, secret_key).map_err(Error::Bfv)?;
		let mut ciphertexts = Vec::with_capacity(layout.len());
		let mut base = 0usize;
		for &count in &layout {
			let scale = t
				.inv(t.pow(2, ceil_log2(count) as u64))
				.ok_or_else(|| {
					Error::InvalidConfig(
						"plaintext modulus must be odd for query scaling".to_string(),
					)
				})?;
			let mut coefficients = vec![0u64; degree];
			for &p in &positions {
				if p >= base && p < base + count {
					coefficients[p - base] = scale;
				}
			}
			let plaintext = encoder
				.encode(&coefficients, EncodingFormat::Coefficient)
				.map_err(Error::Bfv)?;
			ciphertexts.push(encryptor.encrypt(&plaintext).map_err(Error::Bfv)?);
			base += count;
		}
		Ok(Query {
			ciphertexts,
		})
	}

	/// Decrypts and reassembles the retrieved entries.
	pub fn decode_response(
		&self,
		response: &Response,
		entry_size: usize,
		secret_key: &SecretKey,
	) -> Result<Vec<Vec<u8>>> {
		let decryptor = Decryptor::new(&self.context, secret_key).map_err(Error::Bfv)?;
		let encoder = Encoder::new(&self.context);
		response
			.chunks
			.iter()
			.map(|per_query| {
				let chunks = per_query
					.iter()
					.map(|bytes| {
						let ct = deserialize_ciphertext(&self.context, bytes)?;
						let pt = decryptor.decrypt(&ct)?;
						encoder.decode(&pt, EncodingFormat::Coefficient)
					})
					.collect::<pirouette_bfv::Result<Vec<_>>>()
					.map_err(Error::Bfv)?;
				Ok(decode_entry(&self.context, &chunks, entry_size))
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pirouette_bfv::{EncryptionParametersBuilder, EvaluationKeyBuilder};
	use rand::{thread_rng, Rng};

	fn context(degree: usize) -> Arc<Context> {
		Context::new(
			EncryptionParametersBuilder::new()
				.set_degree(degree)
				.set_plain_modulus(257)
				.set_coefficient_moduli_bits(vec![30, 30])
				.build()
				.unwrap(),
		)
		.unwrap()
	}

	fn config(entry_count: usize, entry_size: usize, dims: usize) -> IndexPirConfig {
		IndexPirConfig {
			entry_count,
			entry_size,
			dimension_count: dims,
			key_compression: KeyCompression::None,
			batch_size: 1,
			algorithm: PirAlgorithm::MulPir,
		}
	}

	fn random_database(count: usize, size: usize) -> Vec<Vec<u8>> {
		let mut rng = thread_rng();
		(0..count)
			.map(|_| (0..size).map(|_| rng.gen()).collect())
			.collect()
	}

	#[test]
	fn dimensions_cover_the_database() {
		assert_eq!(derive_dimensions(100, 1).unwrap(), vec![100]);
		let dims = derive_dimensions(100, 2).unwrap();
		assert_eq!(dims, vec![16, 7]);
		assert!(dims.iter().product::<usize>() >= 100);
		let dims = derive_dimensions(1000, 3).unwrap();
		assert!(dims.iter().product::<usize>() >= 1000);
		assert!(derive_dimensions(0, 2).is_err());
	}

	#[test]
	fn layout_batches_queries_into_shared_ciphertexts() {
		// Three queries of 10 coefficients each fit one degree-32 ct.
		assert_eq!(coefficient_layout(3, 10, 32), vec![30]);
		// Four do not.
		assert_eq!(coefficient_layout(4, 10, 32), vec![30, 10]);
		// A selection longer than the degree spans several cts.
		assert_eq!(coefficient_layout(1, 70, 32), vec![32, 32, 6]);
	}

	#[test]
	fn expansion_recovers_scaled_coefficients() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let evaluator = Evaluator::new(&ctx);
		let encoder = Encoder::new(&ctx);
		let encryptor = Encryptor::new(&ctx, &sk).unwrap();
		let decryptor = Decryptor::new(&ctx, &sk).unwrap();

		let count = 6usize;
		let config = expansion_key_config(32, count, KeyCompression::None, false);
		let ek = EvaluationKeyBuilder::with_config(&sk, &config).build().unwrap();

		// Coefficients scaled by 2^{-⌈log2 6⌉} = 8^{-1} mod 257.
		let t = ctx.plain_modulus();
		let scale = t.inv(8).unwrap();
		let values: Vec<u64> = (1..=count as u64).map(|v| t.mul(v, scale)).collect();
		let pt = encoder.encode(&values, EncodingFormat::Coefficient).unwrap();
		let ct = encryptor.encrypt(&pt).unwrap();

		let expanded = expand_ciphertext(&evaluator, &ct, count, &ek, 32).unwrap();
		assert_eq!(expanded.len(), count);
		for (k, ct_k) in expanded.iter().enumerate() {
			let decoded = encoder
				.decode(&decryptor.decrypt(ct_k).unwrap(), EncodingFormat::Coefficient)
				.unwrap();
			assert_eq!(decoded[0], k as u64 + 1, "coefficient {k}");
			assert!(decoded[1..].iter().all(|v| *v == 0));
		}
	}

	#[test]
	fn expansion_works_with_compressed_keys() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let evaluator = Evaluator::new(&ctx);
		let encoder = Encoder::new(&ctx);
		let encryptor = Encryptor::new(&ctx, &sk).unwrap();
		let decryptor = Decryptor::new(&ctx, &sk).unwrap();

		for compression in [KeyCompression::Maximum, KeyCompression::Hybrid] {
			let count = 8usize;
			let config = expansion_key_config(32, count, compression, false);
			let full = expansion_key_config(32, count, KeyCompression::None, false);
			assert!(compression == KeyCompression::Hybrid
				|| config.galois_elements.len() <= full.galois_elements.len());
			let ek = EvaluationKeyBuilder::with_config(&sk, &config).build().unwrap();

			let t = ctx.plain_modulus();
			let scale = t.inv(8).unwrap();
			let values: Vec<u64> = (1..=count as u64).map(|v| t.mul(v, scale)).collect();
			let pt = encoder.encode(&values, EncodingFormat::Coefficient).unwrap();
			let ct = encryptor.encrypt(&pt).unwrap();

			let expanded = expand_ciphertext(&evaluator, &ct, count, &ek, 32).unwrap();
			for (k, ct_k) in expanded.iter().enumerate() {
				let decoded = encoder
					.decode(&decryptor.decrypt(ct_k).unwrap(), EncodingFormat::Coefficient)
					.unwrap();
				assert_eq!(decoded[0], k as u64 + 1, "{compression:?} coefficient {k}");
			}
		}
	}

	#[test]
	fn one_dimensional_retrieval() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(10, 8);
		let server = IndexPirServer::new(&ctx, &config(10, 8, 1), &entries).unwrap();
		let ek = EvaluationKeyBuilder::with_config(&sk, &server.parameter().evaluation_key_config)
			.build()
			.unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());

		for index in [0usize, 3, 9] {
			let query = client.generate_query(&[index], &sk).unwrap();
			let response = server.respond(&query, &ek).unwrap();
			let decoded = client.decode_response(&response, 8, &sk).unwrap();
			assert_eq!(decoded[0], entries[index]);
		}
	}

	#[test]
	fn two_dimensional_retrieval_for_every_index() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(20, 12);
		let server = IndexPirServer::new(&ctx, &config(20, 12, 2), &entries).unwrap();
		assert!(server.parameter().evaluation_key_config.has_relinearization_key);
		let ek = EvaluationKeyBuilder::with_config(&sk, &server.parameter().evaluation_key_config)
			.build()
			.unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());

		for index in 0..20 {
			let query = client.generate_query(&[index], &sk).unwrap();
			let response = server.respond(&query, &ek).unwrap();
			let decoded = client.decode_response(&response, 12, &sk).unwrap();
			assert_eq!(decoded[0], entries[index], "index {index}");
		}
	}

	#[test]
	fn entries_spanning_multiple_plaintexts() {
		let ctx = context(32);
		// 32 coefficients x 8 bits = 32 bytes per plaintext.
		let entry_size = 80;
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(6, entry_size);
		let server = IndexPirServer::new(&ctx, &config(6, entry_size, 2), &entries).unwrap();
		assert_eq!(server.parameter().chunk_count, 3);
		let ek = EvaluationKeyBuilder::with_config(&sk, &server.parameter().evaluation_key_config)
			.build()
			.unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());

		let query = client.generate_query(&[5], &sk).unwrap();
		let response = server.respond(&query, &ek).unwrap();
		let decoded = client.decode_response(&response, entry_size, &sk).unwrap();
		assert_eq!(decoded[0], entries[5]);
	}

	#[test]
	fn batched_queries_share_ciphertexts() {
		let ctx = context(64);
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(16, 8);
		let mut cfg = config(16, 8, 2);
		cfg.batch_size = 3;
		let server = IndexPirServer::new(&ctx, &cfg, &entries).unwrap();
		let ek = EvaluationKeyBuilder::with_config(&sk, &server.parameter().evaluation_key_config)
			.build()
			.unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());

		let indices = [2usize, 7, 15];
		let query = client.generate_query(&indices, &sk).unwrap();
		// Selection length is 4 + 4 = 8; three queries fit one ct.
		assert_eq!(query.ciphertexts.len(), 1);
		let response = server.respond(&query, &ek).unwrap();
		let decoded = client.decode_response(&response, 8, &sk).unwrap();
		for (got, &index) in decoded.iter().zip(&indices) {
			assert_eq!(got, &entries[index]);
		}
	}

	#[test]
	fn query_serialization_roundtrip() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(10, 8);
		let server = IndexPirServer::new(&ctx, &config(10, 8, 2), &entries).unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());
		let query = client.generate_query(&[4], &sk).unwrap();
		let bytes = query.to_bytes().unwrap();
		let restored = Query::from_bytes(&ctx, &bytes).unwrap();
		assert_eq!(restored, query);
	}

	#[test]
	fn responding_without_key_material_fails() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(10, 8);
		let server = IndexPirServer::new(&ctx, &config(10, 8, 2), &entries).unwrap();
		let client = IndexPirClient::new(&ctx, server.parameter().clone());
		let query = client.generate_query(&[4], &sk).unwrap();
		let empty = EvaluationKeyBuilder::new(&sk).build().unwrap();
		assert!(server.respond(&query, &empty).is_err());
	}

	#[test]
	fn validation_reports_a_positive_budget() {
		let ctx = context(32);
		let sk = SecretKey::random(&ctx).unwrap();
		let entries = random_database(10, 8);
		let server = IndexPirServer::new(&ctx, &config(10, 8, 2), &entries).unwrap();
		let ek = EvaluationKeyBuilder::with_config(&sk, &server.parameter().evaluation_key_config)
			.build()
			.unwrap();
		let budget = server.validate(&sk, &ek).unwrap();
		assert!(budget >= MIN_NOISE_BUDGET);
	}

	#[test]
	fn rejects_reserved_algorithm_and_bad_shapes() {
		let ctx = context(32);
		let mut cfg = config(4, 8, 2);
		cfg.algorithm = PirAlgorithm::AclsPir;
		assert!(matches!(
			IndexPirServer::new(&ctx, &cfg, &random_database(4, 8)),
			Err(Error::UnsupportedPirAlgorithm(_))
		));

		let mut ragged = random_database(4, 8);
		ragged[2] = vec![1, 2, 3];
		assert!(matches!(
			IndexPirServer::new(&ctx, &config(4, 8, 2), &ragged),
			Err(Error::UnequalEntrySizes(3, 8))
		));
	}
}
