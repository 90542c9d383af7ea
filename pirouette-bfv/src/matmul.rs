//! Plaintext-matrix times ciphertext-vector products over SIMD slots.
//!
//! The three packings trade plaintext count against the rotation keys a
//! product needs. All of them operate on the first SIMD row (the second
//! row carries a mirrored copy), with dimensions padded to powers of two
//! so slot rotations act as rotations of the padded vector.

use std::sync::Arc;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::galois::GaloisElement;
use crate::key_generator::{EvaluationKey, EvaluationKeyConfig};
use crate::plaintext::{Encoder, EncodingFormat, Plaintext};

/// The layout of a plaintext matrix in SIMD slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixPacking {
	/// Row-major: each row padded to a power of two and replicated
	/// across the slots.
	DenseRow,
	/// Column-major: each column padded to a power of two, columns
	/// packed consecutively.
	DenseColumn,
	/// Halevi-Shoup diagonals with the given baby-step count; the giant
	/// step is `⌈d / babyStep⌉`.
	Diagonal {
		/// Number of baby-step rotations.
		baby_step: usize,
	},
}

impl MatrixPacking {
	/// The Galois elements a matrix-vector product under this packing
	/// requires, given the matrix shape.
	pub fn evaluation_key_config(
		&self,
		row_count: usize,
		column_count: usize,
		degree: usize,
	) -> Result<EvaluationKeyConfig> {
		let mut elements = Vec::new();
		match self {
			MatrixPacking::DenseRow => {
				let padded = padded_dimension(column_count, degree)?;
				let mut step = padded / 2;
				while step >= 1 {
					elements.push(GaloisElement::rotating_columns_by(step as i64, degree)?);
					step /= 2;
				}
			}
			MatrixPacking::DenseColumn => {
				let padded_rows = padded_dimension(row_count, degree)?;
				let row_size = degree / 2;
				let per_plaintext = row_size / padded_rows;
				let mut step = per_plaintext / 2;
				while step >= 1 {
					elements.push(GaloisElement::rotating_columns_by(
						(step * padded_rows) as i64,
						degree,
					)?);
					step /= 2;
				}
			}
			MatrixPacking::Diagonal {
				baby_step,
			} => {
				let padded = padded_dimension(row_count.max(column_count), degree)?;
				let baby = (*baby_step).clamp(1, padded);
				let giant = padded.div_ceil(baby);
				for i in 1..baby.min(padded) {
					elements.push(GaloisElement::rotating_columns_by(i as i64, degree)?);
				}
				for j in 1..giant {
					if j * baby < padded {
						elements.push(GaloisElement::rotating_columns_by(
							(j * baby) as i64,
							degree,
						)?);
					}
				}
			}
		}
		Ok(EvaluationKeyConfig::with_galois_elements(elements))
	}
}

/// Rounds `d` up to a power of two and checks it fits half the slots.
fn padded_dimension(d: usize, degree: usize) -> Result<usize> {
	let padded = d.next_power_of_two();
	if padded > degree / 2 {
		return Err(Error::EncodingError(format!(
			"dimension {d} does not fit the {} slots of one SIMD row",
			degree / 2
		)));
	}
	Ok(padded)
}

/// Replicates `pattern` (length a power of two) across both SIMD rows.
fn replicate_slots(pattern: &[u64], degree: usize) -> Vec<u64> {
	let row_size = degree / 2;
	let mut row = Vec::with_capacity(row_size);
	while row.len() < row_size {
		row.extend_from_slice(pattern);
	}
	let mut slots = row.clone();
	slots.extend_from_slice(&row);
	slots
}

/// A plaintext matrix encoded for multiplication against encrypted
/// vectors.
pub struct PlaintextMatrix {
	packing: MatrixPacking,
	row_count: usize,
	column_count: usize,
	padded: usize,
	plaintexts: Vec<Plaintext>,
}

impl PlaintextMatrix {
	/// Encodes a `rows x cols` matrix of values modulo `t`.
	pub fn encode(
		context: &Arc<Context>,
		data: &[Vec<u64>],
		packing: MatrixPacking,
	) -> Result<Self> {
		let row_count = data.len();
		let column_count = data.first().map(Vec::len).unwrap_or(0);
		if row_count == 0 || column_count == 0 {
			return Err(Error::EncodingError("empty matrix".to_string()));
		}
		if data.iter().any(|row| row.len() != column_count) {
			return Err(Error::EncodingError("ragged matrix".to_string()));
		}
		let degree = context.degree();
		let encoder = Encoder::new(context);

		let (padded, plaintexts) = match packing {
			MatrixPacking::DenseRow => {
				let padded = padded_dimension(column_count, degree)?;
				let plaintexts = data
					.iter()
					.map(|row| {
						let mut pattern = row.clone();
						pattern.resize(padded, 0);
						encoder.encode(&replicate_slots(&pattern, degree), EncodingFormat::Simd)
					})
					.collect::<Result<Vec<_>>>()?;
				(padded, plaintexts)
			}
			MatrixPacking::DenseColumn => {
				let padded_rows = padded_dimension(row_count, degree)?;
				let row_size = degree / 2;
				let per_plaintext = row_size / padded_rows;
				let mut plaintexts = Vec::new();
				for chunk in (0..column_count).collect::<Vec<_>>().chunks(per_plaintext) {
					let mut row = vec![0u64; row_size];
					for (slot_block, &c) in chunk.iter().enumerate() {
						for r in 0..row_count {
							row[slot_block * padded_rows + r] = data[r][c];
						}
					}
					let mut slots = row.clone();
					slots.extend_from_slice(&row);
					plaintexts.push(encoder.encode(&slots, EncodingFormat::Simd)?);
				}
				(padded_rows, plaintexts)
			}
			MatrixPacking::Diagonal {
				baby_step,
			} => {
				let padded = padded_dimension(row_count.max(column_count), degree)?;
				let baby = baby_step.clamp(1, padded);
				let mut plaintexts = Vec::with_capacity(padded);
				for k in 0..padded {
					// Diagonal k of the zero-padded square matrix,
					// pre-rotated by its giant step.
					let giant_offset = (k / baby) * baby;
					let mut diagonal = vec![0u64; padded];
					for (i, value) in diagonal.iter_mut().enumerate() {
						let row = i;
						let col = (i + k) % padded;
						if row < row_count && col < column_count {
							*value = data[row][col];
						}
					}
					diagonal.rotate_right(giant_offset % padded);
					plaintexts.push(
						encoder.encode(&replicate_slots(&diagonal, degree), EncodingFormat::Simd)?,
					);
				}
				(padded, plaintexts)
			}
		};

		Ok(Self {
			packing,
			row_count,
			column_count,
			padded,
			plaintexts,
		})
	}

	/// Returns the packing mode.
	pub fn packing(&self) -> MatrixPacking {
		self.packing
	}

	/// Returns the matrix shape.
	pub fn shape(&self) -> (usize, usize) {
		(self.row_count, self.column_count)
	}

	/// Returns the number of plaintexts backing the matrix.
	pub fn plaintext_count(&self) -> usize {
		self.plaintexts.len()
	}

	/// Multiplies this matrix with an encrypted vector.
	///
	/// The ciphertext must encode the vector under the layout implied by
	/// the packing: padded and replicated across the first SIMD row for
	/// `DenseRow` and `Diagonal`, broadcast per column block for
	/// `DenseColumn`. The result carries the product vector in the
	/// leading slots.
	pub fn multiply_vector(
		&self,
		evaluator: &Evaluator,
		vector: &Ciphertext,
		key: &EvaluationKey,
	) -> Result<Ciphertext> {
		match self.packing {
			MatrixPacking::Diagonal {
				baby_step,
			} => {
				let baby = baby_step.clamp(1, self.padded);
				let giant = self.padded.div_ceil(baby);

				// Baby-step rotations of the encrypted vector.
				let mut rotations = Vec::with_capacity(baby);
				rotations.push(vector.clone());
				for i in 1..baby.min(self.padded) {
					rotations.push(evaluator.rotate_columns(vector, i as i64, key)?);
				}

				let mut total: Option<Ciphertext> = None;
				for j in 0..giant {
					let mut inner: Option<Ciphertext> = None;
					for i in 0..baby {
						let k = j * baby + i;
						if k >= self.padded {
							break;
						}
						let term = evaluator
							.multiply_plain(&rotations[i], &self.plaintexts[k])?;
						inner = Some(match inner {
							Some(acc) => evaluator.add(&acc, &term)?,
							None => term,
						});
					}
					if let Some(mut block) = inner {
						if j > 0 {
							block = evaluator.rotate_columns(
								&block,
								(j * baby) as i64,
								key,
							)?;
						}
						total = Some(match total {
							Some(acc) => evaluator.add(&acc, &block)?,
							None => block,
						});
					}
				}
				total.ok_or_else(|| Error::EncodingError("empty matrix product".to_string()))
			}
			MatrixPacking::DenseRow => {
				// One inner product per row: multiply then fold the
				// padded width with halving rotations.
				let mut results = Vec::with_capacity(self.plaintexts.len());
				for plaintext in &self.plaintexts {
					let mut acc = evaluator.multiply_plain(vector, plaintext)?;
					let mut step = self.padded / 2;
					while step >= 1 {
						let rotated = evaluator.rotate_columns(&acc, step as i64, key)?;
						acc = evaluator.add(&acc, &rotated)?;
						step /= 2;
					}
					results.push(acc);
				}
				// Row r's inner product now sits in every slot of
				// results[r]; place each into its own output slot.
				self.combine_rows(evaluator, results)
			}
			MatrixPacking::DenseColumn => {
				let row_size = vector.context().degree() / 2;
				let per_plaintext = row_size / self.padded;
				let mut total: Option<Ciphertext> = None;
				for plaintext in &self.plaintexts {
					let term = evaluator.multiply_plain(vector, plaintext)?;
					total = Some(match total {
						Some(acc) => evaluator.add(&acc, &term)?,
						None => term,
					});
				}
				let mut acc = total
					.ok_or_else(|| Error::EncodingError("empty matrix product".to_string()))?;
				// Fold the column blocks onto block zero.
				let mut step = per_plaintext / 2;
				while step >= 1 {
					let rotated =
						evaluator.rotate_columns(&acc, (step * self.padded) as i64, key)?;
					acc = evaluator.add(&acc, &rotated)?;
					step /= 2;
				}
				Ok(acc)
			}
		}
	}

	/// Places row inner products into distinct result slots by scaling
	/// each row's ciphertext with a one-hot plaintext and summing.
	fn combine_rows(
		&self,
		evaluator: &Evaluator,
		row_results: Vec<Ciphertext>,
	) -> Result<Ciphertext> {
		let context = row_results[0].context().clone();
		let encoder = Encoder::new(&context);
		let degree = context.degree();
		let mut total: Option<Ciphertext> = None;
		for (r, ct) in row_results.into_iter().enumerate() {
			let mut mask = vec![0u64; degree];
			mask[r] = 1;
			let mask = encoder.encode(&mask, EncodingFormat::Simd)?;
			let term = evaluator.multiply_plain(&ct, &mask)?;
			total = Some(match total {
				Some(acc) => evaluator.add(&acc, &term)?,
				None => term,
			});
		}
		total.ok_or_else(|| Error::EncodingError("empty matrix product".to_string()))
	}
}

/// Encodes a query vector in the slot layout a packing expects.
pub fn encode_vector(
	context: &Arc<Context>,
	values: &[u64],
	packing: MatrixPacking,
	row_count: usize,
) -> Result<Plaintext> {
	let degree = context.degree();
	let encoder = Encoder::new(context);
	match packing {
		MatrixPacking::DenseRow | MatrixPacking::Diagonal {
			..
		} => {
			let padded = padded_dimension(values.len(), degree)?;
			let mut pattern = values.to_vec();
			pattern.resize(padded, 0);
			encoder.encode(&replicate_slots(&pattern, degree), EncodingFormat::Simd)
		}
		MatrixPacking::DenseColumn => {
			let padded_rows = padded_dimension(row_count, degree)?;
			let row_size = degree / 2;
			let per_plaintext = row_size / padded_rows;
			if values.len() > per_plaintext {
				return Err(Error::EncodingError(format!(
					"{} vector entries exceed the {per_plaintext} column blocks",
					values.len()
				)));
			}
			let mut row = vec![0u64; row_size];
			for (c, v) in values.iter().enumerate() {
				for r in 0..padded_rows {
					row[c * padded_rows + r] = *v;
				}
			}
			let mut slots = row.clone();
			slots.extend_from_slice(&row);
			encoder.encode(&slots, EncodingFormat::Simd)
		}
	}
}
