//! Plaintexts and the two encodings mapping values onto them.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::poly::{Polynomial, Representation};

/// The two maps from application values to plaintext polynomials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
	/// The `i`-th value becomes the `i`-th coefficient.
	Coefficient,
	/// The `N` slots of the batching isomorphism carry independent
	/// lanes; requires `t ≡ 1 (mod 2N)`.
	Simd,
}

/// A polynomial over the plaintext modulus `t`, in coefficient form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext {
	pub(crate) poly: Polynomial,
}

impl Plaintext {
	/// Returns the raw coefficients in `[0, t)`.
	pub fn coefficients(&self) -> &[u64] {
		self.poly.limb(0)
	}

	/// Lifts this plaintext into the coefficient basis at `level`,
	/// scaled by `⌊Q_l/t⌋`: the form added into the `b` polynomial by
	/// encryption and plaintext addition.
	pub(crate) fn scaled_poly(&self, context: &Arc<Context>, level: usize) -> Result<Polynomial> {
		let ctx = context.poly_context(level)?;
		let mut poly = Polynomial::from_values(ctx, self.coefficients())?;
		poly.scale_limbs(context.delta(level));
		poly.to_evaluation()?;
		Ok(poly)
	}

	/// Lifts this plaintext unscaled into the coefficient basis at
	/// `level`, in evaluation form: the operand of a plaintext
	/// multiplication.
	pub(crate) fn eval_poly(&self, context: &Arc<Context>, level: usize) -> Result<Polynomial> {
		let ctx = context.poly_context(level)?;
		let mut poly = Polynomial::from_values(ctx, self.coefficients())?;
		poly.to_evaluation()?;
		Ok(poly)
	}
}

/// Encodes and decodes vectors of integers modulo `t`.
pub struct Encoder {
	context: Arc<Context>,
}

impl Encoder {
	/// Creates an encoder over the given context.
	pub fn new(context: &Arc<Context>) -> Self {
		Self {
			context: context.clone(),
		}
	}

	/// Returns the number of values one plaintext can carry.
	pub fn slot_count(&self) -> usize {
		self.context.degree()
	}

	/// Encodes up to `N` values of `[0, t)` under the requested format.
	pub fn encode(&self, values: &[u64], format: EncodingFormat) -> Result<Plaintext> {
		let n = self.context.degree();
		let t = self.context.plain_modulus().value();
		if values.len() > n {
			return Err(Error::EncodingError(format!(
				"{} values exceed the {} slots",
				values.len(),
				n
			)));
		}
		if let Some(v) = values.iter().find(|v| **v >= t) {
			return Err(Error::EncodingError(format!(
				"value {v} is not reduced modulo the plaintext modulus {t}"
			)));
		}
		let poly = match format {
			EncodingFormat::Coefficient => {
				Polynomial::from_values(self.context.plain_context(), values)?
			}
			EncodingFormat::Simd => {
				let map = self.context.simd_index_map()?;
				let mut slots = vec![0u64; n];
				for (i, v) in values.iter().enumerate() {
					slots[map[i]] = *v;
				}
				let mut poly = Polynomial::zero(
					self.context.plain_context(),
					Representation::Evaluation,
				);
				poly.limb_mut(0).copy_from_slice(&slots);
				poly.to_coefficient()?;
				poly
			}
		};
		Ok(Plaintext {
			poly,
		})
	}

	/// Encodes signed values from the centered range
	/// `[-⌈t/2⌉ + 1, ⌊t/2⌋]`.
	pub fn encode_signed(&self, values: &[i64], format: EncodingFormat) -> Result<Plaintext> {
		let t = self.context.plain_modulus();
		let half = t.value() as i64 / 2;
		let lowest = -((t.value() as i64 - 1) / 2);
		if let Some(v) = values.iter().find(|v| **v > half || **v < lowest) {
			return Err(Error::EncodingError(format!(
				"value {v} is outside the centered range of the plaintext modulus"
			)));
		}
		let unsigned: Vec<u64> = values.iter().map(|v| t.from_centered(*v)).collect();
		self.encode(&unsigned, format)
	}

	/// Decodes a plaintext under the requested format.
	///
	/// Decoding with a format other than the one used to encode returns
	/// well-defined nonsense rather than an error.
	pub fn decode(&self, plaintext: &Plaintext, format: EncodingFormat) -> Result<Vec<u64>> {
		match format {
			EncodingFormat::Coefficient => Ok(plaintext.coefficients().to_vec()),
			EncodingFormat::Simd => {
				let map = self.context.simd_index_map()?;
				let mut poly = plaintext.poly.clone();
				poly.to_evaluation()?;
				let slots = poly.limb(0);
				Ok((0..self.context.degree()).map(|i| slots[map[i]]).collect())
			}
		}
	}

	/// Decodes into the centered range.
	pub fn decode_signed(&self, plaintext: &Plaintext, format: EncodingFormat) -> Result<Vec<i64>> {
		let t = self.context.plain_modulus().clone();
		Ok(self
			.decode(plaintext, format)?
			.iter()
			.map(|v| t.center(*v))
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parameters::EncryptionParametersBuilder;

	fn context() -> Arc<Context> {
		Context::new(
			EncryptionParametersBuilder::new()
				.set_degree(8)
				.set_plain_modulus(17)
				.set_coefficient_moduli_bits(vec![18, 18, 18])
				.build()
				.unwrap(),
		)
		.unwrap()
	}

	#[test]
	fn coefficient_roundtrip() {
		let ctx = context();
		let encoder = Encoder::new(&ctx);
		let values = vec![0u64, 1, 2, 3, 4, 5, 6, 7];
		let pt = encoder.encode(&values, EncodingFormat::Coefficient).unwrap();
		assert_eq!(
			encoder.decode(&pt, EncodingFormat::Coefficient).unwrap(),
			values
		);
	}

	#[test]
	fn simd_roundtrip() {
		let ctx = context();
		let encoder = Encoder::new(&ctx);
		let values = vec![16u64, 1, 5, 3, 0, 11, 6, 7];
		let pt = encoder.encode(&values, EncodingFormat::Simd).unwrap();
		assert_eq!(encoder.decode(&pt, EncodingFormat::Simd).unwrap(), values);
	}

	#[test]
	fn signed_roundtrip_on_centered_range() {
		let ctx = context();
		let encoder = Encoder::new(&ctx);
		let values = vec![-8i64, -1, 0, 1, 8, -3, 3, 2];
		for format in [EncodingFormat::Coefficient, EncodingFormat::Simd] {
			let pt = encoder.encode_signed(&values, format).unwrap();
			assert_eq!(encoder.decode_signed(&pt, format).unwrap(), values);
		}
		assert!(encoder
			.encode_signed(&[9], EncodingFormat::Coefficient)
			.is_err());
		assert!(encoder
			.encode_signed(&[-9], EncodingFormat::Coefficient)
			.is_err());
	}

	#[test]
	fn unreduced_values_are_rejected() {
		let ctx = context();
		let encoder = Encoder::new(&ctx);
		assert!(encoder.encode(&[17], EncodingFormat::Coefficient).is_err());
		assert!(encoder.encode(&[0; 9], EncodingFormat::Coefficient).is_err());
	}

	#[test]
	fn mixed_format_decode_returns_nonsense_without_error() {
		let ctx = context();
		let encoder = Encoder::new(&ctx);
		let values = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
		let pt = encoder.encode(&values, EncodingFormat::Coefficient).unwrap();
		let decoded = encoder.decode(&pt, EncodingFormat::Simd).unwrap();
		assert_eq!(decoded.len(), values.len());
		assert_ne!(decoded, values);
	}

	#[test]
	fn simd_requires_batching_modulus() {
		let params = EncryptionParametersBuilder::new()
			.set_degree(8)
			.set_plain_modulus(23)
			.set_coefficient_moduli_bits(vec![30])
			.build()
			.unwrap();
		let ctx = Context::new(params).unwrap();
		let encoder = Encoder::new(&ctx);
		assert!(matches!(
			encoder.encode(&[1, 2], EncodingFormat::Simd),
			Err(Error::SimdNotSupported(23, 8))
		));
	}
}
