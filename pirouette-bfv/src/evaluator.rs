//! Homomorphic operations on ciphertexts.

use std::sync::Arc;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::galois::GaloisElement;
use crate::key_generator::{EvaluationKey, KeySwitchKey, RelinearizationKey};
use crate::plaintext::Plaintext;
use crate::poly::{Polynomial, Representation};

/// Evaluates homomorphic operations over one context.
///
/// Binary operations require both operands at the same level with the
/// same correction factor; violations surface as errors and leave the
/// operands untouched.
pub struct Evaluator {
	context: Arc<Context>,
}

impl Evaluator {
	/// Creates an evaluator over the given context.
	pub fn new(context: &Arc<Context>) -> Self {
		Self {
			context: context.clone(),
		}
	}

	fn check_ciphertext(&self, ct: &Ciphertext) -> Result<()> {
		if ct.context() != &self.context {
			return Err(Error::ContextMismatch);
		}
		Ok(())
	}

	/// Componentwise sum of two ciphertexts.
	pub fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
		self.check_ciphertext(lhs)?;
		lhs.check_same_shape(rhs)?;
		let polys = lhs
			.polys
			.iter()
			.zip(&rhs.polys)
			.map(|(a, b)| a.add(b))
			.collect::<Result<Vec<_>>>()?;
		Ok(Ciphertext {
			context: self.context.clone(),
			polys,
			level: lhs.level,
			correction_factor: lhs.correction_factor,
			seed: None,
		})
	}

	/// Componentwise difference of two ciphertexts.
	pub fn sub(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
		self.check_ciphertext(lhs)?;
		lhs.check_same_shape(rhs)?;
		let polys = lhs
			.polys
			.iter()
			.zip(&rhs.polys)
			.map(|(a, b)| a.sub(b))
			.collect::<Result<Vec<_>>>()?;
		Ok(Ciphertext {
			context: self.context.clone(),
			polys,
			level: lhs.level,
			correction_factor: lhs.correction_factor,
			seed: None,
		})
	}

	/// Negation of a ciphertext.
	pub fn negate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		let mut out = ct.clone();
		out.polys.iter_mut().for_each(Polynomial::negate);
		out.clear_seed();
		Ok(out)
	}

	/// Lifts the plaintext to the ciphertext's level, matching its
	/// correction factor, scaled by `⌊Q_l/t⌋`.
	fn lifted_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Polynomial> {
		let t = self.context.plain_modulus();
		let adjusted = if ct.correction_factor == 1 {
			plain.clone()
		} else {
			let values: Vec<u64> = plain
				.coefficients()
				.iter()
				.map(|v| t.mul(*v, ct.correction_factor))
				.collect();
			Plaintext {
				poly: Polynomial::from_values(self.context.plain_context(), &values)?,
			}
		};
		adjusted.scaled_poly(&self.context, ct.level)
	}

	/// Adds a plaintext offset. Only the `b` polynomial is touched, so
	/// the ciphertext's seed survives.
	pub fn add_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		let offset = self.lifted_plain(ct, plain)?;
		let mut out = ct.clone();
		out.polys[0].add_assign(&offset)?;
		Ok(out)
	}

	/// Subtracts a plaintext offset; the seed survives.
	pub fn sub_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		let offset = self.lifted_plain(ct, plain)?;
		let mut out = ct.clone();
		out.polys[0].sub_assign(&offset)?;
		Ok(out)
	}

	/// Pointwise product with a plaintext: each polynomial is multiplied
	/// by the unscaled plaintext polynomial in evaluation form.
	pub fn multiply_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		let operand = plain.eval_poly(&self.context, ct.level)?;
		let mut out = ct.clone();
		for poly in &mut out.polys {
			poly.mul_assign(&operand)?;
		}
		out.clear_seed();
		Ok(out)
	}

	/// School-book ciphertext product with the BFV `t/Q` rounding step:
	/// both operands are lifted into the extended NTT basis, tensored,
	/// and scaled back down. Two size-2 inputs produce a size-3 result;
	/// [`Evaluator::relinearize`] reduces it back.
	pub fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
		self.check_ciphertext(lhs)?;
		self.check_ciphertext(rhs)?;
		if lhs.level != rhs.level {
			return Err(Error::LevelMismatch(lhs.level, rhs.level));
		}
		let level = lhs.level;
		let base_ctx = self.context.poly_context(level)?;
		let ext_ctx = self.context.mul_context(level)?;
		let down_scaler = self.context.mul_down_scaler(level)?;

		let extend = |ct: &Ciphertext| -> Result<Vec<Polynomial>> {
			ct.polys
				.iter()
				.map(|p| {
					let mut p = p.clone();
					p.to_coefficient()?;
					let mut extended = p.convert_basis(ext_ctx)?;
					extended.to_evaluation()?;
					Ok(extended)
				})
				.collect()
		};
		let a = extend(lhs)?;
		let b = extend(rhs)?;

		let mut tensor =
			vec![Polynomial::zero(ext_ctx, Representation::Evaluation); a.len() + b.len() - 1];
		for (i, ai) in a.iter().enumerate() {
			for (j, bj) in b.iter().enumerate() {
				let prod = ai.mul(bj)?;
				tensor[i + j].add_assign(&prod)?;
			}
		}

		let polys = tensor
			.into_iter()
			.map(|mut p| {
				p.to_coefficient()?;
				let mut down = p.scale(down_scaler, base_ctx)?;
				down.to_evaluation()?;
				Ok(down)
			})
			.collect::<Result<Vec<_>>>()?;

		let t = self.context.plain_modulus();
		Ok(Ciphertext {
			context: self.context.clone(),
			polys,
			level,
			correction_factor: t.mul(lhs.correction_factor, rhs.correction_factor),
			seed: None,
		})
	}

	/// Decomposes `source` (coefficient form, level 0) into its RNS
	/// residue digits, accumulates the rows of the key-switch key over
	/// the key basis `Q·P`, and divides the special prime back out,
	/// returning the evaluation-form pair to fold into a ciphertext.
	fn key_switch_accumulate(
		&self,
		source: &Polynomial,
		key: &KeySwitchKey,
	) -> Result<(Polynomial, Polynomial)> {
		let base_ctx = self.context.poly_context(0)?;
		let key_ctx = self.context.key_context();
		let inv_special = self.context.inv_special();
		let mut acc0 = Polynomial::zero(key_ctx, Representation::Evaluation);
		let mut acc1 = Polynomial::zero(key_ctx, Representation::Evaluation);
		for i in 0..base_ctx.limb_count() {
			let mut digit = Polynomial::from_values(key_ctx, source.limb(i))?;
			digit.to_evaluation()?;
			acc0.add_assign(&digit.mul(&key.c0[i])?)?;
			acc1.add_assign(&digit.mul(&key.c1[i])?)?;
		}
		let divide = |mut acc: Polynomial| -> Result<Polynomial> {
			acc.to_coefficient()?;
			let mut out = acc.drop_last_limb(base_ctx, inv_special)?;
			out.to_evaluation()?;
			Ok(out)
		};
		Ok((divide(acc0)?, divide(acc1)?))
	}

	/// Reduces a size-3 ciphertext back to size 2 using the
	/// relinearization key.
	pub fn relinearize(&self, ct: &Ciphertext, key: &RelinearizationKey) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		if ct.polys.len() != 3 {
			return Err(Error::CiphertextSize {
				expected: 3,
				got: ct.polys.len(),
			});
		}
		if ct.level != 0 {
			return Err(Error::KeySwitchLevel(ct.level));
		}
		let mut c2 = ct.polys[2].clone();
		c2.to_coefficient()?;
		let (d0, d1) = self.key_switch_accumulate(&c2, &key.key)?;
		Ok(Ciphertext {
			context: self.context.clone(),
			polys: vec![ct.polys[0].add(&d0)?, ct.polys[1].add(&d1)?],
			level: ct.level,
			correction_factor: ct.correction_factor,
			seed: None,
		})
	}

	/// Applies the automorphism `x -> x^element` to a size-2 ciphertext
	/// and key-switches the result back under the original key.
	pub fn apply_galois(
		&self,
		ct: &Ciphertext,
		element: u64,
		key: &EvaluationKey,
	) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		if ct.polys.len() != 2 {
			return Err(Error::CiphertextSize {
				expected: 2,
				got: ct.polys.len(),
			});
		}
		if ct.level != 0 {
			return Err(Error::KeySwitchLevel(ct.level));
		}
		GaloisElement::validate(element, self.context.degree())?;
		let galois_key = key.galois_key(element)?;

		let mut b = ct.polys[0].clone();
		let mut a = ct.polys[1].clone();
		b.to_coefficient()?;
		a.to_coefficient()?;
		let b_g = b.substitute(element)?;
		let a_g = a.substitute(element)?;

		// The key targets s(x^g) - s, so the permuted pair stays in
		// place and the accumulated rows supply the correction.
		let (d0, d1) = self.key_switch_accumulate(&a_g, &galois_key.key)?;
		let mut c0 = b_g;
		c0.to_evaluation()?;
		c0.add_assign(&d0)?;
		let mut c1 = a_g;
		c1.to_evaluation()?;
		c1.add_assign(&d1)?;

		Ok(Ciphertext {
			context: self.context.clone(),
			polys: vec![c0, c1],
			level: ct.level,
			correction_factor: ct.correction_factor,
			seed: None,
		})
	}

	/// Rotates the SIMD columns by `steps` (positive rotates left).
	pub fn rotate_columns(
		&self,
		ct: &Ciphertext,
		steps: i64,
		key: &EvaluationKey,
	) -> Result<Ciphertext> {
		let element = GaloisElement::rotating_columns_by(steps, self.context.degree())?;
		self.apply_galois(ct, element, key)
	}

	/// Swaps the two SIMD rows.
	pub fn swap_rows(&self, ct: &Ciphertext, key: &EvaluationKey) -> Result<Ciphertext> {
		let element = GaloisElement::swapping_rows(self.context.degree());
		self.apply_galois(ct, element, key)
	}

	/// Multiplies by the monomial `x^power` (power taken modulo `2N`);
	/// no key material is needed.
	pub fn multiply_by_monomial(&self, ct: &Ciphertext, power: usize) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		let polys = ct
			.polys
			.iter()
			.map(|p| {
				let mut p = p.clone();
				p.to_coefficient()?;
				let mut shifted = p.multiply_monomial(power)?;
				shifted.to_evaluation()?;
				Ok(shifted)
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(Ciphertext {
			context: self.context.clone(),
			polys,
			level: ct.level,
			correction_factor: ct.correction_factor,
			seed: None,
		})
	}

	/// Drops the last modulus of the chain by lift-and-subtract. Fails
	/// on a single-modulus ciphertext.
	pub fn mod_switch_down(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		self.check_ciphertext(ct)?;
		if ct.modulus_count() < 2 {
			return Err(Error::AlreadySingleModulus);
		}
		let level = ct.level;
		let target = self.context.poly_context(level + 1)?;
		let inv_last = self.context.inv_last(level)?;
		let polys = ct
			.polys
			.iter()
			.map(|p| {
				let mut p = p.clone();
				p.to_coefficient()?;
				let mut dropped = p.drop_last_limb(target, inv_last)?;
				dropped.to_evaluation()?;
				Ok(dropped)
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(Ciphertext {
			context: self.context.clone(),
			polys,
			level: level + 1,
			correction_factor: ct.correction_factor,
			seed: None,
		})
	}

	/// Mod-switches unless the ciphertext already has a single modulus,
	/// in which case it is returned unchanged.
	pub fn try_mod_switch_down(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		if ct.modulus_count() < 2 {
			return Ok(ct.clone());
		}
		self.mod_switch_down(ct)
	}

	/// Repeats [`Evaluator::mod_switch_down`] until one modulus remains.
	pub fn mod_switch_to_single(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		let mut ct = ct.clone();
		while ct.modulus_count() > 1 {
			ct = self.mod_switch_down(&ct)?;
		}
		Ok(ct)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decryptor::Decryptor;
	use crate::encryptor::Encryptor;
	use crate::key_generator::{EvaluationKeyBuilder, SecretKey};
	use crate::parameters::EncryptionParametersBuilder;
	use crate::plaintext::{Encoder, EncodingFormat};

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

	struct Fixture {
		context: Arc<Context>,
		sk: SecretKey,
	}

	impl Fixture {
		fn new() -> Self {
			let context = context();
			let sk = SecretKey::random(&context).unwrap();
			Self {
				context,
				sk,
			}
		}

		fn encoder(&self) -> Encoder {
			Encoder::new(&self.context)
		}

		fn encrypt(&self, values: &[u64], format: EncodingFormat) -> Ciphertext {
			let pt = self.encoder().encode(values, format).unwrap();
			Encryptor::new(&self.context, &self.sk)
				.unwrap()
				.encrypt(&pt)
				.unwrap()
		}

		fn decrypt(&self, ct: &Ciphertext, format: EncodingFormat) -> Vec<u64> {
			let decryptor = Decryptor::new(&self.context, &self.sk).unwrap();
			let pt = decryptor.decrypt(ct).unwrap();
			self.encoder().decode(&pt, format).unwrap()
		}
	}

	#[test]
	fn add_decrypts_to_plaintext_sum() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let a = vec![1u64, 16, 3, 4, 0, 6, 7, 8];
		let b = vec![16u64, 2, 13, 4, 5, 6, 0, 8];
		let expected: Vec<u64> = a.iter().zip(&b).map(|(x, y)| (x + y) % 17).collect();
		let ct = evaluator
			.add(
				&f.encrypt(&a, EncodingFormat::Coefficient),
				&f.encrypt(&b, EncodingFormat::Coefficient),
			)
			.unwrap();
		assert!(!ct.is_fresh());
		assert_eq!(f.decrypt(&ct, EncodingFormat::Coefficient), expected);
	}

	#[test]
	fn sub_and_negate() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let a = vec![5u64, 0, 3, 9, 11, 2, 1, 16];
		let b = vec![1u64, 4, 16, 2, 12, 2, 0, 3];
		let diff: Vec<u64> = a.iter().zip(&b).map(|(x, y)| (17 + x - y) % 17).collect();
		let neg: Vec<u64> = a.iter().map(|x| (17 - x) % 17).collect();

		let ca = f.encrypt(&a, EncodingFormat::Coefficient);
		let cb = f.encrypt(&b, EncodingFormat::Coefficient);
		assert_eq!(
			f.decrypt(&evaluator.sub(&ca, &cb).unwrap(), EncodingFormat::Coefficient),
			diff
		);
		assert_eq!(
			f.decrypt(&evaluator.negate(&ca).unwrap(), EncodingFormat::Coefficient),
			neg
		);
	}

	#[test]
	fn repeated_plain_addition_wraps_modulo_t() {
		// Encode [0..8), encrypt, add the plaintext once and then again:
		// the doubled and tripled sequences, wrapping modulo 17.
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let values = vec![0u64, 1, 2, 3, 4, 5, 6, 7];
		let pt = f
			.encoder()
			.encode(&values, EncodingFormat::Coefficient)
			.unwrap();
		let ct = f.encrypt(&values, EncodingFormat::Coefficient);

		let once = evaluator.add_plain(&ct, &pt).unwrap();
		assert_eq!(
			f.decrypt(&once, EncodingFormat::Coefficient),
			vec![0, 2, 4, 6, 8, 10, 12, 14]
		);

		let twice = evaluator.add_plain(&once, &pt).unwrap();
		assert_eq!(
			f.decrypt(&twice, EncodingFormat::Coefficient),
			vec![0, 3, 6, 9, 12, 15, 1, 4]
		);
	}

	#[test]
	fn plain_addition_preserves_the_seed() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let pt = f
			.encoder()
			.encode(&[1, 2, 3], EncodingFormat::Coefficient)
			.unwrap();
		let ct = f.encrypt(&[4, 5, 6], EncodingFormat::Coefficient);
		assert!(ct.is_fresh());
		let sum = evaluator.add_plain(&ct, &pt).unwrap();
		assert!(sum.is_fresh());
		let product = evaluator.multiply_plain(&ct, &pt).unwrap();
		assert!(!product.is_fresh());
	}

	#[test]
	fn multiply_plain_is_slotwise_under_simd() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let a = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
		let b = vec![2u64, 2, 2, 3, 3, 3, 4, 4];
		let expected: Vec<u64> = a.iter().zip(&b).map(|(x, y)| x * y % 17).collect();
		let ct = f.encrypt(&a, EncodingFormat::Simd);
		let pt = f.encoder().encode(&b, EncodingFormat::Simd).unwrap();
		let product = evaluator.multiply_plain(&ct, &pt).unwrap();
		assert_eq!(f.decrypt(&product, EncodingFormat::Simd), expected);
	}

	#[test]
	fn square_relinearize_switch_to_single() {
		// Encrypt [1..9) SIMD, square, relinearize, mod-switch to one
		// modulus: the slot-wise squares modulo 17.
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let ek = EvaluationKeyBuilder::new(&f.sk)
			.enable_relinearization()
			.build()
			.unwrap();
		let values = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
		let ct = f.encrypt(&values, EncodingFormat::Simd);

		let squared = evaluator.multiply(&ct, &ct).unwrap();
		assert_eq!(squared.size(), 3);
		let relinearized = evaluator
			.relinearize(&squared, &ek.relinearization_key().unwrap())
			.unwrap();
		assert_eq!(relinearized.size(), 2);
		let switched = evaluator.mod_switch_to_single(&relinearized).unwrap();
		assert_eq!(switched.modulus_count(), 1);

		assert_eq!(
			f.decrypt(&switched, EncodingFormat::Simd),
			vec![1, 4, 9, 16, 8, 2, 15, 13]
		);
	}

	#[test]
	fn multiplication_decrypts_to_product_before_relinearization() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let a = vec![3u64, 1, 4, 1, 5, 9, 2, 6];
		let b = vec![2u64, 7, 1, 8, 2, 8, 1, 8];
		let expected: Vec<u64> = a.iter().zip(&b).map(|(x, y)| x * y % 17).collect();
		let product = evaluator
			.multiply(
				&f.encrypt(&a, EncodingFormat::Simd),
				&f.encrypt(&b, EncodingFormat::Simd),
			)
			.unwrap();
		// A size-3 ciphertext still decrypts directly.
		assert_eq!(f.decrypt(&product, EncodingFormat::Simd), expected);
	}

	#[test]
	fn galois_permutes_simd_slots() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let values = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
		let ct = f.encrypt(&values, EncodingFormat::Simd);

		let rotate = GaloisElement::rotating_columns_by(1, 8).unwrap();
		let swap = GaloisElement::swapping_rows(8);
		let ek = EvaluationKeyBuilder::new(&f.sk)
			.add_galois_element(rotate)
			.add_galois_element(swap)
			.build()
			.unwrap();

		// Rows of the 2 x 4 SIMD matrix rotate left by one.
		let rotated = evaluator.rotate_columns(&ct, 1, &ek).unwrap();
		assert_eq!(
			f.decrypt(&rotated, EncodingFormat::Simd),
			vec![2, 3, 4, 1, 6, 7, 8, 5]
		);

		// Swapping rows exchanges the halves.
		let swapped = evaluator.swap_rows(&ct, &ek).unwrap();
		assert_eq!(
			f.decrypt(&swapped, EncodingFormat::Simd),
			vec![5, 6, 7, 8, 1, 2, 3, 4]
		);
	}

	#[test]
	fn galois_without_key_fails_and_leaves_input_unchanged() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let ct = f.encrypt(&[1, 2, 3, 4, 5, 6, 7, 8], EncodingFormat::Simd);
		let ek = EvaluationKeyBuilder::new(&f.sk).build().unwrap();
		let before = ct.clone();
		assert!(matches!(
			evaluator.apply_galois(&ct, 3, &ek),
			Err(Error::MissingGaloisKey(3))
		));
		assert_eq!(ct, before);
	}

	#[test]
	fn monomial_shift_moves_coefficients() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let values = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
		let ct = f.encrypt(&values, EncodingFormat::Coefficient);
		// x^{-1}: coefficient 0 moves out with a sign flip on wrap.
		let shifted = evaluator.multiply_by_monomial(&ct, 2 * 8 - 1).unwrap();
		assert_eq!(
			f.decrypt(&shifted, EncodingFormat::Coefficient),
			vec![2, 3, 4, 5, 6, 7, 8, 17 - 1]
		);
	}

	#[test]
	fn mod_switch_preserves_the_plaintext() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let values = vec![9u64, 8, 7, 6, 5, 4, 3, 2];
		let ct = f.encrypt(&values, EncodingFormat::Coefficient);

		let once = evaluator.mod_switch_down(&ct).unwrap();
		assert_eq!(once.modulus_count(), 2);
		assert_eq!(f.decrypt(&once, EncodingFormat::Coefficient), values);

		let single = evaluator.mod_switch_to_single(&ct).unwrap();
		assert_eq!(single.modulus_count(), 1);
		assert_eq!(f.decrypt(&single, EncodingFormat::Coefficient), values);

		assert!(matches!(
			evaluator.mod_switch_down(&single),
			Err(Error::AlreadySingleModulus)
		));
		let unchanged = evaluator.try_mod_switch_down(&single).unwrap();
		assert_eq!(unchanged, single);
	}

	#[test]
	fn multiplication_is_forbidden_at_a_single_modulus() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let ct = f.encrypt(&[1, 2], EncodingFormat::Coefficient);
		let single = evaluator.mod_switch_to_single(&ct).unwrap();
		assert!(matches!(
			evaluator.multiply(&single, &single),
			Err(Error::MultiplicationAtSingleModulus)
		));
	}

	#[test]
	fn level_mismatch_is_rejected() {
		let f = Fixture::new();
		let evaluator = Evaluator::new(&f.context);
		let ct = f.encrypt(&[1, 2], EncodingFormat::Coefficient);
		let switched = evaluator.mod_switch_down(&ct).unwrap();
		assert!(matches!(
			evaluator.add(&ct, &switched),
			Err(Error::LevelMismatch(0, 1))
		));
	}
}
