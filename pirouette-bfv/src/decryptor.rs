//! Decryption and the noise-budget oracle.

use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::Signed;
use zeroize::Zeroize;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::key_generator::SecretKey;
use crate::plaintext::Plaintext;
use crate::poly::Polynomial;

/// The noise-budget floor below which the next operation is likely to
/// decrypt incorrectly. Database-processing validation refuses
/// parameter sets that land under it.
pub const MIN_NOISE_BUDGET: u32 = 1;

/// Decrypts ciphertexts under a borrowed secret key.
pub struct Decryptor<'k> {
	context: Arc<Context>,
	secret_key: &'k SecretKey,
}

impl<'k> Decryptor<'k> {
	/// Creates a decryptor for the key's context.
	pub fn new(context: &Arc<Context>, secret_key: &'k SecretKey) -> Result<Self> {
		if secret_key.context() != context {
			return Err(Error::ContextMismatch);
		}
		Ok(Self {
			context: context.clone(),
			secret_key,
		})
	}

	/// Evaluates `c(s) = c_0 + c_1·s + c_2·s^2 + ...` over the current
	/// chain, in coefficient form.
	fn evaluate_at_secret(&self, ciphertext: &Ciphertext) -> Result<Polynomial> {
		// The secret key lives at level 0; project it down as needed.
		let level = ciphertext.level;
		let ctx = self.context.poly_context(level)?;
		let mut s = self.secret_key.s.clone();
		if level > 0 {
			s.to_coefficient()?;
			let mut projected = Polynomial::zero(ctx, crate::poly::Representation::Coefficient);
			for i in 0..ctx.limb_count() {
				projected.limb_mut(i).copy_from_slice(s.limb(i));
			}
			s.zeroize();
			s = projected;
			s.to_evaluation()?;
		}

		let mut acc = ciphertext.polys[0].clone();
		let mut s_power = s.clone();
		for (i, poly) in ciphertext.polys.iter().enumerate().skip(1) {
			let term = poly.mul(&s_power)?;
			acc.add_assign(&term)?;
			if i + 1 < ciphertext.polys.len() {
				s_power.mul_assign(&s)?;
			}
		}
		s_power.zeroize();
		s.zeroize();
		acc.to_coefficient()?;
		Ok(acc)
	}

	/// Decrypts: `m = f^{-1} · ⌊(t/Q)·c(s)⌉ mod t`, where `f` is the
	/// ciphertext's correction factor.
	pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Plaintext> {
		if ciphertext.context() != &self.context {
			return Err(Error::ContextMismatch);
		}
		let level = ciphertext.level;
		let mut c_s = self.evaluate_at_secret(ciphertext)?;
		let scaler = self.context.decrypt_scaler(level);

		let t = self.context.plain_modulus().clone();
		let n = self.context.degree();
		let mut values = vec![0u64; n];
		for (j, value) in values.iter_mut().enumerate() {
			let residues = c_s.coefficient_residues(j);
			*value = scaler.scale_coefficient(&residues)[0];
		}
		c_s.zeroize();

		if ciphertext.correction_factor != 1 {
			let inv = t
				.inv(ciphertext.correction_factor)
				.ok_or_else(|| {
					Error::InvalidParameters(format!(
						"correction factor {} is not invertible modulo t",
						ciphertext.correction_factor
					))
				})?;
			values.iter_mut().for_each(|v| *v = t.mul(*v, inv));
		}

		let poly = Polynomial::from_values(self.context.plain_context(), &values)?;
		values.zeroize();
		Ok(Plaintext {
			poly,
		})
	}

	/// Measures the invariant noise budget of a ciphertext, using the
	/// owner's secret key: with `v = [t·c(s)]_Q` in centered form, the
	/// budget is `log2(Q) - log2 ‖v‖∞ - 1`. A budget of zero means the
	/// next operation (or decryption itself) is likely to be incorrect.
	///
	/// This oracle is meant for tests and the validation phase of
	/// database processing; production paths must not branch on it.
	pub fn noise_budget(&self, ciphertext: &Ciphertext) -> Result<u32> {
		let level = ciphertext.level;
		let ctx = self.context.poly_context(level)?;
		let t = self.context.plain_modulus().value();

		let mut c_s = self.evaluate_at_secret(ciphertext)?;
		let q = BigInt::from(ctx.rns().product().clone());
		let half = &q >> 1;

		let q_bits = ctx.rns().product_bits();
		let mut noise_bits = 0u64;
		for j in 0..self.context.degree() {
			let x = ctx.rns().lift(&c_s.coefficient_residues(j));
			let mut v = BigInt::from(x * t) % &q;
			if v > half {
				v -= &q;
			}
			noise_bits = noise_bits.max(v.abs().bits());
		}
		c_s.zeroize();

		Ok(q_bits.saturating_sub(noise_bits + 1) as u32)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::encryptor::Encryptor;
	use crate::parameters::EncryptionParametersBuilder;
	use crate::plaintext::{Encoder, EncodingFormat};

	fn context(degree: usize, t: u64, bits: &[usize]) -> Arc<Context> {
		Context::new(
			EncryptionParametersBuilder::new()
				.set_degree(degree)
				.set_plain_modulus(t)
				.set_coefficient_moduli_bits(bits.to_vec())
				.build()
				.unwrap(),
		)
		.unwrap()
	}

	#[test]
	fn encrypt_decrypt_roundtrip() {
		for bits in [&[18usize] as &[usize], &[18, 18], &[18, 18, 18]] {
			let ctx = context(8, 17, bits);
			let sk = SecretKey::random(&ctx).unwrap();
			let encryptor = Encryptor::new(&ctx, &sk).unwrap();
			let decryptor = Decryptor::new(&ctx, &sk).unwrap();
			let encoder = Encoder::new(&ctx);

			for _ in 0..20 {
				let values: Vec<u64> = (0..8)
					.map(|_| crate::modulus::Modulus::random_uniform(17, &mut rand::thread_rng()))
					.collect();
				for format in [EncodingFormat::Coefficient, EncodingFormat::Simd] {
					let pt = encoder.encode(&values, format).unwrap();
					let ct = encryptor.encrypt(&pt).unwrap();
					let decrypted = decryptor.decrypt(&ct).unwrap();
					assert_eq!(encoder.decode(&decrypted, format).unwrap(), values);
				}
			}
		}
	}

	#[test]
	fn fresh_ciphertexts_have_substantial_noise_budget() {
		let ctx = context(8, 17, &[18, 18, 18]);
		let sk = SecretKey::random(&ctx).unwrap();
		let encryptor = Encryptor::new(&ctx, &sk).unwrap();
		let decryptor = Decryptor::new(&ctx, &sk).unwrap();
		let pt = Encoder::new(&ctx)
			.encode(&[1, 2, 3, 4], EncodingFormat::Coefficient)
			.unwrap();
		let ct = encryptor.encrypt(&pt).unwrap();
		let budget = decryptor.noise_budget(&ct).unwrap();
		// Q has 54 bits, Δ ~ 2^50; a fresh error is a few bits.
		assert!(budget > 30, "budget = {budget}");
		assert!(budget < 54);
	}

	#[test]
	fn decryption_with_wrong_key_fails_to_match() {
		let ctx = context(8, 17, &[18, 18]);
		let sk = SecretKey::random(&ctx).unwrap();
		let other = SecretKey::random(&ctx).unwrap();
		let encryptor = Encryptor::new(&ctx, &sk).unwrap();
		let encoder = Encoder::new(&ctx);
		let values = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
		let pt = encoder.encode(&values, EncodingFormat::Coefficient).unwrap();
		let ct = encryptor.encrypt(&pt).unwrap();
		let decryptor = Decryptor::new(&ctx, &other).unwrap();
		let decrypted = decryptor.decrypt(&ct).unwrap();
		assert_ne!(encoder.decode(&decrypted, EncodingFormat::Coefficient).unwrap(), values);
	}
}
