//! Symmetric, seeded encryption under the secret key.

use std::sync::Arc;

use rand::thread_rng;
use zeroize::Zeroize;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::key_generator::SecretKey;
use crate::plaintext::Plaintext;
use crate::poly::Polynomial;
use crate::seeded_rng::SeededRng;

/// Encrypts plaintexts under a borrowed secret key.
pub struct Encryptor<'k> {
	context: Arc<Context>,
	secret_key: &'k SecretKey,
}

impl<'k> Encryptor<'k> {
	/// Creates an encryptor for the key's context.
	pub fn new(context: &Arc<Context>, secret_key: &'k SecretKey) -> Result<Self> {
		if secret_key.context() != context {
			return Err(Error::ContextMismatch);
		}
		Ok(Self {
			context: context.clone(),
			secret_key,
		})
	}

	/// Encrypts a plaintext as a fresh seeded ciphertext `(b, a)` with
	/// `b = -(a·s + e) + ⌊Q/t⌋·p` and `a` expanded deterministically
	/// from a recorded 64-byte seed.
	pub fn encrypt(&self, plaintext: &Plaintext) -> Result<Ciphertext> {
		let ctx = self.context.poly_context(0)?;
		let mut rng = thread_rng();
		let seed = SeededRng::random_seed(&mut rng);

		let a = Polynomial::random_from_seed(ctx, &seed, 0);
		let mut a_s = a.mul(&self.secret_key.s)?;

		let mut e = Polynomial::random_error(ctx, &mut rng);
		e.to_evaluation()?;

		let mut m = plaintext.scaled_poly(&self.context, 0)?;

		let mut b = m.clone();
		b.sub_assign(&a_s)?;
		b.sub_assign(&e)?;

		a_s.zeroize();
		e.zeroize();
		m.zeroize();

		Ok(Ciphertext {
			context: self.context.clone(),
			polys: vec![b, a],
			level: 0,
			correction_factor: 1,
			seed: Some(seed),
		})
	}
}
