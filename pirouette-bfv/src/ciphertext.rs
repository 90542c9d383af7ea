//! The BFV ciphertext type and its state machine.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::poly::Polynomial;
use crate::seeded_rng::Seed;

/// An ordered tuple of `k >= 2` polynomials over a prefix of the
/// coefficient-modulus chain.
///
/// A fresh ciphertext records the seed of its `a`-polynomial, enabling
/// the compact seeded serialization. The first mutation clears the seed;
/// the level only ever decreases in modulus count; once a single modulus
/// remains, multiplication is forbidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
	pub(crate) context: Arc<Context>,
	pub(crate) polys: Vec<Polynomial>,
	pub(crate) level: usize,
	pub(crate) correction_factor: u64,
	pub(crate) seed: Option<Seed>,
}

impl Ciphertext {
	/// Returns the context this ciphertext belongs to.
	pub fn context(&self) -> &Arc<Context> {
		&self.context
	}

	/// Returns the number of polynomials (`2` for fresh and relinearized
	/// ciphertexts, `3` after an unrelinearized multiplication).
	pub fn size(&self) -> usize {
		self.polys.len()
	}

	/// Returns the level in the modulus-switching chain; level 0 spans
	/// the full chain.
	pub fn level(&self) -> usize {
		self.level
	}

	/// Returns the number of coefficient moduli still in use.
	pub fn modulus_count(&self) -> usize {
		self.context.level_count() - self.level
	}

	/// Returns the correction factor in `Z_t`.
	pub fn correction_factor(&self) -> u64 {
		self.correction_factor
	}

	/// Returns the recorded seed while the ciphertext is fresh.
	pub fn seed(&self) -> Option<&Seed> {
		self.seed.as_ref()
	}

	/// Whether the seeded serialization is still permitted.
	pub fn is_fresh(&self) -> bool {
		self.seed.is_some()
	}

	/// Marks the ciphertext as mutated, clearing the seed.
	pub(crate) fn clear_seed(&mut self) {
		self.seed = None;
	}

	pub(crate) fn check_same_shape(&self, rhs: &Self) -> Result<()> {
		if self.context != rhs.context {
			return Err(Error::ContextMismatch);
		}
		if self.level != rhs.level {
			return Err(Error::LevelMismatch(self.level, rhs.level));
		}
		if self.polys.len() != rhs.polys.len() {
			return Err(Error::CiphertextSize {
				expected: self.polys.len(),
				got: rhs.polys.len(),
			});
		}
		if self.correction_factor != rhs.correction_factor {
			return Err(Error::CorrectionFactorMismatch(
				self.correction_factor,
				rhs.correction_factor,
			));
		}
		Ok(())
	}
}
