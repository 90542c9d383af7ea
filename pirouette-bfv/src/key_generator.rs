//! Secret keys, key-switch keys, and evaluation keys.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::thread_rng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::poly::Polynomial;
use crate::seeded_rng::{Seed, SeededRng};

/// The secret key: a ternary polynomial held in evaluation form, both
/// over the ciphertext basis and over the key basis `Q·P`.
///
/// The backing storage is overwritten with zeros when the key is
/// dropped.
#[derive(Debug, PartialEq, Eq)]
pub struct SecretKey {
	pub(crate) context: Arc<Context>,
	pub(crate) s: Polynomial,
	pub(crate) s_key: Polynomial,
}

impl Zeroize for SecretKey {
	fn zeroize(&mut self) {
		self.s.zeroize();
		self.s_key.zeroize();
	}
}

impl ZeroizeOnDrop for SecretKey {}

impl Drop for SecretKey {
	fn drop(&mut self) {
		self.zeroize();
	}
}

impl SecretKey {
	/// Samples a fresh key with coefficients uniform on `{-1, 0, 1}`.
	pub fn random(context: &Arc<Context>) -> Result<Self> {
		let ctx = context.poly_context(0)?;
		let mut ternary: Vec<i64> = (0..context.degree())
			.map(|_| {
				crate::modulus::Modulus::random_uniform(3, &mut thread_rng()) as i64 - 1
			})
			.collect();
		let mut s = Polynomial::from_centered_values(ctx, &ternary)?;
		s.to_evaluation()?;
		let mut s_key = Polynomial::from_centered_values(context.key_context(), &ternary)?;
		s_key.to_evaluation()?;
		ternary.zeroize();
		Ok(Self {
			context: context.clone(),
			s,
			s_key,
		})
	}

	/// Returns the context this key belongs to.
	pub fn context(&self) -> &Arc<Context> {
		&self.context
	}
}

/// A key-switch key to the secret key `s` from some target polynomial
/// `w`: row `i` is a ciphertext-like pair `(b_i, a_i)` over the key
/// basis `Q·P` with `b_i = -(a_i·s + e_i) + P·g_i·w`, where `g_i` is
/// the Garner CRT basis element of modulus `i`. The special prime `P`
/// is divided back out after accumulation, absorbing the decomposition
/// noise. The `a_i` are expanded from the recorded seed (stream `i`),
/// so the wire form carries only the `b_i` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySwitchKey {
	pub(crate) c0: Vec<Polynomial>,
	pub(crate) c1: Vec<Polynomial>,
	pub(crate) seed: Seed,
}

impl KeySwitchKey {
	/// Creates a key-switch key from `target` (in evaluation form over
	/// the key basis) to the secret key.
	pub(crate) fn new(secret_key: &SecretKey, target: &Polynomial) -> Result<Self> {
		let context = &secret_key.context;
		let key_ctx = context.key_context();
		let rows = context.poly_context(0)?.limb_count();

		let seed = SeededRng::random_seed(&mut thread_rng());
		let mut c0 = Vec::with_capacity(rows);
		let mut c1 = Vec::with_capacity(rows);
		for i in 0..rows {
			let a = Polynomial::random_from_seed(key_ctx, &seed, i as u32);
			let mut a_s = a.mul(&secret_key.s_key)?;

			let mut e = Polynomial::random_error(key_ctx, &mut thread_rng());
			e.to_evaluation()?;

			let mut b = target.clone();
			b.scale_limbs(context.key_gadget(i));
			b.sub_assign(&a_s)?;
			b.sub_assign(&e)?;

			a_s.zeroize();
			e.zeroize();

			c0.push(b);
			c1.push(a);
		}
		Ok(Self {
			c0,
			c1,
			seed,
		})
	}

	/// Rebuilds the `a_i` rows of a deserialized key from its seed.
	pub(crate) fn expand_rows(context: &Arc<Context>, seed: &Seed, rows: usize) -> Result<Vec<Polynomial>> {
		let key_ctx = context.key_context();
		Ok((0..rows)
			.map(|i| Polynomial::random_from_seed(key_ctx, seed, i as u32))
			.collect())
	}
}

/// Declares the key material an operation set requires: the Galois
/// elements, and whether a relinearization key is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationKeyConfig {
	/// The required Galois elements.
	pub galois_elements: BTreeSet<u64>,
	/// Whether a relinearization key is required.
	pub has_relinearization_key: bool,
}

impl EvaluationKeyConfig {
	/// A config requiring the given elements and no relinearization key.
	pub fn with_galois_elements(elements: impl IntoIterator<Item = u64>) -> Self {
		Self {
			galois_elements: elements.into_iter().collect(),
			has_relinearization_key: false,
		}
	}

	/// A config requiring only a relinearization key.
	pub fn relinearization() -> Self {
		Self {
			galois_elements: BTreeSet::new(),
			has_relinearization_key: true,
		}
	}

	/// The pointwise union of two configs: union of the element sets,
	/// logical OR of the relinearization flag.
	pub fn union(&self, other: &Self) -> Self {
		Self {
			galois_elements: self
				.galois_elements
				.union(&other.galois_elements)
				.copied()
				.collect(),
			has_relinearization_key: self.has_relinearization_key
				|| other.has_relinearization_key,
		}
	}

	/// Whether this config covers everything `other` requires.
	pub fn contains(&self, other: &Self) -> bool {
		(self.has_relinearization_key || !other.has_relinearization_key)
			&& other.galois_elements.is_subset(&self.galois_elements)
	}
}

/// A Galois key: the key-switch key for one automorphism element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaloisKey {
	pub(crate) element: u64,
	pub(crate) key: KeySwitchKey,
}

/// A relinearization key: the key-switch key for `s^2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinearizationKey {
	pub(crate) key: KeySwitchKey,
}

/// The evaluation key: Galois keys by element, plus an optional
/// relinearization key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationKey {
	pub(crate) galois: BTreeMap<u64, GaloisKey>,
	pub(crate) relinearization: Option<RelinearizationKey>,
}

impl EvaluationKey {
	/// Returns the Galois key for `element`, when present.
	pub fn galois_key(&self, element: u64) -> Result<&GaloisKey> {
		self.galois
			.get(&element)
			.ok_or(Error::MissingGaloisKey(element))
	}

	/// Whether a Galois key for `element` is present.
	pub fn has_galois_key(&self, element: u64) -> bool {
		self.galois.contains_key(&element)
	}

	/// Returns the relinearization key, when present.
	pub fn relinearization_key(&self) -> Result<&RelinearizationKey> {
		self.relinearization
			.as_ref()
			.ok_or(Error::MissingRelinearizationKey)
	}

	/// The config describing the material in this key.
	pub fn config(&self) -> EvaluationKeyConfig {
		EvaluationKeyConfig {
			galois_elements: self.galois.keys().copied().collect(),
			has_relinearization_key: self.relinearization.is_some(),
		}
	}
}

/// Builds evaluation keys from a secret key.
pub struct EvaluationKeyBuilder<'k> {
	secret_key: &'k SecretKey,
	config: EvaluationKeyConfig,
}

impl<'k> EvaluationKeyBuilder<'k> {
	/// Starts an empty builder for the given secret key.
	pub fn new(secret_key: &'k SecretKey) -> Self {
		Self {
			secret_key,
			config: EvaluationKeyConfig::default(),
		}
	}

	/// Starts a builder seeded with an existing config.
	pub fn with_config(secret_key: &'k SecretKey, config: &EvaluationKeyConfig) -> Self {
		Self {
			secret_key,
			config: config.clone(),
		}
	}

	/// Requests a Galois key for `element`.
	pub fn add_galois_element(mut self, element: u64) -> Self {
		self.config.galois_elements.insert(element);
		self
	}

	/// Requests a relinearization key.
	pub fn enable_relinearization(mut self) -> Self {
		self.config.has_relinearization_key = true;
		self
	}

	/// Generates the requested key material.
	///
	/// A Galois key for `g` targets the difference `s(x^g) - s`, so that
	/// key-switching adds the correction on top of the permuted
	/// ciphertext. The relinearization key targets `s^2`.
	pub fn build(self) -> Result<EvaluationKey> {
		let sk = self.secret_key;
		let context = &sk.context;
		let degree = context.degree();

		let mut s_coeff = sk.s_key.clone();
		s_coeff.to_coefficient()?;

		let mut galois = BTreeMap::new();
		for &element in &self.config.galois_elements {
			crate::galois::GaloisElement::validate(element, degree)?;
			let mut target = s_coeff.substitute(element)?;
			target.to_evaluation()?;
			target.sub_assign(&sk.s_key)?;
			let key = KeySwitchKey::new(sk, &target)?;
			target.zeroize();
			galois.insert(
				element,
				GaloisKey {
					element,
					key,
				},
			);
		}

		let relinearization = if self.config.has_relinearization_key {
			let mut s2 = sk.s_key.mul(&sk.s_key)?;
			let key = KeySwitchKey::new(sk, &s2)?;
			s2.zeroize();
			Some(RelinearizationKey {
				key,
			})
		} else {
			None
		};

		s_coeff.zeroize();
		Ok(EvaluationKey {
			galois,
			relinearization,
		})
	}
}
