//! Precomputed, immutable state derived from encryption parameters.

use std::sync::Arc;

use num_bigint::BigUint;
use tracing::debug;

use crate::error::{Error, Result};
use crate::modulus::{generate_primes, Modulus};
use crate::ntt::bit_reverse;
use crate::parameters::EncryptionParameters;
use crate::poly::PolyContext;
use crate::rns::Scaler;

/// Validates a set of [`EncryptionParameters`] and stores the results of
/// the costly precomputations every scheme operation relies on: the
/// per-modulus NTT tables, the modulus-switching chain, the CRT and
/// scaling constants between each level and the plaintext modulus, and
/// the SIMD slot permutation.
///
/// A context is created once, is immutable, and is shared behind an
/// [`Arc`]. Artifacts (plaintexts, ciphertexts, keys) are bound to the
/// context that produced them; mixing artifacts from different contexts
/// is rejected by every operation.
#[derive(Debug, PartialEq, Eq)]
pub struct Context {
	params: EncryptionParameters,
	/// Polynomial contexts of the modulus-switching chain; entry `l`
	/// spans the first `L - l` coefficient moduli.
	poly_contexts: Vec<Arc<PolyContext>>,
	/// Single-limb context over the plaintext modulus.
	plain_context: Arc<PolyContext>,
	/// Slot-to-coefficient permutation of the SIMD encoding, when the
	/// plaintext modulus supports batching.
	simd_index_map: Option<Vec<usize>>,
	/// Per level: `⌊Q_l / t⌋ mod q_i`.
	delta: Vec<Vec<u64>>,
	/// Per level: `t^{-1} mod q_i`.
	inv_plain: Vec<Vec<u64>>,
	/// Per level: the `t / Q_l` rounding scaler used by decryption.
	decrypt_scalers: Vec<Scaler>,
	/// Per level with at least two limbs: the extended NTT basis for the
	/// tensor product of a multiplication.
	mul_contexts: Vec<Option<Arc<PolyContext>>>,
	/// Per level with at least two limbs: the `t / Q_l` down-scaler from
	/// the extended basis back into the level basis.
	mul_down_scalers: Vec<Option<Scaler>>,
	/// Per level with at least two limbs: `q_last^{-1} mod q_i` for the
	/// lift-and-subtract modulus switch.
	inv_last: Vec<Vec<u64>>,
	/// The key basis `Q · P`: the level-0 moduli plus one special prime
	/// `P` absorbing key-switch noise.
	key_context: Arc<PolyContext>,
	/// `P^{-1} mod q_i` for the rounding division ending a key switch.
	inv_special: Vec<u64>,
	/// `P · g_i mod qp_j` where `g_i` is the level-0 Garner element:
	/// the gadget constants a key-switch key row scales its target by.
	key_gadget: Vec<Vec<u64>>,
}

impl Context {
	/// Performs the precomputations for `params`.
	pub fn new(params: EncryptionParameters) -> Result<Arc<Self>> {
		let degree = params.degree();
		let moduli = params.moduli().to_vec();
		let level_count = moduli.len();
		let t = params.plain_modulus();

		let mut poly_contexts = Vec::with_capacity(level_count);
		for level in 0..level_count {
			poly_contexts.push(PolyContext::new(&moduli[..level_count - level], degree)?);
		}
		let plain_context = PolyContext::new(&[t], degree)?;

		// The extension basis for tensor products, sized for the level-0
		// product and shared down the chain, plus one special prime for
		// the key basis.
		let log_degree = degree.trailing_zeros() as usize;
		let base_bits = poly_contexts[0].rns().product_bits() as usize;
		let needed_extra = base_bits + log_degree + 2;
		let count = needed_extra.div_ceil(62);
		let candidates = generate_primes(&vec![62; count + level_count + 1], degree, false)?;
		let mut spare: Vec<u64> = candidates
			.into_iter()
			.filter(|p| !moduli.contains(p))
			.take(count + 1)
			.collect();
		if spare.len() < count + 1 {
			return Err(Error::PrimeGenerationFailure {
				bits: 62,
				congruence: 2 * degree as u64,
			});
		}
		let special = spare.pop().expect("one spare prime remains");
		let extension = spare;

		let mut key_moduli = moduli.clone();
		key_moduli.push(special);
		let key_context = PolyContext::new(&key_moduli, degree)?;
		let inv_special = poly_contexts[0]
			.moduli()
			.iter()
			.map(|m| {
				m.inv(special % m.value()).ok_or_else(|| {
					Error::InvalidParameters("special prime collides with the chain".to_string())
				})
			})
			.collect::<Result<Vec<u64>>>()?;
		let base_rns = poly_contexts[0].rns().clone();
		let key_gadget = (0..level_count)
			.map(|i| {
				let scaled = base_rns.garner(i) * special;
				key_context
					.moduli()
					.iter()
					.map(|m| u64::try_from(&scaled % m.value()).expect("residue fits a word"))
					.collect()
			})
			.collect();

		let mut delta = Vec::with_capacity(level_count);
		let mut inv_plain = Vec::with_capacity(level_count);
		let mut decrypt_scalers = Vec::with_capacity(level_count);
		let mut mul_contexts = Vec::with_capacity(level_count);
		let mut mul_down_scalers = Vec::with_capacity(level_count);
		let mut inv_last = Vec::with_capacity(level_count);
		for level in 0..level_count {
			let ctx = &poly_contexts[level];
			let q_l = ctx.rns().product().clone();
			let delta_l = &q_l / t;
			delta.push(
				ctx.moduli()
					.iter()
					.map(|m| u64::try_from(&delta_l % m.value()).expect("residue fits a word"))
					.collect(),
			);
			inv_plain.push(
				ctx.moduli()
					.iter()
					.map(|m| {
						m.inv(t % m.value()).ok_or_else(|| {
							Error::InvalidParameters(format!(
								"plaintext modulus {t} shares a factor with {}",
								m.value()
							))
						})
					})
					.collect::<Result<Vec<u64>>>()?,
			);
			decrypt_scalers.push(Scaler::new(
				ctx.rns(),
				plain_context.rns(),
				BigUint::from(t),
				q_l.clone(),
			)?);

			let limbs = ctx.limb_count();
			if limbs >= 2 {
				let mut extended = moduli[..limbs].to_vec();
				extended.extend_from_slice(&extension);
				let mul_ctx = PolyContext::new(&extended, degree)?;
				mul_down_scalers.push(Some(Scaler::new(
					mul_ctx.rns(),
					ctx.rns(),
					BigUint::from(t),
					q_l,
				)?));
				mul_contexts.push(Some(mul_ctx));

				let last = ctx.modulus(limbs - 1);
				inv_last.push(
					ctx.moduli()[..limbs - 1]
						.iter()
						.map(|m| {
							m.inv(last.value() % m.value()).ok_or_else(|| {
								Error::InvalidParameters(
									"coefficient moduli are not coprime".to_string(),
								)
							})
						})
						.collect::<Result<Vec<u64>>>()?,
				);
			} else {
				mul_contexts.push(None);
				mul_down_scalers.push(None);
				inv_last.push(Vec::new());
			}
		}

		let simd_index_map = if (t - 1) % (2 * degree as u64) == 0
			&& plain_context.ntt(0).is_some()
			&& degree >= 4
		{
			Some(Self::build_simd_index_map(degree))
		} else {
			None
		};

		debug!(
			degree,
			moduli = level_count,
			simd = simd_index_map.is_some(),
			"created BFV context"
		);

		Ok(Arc::new(Self {
			params,
			poly_contexts,
			plain_context,
			simd_index_map,
			delta,
			inv_plain,
			decrypt_scalers,
			mul_contexts,
			mul_down_scalers,
			inv_last,
			key_context,
			inv_special,
			key_gadget,
		}))
	}

	/// The SEAL-style slot permutation: slot `i` of the first row reads
	/// the coefficient whose NTT output position evaluates at
	/// `ψ^(3^i mod 2N)`, and the second row at the inverse exponents.
	fn build_simd_index_map(degree: usize) -> Vec<usize> {
		let row_size = degree >> 1;
		let m = degree << 1;
		let log_degree = degree.trailing_zeros();
		let mut pos = 1usize;
		let mut map = vec![0usize; degree];
		for i in 0..row_size {
			let index1 = (pos - 1) >> 1;
			let index2 = (m - pos - 1) >> 1;
			map[i] = bit_reverse(index1, log_degree);
			map[row_size | i] = bit_reverse(index2, log_degree);
			pos = (pos * 3) & (m - 1);
		}
		map
	}

	/// Returns the parameters this context was built from.
	pub fn params(&self) -> &EncryptionParameters {
		&self.params
	}

	/// Returns the polynomial degree `N`.
	pub fn degree(&self) -> usize {
		self.params.degree()
	}

	/// Returns the number of levels in the modulus-switching chain.
	pub fn level_count(&self) -> usize {
		self.poly_contexts.len()
	}

	/// Returns the polynomial context at `level`.
	pub fn poly_context(&self, level: usize) -> Result<&Arc<PolyContext>> {
		self.poly_contexts
			.get(level)
			.ok_or(Error::LevelMismatch(level, self.poly_contexts.len()))
	}

	/// Returns the single-limb plaintext context.
	pub fn plain_context(&self) -> &Arc<PolyContext> {
		&self.plain_context
	}

	/// Returns the plaintext modulus.
	pub fn plain_modulus(&self) -> &Modulus {
		self.plain_context.modulus(0)
	}

	/// Returns `⌊Q_l / t⌋` as residues of the level basis.
	pub fn delta(&self, level: usize) -> &[u64] {
		&self.delta[level]
	}

	/// Returns `t^{-1}` as residues of the level basis.
	pub fn inv_plain(&self, level: usize) -> &[u64] {
		&self.inv_plain[level]
	}

	/// Returns the decryption scaler (`t/Q_l` rounding) for `level`.
	pub fn decrypt_scaler(&self, level: usize) -> &Scaler {
		&self.decrypt_scalers[level]
	}

	/// Returns the extended tensor-product context for `level`, or an
	/// error at a single-modulus level where multiplication is forbidden.
	pub fn mul_context(&self, level: usize) -> Result<&Arc<PolyContext>> {
		self.mul_contexts
			.get(level)
			.and_then(|c| c.as_ref())
			.ok_or(Error::MultiplicationAtSingleModulus)
	}

	/// Returns the tensor-product down-scaler for `level`.
	pub fn mul_down_scaler(&self, level: usize) -> Result<&Scaler> {
		self.mul_down_scalers
			.get(level)
			.and_then(|s| s.as_ref())
			.ok_or(Error::MultiplicationAtSingleModulus)
	}

	/// Returns `q_last^{-1} mod q_i` for the modulus switch out of
	/// `level`.
	pub fn inv_last(&self, level: usize) -> Result<&[u64]> {
		let inv = &self.inv_last[level];
		if inv.is_empty() {
			return Err(Error::AlreadySingleModulus);
		}
		Ok(inv)
	}

	/// Returns the key basis `Q · P` that key-switch keys live in.
	pub fn key_context(&self) -> &Arc<PolyContext> {
		&self.key_context
	}

	/// Returns `P^{-1} mod q_i` for the division by the special prime.
	pub fn inv_special(&self) -> &[u64] {
		&self.inv_special
	}

	/// Returns the gadget constants `P·g_i mod qp_j` of key-switch row
	/// `i`.
	pub fn key_gadget(&self, i: usize) -> &[u64] {
		&self.key_gadget[i]
	}

	/// Returns the SIMD slot permutation, or an error when the plaintext
	/// modulus does not support batching.
	pub fn simd_index_map(&self) -> Result<&[usize]> {
		self.simd_index_map
			.as_deref()
			.ok_or(Error::SimdNotSupported(
				self.params.plain_modulus(),
				self.params.degree(),
			))
	}

	/// Whether the SIMD encoding is available.
	pub fn supports_simd(&self) -> bool {
		self.simd_index_map.is_some()
	}
}
