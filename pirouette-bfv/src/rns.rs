//! Residue number system contexts and exact base conversion.

use num_bigint::{BigInt, BigUint};
use num_traits::{Signed, Zero};

use crate::error::{Error, Result};
use crate::modulus::Modulus;

/// Constants for a fixed ordered RNS basis `q_0, ..., q_{L-1}`.
///
/// `garner(i)` is the CRT basis element
/// `(Q/q_i) · [(Q/q_i)^{-1}]_{q_i}`, so that a value is reconstructed
/// from its residues as `Σ garner(i)·r_i mod Q`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsContext {
	moduli: Vec<Modulus>,
	product: BigUint,
	garner: Vec<BigUint>,
}

impl RnsContext {
	/// Builds the context for the given pairwise-distinct prime moduli.
	pub fn new(moduli: &[Modulus]) -> Result<Self> {
		if moduli.is_empty() {
			return Err(Error::CoefficientModulusNotSet);
		}
		let mut product = BigUint::from(1u64);
		for m in moduli {
			product *= m.value();
		}
		let mut garner = Vec::with_capacity(moduli.len());
		for m in moduli {
			let partial = &product / m.value();
			let partial_mod = (&partial % m.value())
				.try_into()
				.map(|v| m.inv(v))
				.ok()
				.flatten()
				.ok_or_else(|| {
					Error::InvalidParameters("coefficient moduli are not coprime".to_string())
				})?;
			garner.push(partial * partial_mod);
		}
		Ok(Self {
			moduli: moduli.to_vec(),
			product,
			garner,
		})
	}

	/// Returns the product `Q` of the basis.
	pub fn product(&self) -> &BigUint {
		&self.product
	}

	/// Returns the number of significant bits of `Q`.
	pub fn product_bits(&self) -> u64 {
		self.product.bits()
	}

	/// Returns the `i`-th Garner basis element.
	pub fn garner(&self, i: usize) -> &BigUint {
		&self.garner[i]
	}

	/// Reconstructs the value in `[0, Q)` from one residue per modulus.
	pub fn lift(&self, residues: &[u64]) -> BigUint {
		debug_assert_eq!(residues.len(), self.moduli.len());
		let mut value = BigUint::zero();
		for (g, r) in self.garner.iter().zip(residues) {
			value += g * *r;
		}
		value % &self.product
	}

	/// Reconstructs the centered value in `(-Q/2, Q/2]`.
	pub fn lift_centered(&self, residues: &[u64]) -> BigInt {
		let value = self.lift(residues);
		let half = &self.product >> 1;
		if value > half {
			BigInt::from(value) - BigInt::from(self.product.clone())
		} else {
			BigInt::from(value)
		}
	}

	/// Reduces a signed big integer into each modulus of the basis.
	pub fn project(&self, value: &BigInt) -> Vec<u64> {
		self.moduli
			.iter()
			.map(|m| {
				let r = value % m.value();
				let r = if r.is_negative() {
					r + m.value()
				} else {
					r
				};
				u64::try_from(r).expect("residue fits a word after reduction")
			})
			.collect()
	}
}

/// Floor division for signed big integers (`BigInt` division truncates).
fn div_floor(a: &BigInt, b: &BigInt) -> BigInt {
	debug_assert!(b.is_positive());
	let q = a / b;
	if (a - &q * b).is_negative() {
		q - 1
	} else {
		q
	}
}

/// Exact scaling between RNS bases: maps residues of `x` in the source
/// basis to residues of `round(numerator·x / denominator)` in the target
/// basis, with `x` taken in centered form.
///
/// This is the conversion behind both decryption (`t/Q` rounding) and the
/// multiplication down-scale; the rounding is computed with exact big
/// integers from the precomputed factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaler {
	from: RnsContext,
	to: RnsContext,
	numerator_x2: BigInt,
	denominator: BigInt,
	denominator_x2: BigInt,
}

impl Scaler {
	/// Creates a scaler for `numerator / denominator` between two bases.
	pub fn new(
		from: &RnsContext,
		to: &RnsContext,
		numerator: BigUint,
		denominator: BigUint,
	) -> Result<Self> {
		if denominator.is_zero() {
			return Err(Error::InvalidParameters("zero scaling denominator".to_string()));
		}
		let denominator = BigInt::from(denominator);
		Ok(Self {
			from: from.clone(),
			to: to.clone(),
			numerator_x2: BigInt::from(numerator) * 2,
			denominator_x2: &denominator * 2,
			denominator,
		})
	}

	/// Returns the source basis.
	pub fn from_context(&self) -> &RnsContext {
		&self.from
	}

	/// Returns the target basis.
	pub fn to_context(&self) -> &RnsContext {
		&self.to
	}

	/// Scales one coefficient given as residues in the source basis.
	pub fn scale_coefficient(&self, residues: &[u64]) -> Vec<u64> {
		let x = self.from.lift_centered(residues);
		// round(num·x / den), rounding halves up.
		let y = div_floor(&(&self.numerator_x2 * x + &self.denominator), &self.denominator_x2);
		self.to.project(&y)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::modulus::generate_primes;
	use num_traits::One;
	use rand::{thread_rng, RngCore};

	fn basis(bits: &[usize]) -> Vec<Modulus> {
		generate_primes(bits, 8, false)
			.unwrap()
			.into_iter()
			.map(|p| Modulus::new(p).unwrap())
			.collect()
	}

	#[test]
	fn lift_project_roundtrip() {
		let moduli = basis(&[30, 30, 30]);
		let rns = RnsContext::new(&moduli).unwrap();
		let mut rng = thread_rng();
		for _ in 0..100 {
			let residues: Vec<u64> = moduli.iter().map(|m| m.random(&mut rng)).collect();
			let lifted = rns.lift(&residues);
			assert!(lifted < *rns.product());
			assert_eq!(rns.project(&BigInt::from(lifted)), residues);
		}
	}

	#[test]
	fn garner_is_crt_basis() {
		let moduli = basis(&[20, 21, 22]);
		let rns = RnsContext::new(&moduli).unwrap();
		for i in 0..moduli.len() {
			for (j, mj) in moduli.iter().enumerate() {
				let r = u64::try_from(rns.garner(i) % mj.value()).unwrap();
				assert_eq!(r, if i == j { 1 } else { 0 }, "garner {i} mod q_{j}");
			}
		}
	}

	#[test]
	fn centered_lift_is_symmetric() {
		let moduli = basis(&[20, 20]);
		let rns = RnsContext::new(&moduli).unwrap();
		let one: Vec<u64> = moduli.iter().map(|_| 1).collect();
		assert_eq!(rns.lift_centered(&one), BigInt::one());
		let minus_one: Vec<u64> = moduli.iter().map(|m| m.value() - 1).collect();
		assert_eq!(rns.lift_centered(&minus_one), BigInt::from(-1));
	}

	#[test]
	fn scaling_rounds_to_nearest() {
		let from = RnsContext::new(&basis(&[30, 30])).unwrap();
		let to = RnsContext::new(&basis(&[30])).unwrap();
		// Scale by 1/3 and check against integer reference on small values.
		let scaler = Scaler::new(&from, &to, BigUint::one(), BigUint::from(3u64)).unwrap();
		for v in [0i64, 1, 2, 3, 4, 5, 7, -1, -2, -3, -4, -5, -7] {
			let residues = from.project(&BigInt::from(v));
			let out = scaler.scale_coefficient(&residues);
			let got = to.lift_centered(&out);
			// round(v/3) with ties toward +inf.
			let expected = (2 * v + 3).div_euclid(6);
			assert_eq!(got, BigInt::from(expected), "v = {v}");
		}
	}

	#[test]
	fn identity_scaling_projects_into_target_basis() {
		let from = RnsContext::new(&basis(&[40, 40])).unwrap();
		let to = RnsContext::new(&basis(&[20])).unwrap();
		let scaler = Scaler::new(&from, &to, BigUint::one(), BigUint::one()).unwrap();
		let mut rng = thread_rng();
		for _ in 0..50 {
			let v = BigInt::from(rng.next_u64() >> 40);
			let out = scaler.scale_coefficient(&from.project(&v));
			assert_eq!(out, to.project(&v));
		}
	}
}
