//! Polynomials in RNS representation over `Z_Q[x]/(x^N + 1)`.

use std::sync::Arc;

use itertools::izip;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::modulus::Modulus;
use crate::ntt::NttOperator;
use crate::rns::RnsContext;
use crate::seeded_rng::{Seed, SeededRng};

/// The representation a polynomial is currently held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
	/// Plain coefficients.
	Coefficient,
	/// Pointwise NTT image, one transform per RNS limb.
	Evaluation,
}

/// Shared, immutable state for polynomials over one RNS basis: the
/// moduli, their NTT tables, and the CRT constants.
#[derive(Debug, PartialEq, Eq)]
pub struct PolyContext {
	degree: usize,
	moduli: Vec<Modulus>,
	ntt: Vec<Option<NttOperator>>,
	rns: RnsContext,
}

impl PolyContext {
	/// Builds a context for the given moduli and degree. NTT tables are
	/// created per modulus where the modulus supports them.
	pub fn new(moduli_values: &[u64], degree: usize) -> Result<Arc<Self>> {
		if !degree.is_power_of_two() || degree < 2 {
			return Err(Error::InvalidDegree(degree));
		}
		if moduli_values.is_empty() {
			return Err(Error::CoefficientModulusNotSet);
		}
		let moduli = moduli_values
			.iter()
			.map(|&p| Modulus::new(p))
			.collect::<Result<Vec<_>>>()?;
		let ntt = moduli
			.iter()
			.map(|m| NttOperator::new(m, degree).ok())
			.collect();
		let rns = RnsContext::new(&moduli)?;
		Ok(Arc::new(Self {
			degree,
			moduli,
			ntt,
			rns,
		}))
	}

	/// Returns the polynomial degree `N`.
	pub fn degree(&self) -> usize {
		self.degree
	}

	/// Returns the moduli of the basis.
	pub fn moduli(&self) -> &[Modulus] {
		&self.moduli
	}

	/// Returns the `i`-th modulus.
	pub fn modulus(&self, i: usize) -> &Modulus {
		&self.moduli[i]
	}

	/// Returns the NTT operator for limb `i`, when the modulus allows one.
	pub fn ntt(&self, i: usize) -> Option<&NttOperator> {
		self.ntt[i].as_ref()
	}

	/// Returns the CRT constants of the basis.
	pub fn rns(&self) -> &RnsContext {
		&self.rns
	}

	/// Returns the number of RNS limbs.
	pub fn limb_count(&self) -> usize {
		self.moduli.len()
	}
}

/// A polynomial held as `L · N` residues, limb-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polynomial {
	ctx: Arc<PolyContext>,
	representation: Representation,
	coefficients: Vec<u64>,
}

impl Polynomial {
	/// The zero polynomial in the given representation.
	pub fn zero(ctx: &Arc<PolyContext>, representation: Representation) -> Self {
		Self {
			ctx: ctx.clone(),
			representation,
			coefficients: vec![0u64; ctx.limb_count() * ctx.degree()],
		}
	}

	/// Builds a coefficient-form polynomial from `N` values, reducing
	/// each value into every limb.
	pub fn from_values(ctx: &Arc<PolyContext>, values: &[u64]) -> Result<Self> {
		if values.len() > ctx.degree() {
			return Err(Error::EncodingError(format!(
				"{} values exceed degree {}",
				values.len(),
				ctx.degree()
			)));
		}
		let mut poly = Self::zero(ctx, Representation::Coefficient);
		for i in 0..ctx.limb_count() {
			let m = ctx.modulus(i);
			let limb = poly.limb_mut(i);
			for (j, v) in values.iter().enumerate() {
				limb[j] = m.reduce(*v);
			}
		}
		Ok(poly)
	}

	/// Builds a coefficient-form polynomial from `N` centered values.
	pub fn from_centered_values(ctx: &Arc<PolyContext>, values: &[i64]) -> Result<Self> {
		if values.len() > ctx.degree() {
			return Err(Error::EncodingError(format!(
				"{} values exceed degree {}",
				values.len(),
				ctx.degree()
			)));
		}
		let mut poly = Self::zero(ctx, Representation::Coefficient);
		for i in 0..ctx.limb_count() {
			let m = ctx.modulus(i);
			let limb = poly.limb_mut(i);
			for (j, v) in values.iter().enumerate() {
				limb[j] = m.from_centered(*v);
			}
		}
		Ok(poly)
	}

	/// Returns the context of this polynomial.
	pub fn context(&self) -> &Arc<PolyContext> {
		&self.ctx
	}

	/// Returns the current representation.
	pub fn representation(&self) -> Representation {
		self.representation
	}

	/// Returns the residues of limb `i`.
	pub fn limb(&self, i: usize) -> &[u64] {
		let n = self.ctx.degree();
		&self.coefficients[i * n..(i + 1) * n]
	}

	/// Returns the residues of limb `i`, mutably.
	pub fn limb_mut(&mut self, i: usize) -> &mut [u64] {
		let n = self.ctx.degree();
		&mut self.coefficients[i * n..(i + 1) * n]
	}

	/// Returns the residues of coefficient `j` across all limbs.
	pub fn coefficient_residues(&self, j: usize) -> Vec<u64> {
		(0..self.ctx.limb_count())
			.map(|i| self.limb(i)[j])
			.collect()
	}

	fn check_binary_op(&self, rhs: &Self) -> Result<()> {
		if self.ctx != rhs.ctx {
			return Err(Error::ContextMismatch);
		}
		if self.representation != rhs.representation {
			return Err(Error::FormatMismatch {
				expected: self.representation,
				got: rhs.representation,
			});
		}
		Ok(())
	}

	fn require(&self, representation: Representation) -> Result<()> {
		if self.representation != representation {
			return Err(Error::FormatMismatch {
				expected: representation,
				got: self.representation,
			});
		}
		Ok(())
	}

	/// Adds `rhs` into this polynomial.
	pub fn add_assign(&mut self, rhs: &Self) -> Result<()> {
		self.check_binary_op(rhs)?;
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			izip!(self.limb_mut(i), rhs.limb(i)).for_each(|(a, b)| *a = m.add(*a, *b));
		}
		Ok(())
	}

	/// Returns `self + rhs`.
	pub fn add(&self, rhs: &Self) -> Result<Self> {
		let mut out = self.clone();
		out.add_assign(rhs)?;
		Ok(out)
	}

	/// Subtracts `rhs` from this polynomial.
	pub fn sub_assign(&mut self, rhs: &Self) -> Result<()> {
		self.check_binary_op(rhs)?;
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			izip!(self.limb_mut(i), rhs.limb(i)).for_each(|(a, b)| *a = m.sub(*a, *b));
		}
		Ok(())
	}

	/// Returns `self - rhs`.
	pub fn sub(&self, rhs: &Self) -> Result<Self> {
		let mut out = self.clone();
		out.sub_assign(rhs)?;
		Ok(out)
	}

	/// Negates this polynomial in place.
	pub fn negate(&mut self) {
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			self.limb_mut(i).iter_mut().for_each(|a| *a = m.neg(*a));
		}
	}

	/// Pointwise product; both operands must be in evaluation form.
	pub fn mul_assign(&mut self, rhs: &Self) -> Result<()> {
		self.check_binary_op(rhs)?;
		self.require(Representation::Evaluation)?;
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			izip!(self.limb_mut(i), rhs.limb(i)).for_each(|(a, b)| *a = m.mul(*a, *b));
		}
		Ok(())
	}

	/// Returns the pointwise product `self · rhs`.
	pub fn mul(&self, rhs: &Self) -> Result<Self> {
		let mut out = self.clone();
		out.mul_assign(rhs)?;
		Ok(out)
	}

	/// Multiplies limb `i` by the constant `constants[i]`.
	pub fn scale_limbs(&mut self, constants: &[u64]) {
		debug_assert_eq!(constants.len(), self.ctx.limb_count());
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			let c = constants[i];
			self.limb_mut(i).iter_mut().for_each(|a| *a = m.mul(*a, c));
		}
	}

	/// Converts to evaluation form in place.
	pub fn to_evaluation(&mut self) -> Result<()> {
		if self.representation == Representation::Evaluation {
			return Ok(());
		}
		let ctx = self.ctx.clone();
		let n = ctx.degree();
		for i in 0..ctx.limb_count() {
			let op = ctx
				.ntt(i)
				.ok_or_else(|| Error::NttNotSupported(ctx.modulus(i).value(), n))?;
			op.forward(&mut self.coefficients[i * n..(i + 1) * n]);
		}
		self.representation = Representation::Evaluation;
		Ok(())
	}

	/// Converts to coefficient form in place.
	pub fn to_coefficient(&mut self) -> Result<()> {
		if self.representation == Representation::Coefficient {
			return Ok(());
		}
		let ctx = self.ctx.clone();
		let n = ctx.degree();
		for i in 0..ctx.limb_count() {
			let op = ctx
				.ntt(i)
				.ok_or_else(|| Error::NttNotSupported(ctx.modulus(i).value(), n))?;
			op.backward(&mut self.coefficients[i * n..(i + 1) * n]);
		}
		self.representation = Representation::Coefficient;
		Ok(())
	}

	/// Samples a uniform polynomial in evaluation form from the SHAKE
	/// stream of `seed`. Limb `i` reads the stream with domain separator
	/// `stream · 64 + i`, so streams of distinct polynomials derived from
	/// one seed never overlap.
	pub fn random_from_seed(ctx: &Arc<PolyContext>, seed: &Seed, stream: u32) -> Self {
		let mut poly = Self::zero(ctx, Representation::Evaluation);
		for i in 0..ctx.limb_count() {
			let m = ctx.modulus(i).clone();
			let mut rng = SeededRng::new(seed, stream * 64 + i as u32);
			poly.limb_mut(i)
				.iter_mut()
				.for_each(|a| *a = m.random(&mut rng));
		}
		poly
	}

	/// Samples a uniform polynomial from system entropy.
	pub fn random<R: RngCore + CryptoRng>(
		ctx: &Arc<PolyContext>,
		representation: Representation,
		rng: &mut R,
	) -> Self {
		let mut poly = Self::zero(ctx, representation);
		for i in 0..ctx.limb_count() {
			let m = ctx.modulus(i).clone();
			poly.limb_mut(i)
				.iter_mut()
				.for_each(|a| *a = m.random(rng));
		}
		poly
	}

	/// Samples a ternary polynomial with coefficients uniform on
	/// `{-1, 0, 1}`, in coefficient form.
	pub fn random_ternary<R: RngCore + CryptoRng>(ctx: &Arc<PolyContext>, rng: &mut R) -> Self {
		let n = ctx.degree();
		let values: Vec<i64> = (0..n)
			.map(|_| Modulus::random_uniform(3, rng) as i64 - 1)
			.collect();
		Self::from_centered_values(ctx, &values).expect("ternary values fit the degree")
	}

	/// Samples an error polynomial from a centered binomial distribution
	/// with variance 10 (stddev ~3.16), in coefficient form.
	pub fn random_error<R: RngCore + CryptoRng>(ctx: &Arc<PolyContext>, rng: &mut R) -> Self {
		let n = ctx.degree();
		let values: Vec<i64> = (0..n)
			.map(|_| {
				let bits = rng.next_u64();
				let a = (bits & 0xFFFFF).count_ones() as i64;
				let b = ((bits >> 20) & 0xFFFFF).count_ones() as i64;
				a - b
			})
			.collect();
		Self::from_centered_values(ctx, &values).expect("error values fit the degree")
	}

	/// Applies the automorphism `x -> x^element` to a coefficient-form
	/// polynomial, negating coefficients that wrap around `x^N = -1`.
	pub fn substitute(&self, element: u64) -> Result<Self> {
		self.require(Representation::Coefficient)?;
		let n = self.ctx.degree();
		let order = 2 * n as u64;
		if element % 2 == 0 || element >= order {
			return Err(Error::InvalidGaloisElement(element));
		}
		let mut out = Self::zero(&self.ctx, Representation::Coefficient);
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			let src = self.limb(i).to_vec();
			let dst = out.limb_mut(i);
			for (j, &c) in src.iter().enumerate() {
				let e = (j as u64 * element) % order;
				if e < n as u64 {
					dst[e as usize] = m.add(dst[e as usize], c);
				} else {
					dst[(e - n as u64) as usize] = m.sub(dst[(e - n as u64) as usize], c);
				}
			}
		}
		Ok(out)
	}

	/// Multiplies a coefficient-form polynomial by the monomial `x^power`
	/// with `power` taken modulo `2N`; `x^(2N - k)` realizes `x^(-k)`.
	pub fn multiply_monomial(&self, power: usize) -> Result<Self> {
		self.require(Representation::Coefficient)?;
		let n = self.ctx.degree();
		let order = 2 * n;
		let power = power % order;
		let mut out = Self::zero(&self.ctx, Representation::Coefficient);
		for i in 0..self.ctx.limb_count() {
			let m = self.ctx.modulus(i).clone();
			let src = self.limb(i).to_vec();
			let dst = out.limb_mut(i);
			for (j, &c) in src.iter().enumerate() {
				let e = (j + power) % order;
				if e < n {
					dst[e] = m.add(dst[e], c);
				} else {
					dst[e - n] = m.sub(dst[e - n], c);
				}
			}
		}
		Ok(out)
	}

	/// Drops the last RNS limb by the lift-and-subtract rule: the last
	/// limb's centered lift is subtracted from every remaining limb,
	/// which is then rescaled by `q_last^{-1}`.
	///
	/// Requires coefficient form. `target` must be this context minus its
	/// last modulus, and `inv_q_last[i]` must hold `q_last^{-1} mod q_i`.
	pub fn drop_last_limb(
		&self,
		target: &Arc<PolyContext>,
		inv_q_last: &[u64],
	) -> Result<Polynomial> {
		self.require(Representation::Coefficient)?;
		let limbs = self.ctx.limb_count();
		if limbs < 2 {
			return Err(Error::AlreadySingleModulus);
		}
		debug_assert_eq!(target.limb_count(), limbs - 1);
		let last = self.ctx.modulus(limbs - 1);
		let mut out = Polynomial::zero(target, Representation::Coefficient);
		for i in 0..limbs - 1 {
			let m = self.ctx.modulus(i).clone();
			let inv = inv_q_last[i];
			let src = self.limb(i);
			let last_limb = self.limb(limbs - 1);
			let dst = out.limb_mut(i);
			for j in 0..self.ctx.degree() {
				let delta = last.center(last_limb[j]) as i128;
				let shifted = (src[j] as i128 - delta).rem_euclid(m.value() as i128) as u64;
				dst[j] = m.mul(shifted, inv);
			}
		}
		Ok(out)
	}

	/// Applies a [`crate::rns::Scaler`] to every coefficient, producing
	/// a polynomial over the scaler's target basis.
	pub fn scale(&self, scaler: &crate::rns::Scaler, target: &Arc<PolyContext>) -> Result<Polynomial> {
		self.require(Representation::Coefficient)?;
		debug_assert_eq!(scaler.from_context(), self.ctx.rns());
		debug_assert_eq!(scaler.to_context(), target.rns());
		let mut out = Polynomial::zero(target, Representation::Coefficient);
		for j in 0..self.ctx.degree() {
			let residues = scaler.scale_coefficient(&self.coefficient_residues(j));
			for (i, r) in residues.iter().enumerate() {
				out.limb_mut(i)[j] = *r;
			}
		}
		Ok(out)
	}

	/// Converts this polynomial into the residues of another basis by
	/// exact centered lift, used to extend operands before a tensor
	/// product.
	pub fn convert_basis(&self, target: &Arc<PolyContext>) -> Result<Polynomial> {
		self.require(Representation::Coefficient)?;
		let mut out = Polynomial::zero(target, Representation::Coefficient);
		for j in 0..self.ctx.degree() {
			let lifted = self.ctx.rns().lift_centered(&self.coefficient_residues(j));
			let residues = target.rns().project(&lifted);
			for (i, r) in residues.iter().enumerate() {
				out.limb_mut(i)[j] = *r;
			}
		}
		Ok(out)
	}
}

impl Zeroize for Polynomial {
	fn zeroize(&mut self) {
		self.coefficients.zeroize();
	}
}
