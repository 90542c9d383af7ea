//! Encryption parameters and their builder.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::modulus::{is_prime, Modulus, MAX_MODULUS_BITS};

/// Advisory security classification of a parameter set, following the
/// homomorphic-encryption.org tables. The label travels with the
/// parameters; only named constructors refuse weak choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
	/// No claim is made; test and toy parameters.
	Unchecked,
	/// 128-bit classical security.
	TC128,
	/// 192-bit classical security.
	TC192,
	/// 256-bit classical security.
	TC256,
}

impl SecurityLevel {
	/// The largest total coefficient-modulus bit count the
	/// homomorphic-encryption.org tables allow for a degree at this level.
	fn max_total_bits(&self, degree: usize) -> Option<usize> {
		let column = match self {
			SecurityLevel::Unchecked => return None,
			SecurityLevel::TC128 => 0,
			SecurityLevel::TC192 => 1,
			SecurityLevel::TC256 => 2,
		};
		let row = match degree {
			1024 => [27, 19, 14],
			2048 => [54, 37, 29],
			4096 => [109, 75, 58],
			8192 => [218, 152, 118],
			16384 => [438, 305, 237],
			32768 => [881, 611, 476],
			_ => return Some(0),
		};
		Some(row[column])
	}
}

/// The standard deviation of the error distribution, identified by a
/// fixed code so it can travel inside serialized parameter records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorStdDev {
	/// Standard deviation ~3.2 (centered binomial with variance 10).
	StdDev32,
}

/// Immutable bundle of the BFV scheme parameters: the polynomial degree
/// `N`, the plaintext modulus `t`, the ordered coefficient moduli
/// `q_0 ... q_{L-1}`, the error distribution, and the advisory security
/// level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParameters {
	degree: usize,
	plain_modulus: u64,
	moduli: Vec<u64>,
	error_std_dev: ErrorStdDev,
	security_level: SecurityLevel,
}

impl EncryptionParameters {
	/// Returns the polynomial degree `N`.
	pub fn degree(&self) -> usize {
		self.degree
	}

	/// Returns the plaintext modulus `t`.
	pub fn plain_modulus(&self) -> u64 {
		self.plain_modulus
	}

	/// Returns the coefficient moduli.
	pub fn moduli(&self) -> &[u64] {
		&self.moduli
	}

	/// Returns the error distribution code.
	pub fn error_std_dev(&self) -> ErrorStdDev {
		self.error_std_dev
	}

	/// Returns the advisory security level.
	pub fn security_level(&self) -> SecurityLevel {
		self.security_level
	}

	/// Validates the claimed security level against the
	/// homomorphic-encryption.org tables; this is the only place where a
	/// weak parameter set is refused.
	pub fn enforce_security_level(&self) -> Result<()> {
		if let Some(max_bits) = self.security_level.max_total_bits(self.degree) {
			let total: usize = self.moduli.iter().map(|q| 64 - q.leading_zeros() as usize).sum();
			if total > max_bits {
				return Err(Error::InvalidParameters(format!(
					"{total} total coefficient bits exceed the {max_bits} allowed at degree {} for {:?}",
					self.degree, self.security_level
				)));
			}
		}
		Ok(())
	}
}

enum CoefficientModulusChoice {
	NotSet,
	Moduli(Vec<u64>),
	Bits(Vec<usize>),
}

/// Builder that assembles and validates [`EncryptionParameters`].
pub struct EncryptionParametersBuilder {
	degree: Option<usize>,
	plain_modulus: Option<u64>,
	coefficient_modulus: CoefficientModulusChoice,
	error_std_dev: ErrorStdDev,
	security_level: SecurityLevel,
}

impl EncryptionParametersBuilder {
	/// Creates a new builder with nothing set.
	pub fn new() -> Self {
		Self {
			degree: None,
			plain_modulus: None,
			coefficient_modulus: CoefficientModulusChoice::NotSet,
			error_std_dev: ErrorStdDev::StdDev32,
			security_level: SecurityLevel::Unchecked,
		}
	}

	/// Sets the polynomial degree; must be a power of two.
	pub fn set_degree(mut self, degree: usize) -> Self {
		self.degree = Some(degree);
		self
	}

	/// Sets the plaintext modulus to a fixed value. For SIMD encoding,
	/// prefer `PlainModulusFactory::batching`.
	pub fn set_plain_modulus(mut self, t: u64) -> Self {
		self.plain_modulus = Some(t);
		self
	}

	/// Sets the coefficient moduli to explicit primes.
	pub fn set_coefficient_moduli(mut self, moduli: Vec<u64>) -> Self {
		self.coefficient_modulus = CoefficientModulusChoice::Moduli(moduli);
		self
	}

	/// Sets the coefficient moduli by significant bit counts; primes are
	/// generated to match.
	pub fn set_coefficient_moduli_bits(mut self, bits: Vec<usize>) -> Self {
		self.coefficient_modulus = CoefficientModulusChoice::Bits(bits);
		self
	}

	/// Sets the error distribution.
	pub fn set_error_std_dev(mut self, std_dev: ErrorStdDev) -> Self {
		self.error_std_dev = std_dev;
		self
	}

	/// Sets the advisory security level recorded with the parameters.
	pub fn set_security_level(mut self, level: SecurityLevel) -> Self {
		self.security_level = level;
		self
	}

	/// Validates the choices and returns the parameters.
	pub fn build(self) -> Result<EncryptionParameters> {
		let degree = self.degree.ok_or(Error::DegreeNotSet)?;
		if !degree.is_power_of_two() || degree < 2 {
			return Err(Error::InvalidDegree(degree));
		}

		let plain_modulus = self.plain_modulus.ok_or(Error::PlainModulusNotSet)?;
		Modulus::new(plain_modulus)?;

		let moduli = match self.coefficient_modulus {
			CoefficientModulusChoice::NotSet => return Err(Error::CoefficientModulusNotSet),
			CoefficientModulusChoice::Moduli(m) => m,
			CoefficientModulusChoice::Bits(bits) => {
				crate::modulus::generate_primes(&bits, degree, false)?
			}
		};
		if moduli.is_empty() {
			return Err(Error::CoefficientModulusNotSet);
		}
		for (i, &q) in moduli.iter().enumerate() {
			if 64 - q.leading_zeros() as usize > MAX_MODULUS_BITS {
				return Err(Error::InvalidModulus(q));
			}
			if !is_prime(q) {
				return Err(Error::InvalidParameters(format!(
					"coefficient modulus {q} is not prime"
				)));
			}
			if (q - 1) % (2 * degree as u64) != 0 {
				return Err(Error::InvalidParameters(format!(
					"coefficient modulus {q} is not NTT-friendly for degree {degree}"
				)));
			}
			if moduli[..i].contains(&q) {
				return Err(Error::InvalidParameters(format!(
					"coefficient modulus {q} is repeated"
				)));
			}
			if q <= plain_modulus {
				return Err(Error::InvalidParameters(format!(
					"coefficient modulus {q} does not exceed the plaintext modulus"
				)));
			}
		}

		let params = EncryptionParameters {
			degree,
			plain_modulus,
			moduli,
			error_std_dev: self.error_std_dev,
			security_level: self.security_level,
		};
		if params.security_level != SecurityLevel::Unchecked {
			params.enforce_security_level()?;
		}
		Ok(params)
	}
}

impl Default for EncryptionParametersBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builder_requires_all_fields() {
		assert!(matches!(
			EncryptionParametersBuilder::new().build(),
			Err(Error::DegreeNotSet)
		));
		assert!(matches!(
			EncryptionParametersBuilder::new().set_degree(8).build(),
			Err(Error::PlainModulusNotSet)
		));
		assert!(matches!(
			EncryptionParametersBuilder::new()
				.set_degree(8)
				.set_plain_modulus(17)
				.build(),
			Err(Error::CoefficientModulusNotSet)
		));
	}

	#[test]
	fn builder_validates_degree() {
		let params = EncryptionParametersBuilder::new()
			.set_degree(7)
			.set_plain_modulus(17)
			.set_coefficient_moduli_bits(vec![30])
			.build();
		assert!(matches!(params, Err(Error::InvalidDegree(7))));
	}

	#[test]
	fn builder_validates_moduli() {
		// 13 is prime but 12 is not a multiple of 16.
		let params = EncryptionParametersBuilder::new()
			.set_degree(8)
			.set_plain_modulus(5)
			.set_coefficient_moduli(vec![13])
			.build();
		assert!(params.is_err());

		// Repeated primes are rejected.
		let q = crate::modulus::generate_primes(&[30], 8, false).unwrap()[0];
		let params = EncryptionParametersBuilder::new()
			.set_degree(8)
			.set_plain_modulus(17)
			.set_coefficient_moduli(vec![q, q])
			.build();
		assert!(params.is_err());
	}

	#[test]
	fn builder_generates_requested_bit_counts() {
		let params = EncryptionParametersBuilder::new()
			.set_degree(8)
			.set_plain_modulus(17)
			.set_coefficient_moduli_bits(vec![18, 18, 18])
			.build()
			.unwrap();
		assert_eq!(params.moduli().len(), 3);
		for q in params.moduli() {
			assert_eq!(64 - q.leading_zeros(), 18);
			assert_eq!((q - 1) % 16, 0);
		}
	}

	#[test]
	fn security_level_is_enforced_only_when_claimed() {
		// A toy degree passes with Unchecked.
		assert!(EncryptionParametersBuilder::new()
			.set_degree(8)
			.set_plain_modulus(17)
			.set_coefficient_moduli_bits(vec![18])
			.build()
			.is_ok());

		// Claiming TC128 with an oversized chain at degree 4096 fails.
		let params = EncryptionParametersBuilder::new()
			.set_degree(4096)
			.set_plain_modulus(17)
			.set_coefficient_moduli_bits(vec![60, 60])
			.set_security_level(SecurityLevel::TC128)
			.build();
		assert!(params.is_err());

		// Three 28-bit primes fit the 109-bit budget at 4096.
		assert!(EncryptionParametersBuilder::new()
			.set_degree(4096)
			.set_plain_modulus(114689)
			.set_coefficient_moduli_bits(vec![28, 28, 28])
			.set_security_level(SecurityLevel::TC128)
			.build()
			.is_ok());
	}
}
