//! Galois elements of the power-of-two cyclotomic ring.
//!
//! An odd integer `g` in `[1, 2N)` indexes the ring automorphism
//! `x -> x^g`. SIMD rotations map onto powers of the generator 3; the
//! row swap is the element `2N - 1`.

use crate::error::{Error, Result};

/// The generator of the rotation subgroup used by the SIMD layout.
const GENERATOR: u64 = 3;

/// Exponentiation modulo `2N` (a power of two).
fn pow_mod_order(base: u64, mut exponent: u64, order: u64) -> u64 {
	debug_assert!(order.is_power_of_two());
	let mask = order - 1;
	let mut result = 1u64;
	let mut base = base & mask;
	while exponent > 0 {
		if exponent & 1 == 1 {
			result = result.wrapping_mul(base) & mask;
		}
		base = base.wrapping_mul(base) & mask;
		exponent >>= 1;
	}
	result
}

/// Helpers for mapping high-level operations to Galois elements.
pub struct GaloisElement;

impl GaloisElement {
	/// The element rotating the SIMD columns by `steps` (positive steps
	/// rotate left). `|steps|` must be smaller than `N/2`.
	pub fn rotating_columns_by(steps: i64, degree: usize) -> Result<u64> {
		let row_size = (degree / 2) as i64;
		if steps == 0 || steps.abs() >= row_size {
			return Err(Error::InvalidGaloisElement(steps.unsigned_abs()));
		}
		let order = 2 * degree as u64;
		let exponent = if steps > 0 {
			steps as u64
		} else {
			(row_size + steps) as u64
		};
		Ok(pow_mod_order(GENERATOR, exponent, order))
	}

	/// The element swapping the two SIMD rows: `2N - 1`.
	pub fn swapping_rows(degree: usize) -> u64 {
		2 * degree as u64 - 1
	}

	/// The element `2^log_step + 1` used by query expansion.
	pub fn expansion_step(log_step: u32) -> u64 {
		(1u64 << log_step) + 1
	}

	/// Checks that `g` is a valid element: odd and in `[1, 2N)`.
	pub fn validate(g: u64, degree: usize) -> Result<()> {
		if g % 2 == 0 || g == 0 || g >= 2 * degree as u64 {
			return Err(Error::InvalidGaloisElement(g));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rotation_elements_are_generator_powers() {
		assert_eq!(GaloisElement::rotating_columns_by(1, 8).unwrap(), 3);
		assert_eq!(GaloisElement::rotating_columns_by(2, 8).unwrap(), 9);
		// Negative steps wrap through the row size.
		assert_eq!(
			GaloisElement::rotating_columns_by(-1, 8).unwrap(),
			pow_mod_order(3, 3, 16)
		);
		assert!(GaloisElement::rotating_columns_by(0, 8).is_err());
		assert!(GaloisElement::rotating_columns_by(4, 8).is_err());
	}

	#[test]
	fn swap_rows_element() {
		assert_eq!(GaloisElement::swapping_rows(8), 15);
		assert_eq!(GaloisElement::swapping_rows(4096), 8191);
	}

	#[test]
	fn elements_are_odd() {
		for degree in [8usize, 16, 4096] {
			for steps in 1..4i64 {
				let g = GaloisElement::rotating_columns_by(steps, degree).unwrap();
				assert_eq!(g % 2, 1);
				GaloisElement::validate(g, degree).unwrap();
			}
			GaloisElement::validate(GaloisElement::swapping_rows(degree), degree).unwrap();
		}
		assert!(GaloisElement::validate(2, 8).is_err());
		assert!(GaloisElement::validate(17, 8).is_err());
	}
}
