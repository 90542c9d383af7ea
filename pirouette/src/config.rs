//! Top-level protocol identifiers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The index-PIR algorithm a processed database targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PirAlgorithm {
	/// MulPIR: ciphertext-times-ciphertext selection products.
	MulPir,
	/// Reserved identifier; no code path accepts it yet.
	AclsPir,
}

impl PirAlgorithm {
	/// Rejects identifiers that are reserved for forward compatibility.
	pub fn validate(&self) -> Result<()> {
		match self {
			PirAlgorithm::MulPir => Ok(()),
			PirAlgorithm::AclsPir => {
				Err(Error::UnsupportedPirAlgorithm("aclsPir".to_string()))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn acls_pir_is_reserved() {
		assert!(PirAlgorithm::MulPir.validate().is_ok());
		assert!(matches!(
			PirAlgorithm::AclsPir.validate(),
			Err(Error::UnsupportedPirAlgorithm(_))
		));
	}
}
