use thiserror::Error;

/// Type representing all errors that can occur in the BFV engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// A modulus outside the supported range was requested.
	#[error("modulus should be between 2 and 2^62-1, got {0}")]
	InvalidModulus(u64),

	/// The polynomial degree is not a supported power of two.
	#[error("polynomial degree must be a power of two >= 2, got {0}")]
	InvalidDegree(usize),

	/// No prime satisfying the requested constraints exists.
	#[error("no {bits}-bit prime congruent to 1 modulo {congruence} is available")]
	PrimeGenerationFailure {
		/// Requested significant bit count.
		bits: usize,
		/// The required congruence class (2 * degree).
		congruence: u64,
	},

	/// The modulus does not support an NTT of the requested degree.
	#[error("modulus {0} has no primitive root of order {1}")]
	NttNotSupported(u64, usize),

	/// The coefficient modulus chain was empty or not set.
	#[error("coefficient modulus not set")]
	CoefficientModulusNotSet,

	/// The plaintext modulus was not set.
	#[error("plaintext modulus not set")]
	PlainModulusNotSet,

	/// The polynomial degree was not set.
	#[error("polynomial degree not set")]
	DegreeNotSet,

	/// A parameter combination failed validation.
	#[error("invalid encryption parameters: {0}")]
	InvalidParameters(String),

	/// Operands belong to different contexts.
	#[error("operands belong to different contexts")]
	ContextMismatch,

	/// Operands disagree on their RNS level.
	#[error("level mismatch: {0} != {1}")]
	LevelMismatch(usize, usize),

	/// Operands disagree on their representation.
	#[error("format mismatch: expected {expected:?}, got {got:?}")]
	FormatMismatch {
		/// The representation required by the operation.
		expected: crate::poly::Representation,
		/// The representation found.
		got: crate::poly::Representation,
	},

	/// Operands disagree on their correction factors.
	#[error("correction factor mismatch: {0} != {1}")]
	CorrectionFactorMismatch(u64, u64),

	/// The ciphertext is already at a single modulus.
	#[error("cannot mod-switch a single-modulus ciphertext")]
	AlreadySingleModulus,

	/// Multiplication of a single-modulus ciphertext was requested.
	#[error("multiplication is forbidden once a ciphertext has a single modulus")]
	MultiplicationAtSingleModulus,

	/// The evaluation key lacks the Galois key for an element.
	#[error("no Galois key for element {0}")]
	MissingGaloisKey(u64),

	/// The evaluation key lacks a relinearization key.
	#[error("no relinearization key")]
	MissingRelinearizationKey,

	/// The value cannot be encoded under the current parameters.
	#[error("cannot encode: {0}")]
	EncodingError(String),

	/// SIMD encoding was requested but the plaintext modulus has no
	/// batching support.
	#[error("plaintext modulus {0} does not support SIMD encoding for degree {1}")]
	SimdNotSupported(u64, usize),

	/// A serialized object failed to parse.
	#[error("cannot deserialize: {0}")]
	SerializationError(String),

	/// A seeded serialization was requested for a mutated ciphertext.
	#[error("ciphertext was mutated since encryption; the seeded form is unavailable")]
	SeedUnavailable,

	/// A Galois element outside the valid odd range was supplied.
	#[error("invalid Galois element {0}")]
	InvalidGaloisElement(u64),

	/// A key-switch was requested at an unsupported level.
	#[error("key-switching requires a ciphertext at level 0, got level {0}")]
	KeySwitchLevel(usize),

	/// A ciphertext of unexpected size was supplied.
	#[error("expected a ciphertext with {expected} polynomials, got {got}")]
	CiphertextSize {
		/// Number of polynomials required.
		expected: usize,
		/// Number of polynomials found.
		got: usize,
	},

	/// The measured noise budget is below the safe floor.
	#[error("insufficient noise budget: {0} bits")]
	InsufficientNoiseBudget(u32),
}

/// `Result` alias for the BFV engine.
pub type Result<T> = std::result::Result<T, Error>;
