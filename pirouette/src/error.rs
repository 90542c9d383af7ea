use thiserror::Error;

/// Type representing all errors that can occur in the PIR layer.
#[derive(Debug, Error)]
pub enum Error {
	/// An error bubbled up from the BFV engine.
	#[error(transparent)]
	Bfv(#[from] pirouette_bfv::Error),

	/// A configuration value violates an invariant.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	/// A PIR algorithm identifier that no code path supports.
	#[error("unsupported PIR algorithm: {0}")]
	UnsupportedPirAlgorithm(String),

	/// A single entry would not fit in an empty bucket.
	#[error("entry of {size} bytes exceeds the bucket limit of {max} bytes")]
	EntryTooLarge {
		/// Serialized size of the offending entry alone.
		size: usize,
		/// The configured `max_serialized_bucket_size`.
		max: usize,
	},

	/// Inserts exhausted the eviction budget and the table is fixed-size.
	/// The table state after this failure is undefined.
	#[error("cuckoo insertion failed after exhausting {0} evictions")]
	CuckooInsertionFailed(usize),

	/// Validation measured a noise budget below the safe floor.
	#[error("insufficient noise budget: {0} bits")]
	InsufficientNoiseBudget(u32),

	/// The database contains no rows.
	#[error("empty database")]
	EmptyDatabase,

	/// Database entries must share one size for index PIR.
	#[error("entry sizes differ: {0} != {1}")]
	UnequalEntrySizes(usize, usize),

	/// A serialized object failed to parse.
	#[error("cannot deserialize: {0}")]
	InvalidSerialization(String),

	/// An OPRF protocol step failed.
	#[error("oprf failure: {0}")]
	Oprf(String),
}

/// `Result` alias for the PIR layer.
pub type Result<T> = std::result::Result<T, Error>;
