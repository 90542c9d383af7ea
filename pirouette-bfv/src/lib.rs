//! BFV fully homomorphic encryption over power-of-two cyclotomic rings.
//!
//! # Example
//!
//! ```rust
//! use pirouette_bfv::{
//!     Context, Decryptor, Encoder, EncodingFormat, EncryptionParametersBuilder, Encryptor,
//!     Evaluator, SecretKey,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let params = EncryptionParametersBuilder::new()
//!         .set_degree(8)
//!         .set_plain_modulus(17)
//!         .set_coefficient_moduli_bits(vec![18, 18, 18])
//!         .build()?;
//!     let context = Context::new(params)?;
//!
//!     let secret_key = SecretKey::random(&context)?;
//!     let encoder = Encoder::new(&context);
//!     let encryptor = Encryptor::new(&context, &secret_key)?;
//!     let decryptor = Decryptor::new(&context, &secret_key)?;
//!     let evaluator = Evaluator::new(&context);
//!
//!     let plaintext = encoder.encode(&[1, 2, 3], EncodingFormat::Coefficient)?;
//!     let ciphertext = encryptor.encrypt(&plaintext)?;
//!     let doubled = evaluator.add(&ciphertext, &ciphertext)?;
//!
//!     let decrypted = decryptor.decrypt(&doubled)?;
//!     println!("{:?}", encoder.decode(&decrypted, EncodingFormat::Coefficient)?); // [2, 4, 6]
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

mod ciphertext;
mod context;
mod decryptor;
mod encryptor;
mod error;
mod evaluator;
mod galois;
mod key_generator;
mod matmul;
mod modulus;
mod ntt;
mod parameters;
mod plaintext;
mod poly;
mod rns;
mod seeded_rng;
mod serialization;

pub use ciphertext::Ciphertext;
pub use context::Context;
pub use decryptor::{Decryptor, MIN_NOISE_BUDGET};
pub use encryptor::Encryptor;
pub use error::{Error, Result};
pub use evaluator::Evaluator;
pub use galois::GaloisElement;
pub use key_generator::{
	EvaluationKey, EvaluationKeyBuilder, EvaluationKeyConfig, GaloisKey, RelinearizationKey,
	SecretKey,
};
pub use matmul::{encode_vector, MatrixPacking, PlaintextMatrix};
pub use modulus::{
	generate_primes, is_prime, CoefficientModulusFactory, Modulus, PlainModulusFactory,
	MAX_MODULUS_BITS,
};
pub use ntt::NttOperator;
pub use parameters::{
	EncryptionParameters, EncryptionParametersBuilder, ErrorStdDev, SecurityLevel,
};
pub use plaintext::{Encoder, EncodingFormat, Plaintext};
pub use poly::{PolyContext, Polynomial, Representation};
pub use rns::{RnsContext, Scaler};
pub use seeded_rng::{Seed, SeededRng, SEED_SIZE};
pub use serialization::{
	deserialize_ciphertext, serialize_for_decryption, serialize_full, serialize_seeded,
	FromBytes, ToBytes,
};
