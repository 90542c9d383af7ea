//! Symmetric PIR: OPRF-transformed keywords and AES-GCM-wrapped values.
//!
//! The server holds a P-384 OPRF secret. Keywords become the 16-byte
//! prefix of the OPRF output; values are sealed with AES-192-GCM under
//! the 24-byte suffix, with the 12-byte output prefix as nonce. A
//! client first runs the blinded evaluation to learn the OPRF output
//! for its own keyword, then issues an ordinary keyword-PIR query for
//! the transformed keyword.

use aes::Aes192;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Key, Nonce};
use elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use elliptic_curve::Field;
use p384::{AffinePoint, EncodedPoint, NistP384, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};

use crate::error::{Error, Result};

/// Domain separator of the hash-to-curve step.
const HASH_TO_GROUP_DST: &[u8] = b"HashToGroup-OPRFV1-\x00-P384-SHA384";
/// Trailing tag of the output hash.
const FINALIZE_TAG: &[u8] = b"Finalize";

/// AES-GCM over AES-192 with the 96-bit nonce the ciphersuite fixes.
type Aes192Gcm = AesGcm<Aes192, U12>;

/// Byte length of the OPRF output.
pub const OPRF_OUTPUT_SIZE: usize = 48;
/// Byte length of the transformed keyword.
pub const KEYWORD_TAG_SIZE: usize = 16;
/// Byte length of the AES-192 key taken from the output suffix.
pub const VALUE_KEY_SIZE: usize = 24;
/// Byte length of the AES-GCM nonce taken from the output prefix.
pub const NONCE_SIZE: usize = 12;

/// The fixed symmetric-PIR ciphersuite; the identifier locks all sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymmetricPirConfigType {
	/// P-384 OPRF, AES-GCM with a 192-bit key, 96-bit nonce, 128-bit
	/// tag.
	OprfP384AesGcm192Nonce96Tag128,
}

/// Configuration of the symmetric-PIR wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricPirConfig {
	/// The ciphersuite identifier.
	pub config_type: SymmetricPirConfigType,
}

/// The server's OPRF secret scalar; its backing storage is overwritten
/// on drop with a volatile write the compiler may not elide.
pub struct OprfSecretKey {
	scalar: Scalar,
}

impl OprfSecretKey {
	/// Samples a fresh secret from system entropy.
	pub fn random() -> Self {
		Self {
			scalar: Scalar::random(&mut OsRng),
		}
	}
}

impl Drop for OprfSecretKey {
	fn drop(&mut self) {
		unsafe { core::ptr::write_volatile(&mut self.scalar, Scalar::ZERO) };
		core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
	}
}

fn hash_to_group(keyword: &[u8]) -> Result<ProjectivePoint> {
	NistP384::hash_from_bytes::<ExpandMsgXmd<Sha384>>(&[keyword], &[HASH_TO_GROUP_DST])
		.map_err(|_| Error::Oprf("hash-to-curve failed".to_string()))
}

fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
	point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

fn point_from_bytes(bytes: &[u8]) -> Result<ProjectivePoint> {
	let encoded = EncodedPoint::from_bytes(bytes)
		.map_err(|_| Error::Oprf("malformed group element".to_string()))?;
	let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
		.ok_or_else(|| Error::Oprf("point is not on the curve".to_string()))?;
	Ok(ProjectivePoint::from(affine))
}

/// `Finalize(input, element)`: the hash binding the keyword to its
/// unblinded evaluation.
fn finalize(keyword: &[u8], element: &ProjectivePoint) -> [u8; OPRF_OUTPUT_SIZE] {
	let element_bytes = point_to_bytes(element);
	let mut hasher = Sha384::new();
	hasher.update((keyword.len() as u16).to_be_bytes());
	hasher.update(keyword);
	hasher.update((element_bytes.len() as u16).to_be_bytes());
	hasher.update(&element_bytes);
	hasher.update(FINALIZE_TAG);
	hasher.finalize().into()
}

/// The server side of the OPRF protocol and the database transform.
pub struct OprfServer {
	secret: OprfSecretKey,
	config: SymmetricPirConfig,
}

impl OprfServer {
	/// Creates a server with a fresh secret.
	pub fn random(config: SymmetricPirConfig) -> Self {
		Self {
			secret: OprfSecretKey::random(),
			config,
		}
	}

	/// Returns the ciphersuite in force.
	pub fn config(&self) -> SymmetricPirConfig {
		self.config
	}

	/// Evaluates a blinded element: `Z = M · sk`.
	pub fn blind_evaluate(&self, blinded: &[u8]) -> Result<Vec<u8>> {
		let m = point_from_bytes(blinded)?;
		Ok(point_to_bytes(&(m * self.secret.scalar)))
	}

	/// The server-side direct evaluation `F(sk, keyword)` used while
	/// transforming the database.
	fn evaluate(&self, keyword: &[u8]) -> Result<[u8; OPRF_OUTPUT_SIZE]> {
		let point = hash_to_group(keyword)? * self.secret.scalar;
		Ok(finalize(keyword, &point))
	}

	/// Transforms rows before cuckoo hashing: keywords become OPRF
	/// prefixes, values are sealed under the output suffix.
	pub fn transform_database(
		&self,
		rows: &[(Vec<u8>, Vec<u8>)],
	) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
		rows.iter()
			.map(|(keyword, value)| {
				let output = self.evaluate(keyword)?;
				let sealed = seal_value(&output, value)?;
				Ok((keyword_tag(&output).to_vec(), sealed))
			})
			.collect()
	}
}

/// The in-flight state of one blinded client evaluation.
pub struct OprfBlindState {
	keyword: Vec<u8>,
	blind: Scalar,
}

/// The client side of the OPRF protocol.
pub struct OprfClient;

impl OprfClient {
	/// Blinds a keyword: `M = H(keyword) · r` for a fresh `r`.
	pub fn blind(keyword: &[u8]) -> Result<(OprfBlindState, Vec<u8>)> {
		let blind = Scalar::random(&mut OsRng);
		let m = hash_to_group(keyword)? * blind;
		Ok((
			OprfBlindState {
				keyword: keyword.to_vec(),
				blind,
			},
			point_to_bytes(&m),
		))
	}

	/// Unblinds the server's evaluation and derives the output:
	/// `F(sk, keyword) = Finalize(keyword, Z · r^{-1})`.
	pub fn finalize(
		state: &OprfBlindState,
		evaluated: &[u8],
	) -> Result<[u8; OPRF_OUTPUT_SIZE]> {
		let z = point_from_bytes(evaluated)?;
		let inverse = Option::<Scalar>::from(state.blind.invert())
			.ok_or_else(|| Error::Oprf("zero blind".to_string()))?;
		Ok(finalize(&state.keyword, &(z * inverse)))
	}
}

/// The transformed keyword: the 16-byte output prefix.
pub fn keyword_tag(output: &[u8; OPRF_OUTPUT_SIZE]) -> [u8; KEYWORD_TAG_SIZE] {
	output[..KEYWORD_TAG_SIZE].try_into().expect("fixed prefix")
}

/// Seals a value under the output suffix key and prefix nonce.
pub fn seal_value(output: &[u8; OPRF_OUTPUT_SIZE], value: &[u8]) -> Result<Vec<u8>> {
	let key = Key::<Aes192Gcm>::from_slice(&output[OPRF_OUTPUT_SIZE - VALUE_KEY_SIZE..]);
	let nonce = Nonce::from_slice(&output[..NONCE_SIZE]);
	Aes192Gcm::new(key)
		.encrypt(nonce, value)
		.map_err(|_| Error::Oprf("value encryption failed".to_string()))
}

/// Opens a sealed value retrieved through keyword PIR.
pub fn open_value(output: &[u8; OPRF_OUTPUT_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
	let key = Key::<Aes192Gcm>::from_slice(&output[OPRF_OUTPUT_SIZE - VALUE_KEY_SIZE..]);
	let nonce = Nonce::from_slice(&output[..NONCE_SIZE]);
	Aes192Gcm::new(key)
		.decrypt(nonce, sealed)
		.map_err(|_| Error::Oprf("value authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> SymmetricPirConfig {
		SymmetricPirConfig {
			config_type: SymmetricPirConfigType::OprfP384AesGcm192Nonce96Tag128,
		}
	}

	#[test]
	fn blinded_and_direct_evaluations_agree() {
		let server = OprfServer::random(config());
		for keyword in [b"alpha".as_slice(), b"beta", b""] {
			let (state, blinded) = OprfClient::blind(keyword).unwrap();
			let evaluated = server.blind_evaluate(&blinded).unwrap();
			let via_protocol = OprfClient::finalize(&state, &evaluated).unwrap();
			let direct = server.evaluate(keyword).unwrap();
			assert_eq!(via_protocol, direct);
		}
	}

	#[test]
	fn blinding_hides_the_keyword() {
		let (_, once) = OprfClient::blind(b"secret").unwrap();
		let (_, twice) = OprfClient::blind(b"secret").unwrap();
		assert_ne!(once, twice);
	}

	#[test]
	fn outputs_differ_per_keyword_and_key() {
		let a = OprfServer::random(config());
		let b = OprfServer::random(config());
		assert_ne!(a.evaluate(b"k").unwrap(), b.evaluate(b"k").unwrap());
		assert_ne!(a.evaluate(b"k").unwrap(), a.evaluate(b"l").unwrap());
	}

	#[test]
	fn sealed_values_roundtrip_and_authenticate() {
		let server = OprfServer::random(config());
		let output = server.evaluate(b"keyword").unwrap();
		let sealed = seal_value(&output, b"the payload").unwrap();
		assert_eq!(open_value(&output, &sealed).unwrap(), b"the payload");

		let mut tampered = sealed.clone();
		tampered[0] ^= 1;
		assert!(open_value(&output, &tampered).is_err());

		let other = server.evaluate(b"other").unwrap();
		assert!(open_value(&other, &sealed).is_err());
	}

	#[test]
	fn transformed_rows_hide_keywords_and_values() {
		let server = OprfServer::random(config());
		let rows = vec![
			(b"key-1".to_vec(), b"value-1".to_vec()),
			(b"key-2".to_vec(), b"value-2".to_vec()),
		];
		let transformed = server.transform_database(&rows).unwrap();
		assert_eq!(transformed.len(), 2);
		for ((keyword, value), (tag, sealed)) in rows.iter().zip(&transformed) {
			assert_eq!(tag.len(), KEYWORD_TAG_SIZE);
			assert_ne!(tag, keyword);
			assert_ne!(sealed, value);
			// The legitimate client can open the sealed value.
			let (state, blinded) = OprfClient::blind(keyword).unwrap();
			let evaluated = server.blind_evaluate(&blinded).unwrap();
			let output = OprfClient::finalize(&state, &evaluated).unwrap();
			assert_eq!(&keyword_tag(&output).to_vec(), tag);
			assert_eq!(&open_value(&output, sealed).unwrap(), value);
		}
	}

	#[test]
	fn malformed_points_are_rejected() {
		let server = OprfServer::random(config());
		assert!(server.blind_evaluate(&[0u8; 10]).is_err());
	}
}
