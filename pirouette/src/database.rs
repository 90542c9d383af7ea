//! Packing byte entries into plaintext polynomials.

use std::sync::Arc;

use pirouette_bfv::{Context, Encoder, EncodingFormat, Plaintext};

use crate::error::{Error, Result};

/// Usable bits per coefficient: `⌊log2 t⌋`.
pub fn bits_per_coefficient(context: &Context) -> usize {
	63 - context.plain_modulus().value().leading_zeros() as usize
}

/// Bytes one plaintext polynomial can carry.
pub fn bytes_per_plaintext(context: &Context) -> usize {
	context.degree() * bits_per_coefficient(context) / 8
}

/// Packs bytes into coefficients of `bits` bits each, MSB-first.
pub fn bytes_to_coefficients(bytes: &[u8], degree: usize, bits: usize) -> Result<Vec<u64>> {
	if bytes.len() * 8 > degree * bits {
		return Err(Error::InvalidConfig(format!(
			"{} bytes exceed the {} plaintext capacity",
			bytes.len(),
			degree * bits / 8
		)));
	}
	let mut coefficients = vec![0u64; degree];
	let mut acc: u64 = 0;
	let mut available: u32 = 0;
	let mut out = 0usize;
	for &byte in bytes {
		acc = (acc << 8) | byte as u64;
		available += 8;
		while available >= bits as u32 {
			let shift = available - bits as u32;
			coefficients[out] = (acc >> shift) & ((1u64 << bits) - 1);
			available -= bits as u32;
			acc &= (1u64 << available) - 1;
			out += 1;
		}
	}
	if available > 0 {
		coefficients[out] = acc << (bits as u32 - available);
	}
	Ok(coefficients)
}

/// Unpacks coefficients produced by [`bytes_to_coefficients`].
pub fn coefficients_to_bytes(coefficients: &[u64], byte_count: usize, bits: usize) -> Vec<u8> {
	let mut out = Vec::with_capacity(byte_count);
	let mut acc: u64 = 0;
	let mut available: u32 = 0;
	for &c in coefficients {
		acc = (acc << bits) | (c & ((1u64 << bits) - 1));
		available += bits as u32;
		while available >= 8 {
			let shift = available - 8;
			out.push((acc >> shift) as u8);
			if out.len() == byte_count {
				return out;
			}
			available -= 8;
			acc &= (1u64 << available) - 1;
		}
	}
	while out.len() < byte_count {
		out.push(0);
	}
	out
}

/// Splits one fixed-size entry into its per-chunk plaintexts.
pub fn encode_entry(context: &Arc<Context>, entry: &[u8], chunk_count: usize) -> Result<Vec<Plaintext>> {
	let encoder = Encoder::new(context);
	let capacity = bytes_per_plaintext(context);
	let bits = bits_per_coefficient(context);
	let mut plaintexts = Vec::with_capacity(chunk_count);
	for c in 0..chunk_count {
		let chunk = entry
			.get(c * capacity..((c + 1) * capacity).min(entry.len()))
			.unwrap_or(&[]);
		let coefficients = bytes_to_coefficients(chunk, context.degree(), bits)?;
		plaintexts.push(encoder.encode(&coefficients, EncodingFormat::Coefficient)?);
	}
	Ok(plaintexts)
}

/// Reassembles an entry from decrypted chunk coefficient vectors.
pub fn decode_entry(context: &Context, chunks: &[Vec<u64>], entry_size: usize) -> Vec<u8> {
	let capacity = bytes_per_plaintext(context);
	let bits = bits_per_coefficient(context);
	let mut out = Vec::with_capacity(entry_size);
	for chunk in chunks {
		let remaining = entry_size - out.len();
		let take = remaining.min(capacity);
		out.extend_from_slice(&coefficients_to_bytes(chunk, take, bits));
		if out.len() >= entry_size {
			break;
		}
	}
	out.truncate(entry_size);
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use pirouette_bfv::EncryptionParametersBuilder;

	fn context() -> Arc<Context> {
		Context::new(
			EncryptionParametersBuilder::new()
				.set_degree(64)
				.set_plain_modulus(257)
				.set_coefficient_moduli_bits(vec![30, 30])
				.build()
				.unwrap(),
		)
		.unwrap()
	}

	#[test]
	fn packing_roundtrip() {
		let bytes: Vec<u8> = (0..40u8).collect();
		for bits in [4usize, 7, 8, 13] {
			let degree = 64;
			if bytes.len() * 8 > degree * bits {
				continue;
			}
			let coefficients = bytes_to_coefficients(&bytes, degree, bits).unwrap();
			assert!(coefficients.iter().all(|c| *c < (1 << bits)));
			assert_eq!(coefficients_to_bytes(&coefficients, bytes.len(), bits), bytes);
		}
	}

	#[test]
	fn capacity_calculations() {
		let ctx = context();
		// t = 257 gives 8 usable bits per coefficient.
		assert_eq!(bits_per_coefficient(&ctx), 8);
		assert_eq!(bytes_per_plaintext(&ctx), 64);
	}

	#[test]
	fn oversized_chunks_are_rejected() {
		assert!(bytes_to_coefficients(&[0u8; 100], 64, 8).is_err());
	}

	#[test]
	fn entry_roundtrip_through_plaintexts() {
		let ctx = context();
		let entry: Vec<u8> = (0..100u8).collect();
		let chunk_count = 2;
		let plaintexts = encode_entry(&ctx, &entry, chunk_count).unwrap();
		assert_eq!(plaintexts.len(), 2);
		let chunks: Vec<Vec<u64>> = plaintexts
			.iter()
			.map(|p| p.coefficients().to_vec())
			.collect();
		assert_eq!(decode_entry(&ctx, &chunks, entry.len()), entry);
	}
}
