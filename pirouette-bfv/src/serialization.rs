//! Wire formats: bit-packed polynomials, the three ciphertext layouts,
//! and key material.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::key_generator::{
	EvaluationKey, GaloisKey, KeySwitchKey, RelinearizationKey,
};
use crate::plaintext::Plaintext;
use crate::poly::{PolyContext, Polynomial, Representation};
use crate::seeded_rng::{Seed, SEED_SIZE};

/// A trait for converting objects into byte arrays.
pub trait ToBytes {
	/// Returns the object as a byte array.
	fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// A trait for recovering objects from a byte slice under some state,
/// typically the governing context.
pub trait FromBytes {
	/// State used to deserialize an object from bytes.
	type State;
	/// Deserializes an object from the given bytes using the given state.
	fn from_bytes(state: &Self::State, bytes: &[u8]) -> Result<Self>
	where
		Self: Sized;
}

/// One-byte tags selecting the ciphertext layout on the wire.
const TAG_SEEDED: u8 = 0;
const TAG_FULL: u8 = 1;
const TAG_FOR_DECRYPTION: u8 = 2;

struct BitWriter {
	buf: Vec<u8>,
	acc: u64,
	filled: u32,
}

impl BitWriter {
	fn new() -> Self {
		Self {
			buf: Vec::new(),
			acc: 0,
			filled: 0,
		}
	}

	/// Appends the low `bits` bits of `value`, most significant first.
	fn write(&mut self, value: u64, bits: u32) {
		debug_assert!(bits <= 64);
		debug_assert!(bits == 64 || value < (1u64 << bits));
		let mut remaining = bits;
		while remaining > 0 {
			let take = remaining.min(8 - self.filled);
			let shift = remaining - take;
			let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;
			self.acc = (self.acc << take) | chunk as u64;
			self.filled += take;
			remaining -= take;
			if self.filled == 8 {
				self.buf.push(self.acc as u8);
				self.acc = 0;
				self.filled = 0;
			}
		}
	}

	/// Pads the final partial byte with zeros and returns the stream.
	fn finish(mut self) -> Vec<u8> {
		if self.filled > 0 {
			self.buf.push((self.acc << (8 - self.filled)) as u8);
		}
		self.buf
	}
}

struct BitReader<'a> {
	bytes: &'a [u8],
	position: usize,
	acc: u64,
	available: u32,
}

impl<'a> BitReader<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		Self {
			bytes,
			position: 0,
			acc: 0,
			available: 0,
		}
	}

	fn read(&mut self, bits: u32) -> Result<u64> {
		debug_assert!(bits <= 62);
		while self.available < bits {
			let byte = *self
				.bytes
				.get(self.position)
				.ok_or_else(|| Error::SerializationError("truncated bit stream".to_string()))?;
			self.position += 1;
			self.acc = (self.acc << 8) | byte as u64;
			self.available += 8;
		}
		let shift = self.available - bits;
		let value = (self.acc >> shift) & ((1u64 << bits) - 1);
		self.available -= bits;
		self.acc &= (1u64 << self.available) - 1;
		Ok(value)
	}

	fn consumed_bytes(&self) -> usize {
		self.position
	}
}

/// Field width of limb `i`: the significant bits of its modulus.
fn limb_bits(ctx: &PolyContext, i: usize) -> u32 {
	ctx.modulus(i).bits() as u32
}

/// Serialized byte length of one polynomial with `skip` bits dropped.
fn poly_byte_len(ctx: &PolyContext, skip: u32) -> usize {
	let total: usize = (0..ctx.limb_count())
		.map(|i| ctx.degree() * limb_bits(ctx, i).saturating_sub(skip) as usize)
		.sum();
	total.div_ceil(8)
}

/// Packs the residues of a polynomial (in whatever representation it
/// holds) into `⌈log2 q_i⌉ - skip`-bit fields, dropping low bits.
fn write_poly(poly: &Polynomial, skip: u32) -> Vec<u8> {
	let ctx = poly.context();
	let mut writer = BitWriter::new();
	for i in 0..ctx.limb_count() {
		let bits = limb_bits(ctx, i).saturating_sub(skip);
		for &c in poly.limb(i) {
			writer.write(c >> skip, bits);
		}
	}
	writer.finish()
}

/// Reads a polynomial packed by [`write_poly`], restoring the dropped
/// low bits at the field midpoint.
fn read_poly(
	ctx: &Arc<PolyContext>,
	representation: Representation,
	bytes: &[u8],
	skip: u32,
) -> Result<(Polynomial, usize)> {
	let mut reader = BitReader::new(bytes);
	let mut poly = Polynomial::zero(ctx, representation);
	let midpoint = if skip > 0 { 1u64 << (skip - 1) } else { 0 };
	for i in 0..ctx.limb_count() {
		let m = ctx.modulus(i).clone();
		let bits = limb_bits(ctx, i).saturating_sub(skip);
		let limb = poly.limb_mut(i);
		for c in limb.iter_mut() {
			let raw = reader.read(bits)?;
			*c = m.reduce((raw << skip) | midpoint);
		}
	}
	Ok((poly, reader.consumed_bytes()))
}

/// How aggressively the for-decryption layout may drop low bits from
/// each polynomial, per the rounding analysis: the margin between the
/// modulus and the plaintext, less the expansion a ternary secret can
/// apply to the `a`-polynomial's error, less a safety band.
///
/// Truncating residues limb by limb is only meaningful when a single
/// limb remains (the residue then IS the coefficient); ciphertexts
/// still carrying several moduli keep every bit.
fn for_decryption_skip(context: &Context, level: usize, poly_index: usize) -> Result<u32> {
	let ctx = context.poly_context(level)?;
	if ctx.limb_count() > 1 {
		return Ok(0);
	}
	let bits = limb_bits(ctx, 0);
	let t_bits = context.plain_modulus().bits() as u32;
	let log_degree = context.degree().trailing_zeros();
	let budget = if poly_index == 0 {
		bits.saturating_sub(t_bits + 5)
	} else {
		bits.saturating_sub(t_bits + log_degree + 5)
	};
	Ok(budget)
}

fn push_header(out: &mut Vec<u8>, tag: u8, ct: &Ciphertext) {
	out.push(tag);
	out.push(ct.level() as u8);
	out.push(ct.size() as u8);
	out.extend_from_slice(&ct.correction_factor().to_le_bytes());
}

/// Serializes a fresh ciphertext as its `b` polynomial plus the 64-byte
/// seed of `a`. Fails once the ciphertext has been mutated.
pub fn serialize_seeded(ct: &Ciphertext) -> Result<Vec<u8>> {
	let seed = ct.seed().ok_or(Error::SeedUnavailable)?;
	let mut b = ct.polys[0].clone();
	b.to_coefficient()?;
	let mut out = Vec::new();
	push_header(&mut out, TAG_SEEDED, ct);
	out.extend_from_slice(&write_poly(&b, 0));
	out.extend_from_slice(seed);
	Ok(out)
}

/// Serializes any ciphertext with all polynomials in full.
pub fn serialize_full(ct: &Ciphertext) -> Result<Vec<u8>> {
	let mut out = Vec::new();
	push_header(&mut out, TAG_FULL, ct);
	for _ in &ct.polys {
		out.push(0); // skip_lsbs
	}
	for poly in &ct.polys {
		let mut p = poly.clone();
		p.to_coefficient()?;
		out.extend_from_slice(&write_poly(&p, 0));
	}
	Ok(out)
}

/// Serializes a ciphertext whose only remaining use is decryption: low
/// bits are discarded up to the rounding margin, and, for coefficient
/// encoding, coefficients outside `indices` may be zeroed.
pub fn serialize_for_decryption(
	ct: &Ciphertext,
	indices: Option<&[usize]>,
) -> Result<Vec<u8>> {
	let context = ct.context();
	let mut out = Vec::new();
	push_header(&mut out, TAG_FOR_DECRYPTION, ct);
	let skips: Vec<u32> = (0..ct.size())
		.map(|k| for_decryption_skip(context, ct.level(), k))
		.collect::<Result<Vec<_>>>()?;
	for &skip in &skips {
		out.push(skip as u8);
	}
	for (k, poly) in ct.polys.iter().enumerate() {
		let mut p = poly.clone();
		p.to_coefficient()?;
		if k == 0 {
			if let Some(kept) = indices {
				let n = p.context().degree();
				let keep: Vec<bool> = {
					let mut keep = vec![false; n];
					for &j in kept {
						if j < n {
							keep[j] = true;
						}
					}
					keep
				};
				for i in 0..p.context().limb_count() {
					let limb = p.limb_mut(i);
					for (j, v) in limb.iter_mut().enumerate() {
						if !keep[j] {
							*v = 0;
						}
					}
				}
			}
		}
		out.extend_from_slice(&write_poly(&p, skips[k]));
	}
	Ok(out)
}

/// Recovers a ciphertext from any of the three layouts, selected by the
/// leading tag byte.
pub fn deserialize_ciphertext(context: &Arc<Context>, bytes: &[u8]) -> Result<Ciphertext> {
	if bytes.len() < 11 {
		return Err(Error::SerializationError("truncated ciphertext".to_string()));
	}
	let tag = bytes[0];
	let level = bytes[1] as usize;
	let size = bytes[2] as usize;
	let correction_factor = u64::from_le_bytes(
		bytes[3..11]
			.try_into()
			.map_err(|_| Error::SerializationError("truncated header".to_string()))?,
	);
	let ctx = context.poly_context(level)?;
	if size < 2 {
		return Err(Error::CiphertextSize {
			expected: 2,
			got: size,
		});
	}

	match tag {
		TAG_SEEDED => {
			let body = &bytes[11..];
			let (mut b, consumed) = read_poly(ctx, Representation::Coefficient, body, 0)?;
			b.to_evaluation()?;
			let seed_bytes = body
				.get(consumed..consumed + SEED_SIZE)
				.ok_or_else(|| Error::SerializationError("missing seed".to_string()))?;
			let seed: Seed = seed_bytes
				.try_into()
				.map_err(|_| Error::SerializationError("invalid seed".to_string()))?;
			let a = Polynomial::random_from_seed(ctx, &seed, 0);
			Ok(Ciphertext {
				context: context.clone(),
				polys: vec![b, a],
				level,
				correction_factor,
				seed: Some(seed),
			})
		}
		TAG_FULL | TAG_FOR_DECRYPTION => {
			let skips_end = 11 + size;
			let skips: Vec<u32> = bytes
				.get(11..skips_end)
				.ok_or_else(|| Error::SerializationError("truncated skip list".to_string()))?
				.iter()
				.map(|s| *s as u32)
				.collect();
			let mut offset = skips_end;
			let mut polys = Vec::with_capacity(size);
			for &skip in &skips {
				let (mut p, consumed) =
					read_poly(ctx, Representation::Coefficient, &bytes[offset..], skip)?;
				p.to_evaluation()?;
				offset += consumed;
				polys.push(p);
			}
			Ok(Ciphertext {
				context: context.clone(),
				polys,
				level,
				correction_factor,
				seed: None,
			})
		}
		other => Err(Error::SerializationError(format!(
			"unknown ciphertext tag {other}"
		))),
	}
}

impl ToBytes for Ciphertext {
	/// Fresh ciphertexts use the seeded layout; mutated ones fall back
	/// to the full layout.
	fn to_bytes(&self) -> Result<Vec<u8>> {
		if self.is_fresh() {
			serialize_seeded(self)
		} else {
			serialize_full(self)
		}
	}
}

impl FromBytes for Ciphertext {
	type State = Arc<Context>;

	fn from_bytes(state: &Self::State, bytes: &[u8]) -> Result<Self> {
		deserialize_ciphertext(state, bytes)
	}
}

impl ToBytes for Plaintext {
	fn to_bytes(&self) -> Result<Vec<u8>> {
		Ok(write_poly(&self.poly, 0))
	}
}

impl FromBytes for Plaintext {
	type State = Arc<Context>;

	fn from_bytes(state: &Self::State, bytes: &[u8]) -> Result<Self> {
		let (poly, _) = read_poly(
			state.plain_context(),
			Representation::Coefficient,
			bytes,
			0,
		)?;
		Ok(Plaintext {
			poly,
		})
	}
}

fn write_key_switch_key(out: &mut Vec<u8>, key: &KeySwitchKey) {
	out.extend_from_slice(&key.seed);
	out.push(key.c0.len() as u8);
	for row in &key.c0 {
		// Rows live in evaluation form; the seed reproduces `c1`.
		out.extend_from_slice(&write_poly(row, 0));
	}
}

fn read_key_switch_key(
	context: &Arc<Context>,
	bytes: &[u8],
) -> Result<(KeySwitchKey, usize)> {
	let ctx = context.key_context();
	let seed: Seed = bytes
		.get(..SEED_SIZE)
		.and_then(|s| s.try_into().ok())
		.ok_or_else(|| Error::SerializationError("truncated key seed".to_string()))?;
	let rows = *bytes
		.get(SEED_SIZE)
		.ok_or_else(|| Error::SerializationError("truncated key".to_string()))? as usize;
	let mut offset = SEED_SIZE + 1;
	let mut c0 = Vec::with_capacity(rows);
	for _ in 0..rows {
		let (row, consumed) =
			read_poly(ctx, Representation::Evaluation, &bytes[offset..], 0)?;
		offset += consumed;
		c0.push(row);
	}
	let c1 = KeySwitchKey::expand_rows(context, &seed, rows)?;
	Ok((
		KeySwitchKey {
			c0,
			c1,
			seed,
		},
		offset,
	))
}

impl ToBytes for EvaluationKey {
	/// Pair of optional blocks: the Galois keys (element to key-switch
	/// key) and the relinearization key. Every key-switch key is carried
	/// in seeded form.
	fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut out = Vec::new();
		out.extend_from_slice(&(self.galois.len() as u16).to_le_bytes());
		for (element, key) in &self.galois {
			out.extend_from_slice(&element.to_le_bytes());
			write_key_switch_key(&mut out, &key.key);
		}
		out.push(self.relinearization.is_some() as u8);
		if let Some(relin) = &self.relinearization {
			write_key_switch_key(&mut out, &relin.key);
		}
		Ok(out)
	}
}

impl FromBytes for EvaluationKey {
	type State = Arc<Context>;

	fn from_bytes(state: &Self::State, bytes: &[u8]) -> Result<Self> {
		let count = u16::from_le_bytes(
			bytes
				.get(..2)
				.and_then(|b| b.try_into().ok())
				.ok_or_else(|| Error::SerializationError("truncated key".to_string()))?,
		) as usize;
		let mut offset = 2;
		let mut galois = BTreeMap::new();
		for _ in 0..count {
			let element = u64::from_le_bytes(
				bytes
					.get(offset..offset + 8)
					.and_then(|b| b.try_into().ok())
					.ok_or_else(|| Error::SerializationError("truncated element".to_string()))?,
			);
			offset += 8;
			let (key, consumed) = read_key_switch_key(state, &bytes[offset..])?;
			offset += consumed;
			galois.insert(
				element,
				GaloisKey {
					element,
					key,
				},
			);
		}
		let has_relin = *bytes
			.get(offset)
			.ok_or_else(|| Error::SerializationError("truncated key".to_string()))?
			== 1;
		offset += 1;
		let relinearization = if has_relin {
			let (key, _) = read_key_switch_key(state, &bytes[offset..])?;
			Some(RelinearizationKey {
				key,
			})
		} else {
			None
		};
		Ok(EvaluationKey {
			galois,
			relinearization,
		})
	}
}
