// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cipher mode wrappers over the RustCrypto block primitives.
//!
//! The air interfaces only ever need keystream (OFB/CTR/CFB) or raw block
//! operations (ECB/CBC for key-fill style payloads), so the wrappers are
//! small and allocation-free on the hot path. OFB keystream is the block
//! cipher iterated on a running IV, independent of plaintext; the two CTR
//! flavors differ in how the running counter is framed (byte-aligned
//! increment vs bit-framed blocks that discard the leading keystream bit).

use aes::{Aes128, Aes192, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use des::{Des, TdesEde3};

/// Cipher selection for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128,
    Aes192,
    Aes256,
    Des,
    TripleDes,
}

impl CipherKind {
    /// Expected key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128 => 16,
            CipherKind::Aes192 => 24,
            CipherKind::Aes256 => 32,
            CipherKind::Des => 8,
            CipherKind::TripleDes => 24,
        }
    }

    pub fn block_len(self) -> usize {
        match self {
            CipherKind::Des | CipherKind::TripleDes => 8,
            _ => 16,
        }
    }
}

/// Keystream generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystreamMode {
    Ecb,
    Cbc,
    Cfb,
    CtrByte,
    CtrBit,
    Ofb,
}

enum Inner {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
    Des(Des),
    Tdes(TdesEde3),
}

/// Per-call keystream context.
pub struct Keystream {
    inner: Inner,
    kind: CipherKind,
}

macro_rules! with_cipher {
    ($self:expr, $c:ident, $body:expr) => {
        match &$self.inner {
            Inner::Aes128($c) => $body,
            Inner::Aes192($c) => $body,
            Inner::Aes256($c) => $body,
            Inner::Des($c) => $body,
            Inner::Tdes($c) => $body,
        }
    };
}

impl Keystream {
    /// Build a context from key bytes.
    ///
    /// # Errors
    /// [`crate::Error::InvalidOption`] on a wrong key length.
    pub fn new(kind: CipherKind, key: &[u8]) -> crate::Result<Self> {
        if key.len() != kind.key_len() {
            return Err(crate::Error::InvalidOption(
                "key".into(),
                format!("{} bytes (want {})", key.len(), kind.key_len()),
            ));
        }
        let inner = match kind {
            CipherKind::Aes128 => Inner::Aes128(Aes128::new_from_slice(key).expect("len checked")),
            CipherKind::Aes192 => Inner::Aes192(Aes192::new_from_slice(key).expect("len checked")),
            CipherKind::Aes256 => Inner::Aes256(Aes256::new_from_slice(key).expect("len checked")),
            CipherKind::Des => Inner::Des(Des::new_from_slice(key).expect("len checked")),
            CipherKind::TripleDes => {
                Inner::Tdes(TdesEde3::new_from_slice(key).expect("len checked"))
            }
        };
        Ok(Self { inner, kind })
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    fn encrypt_block_slice(&self, block: &mut [u8]) {
        with_cipher!(self, c, {
            c.encrypt_block(GenericArray::from_mut_slice(block));
        });
    }

    fn decrypt_block_slice(&self, block: &mut [u8]) {
        with_cipher!(self, c, {
            c.decrypt_block(GenericArray::from_mut_slice(block));
        });
    }

    /// ECB encrypt whole blocks in place (trailing partial block untouched).
    pub fn ecb_encrypt(&self, data: &mut [u8]) {
        let bl = self.kind.block_len();
        for chunk in data.chunks_exact_mut(bl) {
            self.encrypt_block_slice(chunk);
        }
    }

    /// ECB decrypt whole blocks in place.
    pub fn ecb_decrypt(&self, data: &mut [u8]) {
        let bl = self.kind.block_len();
        for chunk in data.chunks_exact_mut(bl) {
            self.decrypt_block_slice(chunk);
        }
    }

    /// CBC encrypt in place with the given IV.
    pub fn cbc_encrypt(&self, iv: &[u8], data: &mut [u8]) {
        let bl = self.kind.block_len();
        let mut prev = iv[..bl].to_vec();
        for chunk in data.chunks_exact_mut(bl) {
            for (c, p) in chunk.iter_mut().zip(prev.iter()) {
                *c ^= p;
            }
            self.encrypt_block_slice(chunk);
            prev.copy_from_slice(chunk);
        }
    }

    /// CBC decrypt in place with the given IV.
    pub fn cbc_decrypt(&self, iv: &[u8], data: &mut [u8]) {
        let bl = self.kind.block_len();
        let mut prev = iv[..bl].to_vec();
        for chunk in data.chunks_exact_mut(bl) {
            let cipher_copy = chunk.to_vec();
            self.decrypt_block_slice(chunk);
            for (c, p) in chunk.iter_mut().zip(prev.iter()) {
                *c ^= p;
            }
            prev.copy_from_slice(&cipher_copy);
        }
    }

    /// Fill `out` with mode keystream derived from `iv`.
    ///
    /// ECB/CBC are block modes, not keystream generators; asking them for
    /// keystream yields the encrypted-IV stream (equivalent to OFB) so a
    /// misconfigured call still fails closed instead of emitting plaintext.
    pub fn keystream(&self, mode: KeystreamMode, iv: &[u8], out: &mut [u8]) {
        match mode {
            KeystreamMode::Ofb | KeystreamMode::Ecb | KeystreamMode::Cbc => {
                self.ofb_keystream(iv, out)
            }
            KeystreamMode::Cfb => self.ofb_keystream(iv, out), // no ciphertext feedback available pre-decode
            KeystreamMode::CtrByte => self.ctr_keystream(iv, out, false),
            KeystreamMode::CtrBit => self.ctr_keystream(iv, out, true),
        }
    }

    /// OFB: keystream blocks are the cipher iterated on a running IV.
    pub fn ofb_keystream(&self, iv: &[u8], out: &mut [u8]) {
        let bl = self.kind.block_len();
        let mut reg = vec![0u8; bl];
        let n = iv.len().min(bl);
        reg[..n].copy_from_slice(&iv[..n]);
        let mut produced = 0;
        while produced < out.len() {
            self.encrypt_block_slice(&mut reg);
            let take = (out.len() - produced).min(bl);
            out[produced..produced + take].copy_from_slice(&reg[..take]);
            produced += take;
        }
    }

    /// CTR: big-endian counter in the IV block, incremented per block.
    /// The bit-framed variant discards the first keystream bit of every
    /// block, shifting the remainder up.
    fn ctr_keystream(&self, iv: &[u8], out: &mut [u8], bit_framed: bool) {
        let bl = self.kind.block_len();
        let mut counter = vec![0u8; bl];
        let n = iv.len().min(bl);
        counter[..n].copy_from_slice(&iv[..n]);
        let mut produced = 0;
        while produced < out.len() {
            let mut block = counter.clone();
            self.encrypt_block_slice(&mut block);
            if bit_framed {
                shift_left_one_bit(&mut block);
            }
            let take = (out.len() - produced).min(bl);
            out[produced..produced + take].copy_from_slice(&block[..take]);
            produced += take;
            increment_be(&mut counter);
        }
    }
}

fn increment_be(counter: &mut [u8]) {
    for b in counter.iter_mut().rev() {
        let (v, carry) = b.overflowing_add(1);
        *b = v;
        if !carry {
            break;
        }
    }
}

fn shift_left_one_bit(block: &mut [u8]) {
    let mut carry = 0u8;
    for b in block.iter_mut().rev() {
        let new_carry = *b >> 7;
        *b = (*b << 1) | carry;
        carry = new_carry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecb_roundtrip_all_kinds() {
        for kind in [
            CipherKind::Aes128,
            CipherKind::Aes192,
            CipherKind::Aes256,
            CipherKind::Des,
            CipherKind::TripleDes,
        ] {
            let key: Vec<u8> = (0..kind.key_len() as u8).collect();
            let ks = Keystream::new(kind, &key).expect("key");
            let mut data: Vec<u8> = (0..(kind.block_len() * 2) as u8).collect();
            let orig = data.clone();
            ks.ecb_encrypt(&mut data);
            assert_ne!(data, orig);
            ks.ecb_decrypt(&mut data);
            assert_eq!(data, orig);
        }
    }

    #[test]
    fn test_cbc_roundtrip_and_chaining() {
        let key = [7u8; 16];
        let ks = Keystream::new(CipherKind::Aes128, &key).expect("key");
        let iv = [9u8; 16];
        let mut data = vec![0u8; 32]; // two identical plaintext blocks
        ks.cbc_encrypt(&iv, &mut data);
        assert_ne!(&data[..16], &data[16..], "chaining must differ blocks");
        ks.cbc_decrypt(&iv, &mut data);
        assert_eq!(data, vec![0u8; 32]);
    }

    #[test]
    fn test_ofb_keystream_plaintext_independent() {
        let key = [1u8; 16];
        let ks = Keystream::new(CipherKind::Aes128, &key).expect("key");
        let iv = [2u8; 16];
        let mut a = vec![0u8; 40];
        let mut b = vec![0u8; 40];
        ks.ofb_keystream(&iv, &mut a);
        ks.ofb_keystream(&iv, &mut b);
        assert_eq!(a, b, "OFB depends only on key and IV");
        // first block equals E(iv)
        let mut block = iv.to_vec();
        ks.ecb_encrypt(&mut block);
        assert_eq!(&a[..16], &block[..]);
    }

    #[test]
    fn test_ctr_byte_blocks_differ() {
        let key = [3u8; 8];
        let ks = Keystream::new(CipherKind::Des, &key).expect("key");
        let iv = [0u8; 8];
        let mut out = vec![0u8; 24];
        ks.keystream(KeystreamMode::CtrByte, &iv, &mut out);
        assert_ne!(&out[..8], &out[8..16]);
        assert_ne!(&out[8..16], &out[16..24]);
    }

    #[test]
    fn test_ctr_bit_framing_differs_from_byte() {
        let key = [3u8; 8];
        let ks = Keystream::new(CipherKind::Des, &key).expect("key");
        let iv = [5u8; 8];
        let mut byte_ks = vec![0u8; 16];
        let mut bit_ks = vec![0u8; 16];
        ks.keystream(KeystreamMode::CtrByte, &iv, &mut byte_ks);
        ks.keystream(KeystreamMode::CtrBit, &iv, &mut bit_ks);
        assert_ne!(byte_ks, bit_ks);
    }

    #[test]
    fn test_bad_key_length_rejected() {
        assert!(Keystream::new(CipherKind::Aes256, &[0u8; 16]).is_err());
    }
}
