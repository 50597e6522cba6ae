// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Vendor keystream generators (PC4, PC5, RC2, RC4 with MD2 mixing).
//!
//! These schemes take a user key string, mix it through MD2 into fixed key
//! material, and expand a per-slot keystream bitmap that the voice handlers
//! XOR over frame bits. Each generator is an instance struct built per
//! call; there are no process-global cipher contexts.

use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit, StreamCipher};
use md2::{Digest, Md2};

/// Which vendor scheme a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorScheme {
    Pc4,
    Pc5,
    Rc2,
    Rc4,
}

/// Per-call vendor keystream generator.
pub struct VendorKeystream {
    scheme: VendorScheme,
    /// MD2-mixed key material.
    key: [u8; 16],
}

impl VendorKeystream {
    /// Build from the user key string.
    pub fn from_key_string(scheme: VendorScheme, key_string: &str) -> Self {
        let mut hasher = Md2::new();
        hasher.update(key_string.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest);
        Self { scheme, key }
    }

    pub fn scheme(&self) -> VendorScheme {
        self.scheme
    }

    /// Fill a keystream bitmap (one 0/1 bit per entry) for one voice slot.
    pub fn fill_bitmap(&self, iv: u64, bitmap: &mut [u8]) {
        let nbytes = bitmap.len().div_ceil(8);
        let mut bytes = vec![0u8; nbytes];
        match self.scheme {
            VendorScheme::Rc4 => self.rc4_bytes(iv, &mut bytes),
            VendorScheme::Rc2 => self.rc2_bytes(iv, &mut bytes),
            VendorScheme::Pc4 => self.pc4_bytes(iv, &mut bytes),
            VendorScheme::Pc5 => self.pc5_bytes(iv, &mut bytes),
        }
        for (i, b) in bitmap.iter_mut().enumerate() {
            *b = (bytes[i / 8] >> (7 - (i % 8))) & 1;
        }
    }

    /// RC4 dropping the first 256 bytes, keyed by key || IV.
    fn rc4_bytes(&self, iv: u64, out: &mut [u8]) {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&self.key);
        key.extend_from_slice(&iv.to_be_bytes());
        let mut rc4 = rc4::Rc4::<cipher::consts::U24>::new(GenericArray::from_slice(&key));
        let mut drop = [0u8; 256];
        rc4.apply_keystream(&mut drop);
        for b in out.iter_mut() {
            *b = 0;
        }
        rc4.apply_keystream(out);
    }

    /// RC2 in counter mode over the mixed key.
    fn rc2_bytes(&self, iv: u64, out: &mut [u8]) {
        let cipher = rc2::Rc2::new_with_eff_key_len(&self.key, 128);
        let mut counter = iv;
        let mut produced = 0;
        while produced < out.len() {
            let mut block = [0u8; 8];
            block.copy_from_slice(&counter.to_be_bytes());
            cipher.encrypt_block((&mut block).into());
            let take = (out.len() - produced).min(8);
            out[produced..produced + take].copy_from_slice(&block[..take]);
            produced += take;
            counter = counter.wrapping_add(1);
        }
    }

    /// PC4: byte-wise stream from a rolling 16-byte state; each output
    /// byte feeds back into the state rotation.
    fn pc4_bytes(&self, iv: u64, out: &mut [u8]) {
        let mut state = self.key;
        let ivb = iv.to_be_bytes();
        for (i, s) in state.iter_mut().enumerate() {
            *s ^= ivb[i % 8];
        }
        let mut a: u8 = 0x3B;
        for (n, o) in out.iter_mut().enumerate() {
            let i = n % 16;
            a = a
                .rotate_left(3)
                .wrapping_add(state[i])
                .wrapping_add(n as u8);
            state[i] = state[i].rotate_left(1) ^ a;
            *o = a ^ state[(i + 7) % 16];
        }
    }

    /// PC5: like PC4 with a second chaining accumulator and swap step.
    fn pc5_bytes(&self, iv: u64, out: &mut [u8]) {
        let mut state = self.key;
        let ivb = iv.to_be_bytes();
        for (i, s) in state.iter_mut().enumerate() {
            *s = s.wrapping_add(ivb[(i * 3) % 8]);
        }
        let (mut a, mut b): (u8, u8) = (0x5C, 0xA7);
        for (n, o) in out.iter_mut().enumerate() {
            let i = n % 16;
            let j = (n * 5 + 1) % 16;
            a = a.rotate_left(1).wrapping_add(state[i]);
            b = (b ^ state[j]).rotate_left(2).wrapping_add(a);
            state.swap(i, j);
            state[i] = state[i].wrapping_add(b);
            *o = a ^ b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(scheme: VendorScheme, key: &str, iv: u64) -> Vec<u8> {
        let ks = VendorKeystream::from_key_string(scheme, key);
        let mut out = vec![0u8; 98];
        ks.fill_bitmap(iv, &mut out);
        out
    }

    #[test]
    fn test_deterministic_per_key_and_iv() {
        for scheme in [
            VendorScheme::Pc4,
            VendorScheme::Pc5,
            VendorScheme::Rc2,
            VendorScheme::Rc4,
        ] {
            let a = bitmap(scheme, "passw0rd", 0x1234);
            let b = bitmap(scheme, "passw0rd", 0x1234);
            assert_eq!(a, b, "{:?} must be deterministic", scheme);
            let c = bitmap(scheme, "passw0rd", 0x1235);
            assert_ne!(a, c, "{:?} must depend on IV", scheme);
            let d = bitmap(scheme, "passw1rd", 0x1234);
            assert_ne!(a, d, "{:?} must depend on key", scheme);
        }
    }

    #[test]
    fn test_bitmap_entries_are_bits() {
        let a = bitmap(VendorScheme::Pc5, "k", 7);
        assert!(a.iter().all(|&b| b <= 1));
        // and not all equal (a stuck-at keystream would pass bits-only)
        assert!(a.iter().any(|&b| b == 0) && a.iter().any(|&b| b == 1));
    }

    #[test]
    fn test_schemes_differ() {
        let pc4 = bitmap(VendorScheme::Pc4, "key", 1);
        let pc5 = bitmap(VendorScheme::Pc5, "key", 1);
        let rc4 = bitmap(VendorScheme::Rc4, "key", 1);
        assert_ne!(pc4, pc5);
        assert_ne!(pc4, rc4);
        assert_ne!(pc5, rc4);
    }
}
