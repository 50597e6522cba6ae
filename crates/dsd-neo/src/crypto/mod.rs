// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keystream generation for the vendor privacy and encryption schemes.
//!
//! Block primitives come from the RustCrypto crates (`aes`, `des`, `rc2`,
//! `rc4`, `md2`); this module adds the cipher-mode wrappers the air
//! interfaces actually use, the protocol scrambler LFSRs, the vendor
//! keystream generators, and the straight-XOR configuration parser.
//!
//! Crypto context lives per call: handlers construct a [`Keystream`] (or a
//! vendor generator) from the key material when a call starts and drop it
//! at call end. Nothing here is global.

pub mod lfsr;
pub mod modes;
pub mod straight;
pub mod vendor;

pub use lfsr::{DmrLfsr, P25p2Scrambler};
pub use modes::{CipherKind, Keystream, KeystreamMode};
pub use straight::StraightXor;
pub use vendor::{VendorKeystream, VendorScheme};
