// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime plumbing: input ring, command queue, baseband sources and the
//! capability hooks that decouple the core from any particular backend.

pub mod command;
pub mod hooks;
pub mod ring;
pub mod source;

pub use command::{CommandQueue, UiCommand};
pub use hooks::{MetricsHook, NullTuner, TelemetrySink, TunerHook, Vocoder};
pub use ring::InputRing;
pub use source::BasebandSource;
