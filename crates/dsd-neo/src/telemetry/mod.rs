// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event records, history snapshots and telemetry side channels.
//!
//! # Modules
//! - `event`: canonical event record and its text form
//! - `history`: per-slot ring with whole-copy snapshot publishing
//! - `export`: pluggable per-call exporters (sidecar JSON, upload)
//! - `lrrp`: LRRP/GPS token parser
//! - `watchdog`: per-slot activity timers
//! - `callsign`: P25 WACN/SYSID to FCC callsign (Radix-50)

pub mod callsign;
pub mod event;
pub mod export;
pub mod history;
pub mod lrrp;
pub mod watchdog;

pub use callsign::format_wacn_sysid;
pub use event::EventRecord;
pub use export::{CallExporter, SidecarJsonExporter};
pub use history::{EventHistory, SnapshotHub, StateSnapshot};
pub use lrrp::{LrrpReport, parse_lrrp_udp};
pub use watchdog::Watchdog;
