// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call export to third-party call-logging consumers.
//!
//! An exporter receives the finalized WAV path plus the closing event
//! record once the call file is rotated. The sidecar exporter writes a JSON
//! document next to the WAV for directory-watch consumers; upload-style
//! exporters hand the record to a caller-supplied sender and may complete
//! asynchronously.

use super::event::EventRecord;
use std::io::Write;
use std::path::Path;

/// Per-call export hook.
pub trait CallExporter: Send {
    /// Called after the WAV file is finalized on disk.
    ///
    /// # Errors
    /// Export failures are reported but never fatal; the decoder counts
    /// them and keeps running.
    fn export(&mut self, wav_path: &Path, record: &EventRecord) -> crate::Result<()>;
}

/// Writes `<wav>.json` next to the call WAV (directory-watch consumers).
pub struct SidecarJsonExporter;

fn json_escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => "\\\"".chars().collect::<Vec<_>>(),
            '\\' => "\\\\".chars().collect(),
            '\n' => "\\n".chars().collect(),
            c if (c as u32) < 0x20 => format!("\\u{:04x}", c as u32).chars().collect(),
            c => vec![c],
        })
        .collect()
}

impl CallExporter for SidecarJsonExporter {
    fn export(&mut self, wav_path: &Path, record: &EventRecord) -> crate::Result<()> {
        let sidecar = wav_path.with_extension("json");
        let mut f = std::fs::File::create(&sidecar)?;
        let annotations: Vec<String> = record
            .annotations
            .iter()
            .map(|a| format!("\"{}\"", json_escape(a)))
            .collect();
        writeln!(
            f,
            "{{\"time\":{},\"proto\":\"{}\",\"tgt\":{},\"src\":{},\"cc\":{},\"flags\":\"{}\",\"tx\":\"{}\",\"wav\":\"{}\",\"annotations\":[{}]}}",
            record.unix_time,
            record.proto,
            record.target,
            record.source,
            record.cc_freq,
            json_escape(&record.flags),
            json_escape(&record.tx),
            json_escape(&wav_path.display().to_string()),
            annotations.join(",")
        )?;
        Ok(())
    }
}

/// Hands finished records to a channel for asynchronous upload.
pub struct ChannelExporter {
    tx: crossbeam_channel::Sender<(std::path::PathBuf, EventRecord)>,
}

impl ChannelExporter {
    pub fn new(tx: crossbeam_channel::Sender<(std::path::PathBuf, EventRecord)>) -> Self {
        Self { tx }
    }
}

impl CallExporter for ChannelExporter {
    fn export(&mut self, wav_path: &Path, record: &EventRecord) -> crate::Result<()> {
        self.tx
            .try_send((wav_path.to_path_buf(), record.clone()))
            .map_err(|_| crate::Error::CacheFailed("export queue full".into()))
    }
}
