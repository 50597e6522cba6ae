// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoder runtime: the demod loop and thread lifecycle.
//!
//! Thread set:
//! - **capture**: fills the SPSC input ring from the baseband source
//! - **demod**: owns state and options, runs DSP -> slicer -> sync ->
//!   dispatch, drains UI commands once per batch, ticks the trunking SM
//! - **audio**: pops jitter rings, applies gain, mixes, writes the backend
//!
//! All threads exit cooperatively on the process-wide exit flag; blocking
//! waits wake on their timeout and re-check it.

pub mod demod;

pub use demod::{Decoder, DecoderHooks};

use crate::audio::{mix_stereo, Agc};
use crate::config::FRAME_SAMPLES;
use crate::io::{BasebandSource, InputRing};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Audio backend abstraction.
pub trait AudioSink: Send {
    fn write(&mut self, pcm: &[i16]);
}

/// Spawn the capture thread: source chunks into the input ring.
///
/// Dibit captures are pushed as raw dibit bytes; the demod side knows the
/// source shape and interprets accordingly.
pub fn spawn_capture(
    mut source: BasebandSource,
    ring: Arc<InputRing>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("dsd-capture".into())
        .spawn(move || {
            while !crate::exit_requested() {
                match source.read_chunk(4096) {
                    Ok(crate::io::source::SourceChunk::Eof) => break,
                    Ok(crate::io::source::SourceChunk::IqBytes(b)) if !b.is_empty() => {
                        ring.push(&b);
                    }
                    Ok(crate::io::source::SourceChunk::Dibits(d)) if !d.is_empty() => {
                        ring.push(&d);
                    }
                    Ok(crate::io::source::SourceChunk::Pcm(p)) if !p.is_empty() => {
                        let mut bytes = Vec::with_capacity(p.len() * 2);
                        for s in p {
                            bytes.extend_from_slice(&s.to_le_bytes());
                        }
                        ring.push(&bytes);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        crate::error!("capture read failed: {}", e);
                        break;
                    }
                }
            }
        })
        .expect("spawn capture thread")
}

/// Spawn the audio thread: drain jitter rings through gain into the sink.
///
/// The demod thread hands frames over via a bounded channel of per-slot
/// frame pairs so the audio thread never touches decoder state.
pub fn spawn_audio(
    rx: crossbeam_channel::Receiver<([f32; FRAME_SAMPLES], [f32; FRAME_SAMPLES])>,
    mut sink: Box<dyn AudioSink>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("dsd-audio".into())
        .spawn(move || {
            let mut agc = Agc::default();
            let mut pcm = Vec::new();
            while !crate::exit_requested() {
                match rx.recv_timeout(std::time::Duration::from_millis(10)) {
                    Ok((mut left, mut right)) => {
                        agc.process(&mut left);
                        agc.process(&mut right);
                        mix_stereo(&left, &right, &mut pcm);
                        sink.write(&pcm);
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("spawn audio thread")
}

/// Bridges decoded audio out of the demod thread: pops the per-slot jitter
/// rings, hands frame pairs to the audio thread, and keeps the per-call WAV
/// recording plus exporter notification in step with the event stream.
pub struct AudioPump {
    tx: crossbeam_channel::Sender<([f32; FRAME_SAMPLES], [f32; FRAME_SAMPLES])>,
    recorder: Option<crate::audio::CallWavWriter>,
    exporter: Option<Box<dyn crate::telemetry::CallExporter>>,
    /// A call file is open.
    recording: bool,
    /// Event counts already reconciled per slot.
    seen_events: [usize; 2],
}

impl AudioPump {
    pub fn new(
        tx: crossbeam_channel::Sender<([f32; FRAME_SAMPLES], [f32; FRAME_SAMPLES])>,
        recorder: Option<crate::audio::CallWavWriter>,
        exporter: Option<Box<dyn crate::telemetry::CallExporter>>,
    ) -> Self {
        Self {
            tx,
            recorder,
            exporter,
            recording: false,
            seen_events: [0; 2],
        }
    }

    /// Drain the decoder's jitter rings once; call after each batch.
    ///
    /// Frames rescued by a P25 release flush go out first so the tail of a
    /// just-released call plays before anything newer.
    pub fn pump(&mut self, decoder: &mut demod::Decoder) {
        let mut left = [0.0f32; FRAME_SAMPLES];
        let mut right = [0.0f32; FRAME_SAMPLES];
        for (slot, frame) in decoder.take_flushed_audio() {
            let (l, r) = if slot == 0 {
                (frame, [0.0; FRAME_SAMPLES])
            } else {
                ([0.0; FRAME_SAMPLES], frame)
            };
            if let Some(rec) = self.recorder.as_mut() {
                if self.recording {
                    let pcm: Vec<i16> = l.iter().map(|&v| v as i16).collect();
                    let _ = rec.write(&pcm);
                }
            }
            let _ = self.tx.try_send((l, r));
        }
        loop {
            let got_l = decoder.state.slots[0].jitter.pop(&mut left);
            let got_r = decoder.state.slots[1].jitter.pop(&mut right);
            if !got_l && !got_r {
                break;
            }
            if let Some(rec) = self.recorder.as_mut() {
                if !self.recording {
                    let s = &decoder.state.slots[0];
                    let stamp = crate::telemetry::event::format_timestamp(
                        crate::telemetry::event::now_unix(),
                    )
                    .replace([' ', ':', '-'], "");
                    if rec.open_call(s.tg, s.src, &stamp).is_ok() {
                        self.recording = true;
                    }
                }
                let pcm: Vec<i16> = left.iter().map(|&v| v as i16).collect();
                let _ = rec.write(&pcm);
            }
            let _ = self.tx.try_send((left, right));
        }
        self.reconcile_events(decoder);
    }

    /// Close the call file and notify the exporter on TX END records.
    fn reconcile_events(&mut self, decoder: &mut demod::Decoder) {
        for slot in 0..2 {
            let events = decoder.state.events[slot].items();
            for rec in events.iter().skip(self.seen_events[slot]) {
                if rec.tx == "TX END" && self.recording {
                    if let Some(w) = self.recorder.as_mut() {
                        if let Ok(Some(path)) = w.finish() {
                            if let Some(e) = self.exporter.as_mut() {
                                if let Err(err) = e.export(&path, rec) {
                                    crate::warn!("call export failed: {}", err);
                                }
                            }
                        }
                    }
                    self.recording = false;
                }
            }
            self.seen_events[slot] = events.len();
        }
    }
}
