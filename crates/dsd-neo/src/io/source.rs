// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Baseband sources.
//!
//! Three input shapes feed the decoder:
//! - raw u8 IQ bytes from a tuner (through the DSP front-end),
//! - s16 mono PCM from a TCP socket, big- or little-endian,
//! - a captured symbol file of dibits in {0,1,2,3} at 4800 sym/s, which
//!   bypasses the DSP front-end and feeds the slicer interface directly.
//!
//! Socket reads are wrapped so closing the descriptor unblocks an in-flight
//! read; the capture thread re-checks the exit flag on every timeout.

use socket2::{Domain, Socket, Type};
use std::fs::File;
use std::io::{BufReader, Read};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

/// PCM byte order on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEndian {
    Little,
    Big,
}

/// One chunk read from a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceChunk {
    /// Raw u8 IQ bytes for the DSP front-end.
    IqBytes(Vec<u8>),
    /// Decoded s16 mono PCM samples.
    Pcm(Vec<i16>),
    /// Symbol-rate dibits, already sliced.
    Dibits(Vec<u8>),
    /// End of stream.
    Eof,
}

/// A pluggable baseband source.
pub enum BasebandSource {
    RawIq(Box<dyn Read + Send>),
    PcmSocket {
        stream: TcpStream,
        endian: PcmEndian,
    },
    /// Captured dibit file; one symbol per byte, values 0..3.
    DibitCapture(BufReader<File>),
}

impl BasebandSource {
    /// Open a dibit capture file.
    pub fn open_capture<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let f = File::open(path)?;
        Ok(BasebandSource::DibitCapture(BufReader::new(f)))
    }

    /// Connect a PCM socket with a read timeout so shutdown can interrupt.
    pub fn connect_pcm(addr: SocketAddr, endian: PcmEndian) -> crate::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
            .map_err(|e| crate::Error::SocketFailed(e.to_string()))?;
        socket
            .connect_timeout(&addr.into(), Duration::from_secs(5))
            .map_err(|e| crate::Error::SocketFailed(e.to_string()))?;
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(|e| crate::Error::SocketFailed(e.to_string()))?;
        Ok(BasebandSource::PcmSocket {
            stream: socket.into(),
            endian,
        })
    }

    /// Read the next chunk. Timeouts surface as empty chunks so the capture
    /// loop can re-check the exit flag.
    pub fn read_chunk(&mut self, max: usize) -> crate::Result<SourceChunk> {
        match self {
            BasebandSource::RawIq(reader) => {
                let mut buf = vec![0u8; max];
                let n = match reader.read(&mut buf) {
                    Ok(n) => n,
                    Err(e) if would_block(&e) => return Ok(SourceChunk::IqBytes(Vec::new())),
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    return Ok(SourceChunk::Eof);
                }
                buf.truncate(n);
                Ok(SourceChunk::IqBytes(buf))
            }
            BasebandSource::PcmSocket { stream, endian } => {
                let mut buf = vec![0u8; max & !1];
                let n = match stream.read(&mut buf) {
                    Ok(n) => n,
                    Err(e) if would_block(&e) => return Ok(SourceChunk::Pcm(Vec::new())),
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    return Ok(SourceChunk::Eof);
                }
                let pairs = n / 2;
                let mut pcm = Vec::with_capacity(pairs);
                for i in 0..pairs {
                    let pair = [buf[2 * i], buf[2 * i + 1]];
                    pcm.push(match endian {
                        PcmEndian::Little => i16::from_le_bytes(pair),
                        PcmEndian::Big => i16::from_be_bytes(pair),
                    });
                }
                Ok(SourceChunk::Pcm(pcm))
            }
            BasebandSource::DibitCapture(reader) => {
                let mut buf = vec![0u8; max];
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    return Ok(SourceChunk::Eof);
                }
                buf.truncate(n);
                // tolerate ASCII captures: '0'..'3' normalize to 0..3
                for b in buf.iter_mut() {
                    if (b'0'..=b'3').contains(b) {
                        *b -= b'0';
                    }
                    *b &= 3;
                }
                Ok(SourceChunk::Dibits(buf))
            }
        }
    }
}

fn would_block(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
