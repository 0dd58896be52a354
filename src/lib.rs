#![doc(html_root_url = "https://docs.rs/mpts-probe/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # mpts-probe
//!
//! A streaming MPEG-2 Transport Stream (MPTS) analyzer core: it consumes a
//! sequence of fixed-size TS packets and emits a single, well-formed XML
//! document describing every signalling table (PAT, PMT, descriptors),
//! every elementary-stream PES header, and — when enabled — every coded
//! video frame found in the MPEG-2 video or H.264/AVC elementary streams
//! carried inside.
//!
//! ## What this core does
//!
//! - Detects 188- vs. 192-byte packet framing and routes PIDs through a
//!   PAT/PMT state machine (`ts::parser`, `ts::descriptors`).
//! - Reassembles PES packets from many TS packets into a contiguous
//!   elementary-stream buffer and dissects their headers, including
//!   timestamps, ESCR, and trick-mode fields (`ts::pes`).
//! - Parses MPEG-2 video start codes and H.264/AVC NAL units, including
//!   Exp-Golomb-coded syntax elements, into per-frame records (`codec`).
//!
//! ## What this core does not do
//!
//! File I/O, command-line parsing, and XML escaping are left to callers;
//! the core consumes byte slices and a caller-supplied `std::io::Write`
//! sink. Audio elementary streams are classified but not decoded, and the
//! SCTE-35 splice-information grammar is detected (by stream type) but not
//! parsed.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mpts_probe::{Config, Demuxer};
//! use std::io::{self, Read};
//!
//! # fn main() -> mpts_probe::error::Result<()> {
//! let mut file = std::fs::File::open("capture.ts").unwrap();
//! let mut header = [0u8; 5];
//! file.read_exact(&mut header).unwrap();
//!
//! let mut demux = Demuxer::new(io::stdout(), Config::current());
//! let packet_size = demux.analyze_file_header(&header)? as usize;
//!
//! let mut packet = vec![0u8; packet_size];
//! packet[..5].copy_from_slice(&header);
//! file.read_exact(&mut packet[5..]).unwrap();
//! let mut seq = 0u32;
//! loop {
//!     demux.process_packet(&packet, seq)?;
//!     seq += 1;
//!     if file.read_exact(&mut packet).is_err() {
//!         break;
//!     }
//! }
//! demux.flush()?;
//! # Ok(())
//! # }
//! ```

/// Big-endian, most-significant-bit-first bit-stream reader and Exp-Golomb
/// decoding shared by both codec parsers.
pub mod bitstream;
/// Elementary-stream codec parsers: MPEG-2 video and H.264/AVC.
pub mod codec;
/// Process-wide configuration.
pub mod config;
/// The synchronous demultiplexer core: PID routing, PSI state, and XML
/// emission.
pub mod demux;
/// Error types and the crate's `Result` alias.
pub mod error;
/// Monotonic file-offset counter and big-endian byte helpers.
pub mod position;
/// Per-frame output records assembled by the demuxer.
pub mod record;
/// MPEG-2 Transport Stream layer: packet framing, PSI tables, descriptors,
/// PES headers, and elementary accumulation.
pub mod ts;
/// Minimal indented XML emitter.
pub mod xml;

pub use config::Config;
pub use demux::Demuxer;
pub use error::{AnalyzerError, Result};
