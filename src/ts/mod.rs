//! MPEG-2 Transport Stream layer: packet framing, PSI (PAT/PMT) tables,
//! descriptors, PES headers, and per-PID elementary accumulation.

/// Per-PID elementary-stream accumulation buffers.
pub mod accumulator;
/// 34-tag MPEG-system descriptor dispatch.
pub mod descriptors;
/// Packet-size (188 vs. 192 byte) detection.
pub mod framing;
/// TS packet header, adaptation field, and PAT/PMT section parsing.
pub mod parser;
/// PES packet header parsing.
pub mod pes;
/// Core data types: PAT, PMT, descriptors, adaptation field, TS header.
pub mod types;

pub use types::*;
