//! # Error Types
//!
//! This module provides the error types used throughout the analyzer core.
//! It defines a central error type `AnalyzerError` that encapsulates every
//! failure mode the core can produce, matching the taxonomy described in
//! the error handling design: framing errors and bad in-stream start codes
//! are recoverable and never reach this type (they are logged and surfaced
//! as XML diagnostics instead); only format-detection failure and malformed
//! PSI sections propagate as `Err`.
//!
//! ## Example Usage
//!
//! ```rust
//! use mpts_probe::error::{AnalyzerError, Result};
//!
//! fn check_packet_size(first_five: &[u8]) -> Result<u16> {
//!     if first_five[0] == 0x47 {
//!         Ok(188)
//!     } else if first_five.len() == 5 && first_five[4] == 0x47 {
//!         Ok(192)
//!     } else {
//!         Err(AnalyzerError::FormatDetection)
//!     }
//! }
//! ```

use std::num::ParseIntError;
use thiserror::Error;

/// Primary error type for the analyzer core.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// I/O errors bubbled up from the caller-supplied sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A PSI section's declared length would read past the bytes available
    /// in the current TS packet (truncated PAT/PMT, or a section spanning
    /// more than one packet, which this core does not reassemble).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Neither byte 0 nor byte 4 of the first five input bytes is `0x47`;
    /// the packet size (188 vs. 192) cannot be determined.
    #[error("could not determine transport stream packet size")]
    FormatDetection,

    /// Errors that occur while parsing integers out of configuration
    /// sources (environment variables, the optional settings file).
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// A specialized `Result` type for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalyzerError>;
