//! Elementary-stream codec parsers.
//!
//! Two codecs are dissected: MPEG-2 video (`mpeg2`) and H.264/AVC (`avc`).
//! [`ParsedUnit`] is a tagged union over the two, following the teacher's
//! `CodecType`-style enum-over-trait-object idiom rather than dynamic
//! dispatch, since the set of supported codecs is closed and known at
//! compile time. [`parse_one_unit`] is the single entry point the demuxer
//! walks a video PID's accumulated payload through, selecting the codec via
//! [`CodecKind`] once at PMT-parse time.

pub mod avc;
pub mod mpeg2;

use crate::error::Result;

/// Which elementary-stream codec a PID's payload should be parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// ISO/IEC 13818-2 MPEG-2 video.
    Mpeg2Video,
    /// ISO/IEC 14496-10 H.264/AVC.
    H264,
}

/// One decoded unit from either elementary-stream codec, tagged by which
/// codec produced it.
#[derive(Debug, Clone)]
pub enum ParsedUnit {
    /// A unit from the MPEG-2 video start-code state machine.
    Mpeg2(mpeg2::VideoUnit),
    /// A NAL unit from the AVC parser.
    Avc(avc::NalUnit),
}

/// Parses one unit from the front of `buf`, dispatching to the codec named
/// by `kind`. Returns the parsed unit and the number of bytes consumed.
pub fn parse_one_unit(kind: CodecKind, buf: &[u8]) -> Result<(ParsedUnit, usize)> {
    match kind {
        CodecKind::Mpeg2Video => {
            let (unit, consumed) = mpeg2::parse_one_unit(buf)?;
            Ok((ParsedUnit::Mpeg2(unit), consumed))
        }
        CodecKind::H264 => {
            let (unit, consumed) = avc::parse_one_nal_unit(buf)?;
            Ok((ParsedUnit::Avc(unit), consumed))
        }
    }
}
