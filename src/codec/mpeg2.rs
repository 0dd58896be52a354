//! MPEG-2 video elementary-stream start-code parser.
//!
//! No teacher module covers this codec; the state machine and bit layouts
//! are grounded directly on the original reference implementation's
//! `mpeg2_parser.cpp` (`processSequenceHeader`, `processSequenceExtension`,
//! `processGroupOfPicturesHeader`, `processPictureHeader`,
//! `processPictureCodingExtension`), built in the same `BitReader` idiom
//! used by `codec::avc`.

use crate::bitstream::BitReader;
use crate::error::{AnalyzerError, Result};
use crate::position::find_next_start_code;

/// Start codes this parser dispatches on (ISO/IEC 13818-2 Annex B).
pub mod start_code {
    /// `picture_start_code`.
    pub const PICTURE: u8 = 0x00;
    /// First slice start code; slices occupy `0x01..=0xAF`.
    pub const SLICE_MIN: u8 = 0x01;
    /// Last slice start code.
    pub const SLICE_MAX: u8 = 0xaf;
    /// `user_data_start_code`.
    pub const USER_DATA: u8 = 0xb2;
    /// `sequence_header_code`.
    pub const SEQUENCE_HEADER: u8 = 0xb3;
    /// `sequence_error_code`.
    pub const SEQUENCE_ERROR: u8 = 0xb4;
    /// `extension_start_code`.
    pub const EXTENSION: u8 = 0xb5;
    /// `sequence_end_code`.
    pub const SEQUENCE_END: u8 = 0xb7;
    /// `group_start_code`.
    pub const GROUP_OF_PICTURES: u8 = 0xb8;
}

/// `extension_start_code_identifier` values (Table 6-2).
mod extension_id {
    pub const SEQUENCE: u8 = 1;
    pub const SEQUENCE_DISPLAY: u8 = 2;
    pub const SEQUENCE_SCALABLE: u8 = 5;
    pub const PICTURE_CODING: u8 = 8;
}

/// Picture coding type (Table 6-12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureCodingType {
    /// Intra-coded.
    I,
    /// Predictive-coded.
    P,
    /// Bidirectionally predictive-coded.
    B,
    /// DC intra-coded (rarely used, MPEG-1 only).
    D,
}

impl PictureCodingType {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            1 => Ok(PictureCodingType::I),
            2 => Ok(PictureCodingType::P),
            3 => Ok(PictureCodingType::B),
            4 => Ok(PictureCodingType::D),
            other => Err(AnalyzerError::InvalidData(format!(
                "invalid picture_coding_type {other}"
            ))),
        }
    }
}

/// Decoded `sequence_header`.
#[derive(Debug, Clone)]
pub struct SequenceHeader {
    /// Width in pixels, from `horizontal_size_value`.
    pub horizontal_size: u32,
    /// Height in pixels, from `vertical_size_value`.
    pub vertical_size: u32,
    /// `aspect_ratio_information` (4 bits).
    pub aspect_ratio_information: u8,
    /// `frame_rate_code` (4 bits).
    pub frame_rate_code: u8,
    /// `bit_rate_value` (18 bits) in units of 400 bit/s.
    pub bit_rate_value: u32,
    /// `vbv_buffer_size_value` (10 bits).
    pub vbv_buffer_size_value: u16,
}

/// Decoded `sequence_extension`, widening the base header's size fields.
#[derive(Debug, Clone)]
pub struct SequenceExtension {
    /// `profile_and_level_indication`.
    pub profile_and_level_indication: u8,
    /// `progressive_sequence`.
    pub progressive_sequence: bool,
    /// `chroma_format` (2 bits).
    pub chroma_format: u8,
    /// Extra high-order size bits to OR into the base header's dimensions.
    pub horizontal_size_extension: u8,
    /// Extra high-order size bits to OR into the base header's dimensions.
    pub vertical_size_extension: u8,
}

/// Decoded `group_of_pictures_header`.
#[derive(Debug, Clone, Copy)]
pub struct GroupOfPictures {
    /// True when no picture in this GOP references pictures before it
    /// (`closed_gop` flag).
    pub closed_gop: bool,
    /// `broken_link` flag.
    pub broken_link: bool,
}

/// Decoded `picture_header`.
#[derive(Debug, Clone, Copy)]
pub struct PictureHeader {
    /// `temporal_reference` (10 bits).
    pub temporal_reference: u16,
    /// `picture_coding_type`.
    pub picture_coding_type: PictureCodingType,
    /// `vbv_delay` (16 bits).
    pub vbv_delay: u16,
}

/// Decoded `picture_coding_extension` fields this parser reports.
#[derive(Debug, Clone, Copy)]
pub struct PictureCodingExtension {
    /// `top_field_first`.
    pub top_field_first: bool,
    /// `repeat_first_field`.
    pub repeat_first_field: bool,
    /// `progressive_frame`.
    pub progressive_frame: bool,
}

/// One parsed start-code unit from the elementary stream.
#[derive(Debug, Clone)]
pub enum VideoUnit {
    /// `sequence_header_code`.
    SequenceHeader(SequenceHeader),
    /// `extension_start_code` with `sequence` identifier.
    SequenceExtension(SequenceExtension),
    /// `group_start_code`.
    GroupOfPictures(GroupOfPictures),
    /// `picture_start_code`.
    Picture(PictureHeader),
    /// `extension_start_code` with `picture coding` identifier.
    PictureCodingExtension(PictureCodingExtension),
    /// A slice (`0x01..=0xAF`); only its start-code value is reported.
    Slice(u8),
    /// Any other recognized start code whose body this parser does not
    /// interpret (`user_data`, `sequence_display_extension`,
    /// `sequence_scalable_extension`, and similar).
    Other(u8),
}

/// Parses one start-code-delimited unit from `buf`, which must begin with
/// the 3-byte prefix `00 00 01` followed by the start-code byte. Returns
/// the parsed unit and the number of bytes consumed up to (not including)
/// the next start code, or the end of `buf` if none follows.
pub fn parse_one_unit(buf: &[u8]) -> Result<(VideoUnit, usize)> {
    if buf.len() < 4 || buf[0] != 0x00 || buf[1] != 0x00 || buf[2] != 0x01 {
        return Err(AnalyzerError::InvalidData(
            "video unit missing 00 00 01 start code".into(),
        ));
    }
    let start_code = buf[3];
    let rest = &buf[4..];
    let body_len = find_next_start_code(rest).unwrap_or(rest.len());
    let body = &rest[..body_len];
    let consumed = 4 + body_len;

    let unit = match start_code {
        start_code::SEQUENCE_HEADER => VideoUnit::SequenceHeader(parse_sequence_header(body)?),
        start_code::GROUP_OF_PICTURES => VideoUnit::GroupOfPictures(parse_gop_header(body)?),
        start_code::PICTURE => VideoUnit::Picture(parse_picture_header(body)?),
        start_code::EXTENSION => parse_extension(body)?,
        start_code::SLICE_MIN..=start_code::SLICE_MAX => VideoUnit::Slice(start_code),
        other => VideoUnit::Other(other),
    };

    log::trace!("video start_code={start_code:#04x} bytes={}", body.len());
    Ok((unit, consumed))
}

fn parse_sequence_header(body: &[u8]) -> Result<SequenceHeader> {
    let mut reader = BitReader::new(body);
    let horizontal_size = reader.read_bits(12);
    let vertical_size = reader.read_bits(12);
    let aspect_ratio_information = reader.read_bits(4) as u8;
    let frame_rate_code = reader.read_bits(4) as u8;
    let bit_rate_value = reader.read_bits(18);
    reader.read_flag(); // marker_bit
    let vbv_buffer_size_value = reader.read_bits(10) as u16;
    Ok(SequenceHeader {
        horizontal_size,
        vertical_size,
        aspect_ratio_information,
        frame_rate_code,
        bit_rate_value,
        vbv_buffer_size_value,
    })
}

fn parse_extension(body: &[u8]) -> Result<VideoUnit> {
    if body.is_empty() {
        return Err(AnalyzerError::InvalidData("empty extension body".into()));
    }
    let mut reader = BitReader::new(body);
    let identifier = reader.read_bits(4) as u8;
    match identifier {
        extension_id::SEQUENCE => Ok(VideoUnit::SequenceExtension(parse_sequence_extension(
            &mut reader,
        ))),
        extension_id::PICTURE_CODING => Ok(VideoUnit::PictureCodingExtension(
            parse_picture_coding_extension(&mut reader),
        )),
        extension_id::SEQUENCE_DISPLAY | extension_id::SEQUENCE_SCALABLE => {
            Ok(VideoUnit::Other(start_code::EXTENSION))
        }
        _ => Ok(VideoUnit::Other(start_code::EXTENSION)),
    }
}

fn parse_sequence_extension(reader: &mut BitReader) -> SequenceExtension {
    let profile_and_level_indication = reader.read_bits(8) as u8;
    let progressive_sequence = reader.read_flag();
    let chroma_format = reader.read_bits(2) as u8;
    let horizontal_size_extension = reader.read_bits(2) as u8;
    let vertical_size_extension = reader.read_bits(2) as u8;
    SequenceExtension {
        profile_and_level_indication,
        progressive_sequence,
        chroma_format,
        horizontal_size_extension,
        vertical_size_extension,
    }
}

fn parse_gop_header(body: &[u8]) -> Result<GroupOfPictures> {
    let mut reader = BitReader::new(body);
    reader.skip_bits(25); // time_code
    let closed_gop = reader.read_flag();
    let broken_link = reader.read_flag();
    Ok(GroupOfPictures {
        closed_gop,
        broken_link,
    })
}

fn parse_picture_header(body: &[u8]) -> Result<PictureHeader> {
    let mut reader = BitReader::new(body);
    let temporal_reference = reader.read_bits(10) as u16;
    let picture_coding_type = PictureCodingType::from_bits(reader.read_bits(3))?;
    let vbv_delay = reader.read_bits(16) as u16;
    Ok(PictureHeader {
        temporal_reference,
        picture_coding_type,
        vbv_delay,
    })
}

fn parse_picture_coding_extension(reader: &mut BitReader) -> PictureCodingExtension {
    reader.skip_bits(4); // f_code[0][0]
    reader.skip_bits(4); // f_code[0][1]
    reader.skip_bits(4); // f_code[1][0]
    reader.skip_bits(4); // f_code[1][1]
    reader.skip_bits(2); // intra_dc_precision
    reader.skip_bits(2); // picture_structure
    let top_field_first = reader.read_flag();
    reader.read_flag(); // frame_pred_frame_dct
    reader.read_flag(); // concealment_motion_vectors
    reader.read_flag(); // q_scale_type
    reader.read_flag(); // intra_vlc_format
    reader.read_flag(); // alternate_scan
    let repeat_first_field = reader.read_flag();
    reader.read_flag(); // chroma_420_type
    let progressive_frame = reader.read_flag();
    PictureCodingExtension {
        top_field_first,
        repeat_first_field,
        progressive_frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequence_header_dimensions() {
        let mut buf = vec![0x00, 0x00, 0x01, start_code::SEQUENCE_HEADER];
        // horizontal_size=1920(12) vertical_size=1080(12) aspect=1(4)
        // frame_rate_code=4(4) bit_rate_value=0x3ffff(18) marker(1)
        // vbv_buffer_size_value=0(10)
        let bits: u64 = (1920u64 << (64 - 12))
            | (1080u64 << (64 - 24))
            | (1u64 << (64 - 28))
            | (4u64 << (64 - 32))
            | (0x3ffffu64 << (64 - 50))
            | (1u64 << (64 - 51));
        buf.extend_from_slice(&bits.to_be_bytes());
        let (unit, _) = parse_one_unit(&buf).unwrap();
        match unit {
            VideoUnit::SequenceHeader(sh) => {
                assert_eq!(sh.horizontal_size, 1920);
                assert_eq!(sh.vertical_size, 1080);
                assert_eq!(sh.frame_rate_code, 4);
            }
            other => panic!("unexpected unit: {other:?}"),
        }
    }

    #[test]
    fn parses_picture_header_coding_type() {
        let mut buf = vec![0x00, 0x00, 0x01, start_code::PICTURE];
        // temporal_reference=5(10) picture_coding_type=1/I(3) vbv_delay=0xffff(16)
        let bits: u32 = (5u32 << 22) | (1u32 << 19) | 0xffff << 3;
        buf.extend_from_slice(&bits.to_be_bytes()[..4]);
        let (unit, _) = parse_one_unit(&buf).unwrap();
        match unit {
            VideoUnit::Picture(ph) => {
                assert_eq!(ph.temporal_reference, 5);
                assert_eq!(ph.picture_coding_type, PictureCodingType::I);
            }
            other => panic!("unexpected unit: {other:?}"),
        }
    }

    #[test]
    fn parses_closed_gop_flag() {
        let mut buf = vec![0x00, 0x00, 0x01, start_code::GROUP_OF_PICTURES];
        // time_code (25 bits of 0) closed_gop=1 broken_link=0
        let bits: u32 = 1u32 << 6; // bit 25 (0-indexed from MSB of 32) set
        buf.extend_from_slice(&bits.to_be_bytes());
        let (unit, _) = parse_one_unit(&buf).unwrap();
        match unit {
            VideoUnit::GroupOfPictures(gop) => assert!(gop.closed_gop),
            other => panic!("unexpected unit: {other:?}"),
        }
    }

    #[test]
    fn recognizes_slice_start_codes() {
        let buf = [0x00, 0x00, 0x01, 0x05];
        let (unit, consumed) = parse_one_unit(&buf).unwrap();
        assert_eq!(consumed, 4);
        assert!(matches!(unit, VideoUnit::Slice(0x05)));
    }

    #[test]
    fn rejects_missing_start_code() {
        let buf = [0x00, 0x00, 0x02, 0xb3];
        assert!(parse_one_unit(&buf).is_err());
    }
}
