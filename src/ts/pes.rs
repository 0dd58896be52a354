//! PES packet header parsing (ISO/IEC 13818-1 §2.4.3.7).
//!
//! Read-oriented: unlike the teacher's write-oriented `PESHeader` (used for
//! muxing), this dissects every optional field an elementary-stream PES
//! header can carry, grounded on the original reference implementation's
//! `processPESPacketHeader`/`readTimeStamp` bit-packing.

use crate::error::{AnalyzerError, Result};
use crate::ts::types::PTS_HZ;

/// Stream IDs that carry no PES header extension at all. Per §4.10, the
/// `PES_packet_length` bytes that follow are skipped outright rather than
/// treated as elementary-stream payload.
fn has_no_header_extension(stream_id: u8) -> bool {
    matches!(
        stream_id,
        0xbc // program_stream_map
            | 0xbe // padding_stream
            | 0xbf // private_stream_2
            | 0xf0 // ECM
            | 0xf1 // EMM
            | 0xff // program_stream_directory
            | 0xf2 // DSMCC
            | 0xf8 // H.222.1 type E
    )
}

/// One of the five DSM trick-mode variants (ISO/IEC 13818-1 Table 2-19).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrickMode {
    /// `control == 000`: fast forward.
    FastForward {
        /// Field identifier (2 bits).
        field_id: u8,
        /// Intra-slice refresh flag.
        intra_slice_refresh: bool,
        /// Frequency truncation (2 bits).
        frequency_truncation: u8,
    },
    /// `control == 001`: slow motion.
    SlowMotion {
        /// Repetition control (5 bits).
        rep_cntrl: u8,
    },
    /// `control == 010`: freeze frame.
    FreezeFrame {
        /// Field identifier (2 bits).
        field_id: u8,
    },
    /// `control == 011`: fast reverse.
    FastReverse {
        /// Field identifier (2 bits).
        field_id: u8,
        /// Intra-slice refresh flag.
        intra_slice_refresh: bool,
        /// Frequency truncation (2 bits).
        frequency_truncation: u8,
    },
    /// `control == 100`: slow reverse.
    SlowReverse {
        /// Repetition control (5 bits).
        rep_cntrl: u8,
    },
}

/// Decoded PES header fields that precede the elementary-stream payload.
#[derive(Debug, Clone, Default)]
pub struct PesHeader {
    /// `stream_id` byte.
    pub stream_id: u8,
    /// `PES_packet_length`; `0` means "unbounded" (permitted for video).
    pub pes_packet_length: u16,
    /// Presentation Time Stamp, 90 kHz ticks.
    pub pts: Option<u64>,
    /// Decoding Time Stamp, 90 kHz ticks.
    pub dts: Option<u64>,
    /// Elementary Stream Clock Reference, 42-bit base*300+ext value.
    pub escr: Option<u64>,
    /// 22-bit ES rate field (in units of 50 bytes/second).
    pub es_rate: Option<u32>,
    /// DSM trick-mode field, if present.
    pub trick_mode: Option<TrickMode>,
    /// True if `additional_copy_info` was present.
    pub additional_copy_info: Option<u8>,
    /// 16-bit previous-packet CRC (not verified).
    pub pes_crc: Option<u16>,
    /// Private data carried in the PES extension, if present (16 bytes).
    pub pes_private_data: Option<[u8; 16]>,
}

/// Parses a PES header beginning at `buf[0]` with `packet_start_code_prefix
/// == 0x000001`. Returns the decoded header and the number of bytes
/// consumed, i.e. where the elementary-stream payload begins.
pub fn parse_pes_header(buf: &[u8]) -> Result<(PesHeader, usize)> {
    if buf.len() < 6 {
        return Err(AnalyzerError::InvalidData("PES header truncated".into()));
    }
    let prefix = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32;
    if prefix != 0x0000_01 {
        return Err(AnalyzerError::InvalidData(format!(
            "bad PES start code prefix 0x{prefix:06x}"
        )));
    }

    let stream_id = buf[3];
    let pes_packet_length = ((buf[4] as u16) << 8) | buf[5] as u16;
    let mut header = PesHeader {
        stream_id,
        pes_packet_length,
        ..Default::default()
    };

    if has_no_header_extension(stream_id) {
        let consumed = 6 + (pes_packet_length as usize).min(buf.len() - 6);
        return Ok((header, consumed));
    }

    if buf.len() < 9 {
        return Err(AnalyzerError::InvalidData(
            "PES optional header truncated".into(),
        ));
    }

    let flags1 = buf[6];
    let flags2 = buf[7];
    let pes_header_data_length = buf[8] as usize;
    let header_end = 9 + pes_header_data_length;
    if buf.len() < header_end {
        return Err(AnalyzerError::InvalidData(
            "PES_header_data_length exceeds buffer".into(),
        ));
    }

    let pts_dts_flags = (flags2 >> 6) & 0x03;
    let escr_flag = (flags2 & 0x20) != 0;
    let es_rate_flag = (flags2 & 0x10) != 0;
    let dsm_trick_mode_flag = (flags2 & 0x08) != 0;
    let additional_copy_info_flag = (flags2 & 0x04) != 0;
    let pes_crc_flag = (flags2 & 0x02) != 0;
    let pes_extension_flag = (flags2 & 0x01) != 0;
    let _ = flags1; // PES_scrambling_control / priority / alignment / copyright / original bits, not used by this core

    let mut pos = 9;

    match pts_dts_flags {
        0b10 => {
            let pts = read_timestamp(&buf[pos..pos + 5])?;
            header.pts = Some(pts);
            header.dts = Some(pts);
            pos += 5;
        }
        0b11 => {
            let pts = read_timestamp(&buf[pos..pos + 5])?;
            pos += 5;
            let dts = read_timestamp(&buf[pos..pos + 5])?;
            pos += 5;
            header.pts = Some(pts);
            header.dts = Some(dts);
        }
        _ => {}
    }

    if escr_flag {
        if buf.len() < pos + 6 {
            return Err(AnalyzerError::InvalidData("ESCR field truncated".into()));
        }
        header.escr = Some(read_escr(&buf[pos..pos + 6]));
        pos += 6;
    }

    if es_rate_flag {
        if buf.len() < pos + 3 {
            return Err(AnalyzerError::InvalidData("ES_rate field truncated".into()));
        }
        let raw = ((buf[pos] as u32) << 16) | ((buf[pos + 1] as u32) << 8) | buf[pos + 2] as u32;
        header.es_rate = Some((raw >> 1) & 0x3f_ffff);
        pos += 3;
    }

    if dsm_trick_mode_flag {
        if buf.len() < pos + 1 {
            return Err(AnalyzerError::InvalidData(
                "DSM trick mode field truncated".into(),
            ));
        }
        header.trick_mode = Some(decode_trick_mode(buf[pos]));
        pos += 1;
    }

    if additional_copy_info_flag {
        if buf.len() < pos + 1 {
            return Err(AnalyzerError::InvalidData(
                "additional_copy_info truncated".into(),
            ));
        }
        header.additional_copy_info = Some(buf[pos] & 0x7f);
        pos += 1;
    }

    if pes_crc_flag {
        if buf.len() < pos + 2 {
            return Err(AnalyzerError::InvalidData("PES_CRC truncated".into()));
        }
        header.pes_crc = Some(((buf[pos] as u16) << 8) | buf[pos + 1] as u16);
        pos += 2;
    }

    if pes_extension_flag {
        pos = parse_pes_extension(buf, pos, header_end, &mut header)?;
    }

    log::trace!(
        "PES header stream_id={:#x} pts={:?} dts={:?} escr={:?}",
        stream_id,
        header.pts,
        header.dts,
        header.escr
    );

    Ok((header, header_end))
}

fn parse_pes_extension(
    buf: &[u8],
    mut pos: usize,
    header_end: usize,
    header: &mut PesHeader,
) -> Result<usize> {
    if buf.len() <= pos {
        return Err(AnalyzerError::InvalidData(
            "PES_extension flag byte truncated".into(),
        ));
    }
    let ext_flags = buf[pos];
    pos += 1;
    let private_data_flag = (ext_flags & 0x80) != 0;
    let pack_header_field_flag = (ext_flags & 0x40) != 0;
    let program_packet_sequence_counter_flag = (ext_flags & 0x20) != 0;
    let p_std_buffer_flag = (ext_flags & 0x10) != 0;
    let pes_extension_flag_2 = (ext_flags & 0x01) != 0;

    if private_data_flag {
        if buf.len() < pos + 16 {
            return Err(AnalyzerError::InvalidData(
                "PES_private_data truncated".into(),
            ));
        }
        let mut data = [0u8; 16];
        data.copy_from_slice(&buf[pos..pos + 16]);
        header.pes_private_data = Some(data);
        pos += 16;
    }

    if pack_header_field_flag {
        if buf.len() <= pos {
            return Err(AnalyzerError::InvalidData(
                "pack_field_length truncated".into(),
            ));
        }
        let pack_field_length = buf[pos] as usize;
        pos += 1 + pack_field_length;
    }

    if program_packet_sequence_counter_flag {
        pos += 2;
    }

    if p_std_buffer_flag {
        pos += 2;
    }

    if pes_extension_flag_2 {
        if buf.len() <= pos {
            return Err(AnalyzerError::InvalidData(
                "PES_extension_field_length truncated".into(),
            ));
        }
        let field_length = (buf[pos] & 0x7f) as usize;
        pos += 1 + field_length;
    }

    if pos > header_end {
        return Err(AnalyzerError::InvalidData(
            "PES extension overran PES_header_data_length".into(),
        ));
    }
    Ok(pos)
}

/// Decodes a 33-bit PTS/DTS timestamp from its 5-byte packed form: bits
/// 32..30 in the top 3 bits of byte 0, bits 29..15 across byte 1 and the
/// top 7 bits of byte 2, bits 14..0 across byte 3 and the top 7 bits of
/// byte 4; a marker bit sits in the low bit of bytes 0, 2, and 4.
fn read_timestamp(bytes: &[u8]) -> Result<u64> {
    if bytes.len() < 5 {
        return Err(AnalyzerError::InvalidData("timestamp truncated".into()));
    }
    let b0 = bytes[0] as u64;
    let b1 = bytes[1] as u64;
    let b2 = bytes[2] as u64;
    let b3 = bytes[3] as u64;
    let b4 = bytes[4] as u64;

    let value = ((b0 & 0x0e) << 29)
        | ((b1 & 0xff) << 22)
        | ((b2 & 0xfe) << 14)
        | ((b3 & 0xff) << 7)
        | ((b4 & 0xfe) >> 1);
    Ok(value)
}

/// Decodes the 42-bit ESCR (6-byte base*300+extension packing, identical
/// marker-bit layout to PCR/PTS but with an extra 9-bit extension).
fn read_escr(bytes: &[u8]) -> u64 {
    let b0 = bytes[0] as u64;
    let b1 = bytes[1] as u64;
    let b2 = bytes[2] as u64;
    let b3 = bytes[3] as u64;
    let b4 = bytes[4] as u64;
    let b5 = bytes[5] as u64;

    let base = (((b0 >> 3) & 0x07) << 30)
        | ((b0 & 0x03) << 28)
        | (b1 << 20)
        | (((b2 >> 3) & 0x1f) << 15)
        | ((b2 & 0x03) << 13)
        | (b3 << 5)
        | ((b4 >> 3) & 0x1f);
    let ext = ((b4 & 0x03) << 7) | (b5 >> 1);
    base * 300 + ext
}

fn decode_trick_mode(byte: u8) -> TrickMode {
    let control = (byte >> 5) & 0x07;
    let low5 = byte & 0x1f;
    match control {
        0 => TrickMode::FastForward {
            field_id: (low5 >> 3) & 0x03,
            intra_slice_refresh: (low5 & 0x04) != 0,
            frequency_truncation: low5 & 0x03,
        },
        1 => TrickMode::SlowMotion { rep_cntrl: low5 },
        2 => TrickMode::FreezeFrame {
            field_id: (low5 >> 3) & 0x03,
        },
        3 => TrickMode::FastReverse {
            field_id: (low5 >> 3) & 0x03,
            intra_slice_refresh: (low5 & 0x04) != 0,
            frequency_truncation: low5 & 0x03,
        },
        _ => TrickMode::SlowReverse { rep_cntrl: low5 },
    }
}

/// Converts a 90 kHz PTS/DTS tick count to seconds.
pub fn ticks_to_seconds(ticks: u64) -> f64 {
    ticks as f64 / PTS_HZ as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_timestamp(prefix4: u8, value: u64) -> [u8; 5] {
        let b0 = (prefix4 << 4) | (((value >> 30) & 0x07) as u8) << 1 | 1;
        let b1 = ((value >> 22) & 0xff) as u8;
        let b2 = (((value >> 15) & 0x7f) as u8) << 1 | 1;
        let b3 = ((value >> 7) & 0xff) as u8;
        let b4 = (((value) & 0x7f) as u8) << 1 | 1;
        [b0, b1, b2, b3, b4]
    }

    #[test]
    fn timestamp_round_trips_33_bits() {
        let value: u64 = 0x1_2345_6789 & 0x1_ffff_ffff;
        let bytes = encode_timestamp(0b0010, value);
        assert_eq!(read_timestamp(&bytes).unwrap(), value);
    }

    #[test]
    fn parses_pts_only_header() {
        let mut buf = vec![0x00, 0x00, 0x01, 0xe0, 0x00, 0x00];
        buf.push(0x80); // flags1
        buf.push(0x80); // flags2: PTS only
        buf.push(0x05); // pes_header_data_length
        buf.extend_from_slice(&encode_timestamp(0b0010, 1000));
        let (header, used) = parse_pes_header(&buf).unwrap();
        assert_eq!(header.pts, Some(1000));
        assert_eq!(header.dts, Some(1000));
        assert_eq!(used, buf.len());
    }

    #[test]
    fn stream_with_no_extension_stops_after_six_bytes() {
        let buf = [0x00, 0x00, 0x01, 0xbc, 0x00, 0x10];
        let (header, used) = parse_pes_header(&buf).unwrap();
        assert_eq!(used, 6);
        assert_eq!(header.pts, None);
    }

    #[test]
    fn bad_start_code_is_an_error() {
        let buf = [0x00, 0x00, 0x02, 0xe0, 0x00, 0x00];
        assert!(parse_pes_header(&buf).is_err());
    }

    #[test]
    fn ticks_convert_to_seconds_at_90khz() {
        assert!((ticks_to_seconds(90_000) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn escr_decodes_base_and_extension() {
        // base=1, extension=0: smallest nonzero ESCR value.
        let bytes = [0x00, 0x00, 0x00, 0x00, 0b0000_1100, 0b0000_0001];
        let escr = read_escr(&bytes);
        assert_eq!(escr, 300);
    }
}
