//! H.264/AVC Annex-B NAL unit parser.
//!
//! Grounded on the teacher's `codec/h264/parser.rs` (state holder shape,
//! `remove_emulation_prevention`, SPS field list) extended with AUD / SEI /
//! slice-header dissection from the original reference implementation's
//! `avc_parser.cpp` (`process_access_unit_delimiter`, `process_sei_message`,
//! `process_recovery_point_sei`, `process_slice_header`, `EGParse`).

use crate::bitstream::BitReader;
use crate::error::{AnalyzerError, Result};
use crate::position::{find_next_nalu_start_code, read_u32};

/// NAL unit types this parser dispatches on (Rec. ITU-T H.264 Table 7-1).
pub mod nal_unit_type {
    /// Coded slice of a non-IDR picture.
    pub const CODED_SLICE_NON_IDR: u8 = 1;
    /// Supplemental Enhancement Information.
    pub const SEI: u8 = 6;
    /// Sequence Parameter Set.
    pub const SPS: u8 = 7;
    /// Picture Parameter Set.
    pub const PPS: u8 = 8;
    /// Access Unit Delimiter.
    pub const AUD: u8 = 9;
    /// Coded slice of an IDR picture.
    pub const CODED_SLICE_IDR: u8 = 5;
    /// Coded slice extension (3 extra header bytes follow).
    pub const CODED_SLICE_EXTENSION: u8 = 20;
    /// Prefix NAL unit (3 extra header bytes follow).
    pub const PREFIX_NAL_UNIT: u8 = 14;
    /// Coded slice of an auxiliary coded picture without partitioning.
    pub const CODED_SLICE_AUX: u8 = 19;
}

/// Picture/slice coding type, collapsing SP→P and SI→I per the simplified
/// mapping this core uses (Table 7-6, `slice_type % 5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    /// Predicted picture.
    P,
    /// Bi-predicted picture.
    B,
    /// Intra-coded picture.
    I,
}

impl PictureType {
    fn from_slice_type(slice_type: u32) -> Self {
        match slice_type % 5 {
            0 | 3 => PictureType::P,
            1 => PictureType::B,
            _ => PictureType::I,
        }
    }
}

/// Decoded Access Unit Delimiter.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnitDelimiter {
    /// `primary_pic_type`, top 3 bits of the single payload byte.
    pub primary_pic_type: u8,
}

/// Decoded slice header fields (first_mb_in_slice and slice_type only; the
/// parser stops here to match the per-PUSI framing of the accumulator).
#[derive(Debug, Clone)]
pub struct SliceHeader {
    /// `first_mb_in_slice` (`ue(v)`).
    pub first_mb_in_slice: u32,
    /// Raw `slice_type` value (0-9).
    pub slice_type: u32,
    /// `slice_type` collapsed to I/P/B.
    pub picture_type: PictureType,
}

/// A decoded recovery-point SEI payload (`payload_type == 6`).
#[derive(Debug, Clone)]
pub struct RecoveryPoint {
    /// `recovery_frame_cnt` (`ue(v)`).
    pub recovery_frame_cnt: u32,
    /// True if every macroblock is correctly decoded at the recovery point.
    pub exact_match_flag: bool,
    /// True if there is no reliance on reference pictures before an
    /// unrecognized broken link.
    pub broken_link_flag: bool,
    /// 2-bit changing slice group indicator.
    pub changing_slice_group_idc: u8,
}

/// A decoded SEI message.
#[derive(Debug, Clone)]
pub struct SeiMessage {
    /// `payload_type`, accumulated from a run of `0xFF` bytes.
    pub payload_type: u32,
    /// `payload_size` in bytes, accumulated the same way.
    pub payload_size: u32,
    /// Decoded recovery-point fields, only present for `payload_type == 6`.
    pub recovery_point: Option<RecoveryPoint>,
}

/// High-profile `profile_idc` values that carry the extra chroma/bit-depth
/// SPS fields (ISO/IEC 14496-10 §7.3.2.1.1).
const HIGH_PROFILE_IDCS: [u8; 10] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138];

/// Decoded Sequence Parameter Set fields.
#[derive(Debug, Clone)]
pub struct SequenceParameterSet {
    /// `profile_idc`.
    pub profile_idc: u8,
    /// `level_idc`.
    pub level_idc: u8,
    /// `seq_parameter_set_id` (`ue(v)`, range `[0, 31]`).
    pub seq_parameter_set_id: u32,
    /// `pic_order_cnt_type`.
    pub pic_order_cnt_type: u32,
    /// `log2_max_pic_order_cnt_lsb_minus4`, present only when
    /// `pic_order_cnt_type == 0`.
    pub log2_max_pic_order_cnt_lsb_minus4: Option<u32>,
    /// Frame width in luma samples, derived from
    /// `pic_width_in_mbs_minus1`.
    pub width: u32,
    /// Frame height in luma samples, derived from
    /// `pic_height_in_map_units_minus1` and `frame_mbs_only_flag`.
    pub height: u32,
    /// `frame_cropping_flag`.
    pub frame_cropping_flag: bool,
    /// `(left, right, top, bottom)` crop offsets, present only when
    /// `frame_cropping_flag` is set.
    pub frame_crop_offsets: Option<(u32, u32, u32, u32)>,
    /// `vui_parameters_present_flag`.
    pub vui_parameters_present_flag: bool,
}

/// One decoded NAL unit plus whatever syntax structure its type implies.
#[derive(Debug, Clone)]
pub enum NalPayload {
    /// `nal_unit_type == 9`.
    Aud(AccessUnitDelimiter),
    /// `nal_unit_type == 7`.
    Sps(SequenceParameterSet),
    /// `nal_unit_type == 8`; currently length-skipped (see `DESIGN.md`).
    Pps,
    /// `nal_unit_type == 6`.
    Sei(Vec<SeiMessage>),
    /// `nal_unit_type` 1, 5, or 19: a coded slice.
    Slice {
        /// Decoded slice header.
        header: SliceHeader,
        /// True when this NAL carried an IDR (`nal_unit_type == 5`); the
        /// outer frame record's `closed_gop` flag is set from this, not
        /// from `slice_type`.
        is_idr: bool,
    },
    /// Any other NAL type; only the type is reported.
    Other {
        /// `nal_unit_type` of the unreported NAL unit.
        nal_unit_type: u8,
    },
}

/// A parsed NAL unit: reference indicator, type, and the dispatched
/// payload.
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// `nal_ref_idc`.
    pub nal_ref_idc: u8,
    /// `nal_unit_type`.
    pub nal_unit_type: u8,
    /// The decoded syntax structure for this NAL type.
    pub payload: NalPayload,
}

/// Removes `0x03` emulation-prevention bytes that follow two `0x00` bytes,
/// producing the RBSP from Annex-B-framed data.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zero_run = 0u8;
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if zero_run >= 2 && byte == 0x03 {
            zero_run = 0;
            i += 1;
            continue;
        }
        out.push(byte);
        zero_run = if byte == 0x00 { zero_run + 1 } else { 0 };
        i += 1;
    }
    out
}

/// Parses one NAL unit from `buf`, which must begin with a 4-byte start
/// code. If the start code is exactly `0x00000001` this is Annex-B
/// framing and the unit runs to the next start code (or end of buffer);
/// otherwise the 4 bytes are treated as a length prefix, mirroring the
/// reference implementation's fallback for non-standard input.
///
/// Returns the parsed unit and the number of bytes of `buf` consumed.
pub fn parse_one_nal_unit(buf: &[u8]) -> Result<(NalUnit, usize)> {
    if buf.len() < 5 {
        return Err(AnalyzerError::InvalidData("NAL unit truncated".into()));
    }

    let (payload_buf, consumed) = if buf[0] == 0x00 && buf[1] == 0x00 && buf[2] == 0x00 && buf[3] == 0x01 {
        let rest = &buf[4..];
        match find_next_nalu_start_code(rest) {
            Some(next) => (&rest[..next], 4 + next),
            None => (rest, buf.len()),
        }
    } else {
        let length = read_u32(&buf[0..4]) as usize;
        if buf.len() < 4 + length {
            return Err(AnalyzerError::InvalidData(
                "NAL length prefix exceeds buffer".into(),
            ));
        }
        (&buf[4..4 + length], 4 + length)
    };

    if payload_buf.is_empty() {
        return Err(AnalyzerError::InvalidData("empty NAL unit".into()));
    }

    let header = payload_buf[0];
    let nal_ref_idc = (header >> 5) & 0x03;
    let nal_unit_type = header & 0x1f;

    let mut rbsp_start = 1;
    if matches!(
        nal_unit_type,
        nal_unit_type::PREFIX_NAL_UNIT | nal_unit_type::CODED_SLICE_EXTENSION
    ) {
        rbsp_start += 3;
    }
    if payload_buf.len() < rbsp_start {
        return Err(AnalyzerError::InvalidData(
            "NAL unit shorter than its extension header".into(),
        ));
    }

    let rbsp = remove_emulation_prevention(&payload_buf[rbsp_start..]);
    let payload = match nal_unit_type {
        nal_unit_type::AUD => NalPayload::Aud(parse_aud(&rbsp)?),
        nal_unit_type::SPS => NalPayload::Sps(parse_sps(&rbsp)?),
        nal_unit_type::PPS => NalPayload::Pps,
        nal_unit_type::SEI => NalPayload::Sei(parse_sei(&rbsp)),
        nal_unit_type::CODED_SLICE_IDR
        | nal_unit_type::CODED_SLICE_NON_IDR
        | nal_unit_type::CODED_SLICE_AUX => NalPayload::Slice {
            header: parse_slice_header(&rbsp)?,
            is_idr: nal_unit_type == nal_unit_type::CODED_SLICE_IDR,
        },
        other => NalPayload::Other { nal_unit_type: other },
    };

    log::trace!(
        "NAL unit type={nal_unit_type} ref_idc={nal_ref_idc} bytes={}",
        payload_buf.len()
    );

    Ok((
        NalUnit {
            nal_ref_idc,
            nal_unit_type,
            payload,
        },
        consumed,
    ))
}

fn parse_aud(rbsp: &[u8]) -> Result<AccessUnitDelimiter> {
    if rbsp.is_empty() {
        return Err(AnalyzerError::InvalidData("AUD payload empty".into()));
    }
    Ok(AccessUnitDelimiter {
        primary_pic_type: (rbsp[0] >> 5) & 0x07,
    })
}

fn parse_slice_header(rbsp: &[u8]) -> Result<SliceHeader> {
    let mut reader = BitReader::new(rbsp);
    let first_mb_in_slice = reader.read_golomb();
    let slice_type = reader.read_golomb();
    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        picture_type: PictureType::from_slice_type(slice_type),
    })
}

fn parse_sei(rbsp: &[u8]) -> Vec<SeiMessage> {
    let mut messages = Vec::new();
    let mut pos = 0usize;
    while pos < rbsp.len() && rbsp[pos] != 0x80 {
        let (payload_type, consumed) = read_ff_run(rbsp, pos);
        pos += consumed;
        if pos >= rbsp.len() {
            break;
        }
        let (payload_size, consumed) = read_ff_run(rbsp, pos);
        pos += consumed;

        let payload_end = (pos + payload_size as usize).min(rbsp.len());
        let payload = &rbsp[pos..payload_end];
        let recovery_point = if payload_type == 6 {
            parse_recovery_point(payload)
        } else {
            None
        };

        messages.push(SeiMessage {
            payload_type,
            payload_size,
            recovery_point,
        });
        pos = payload_end;
    }
    messages
}

/// Reads a run of `0xFF` bytes (each worth 255) terminated by a non-`0xFF`
/// byte (added to the total), per the SEI `payload_type`/`payload_size`
/// encoding. Returns the accumulated value and the number of bytes read.
fn read_ff_run(data: &[u8], start: usize) -> (u32, usize) {
    let mut total = 0u32;
    let mut i = start;
    while i < data.len() && data[i] == 0xff {
        total += 255;
        i += 1;
    }
    if i < data.len() {
        total += data[i] as u32;
        i += 1;
    }
    (total, i - start)
}

fn parse_recovery_point(payload: &[u8]) -> Option<RecoveryPoint> {
    if payload.is_empty() {
        return None;
    }
    let mut reader = BitReader::new(payload);
    let recovery_frame_cnt = reader.read_golomb();
    if !reader.has_more_data() {
        return None;
    }
    let exact_match_flag = reader.read_flag();
    let broken_link_flag = reader.read_flag();
    let changing_slice_group_idc = reader.read_bits(2) as u8;
    Some(RecoveryPoint {
        recovery_frame_cnt,
        exact_match_flag,
        broken_link_flag,
        changing_slice_group_idc,
    })
}

fn parse_sps(rbsp: &[u8]) -> Result<SequenceParameterSet> {
    let mut reader = BitReader::new(rbsp);

    let profile_idc = reader.read_bits(8) as u8;
    reader.skip_bits(8); // 6 constraint_set flags + 2 reserved bits
    let level_idc = reader.read_bits(8) as u8;
    let seq_parameter_set_id = reader.read_golomb();

    if HIGH_PROFILE_IDCS.contains(&profile_idc) {
        let chroma_format_idc = reader.read_golomb();
        if chroma_format_idc == 3 {
            reader.read_flag(); // separate_colour_plane_flag
        }
        reader.read_golomb(); // bit_depth_luma_minus8
        reader.read_golomb(); // bit_depth_chroma_minus8
        reader.read_flag(); // qpprime_y_zero_transform_bypass_flag

        if reader.read_flag() {
            // seq_scaling_matrix_present_flag
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if reader.read_flag() {
                    let size = if i < 6 { 16 } else { 64 };
                    skip_scaling_list(&mut reader, size);
                }
            }
        }
    }

    reader.read_golomb(); // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_golomb();
    let mut log2_max_pic_order_cnt_lsb_minus4 = None;
    if pic_order_cnt_type == 0 {
        log2_max_pic_order_cnt_lsb_minus4 = Some(reader.read_golomb());
    } else if pic_order_cnt_type == 1 {
        reader.read_flag(); // delta_pic_order_always_zero_flag
        reader.read_signed_golomb(); // offset_for_non_ref_pic
        reader.read_signed_golomb(); // offset_for_top_to_bottom_field
        let num_ref_frames_in_pic_order_cnt_cycle = reader.read_golomb();
        for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
            reader.read_signed_golomb();
        }
    }

    reader.read_golomb(); // max_num_ref_frames
    reader.read_flag(); // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = reader.read_golomb();
    let pic_height_in_map_units_minus1 = reader.read_golomb();
    let frame_mbs_only_flag = reader.read_flag();
    if !frame_mbs_only_flag {
        reader.read_flag(); // mb_adaptive_frame_field_flag
    }
    reader.read_flag(); // direct_8x8_inference_flag

    let frame_cropping_flag = reader.read_flag();
    let frame_crop_offsets = if frame_cropping_flag {
        Some((
            reader.read_golomb(),
            reader.read_golomb(),
            reader.read_golomb(),
            reader.read_golomb(),
        ))
    } else {
        None
    };

    let vui_parameters_present_flag = reader.read_flag();

    let width = (pic_width_in_mbs_minus1 + 1) * 16;
    let height_in_map_units = (pic_height_in_map_units_minus1 + 1) * 16;
    let height = if frame_mbs_only_flag {
        height_in_map_units
    } else {
        2 * height_in_map_units
    };

    Ok(SequenceParameterSet {
        profile_idc,
        level_idc,
        seq_parameter_set_id,
        pic_order_cnt_type,
        log2_max_pic_order_cnt_lsb_minus4,
        width,
        height,
        frame_cropping_flag,
        frame_crop_offsets,
        vui_parameters_present_flag,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb();
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sps_nal(profile_idc: u8) -> Vec<u8> {
        // profile_idc(8) constraint+reserved(8) level_idc(8)
        // seq_parameter_set_id=0 (ue: '1')
        // log2_max_frame_num_minus4=0 (ue: '1')
        // pic_order_cnt_type=0 (ue: '1')
        // log2_max_pic_order_cnt_lsb_minus4=0 (ue: '1')
        // max_num_ref_frames=0 (ue: '1')
        // gaps_in_frame_num_value_allowed_flag=0
        // pic_width_in_mbs_minus1=10 (ue)
        // pic_height_in_map_units_minus1=8 (ue)
        // frame_mbs_only_flag=1
        // direct_8x8_inference_flag=1
        // frame_cropping_flag=0
        // vui_parameters_present_flag=0
        let mut bytes = vec![profile_idc, 0x00, 0x28];
        let mut bits: Vec<u8> = Vec::new();
        // ue(0) = "1"
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[0]);
        push_golomb(&mut bits, 10);
        push_golomb(&mut bits, 8);
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[1]);
        push_bits(&mut bits, &[0]);
        push_bits(&mut bits, &[0]);
        bytes.extend(pack_bits(&bits));
        bytes
    }

    fn push_bits(out: &mut Vec<u8>, bits: &[u8]) {
        out.extend_from_slice(bits);
    }

    fn push_golomb(out: &mut Vec<u8>, value: u32) {
        let code_num = value + 1;
        let k = 31 - code_num.leading_zeros();
        for _ in 0..k {
            out.push(0);
        }
        for i in (0..=k).rev() {
            out.push(((code_num >> i) & 1) as u8);
        }
    }

    fn pack_bits(bits: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit != 0 {
                bytes[i / 8] |= 1 << (7 - i % 8);
            }
        }
        // pad the remainder with 1-bits so trailing zero padding doesn't
        // get misread as more golomb codes by any future reader.
        bytes
    }

    #[test]
    fn parses_baseline_sps_dimensions() {
        let nal = sps_nal(66);
        let sps = parse_sps(&nal[3..]).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.seq_parameter_set_id, 0);
        assert_eq!(sps.width, 11 * 16);
        assert_eq!(sps.height, 9 * 16);
        assert!(!sps.frame_cropping_flag);
    }

    #[test]
    fn removes_emulation_prevention_bytes() {
        let data = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02];
        let cleaned = remove_emulation_prevention(&data);
        assert_eq!(cleaned, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn parses_idr_slice_and_marks_closed_gop() {
        // NAL header: nal_ref_idc=3, nal_unit_type=5 (IDR)
        let mut buf = vec![0x00, 0x00, 0x00, 0x01, 0x65];
        // slice header: first_mb_in_slice=0 ("1"), slice_type=7 ("ue(7)")
        let mut bits = Vec::new();
        push_bits(&mut bits, &[1]);
        push_golomb(&mut bits, 7);
        buf.extend(pack_bits(&bits));
        let (nal, consumed) = parse_one_nal_unit(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(nal.nal_unit_type, 5);
        match nal.payload {
            NalPayload::Slice { header, is_idr } => {
                assert!(is_idr);
                assert_eq!(header.picture_type, PictureType::I);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parses_access_unit_delimiter() {
        let buf = [0x00, 0x00, 0x00, 0x01, 0x09, 0b0100_0000];
        let (nal, _) = parse_one_nal_unit(&buf).unwrap();
        match nal.payload {
            NalPayload::Aud(aud) => assert_eq!(aud.primary_pic_type, 2),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
