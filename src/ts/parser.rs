//! TS packet header, adaptation field, and PSI section (PAT/PMT) parsing.

use crate::error::{AnalyzerError, Result};
use crate::ts::descriptors::parse_descriptor_loop;
use crate::ts::types::*;

/// Parses the fixed 4-byte TS packet header.
///
/// # Errors
/// Returns `Err` if fewer than 4 bytes are supplied or the sync byte is not
/// `0x47`; callers treat the latter as the recoverable per-packet framing
/// error described in the error handling design, not a fatal failure.
pub fn parse_header(data: &[u8]) -> Result<TsHeader> {
    if data.len() < TS_HEADER_SIZE {
        return Err(AnalyzerError::InvalidData("TS packet too short".into()));
    }
    if data[0] != 0x47 {
        return Err(AnalyzerError::InvalidData(format!(
            "invalid sync byte 0x{:02x}",
            data[0]
        )));
    }

    let header = TsHeader {
        transport_error: (data[1] & 0x80) != 0,
        payload_unit_start: (data[1] & 0x40) != 0,
        transport_priority: (data[1] & 0x20) != 0,
        pid: (((data[1] & 0x1f) as u16) << 8) | data[2] as u16,
        scrambling_control: (data[3] >> 6) & 0x03,
        adaptation_field_control: (data[3] >> 4) & 0x03,
        continuity_counter: data[3] & 0x0f,
    };
    log::trace!(
        "ts header pid={:#x} pusi={} afc={:#04b} cc={}",
        header.pid,
        header.payload_unit_start,
        header.adaptation_field_control,
        header.continuity_counter
    );
    Ok(header)
}

/// Parses the adaptation field that begins at `packet[4..]`, if
/// `header.has_adaptation_field()`. Returns the field and the number of
/// bytes it occupies (`length + 1`, or `0` if absent).
pub fn parse_adaptation_field(
    packet: &[u8],
    header: &TsHeader,
) -> Result<(Option<AdaptationField>, usize)> {
    if !header.has_adaptation_field() {
        return Ok((None, 0));
    }
    if packet.len() <= TS_HEADER_SIZE {
        return Err(AnalyzerError::InvalidData(
            "adaptation field declared but packet has no bytes after header".into(),
        ));
    }

    let length = packet[TS_HEADER_SIZE];
    if length == 0 {
        return Ok((
            Some(AdaptationField {
                length: 0,
                ..Default::default()
            }),
            1,
        ));
    }

    let body_start = TS_HEADER_SIZE + 1;
    if packet.len() < body_start + length as usize {
        return Err(AnalyzerError::InvalidData(
            "adaptation field length exceeds packet bounds".into(),
        ));
    }

    let flags = packet[body_start];
    let mut field = AdaptationField {
        length,
        discontinuity: (flags & 0x80) != 0,
        random_access: (flags & 0x40) != 0,
        es_priority: (flags & 0x20) != 0,
        pcr_flag: (flags & 0x10) != 0,
        opcr_flag: (flags & 0x08) != 0,
        pcr: None,
    };

    let mut pos = body_start + 1;
    if field.pcr_flag {
        if packet.len() < pos + 6 {
            return Err(AnalyzerError::InvalidData("PCR field truncated".into()));
        }
        let base = ((packet[pos] as u64) << 25)
            | ((packet[pos + 1] as u64) << 17)
            | ((packet[pos + 2] as u64) << 9)
            | ((packet[pos + 3] as u64) << 1)
            | ((packet[pos + 4] & 0x80) as u64 >> 7);
        let ext = (((packet[pos + 4] & 0x01) as u64) << 8) | (packet[pos + 5] as u64);
        field.pcr = Some(base * 300 + ext);
    }

    Ok((Some(field), 1 + length as usize))
}

/// Parses a Program Association Table section. `data` begins at the
/// `table_id` byte (i.e. after any `pointer_field` has already been
/// skipped by the caller).
pub fn parse_pat(data: &[u8]) -> Result<Pat> {
    if data.len() < 8 {
        return Err(AnalyzerError::InvalidData("PAT section too short".into()));
    }
    if data[0] != TABLE_ID_PAT {
        return Err(AnalyzerError::InvalidData(format!(
            "invalid PAT table_id 0x{:02x}",
            data[0]
        )));
    }

    let section_length = (((data[1] & 0x0f) as usize) << 8) | data[2] as usize;
    let total_length = 3 + section_length;
    if data.len() < total_length {
        return Err(AnalyzerError::InvalidData(
            "PAT section_length exceeds available packet payload".into(),
        ));
    }
    if total_length < 3 + 9 {
        return Err(AnalyzerError::InvalidData(
            "PAT section_length too small to hold its own header".into(),
        ));
    }

    let mut pat = Pat::default();
    let mut pos = 8;
    let programs_end = total_length - 4; // exclude trailing CRC32
    while pos + 4 <= programs_end {
        let program_number = ((data[pos] as u16) << 8) | data[pos + 1] as u16;
        let pid = (((data[pos + 2] & 0x1f) as u16) << 8) | data[pos + 3] as u16;
        pat.entries.push(PatEntry { program_number, pid });
        pos += 4;
    }
    log::debug!("PAT replaced: {} entries", pat.entries.len());
    Ok(pat)
}

/// Parses a Program Map Table section. `data` begins at the `table_id`
/// byte. Per-element descriptor loops are consumed to maintain exact
/// section framing but their contents are not interpreted (see
/// `DESIGN.md`, "Per-element descriptor loop inside PMT").
pub fn parse_pmt(data: &[u8]) -> Result<Pmt> {
    if data.len() < 8 {
        return Err(AnalyzerError::InvalidData("PMT section too short".into()));
    }
    if data[0] != TABLE_ID_PMT {
        return Err(AnalyzerError::InvalidData(format!(
            "invalid PMT table_id 0x{:02x}",
            data[0]
        )));
    }

    let section_length = (((data[1] & 0x0f) as usize) << 8) | data[2] as usize;
    let total_length = 3 + section_length;
    if data.len() < total_length {
        return Err(AnalyzerError::InvalidData(
            "PMT section_length exceeds available packet payload".into(),
        ));
    }

    let mut pmt = Pmt::default();
    let mut pos = 8;
    let section_end = total_length - 4; // exclude trailing CRC32

    if pos + 4 > section_end {
        return Err(AnalyzerError::InvalidData(
            "PMT too short for pcr_pid and program_info_length".into(),
        ));
    }
    pmt.pcr_pid = (((data[pos] & 0x1f) as u16) << 8) | data[pos + 1] as u16;
    pos += 2;
    let program_info_length = (((data[pos] & 0x0f) as usize) << 8) | data[pos + 1] as usize;
    pos += 2;

    if pos + program_info_length > section_end {
        return Err(AnalyzerError::InvalidData(
            "PMT program_info_length extends past section".into(),
        ));
    }
    pmt.program_descriptors = parse_descriptor_loop(&data[pos..], program_info_length)?;
    pos += program_info_length;

    while pos + 5 <= section_end {
        let stream_type = data[pos];
        let elementary_pid = (((data[pos + 1] & 0x1f) as u16) << 8) | data[pos + 2] as u16;
        let es_info_length = (((data[pos + 3] & 0x0f) as usize) << 8) | data[pos + 4] as usize;
        pos += 5;

        if pos + es_info_length > section_end {
            return Err(AnalyzerError::InvalidData(
                "PMT es_info_length extends past section".into(),
            ));
        }
        // Per-element descriptors are validated for framing but not decoded.
        let _ = parse_descriptor_loop(&data[pos..], es_info_length)?;
        pos += es_info_length;

        pmt.elementary_stream_infos.push(ElementaryStreamInfo {
            stream_type,
            elementary_pid,
            es_info_length: es_info_length as u16,
        });
    }

    if pos != section_end {
        return Err(AnalyzerError::InvalidData(format!(
            "PMT loop consumed {pos} bytes, expected {section_end}"
        )));
    }

    log::debug!(
        "PMT replaced: pcr_pid={:#x}, {} elementary streams",
        pmt.pcr_pid,
        pmt.elementary_stream_infos.len()
    );
    Ok(pmt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ts_header_fields() {
        let data = [0x47, 0x40, 0x00, 0x10];
        let header = parse_header(&data).unwrap();
        assert!(header.payload_unit_start);
        assert_eq!(header.pid, 0);
        assert_eq!(header.continuity_counter, 0);
    }

    #[test]
    fn rejects_bad_sync_byte() {
        let data = [0x48, 0x40, 0x00, 0x10];
        assert!(parse_header(&data).is_err());
    }

    #[test]
    fn parses_pat_section() {
        let data = [
            TABLE_ID_PAT,
            0x80,
            0x0d, // section_length = 13
            0x00,
            0x01, // transport_stream_id
            0xc1, // version / current_next
            0x00,
            0x00, // section_number / last_section_number
            0x00,
            0x01, // program_number = 1
            0x10,
            0x00, // PMT pid = 0x1000
            0x00,
            0x00,
            0x00,
            0x00, // CRC32
        ];
        let pat = parse_pat(&data).unwrap();
        assert_eq!(pat.entries.len(), 1);
        assert_eq!(pat.entries[0].program_number, 1);
        assert_eq!(pat.entries[0].pid, 0x1000);
        assert_eq!(pat.program_map_pids().next(), Some((1, 0x1000)));
    }

    #[test]
    fn parses_pmt_section_with_registration_descriptor() {
        let data = [
            TABLE_ID_PMT,
            0x80,
            0x18, // section_length = 24
            0x00,
            0x01, // program_number
            0xc1,
            0x00,
            0x00,
            0x01,
            0x00, // pcr_pid = 0x100
            0x00,
            0x06, // program_info_length = 6
            0x05,
            0x04,
            b'C',
            b'U',
            b'E',
            b'I', // registration descriptor
            0x1b,
            0x01,
            0x01, // stream_type H.264, pid=0x101
            0x00,
            0x00, // es_info_length = 0
            0x00,
            0x00,
            0x00,
            0x00, // CRC32
        ];
        let pmt = parse_pmt(&data).unwrap();
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.elementary_stream_infos.len(), 1);
        assert_eq!(pmt.elementary_stream_infos[0].stream_type, STREAM_TYPE_H264);
        assert_eq!(pmt.elementary_stream_infos[0].elementary_pid, 0x101);
        assert!(pmt.program_descriptors[0].is_scte35_registration());
        assert_eq!(pmt.scte35_pid(), None);
    }

    #[test]
    fn truncated_section_is_an_error() {
        let data = [TABLE_ID_PAT, 0x80, 0xff];
        assert!(parse_pat(&data).is_err());
    }
}
