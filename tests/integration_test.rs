//! End-to-end test driving `Demuxer` over a small synthetic transport
//! stream: PAT, PMT, and three H.264 video packets carrying one IDR slice
//! split across them.

use mpts_probe::{Config, Demuxer};

fn ts_packet(pid: u16, pusi: bool, continuity_counter: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; 188];
    packet[0] = 0x47;
    packet[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1f);
    packet[2] = (pid & 0xff) as u8;
    packet[3] = 0x10 | (continuity_counter & 0x0f); // AFC = 01 (payload only)
    let start = 4;
    let end = (start + payload.len()).min(188);
    packet[start..end].copy_from_slice(&payload[..end - start]);
    packet
}

fn pat_packet() -> Vec<u8> {
    let section = [
        0x00, // table_id
        0x80, 0x0d, // section_syntax_indicator + section_length = 13
        0x00, 0x01, // transport_stream_id
        0xc1, // version / current_next_indicator
        0x00, 0x00, // section_number / last_section_number
        0x00, 0x01, // program_number = 1
        0x10, 0x00, // pmt pid = 0x1000
        0x00, 0x00, 0x00, 0x00, // CRC32 (unverified)
    ];
    let mut payload = vec![0x00]; // pointer_field
    payload.extend_from_slice(&section);
    ts_packet(0x0000, true, 0, &payload)
}

fn pmt_packet() -> Vec<u8> {
    let section = [
        0x02, // table_id
        0x80, 0x18, // section_length = 24
        0x00, 0x01, // program_number
        0xc1, 0x00, 0x00, // version/current_next, section_number, last_section_number
        0x01, 0x00, // pcr_pid = 0x100
        0x00, 0x06, // program_info_length = 6
        0x05, 0x04, b'C', b'U', b'E', b'I', // registration descriptor
        0x1b, 0x01, 0x01, // stream_type = H.264, elementary_pid = 0x101
        0x00, 0x00, // es_info_length = 0
        0x00, 0x00, 0x00, 0x00, // CRC32
    ];
    let mut payload = vec![0x00]; // pointer_field
    payload.extend_from_slice(&section);
    ts_packet(0x1000, true, 0, &payload)
}

/// One PES packet wrapping a single IDR NAL unit, split into three TS
/// packets' worth of payload for the video PID.
fn idr_pes_payloads() -> Vec<Vec<u8>> {
    let mut pes = vec![0x00, 0x00, 0x01, 0xe0]; // start code + stream_id (video)
    pes.extend_from_slice(&[0x00, 0x00]); // PES_packet_length = 0 (unbounded, video)
    pes.push(0x80); // flags1
    pes.push(0x00); // flags2: no PTS/DTS
    pes.push(0x00); // PES_header_data_length = 0
    // NAL header 0x65: nal_ref_idc=3, nal_unit_type=5 (IDR). Slice header:
    // first_mb_in_slice=0 (ue "1"), slice_type=7 (ue "0001000") -> 0x88.
    pes.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88]);

    let chunk_size = pes.len().div_ceil(3).max(1);
    pes.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

#[test]
fn demuxes_pat_pmt_and_emits_one_idr_frame() {
    let mut out = Vec::new();
    let mut demux = Demuxer::new(&mut out, Config::default());
    demux.set_analyze_elementary_stream(true);

    demux.analyze_file_header(&[0x47, 0, 0, 0, 0]).unwrap();
    demux.process_packet(&pat_packet(), 0).unwrap();
    demux.process_packet(&pmt_packet(), 1).unwrap();

    let chunks = idr_pes_payloads();
    demux
        .process_packet(&ts_packet(0x101, true, 0, &chunks[0]), 2)
        .unwrap();
    for (i, chunk) in chunks.iter().enumerate().skip(1) {
        demux
            .process_packet(&ts_packet(0x101, false, i as u8, chunk), 2 + i as u32)
            .unwrap();
    }
    // A follow-on PUSI packet forces the accumulated frame through the AVC parser.
    demux
        .process_packet(&ts_packet(0x101, true, 9, &[]), 2 + chunks.len() as u32)
        .unwrap();
    demux.flush().unwrap();

    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains("<program_map_pid>0x1000</program_map_pid>"));
    assert!(xml.contains("<format_identifier>CUEI</format_identifier>"));
    assert!(xml.contains("<closed_gop>1</closed_gop>"));
    assert!(xml.contains("<type>I</type>"));
    assert!(xml.contains("packets=\"3\""));
    assert!(xml.starts_with("<?xml version = \"1.0\" encoding = \"UTF-8\"?>"));
    assert!(xml.trim_end().ends_with("</file>"));
}

#[test]
fn adaptation_field_only_packet_advances_position_without_dispatch() {
    let mut out = Vec::new();
    let mut demux = Demuxer::new(&mut out, Config::default());
    demux.analyze_file_header(&[0x47, 0, 0, 0, 0]).unwrap();

    let mut packet = vec![0xffu8; 188];
    packet[0] = 0x47;
    packet[1] = 0x01;
    packet[2] = 0x01; // pid = 0x101, not yet known as video
    packet[3] = 0x20; // AFC = 10, adaptation field only
    packet[4] = 183; // adaptation_field_length fills rest of packet
    packet[5] = 0x00; // no flags set

    assert!(demux.process_packet(&packet, 0).is_ok());
}

#[test]
fn format_detection_failure_is_fatal() {
    let mut out = Vec::new();
    let mut demux = Demuxer::new(&mut out, Config::default());
    let err = demux.analyze_file_header(&[0x00, 0x00, 0x00, 0x00, 0x00]);
    assert!(err.is_err());
}
