//! The synchronous core glue: PID routing, PSI state, per-PID elementary
//! accumulation, and XML emission.
//!
//! Grounded on the teacher's `TSDemuxer`/`StreamInfo` shape in
//! `format/ts/demuxer.rs`, converted from its `async`/`tokio` pull loop to
//! the fully synchronous, caller-driven `process_packet`/`flush` surface
//! this core requires (no concurrency in scope, see `SPEC_FULL.md` §5).

use std::collections::HashMap;
use std::io::Write;

use crate::codec::avc::NalPayload;
use crate::codec::mpeg2::VideoUnit;
use crate::codec::{self, CodecKind, ParsedUnit};
use crate::config::Config;
use crate::error::{AnalyzerError, Result};
use crate::position::FilePosition;
use crate::record::{FrameRecord, FrameType};
use crate::ts::accumulator::ElementaryAccumulator;
use crate::ts::framing::detect_packet_size;
use crate::ts::pes::parse_pes_header;
use crate::ts::parser;
use crate::ts::types::*;
use crate::xml::XmlWriter;

/// Maximum coded units a single elementary-stream flush will inspect before
/// giving up, bounding the cost of a malformed stream that never produces a
/// recognizable frame boundary.
const MAX_UNITS_PER_FLUSH: usize = 256;

/// Per-PID bookkeeping for a tracked video elementary stream.
struct VideoPidState {
    stream_type: u8,
    kind: StreamKind,
    accumulator: ElementaryAccumulator,
    frame: FrameRecord,
    frame_number: u32,
}

/// The core analyzer: consumes TS packets one at a time and emits an XML
/// document describing every signalling table, PES header, and (optionally)
/// coded frame encountered.
pub struct Demuxer<W: Write> {
    xml: XmlWriter<W>,
    config: Config,
    position: FilePosition,
    packet_size: u16,
    network_pid: Option<u16>,
    program_map_pid: Option<u16>,
    scte35_pid: Option<u16>,
    pid_stream_type: HashMap<u16, u8>,
    pid_name: HashMap<u16, String>,
    video_pids: HashMap<u16, VideoPidState>,
}

impl<W: Write> Demuxer<W> {
    /// Creates a demuxer writing its XML document to `sink`, using
    /// `config`'s `terse` and `analyze_elementary_stream` defaults.
    pub fn new(sink: W, config: Config) -> Self {
        Demuxer {
            xml: XmlWriter::new(sink, true),
            config,
            position: FilePosition::new(),
            packet_size: TS_PACKET_SIZE as u16,
            network_pid: None,
            program_map_pid: None,
            scte35_pid: None,
            pid_stream_type: HashMap::new(),
            pid_name: HashMap::new(),
            video_pids: HashMap::new(),
        }
    }

    /// Overrides `config.terse` after construction.
    pub fn set_terse(&mut self, terse: bool) {
        self.config.terse = terse;
    }

    /// Overrides `config.analyze_elementary_stream` after construction.
    pub fn set_analyze_elementary_stream(&mut self, analyze: bool) {
        self.config.analyze_elementary_stream = analyze;
    }

    /// Detects the packet size from the first five bytes of the input file,
    /// records it, and emits the XML document header. This is the one
    /// fatal-error boundary callers must handle (`AnalyzerError::FormatDetection`).
    pub fn analyze_file_header(&mut self, first_five: &[u8; 5]) -> Result<u16> {
        let packet_size = detect_packet_size(first_five)?;
        self.packet_size = packet_size;
        self.xml.emit_document_open()?;
        self.xml.emit_tag(1, "packet_size", &packet_size.to_string())?;
        self.xml
            .emit_tag(1, "terse", if self.config.terse { "1" } else { "0" })?;
        Ok(packet_size)
    }

    /// Processes one `packet_size`-byte TS packet (already stripped of any
    /// 192-byte timestamp prefix by the caller's framer). `seq` is the
    /// packet's sequence number in the input, used only for diagnostics.
    pub fn process_packet(&mut self, buf: &[u8], seq: u32) -> Result<()> {
        let header = match parser::parse_header(buf) {
            Ok(header) => header,
            Err(err) => {
                log::warn!("packet {seq}: framing error: {err}");
                self.xml.emit_tag(1, "error", &err.to_string())?;
                self.position.advance(self.packet_size as u64);
                return Ok(());
            }
        };

        let (adaptation_field, adaptation_consumed) =
            parser::parse_adaptation_field(buf, &header)?;
        let payload_start = TS_HEADER_SIZE + adaptation_consumed;

        if !self.config.terse {
            self.emit_packet_summary(seq, &header, adaptation_field.is_some());
        }

        if header.has_payload() && payload_start < buf.len() {
            let payload = &buf[payload_start..];
            self.dispatch_payload(&header, payload)?;
        }

        self.position.advance(self.packet_size as u64);
        Ok(())
    }

    fn emit_packet_summary(&mut self, seq: u32, header: &TsHeader, has_adaptation: bool) {
        let _ = self.xml.emit_raw(
            1,
            format_args!(
                "<packet start=\"{}\"><number>{}</number><pid>{:#06x}</pid><adaptation>{}</adaptation></packet>",
                self.position.offset(),
                seq,
                header.pid,
                has_adaptation as u8,
            ),
        );
    }

    fn dispatch_payload(&mut self, header: &TsHeader, payload: &[u8]) -> Result<()> {
        if header.pid == PID_PAT {
            if header.payload_unit_start {
                self.handle_pat(payload)?;
            }
            return Ok(());
        }

        if Some(header.pid) == self.program_map_pid {
            if header.payload_unit_start {
                self.handle_pmt(payload)?;
            }
            return Ok(());
        }

        if let Some(&stream_type) = self.pid_stream_type.get(&header.pid) {
            let kind = StreamKind::from_stream_type(stream_type);
            if kind.is_video() {
                self.handle_video_packet(header, payload, stream_type, kind)?;
                return Ok(());
            }
        }

        log::trace!("pid {:#x}: classification-only, no handler", header.pid);
        Ok(())
    }

    fn handle_pat(&mut self, payload: &[u8]) -> Result<()> {
        let data = skip_pointer_field(payload);
        let pat = parser::parse_pat(data)?;
        self.network_pid = pat.network_pid();
        for (program_number, pid) in pat.program_map_pids() {
            self.program_map_pid = Some(pid);
            self.xml.emit_raw(
                1,
                format_args!(
                    "<program><program_number>{program_number}</program_number><program_map_pid>{pid:#06x}</program_map_pid></program>"
                ),
            )?;
        }
        Ok(())
    }

    fn handle_pmt(&mut self, payload: &[u8]) -> Result<()> {
        let data = skip_pointer_field(payload);
        let pmt = parser::parse_pmt(data)?;
        self.scte35_pid = pmt.scte35_pid();

        for descriptor in &pmt.program_descriptors {
            if let Descriptor::Registration { format_identifier } = descriptor {
                if let Some(text) = format_identifier_text(*format_identifier) {
                    self.xml.emit_tag(1, "format_identifier", &text)?;
                }
            }
        }

        for info in &pmt.elementary_stream_infos {
            self.pid_stream_type.insert(info.elementary_pid, info.stream_type);
            let kind = StreamKind::from_stream_type(info.stream_type);
            self.pid_name.insert(info.elementary_pid, stream_kind_label(kind).to_string());
        }
        Ok(())
    }

    fn handle_video_packet(
        &mut self,
        header: &TsHeader,
        payload: &[u8],
        stream_type: u8,
        kind: StreamKind,
    ) -> Result<()> {
        let pid = header.pid;
        let offset = self.position.offset();
        let pid_name = stream_kind_label(kind).to_string();

        if !self.video_pids.contains_key(&pid) {
            self.video_pids.insert(
                pid,
                VideoPidState {
                    stream_type,
                    kind,
                    accumulator: ElementaryAccumulator::new(self.config.accumulator_growth_increment),
                    frame: FrameRecord::new(1, pid, stream_type),
                    frame_number: 1,
                },
            );
        }

        if header.payload_unit_start {
            self.flush_video_pid(pid)?;
        }

        let state = self.video_pids.get_mut(&pid).expect("just inserted above");
        state.frame.record_packet(&pid_name, offset, self.packet_size as u64);
        state.accumulator.push(payload);
        Ok(())
    }

    fn flush_video_pid(&mut self, pid: u16) -> Result<()> {
        let Some(state) = self.video_pids.get_mut(&pid) else {
            return Ok(());
        };
        if state.accumulator.is_empty() {
            return Ok(());
        }

        let frame_number = state.frame_number;
        let stream_type = state.stream_type;
        let kind = state.kind;
        let bytes = state.accumulator.bytes().to_vec();
        let analyze = self.config.analyze_elementary_stream;

        let (pts, dts, picture_type, closed_gop) = decode_elementary_frame(kind, &bytes, analyze);

        let frame = std::mem::replace(
            &mut state.frame,
            FrameRecord::new(frame_number + 1, pid, stream_type),
        );
        state.frame_number = frame_number + 1;
        state.accumulator.clear();

        let mut frame = frame;
        frame.pts = pts;
        frame.dts = dts;
        frame.picture_coding_type = picture_type;
        frame.closed_gop = closed_gop;

        self.emit_frame(&frame)
    }

    fn emit_frame(&mut self, frame: &FrameRecord) -> Result<()> {
        let name = self
            .pid_name
            .get(&frame.pid)
            .cloned()
            .unwrap_or_else(|| format!("{:#06x}", frame.pid));
        self.xml.emit_raw(
            1,
            format_args!(
                "<frame number=\"{}\" name=\"{}\" packets=\"{}\" pid=\"{:#06x}\">",
                frame.frame_number,
                name,
                frame.packet_count(),
                frame.pid
            ),
        )?;
        if let Some(dts) = frame.dts {
            self.xml.emit_tag(2, "DTS", &dts.to_string())?;
        }
        if let Some(pts) = frame.pts {
            self.xml.emit_tag(2, "PTS", &pts.to_string())?;
        }
        if let Some(picture_type) = frame.picture_coding_type {
            self.xml.emit_tag(2, "type", &picture_type.to_string())?;
        }
        if frame.closed_gop {
            self.xml.emit_tag(2, "closed_gop", "1")?;
        }
        self.xml.emit_raw(2, format_args!("<slices>"))?;
        for slice in &frame.slices {
            self.xml.emit_raw(
                3,
                format_args!(
                    "<slice byte=\"{}\" packets=\"{}\"/>",
                    slice.byte_offset_in_file, slice.packet_count
                ),
            )?;
        }
        self.xml.emit_raw(2, format_args!("</slices>"))?;
        self.xml.emit_raw(1, format_args!("</frame>"))?;
        Ok(())
    }

    /// Forces every in-progress frame through the codec parser and emits
    /// it, then closes the XML document. Call once after the final packet.
    pub fn flush(&mut self) -> Result<()> {
        let pids: Vec<u16> = self.video_pids.keys().copied().collect();
        for pid in pids {
            self.flush_video_pid(pid)?;
        }
        self.xml.emit_document_close()?;
        Ok(())
    }
}

/// Skips the 1-byte `pointer_field` (and the bytes it names) at the start
/// of a PUSI-flagged section payload.
fn skip_pointer_field(payload: &[u8]) -> &[u8] {
    if payload.is_empty() {
        return payload;
    }
    let pointer = payload[0] as usize;
    if payload.len() < 1 + pointer {
        return &payload[1..];
    }
    &payload[1 + pointer..]
}

fn stream_kind_label(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Mpeg2Video => "MPEG-2 video",
        StreamKind::H264Video => "H.264 video",
        StreamKind::Other => "other",
    }
}

fn format_identifier_text(value: u32) -> Option<String> {
    let bytes = value.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic()) {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        None
    }
}

/// Parses the PES header from an accumulated elementary-stream buffer and,
/// when `analyze` is set, runs the appropriate codec parser over the
/// remaining bytes to classify the frame. Returns
/// `(pts, dts, picture_type, closed_gop)`.
fn decode_elementary_frame(
    kind: StreamKind,
    bytes: &[u8],
    analyze: bool,
) -> (Option<u64>, Option<u64>, Option<FrameType>, bool) {
    let (pes_header, consumed) = match parse_pes_header(bytes) {
        Ok(result) => result,
        Err(err) => {
            log::warn!("elementary stream: bad PES header: {err}");
            return (None, None, None, false);
        }
    };

    if !analyze || consumed >= bytes.len() {
        return (pes_header.pts, pes_header.dts, None, false);
    }

    let body = &bytes[consumed..];
    let codec_kind = match kind {
        StreamKind::Mpeg2Video => Some(CodecKind::Mpeg2Video),
        StreamKind::H264Video => Some(CodecKind::H264),
        StreamKind::Other => None,
    };
    let (picture_type, closed_gop) = match codec_kind {
        Some(codec_kind) => decode_video_frame(codec_kind, body),
        None => (None, false),
    };

    (pes_header.pts, pes_header.dts, picture_type, closed_gop)
}

/// Walks `body` one coded unit at a time through [`codec::parse_one_unit`],
/// stopping at the first unit that classifies the frame (an MPEG-2 picture
/// header or an AVC slice), per §4.12's "parser stops after one coded
/// frame" rule. Tracks the MPEG-2 GOP's `closed_gop` bit seen along the way.
fn decode_video_frame(kind: CodecKind, body: &[u8]) -> (Option<FrameType>, bool) {
    let mut pos = 0usize;
    let mut closed_gop = false;
    for _ in 0..MAX_UNITS_PER_FLUSH {
        if pos >= body.len() {
            break;
        }
        let (unit, consumed) = match codec::parse_one_unit(kind, &body[pos..]) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("{kind:?}: {err}");
                break;
            }
        };
        match unit {
            ParsedUnit::Mpeg2(VideoUnit::GroupOfPictures(gop)) => closed_gop = gop.closed_gop,
            ParsedUnit::Mpeg2(VideoUnit::Picture(picture)) => {
                return (Some(FrameType::from(picture.picture_coding_type)), closed_gop);
            }
            ParsedUnit::Avc(nal) => {
                if let NalPayload::Slice { header, is_idr } = nal.payload {
                    return (Some(FrameType::from(header.picture_type)), is_idr);
                }
            }
            _ => {}
        }
        if consumed == 0 {
            break;
        }
        pos += consumed;
    }
    (None, closed_gop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat_packet() -> Vec<u8> {
        let mut buf = vec![0x47, 0x40, 0x00, 0x10, 0x00]; // sync, PUSI, pid=0, AFC=01, pointer_field=0
        let section = [
            TABLE_ID_PAT,
            0x80,
            0x0d,
            0x00,
            0x01,
            0xc1,
            0x00,
            0x00,
            0x00,
            0x01,
            0x10,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
        ];
        buf.extend_from_slice(&section);
        buf.resize(188, 0xff);
        buf
    }

    #[test]
    fn pat_packet_updates_program_map_pid() {
        let mut out = Vec::new();
        let mut demux = Demuxer::new(&mut out, Config::default());
        demux.analyze_file_header(&[0x47, 0, 0, 0, 0]).unwrap();
        demux.process_packet(&pat_packet(), 0).unwrap();
        assert_eq!(demux.program_map_pid, Some(0x1000));
    }

    #[test]
    fn framing_error_does_not_abort_processing() {
        let mut out = Vec::new();
        let mut demux = Demuxer::new(&mut out, Config::default());
        demux.analyze_file_header(&[0x47, 0, 0, 0, 0]).unwrap();
        let mut bad_packet = vec![0x00u8; 188];
        bad_packet[0] = 0x48;
        assert!(demux.process_packet(&bad_packet, 0).is_ok());
        assert_eq!(demux.position.offset(), 188);
    }

    #[test]
    fn file_position_advances_by_exactly_packet_size() {
        let mut out = Vec::new();
        let mut demux = Demuxer::new(&mut out, Config::default());
        demux.analyze_file_header(&[0x47, 0, 0, 0, 0]).unwrap();
        for seq in 0..5 {
            demux.process_packet(&pat_packet(), seq).unwrap();
        }
        assert_eq!(demux.position.offset(), 5 * 188);
    }

    #[test]
    fn pointer_field_is_skipped() {
        let payload = [0x02, 0xaa, 0xbb, TABLE_ID_PAT];
        let rest = skip_pointer_field(&payload);
        assert_eq!(rest[0], TABLE_ID_PAT);
    }
}
