//! Frame-level output records assembled by the demuxer.
//!
//! Field naming and the builder-style `with_*` constructors follow the
//! teacher's `av::Packet` (`Option<i64>` timestamps, plain data struct);
//! the shape itself (one frame per decoded picture, with per-contributing-
//! packet slice accounting) comes from the emitted frame record described
//! in the XML output grammar.

use crate::codec::avc::PictureType as AvcPictureType;
use crate::codec::mpeg2::PictureCodingType as Mpeg2PictureType;

/// Coded picture type, unified across both elementary-stream codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Intra-coded.
    I,
    /// Predictive-coded.
    P,
    /// Bidirectionally predictive-coded.
    B,
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            FrameType::I => "I",
            FrameType::P => "P",
            FrameType::B => "B",
        };
        write!(f, "{letter}")
    }
}

impl From<Mpeg2PictureType> for FrameType {
    fn from(value: Mpeg2PictureType) -> Self {
        match value {
            Mpeg2PictureType::I | Mpeg2PictureType::D => FrameType::I,
            Mpeg2PictureType::P => FrameType::P,
            Mpeg2PictureType::B => FrameType::B,
        }
    }
}

impl From<AvcPictureType> for FrameType {
    fn from(value: AvcPictureType) -> Self {
        match value {
            AvcPictureType::I => FrameType::I,
            AvcPictureType::P => FrameType::P,
            AvcPictureType::B => FrameType::B,
        }
    }
}

/// One TS packet's worth of contribution to a frame's elementary-stream
/// payload, tracked for the `<slice>` elements in the emitted XML record.
#[derive(Debug, Clone)]
pub struct SliceContributor {
    /// Display name of the PID this slice's bytes arrived on.
    pub pid_name: String,
    /// File byte offset of the TS packet that carried this slice's first
    /// byte.
    pub byte_offset_in_file: u64,
    /// Number of TS packets this slice's bytes spanned.
    pub packet_count: u32,
}

impl SliceContributor {
    /// Starts a new contributor at `byte_offset_in_file` on `pid_name`,
    /// with a single packet counted so far.
    pub fn new(pid_name: impl Into<String>, byte_offset_in_file: u64) -> Self {
        SliceContributor {
            pid_name: pid_name.into(),
            byte_offset_in_file,
            packet_count: 1,
        }
    }
}

/// One decoded coded video frame, accumulated incrementally as TS packets
/// arrive and emitted (then reset) at the next payload-unit-start.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Monotonic frame counter for this PID, starting at 1.
    pub frame_number: u32,
    /// Elementary PID this frame's bytes were carried on.
    pub pid: u16,
    /// MPEG-2 `stream_type` value from the PMT, for the `name` attribute.
    pub stream_type: u8,
    /// Coded picture type, once known. `None` until the codec parser has
    /// seen enough of the frame to classify it.
    pub picture_coding_type: Option<FrameType>,
    /// Decoding timestamp in 90kHz ticks, from the PES header.
    pub dts: Option<u64>,
    /// Presentation timestamp in 90kHz ticks, from the PES header.
    pub pts: Option<u64>,
    /// Closed-GOP flag: set by an MPEG-2 GOP header's `closed_gop` bit, or
    /// by the presence of an AVC IDR slice.
    pub closed_gop: bool,
    /// Per-TS-packet contributions to this frame's payload, in arrival
    /// order.
    pub slices: Vec<SliceContributor>,
}

impl FrameRecord {
    /// Starts a new, empty frame record for `pid`/`stream_type` at
    /// `frame_number`.
    pub fn new(frame_number: u32, pid: u16, stream_type: u8) -> Self {
        FrameRecord {
            frame_number,
            pid,
            stream_type,
            picture_coding_type: None,
            dts: None,
            pts: None,
            closed_gop: false,
            slices: Vec::new(),
        }
    }

    /// Records one TS packet's contribution. If the previous slice came
    /// from the same PID name and file offset is contiguous with the
    /// running packet size, bumps its `packet_count`; otherwise starts a
    /// new contributor.
    pub fn record_packet(&mut self, pid_name: &str, byte_offset_in_file: u64, packet_size: u64) {
        if let Some(last) = self.slices.last_mut() {
            let expected_next = last.byte_offset_in_file + last.packet_count as u64 * packet_size;
            if last.pid_name == pid_name && expected_next == byte_offset_in_file {
                last.packet_count += 1;
                return;
            }
        }
        self.slices.push(SliceContributor::new(pid_name, byte_offset_in_file));
    }

    /// Total number of TS packets this frame's payload spanned.
    pub fn packet_count(&self) -> u32 {
        self.slices.iter().map(|s| s.packet_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_contiguous_packets_into_one_slice() {
        let mut frame = FrameRecord::new(1, 0x101, 0x1b);
        frame.record_packet("video", 0, 188);
        frame.record_packet("video", 188, 188);
        frame.record_packet("video", 376, 188);
        assert_eq!(frame.slices.len(), 1);
        assert_eq!(frame.slices[0].packet_count, 3);
        assert_eq!(frame.packet_count(), 3);
    }

    #[test]
    fn starts_new_slice_on_discontinuity() {
        let mut frame = FrameRecord::new(1, 0x101, 0x1b);
        frame.record_packet("video", 0, 188);
        frame.record_packet("video", 1000, 188);
        assert_eq!(frame.slices.len(), 2);
        assert_eq!(frame.packet_count(), 2);
    }

    #[test]
    fn picture_types_unify_across_codecs() {
        assert_eq!(FrameType::from(Mpeg2PictureType::I), FrameType::I);
        assert_eq!(FrameType::from(AvcPictureType::B), FrameType::B);
        assert_eq!(FrameType::I.to_string(), "I");
    }
}
