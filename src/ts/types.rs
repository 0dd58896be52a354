//! Core data types for the transport-stream layer: PAT/PMT, descriptors,
//! adaptation fields, and the fixed-size packet header.

// PIDs
/// PID reserved for the Program Association Table.
pub const PID_PAT: u16 = 0x0000;

// Table IDs
/// `table_id` value identifying a PAT section.
pub const TABLE_ID_PAT: u8 = 0x00;
/// `table_id` value identifying a PMT section.
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary stream types (ISO/IEC 13818-1 Table 2-34, selected values).
/// MPEG-2 video elementary stream type.
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
/// AAC ADTS audio elementary stream type.
pub const STREAM_TYPE_AAC: u8 = 0x0f;
/// H.264/AVC video elementary stream type.
pub const STREAM_TYPE_H264: u8 = 0x1b;
/// H.265/HEVC video elementary stream type.
pub const STREAM_TYPE_H265: u8 = 0x24;
/// SCTE-35 splice information stream type.
pub const STREAM_TYPE_SCTE35: u8 = 0x86;

/// TS packet size with no leading timestamp prefix.
pub const TS_PACKET_SIZE: usize = 188;
/// TS packet size with a 4-byte discarded timestamp prefix (some capture
/// formats, e.g. M2TS).
pub const TS_PACKET_SIZE_TIMESTAMPED: usize = 192;
/// Size of the fixed TS packet header in bytes.
pub const TS_HEADER_SIZE: usize = 4;
/// Clock frequency for Presentation/Decoding Time Stamps, in Hz.
pub const PTS_HZ: u64 = 90_000;

/// A high-level classification of a PID's stream type, derived from the
/// PMT's `stream_type` byte. Anything not recognized is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// ISO/IEC 13818-2 MPEG-2 video.
    Mpeg2Video,
    /// Rec. ITU-T H.264 | ISO/IEC 14496-10 AVC video.
    H264Video,
    /// An elementary stream this core classifies but does not decode
    /// (audio, H.265, or any other declared stream type).
    Other,
}

impl StreamKind {
    /// Classifies a PMT `stream_type` byte.
    pub fn from_stream_type(stream_type: u8) -> Self {
        match stream_type {
            STREAM_TYPE_MPEG2_VIDEO => StreamKind::Mpeg2Video,
            STREAM_TYPE_H264 => StreamKind::H264Video,
            _ => StreamKind::Other,
        }
    }

    /// True for either video kind recognized by the codec parsers.
    pub fn is_video(&self) -> bool {
        matches!(self, StreamKind::Mpeg2Video | StreamKind::H264Video)
    }
}

/// One `(program_number, pid)` pair in a Program Association Table.
#[derive(Debug, Clone)]
pub struct PatEntry {
    /// Program number. `0` designates the network PID entry.
    pub program_number: u16,
    /// Either the network PID (`program_number == 0`) or the PID of this
    /// program's Program Map Table.
    pub pid: u16,
}

/// Program Association Table: maps program numbers to PMT PIDs.
#[derive(Debug, Clone, Default)]
pub struct Pat {
    /// Every `(program_number, pid)` pair carried in the section.
    pub entries: Vec<PatEntry>,
}

impl Pat {
    /// The network PID, if this PAT carried a `program_number == 0` entry.
    pub fn network_pid(&self) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.program_number == 0)
            .map(|e| e.pid)
    }

    /// Every `(program_number, program_map_pid)` pair, excluding the
    /// network PID entry.
    pub fn program_map_pids(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.entries
            .iter()
            .filter(|e| e.program_number != 0)
            .map(|e| (e.program_number, e.pid))
    }
}

/// A tag-dispatched MPEG-system descriptor. Most variants carry only their
/// raw body because this core does not decode them; see
/// [`crate::ts::descriptors`].
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Tag 2: video coding parameters.
    VideoStream {
        /// Raw frame-rate code (Table 6-3 values, not converted to Hz).
        frame_rate_code: u8,
        /// True if the stream uses only MPEG-1 constructs.
        mpeg1_only: bool,
        /// Profile and level, present only when `mpeg1_only` is false.
        profile_and_level: Option<u8>,
    },
    /// Tag 3: audio coding parameters.
    AudioStream {
        /// True if the audio frames use free bitrate format.
        free_format: bool,
        /// MPEG audio ID bit (distinguishes MPEG-1 vs MPEG-2 audio).
        id: bool,
        /// Audio layer (1/2/3), encoded as the raw 2-bit field.
        layer: u8,
    },
    /// Tag 5: registration descriptor, used by SCTE-35 to announce the
    /// `"CUEI"` format identifier.
    Registration {
        /// The raw 4-byte format identifier, both numeric and as the ASCII
        /// interpretation used to detect SCTE-35 (`"CUEI"`).
        format_identifier: u32,
    },
    /// Any other recognized-but-unimplemented or unrecognized tag; the body
    /// is preserved verbatim but not interpreted.
    Other {
        /// The descriptor tag byte.
        tag: u8,
        /// Raw descriptor body, `descriptor_length` bytes.
        data: Vec<u8>,
    },
}

impl Descriptor {
    /// The descriptor tag byte this value was parsed from.
    pub fn tag(&self) -> u8 {
        match self {
            Descriptor::VideoStream { .. } => 2,
            Descriptor::AudioStream { .. } => 3,
            Descriptor::Registration { .. } => 5,
            Descriptor::Other { tag, .. } => *tag,
        }
    }

    /// True if this is a registration descriptor announcing the SCTE-35
    /// `"CUEI"` format identifier.
    pub fn is_scte35_registration(&self) -> bool {
        matches!(self, Descriptor::Registration { format_identifier } if *format_identifier == 0x4355_4549)
    }
}

/// One elementary stream entry inside a Program Map Table.
#[derive(Debug, Clone)]
pub struct ElementaryStreamInfo {
    /// Raw `stream_type` byte (ISO/IEC 13818-1 Table 2-34).
    pub stream_type: u8,
    /// PID carrying this elementary stream's TS packets.
    pub elementary_pid: u16,
    /// Length in bytes of this stream's descriptor loop, as declared in the
    /// section (the per-element descriptor grammar itself is not decoded;
    /// see the design notes in `DESIGN.md`).
    pub es_info_length: u16,
}

/// Program Map Table: per-program elementary stream and descriptor
/// listing.
#[derive(Debug, Clone, Default)]
pub struct Pmt {
    /// PID carrying this program's Program Clock Reference.
    pub pcr_pid: u16,
    /// Program-level descriptors (tag-decoded where recognized).
    pub program_descriptors: Vec<Descriptor>,
    /// Every elementary stream declared by this program.
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl Pmt {
    /// The PID of the SCTE-35 splice-information stream, if this program
    /// declares one (`stream_type == 0x86`).
    pub fn scte35_pid(&self) -> Option<u16> {
        self.elementary_stream_infos
            .iter()
            .find(|info| info.stream_type == STREAM_TYPE_SCTE35)
            .map(|info| info.elementary_pid)
    }
}

/// The optional adaptation field carried by a TS packet when
/// `adaptation_field_control` indicates its presence.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    /// `adaptation_field_length`: byte count following this field, not
    /// counting the length byte itself.
    pub length: u8,
    /// Discontinuity indicator.
    pub discontinuity: bool,
    /// Random access indicator (commonly used to flag I-frame access
    /// points).
    pub random_access: bool,
    /// Elementary-stream priority indicator.
    pub es_priority: bool,
    /// True if a Program Clock Reference is present.
    pub pcr_flag: bool,
    /// True if an Original Program Clock Reference is present.
    pub opcr_flag: bool,
    /// Decoded 42-bit PCR value, if `pcr_flag` was set.
    pub pcr: Option<u64>,
}

/// The fixed 4-byte header every TS packet begins with.
#[derive(Debug, Clone)]
pub struct TsHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload Unit Start Indicator.
    pub payload_unit_start: bool,
    /// Transport priority bit.
    pub transport_priority: bool,
    /// 13-bit Packet Identifier.
    pub pid: u16,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Adaptation Field Control (2 bits): `01` payload only, `10`
    /// adaptation field only, `11` both, `00` reserved.
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits), increments modulo 16 per PID.
    pub continuity_counter: u8,
}

impl TsHeader {
    /// True if an adaptation field follows this header.
    pub fn has_adaptation_field(&self) -> bool {
        matches!(self.adaptation_field_control, 0b10 | 0b11)
    }

    /// True if a payload follows the header (and adaptation field, if any).
    pub fn has_payload(&self) -> bool {
        matches!(self.adaptation_field_control, 0b01 | 0b11)
    }
}
