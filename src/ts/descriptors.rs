//! Descriptor tag dispatch (ISO/IEC 13818-1 §2.6). Of the 34 standard
//! MPEG-system descriptor tags, only `video_stream` (2), `audio_stream` (3),
//! and `registration` (5) are fully decoded; every other recognized or
//! unrecognized tag is preserved with its raw body, skipped by
//! `descriptor_length`.

use crate::error::{AnalyzerError, Result};
use crate::ts::types::Descriptor;

/// Parses one `(descriptor_tag, descriptor_length, body)` entry from the
/// front of `buf`. Returns the decoded descriptor and the number of bytes
/// consumed (`2 + descriptor_length`).
pub fn parse_descriptor(buf: &[u8]) -> Result<(Descriptor, usize)> {
    if buf.len() < 2 {
        return Err(AnalyzerError::InvalidData(
            "descriptor header truncated".into(),
        ));
    }
    let tag = buf[0];
    let length = buf[1] as usize;
    if buf.len() < 2 + length {
        return Err(AnalyzerError::InvalidData(format!(
            "descriptor tag {tag:#x} declares length {length} past buffer end"
        )));
    }
    let body = &buf[2..2 + length];
    let descriptor = match tag {
        2 => parse_video_stream(body),
        3 => parse_audio_stream(body),
        5 => parse_registration(body),
        _ => Descriptor::Other {
            tag,
            data: body.to_vec(),
        },
    };
    log::trace!("descriptor tag={tag:#x} length={length}");
    Ok((descriptor, 2 + length))
}

/// Parses every descriptor in a loop of exactly `loop_length` bytes,
/// returning them in order. Enforces the invariant that the loop consumes
/// exactly the declared length.
pub fn parse_descriptor_loop(buf: &[u8], loop_length: usize) -> Result<Vec<Descriptor>> {
    if buf.len() < loop_length {
        return Err(AnalyzerError::InvalidData(format!(
            "descriptor loop declares length {loop_length} past buffer end ({} available)",
            buf.len()
        )));
    }
    let mut descriptors = Vec::new();
    let mut consumed = 0usize;
    let loop_buf = &buf[..loop_length];
    while consumed < loop_length {
        let (descriptor, used) = parse_descriptor(&loop_buf[consumed..])?;
        consumed += used;
        descriptors.push(descriptor);
    }
    if consumed != loop_length {
        return Err(AnalyzerError::InvalidData(format!(
            "descriptor loop consumed {consumed} bytes, expected {loop_length}"
        )));
    }
    Ok(descriptors)
}

fn parse_video_stream(body: &[u8]) -> Descriptor {
    if body.is_empty() {
        return Descriptor::VideoStream {
            frame_rate_code: 0,
            mpeg1_only: true,
            profile_and_level: None,
        };
    }
    let b0 = body[0];
    let mpeg1_only = (b0 & 0x08) != 0;
    let frame_rate_code = (b0 >> 3) & 0x0f;
    let profile_and_level = if !mpeg1_only && body.len() > 1 {
        Some(body[1])
    } else {
        None
    };
    Descriptor::VideoStream {
        frame_rate_code,
        mpeg1_only,
        profile_and_level,
    }
}

fn parse_audio_stream(body: &[u8]) -> Descriptor {
    if body.is_empty() {
        return Descriptor::AudioStream {
            free_format: false,
            id: false,
            layer: 0,
        };
    }
    let b0 = body[0];
    Descriptor::AudioStream {
        free_format: (b0 & 0x80) != 0,
        id: (b0 & 0x40) != 0,
        layer: (b0 >> 4) & 0x03,
    }
}

fn parse_registration(body: &[u8]) -> Descriptor {
    let format_identifier = if body.len() >= 4 {
        u32::from_be_bytes([body[0], body[1], body[2], body[3]])
    } else {
        0
    };
    Descriptor::Registration { format_identifier }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_video_stream_descriptor() {
        let body = [0b0110_1000u8, 0x40];
        let buf = [2, 2, body[0], body[1]];
        let (descriptor, used) = parse_descriptor(&buf).unwrap();
        assert_eq!(used, 4);
        match descriptor {
            Descriptor::VideoStream {
                frame_rate_code,
                mpeg1_only,
                profile_and_level,
            } => {
                assert_eq!(frame_rate_code, 0b1101);
                assert!(!mpeg1_only);
                assert_eq!(profile_and_level, Some(0x40));
            }
            other => panic!("unexpected descriptor: {other:?}"),
        }
    }

    #[test]
    fn decodes_scte35_registration_descriptor() {
        let buf = [5u8, 4, 0x43, 0x55, 0x45, 0x49];
        let (descriptor, used) = parse_descriptor(&buf).unwrap();
        assert_eq!(used, 6);
        assert!(descriptor.is_scte35_registration());
    }

    #[test]
    fn unknown_tag_preserves_raw_body() {
        let buf = [0x2au8, 3, 0xAA, 0xBB, 0xCC];
        let (descriptor, used) = parse_descriptor(&buf).unwrap();
        assert_eq!(used, 5);
        assert_eq!(descriptor.tag(), 0x2a);
    }

    #[test]
    fn descriptor_loop_consumes_exact_length() {
        let buf = [2u8, 1, 0x00, 3u8, 1, 0x00, 0xff, 0xff];
        let descriptors = parse_descriptor_loop(&buf, 6).unwrap();
        assert_eq!(descriptors.len(), 2);
    }

    #[test]
    fn truncated_descriptor_is_an_error() {
        let buf = [2u8, 10, 0x00];
        assert!(parse_descriptor(&buf).is_err());
    }
}
