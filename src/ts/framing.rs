//! Transport-stream packet size detection (§4.4): distinguishes the plain
//! 188-byte packet framing from the 192-byte framing used by some capture
//! formats, which prepend a 4-byte timestamp that this core discards.

use crate::error::{AnalyzerError, Result};
use crate::ts::types::{TS_PACKET_SIZE, TS_PACKET_SIZE_TIMESTAMPED};

/// Given the first five bytes of the input file, determines the packet
/// size: `188` if byte 0 is the sync byte, `192` if byte 4 is (a 4-byte
/// timestamp precedes each packet). Any other pattern is a fatal
/// format-detection failure.
pub fn detect_packet_size(first_five: &[u8; 5]) -> Result<u16> {
    if first_five[0] == 0x47 {
        log::debug!("detected 188-byte transport stream packets");
        Ok(TS_PACKET_SIZE as u16)
    } else if first_five[4] == 0x47 {
        log::debug!("detected 192-byte transport stream packets (4-byte timestamp prefix)");
        Ok(TS_PACKET_SIZE_TIMESTAMPED as u16)
    } else {
        log::error!("could not locate sync byte in first five bytes of input");
        Err(AnalyzerError::FormatDetection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_188_byte_framing() {
        let bytes = [0x47, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(detect_packet_size(&bytes).unwrap(), 188);
    }

    #[test]
    fn detects_192_byte_framing() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x47];
        assert_eq!(detect_packet_size(&bytes).unwrap(), 192);
    }

    #[test]
    fn neither_pattern_is_a_fatal_error() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            detect_packet_size(&bytes),
            Err(AnalyzerError::FormatDetection)
        ));
    }
}
