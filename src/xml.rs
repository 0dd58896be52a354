//! Minimal indented XML emitter.
//!
//! Wraps any `std::io::Write` sink. The original reference implementation
//! toggles a process-wide terse/verbose flag; here that flag is a
//! constructor argument on an explicit `XmlWriter<W>` value owned by the
//! `Demuxer`, removing the last piece of global state. No escaping is
//! performed: callers are expected to supply printable content (hex
//! strings, decimal numbers, enum names) only.

use crate::Result;
use std::io::Write;

/// Indented key/value tag printer over a caller-supplied sink.
pub struct XmlWriter<W: Write> {
    sink: W,
    enabled: bool,
}

impl<W: Write> XmlWriter<W> {
    /// Wraps `sink`. When `enabled` is false, every emit call is a no-op.
    pub fn new(sink: W, enabled: bool) -> Self {
        XmlWriter { sink, enabled }
    }

    /// Writes the XML declaration and opening `<file>` tag.
    pub fn emit_document_open(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        writeln!(self.sink, "<?xml version = \"1.0\" encoding = \"UTF-8\"?>")?;
        writeln!(self.sink, "<file>")?;
        Ok(())
    }

    /// Writes the closing `</file>` tag.
    pub fn emit_document_close(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        writeln!(self.sink, "</file>")?;
        Ok(())
    }

    /// Emits `<name>value</name>` at the given indent level.
    pub fn emit_tag(&mut self, indent_level: usize, name: &str, value: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        writeln!(
            self.sink,
            "{}<{}>{}</{}>",
            indent(indent_level),
            name,
            value,
            name
        )?;
        Ok(())
    }

    /// Emits a raw, already-formatted line at the given indent level,
    /// with no surrounding tag.
    pub fn emit_raw(&mut self, indent_level: usize, content: std::fmt::Arguments) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        writeln!(self.sink, "{}{}", indent(indent_level), content)?;
        Ok(())
    }

    /// True iff this writer will actually produce output.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Consumes the writer, returning the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

fn indent(level: usize) -> String {
    " ".repeat(level * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_tags_with_correct_indentation() {
        let mut buf = Vec::new();
        {
            let mut writer = XmlWriter::new(&mut buf, true);
            writer.emit_tag(1, "pid", "0x100").unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "  <pid>0x100</pid>\n");
    }

    #[test]
    fn disabled_writer_emits_nothing() {
        let mut buf = Vec::new();
        {
            let mut writer = XmlWriter::new(&mut buf, false);
            writer.emit_document_open().unwrap();
            writer.emit_tag(0, "name", "x").unwrap();
            writer.emit_document_close().unwrap();
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn document_wrapper_matches_expected_shape() {
        let mut buf = Vec::new();
        {
            let mut writer = XmlWriter::new(&mut buf, true);
            writer.emit_document_open().unwrap();
            writer.emit_document_close().unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("<?xml version = \"1.0\" encoding = \"UTF-8\"?>\n<file>\n"));
        assert!(out.ends_with("</file>\n"));
    }
}
