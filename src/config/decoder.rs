//! Byte stream to text lines.
//!
//! Lines are read lazily, validated as UTF-8 one at a time, and the first
//! line has a byte-order mark removed.

use crate::error::{ConfigError, Result};
use std::io::BufRead;

/// UTF-8 encodings of U+FEFF and U+FFFE.
const BOMS: [&str; 2] = ["\u{feff}", "\u{fffe}"];

/// One decoded line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number within the source.
    pub number: usize,
    pub text: String,
}

/// Lazily yields the lines of one config source.
pub struct LineDecoder<R> {
    reader: R,
    source_id: String,
    line: usize,
    done: bool,
}

impl<R: BufRead> LineDecoder<R> {
    pub fn new(reader: R, source_id: impl Into<String>) -> Self {
        Self {
            reader,
            source_id: source_id.into(),
            line: 0,
            done: false,
        }
    }

    fn next_line(&mut self) -> Result<Option<Line>> {
        let mut buf = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| ConfigError::Io {
                source_id: self.source_id.clone(),
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let mut text = String::from_utf8(buf).map_err(|_| ConfigError::Encoding {
            source_id: self.source_id.clone(),
            line: self.line,
        })?;
        if self.line == 1
            && let Some(bom) = BOMS.iter().find(|bom| text.starts_with(**bom))
        {
            text.replace_range(..bom.len(), "");
        }

        Ok(Some(Line {
            number: self.line,
            text,
        }))
    }
}

impl<R: BufRead> Iterator for LineDecoder<R> {
    type Item = Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
