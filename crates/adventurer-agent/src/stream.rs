//! Parser for the line-delimited generation stream.
//!
//! Every non-blank line is one record, usually wrapped in an extra pair of
//! double quotes (`"{...}"`). A record carries either a `generated_text`
//! fragment or an `error`.

use serde::Deserialize;

use crate::error::BackendError;

#[derive(Debug, Deserialize)]
struct StreamRecord {
    generated_text: Option<String>,
    error: Option<String>,
}

/// Parse one line. `Ok(None)` for blank lines and records without text.
pub fn parse_line(line: &str) -> Result<Option<String>, BackendError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let body = line
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(line);

    let record: StreamRecord = serde_json::from_str(body)
        .map_err(|e| BackendError::Parse(format!("{e} in stream record: {line}")))?;

    if let Some(text) = record.generated_text {
        return Ok(Some(text));
    }
    if let Some(err) = record.error {
        return Err(BackendError::Protocol(err));
    }
    Ok(None)
}

/// Accumulates network chunks into a single reply string.
///
/// Lines may be split across chunks (even inside a UTF-8 sequence); bytes
/// are buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    pending: Vec<u8>,
    text: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk. An `error` record aborts immediately.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), BackendError> {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume(&line[..line.len() - 1])?;
        }
        Ok(())
    }

    /// Flush a trailing unterminated line and return the reply.
    pub fn finish(mut self) -> Result<String, BackendError> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.consume(&rest)?;
        }
        Ok(self.text)
    }

    fn consume(&mut self, raw: &[u8]) -> Result<(), BackendError> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| BackendError::Parse(format!("stream line is not UTF-8: {e}")))?;
        if let Some(fragment) = parse_line(line)? {
            self.text.push_str(&fragment);
        }
        Ok(())
    }
}
