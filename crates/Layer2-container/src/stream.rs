//! Exec output decoding
//!
//! Docker multiplexes stdout/stderr of a non-tty exec session into frames:
//!
//! ```text
//! [stream: u8][0u8; 3][len: u32 BE][payload; len]
//! ```
//!
//! stream is 0 (stdin), 1 (stdout) or 2 (stderr). The decoder looks at the
//! first 8 buffered bytes to decide whether the session is framed at all;
//! unframed (tty or foreign runtime) output is kept verbatim as stdout.
//! A frame header that stops making sense mid-stream switches the decoder to
//! raw mode for everything that follows. Bytes are never dropped except for
//! stdin frames.

use ignite_foundation::{Error, Result};
use serde_json::Value;

/// Size of a frame header
pub const HEADER_LEN: usize = 8;

/// Stream id in a frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Fewer than 8 bytes seen so far
    Detecting,
    Multiplexed,
    Raw,
}

/// Fully decoded exec output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl DecodedOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

fn parse_header(buf: &[u8]) -> Option<(StreamKind, usize)> {
    let header = buf.get(..HEADER_LEN)?;
    let kind = StreamKind::from_byte(header[0])?;
    if header[1..4] != [0, 0, 0] {
        return None;
    }
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Some((kind, len as usize))
}

/// Incremental decoder for one exec session
#[derive(Debug)]
pub struct StreamDecoder {
    mode: DecodeMode,
    buffer: Vec<u8>,
    output: DecodedOutput,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            mode: DecodeMode::Detecting,
            buffer: Vec::new(),
            output: DecodedOutput::default(),
        }
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Feed bytes of unknown framing
    pub fn push(&mut self, chunk: &[u8]) {
        if self.mode == DecodeMode::Raw {
            self.output.stdout.extend_from_slice(chunk);
            return;
        }
        self.buffer.extend_from_slice(chunk);

        if self.mode == DecodeMode::Detecting {
            if self.buffer.len() < HEADER_LEN {
                return;
            }
            if parse_header(&self.buffer).is_some() {
                self.mode = DecodeMode::Multiplexed;
            } else {
                self.fall_back_to_raw();
                return;
            }
        }
        self.drain_frames();
    }

    /// Feed bytes the runtime client already attributed to a stream
    pub fn push_typed(&mut self, kind: StreamKind, bytes: &[u8]) {
        match kind {
            StreamKind::Stdout => self.output.stdout.extend_from_slice(bytes),
            StreamKind::Stderr => self.output.stderr.extend_from_slice(bytes),
            StreamKind::Stdin => {}
        }
    }

    fn drain_frames(&mut self) {
        let mut offset = 0;
        while self.buffer.len() - offset >= HEADER_LEN {
            let Some((kind, len)) = parse_header(&self.buffer[offset..]) else {
                self.buffer.drain(..offset);
                self.fall_back_to_raw();
                return;
            };
            let end = offset + HEADER_LEN + len;
            if self.buffer.len() < end {
                break;
            }
            let payload = &self.buffer[offset + HEADER_LEN..end];
            match kind {
                StreamKind::Stdout => self.output.stdout.extend_from_slice(payload),
                StreamKind::Stderr => self.output.stderr.extend_from_slice(payload),
                StreamKind::Stdin => {}
            }
            offset = end;
        }
        self.buffer.drain(..offset);
    }

    fn fall_back_to_raw(&mut self) {
        self.mode = DecodeMode::Raw;
        let rest = std::mem::take(&mut self.buffer);
        self.output.stdout.extend_from_slice(&rest);
    }

    /// End of stream: flush whatever is still buffered
    ///
    /// A truncated frame keeps its payload on the stream its header names;
    /// anything shorter than a header is treated as raw stdout.
    pub fn finish(mut self) -> DecodedOutput {
        if !self.buffer.is_empty() {
            match (self.mode, parse_header(&self.buffer)) {
                (DecodeMode::Multiplexed, Some((kind, _))) => {
                    let payload = self.buffer.split_off(HEADER_LEN);
                    self.push_typed(kind, &payload);
                }
                _ => {
                    let rest = std::mem::take(&mut self.buffer);
                    self.output.stdout.extend_from_slice(&rest);
                }
            }
        }
        self.output
    }
}

/// Drop control characters: keep 32..=126 and everything from 160 up
pub fn clean_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| {
            let code = *c as u32;
            (32..=126).contains(&code) || code >= 160
        })
        .collect()
}

/// Locate and parse the JSON object in plugin stdout
///
/// Takes the span from the first `{` to the last `}` of the cleaned output.
pub fn extract_json_object(output: &DecodedOutput) -> Result<Value> {
    let cleaned = clean_output(&output.stdout);
    let stderr = output.stderr_text();

    let span = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => {
            return Err(Error::NoJsonFound {
                stdout: cleaned,
                stderr,
            })
        }
    };

    match serde_json::from_str::<Value>(span) {
        Ok(value) => Ok(value),
        Err(e) => Err(Error::JsonParse {
            message: e.to_string(),
            stdout: cleaned.clone(),
            stderr,
        }),
    }
}
