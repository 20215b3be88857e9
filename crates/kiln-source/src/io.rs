use kiln_platform::Platform;
use kiln_types::{BlobRef, ContentHash, KeyHash};
use tracing::warn;

use crate::change::{Change, ChangeOp};
use crate::error::{SourceError, SourceResult};
use crate::log::ChangeLog;

/// Serialized encoding of a change log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceFormat {
    /// Line-oriented ASCII: one record per line,
    /// `<timestamp> <key> <platform> <op> [fields]`.
    #[default]
    Text,
    /// Fixed-width little-endian fields with length-prefixed values.
    Binary,
}

/// Leading bytes of the binary encoding. The NUL byte is what the reader
/// sniffs for: the text encoding always starts with an ASCII digit.
const BINARY_MAGIC: &[u8; 4] = b"\0KLN";

const OP_UNSET: u8 = 0;
const OP_VALUE: u8 = 1;
const OP_BLOB: u8 = 2;

/// Serialize a change log.
///
/// The returned byte sequence is also the input to the content hash: the
/// `.hash` sibling file stores [`content_hash`] of exactly these bytes.
pub fn serialize(log: &ChangeLog, format: SourceFormat) -> Vec<u8> {
    match format {
        SourceFormat::Text => serialize_text(log),
        SourceFormat::Binary => serialize_binary(log),
    }
}

/// Content hash of a serialized change log.
pub fn content_hash(serialized: &[u8]) -> ContentHash {
    ContentHash::of(serialized)
}

/// Deserialize a change log, sniffing the encoding from the leading bytes.
pub fn deserialize(data: &[u8]) -> SourceResult<ChangeLog> {
    if data.starts_with(BINARY_MAGIC) {
        let mut log = deserialize_binary(&data[BINARY_MAGIC.len()..])?;
        log.set_read_binary(true);
        Ok(log)
    } else {
        deserialize_text(data)
    }
}

fn serialize_text(log: &ChangeLog) -> Vec<u8> {
    use std::fmt::Write;

    let mut out = String::new();
    for change in log {
        let _ = write!(
            out,
            "{} {} {:x}",
            change.timestamp,
            change.key,
            change.platform.bits()
        );
        match &change.op {
            ChangeOp::Value(value) => {
                out.push_str(" = ");
                escape_into(value, &mut out);
            }
            ChangeOp::Unset => out.push_str(" -"),
            ChangeOp::Blob(blob) => {
                let _ = write!(out, " # {:x} {}", blob.checksum, blob.size);
            }
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn deserialize_text(data: &[u8]) -> SourceResult<ChangeLog> {
    let text = std::str::from_utf8(data).map_err(|e| SourceError::Malformed {
        offset: e.valid_up_to(),
        reason: "source is not valid UTF-8".into(),
    })?;

    let mut log = ChangeLog::new();
    let mut offset = 0;
    for line in text.lines() {
        let line_offset = offset;
        offset += line.len() + 1;
        if line.is_empty() {
            continue;
        }
        let change = parse_text_record(line).map_err(|reason| SourceError::Malformed {
            offset: line_offset,
            reason,
        })?;
        log.push(change);
    }
    Ok(log)
}

fn parse_text_record(line: &str) -> Result<Change, String> {
    let mut fields = line.splitn(4, ' ');
    let timestamp = fields
        .next()
        .ok_or("missing timestamp")?
        .parse::<u64>()
        .map_err(|e| format!("bad timestamp: {e}"))?;
    let key = KeyHash::from_hex(fields.next().ok_or("missing key")?)
        .map_err(|e| format!("bad key: {e}"))?;
    let platform = u64::from_str_radix(fields.next().ok_or("missing platform")?, 16)
        .map(Platform::from_bits)
        .map_err(|e| format!("bad platform: {e}"))?;
    let rest = fields.next().ok_or("missing op")?;
    if rest.is_empty() {
        return Err("missing op".into());
    }

    let op = match rest.as_bytes()[0] {
        b'=' => {
            let value = rest.strip_prefix("= ").or_else(|| rest.strip_prefix('='));
            ChangeOp::Value(unescape(value.ok_or("bad value payload")?))
        }
        b'-' => ChangeOp::Unset,
        b'#' => {
            let mut blob_fields = rest[1..].split_ascii_whitespace();
            let checksum =
                u64::from_str_radix(blob_fields.next().ok_or("missing blob checksum")?, 16)
                    .map_err(|e| format!("bad blob checksum: {e}"))?;
            let size = blob_fields
                .next()
                .ok_or("missing blob size")?
                .parse::<u64>()
                .map_err(|e| format!("bad blob size: {e}"))?;
            ChangeOp::Blob(BlobRef::new(checksum, size))
        }
        other => return Err(format!("unknown op '{}'", other as char)),
    };

    Ok(Change {
        timestamp,
        key,
        platform,
        op,
    })
}

/// Values are stored one per line, so embedded newlines (and the escape
/// character itself) are escaped.
fn escape_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                warn!(escape = %other, "unknown escape in source value");
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn serialize_binary(log: &ChangeLog) -> Vec<u8> {
    let mut out = Vec::with_capacity(BINARY_MAGIC.len() + log.len() * 32);
    out.extend_from_slice(BINARY_MAGIC);
    for change in log {
        out.extend_from_slice(&change.timestamp.to_le_bytes());
        out.extend_from_slice(&change.key.raw().to_le_bytes());
        out.extend_from_slice(&change.platform.bits().to_le_bytes());
        match &change.op {
            ChangeOp::Value(value) => {
                out.push(OP_VALUE);
                out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                out.extend_from_slice(value.as_bytes());
            }
            ChangeOp::Unset => out.push(OP_UNSET),
            ChangeOp::Blob(blob) => {
                out.push(OP_BLOB);
                out.extend_from_slice(&blob.checksum.to_le_bytes());
                out.extend_from_slice(&blob.size.to_le_bytes());
            }
        }
    }
    out
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, count: usize) -> SourceResult<&'a [u8]> {
        if self.offset + count > self.data.len() {
            return Err(SourceError::Truncated {
                offset: self.offset,
            });
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn u64(&mut self) -> SourceResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> SourceResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u8(&mut self) -> SourceResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn done(&self) -> bool {
        self.offset == self.data.len()
    }
}

fn deserialize_binary(data: &[u8]) -> SourceResult<ChangeLog> {
    let mut cursor = Cursor { data, offset: 0 };
    let mut log = ChangeLog::new();
    while !cursor.done() {
        let timestamp = cursor.u64()?;
        let key = KeyHash::from_raw(cursor.u64()?);
        let platform = Platform::from_bits(cursor.u64()?);
        let op = match cursor.u8()? {
            OP_VALUE => {
                let length = cursor.u32()? as usize;
                let bytes = cursor.take(length)?;
                let value =
                    std::str::from_utf8(bytes).map_err(|_| SourceError::Malformed {
                        offset: cursor.offset,
                        reason: "value is not valid UTF-8".into(),
                    })?;
                ChangeOp::Value(value.to_owned())
            }
            OP_UNSET => ChangeOp::Unset,
            OP_BLOB => {
                let checksum = cursor.u64()?;
                let size = cursor.u64()?;
                ChangeOp::Blob(BlobRef::new(checksum, size))
            }
            other => {
                return Err(SourceError::Malformed {
                    offset: cursor.offset,
                    reason: format!("unknown op tag {other}"),
                })
            }
        };
        log.push(Change {
            timestamp,
            key,
            platform,
            op,
        });
    }
    Ok(log)
}
