//! Binary Codec - fixed, versioned bundle layout
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! header    magic "THMB" | version u16 | reserved u16 = 0 | theme_count u32
//! theme     id_len u16 | id | attr_count u32 | attribute*
//! attribute key_len u16 | key | tag u8 | value_len u32 | value
//! trailer   sha256 of every preceding byte (32 bytes)
//! ```
//!
//! Value tags: 1 color (3 or 4 channel bytes), 2 text (UTF-8),
//! 3 number (f64 bits).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::bundle::{ThemeBundle, FORMAT_VERSION};
use crate::error::{BuildError, Result};
use crate::hashing::{sha256, sha256_hex, DIGEST_LEN};
use crate::normalize::canonical_number;
use crate::theme::{AttributeValue, NormalizedTheme, Rgba};

pub const MAGIC: [u8; 4] = *b"THMB";
pub const HEADER_LEN: usize = 12;

pub const MAX_ID_LEN: usize = u16::MAX as usize;
pub const MAX_KEY_LEN: usize = u16::MAX as usize;
pub const MAX_COUNT: usize = u32::MAX as usize;
pub const MAX_TEXT_LEN: usize = u32::MAX as usize;

const TAG_COLOR: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_NUMBER: u8 = 3;

/// Encoded bundle bytes, trailer included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBundle {
    bytes: Vec<u8>,
}

impl EncodedBundle {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the whole artifact.
    pub fn sha256_hex(&self) -> String {
        sha256_hex(&self.bytes)
    }
}

/// Encode a bundle. Fails before producing any bytes unless the bundle has
/// the current format version and non-empty ids in strictly ascending byte
/// order, which is what [`assemble`](crate::assemble) and [`decode`] yield.
pub fn encode(bundle: &ThemeBundle) -> Result<EncodedBundle> {
    check_canonical(bundle)?;

    let mut out = Vec::with_capacity(HEADER_LEN + DIGEST_LEN);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&bundle.format_version.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    put_count(&mut out, "theme count", bundle.themes.len())?;

    for theme in &bundle.themes {
        put_short_str(&mut out, "theme id", &theme.id, MAX_ID_LEN)?;
        put_count(
            &mut out,
            &format!("attribute count of theme '{}'", theme.id),
            theme.attributes.len(),
        )?;
        for (key, value) in &theme.attributes {
            put_short_str(&mut out, "attribute key", key, MAX_KEY_LEN)?;
            put_value(&mut out, &theme.id, key, value)?;
        }
    }

    let digest = sha256(&out);
    out.extend_from_slice(&digest);
    Ok(EncodedBundle { bytes: out })
}

fn check_canonical(bundle: &ThemeBundle) -> Result<()> {
    if bundle.format_version != FORMAT_VERSION {
        return Err(BuildError::InvalidBundle(format!(
            "format version {} cannot be encoded, expected {}",
            bundle.format_version, FORMAT_VERSION
        )));
    }
    let mut prev: Option<&str> = None;
    for id in bundle.ids() {
        if id.is_empty() {
            return Err(BuildError::InvalidBundle("empty theme id".into()));
        }
        if let Some(prev) = prev {
            if prev.as_bytes() >= id.as_bytes() {
                return Err(BuildError::InvalidBundle(format!(
                    "theme '{}' out of order after '{}'",
                    id, prev
                )));
            }
        }
        prev = Some(id);
    }
    Ok(())
}

fn put_count(out: &mut Vec<u8>, what: &str, count: usize) -> Result<()> {
    let n = u32::try_from(count).map_err(|_| limit(what, count, MAX_COUNT))?;
    out.extend_from_slice(&n.to_be_bytes());
    Ok(())
}

fn put_short_str(out: &mut Vec<u8>, what: &str, s: &str, max: usize) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| limit(&format!("{} '{}…'", what, prefix(s)), s.len(), max))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_value(out: &mut Vec<u8>, theme: &str, key: &str, value: &AttributeValue) -> Result<()> {
    match value {
        AttributeValue::Color(c) => put_tagged(out, TAG_COLOR, &c.channels()),
        AttributeValue::Text(s) => {
            if s.len() > MAX_TEXT_LEN {
                return Err(limit(
                    &format!("text of '{}' in theme '{}'", key, theme),
                    s.len(),
                    MAX_TEXT_LEN,
                ));
            }
            put_tagged(out, TAG_TEXT, s.as_bytes())
        }
        AttributeValue::Number(n) => {
            let n = canonical_number(*n).ok_or_else(|| BuildError::UnsupportedValue {
                theme: theme.to_string(),
                key: key.to_string(),
                kind: format!("non-finite number {}", n),
            })?;
            put_tagged(out, TAG_NUMBER, &n.to_bits().to_be_bytes())
        }
    }
    Ok(())
}

fn put_tagged(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    // Callers bound payload length to MAX_TEXT_LEN.
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

fn limit(what: &str, len: usize, max: usize) -> BuildError {
    BuildError::EncodingLimit {
        what: what.to_string(),
        len: len as u64,
        max: max as u64,
    }
}

fn prefix(s: &str) -> &str {
    let mut end = s.len().min(32);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Inverse of [`encode`].
///
/// Only canonical bundles are accepted, so any bundle this returns encodes
/// back to exactly `bytes`.
pub fn decode(bytes: &[u8]) -> Result<ThemeBundle> {
    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(corrupt(format!("{} bytes is shorter than header and trailer", bytes.len())));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - DIGEST_LEN);
    if sha256(body).as_slice() != trailer {
        return Err(corrupt("digest mismatch"));
    }

    let mut r = Reader::new(body);
    if r.take(MAGIC.len())? != MAGIC.as_slice() {
        return Err(corrupt("bad magic"));
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {}, expected {}",
            version, FORMAT_VERSION
        )));
    }
    if r.u16()? != 0 {
        return Err(corrupt("reserved header bytes are not zero"));
    }

    let theme_count = r.u32()? as usize;
    let mut themes: Vec<NormalizedTheme> = Vec::new();
    for _ in 0..theme_count {
        let id = r.short_str()?;
        if id.is_empty() {
            return Err(corrupt("empty theme id"));
        }
        if let Some(prev) = themes.last() {
            if prev.id.as_bytes() >= id.as_bytes() {
                return Err(corrupt(format!("theme '{}' out of order after '{}'", id, prev.id)));
            }
        }

        let attr_count = r.u32()? as usize;
        let mut attributes = BTreeMap::new();
        let mut last_key: Option<String> = None;
        for _ in 0..attr_count {
            let key = r.short_str()?;
            if let Some(prev) = &last_key {
                if prev.as_bytes() >= key.as_bytes() {
                    return Err(corrupt(format!(
                        "attribute '{}' out of order in theme '{}'",
                        key, id
                    )));
                }
            }
            let value = r.value(&id, &key)?;
            last_key = Some(key.clone());
            attributes.insert(key, value);
        }

        themes.push(NormalizedTheme {
            id,
            origin: PathBuf::new(),
            attributes,
        });
    }

    if !r.is_empty() {
        return Err(corrupt(format!("{} trailing bytes before digest", r.remaining())));
    }

    Ok(ThemeBundle {
        format_version: version,
        themes,
    })
}

fn corrupt(msg: impl Into<String>) -> BuildError {
    BuildError::CorruptBundle(msg.into())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(corrupt(format!(
                "truncated at offset {}: need {} bytes, have {}",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn utf8(&mut self, len: usize) -> Result<String> {
        let at = self.pos;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| corrupt(format!("invalid UTF-8 at offset {}", at)))
    }

    fn short_str(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        self.utf8(len)
    }

    fn value(&mut self, theme: &str, key: &str) -> Result<AttributeValue> {
        let tag = self.u8()?;
        let len = self.u32()? as usize;
        match (tag, len) {
            (TAG_COLOR, 3) => {
                let [r, g, b] = self.array()?;
                Ok(AttributeValue::Color(Rgba::rgb(r, g, b)))
            }
            (TAG_COLOR, 4) => {
                let [r, g, b, a] = self.array()?;
                Ok(AttributeValue::Color(Rgba::rgba(r, g, b, a)))
            }
            (TAG_TEXT, _) => Ok(AttributeValue::Text(self.utf8(len)?)),
            (TAG_NUMBER, 8) => {
                let n = f64::from_bits(u64::from_be_bytes(self.array()?));
                match canonical_number(n) {
                    Some(c) if c.to_bits() == n.to_bits() => Ok(AttributeValue::Number(n)),
                    _ => Err(corrupt(format!(
                        "non-canonical number {} for '{}' in theme '{}'",
                        n, key, theme
                    ))),
                }
            }
            (TAG_COLOR, _) | (TAG_NUMBER, _) => Err(corrupt(format!(
                "value of '{}' in theme '{}' has tag {} with bad length {}",
                key, theme, tag, len
            ))),
            _ => Err(corrupt(format!(
                "unknown value tag {} for '{}' in theme '{}'",
                tag, key, theme
            ))),
        }
    }
}
