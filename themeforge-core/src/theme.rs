//! Theme Model - authored definitions and their canonical form

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub type ThemeId = String;

/// A theme as authored in one source file.
///
/// Attributes keep the order they were written in. Ordering is only imposed
/// by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeDefinition {
    pub id: ThemeId,
    pub origin: PathBuf,
    pub attributes: Vec<(String, SourceValue)>,
}

/// Attribute value as classified by the source loader.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Color(ColorLiteral),
    Text(String),
    Number(f64),
    /// A syntactically valid value of a kind the bundle format cannot carry.
    /// The payload names the kind (`boolean`, `null`, `gradient`, ...).
    Unsupported(String),
}

/// Color syntax before channel expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLiteral {
    /// `#rgb` / `#rgba`: one hex digit per channel.
    Nibbles { rgb: [u8; 3], alpha: Option<u8> },
    /// `#rrggbb` / `#rrggbbaa` or a `[r, g, b(, a)]` channel array.
    Bytes { rgb: [u8; 3], alpha: Option<u8> },
}

/// 8-bit-per-channel color. Alpha is present only when it was authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: Option<u8>,
}

impl Rgba {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: None }
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a: Some(a) }
    }

    /// Channel bytes in wire order: r, g, b, then a if present.
    pub fn channels(&self) -> Vec<u8> {
        let mut out = vec![self.r, self.g, self.b];
        out.extend(self.a);
        out
    }

    /// Lowercase `#rrggbb` or `#rrggbbaa`.
    pub fn to_hex(&self) -> String {
        self.channels().iter().fold(String::from("#"), |mut s, c| {
            s.push_str(&format!("{:02x}", c));
            s
        })
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Canonical attribute value. This is the closed set the bundle format carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    Color(Rgba),
    Text(String),
    Number(f64),
}

impl AttributeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Color(_) => "color",
            AttributeValue::Text(_) => "text",
            AttributeValue::Number(_) => "number",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Color(c) => write!(f, "{}", c),
            AttributeValue::Text(s) => write!(f, "{:?}", s),
            AttributeValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A theme in canonical form: keys in byte order, values canonicalized.
///
/// `origin` is diagnostic only and never encoded. Decoded themes have an
/// empty origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTheme {
    pub id: ThemeId,
    #[serde(skip)]
    pub origin: PathBuf,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl NormalizedTheme {
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}
