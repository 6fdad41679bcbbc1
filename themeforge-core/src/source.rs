//! Source Loader - discovers and parses theme definition files

use rayon::prelude::*;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::bundle::reject_duplicate_ids;
use crate::error::{BuildError, Result};
use crate::theme::{ColorLiteral, SourceValue, ThemeDefinition};
use crate::BUILDER_VERSION;

/// On-disk shape of a theme source file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThemeFile {
    id: String,
    #[serde(default)]
    min_builder_version: Option<String>,
    attributes: AttributeEntries,
}

/// Attribute map in authored order. A key repeated within one file is an
/// error rather than last-wins.
#[derive(Debug)]
struct AttributeEntries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for AttributeEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = AttributeEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of attribute names to values")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut seen = HashSet::new();
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!(
                            "duplicate attribute '{}'",
                            key
                        )));
                    }
                    entries.push((key, value));
                }
                Ok(AttributeEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Discovers theme sources below a root directory and parses them.
pub struct SourceLoader {
    root: PathBuf,
    extension: String,
    jobs: usize,
}

impl SourceLoader {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            jobs: 1,
        }
    }

    /// Parse on a pool of `jobs` threads. `0` and `1` both mean sequential.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All source files below the root, sorted by path.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut paths = vec![];
        self.collect_sources(&self.root, &mut paths)?;
        paths.sort();
        info!(root = %self.root.display(), files = paths.len(), "discovered theme sources");
        Ok(paths)
    }

    /// Load every discovered source.
    ///
    /// The result is sorted by id and free of duplicate ids. When several
    /// files fail, the error reported is the one for the first path in
    /// sorted order, whether or not parsing ran in parallel.
    pub fn load(&self) -> Result<Vec<ThemeDefinition>> {
        let paths = self.discover()?;

        let parsed: Vec<Result<ThemeDefinition>> = if self.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|e| BuildError::WorkerPool(e.to_string()))?;
            pool.install(|| paths.par_iter().map(|p| load_source(p)).collect())
        } else {
            paths.iter().map(|p| load_source(p)).collect()
        };

        let mut definitions = parsed.into_iter().collect::<Result<Vec<_>>>()?;
        definitions.sort_by(|a, b| a.id.as_bytes().cmp(b.id.as_bytes()));
        reject_duplicate_ids(
            definitions
                .iter()
                .map(|d| (d.id.as_str(), d.origin.as_path())),
        )?;

        Ok(definitions)
    }

    fn collect_sources(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BuildError::io(dir, e))?;
            let path = entry.path();

            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let file_type = entry.file_type().map_err(|e| BuildError::io(&path, e))?;
            if file_type.is_dir() {
                self.collect_sources(&path, out)?;
            } else if !self.has_source_extension(&path) {
                warn!(path = %path.display(), "skipping non-source file");
            } else if file_type.is_symlink() && path.is_dir() {
                warn!(path = %path.display(), "skipping symlinked directory");
            } else {
                debug!(path = %path.display(), "found theme source");
                out.push(path);
            }
        }
        Ok(())
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .map_or(false, |e| e == self.extension.as_str())
    }
}

/// Read and parse one source file.
pub fn load_source(path: &Path) -> Result<ThemeDefinition> {
    let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
    let content = String::from_utf8(bytes)
        .map_err(|e| BuildError::parse(path, format!("not valid UTF-8: {}", e.utf8_error())))?;
    let definition = parse_source(path, &content)?;
    debug!(
        path = %path.display(),
        id = %definition.id,
        attributes = definition.attributes.len(),
        "parsed theme source"
    );
    Ok(definition)
}

/// Parse source text. `path` is used for diagnostics and recorded as the
/// definition's origin.
pub fn parse_source(path: &Path, content: &str) -> Result<ThemeDefinition> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let file: ThemeFile =
        serde_json::from_str(content).map_err(|e| BuildError::parse(path, e.to_string()))?;

    validate_id(&file.id).map_err(|reason| BuildError::parse(path, reason))?;

    if let Some(required) = &file.min_builder_version {
        check_builder_version(path, required)?;
    }

    let mut attributes = Vec::with_capacity(file.attributes.0.len());
    for (key, value) in file.attributes.0 {
        if key.is_empty() {
            return Err(BuildError::parse(path, "attribute names must not be empty"));
        }
        let value = classify_value(value)
            .map_err(|reason| BuildError::parse(path, format!("attribute '{}': {}", key, reason)))?;
        attributes.push((key, value));
    }

    Ok(ThemeDefinition {
        id: file.id,
        origin: path.to_path_buf(),
        attributes,
    })
}

fn validate_id(id: &str) -> std::result::Result<(), String> {
    if id.is_empty() {
        return Err("id must not be empty".to_string());
    }
    if id.trim() != id {
        return Err(format!("id '{}' has leading or trailing whitespace", id));
    }
    if id.chars().any(char::is_control) {
        return Err(format!("id {:?} contains control characters", id));
    }
    Ok(())
}

fn check_builder_version(path: &Path, required: &str) -> Result<()> {
    let min_ver = semver::Version::parse(required).map_err(|e| {
        BuildError::parse(path, format!("invalid minBuilderVersion '{}': {}", required, e))
    })?;
    let builder_ver = semver::Version::parse(BUILDER_VERSION)
        .map_err(|e| BuildError::parse(path, format!("invalid builder version: {}", e)))?;

    if builder_ver < min_ver {
        return Err(BuildError::BuilderVersionMismatch {
            path: path.to_path_buf(),
            required: required.to_string(),
            current: BUILDER_VERSION.to_string(),
        });
    }
    Ok(())
}

fn classify_value(value: Value) -> std::result::Result<SourceValue, String> {
    match value {
        Value::String(s) => match s.strip_prefix('#') {
            Some(digits) => parse_hex(digits).map(SourceValue::Color),
            None => Ok(SourceValue::Text(s)),
        },
        Value::Number(n) => parse_number(&n).map(SourceValue::Number),
        Value::Array(items) => parse_channels(&items).map(SourceValue::Color),
        Value::Object(map) => {
            if map.len() != 1 {
                return Err(format!(
                    "typed value must have exactly one key, found {}",
                    map.len()
                ));
            }
            let Some((kind, inner)) = map.into_iter().next() else {
                return Err("typed value must have exactly one key".to_string());
            };
            match (kind.as_str(), inner) {
                ("color", Value::String(s)) => match s.strip_prefix('#') {
                    Some(digits) => parse_hex(digits).map(SourceValue::Color),
                    None => Err(format!("color '{}' must start with '#'", s)),
                },
                ("color", Value::Array(items)) => parse_channels(&items).map(SourceValue::Color),
                ("color", _) => Err("`color` expects a hex string or channel array".to_string()),
                ("text", Value::String(s)) => Ok(SourceValue::Text(s)),
                ("text", _) => Err("`text` expects a string".to_string()),
                ("number", Value::Number(n)) => parse_number(&n).map(SourceValue::Number),
                ("number", _) => Err("`number` expects a number".to_string()),
                (other, _) => Ok(SourceValue::Unsupported(other.to_string())),
            }
        }
        Value::Bool(_) => Ok(SourceValue::Unsupported("boolean".to_string())),
        Value::Null => Ok(SourceValue::Unsupported("null".to_string())),
    }
}

/// Integers must survive the trip through `f64` unchanged.
fn parse_number(n: &serde_json::Number) -> std::result::Result<f64, String> {
    let exact = if let Some(u) = n.as_u64() {
        // `as u64` saturates, so 2^64 would otherwise pass for u64::MAX.
        let f = u as f64;
        (f < 18_446_744_073_709_551_616.0 && f as u64 == u).then_some(f)
    } else if let Some(i) = n.as_i64() {
        let f = i as f64;
        (f as i64 == i).then_some(f)
    } else {
        n.as_f64().filter(|f| f.is_finite())
    };
    exact.ok_or_else(|| format!("number {} is not exactly representable", n))
}

fn parse_hex(digits: &str) -> std::result::Result<ColorLiteral, String> {
    let nibbles = digits
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| format!("color '#{}' contains non-hex characters", digits))?;

    let byte = |hi: u8, lo: u8| (hi << 4) | lo;
    match nibbles.as_slice() {
        &[r, g, b] => Ok(ColorLiteral::Nibbles { rgb: [r, g, b], alpha: None }),
        &[r, g, b, a] => Ok(ColorLiteral::Nibbles { rgb: [r, g, b], alpha: Some(a) }),
        &[r1, r2, g1, g2, b1, b2] => Ok(ColorLiteral::Bytes {
            rgb: [byte(r1, r2), byte(g1, g2), byte(b1, b2)],
            alpha: None,
        }),
        &[r1, r2, g1, g2, b1, b2, a1, a2] => Ok(ColorLiteral::Bytes {
            rgb: [byte(r1, r2), byte(g1, g2), byte(b1, b2)],
            alpha: Some(byte(a1, a2)),
        }),
        _ => Err(format!(
            "color '#{}' must have 3, 4, 6 or 8 hex digits",
            digits
        )),
    }
}

fn parse_channels(items: &[Value]) -> std::result::Result<ColorLiteral, String> {
    let channels = items
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| "color channels must be integers in 0..=255".to_string())?;

    match channels.as_slice() {
        &[r, g, b] => Ok(ColorLiteral::Bytes { rgb: [r, g, b], alpha: None }),
        &[r, g, b, a] => Ok(ColorLiteral::Bytes { rgb: [r, g, b], alpha: Some(a) }),
        other => Err(format!(
            "color channel array must have 3 or 4 entries, found {}",
            other.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<ThemeDefinition> {
        parse_source(Path::new("themes/test.json"), content)
    }

    #[test]
    fn test_parse_keeps_authored_order() {
        let def = parse(r##"{"id": "dark", "attributes": {"z": "#000", "a": "Fira", "m": 13}}"##).unwrap();
        assert_eq!(def.id, "dark");
        let keys: Vec<_> = def.attributes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(def.origin, PathBuf::from("themes/test.json"));
    }

    #[test]
    fn test_value_classification() {
        let def = parse(
            r##"{"id": "t", "attributes": {
                "hex": "#0a0B0c",
                "short": "#fff8",
                "channels": [1, 2, 3],
                "text": "plain",
                "num": 1.5,
                "forced": {"text": "#topic"},
                "boxed": {"color": [9, 8, 7, 6]},
                "flag": true,
                "grad": {"gradient": ["#000", "#fff"]}
            }}"##,
        )
        .unwrap();
        let v: Vec<_> = def.attributes.into_iter().map(|(_, v)| v).collect();
        assert_eq!(v[0], SourceValue::Color(ColorLiteral::Bytes { rgb: [10, 11, 12], alpha: None }));
        assert_eq!(v[1], SourceValue::Color(ColorLiteral::Nibbles { rgb: [15, 15, 15], alpha: Some(8) }));
        assert_eq!(v[2], SourceValue::Color(ColorLiteral::Bytes { rgb: [1, 2, 3], alpha: None }));
        assert_eq!(v[3], SourceValue::Text("plain".into()));
        assert_eq!(v[4], SourceValue::Number(1.5));
        assert_eq!(v[5], SourceValue::Text("#topic".into()));
        assert_eq!(v[6], SourceValue::Color(ColorLiteral::Bytes { rgb: [9, 8, 7], alpha: Some(6) }));
        assert_eq!(v[7], SourceValue::Unsupported("boolean".into()));
        assert_eq!(v[8], SourceValue::Unsupported("gradient".into()));
    }

    #[test]
    fn test_missing_id_is_parse_error() {
        let err = parse(r#"{"attributes": {}}"#).unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
        assert!(err.to_string().contains("themes/test.json"));
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = parse(r#"{"id": "", "attributes": {}}"#).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_padded_id_rejected() {
        let err = parse(r#"{"id": " dark", "attributes": {}}"#).unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let err = parse(r##"{"id": "t", "attributes": {"bg": "#000", "bg": "#fff"}}"##).unwrap_err();
        assert!(err.to_string().contains("duplicate attribute 'bg'"));
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let err = parse(r#"{"id": "t", "attributes": {}, "colour": 1}"#).unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
    }

    #[test]
    fn test_malformed_colors_rejected() {
        for bad in [r##""#12""##, r##""#12345""##, r##""#zzz""##, "[1, 2]", "[1, 2, 300]", "[1.5, 2, 3]"] {
            let src = format!(r#"{{"id": "t", "attributes": {{"c": {}}}}}"#, bad);
            let err = parse(&src).unwrap_err();
            assert!(matches!(err, BuildError::Parse { .. }), "{} should fail", bad);
            assert!(err.to_string().contains("attribute 'c'"));
        }
    }

    #[test]
    fn test_ambiguous_typed_object_rejected() {
        let err = parse(r#"{"id": "t", "attributes": {"c": {"text": "a", "number": 1}}}"#).unwrap_err();
        assert!(err.to_string().contains("exactly one key"));
    }

    #[test]
    fn test_byte_order_mark_ignored() {
        let def = parse("\u{feff}{\"id\": \"t\", \"attributes\": {}}").unwrap();
        assert_eq!(def.id, "t");
    }

    #[test]
    fn test_builder_version_gate() {
        assert!(parse(r#"{"id": "t", "minBuilderVersion": "0.1.0", "attributes": {}}"#).is_ok());

        let err = parse(r#"{"id": "t", "minBuilderVersion": "99.0.0", "attributes": {}}"#).unwrap_err();
        assert!(matches!(err, BuildError::BuilderVersionMismatch { .. }));

        let err = parse(r#"{"id": "t", "minBuilderVersion": "soon", "attributes": {}}"#).unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
    }

    #[test]
    fn test_integers_beyond_f64_precision_rejected() {
        let ok = parse(r#"{"id": "t", "attributes": {"n": 9007199254740992, "m": -9007199254740992}}"#).unwrap();
        assert!(matches!(ok.attributes[0].1, SourceValue::Number(n) if n == 9007199254740992.0));
        assert!(matches!(ok.attributes[1].1, SourceValue::Number(n) if n == -9007199254740992.0));

        for bad in ["9007199254740993", "-9007199254740993", "18446744073709551615"] {
            let src = format!(r#"{{"id": "t", "attributes": {{"n": {}}}}}"#, bad);
            let err = parse(&src).unwrap_err();
            assert!(matches!(err, BuildError::Parse { .. }), "{} should fail", bad);
            assert!(err.to_string().contains("not exactly representable"), "{}", err);
        }

        let typed = parse(r#"{"id": "t", "attributes": {"n": {"number": 9007199254740993}}}"#).unwrap_err();
        assert!(typed.to_string().contains("not exactly representable"));
    }

    #[test]
    fn test_non_utf8_source_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{\"id\": \"t\", \"attributes\": {\"font\": \"\xff\xfe\"}}").unwrap();

        let err = load_source(&path).unwrap_err();
        match &err {
            BuildError::Parse { path: at, reason } => {
                assert_eq!(at, &path);
                assert!(reason.contains("not valid UTF-8"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
