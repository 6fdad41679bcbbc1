//! Property-based tests for the build pipeline using proptest.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use themeforge_core::{
    assemble, decode, encode, AttributeValue, BuildConfig, BuildPipeline, CompiledBundle, NormalizedTheme, Rgba,
};

// ============================================================================
// Test helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Attr {
    Color([u8; 3], Option<u8>),
    Text(String),
    Number(f64),
}

type Themes = BTreeMap<String, BTreeMap<String, Attr>>;

impl Attr {
    /// Compact spelling: hex colors, bare strings and numbers.
    fn compact(&self) -> String {
        match self {
            Attr::Color([r, g, b], alpha) => {
                let mut hex = format!("#{:02x}{:02x}{:02x}", r, g, b);
                if let Some(a) = alpha {
                    hex.push_str(&format!("{:02x}", a));
                }
                json(&hex)
            }
            Attr::Text(s) => json(s),
            Attr::Number(n) => json(n),
        }
    }

    /// Verbose spelling of the same value: channel arrays and typed objects.
    fn verbose(&self) -> String {
        match self {
            Attr::Color([r, g, b], None) => format!("[{}, {}, {}]", r, g, b),
            Attr::Color([r, g, b], Some(a)) => format!("[ {}, {}, {}, {} ]", r, g, b, a),
            Attr::Text(s) => format!("{{\"text\": {}}}", json(s)),
            Attr::Number(n) => format!("{{ \"number\" : {} }}", json(n)),
        }
    }

    fn normalized(&self) -> AttributeValue {
        match self {
            Attr::Color([r, g, b], None) => AttributeValue::Color(Rgba::rgb(*r, *g, *b)),
            Attr::Color([r, g, b], Some(a)) => AttributeValue::Color(Rgba::rgba(*r, *g, *b, *a)),
            Attr::Text(s) => AttributeValue::Text(s.clone()),
            Attr::Number(n) => AttributeValue::Number(*n),
        }
    }
}

fn json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap()
}

fn attr_strategy() -> impl Strategy<Value = Attr> {
    prop_oneof![
        (any::<[u8; 3]>(), proptest::option::of(any::<u8>())).prop_map(|(rgb, a)| Attr::Color(rgb, a)),
        "[a-zA-Z0-9 ,.é]{0,12}".prop_map(Attr::Text),
        any::<i32>().prop_map(|n| Attr::Number(f64::from(n))),
        (-1.0e12f64..1.0e12f64).prop_map(Attr::Number),
    ]
}

fn themes_strategy() -> impl Strategy<Value = Themes> {
    prop::collection::btree_map(
        "[a-zA-Zé][a-z0-9é-]{0,8}",
        prop::collection::btree_map("[a-z][a-zA-Z0-9._]{0,10}", attr_strategy(), 0..6),
        1..6,
    )
}

fn source_text(id: &str, attrs: &BTreeMap<String, Attr>, verbose: bool) -> String {
    if verbose {
        let body: Vec<String> = attrs
            .iter()
            .rev()
            .map(|(k, v)| format!("    {} :  {}", json(k), v.verbose()))
            .collect();
        format!("{{\n  \"attributes\": {{\n{}\n  }},\n  \"id\": {}\n}}\n", body.join(",\n"), json(id))
    } else {
        let body: Vec<String> = attrs.iter().map(|(k, v)| format!("{}:{}", json(k), v.compact())).collect();
        format!("{{\"id\":{},\"attributes\":{{{}}}}}", json(id), body.join(","))
    }
}

fn compile(root: &Path, files: &[(PathBuf, String)], jobs: usize) -> CompiledBundle {
    for (rel, content) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    let mut config = BuildConfig::new(root, root.join("unused.bin"));
    config.jobs = jobs;
    BuildPipeline::new(config).compile().unwrap()
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// File names, directory layout, discovery order, key order and value
    /// spelling never change the encoded bytes.
    #[test]
    fn layout_and_spelling_do_not_change_bytes(
        (themes, order) in themes_strategy().prop_flat_map(|themes| {
            let ids: Vec<String> = themes.keys().cloned().collect();
            (Just(themes), Just(ids).prop_shuffle())
        }),
        jobs in 1usize..4,
    ) {
        let plain: Vec<_> = themes
            .iter()
            .enumerate()
            .map(|(i, (id, attrs))| (PathBuf::from(format!("t{}.json", i)), source_text(id, attrs, false)))
            .collect();
        let scattered: Vec<_> = order
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let rel = PathBuf::from(format!("g{}/{:03}-theme.json", i % 3, 999 - i));
                (rel, source_text(id, &themes[id], true))
            })
            .collect();

        let a_dir = tempdir().unwrap();
        let b_dir = tempdir().unwrap();
        let a = compile(a_dir.path(), &plain, 1);
        let b = compile(b_dir.path(), &scattered, jobs);

        prop_assert_eq!(&a.encoded, &b.encoded);
        prop_assert_eq!(&a.manifest, &b.manifest);
        let ids: Vec<_> = a.bundle.ids().map(str::to_string).collect();
        prop_assert_eq!(ids, themes.keys().cloned().collect::<Vec<_>>());
    }

    /// Decoding and re-encoding a built artifact reproduces it exactly.
    #[test]
    fn built_artifact_survives_decode_and_encode(themes in themes_strategy()) {
        let files: Vec<_> = themes
            .iter()
            .map(|(id, attrs)| (PathBuf::from(format!("{}.json", id)), source_text(id, attrs, false)))
            .collect();
        let dir = tempdir().unwrap();
        let compiled = compile(dir.path(), &files, 1);

        let bytes = compiled.encoded.as_bytes();
        let decoded = decode(bytes).unwrap();
        let reencoded = encode(&decoded).unwrap();
        prop_assert_eq!(reencoded.as_bytes(), bytes);
        for (back, built) in decoded.themes.iter().zip(&compiled.bundle.themes) {
            prop_assert_eq!(&back.id, &built.id);
            prop_assert_eq!(&back.attributes, &built.attributes);
        }
    }

    /// Any assembled bundle round trips, including values that never come
    /// from source text such as negative zero.
    #[test]
    fn assembled_bundle_round_trips(
        themes in themes_strategy(),
        extra in prop_oneof![Just(-0.0f64), Just(f64::MIN_POSITIVE), Just(f64::MAX), any::<f64>()],
    ) {
        prop_assume!(extra.is_finite());
        let normalized: Vec<NormalizedTheme> = themes
            .iter()
            .rev()
            .map(|(id, attrs)| {
                let mut attributes: BTreeMap<String, AttributeValue> =
                    attrs.iter().map(|(k, v)| (k.clone(), v.normalized())).collect();
                attributes.insert("zz.extra".to_string(), AttributeValue::Number(extra));
                NormalizedTheme { id: id.clone(), origin: PathBuf::from(id), attributes }
            })
            .collect();
        let bundle = assemble(Path::new("themes"), normalized).unwrap();

        let first = encode(&bundle).unwrap();
        let second = encode(&decode(first.as_bytes()).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }
}
