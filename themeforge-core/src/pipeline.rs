//! Compilation Pipeline - Single Entry Point
//!
//! Loader -> Normalizer -> Assembler -> Encoder -> Writer. Every stage gets
//! its input passed in; nothing is kept between runs. If any stage fails
//! nothing is written.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::bundle::{assemble, ThemeBundle};
use crate::codec::{encode, EncodedBundle};
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::hashing::{canonical_json, compute_manifest_hash, compute_theme_hash};
use crate::normalize::normalize;
use crate::source::SourceLoader;
use crate::writer::{stage, verify, Verification};
use crate::BUILDER_VERSION;

/// Reproduction record for a bundle. Holds no timestamps or random ids, so
/// it is exactly as reproducible as the bundle itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    pub builder_version: String,
    pub format_version: u16,
    pub theme_count: usize,
    pub themes: Vec<ManifestEntry>,
    pub bundle_sha256: String,
    pub bundle_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub attribute_count: usize,
    pub sha256: String,
}

impl BuildManifest {
    pub fn for_bundle(bundle: &ThemeBundle, encoded: &EncodedBundle) -> Result<Self> {
        let themes = bundle
            .themes
            .iter()
            .map(|t| -> Result<ManifestEntry> {
                Ok(ManifestEntry {
                    id: t.id.clone(),
                    attribute_count: t.attributes.len(),
                    sha256: compute_theme_hash(t)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            builder_version: BUILDER_VERSION.to_string(),
            format_version: bundle.format_version,
            theme_count: bundle.themes.len(),
            themes,
            bundle_sha256: encoded.sha256_hex(),
            bundle_bytes: encoded.len(),
        })
    }

    /// Sorted keys, no whitespace.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(canonical_json(self)?)
    }
}

/// Everything produced by one run, before anything touches the disk.
#[derive(Debug, Clone)]
pub struct CompiledBundle {
    pub bundle: ThemeBundle,
    pub encoded: EncodedBundle,
    pub manifest: BuildManifest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub output: PathBuf,
    pub manifest: Option<PathBuf>,
    pub themes: usize,
    pub bytes: usize,
    pub sha256: String,
    pub manifest_sha256: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub output: PathBuf,
    pub artifact: Verification,
    pub manifest: Option<Verification>,
    pub sha256: String,
}

impl CheckReport {
    /// True when every configured artifact matches the fresh build.
    pub fn up_to_date(&self) -> bool {
        self.artifact.is_identical() && self.manifest.map_or(true, |m| m.is_identical())
    }
}

/// The build pipeline - single entry point for all bundle operations
pub struct BuildPipeline {
    config: BuildConfig,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run every stage up to the encoder.
    pub fn compile(&self) -> Result<CompiledBundle> {
        self.config.validate().map_err(|reason| BuildError::Config {
            path: PathBuf::from("<arguments>"),
            reason,
        })?;

        let loader = SourceLoader::new(&self.config.source_dir, self.config.extension.clone())
            .with_jobs(self.config.jobs);
        let definitions = loader.load()?;

        let themes = definitions
            .iter()
            .map(normalize)
            .collect::<Result<Vec<_>>>()?;

        let bundle = assemble(loader.root(), themes)?;
        let encoded = encode(&bundle)?;
        let manifest = BuildManifest::for_bundle(&bundle, &encoded)?;

        info!(
            themes = bundle.len(),
            bytes = encoded.len(),
            sha256 = %manifest.bundle_sha256,
            "compiled bundle"
        );

        Ok(CompiledBundle {
            bundle,
            encoded,
            manifest,
        })
    }

    /// Compile, then atomically replace the artifact (and manifest, if
    /// configured).
    ///
    /// Both files are staged before either is renamed into place. The
    /// artifact is renamed last, so it is only replaced once everything
    /// else has succeeded.
    pub fn build(&self) -> Result<BuildReport> {
        let compiled = self.compile()?;
        let manifest_json = compiled.manifest.to_canonical_json()?;

        let artifact = stage(&self.config.output, compiled.encoded.as_bytes())?;
        let manifest = match &self.config.manifest {
            Some(path) => Some(stage(path, manifest_json.as_bytes())?),
            None => None,
        };

        if let Some(manifest) = manifest {
            manifest.commit()?;
        }
        artifact.commit()?;

        Ok(BuildReport {
            output: self.config.output.clone(),
            manifest: self.config.manifest.clone(),
            themes: compiled.bundle.len(),
            bytes: compiled.encoded.len(),
            sha256: compiled.manifest.bundle_sha256.clone(),
            manifest_sha256: compute_manifest_hash(&compiled.manifest)?,
        })
    }

    /// Compile and compare against what is on disk. Writes nothing.
    pub fn check(&self) -> Result<CheckReport> {
        let compiled = self.compile()?;

        let artifact = verify(&self.config.output, compiled.encoded.as_bytes())?;
        let manifest = match &self.config.manifest {
            Some(path) => {
                let json = compiled.manifest.to_canonical_json()?;
                Some(verify(path, json.as_bytes())?)
            }
            None => None,
        };

        info!(output = %self.config.output.display(), ?artifact, "checked artifact");

        Ok(CheckReport {
            output: self.config.output.clone(),
            artifact,
            manifest,
            sha256: compiled.manifest.bundle_sha256,
        })
    }
}

impl Default for BuildPipeline {
    fn default() -> Self {
        Self::new(BuildConfig::default())
    }
}
