//! ThemeForge Core - Theme Bundle Compiler
//!
//! # The Four Laws (Non-Negotiable)
//! 1. Same Sources, Same Bytes
//! 2. Discovery Order Never Leaks Into Output
//! 3. Every Anomaly Fails The Build
//! 4. The Artifact Is Replaced Atomically Or Not At All

pub mod error;
pub mod theme;
pub mod source;
pub mod normalize;
pub mod bundle;
pub mod codec;
pub mod hashing;
pub mod writer;
pub mod config;
pub mod pipeline;

pub use error::{BuildError, Result};
pub use theme::{AttributeValue, NormalizedTheme, Rgba, SourceValue, ThemeDefinition, ThemeId};
pub use source::SourceLoader;
pub use normalize::normalize;
pub use bundle::{assemble, ThemeBundle, FORMAT_VERSION};
pub use codec::{decode, encode, EncodedBundle};
pub use hashing::{canonical_json, compute_theme_hash, sha256_hex};
pub use writer::{stage, verify, write_atomic, StagedWrite, Verification};
pub use config::BuildConfig;
pub use pipeline::{BuildManifest, BuildPipeline, BuildReport, CheckReport, CompiledBundle};

pub const BUILDER_VERSION: &str = env!("CARGO_PKG_VERSION");
