//! Bundle Assembler - one canonical ordering for all themes

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::error::{BuildError, Result};
use crate::theme::NormalizedTheme;

/// Current bundle layout version, stamped into every bundle.
pub const FORMAT_VERSION: u16 = 1;

/// Normalized themes in ascending byte order of id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeBundle {
    pub format_version: u16,
    pub themes: Vec<NormalizedTheme>,
}

impl ThemeBundle {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.themes.iter().map(|t| t.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&NormalizedTheme> {
        self.themes
            .binary_search_by(|t| t.id.as_bytes().cmp(id.as_bytes()))
            .ok()
            .map(|i| &self.themes[i])
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

/// Sort themes by id and stamp the format version.
///
/// `root` only feeds the error message when there is nothing to assemble.
pub fn assemble(root: &Path, mut themes: Vec<NormalizedTheme>) -> Result<ThemeBundle> {
    if themes.is_empty() {
        return Err(BuildError::EmptyInput {
            root: root.to_path_buf(),
        });
    }

    themes.sort_by(|a, b| a.id.as_bytes().cmp(b.id.as_bytes()));
    reject_duplicate_ids(themes.iter().map(|t| (t.id.as_str(), t.origin.as_path())))?;

    info!(themes = themes.len(), format_version = FORMAT_VERSION, "assembled bundle");

    Ok(ThemeBundle {
        format_version: FORMAT_VERSION,
        themes,
    })
}

/// Fails on the first pair of equal adjacent ids. Input must be sorted by id.
pub(crate) fn reject_duplicate_ids<'a>(
    sorted: impl IntoIterator<Item = (&'a str, &'a Path)>,
) -> Result<()> {
    let mut previous: Option<(&str, &Path)> = None;
    for (id, origin) in sorted {
        if let Some((prev_id, prev_origin)) = previous {
            if prev_id == id {
                let (first, second) = if prev_origin <= origin {
                    (prev_origin, origin)
                } else {
                    (origin, prev_origin)
                };
                return Err(BuildError::DuplicateId {
                    id: id.to_string(),
                    first: first.to_path_buf(),
                    second: second.to_path_buf(),
                });
            }
        }
        previous = Some((id, origin));
    }
    Ok(())
}
