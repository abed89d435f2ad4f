//! Style discovery.
//!
//! Given a component path and a flat listing of its siblings, pick the style
//! files that belong to it. Matching is a pure function of the listing and the
//! validated strategy; only the optional user callback is awaited.

use globset::GlobMatcher;
use std::path::{Path, PathBuf};

use crate::error::{PluginError, PluginResult};
use crate::options::{compile_glob, PluginOptions, StyleStrategy};

const MODULE_SUFFIX: &str = ".module";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleCandidate {
    pub file_path: PathBuf,
    pub is_module: bool,
}

impl StyleCandidate {
    pub fn classify(file_path: impl Into<PathBuf>, always_module: bool) -> Self {
        let file_path = file_path.into();
        let is_module = always_module || has_module_suffix(&file_path);
        Self {
            file_path,
            is_module,
        }
    }
}

/// Arguments handed to a `resolveStyleForComponent` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleQuery {
    /// Component file name without its extension.
    pub component_name: String,
    pub directory: PathBuf,
    pub component_path: PathBuf,
}

/// Arguments handed to a `shouldTransformComponent` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentQuery {
    pub file_name: String,
    pub file_path: PathBuf,
}

/// `Card.module.css` has a module suffix, `Card.css` does not.
pub fn has_module_suffix(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.ends_with(MODULE_SUFFIX))
        .unwrap_or(false)
}

/// Strip the `.module` marker from the file stem: `Card.module.css` and
/// `Card.css` share the key `Card.css`.
pub fn normalize_style_path(path: &Path) -> PathBuf {
    let (Some(stem), Some(parent)) = (path.file_stem().and_then(|s| s.to_str()), path.parent())
    else {
        return path.to_path_buf();
    };
    let Some(base) = stem.strip_suffix(MODULE_SUFFIX) else {
        return path.to_path_buf();
    };
    let file_name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    };
    parent.join(file_name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATCHING
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve style candidates for `component_path` out of `directory`, a flat
/// listing of sibling paths. Output order is match order: for extension lists
/// all matches of the first extension come first, each in listing order.
pub async fn resolve_styles(
    component_path: &Path,
    directory: &[PathBuf],
    strategy: &StyleStrategy,
) -> PluginResult<Vec<StyleCandidate>> {
    match strategy {
        StyleStrategy::Callback(callback) => {
            let query = style_query(component_path);
            Ok(callback(query).await.into_iter().collect())
        }
        StyleStrategy::ExplicitGlob {
            pattern,
            matcher,
            always_module,
        } => Ok(directory
            .iter()
            .filter(|path| glob_matches(pattern, matcher, path))
            .map(|path| StyleCandidate::classify(path.clone(), *always_module))
            .collect()),
        StyleStrategy::ExtensionDerived {
            extensions,
            match_component_name,
            always_module,
        } => {
            let stem = if *match_component_name {
                globset::escape(&component_stem(component_path))
            } else {
                String::new()
            };

            let mut matches: Vec<&PathBuf> = Vec::new();
            for extension in extensions {
                let pattern = format!("{}*{}", stem, globset::escape(extension));
                let matcher = compile_glob(&pattern)?;
                for path in directory {
                    if glob_matches(&pattern, &matcher, path) && !matches.contains(&path) {
                        matches.push(path);
                    }
                }
            }

            Ok(matches
                .into_iter()
                .map(|path| StyleCandidate::classify(path.clone(), *always_module))
                .collect())
        }
    }
}

/// Same as [`resolve_styles`], validating raw options first. Fails with a
/// configuration error when no strategy is configured.
pub async fn resolve_styles_from_directory(
    component_path: &Path,
    directory: &[PathBuf],
    options: &PluginOptions,
) -> PluginResult<Vec<StyleCandidate>> {
    let strategy = StyleStrategy::from_options(options)?;
    resolve_styles(component_path, directory, &strategy).await
}

fn glob_matches(pattern: &str, matcher: &GlobMatcher, path: &Path) -> bool {
    file_name_str(path)
        .map(|name| visible_to(pattern, name) && matcher.is_match(name))
        .unwrap_or(false)
}

/// A leading `*` never matches hidden files.
fn visible_to(pattern: &str, name: &str) -> bool {
    !name.starts_with('.') || pattern.starts_with('.')
}

fn style_query(component_path: &Path) -> StyleQuery {
    StyleQuery {
        component_name: component_stem(component_path),
        directory: component_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        component_path: component_path.to_path_buf(),
    }
}

fn component_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTORY LISTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-recursive listing of the files in `dir`, sorted by file name so match
/// order does not depend on the filesystem.
pub async fn list_directory(dir: &Path) -> PluginResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PluginError::io(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PluginError::io(dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| PluginError::io(entry.path(), e))?;
        if !file_type.is_dir() {
            files.push(entry.path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
