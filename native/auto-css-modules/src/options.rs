//! Plugin configuration.
//!
//! `PluginOptions` is the user-facing surface (deserializable from the host's
//! JSON config plus a few callbacks). It is validated once into
//! `ResolvedOptions`, whose strategies are tagged enums so the per-call code
//! never re-inspects which optional fields happen to be set.

use futures::future::BoxFuture;
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::compile::ScopeManifest;
use crate::error::{PluginError, PluginResult};
use crate::resolve::{ComponentQuery, StyleCandidate, StyleQuery};

pub const DEFAULT_COMPONENT_EXTENSIONS: &[&str] = &[".tsx", ".jsx"];
pub const DEFAULT_STYLE_EXTENSIONS: &[&str] = &[".css", ".scss", ".less"];
pub const DEFAULT_SCOPE_PATTERN: &str = "[hash]_[local]";

pub type ShouldTransformFn = Arc<dyn Fn(ComponentQuery) -> BoxFuture<'static, bool> + Send + Sync>;
pub type ResolveStyleFn =
    Arc<dyn Fn(StyleQuery) -> BoxFuture<'static, Option<StyleCandidate>> + Send + Sync>;
pub type ManifestHook = Arc<dyn Fn(&Path, &ScopeManifest) + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// USER OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginOptions {
    /// Force every matched style file to be compiled as a CSS module.
    pub resolve_all_styles_as_modules: bool,
    /// Only match style files whose name starts with the component's name,
    /// e.g. `Card.tsx` matches `Card.css` and `Card.module.css`.
    pub match_component_name: bool,
    pub component_extensions: Option<Vec<String>>,
    /// Glob matched against sibling file names. Takes precedence over
    /// `style_extensions`.
    pub style_glob: Option<String>,
    pub style_extensions: Option<Vec<String>>,
    pub css_modules: CssModulesOptions,
    /// Takes precedence over `component_extensions`.
    #[serde(skip)]
    pub should_transform_component: Option<ShouldTransformFn>,
    /// Takes precedence over `style_glob` and `style_extensions`.
    #[serde(skip)]
    pub resolve_style_for_component: Option<ResolveStyleFn>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            resolve_all_styles_as_modules: false,
            match_component_name: true,
            component_extensions: Some(to_owned_list(DEFAULT_COMPONENT_EXTENSIONS)),
            style_glob: None,
            style_extensions: Some(to_owned_list(DEFAULT_STYLE_EXTENSIONS)),
            css_modules: CssModulesOptions::default(),
            should_transform_component: None,
            resolve_style_for_component: None,
        }
    }
}

impl fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginOptions")
            .field("resolve_all_styles_as_modules", &self.resolve_all_styles_as_modules)
            .field("match_component_name", &self.match_component_name)
            .field("component_extensions", &self.component_extensions)
            .field("style_glob", &self.style_glob)
            .field("style_extensions", &self.style_extensions)
            .field("css_modules", &self.css_modules)
            .field("should_transform_component", &self.should_transform_component.is_some())
            .field("resolve_style_for_component", &self.resolve_style_for_component.is_some())
            .finish()
    }
}

impl PluginOptions {
    pub fn from_json(json: &str) -> PluginResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PluginError::configuration(format!("Invalid plugin options: {}", e)))
    }

    pub fn resolve(&self) -> PluginResult<ResolvedOptions> {
        Ok(ResolvedOptions {
            component_filter: ComponentFilter::from_options(self)?,
            style_strategy: StyleStrategy::from_options(self)?,
        })
    }
}

/// Module-scoping options, either set on the plugin or captured from the host
/// once its configuration is resolved.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CssModulesOptions {
    /// lightningcss naming pattern, e.g. `[name]__[local]_[hash]`.
    pub pattern: Option<String>,
    /// Scope `--custom-properties` as well as classes.
    pub dashed_idents: bool,
    /// Hook receiving every manifest produced, keyed by style path.
    #[serde(skip)]
    pub get_json: Option<ManifestHook>,
}

impl fmt::Debug for CssModulesOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CssModulesOptions")
            .field("pattern", &self.pattern)
            .field("dashed_idents", &self.dashed_idents)
            .field("get_json", &self.get_json.is_some())
            .finish()
    }
}

impl CssModulesOptions {
    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(DEFAULT_SCOPE_PATTERN)
    }

    pub fn validate(&self) -> PluginResult<()> {
        lightningcss::css_modules::Pattern::parse(self.pattern())
            .map(|_| ())
            .map_err(|e| {
                PluginError::configuration(format!(
                    "Invalid CSS modules pattern '{}': {}",
                    self.pattern(),
                    e
                ))
            })
    }
}

/// Settings delivered by the host after its own configuration is final.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// The host runs a dev server; enables invalidation tracking.
    pub dev: bool,
    pub css_modules: Option<CssModulesOptions>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATED STRATEGIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub component_filter: ComponentFilter,
    pub style_strategy: StyleStrategy,
}

#[derive(Clone)]
pub enum ComponentFilter {
    Callback(ShouldTransformFn),
    Extensions(Vec<String>),
}

impl ComponentFilter {
    pub fn from_options(options: &PluginOptions) -> PluginResult<Self> {
        if let Some(callback) = &options.should_transform_component {
            return Ok(ComponentFilter::Callback(callback.clone()));
        }
        match &options.component_extensions {
            Some(extensions) => Ok(ComponentFilter::Extensions(extensions.clone())),
            None => Err(PluginError::configuration(
                "Either 'shouldTransformComponent' or 'componentExtensions' is required",
            )),
        }
    }

    pub async fn accepts(&self, component_path: &Path) -> bool {
        match self {
            ComponentFilter::Callback(callback) => {
                let query = ComponentQuery {
                    file_name: file_name_of(component_path),
                    file_path: component_path.to_path_buf(),
                };
                callback(query).await
            }
            ComponentFilter::Extensions(extensions) => {
                let file_name = file_name_of(component_path);
                extensions.iter().any(|ext| {
                    file_name.len() > ext.len() && file_name.ends_with(ext.as_str())
                })
            }
        }
    }
}

impl fmt::Debug for ComponentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentFilter::Callback(_) => f.write_str("Callback"),
            ComponentFilter::Extensions(exts) => f.debug_tuple("Extensions").field(exts).finish(),
        }
    }
}

#[derive(Clone)]
pub enum StyleStrategy {
    Callback(ResolveStyleFn),
    ExplicitGlob {
        pattern: String,
        matcher: GlobMatcher,
        always_module: bool,
    },
    ExtensionDerived {
        extensions: Vec<String>,
        match_component_name: bool,
        always_module: bool,
    },
}

impl StyleStrategy {
    /// Picks exactly one strategy, in precedence order: callback, explicit
    /// glob, extension list.
    pub fn from_options(options: &PluginOptions) -> PluginResult<Self> {
        if let Some(callback) = &options.resolve_style_for_component {
            return Ok(StyleStrategy::Callback(callback.clone()));
        }

        if let Some(pattern) = &options.style_glob {
            return Ok(StyleStrategy::ExplicitGlob {
                pattern: pattern.clone(),
                matcher: compile_glob(pattern)?,
                always_module: options.resolve_all_styles_as_modules,
            });
        }

        match &options.style_extensions {
            Some(extensions) => Ok(StyleStrategy::ExtensionDerived {
                extensions: extensions.clone(),
                match_component_name: options.match_component_name,
                always_module: options.resolve_all_styles_as_modules,
            }),
            None => Err(PluginError::configuration(
                "One of 'resolveStyleForComponent', 'styleGlob' or 'styleExtensions' is required",
            )),
        }
    }
}

impl fmt::Debug for StyleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleStrategy::Callback(_) => f.write_str("Callback"),
            StyleStrategy::ExplicitGlob {
                pattern,
                always_module,
                ..
            } => f
                .debug_struct("ExplicitGlob")
                .field("pattern", pattern)
                .field("always_module", always_module)
                .finish(),
            StyleStrategy::ExtensionDerived {
                extensions,
                match_component_name,
                always_module,
            } => f
                .debug_struct("ExtensionDerived")
                .field("extensions", extensions)
                .field("match_component_name", match_component_name)
                .field("always_module", always_module)
                .finish(),
        }
    }
}

/// Globs match a single path segment: `*` never crosses a separator.
pub(crate) fn compile_glob(pattern: &str) -> PluginResult<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| PluginError::configuration(format!("Invalid style glob '{}': {}", pattern, e)))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
