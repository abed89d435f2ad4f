//! # Auto CSS Modules
//!
//! Binds each UI component to the style file sitting next to it and scopes
//! its class names, without the component importing the stylesheet.
//!
//! ## Pipeline
//!
//! For every module the host hands to [`AutoCssModules::transform`]:
//!
//! 1. **Filter**: the component filter decides whether the module is a
//!    component (`componentExtensions` or a user callback).
//! 2. **Resolve**: sibling files are matched against the style strategy
//!    (callback, explicit glob, or extension list). The first match wins.
//! 3. **Compile**: `*.module.*` files (or every file with
//!    `resolveAllStylesAsModules`) go through lightningcss with CSS Modules
//!    enabled, producing scoped CSS and a local → scoped manifest. Plain
//!    files pass through untouched.
//! 4. **Register**: the CSS is stored under a virtual id
//!    `virtual:auto-css-modules/<token>/<path>` that the host loads through
//!    [`AutoCssModules::resolve_id`] and [`AutoCssModules::load`].
//! 5. **Rewrite**: the component source gets `import "<virtual id>";`
//!    prepended and its static `class`/`className`/`classList` values mapped
//!    through the manifest. Edits are span patches; all other text is kept
//!    byte-for-byte.
//! 6. **Track** (dev only): the component is associated with its directory
//!    and style file so watcher events reload exactly the affected modules.
//!
//! ## Invariants
//!
//! - At most one style file is bound per component.
//! - Unknown class names are left as written.
//! - Rewriting is idempotent and deterministic.
//! - Virtual ids decode from their own text; no lookup table is needed.

mod compile;
mod error;
mod invalidate;
mod options;
mod patch;
mod plugin;
mod resolve;
mod rewrite;
mod virtual_module;

#[cfg(feature = "napi")]
mod binding;

#[cfg(test)]
mod plugin_tests;

pub use compile::{CompiledStyle, Preprocessor, ScopeManifest, StyleCompiler, StyleDialect};
pub use error::{PluginError, PluginResult, StyleParseError};
pub use invalidate::{InvalidationTracker, ModuleReloader, WatchEvent};
pub use options::{
    ComponentFilter, CssModulesOptions, HostConfig, ManifestHook, PluginOptions, ResolveStyleFn,
    ResolvedOptions, ShouldTransformFn, StyleStrategy, DEFAULT_COMPONENT_EXTENSIONS,
    DEFAULT_SCOPE_PATTERN, DEFAULT_STYLE_EXTENSIONS,
};
pub use patch::{PatchOutput, SourcePatch};
pub use plugin::{AutoCssModules, HostCallbacks, TransformOutput, PLUGIN_NAME};
pub use resolve::{
    has_module_suffix, list_directory, normalize_style_path, resolve_styles,
    resolve_styles_from_directory, ComponentQuery, StyleCandidate, StyleQuery,
};
pub use rewrite::{rewrite_component, style_import_line, RewriteOutput};
pub use virtual_module::{decode_id, virtual_id, VirtualModuleRegistry, VIRTUAL_MODULE_PREFIX};

#[cfg(feature = "napi")]
pub use binding::AutoCssModulesPlugin;
