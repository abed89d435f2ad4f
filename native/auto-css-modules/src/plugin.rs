//! Host hooks.
//!
//! One `AutoCssModules` value owns every registry for a build. The host calls
//! `transform` for each module; matching components get their style compiled,
//! registered as a virtual module and imported from the patched source.

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::compile::{CompiledStyle, Preprocessor, StyleCompiler, StyleDialect};
use crate::error::{PluginError, PluginResult};
use crate::invalidate::{InvalidationTracker, ModuleReloader, WatchEvent};
use crate::options::{
    CssModulesOptions, HostConfig, ManifestHook, PluginOptions, ResolveStyleFn, ResolvedOptions,
    ShouldTransformFn, StyleStrategy,
};
use crate::resolve::{list_directory, normalize_style_path, resolve_styles, StyleCandidate};
use crate::rewrite::rewrite_component;
use crate::virtual_module::{self, VirtualModuleRegistry, RESOLVED_MARKER};

pub const PLUGIN_NAME: &str = "auto-css-modules";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutput {
    pub code: String,
    /// Version-3 source map, JSON.
    pub map: String,
    /// The style file the component was bound to.
    pub style_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Host callbacks that cannot travel inside serialized options. Set fields
/// replace the matching option; preprocessors are registered per dialect.
#[derive(Default)]
pub struct HostCallbacks {
    pub should_transform_component: Option<ShouldTransformFn>,
    pub resolve_style_for_component: Option<ResolveStyleFn>,
    pub get_json: Option<ManifestHook>,
    pub preprocessors: Vec<(StyleDialect, Arc<dyn Preprocessor>)>,
}

#[derive(Debug)]
pub struct AutoCssModules {
    options: PluginOptions,
    resolved: ResolvedOptions,
    host: OnceLock<HostConfig>,
    compiler: StyleCompiler,
    registry: VirtualModuleRegistry,
    tracker: InvalidationTracker,
}

impl AutoCssModules {
    /// Validate `options` once; every later call works on the tagged result.
    pub fn new(options: PluginOptions) -> PluginResult<Self> {
        let resolved = options.resolve()?;
        options.css_modules.validate()?;
        log::debug!(
            "{} configured: filter {:?}, strategy {:?}",
            PLUGIN_NAME,
            resolved.component_filter,
            resolved.style_strategy
        );
        Ok(Self {
            options,
            resolved,
            host: OnceLock::new(),
            compiler: StyleCompiler::new(),
            registry: VirtualModuleRegistry::new(),
            tracker: InvalidationTracker::new(),
        })
    }

    /// `new`, with host callbacks layered over `options`.
    pub fn with_callbacks(mut options: PluginOptions, callbacks: HostCallbacks) -> PluginResult<Self> {
        if let Some(filter) = callbacks.should_transform_component {
            options.should_transform_component = Some(filter);
        }
        if let Some(resolver) = callbacks.resolve_style_for_component {
            options.resolve_style_for_component = Some(resolver);
        }
        if let Some(get_json) = callbacks.get_json {
            options.css_modules.get_json = Some(get_json);
        }

        let plugin = Self::new(options)?;
        Ok(callbacks
            .preprocessors
            .into_iter()
            .fold(plugin, |plugin, (dialect, preprocessor)| {
                plugin.with_preprocessor(dialect, preprocessor)
            }))
    }

    pub fn with_preprocessor(mut self, dialect: StyleDialect, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.compiler.register_preprocessor(dialect, preprocessor);
        self
    }

    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// Capture the host's final configuration. Only the first call counts.
    pub fn config_resolved(&self, config: HostConfig) -> PluginResult<()> {
        if let Some(css_modules) = &config.css_modules {
            css_modules.validate()?;
        }
        if self.host.set(config).is_err() {
            log::debug!("{}: host config already resolved, ignoring", PLUGIN_NAME);
        }
        Ok(())
    }

    pub fn is_dev(&self) -> bool {
        self.host.get().map(|config| config.dev).unwrap_or(false)
    }

    /// Host CSS Modules settings win over the plugin's own.
    pub fn css_modules(&self) -> &CssModulesOptions {
        self.host
            .get()
            .and_then(|config| config.css_modules.as_ref())
            .unwrap_or(&self.options.css_modules)
    }

    pub fn resolve_id(&self, id: &str) -> Option<String> {
        virtual_module::resolve_id(id)
    }

    /// Serve the CSS behind a virtual id; `None` for every other module.
    pub fn load(&self, id: &str) -> PluginResult<Option<String>> {
        if !virtual_module::is_virtual_id(id) {
            return Ok(None);
        }
        self.registry.resolve_content(id).map(Some)
    }

    /// Bind a component to its style file and patch its source. Returns
    /// `None` when the module is not a component or no style file matches.
    pub async fn transform(&self, code: &str, id: &str) -> PluginResult<Option<TransformOutput>> {
        if id.starts_with(RESOLVED_MARKER) || virtual_module::is_virtual_id(id) {
            return Ok(None);
        }

        let component_path = Path::new(module_path(id));
        if !self.resolved.component_filter.accepts(component_path).await {
            return Ok(None);
        }
        let Some(directory) = component_path.parent() else {
            return Ok(None);
        };

        let strategy = &self.resolved.style_strategy;
        let listing = match strategy {
            StyleStrategy::Callback(_) => Vec::new(),
            _ => match list_directory(directory).await {
                Ok(listing) => listing,
                // Ids of other plugins' modules name no real directory.
                Err(PluginError::Io { source, .. })
                    if matches!(source.kind(), ErrorKind::NotFound | ErrorKind::InvalidInput) =>
                {
                    log::debug!("{}: no directory for {}", PLUGIN_NAME, id);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            },
        };

        let candidates = resolve_styles(component_path, &listing, strategy).await?;
        let mut warnings = Vec::new();
        let Some(candidate) = pick_candidate(id, candidates, &mut warnings) else {
            log::debug!("{}: no style file for {}", PLUGIN_NAME, id);
            return Ok(None);
        };

        let source = tokio::fs::read_to_string(&candidate.file_path)
            .await
            .map_err(|e| PluginError::io(&candidate.file_path, e))?;

        let CompiledStyle { css, manifest } = if candidate.is_module {
            self.compiler
                .compile(&candidate.file_path, &source, self.css_modules())?
        } else {
            CompiledStyle::pass_through(&source)
        };

        let key = path_key(&normalize_style_path(&candidate.file_path));
        let virtual_id = virtual_module::virtual_id(&key, Some(&css));
        let rewritten = rewrite_component(code, id, &manifest, &virtual_id)?;
        self.registry.register(&key, css);

        if self.is_dev() {
            self.tracker.record(id, directory, &candidate.file_path);
        }

        log::debug!(
            "{}: {} -> {} ({})",
            PLUGIN_NAME,
            id,
            candidate.file_path.display(),
            if candidate.is_module { "module" } else { "plain" }
        );

        Ok(Some(TransformOutput {
            code: rewritten.code,
            map: rewritten.map,
            style_path: candidate.file_path,
            warnings,
        }))
    }

    /// Forward a watcher event to the tracker. Nothing is tracked outside dev
    /// mode, so nothing is reloaded there either.
    pub fn handle_watch_event(&self, event: &WatchEvent, reloader: &dyn ModuleReloader) -> Vec<String> {
        if !self.is_dev() {
            return Vec::new();
        }
        self.tracker.handle_event(event, reloader)
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &VirtualModuleRegistry {
        &self.registry
    }
}

/// First match wins; extra matches are reported.
fn pick_candidate(
    id: &str,
    candidates: Vec<StyleCandidate>,
    warnings: &mut Vec<String>,
) -> Option<StyleCandidate> {
    if candidates.len() > 1 {
        let names = candidates
            .iter()
            .map(|c| c.file_path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let warning = format!(
            "Multiple style files match {}: {}. Using {}",
            id,
            names,
            candidates[0].file_path.display()
        );
        log::warn!("{}", warning);
        warnings.push(warning);
    }
    candidates.into_iter().next()
}

/// Module ids may carry a query string.
pub(crate) fn module_path(id: &str) -> &str {
    id.split_once('?').map(|(path, _)| path).unwrap_or(id)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
