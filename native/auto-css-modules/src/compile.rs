//! Style compilation: dialect preprocessing followed by CSS Modules scoping.

use lightningcss::css_modules::{Config, CssModuleExports, CssModuleReference, Pattern};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PluginError, PluginResult, StyleParseError};
use crate::options::CssModulesOptions;

/// Local class name → scoped class name(s).
pub type ScopeManifest = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleDialect {
    Css,
    Scss,
    Less,
}

impl StyleDialect {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("scss") | Some("sass") => StyleDialect::Scss,
            Some("less") => StyleDialect::Less,
            _ => StyleDialect::Css,
        }
    }
}

/// A dialect engine turning its source language into plain CSS.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, path: &Path, source: &str) -> Result<String, StyleParseError>;
}

impl<F> Preprocessor for F
where
    F: Fn(&Path, &str) -> Result<String, StyleParseError> + Send + Sync,
{
    fn preprocess(&self, path: &Path, source: &str) -> Result<String, StyleParseError> {
        self(path, source)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledStyle {
    pub css: String,
    pub manifest: ScopeManifest,
}

impl CompiledStyle {
    /// Plain stylesheets are served untouched and scope nothing.
    pub fn pass_through(source: &str) -> Self {
        Self {
            css: source.to_string(),
            manifest: ScopeManifest::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct StyleCompiler {
    preprocessors: HashMap<StyleDialect, Arc<dyn Preprocessor>>,
}

impl fmt::Debug for StyleCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleCompiler")
            .field("preprocessors", &self.preprocessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StyleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_preprocessor(&mut self, dialect: StyleDialect, preprocessor: Arc<dyn Preprocessor>) {
        self.preprocessors.insert(dialect, preprocessor);
    }

    /// Compile one style file as a CSS module.
    ///
    /// Without a registered preprocessor for the file's dialect the source is
    /// parsed as CSS directly, which still accepts native nesting.
    pub fn compile(
        &self,
        path: &Path,
        source: &str,
        options: &CssModulesOptions,
    ) -> PluginResult<CompiledStyle> {
        let dialect = StyleDialect::from_path(path);
        let filename = path.to_string_lossy().into_owned();

        let css_source: Cow<'_, str> = match self.preprocessors.get(&dialect) {
            Some(preprocessor) => Cow::Owned(preprocessor.preprocess(path, source)?),
            None => Cow::Borrowed(source),
        };

        let pattern = Pattern::parse(options.pattern()).map_err(|e| {
            PluginError::configuration(format!(
                "Invalid CSS modules pattern '{}': {}",
                options.pattern(),
                e
            ))
        })?;

        let parser_options = ParserOptions {
            filename: filename.clone(),
            css_modules: Some(Config {
                pattern,
                dashed_idents: options.dashed_idents,
                ..Config::default()
            }),
            ..ParserOptions::default()
        };

        let stylesheet = StyleSheet::parse(&css_source, parser_options)
            .map_err(|e| located_error(&filename, e))?;
        let output = stylesheet
            .to_css(PrinterOptions::default())
            .map_err(|e| located_error(&filename, e))?;

        let manifest = output
            .exports
            .map(|exports| manifest_from_exports(&filename, exports))
            .unwrap_or_default();

        log::debug!("compiled {} ({} scoped names)", filename, manifest.len());

        if let Some(get_json) = &options.get_json {
            get_json(path, &manifest);
        }

        Ok(CompiledStyle {
            css: output.code,
            manifest,
        })
    }
}

fn manifest_from_exports(filename: &str, exports: CssModuleExports) -> ScopeManifest {
    exports
        .into_iter()
        .map(|(local, export)| {
            let mut scoped = export.name;
            for reference in export.composes {
                match reference {
                    CssModuleReference::Local { name } | CssModuleReference::Global { name } => {
                        scoped.push(' ');
                        scoped.push_str(&name);
                    }
                    CssModuleReference::Dependency { name, specifier } => {
                        log::warn!(
                            "{}: composes '{}' from '{}' is not supported and was skipped",
                            filename,
                            name,
                            specifier
                        );
                    }
                }
            }
            (local, scoped)
        })
        .collect()
}

fn located_error<T: fmt::Display>(filename: &str, err: lightningcss::error::Error<T>) -> StyleParseError {
    match err.loc {
        // lightningcss lines are 0-based, columns 1-based.
        Some(loc) => StyleParseError::new(filename, loc.line + 1, loc.column, err.kind.to_string()),
        None => StyleParseError::unpositioned(filename, err.kind.to_string()),
    }
}
