//! Node-API surface for JavaScript hosts.
//!
//! Serializable options arrive as JSON. Functions arrive in a second object
//! and are wrapped as threadsafe functions, so transforms running off the
//! main thread can still call back into JavaScript:
//!
//! ```js
//! new AutoCssModulesPlugin(JSON.stringify(options), {
//!   shouldTransformComponent(fileName, filePath) {},
//!   resolveStyleForComponent(componentName, directoryName, filePath) {},
//!   getJSON(fileName, json) {},
//!   preprocessors: { scss(source, fileName) {}, less(source, fileName) {} },
//! });
//! ```

use futures::FutureExt;
use napi::bindgen_prelude::{Either, FromNapiValue, Promise, ToNapiValue, TypeName, ValidateNapiValue};
use napi::threadsafe_function::{
    ErrorStrategy, ThreadSafeCallContext, ThreadsafeFunction, ThreadsafeFunctionCallMode,
};
use napi::{Env, JsFunction, JsObject, JsString, JsUnknown};
use napi_derive::napi;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use crate::compile::{Preprocessor, ScopeManifest, StyleDialect};
use crate::error::{PluginError, StyleParseError};
use crate::invalidate::WatchEvent;
use crate::options::{
    CssModulesOptions, HostConfig, ManifestHook, PluginOptions, ResolveStyleFn, ShouldTransformFn,
};
use crate::plugin::{AutoCssModules, HostCallbacks};
use crate::resolve::{ComponentQuery, StyleCandidate, StyleQuery};

type JsCallback<T> = ThreadsafeFunction<T, ErrorStrategy::Fatal>;

/// JavaScript callbacks may answer directly or with a Promise.
type MaybePromise<T> = Either<T, Promise<T>>;

fn to_napi_error(err: PluginError) -> napi::Error {
    napi::Error::from_reason(err.to_string())
}

/// What `resolveStyleForComponent` returns.
#[napi(object)]
pub struct ResolvedStyle {
    pub is_module: bool,
    pub file_path: String,
}

#[napi]
pub struct AutoCssModulesPlugin {
    inner: AutoCssModules,
}

#[napi]
impl AutoCssModulesPlugin {
    #[napi(constructor)]
    pub fn new(env: Env, options_json: Option<String>, callbacks: Option<JsObject>) -> napi::Result<Self> {
        let options = match options_json.as_deref() {
            Some(json) => PluginOptions::from_json(json).map_err(to_napi_error)?,
            None => PluginOptions::default(),
        };
        let callbacks = host_callbacks(&env, callbacks)?;
        let inner = AutoCssModules::with_callbacks(options, callbacks).map_err(to_napi_error)?;
        Ok(Self { inner })
    }

    #[napi(getter)]
    pub fn name(&self) -> String {
        self.inner.name().to_string()
    }

    #[napi]
    pub fn config_resolved(&self, dev: bool, css_modules_json: Option<String>) -> napi::Result<()> {
        let css_modules = css_modules_json
            .map(|json| {
                serde_json::from_str::<CssModulesOptions>(&json).map_err(|e| {
                    napi::Error::from_reason(format!("Invalid cssModules options: {}", e))
                })
            })
            .transpose()?;
        self.inner
            .config_resolved(HostConfig { dev, css_modules })
            .map_err(to_napi_error)
    }

    #[napi]
    pub fn resolve_id(&self, id: String) -> Option<String> {
        self.inner.resolve_id(&id)
    }

    #[napi]
    pub fn load(&self, id: String) -> napi::Result<Option<String>> {
        self.inner.load(&id).map_err(to_napi_error)
    }

    /// Resolves to `{ code, map, stylePath, warnings }` or `null`.
    #[napi]
    pub async fn transform(&self, code: String, id: String) -> napi::Result<Option<serde_json::Value>> {
        let output = self.inner.transform(&code, &id).await.map_err(to_napi_error)?;
        output
            .map(|out| serde_json::to_value(out).map_err(|e| napi::Error::from_reason(e.to_string())))
            .transpose()
    }

    /// Returns the module ids the JavaScript side has to reload.
    #[napi]
    pub fn handle_watch_event(&self, kind: String, path: String) -> napi::Result<Vec<String>> {
        let event = WatchEvent::from_kind(&kind, path)
            .ok_or_else(|| napi::Error::from_reason(format!("Unknown watch event '{}'", kind)))?;
        Ok(self.inner.handle_watch_event(&event, &|_: &str| {}))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALLBACKS
// ═══════════════════════════════════════════════════════════════════════════════

fn host_callbacks(env: &Env, callbacks: Option<JsObject>) -> napi::Result<HostCallbacks> {
    let mut host = HostCallbacks::default();
    let Some(callbacks) = callbacks else {
        return Ok(host);
    };

    if let Some(function) = callbacks.get::<_, JsFunction>("shouldTransformComponent")? {
        let callback = threadsafe(env, function, string_pair)?;
        host.should_transform_component = Some(should_transform_fn(callback));
    }
    if let Some(function) = callbacks.get::<_, JsFunction>("resolveStyleForComponent")? {
        let callback = threadsafe(env, function, string_triple)?;
        host.resolve_style_for_component = Some(resolve_style_fn(callback));
    }
    if let Some(function) = callbacks.get::<_, JsFunction>("getJSON")? {
        let callback = threadsafe(env, function, manifest_args)?;
        host.get_json = Some(manifest_hook(callback));
    }
    if let Some(preprocessors) = callbacks.get::<_, JsObject>("preprocessors")? {
        for (key, dialect) in [("scss", StyleDialect::Scss), ("less", StyleDialect::Less)] {
            if let Some(function) = preprocessors.get::<_, JsFunction>(key)? {
                let callback = threadsafe(env, function, string_pair)?;
                host.preprocessors.push((dialect, Arc::new(JsPreprocessor(callback))));
            }
        }
    }
    Ok(host)
}

/// Unreferenced, so a live plugin never keeps the Node process running.
fn threadsafe<T, V, R>(env: &Env, function: JsFunction, to_args: R) -> napi::Result<JsCallback<T>>
where
    T: 'static,
    V: ToNapiValue,
    R: 'static + Send + FnMut(ThreadSafeCallContext<T>) -> napi::Result<Vec<V>>,
{
    let mut callback: JsCallback<T> = function.create_threadsafe_function(0, to_args)?;
    callback.unref(env)?;
    Ok(callback)
}

fn string_pair(ctx: ThreadSafeCallContext<(String, String)>) -> napi::Result<Vec<JsString>> {
    let (first, second) = ctx.value;
    Ok(vec![ctx.env.create_string(&first)?, ctx.env.create_string(&second)?])
}

fn string_triple(ctx: ThreadSafeCallContext<(String, String, String)>) -> napi::Result<Vec<JsString>> {
    let (first, second, third) = ctx.value;
    Ok(vec![
        ctx.env.create_string(&first)?,
        ctx.env.create_string(&second)?,
        ctx.env.create_string(&third)?,
    ])
}

fn manifest_args(ctx: ThreadSafeCallContext<(String, ScopeManifest)>) -> napi::Result<Vec<JsUnknown>> {
    let (file, manifest) = ctx.value;
    Ok(vec![
        ctx.env.create_string(&file)?.into_unknown(),
        ctx.env.to_js_value(&manifest)?,
    ])
}

async fn invoke<T, D>(callback: &JsCallback<T>, args: T) -> napi::Result<D>
where
    T: 'static + Send,
    D: 'static + FromNapiValue + TypeName + ValidateNapiValue,
{
    match callback.call_async::<MaybePromise<D>>(args).await? {
        Either::A(value) => Ok(value),
        Either::B(promise) => promise.await,
    }
}

fn should_transform_fn(callback: JsCallback<(String, String)>) -> ShouldTransformFn {
    Arc::new(move |query: ComponentQuery| {
        let callback = callback.clone();
        async move {
            let args = (query.file_name, query.file_path.to_string_lossy().into_owned());
            invoke::<_, bool>(&callback, args).await.unwrap_or_else(|e| {
                log::warn!("shouldTransformComponent failed: {}", e);
                false
            })
        }
        .boxed()
    })
}

fn resolve_style_fn(callback: JsCallback<(String, String, String)>) -> ResolveStyleFn {
    Arc::new(move |query: StyleQuery| {
        let callback = callback.clone();
        async move {
            let args = (
                query.component_name,
                query.directory.to_string_lossy().into_owned(),
                query.component_path.to_string_lossy().into_owned(),
            );
            match invoke::<_, Option<ResolvedStyle>>(&callback, args).await {
                Ok(resolved) => resolved.map(|style| StyleCandidate {
                    file_path: PathBuf::from(style.file_path),
                    is_module: style.is_module,
                }),
                Err(e) => {
                    log::warn!("resolveStyleForComponent failed: {}", e);
                    None
                }
            }
        }
        .boxed()
    })
}

fn manifest_hook(callback: JsCallback<(String, ScopeManifest)>) -> ManifestHook {
    Arc::new(move |path: &Path, manifest: &ScopeManifest| {
        let args = (path.to_string_lossy().into_owned(), manifest.clone());
        let status = callback.call(args, ThreadsafeFunctionCallMode::NonBlocking);
        if status != napi::Status::Ok {
            log::warn!("getJSON call failed: {:?}", status);
        }
    })
}

/// Calls `(source, fileName) => css` and waits for the answer. Compilation
/// runs on a worker thread, so the JavaScript thread stays free to reply.
struct JsPreprocessor(JsCallback<(String, String)>);

impl Preprocessor for JsPreprocessor {
    fn preprocess(&self, path: &Path, source: &str) -> Result<String, StyleParseError> {
        let file = path.to_string_lossy().into_owned();
        let (sender, receiver) = mpsc::channel();
        let status = self.0.call_with_return_value(
            (source.to_string(), file.clone()),
            ThreadsafeFunctionCallMode::Blocking,
            move |css: String| {
                let _ = sender.send(css);
                Ok(())
            },
        );
        if status != napi::Status::Ok {
            return Err(StyleParseError::unpositioned(
                file,
                format!("Preprocessor call failed: {:?}", status),
            ));
        }
        receiver
            .recv()
            .map_err(|_| StyleParseError::unpositioned(file, "Preprocessor returned no CSS"))
    }
}
