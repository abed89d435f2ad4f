use crate::compile::{Preprocessor, ScopeManifest, StyleDialect};
use crate::error::{PluginError, StyleParseError};
use crate::invalidate::WatchEvent;
use crate::options::{
    CssModulesOptions, HostConfig, ManifestHook, PluginOptions, ResolveStyleFn, ShouldTransformFn,
};
use crate::plugin::{AutoCssModules, HostCallbacks};
use crate::resolve::{ComponentQuery, StyleCandidate, StyleQuery};
use futures::FutureExt;
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const COMPONENT: &str = "export const Card = () => <h1 class=\"title\">Hi</h1>;\n";

fn scoped_options() -> PluginOptions {
    PluginOptions {
        css_modules: CssModulesOptions {
            pattern: Some("scoped_[local]".to_string()),
            ..CssModulesOptions::default()
        },
        ..PluginOptions::default()
    }
}

fn fixture(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn component_id(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

/// The virtual id imported on the first line of a transformed component.
fn imported_id(code: &str) -> String {
    let line = code.lines().next().unwrap();
    line.trim_start_matches("import \"")
        .trim_end_matches("\";")
        .to_string()
}

#[tokio::test]
async fn test_module_style_is_scoped_and_served() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.module.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let id = component_id(&dir, "Card.tsx");

    let out = plugin.transform(COMPONENT, &id).await.unwrap().unwrap();
    assert!(out.code.contains("<h1 class=\"scoped_title\">"));
    assert_eq!(out.style_path, dir.path().join("Card.module.css"));
    assert!(out.warnings.is_empty());

    let virtual_id = imported_id(&out.code);
    assert!(virtual_id.starts_with("virtual:auto-css-modules/"));

    let resolved = plugin.resolve_id(&virtual_id).unwrap();
    assert!(resolved.starts_with('\0'));
    let css = plugin.load(&resolved).unwrap().unwrap();
    assert!(css.contains(".scoped_title"));
}

#[tokio::test]
async fn test_plain_style_passes_through() {
    let dir = fixture(&[("Card.tsx", COMPONENT), ("Card.css", ".title { color: red; }")]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let id = component_id(&dir, "Card.tsx");

    let out = plugin.transform(COMPONENT, &id).await.unwrap().unwrap();
    let virtual_id = imported_id(&out.code);
    assert_eq!(out.code, format!("import \"{}\";\n{}", virtual_id, COMPONENT));
    assert_eq!(
        plugin.load(&format!("\0{}", virtual_id)).unwrap().unwrap(),
        ".title { color: red; }"
    );
}

#[tokio::test]
async fn test_always_module_scopes_plain_names() {
    let dir = fixture(&[("Card.tsx", COMPONENT), ("Card.css", ".title { color: red; }")]);
    let plugin = AutoCssModules::new(PluginOptions {
        resolve_all_styles_as_modules: true,
        ..scoped_options()
    })
    .unwrap();

    let out = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap()
        .unwrap();
    assert!(out.code.contains("class=\"scoped_title\""));
}

#[tokio::test]
async fn test_multiple_candidates_warn_and_use_first() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.scss", ".title { color: blue; }"),
        ("Card.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();

    let out = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.style_path, dir.path().join("Card.css"));
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].contains("Card.scss"));
}

#[tokio::test]
async fn test_no_candidate_returns_none() {
    let dir = fixture(&[("Card.tsx", COMPONENT), ("Other.css", ".x {}")]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let out = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn test_filtered_module_returns_none() {
    let dir = fixture(&[("Card.ts", "export const x = 1;"), ("Card.css", ".x {}")]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let out = plugin
        .transform("export const x = 1;", &component_id(&dir, "Card.ts"))
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn test_virtual_ids_are_not_transformed() {
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let out = plugin
        .transform(".a{}", "\0virtual:auto-css-modules/abcd1234//src/Card.tsx")
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn test_callback_strategy_skips_listing() {
    let styles = fixture(&[("theme.css", ".title { color: red; }")]);
    let theme = styles.path().join("theme.css");
    let callback: ResolveStyleFn = Arc::new(move |query: StyleQuery| {
        let theme = theme.clone();
        async move {
            (query.component_name == "Card").then(|| StyleCandidate::classify(theme, true))
        }
        .boxed()
    });
    let plugin = AutoCssModules::new(PluginOptions {
        resolve_style_for_component: Some(callback),
        ..scoped_options()
    })
    .unwrap();

    // The component directory does not exist; only the callback is consulted.
    let out = plugin
        .transform(COMPONENT, "/nowhere/Card.tsx")
        .await
        .unwrap()
        .unwrap();
    assert!(out.code.contains("class=\"scoped_title\""));
    assert_eq!(out.style_path, styles.path().join("theme.css"));

    let none = plugin.transform(COMPONENT, "/nowhere/Badge.tsx").await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_missing_directory_has_no_styles() {
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let out = plugin
        .transform(COMPONENT, "/definitely/not/here/Card.tsx")
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn test_foreign_module_ids_are_skipped() {
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    for id in ["virtual:other-plugin/Widget.tsx", "\0mdx:/Widget.jsx"] {
        assert!(plugin.transform(COMPONENT, id).await.unwrap().is_none(), "{}", id);
    }
}

#[tokio::test]
async fn test_failed_rewrite_registers_nothing() {
    let broken = "export const Card = () => <h1 class=\"title\">;\n";
    let dir = fixture(&[
        ("Card.tsx", broken),
        ("Card.module.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let err = plugin
        .transform(broken, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::ComponentParse { .. }));
    assert_eq!(plugin.registry().len(), 0);
}

#[tokio::test]
async fn test_broken_style_fails_transform() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.module.css", ".title { color: red; }\n..broken {}"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let err = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap_err();
    match err {
        PluginError::StyleParse(parse) => {
            assert!(parse.file.ends_with("Card.module.css"));
            assert_eq!(parse.line, 2);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_host_css_modules_override_and_apply_once() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.module.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let host = |pattern: &str| HostConfig {
        dev: false,
        css_modules: Some(CssModulesOptions {
            pattern: Some(pattern.to_string()),
            ..CssModulesOptions::default()
        }),
    };
    plugin.config_resolved(host("host_[local]")).unwrap();
    plugin.config_resolved(host("late_[local]")).unwrap();

    let out = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap()
        .unwrap();
    assert!(out.code.contains("class=\"host_title\""));
}

#[tokio::test]
async fn test_restyle_changes_virtual_id() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.module.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    let id = component_id(&dir, "Card.tsx");

    let first = plugin.transform(COMPONENT, &id).await.unwrap().unwrap();
    let first_id = imported_id(&first.code);
    let first_css = plugin.load(&first_id).unwrap().unwrap();

    fs::write(dir.path().join("Card.module.css"), ".title { color: blue; }").unwrap();
    let second = plugin.transform(COMPONENT, &id).await.unwrap().unwrap();
    let second_id = imported_id(&second.code);
    assert_ne!(first_id, second_id);

    // Stale ids still decode to the latest stylesheet.
    let latest = plugin.load(&second_id).unwrap().unwrap();
    assert_eq!(plugin.load(&first_id).unwrap().unwrap(), latest);
    assert_ne!(latest, first_css);
    assert_eq!(plugin.registry().len(), 1);
}

#[tokio::test]
async fn test_dev_mode_tracks_and_reloads() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.module.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    plugin
        .config_resolved(HostConfig {
            dev: true,
            css_modules: None,
        })
        .unwrap();
    let id = component_id(&dir, "Card.tsx");
    plugin.transform(COMPONENT, &id).await.unwrap().unwrap();

    let seen = RefCell::new(Vec::new());
    let reloader = |reloaded: &str| seen.borrow_mut().push(reloaded.to_string());

    let style = dir.path().join("Card.module.css");
    let reloaded = plugin.handle_watch_event(&WatchEvent::Change(style), &reloader);
    assert_eq!(reloaded, vec![id.clone()]);

    let added = dir.path().join("Card.scss");
    let reloaded = plugin.handle_watch_event(&WatchEvent::Add(added), &reloader);
    assert_eq!(reloaded, vec![id.clone()]);

    let reloaded = plugin.handle_watch_event(&WatchEvent::Unlink(PathBuf::from(&id)), &reloader);
    assert!(reloaded.is_empty());
    assert_eq!(seen.into_inner(), vec![id.clone(), id]);
}

#[tokio::test]
async fn test_watch_events_ignored_outside_dev() {
    let dir = fixture(&[
        ("Card.tsx", COMPONENT),
        ("Card.module.css", ".title { color: red; }"),
    ]);
    let plugin = AutoCssModules::new(scoped_options()).unwrap();
    plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap();

    let reloader = |_: &str| panic!("nothing should reload");
    let style = dir.path().join("Card.module.css");
    assert!(plugin
        .handle_watch_event(&WatchEvent::Change(style), &reloader)
        .is_empty());
}

#[test]
fn test_load_ignores_other_modules() {
    let plugin = AutoCssModules::new(PluginOptions::default()).unwrap();
    assert_eq!(plugin.load("/src/Card.css").unwrap(), None);
    assert_eq!(plugin.resolve_id("./Card.css"), None);
    assert!(matches!(
        plugin.load("\0virtual:auto-css-modules/abcd1234//src/Card.css"),
        Err(PluginError::VirtualModuleNotFound(_))
    ));
}

#[tokio::test]
async fn test_json_options_with_host_callbacks() {
    let dir = fixture(&[
        ("Card.view", COMPONENT),
        ("look.scss", "$title { color: red; }"),
    ]);
    let look = dir.path().join("look.scss");

    let filter: ShouldTransformFn =
        Arc::new(|query: ComponentQuery| async move { query.file_name.ends_with(".view") }.boxed());
    let resolver: ResolveStyleFn = Arc::new(move |_query: StyleQuery| {
        let look = look.clone();
        async move { Some(StyleCandidate::classify(look, true)) }.boxed()
    });
    let manifests = Arc::new(Mutex::new(Vec::new()));
    let get_json: ManifestHook = {
        let manifests = manifests.clone();
        Arc::new(move |path: &Path, manifest: &ScopeManifest| {
            manifests.lock().unwrap().push((path.to_path_buf(), manifest.clone()));
        })
    };
    let expand: Arc<dyn Preprocessor> =
        Arc::new(|_path: &Path, source: &str| -> Result<String, StyleParseError> {
            Ok(source.replace("$title", ".title"))
        });

    let options =
        PluginOptions::from_json(r#"{ "cssModules": { "pattern": "json_[local]" } }"#).unwrap();
    let plugin = AutoCssModules::with_callbacks(
        options,
        HostCallbacks {
            should_transform_component: Some(filter),
            resolve_style_for_component: Some(resolver),
            get_json: Some(get_json),
            preprocessors: vec![(StyleDialect::Scss, expand)],
        },
    )
    .unwrap();

    let out = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.view"))
        .await
        .unwrap()
        .unwrap();
    assert!(out.code.contains("class=\"json_title\""));
    assert_eq!(out.style_path, dir.path().join("look.scss"));

    let manifests = manifests.lock().unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].0, dir.path().join("look.scss"));
    assert_eq!(manifests[0].1.get("title").map(String::as_str), Some("json_title"));

    let skipped = plugin
        .transform(COMPONENT, &component_id(&dir, "Card.tsx"))
        .await
        .unwrap();
    assert!(skipped.is_none());
}
