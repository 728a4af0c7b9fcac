//! WebAssembly entry point and browser integration.
//!
//! The page's URL fragment carries the share token. On startup the fragment
//! is decoded into the scene; `share` writes the current token back with
//! `history.replaceState` so the address bar always holds a working link.

use crate::App;
use sketchlink_core::config::SketchConfig;
use sketchlink_core::editor::{EditorError, StartupSource};
use sketchlink_core::history::HistoryError;
use sketchlink_core::svg::DEFAULT_SVG_FILE_NAME;
use std::cell::RefCell;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn with_app<T>(f: impl FnOnce(&mut App) -> Result<T, JsValue>) -> Result<T, JsValue> {
    APP.with(|cell| match cell.borrow_mut().as_mut() {
        Some(app) => f(app),
        None => Err(JsValue::from_str("SketchLink has not started")),
    })
}

/// Read the share token from `location.hash`.
pub fn get_hash() -> Option<String> {
    let hash = web_sys::window()?.location().hash().ok()?;
    let token = hash.trim_start_matches('#');
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Initialize logging and load the scene from the URL fragment.
#[wasm_bindgen(start)]
pub fn run_wasm() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::warn_1(&to_js(e));
    }
    log::info!("Starting SketchLink (WASM)");

    let hash = get_hash();
    let (app, source) = App::open(&SketchConfig::default(), hash.as_deref()).map_err(to_js)?;
    if let StartupSource::Fallback(err) = source {
        log::error!("Shared drawing failed at {} stage: {}", err.stage(), err);
        if let Some(window) = web_sys::window() {
            window.alert_with_message(err.user_message()).ok();
        }
    }
    APP.with(|cell| *cell.borrow_mut() = Some(app));
    Ok(())
}

/// Encode the scene into the address bar and return the full link.
#[wasm_bindgen]
pub fn share() -> Result<String, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let href = window.location().href()?;
    let url = with_app(|app| app.editor().share_url(&href).map_err(to_js))?;
    window
        .history()?
        .replace_state_with_url(&JsValue::NULL, "", Some(url.as_str()))?;
    log::info!("Share link updated ({} bytes)", url.as_str().len());
    Ok(url.to_string())
}

/// Step back one snapshot. Returns false when already at the start.
#[wasm_bindgen]
pub fn undo() -> Result<bool, JsValue> {
    with_app(|app| match app.editor_mut().undo() {
        Ok(_) => Ok(true),
        Err(EditorError::History(HistoryError::UndoUnderflow)) => Ok(false),
        Err(e) => Err(to_js(e)),
    })
}

/// Re-apply an undone snapshot. Returns false when there is nothing to redo.
#[wasm_bindgen]
pub fn redo() -> Result<bool, JsValue> {
    with_app(|app| match app.editor_mut().redo() {
        Ok(_) => Ok(true),
        Err(EditorError::History(HistoryError::RedoEmpty)) => Ok(false),
        Err(e) => Err(to_js(e)),
    })
}

/// Apply a command script as one undoable step.
#[wasm_bindgen]
pub fn apply_commands(script: &str) -> Result<(), JsValue> {
    with_app(|app| app.apply(script).map(|_| ()).map_err(to_js))
}

/// Current scene as JSON, for the host page to draw.
#[wasm_bindgen]
pub fn scene_json() -> Result<String, JsValue> {
    with_app(|app| app.document().to_json().map_err(to_js))
}

/// Download the scene as `canvas.svg`.
#[wasm_bindgen]
pub fn download_svg() -> Result<(), JsValue> {
    let svg = with_app(|app| Ok(app.export_svg()))?;
    download_file(DEFAULT_SVG_FILE_NAME, &svg, "image/svg+xml")
}

fn download_file(filename: &str, content: &str, mime_type: &str) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("No document"))?;

    let blob_parts = js_sys::Array::new();
    blob_parts.push(&JsValue::from_str(content));

    let options = web_sys::BlobPropertyBag::new();
    options.set_type(mime_type);
    let blob = web_sys::Blob::new_with_str_sequence_and_options(&blob_parts, &options)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob)?;

    let a = document
        .create_element("a")?
        .dyn_into::<web_sys::HtmlAnchorElement>()?;
    a.set_href(&url);
    a.set_download(filename);
    a.click();

    web_sys::Url::revoke_object_url(&url).ok();
    Ok(())
}
