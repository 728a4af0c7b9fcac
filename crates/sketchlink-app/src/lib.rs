//! SketchLink Application
//!
//! Session wrapper around the core editor, shared by the command-line tool
//! and the browser build.

mod app;

pub use app::{App, AppError, AppResult};

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use web::run_wasm;
