#![forbid(unsafe_code)]
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod app;
pub mod auth;
pub mod bridge;
pub mod dom;
pub mod hosted;
pub mod pages;
pub mod storage;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    if let Err(err) = console_log::init_with_level(log::Level::Info) {
        dom::console_error(&format!("Console logger unavailable: {err}"));
    }
    if let Err(err) = app::boot() {
        dom::console_error(&format!("Alverse failed to start: {err:#}"));
    }
}
