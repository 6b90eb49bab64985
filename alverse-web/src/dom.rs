use js_sys::Reflect;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CustomEvent, Document, Storage, Window};

/// Retrieve the global `window` object, if running in a browser.
#[must_use]
pub fn window() -> Option<Window> {
    web_sys::window()
}

#[must_use]
pub fn document() -> Option<Document> {
    window().and_then(|win| win.document())
}

fn missing(what: &str) -> JsValue {
    JsValue::from_str(&format!("{what} unavailable"))
}

/// Convert a JavaScript value into a readable string for error reporting.
///
/// Handles thrown strings, `Error` instances and plain `{ message }` objects
/// such as the error records returned by the hosted service client.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .or_else(|| {
            Reflect::get(value, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Log an error message to the browser console.
pub fn console_error(message: &str) {
    web_sys::console::error_1(&JsValue::from(message));
}

/// Access the browser `localStorage` handle.
///
/// # Errors
/// Returns an error if the browser window cannot be accessed or `localStorage` is unavailable.
pub fn local_storage() -> Result<Storage, JsValue> {
    window()
        .ok_or_else(|| missing("window"))?
        .local_storage()?
        .ok_or_else(|| missing("localStorage"))
}

/// Access the tab-scoped `sessionStorage` handle.
///
/// # Errors
/// Returns an error if the browser window cannot be accessed or `sessionStorage` is unavailable.
pub fn session_storage() -> Result<Storage, JsValue> {
    window()
        .ok_or_else(|| missing("window"))?
        .session_storage()?
        .ok_or_else(|| missing("sessionStorage"))
}

/// Read a property of `window`, returning `None` when it is `undefined` or `null`.
#[must_use]
pub fn global(name: &str) -> Option<JsValue> {
    let win = window()?;
    Reflect::get(&win, &JsValue::from_str(name))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

/// Numeric value of a `window` property, coerced the way `Number(x)` would.
#[must_use]
pub fn global_number(name: &str) -> Option<f64> {
    let value = global(name)?;
    let number = value
        .as_f64()
        .or_else(|| value.as_string().and_then(|text| text.trim().parse().ok()))?;
    number.is_finite().then_some(number)
}

/// Set a property on `window`.
///
/// # Errors
/// Returns an error if there is no window or the property cannot be written.
pub fn set_global(name: &str, value: &JsValue) -> Result<(), JsValue> {
    let win = window().ok_or_else(|| missing("window"))?;
    Reflect::set(&win, &JsValue::from_str(name), value)?;
    Ok(())
}

/// Send the browser to `url`.
///
/// # Errors
/// Returns an error if there is no window or the location cannot be changed.
pub fn navigate(url: &str) -> Result<(), JsValue> {
    window()
        .ok_or_else(|| missing("window"))?
        .location()
        .set_href(url)
}

/// Ask the player to confirm. No window means no.
#[must_use]
pub fn confirm(message: &str) -> bool {
    window()
        .and_then(|win| win.confirm_with_message(message).ok())
        .unwrap_or(false)
}

/// Dispatch a `CustomEvent` named `name` on `window`.
///
/// # Errors
/// Returns an error if there is no window or the event cannot be created.
pub fn dispatch_window_event(name: &str) -> Result<(), JsValue> {
    let win = window().ok_or_else(|| missing("window"))?;
    let event = CustomEvent::new(name)?;
    win.dispatch_event(&event)?;
    Ok(())
}
