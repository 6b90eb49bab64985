//! `window.UnityGameAPI` and `window.UnityGameData`.
//!
//! The engine build calls these globals through its JavaScript plugin. Every
//! `UnityGameAPI` entry answers with a JSON string (async ones with a promise of
//! one); `UnityGameData` answers with plain objects.

use std::rc::Rc;

use alverse_core::level::LevelRef;
use alverse_core::numbers::floor_f64_to_u32;
use alverse_core::{Backend, Clock, GameBridge, KeyValueStore, ProgressNotifier};
use js_sys::{JSON, Object, Promise, Reflect};
use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::dom;

const LOG_TARGET: &str = "Unity Bridge";

pub const API_GLOBAL: &str = "UnityGameAPI";
pub const DATA_GLOBAL: &str = "UnityGameData";

/// Tells the map page that progress changed by dispatching a window event.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    event: String,
}

impl EventNotifier {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
        }
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl ProgressNotifier for EventNotifier {
    fn progress_updated(&self) {
        if let Err(err) = dom::dispatch_window_event(&self.event) {
            log::warn!(
                target: LOG_TARGET,
                "Failed to dispatch progress update event: {}",
                dom::js_error_message(&err)
            );
        }
    }
}

/// Serialise a bridge reply, falling back to an error reply the engine can still parse.
#[must_use]
pub fn reply_json<T: Serialize>(reply: &T) -> String {
    serde_json::to_string(reply).unwrap_or_else(|err| {
        serde_json::json!({ "success": false, "error": err.to_string() }).to_string()
    })
}

/// A level argument as the engine passed it.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelArg {
    Number(f64),
    Text(String),
    Missing,
}

impl LevelArg {
    #[must_use]
    pub fn from_js(value: &JsValue) -> Self {
        if let Some(number) = value.as_f64() {
            Self::Number(number)
        } else if let Some(text) = value.as_string() {
            Self::Text(text)
        } else {
            Self::Missing
        }
    }

    #[must_use]
    pub fn as_level_ref(&self) -> LevelRef<'_> {
        match self {
            Self::Number(number) => LevelRef::Number(*number),
            Self::Text(text) => LevelRef::Text(text),
            Self::Missing => LevelRef::Missing,
        }
    }
}

/// Non-empty text, or a number the engine passed as an id.
fn optional_text(value: &JsValue) -> Option<String> {
    value
        .as_string()
        .or_else(|| value.as_f64().filter(|n| n.is_finite()).map(|n| n.to_string()))
        .filter(|text| !text.is_empty())
}

/// Payload JSON from a string argument or a plain object. A missing payload is empty.
fn payload_json(value: &JsValue) -> String {
    if value.is_undefined() || value.is_null() {
        return "{}".to_string();
    }
    value
        .as_string()
        .or_else(|| JSON::stringify(value).ok().and_then(|json| json.as_string()))
        .unwrap_or_default()
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

/// Closures installed on `window`; dropping them detaches the bridge.
pub struct BridgeBindings {
    _level_start: Closure<dyn Fn(JsValue, JsValue) -> String>,
    _level_complete: Closure<dyn Fn(JsValue) -> Promise>,
    _user_info: Closure<dyn Fn() -> String>,
    _can_play: Closure<dyn Fn(JsValue) -> Promise>,
    _return_to_map: Closure<dyn Fn()>,
    _user_progress: Closure<dyn Fn() -> Promise>,
    _leaderboard: Closure<dyn Fn(JsValue, JsValue) -> Promise>,
}

impl BridgeBindings {
    /// Keep the globals answering for the rest of the page lifetime.
    pub fn forget(self) {
        self._level_start.forget();
        self._level_complete.forget();
        self._user_info.forget();
        self._can_play.forget();
        self._return_to_map.forget();
        self._user_progress.forget();
        self._leaderboard.forget();
    }
}

fn set(target: &Object, name: &str, value: &JsValue) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(name), value).map(drop)
}

fn build<B, L, T, C, N>(bridge: &Rc<GameBridge<B, L, T, C, N>>) -> BridgeBindings
where
    B: Backend + Clone + 'static,
    L: KeyValueStore + Clone + 'static,
    T: KeyValueStore + 'static,
    C: Clock + Clone + 'static,
    N: ProgressNotifier + 'static,
{
    let start_bridge = Rc::clone(bridge);
    let level_start = Closure::<dyn Fn(JsValue, JsValue) -> String>::new(
        move |level: JsValue, session: JsValue| {
            let level = LevelArg::from_js(&level);
            let session = optional_text(&session);
            reply_json(&start_bridge.on_level_start(level.as_level_ref(), session.as_deref()))
        },
    );

    let complete_bridge = Rc::clone(bridge);
    let level_complete = Closure::<dyn Fn(JsValue) -> Promise>::new(move |payload: JsValue| {
        let bridge = Rc::clone(&complete_bridge);
        let json = payload_json(&payload);
        future_to_promise(async move {
            let reply = bridge.on_level_complete_json(&json).await;
            Ok(JsValue::from_str(&reply_json(&reply)))
        })
    });

    let info_bridge = Rc::clone(bridge);
    let user_info =
        Closure::<dyn Fn() -> String>::new(move || reply_json(&info_bridge.get_user_info()));

    let play_bridge = Rc::clone(bridge);
    let can_play = Closure::<dyn Fn(JsValue) -> Promise>::new(move |level: JsValue| {
        let bridge = Rc::clone(&play_bridge);
        let level = LevelArg::from_js(&level);
        future_to_promise(async move {
            let permission = bridge.can_play_level(level.as_level_ref()).await;
            Ok(JsValue::from_str(&reply_json(&permission)))
        })
    });

    let map_bridge = Rc::clone(bridge);
    let return_to_map = Closure::<dyn Fn()>::new(move || {
        let url = map_bridge.return_to_map();
        if let Err(err) = dom::navigate(&url) {
            log::error!(
                target: LOG_TARGET,
                "Could not return to map: {}",
                dom::js_error_message(&err)
            );
        }
    });

    let progress_bridge = Rc::clone(bridge);
    let user_progress = Closure::<dyn Fn() -> Promise>::new(move || {
        let bridge = Rc::clone(&progress_bridge);
        future_to_promise(async move { Ok(to_js(&bridge.get_user_progress().await)) })
    });

    let board_bridge = Rc::clone(bridge);
    let leaderboard =
        Closure::<dyn Fn(JsValue, JsValue) -> Promise>::new(move |level: JsValue, limit: JsValue| {
            let bridge = Rc::clone(&board_bridge);
            let level = match LevelArg::from_js(&level) {
                LevelArg::Missing => None,
                LevelArg::Text(text) if text.is_empty() => None,
                present => Some(alverse_core::sanitise_level_id(present.as_level_ref())),
            };
            let limit = limit
                .as_f64()
                .filter(|n| *n >= 1.0)
                .and_then(|n| usize::try_from(floor_f64_to_u32(n)).ok());
            future_to_promise(async move {
                let entries = bridge.get_leaderboard(level.as_deref(), limit).await;
                Ok(to_js(&entries))
            })
        });

    BridgeBindings {
        _level_start: level_start,
        _level_complete: level_complete,
        _user_info: user_info,
        _can_play: can_play,
        _return_to_map: return_to_map,
        _user_progress: user_progress,
        _leaderboard: leaderboard,
    }
}

fn attach(bindings: &BridgeBindings) -> Result<(), JsValue> {
    let api = Object::new();
    set(&api, "onLevelStart", bindings._level_start.as_ref())?;
    set(&api, "onLevelComplete", bindings._level_complete.as_ref())?;
    set(&api, "getUserInfo", bindings._user_info.as_ref())?;
    set(&api, "canPlayLevel", bindings._can_play.as_ref())?;
    set(&api, "returnToMap", bindings._return_to_map.as_ref())?;
    dom::set_global(API_GLOBAL, &api)?;

    // Keep whatever the page already put on UnityGameData.
    let data: Object = dom::global(DATA_GLOBAL)
        .filter(JsValue::is_object)
        .map_or_else(Object::new, JsCast::unchecked_into);
    set(&data, "saveLevelCompletion", bindings._level_complete.as_ref())?;
    set(&data, "getUserProgress", bindings._user_progress.as_ref())?;
    set(&data, "getLeaderboard", bindings._leaderboard.as_ref())?;
    dom::set_global(DATA_GLOBAL, &data)?;
    Ok(())
}

/// Install the engine globals backed by `bridge`. Keep the returned bindings
/// alive for as long as the globals should answer.
///
/// # Errors
/// Returns an error if there is no browser window to install on.
pub fn install<B, L, T, C, N>(
    bridge: &Rc<GameBridge<B, L, T, C, N>>,
) -> Result<BridgeBindings, JsValue>
where
    B: Backend + Clone + 'static,
    L: KeyValueStore + Clone + 'static,
    T: KeyValueStore + 'static,
    C: Clock + Clone + 'static,
    N: ProgressNotifier + 'static,
{
    let bindings = build(bridge);
    attach(&bindings)?;
    log::info!(target: LOG_TARGET, "Initialised successfully");
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alverse_core::{LevelCompleteResponse, PlayPermission, sanitise_level_id};

    #[test]
    fn replies_use_engine_field_names() {
        let reply = reply_json(&PlayPermission {
            can_play: false,
            reason: "User not authenticated".to_string(),
        });
        assert_eq!(reply, r#"{"canPlay":false,"reason":"User not authenticated"}"#);
    }

    #[test]
    fn failure_replies_omit_outcome_fields() {
        let reply: LevelCompleteResponse = serde_json::from_str(
            r#"{"success":false,"error":"User not authenticated"}"#,
        )
        .unwrap();
        let json = reply_json(&reply);
        assert!(!json.contains("canProceed"));
        assert!(!json.contains("score"));
    }

    #[test]
    fn level_args_sanitise_like_engine_ids() {
        assert_eq!(sanitise_level_id(LevelArg::Number(3.0).as_level_ref()), "level_3");
        assert_eq!(
            sanitise_level_id(LevelArg::Text("7".into()).as_level_ref()),
            "level_7"
        );
        assert_eq!(sanitise_level_id(LevelArg::Missing.as_level_ref()), "level_1");
    }

    #[test]
    fn notifier_keeps_configured_event() {
        let notifier = EventNotifier::new("alvverse:progress-updated");
        assert_eq!(notifier.event(), "alvverse:progress-updated");
    }
}
