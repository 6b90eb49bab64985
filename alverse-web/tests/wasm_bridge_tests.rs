#![cfg(target_arch = "wasm32")]

use std::cell::Cell;
use std::rc::Rc;

use alverse_core::{
    AccountService, AlverseConfig, GameBridge, ManualClock, MemoryBackend, MemoryStore,
    ProgressService, SignUpForm,
};
use alverse_web::bridge::{self, API_GLOBAL, BridgeBindings, DATA_GLOBAL, EventNotifier};
use alverse_web::dom;
use js_sys::{Function, Promise, Reflect};
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

const EVENT: &str = "alverse-test:progress";

async fn install_signed_in() -> BridgeBindings {
    let backend = MemoryBackend::new();
    let local = MemoryStore::new();
    let clock = ManualClock::default();
    let accounts = AccountService::new(backend.clone(), local.clone(), clock.clone());
    accounts
        .sign_up(&SignUpForm {
            username: "ada".into(),
            email: "ada@example.com".into(),
            school_name: "North High".into(),
            password: "secret".into(),
            password_confirm: "secret".into(),
        })
        .await
        .expect("sign up");
    let service = ProgressService::new(backend, local, clock, AlverseConfig::default());
    let game = Rc::new(GameBridge::new(
        service,
        MemoryStore::new(),
        EventNotifier::new(EVENT),
    ));
    bridge::install(&game).expect("bridge installs")
}

fn method(global: &str, name: &str) -> Function {
    let target = dom::global(global).expect("global installed");
    Reflect::get(&target, &JsValue::from_str(name))
        .expect("method readable")
        .dyn_into()
        .expect("method is a function")
}

fn parse(value: &JsValue) -> Value {
    serde_json::from_str(&value.as_string().expect("json string")).expect("valid json")
}

async fn settle(value: JsValue) -> JsValue {
    JsFuture::from(value.dyn_into::<Promise>().expect("promise"))
        .await
        .expect("promise resolves")
}

#[wasm_bindgen_test]
async fn user_info_reads_the_cached_identity() {
    let _bindings = install_signed_in().await;
    let info = method(API_GLOBAL, "getUserInfo")
        .call0(&JsValue::NULL)
        .expect("call");
    let info = parse(&info);
    assert_eq!(info["username"], "ada");
    assert_eq!(info["email"], "ada@example.com");
}

#[wasm_bindgen_test]
async fn completion_through_the_globals_dispatches_progress() {
    let _bindings = install_signed_in().await;

    let fired = Rc::new(Cell::new(0_u32));
    let counter = Rc::clone(&fired);
    let listener = Closure::<dyn Fn()>::new(move || counter.set(counter.get() + 1));
    dom::window()
        .expect("window")
        .add_event_listener_with_callback(EVENT, listener.as_ref().unchecked_ref())
        .expect("listener");

    let started = method(API_GLOBAL, "onLevelStart")
        .call2(&JsValue::NULL, &JsValue::from_f64(1.0), &JsValue::UNDEFINED)
        .expect("call");
    assert_eq!(parse(&started)["success"], true);

    let payload = JsValue::from_str(r#"{"levelID":1,"score":40,"passed":true}"#);
    let reply = method(API_GLOBAL, "onLevelComplete")
        .call1(&JsValue::NULL, &payload)
        .expect("call");
    let reply = parse(&settle(reply).await);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["canProceed"], true);
    assert_eq!(fired.get(), 1);
    listener.forget();

    let progress = method(DATA_GLOBAL, "getUserProgress")
        .call0(&JsValue::NULL)
        .expect("call");
    let progress: Value =
        serde_wasm_bindgen::from_value(settle(progress).await).expect("progress object");
    assert_eq!(progress["completedLevels"], serde_json::json!([1]));
    assert_eq!(progress["highScores"]["level_1"], 40);
}

#[wasm_bindgen_test]
async fn locked_levels_are_refused() {
    let _bindings = install_signed_in().await;
    let permission = method(API_GLOBAL, "canPlayLevel")
        .call1(&JsValue::NULL, &JsValue::from_str("level_4"))
        .expect("call");
    let permission = parse(&settle(permission).await);
    assert_eq!(permission["canPlay"], false);
}

#[wasm_bindgen_test]
async fn completion_without_payload_passes_by_default() {
    let _bindings = install_signed_in().await;
    let reply = method(API_GLOBAL, "onLevelComplete")
        .call0(&JsValue::NULL)
        .expect("call");
    let reply = parse(&settle(reply).await);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["canProceed"], true);
}

#[wasm_bindgen_test]
async fn numeric_session_ids_are_kept() {
    let _bindings = install_signed_in().await;
    let started = method(API_GLOBAL, "onLevelStart")
        .call2(
            &JsValue::NULL,
            &JsValue::from_f64(2.0),
            &JsValue::from_f64(12345.0),
        )
        .expect("call");
    let started = parse(&started);
    assert_eq!(started["success"], true);
    assert_eq!(started["sessionId"], "12345");
}

#[wasm_bindgen_test]
fn console_logger_accepts_records() {
    let _ = console_log::init_with_level(log::Level::Info);
    assert!(log::max_level() >= log::LevelFilter::Info);
    log::info!(target: "Unity Bridge", "console logger ready");
}
