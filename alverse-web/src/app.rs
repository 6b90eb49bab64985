use std::rc::Rc;

use alverse_core::{
    AccountService, AlverseConfig, CachedIdentity, GameBridge, LevelCatalog, LevelMapModel,
    MapViewState, ProgressService, ProgressSnapshot, SystemClock,
};
use anyhow::{Context, anyhow};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

use crate::auth::{self, AuthRoutes};
use crate::bridge::{self, EventNotifier};
use crate::dom;
use crate::hosted::HostedBackend;
use crate::pages::map::MapPage;
use crate::storage::WebStorage;

/// Element the level map renders into. Level pages don't have it.
pub const MAP_ROOT_ID: &str = "level-map";
/// Deployment override for the number of playable levels.
pub const TOTAL_LEVELS_GLOBAL: &str = "ALVERSE_TOTAL_LEVELS";

const RESET_PROMPT: &str =
    "Are you sure you want to reset all progress? This will delete all your scores.";

pub type WebService = ProgressService<HostedBackend, WebStorage, SystemClock>;
pub type WebAccounts = AccountService<HostedBackend, WebStorage, SystemClock>;
pub type WebBridge = GameBridge<HostedBackend, WebStorage, WebStorage, SystemClock, EventNotifier>;

/// Bundled configuration with the page's level-count override applied.
#[must_use]
pub fn runtime_config() -> AlverseConfig {
    AlverseConfig::load_from_static()
        .with_total_levels_override(dom::global_number(TOTAL_LEVELS_GLOBAL))
}

fn js_error(err: &JsValue) -> anyhow::Error {
    anyhow!(dom::js_error_message(err))
}

/// Wire the services to the page and install every global the page scripts use.
///
/// # Errors
/// Fails when the backend adapter is missing or a global cannot be installed.
pub fn boot() -> anyhow::Result<()> {
    let config = runtime_config();
    let backend =
        HostedBackend::from_window(&config).context("Hosted backend adapter not found")?;
    let local = WebStorage::local();

    let service: WebService =
        ProgressService::new(backend.clone(), local.clone(), SystemClock, config.clone());
    let accounts: Rc<WebAccounts> = Rc::new(AccountService::new(backend, local, SystemClock));

    let game: Rc<WebBridge> = Rc::new(GameBridge::new(
        service.clone(),
        WebStorage::session(),
        EventNotifier::new(config.progress_event.clone()),
    ));
    bridge::install(&game).map_err(|e| js_error(&e))?.forget();

    let routes = AuthRoutes {
        map_url: config.map_url.clone(),
        login_url: config.login_url.clone(),
    };
    auth::install(&accounts, &routes)
        .map_err(|e| js_error(&e))?
        .forget();

    if let Some(root) = dom::document().and_then(|doc| doc.get_element_by_id(MAP_ROOT_ID)) {
        log::info!("Rendering level map ({} levels)", config.total_levels());
        yew::Renderer::<App>::with_root_and_props(
            root,
            AppProps {
                service: Rc::new(service),
                accounts,
            },
        )
        .render();
    }
    Ok(())
}

#[derive(Properties, Clone)]
pub struct AppProps {
    pub service: Rc<WebService>,
    pub accounts: Rc<WebAccounts>,
}

impl PartialEq for AppProps {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.service, &other.service) && Rc::ptr_eq(&self.accounts, &other.accounts)
    }
}

#[derive(Clone)]
struct MapHandles {
    snapshot: UseStateHandle<Rc<ProgressSnapshot>>,
    signed_in: UseStateHandle<bool>,
    loading: UseStateHandle<bool>,
    error: UseStateHandle<Option<String>>,
}

impl MapHandles {
    fn apply(&self, snapshot: ProgressSnapshot) {
        self.snapshot.set(Rc::new(snapshot));
        self.error.set(None);
    }

    fn fail(&self, message: impl std::fmt::Display) {
        log::error!("Level map: {message}");
        self.error.set(Some(message.to_string()));
    }
}

fn go_to(url: &str) {
    if let Err(err) = dom::navigate(url) {
        log::error!("Navigation to {url} failed: {}", dom::js_error_message(&err));
    }
}

async fn reload(service: Rc<WebService>, handles: MapHandles) {
    match service.refresh().await {
        Ok(Some(snapshot)) => handles.apply(snapshot),
        Ok(None) => {}
        Err(err) => handles.fail(err),
    }
}

async fn load_and_follow(service: Rc<WebService>, handles: MapHandles) {
    let user = match service.current_user().await {
        Ok(Some(user)) => user,
        Ok(None) => {
            log::info!("No session; sending the player to sign in");
            go_to(&service.config().login_url);
            return;
        }
        Err(err) => {
            handles.fail(err);
            handles.loading.set(false);
            return;
        }
    };

    handles.signed_in.set(true);
    reload(Rc::clone(&service), handles.clone()).await;
    handles.loading.set(false);

    let mut watch = service.watch(&user.id);
    while let Some(snapshot) = watch.next().await {
        handles.apply(snapshot);
    }
    log::debug!("Score feed closed for {}", user.id);
}

/// Reload whenever the bridge reports new progress in this tab.
fn listen_for_progress(service: &Rc<WebService>, handles: &MapHandles) -> Option<Box<dyn FnOnce()>> {
    let win = dom::window()?;
    let event = service.config().progress_event.clone();
    let (service, handles) = (Rc::clone(service), handles.clone());
    let listener = Closure::<dyn Fn()>::new(move || {
        spawn_local(reload(Rc::clone(&service), handles.clone()));
    });
    if let Err(err) =
        win.add_event_listener_with_callback(&event, listener.as_ref().unchecked_ref())
    {
        log::warn!("Progress listener not installed: {}", dom::js_error_message(&err));
        return None;
    }
    Some(Box::new(move || {
        let _ = win.remove_event_listener_with_callback(&event, listener.as_ref().unchecked_ref());
    }))
}

#[function_component(App)]
pub fn app(props: &AppProps) -> Html {
    let service = Rc::clone(&props.service);
    let total = service.total_levels();

    let handles = MapHandles {
        snapshot: use_state(|| Rc::new(ProgressSnapshot::empty("", total))),
        signed_in: use_state(|| false),
        loading: use_state(|| true),
        error: use_state(|| None::<String>),
    };
    let busy = use_state(|| false);
    let resetting = use_state(|| false);
    let config = {
        let service = Rc::clone(&service);
        use_memo((), move |()| service.config().clone())
    };

    {
        let (service, handles) = (Rc::clone(&service), handles.clone());
        use_effect_with((), move |()| {
            spawn_local(load_and_follow(Rc::clone(&service), handles.clone()));
            let cleanup = listen_for_progress(&service, &handles);
            move || {
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
            }
        });
    }

    let on_next = {
        let (service, handles, busy) = (Rc::clone(&service), handles.clone(), busy.clone());
        Callback::from(move |()| {
            if *busy {
                return;
            }
            busy.set(true);
            let (service, handles, busy) = (Rc::clone(&service), handles.clone(), busy.clone());
            spawn_local(async move {
                match service.simulate_next().await {
                    Ok(snapshot) => handles.apply(snapshot),
                    Err(err) => handles.fail(err),
                }
                busy.set(false);
            });
        })
    };

    let on_reset = {
        let (service, handles) = (Rc::clone(&service), handles.clone());
        let (busy, resetting) = (busy.clone(), resetting.clone());
        Callback::from(move |()| {
            if *busy || !dom::confirm(RESET_PROMPT) {
                return;
            }
            busy.set(true);
            resetting.set(true);
            let (service, handles) = (Rc::clone(&service), handles.clone());
            let (busy, resetting) = (busy.clone(), resetting.clone());
            spawn_local(async move {
                match service.reset_progress().await {
                    Ok(snapshot) => handles.apply(snapshot),
                    Err(err) => handles.fail(format!("Failed to reset progress: {err}")),
                }
                resetting.set(false);
                busy.set(false);
            });
        })
    };

    let on_logout = {
        let accounts = Rc::clone(&props.accounts);
        let login_url = service.config().login_url.clone();
        Callback::from(move |()| {
            let (accounts, login_url) = (Rc::clone(&accounts), login_url.clone());
            spawn_local(async move {
                if let Err(err) = accounts.logout().await {
                    log::warn!("Logout failed: {err}");
                }
                go_to(&login_url);
            });
        })
    };

    let on_open = Callback::from(|url: String| go_to(&url));

    let model = Rc::new(LevelMapModel::from_snapshot(
        &handles.snapshot,
        LevelCatalog::default_catalog(),
        MapViewState {
            signed_in: *handles.signed_in,
            loading: *handles.loading,
            busy: *busy,
        },
    ));
    let identity = CachedIdentity::load(service.local());

    html! {
        <MapPage
            {model}
            {config}
            username={AttrValue::from(identity.display_name().to_string())}
            email={AttrValue::from(identity.email.clone().unwrap_or_default())}
            error={(*handles.error).clone().map(AttrValue::from)}
            resetting={*resetting}
            {on_open}
            {on_next}
            {on_reset}
            {on_logout}
        />
    }
}
