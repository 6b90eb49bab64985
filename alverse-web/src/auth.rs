//! `window.AlverseAuth` for the login and sign-up pages.
//!
//! Each entry returns a promise of a JSON string: on success the cached
//! identity and the page to continue to, otherwise `{ success: false, error }`.

use std::rc::Rc;

use alverse_core::{
    AccountError, AccountService, Backend, CachedIdentity, Clock, KeyValueStore, SignUpForm,
    SignUpReport,
};
use js_sys::{Object, Promise, Reflect};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::bridge::reply_json;
use crate::dom;

pub const AUTH_GLOBAL: &str = "AlverseAuth";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_pending: Option<bool>,
    /// Page the login screen should move on to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthReply {
    #[must_use]
    pub fn signed_in(identity: &CachedIdentity, redirect: &str) -> Self {
        Self {
            success: true,
            username: Some(identity.display_name().to_string()),
            email: identity.email.clone(),
            user_id: identity.user_id.clone(),
            redirect: Some(redirect.to_string()),
            ..Self::default()
        }
    }

    /// After sign-up the player stays on the login page until the address is confirmed.
    #[must_use]
    pub fn signed_up(report: &SignUpReport, redirect: &str) -> Self {
        if report.confirmation_pending {
            Self {
                confirmation_pending: Some(true),
                redirect: None,
                ..Self::signed_in(&report.identity, redirect)
            }
        } else {
            Self {
                confirmation_pending: Some(false),
                ..Self::signed_in(&report.identity, redirect)
            }
        }
    }

    #[must_use]
    pub fn failed(err: &AccountError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn signed_out(redirect: &str) -> Self {
        Self {
            success: true,
            redirect: Some(redirect.to_string()),
            ..Self::default()
        }
    }
}

/// Sign-up form fields as the page sends them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignUpFields {
    pub username: String,
    pub email: String,
    pub school_name: String,
    pub password: String,
    pub password_confirm: String,
}

impl From<SignUpFields> for SignUpForm {
    fn from(fields: SignUpFields) -> Self {
        Self {
            username: fields.username,
            email: fields.email,
            school_name: fields.school_name,
            password: fields.password,
            password_confirm: fields.password_confirm,
        }
    }
}

/// Where each flow sends the player next.
#[derive(Debug, Clone)]
pub struct AuthRoutes {
    pub map_url: String,
    pub login_url: String,
}

pub struct AuthBindings {
    sign_in: Closure<dyn Fn(JsValue, JsValue) -> Promise>,
    sign_up: Closure<dyn Fn(JsValue) -> Promise>,
    complete_oauth: Closure<dyn Fn() -> Promise>,
    logout: Closure<dyn Fn() -> Promise>,
}

impl AuthBindings {
    /// Keep the closures alive for the rest of the page lifetime.
    pub fn forget(self) {
        self.sign_in.forget();
        self.sign_up.forget();
        self.complete_oauth.forget();
        self.logout.forget();
    }
}

fn resolve_reply(reply: &AuthReply) -> Result<JsValue, JsValue> {
    Ok(JsValue::from_str(&reply_json(reply)))
}

/// Install `window.AlverseAuth` over `accounts`.
///
/// # Errors
/// Returns an error if there is no browser window to install on.
pub fn install<B, S, C>(
    accounts: &Rc<AccountService<B, S, C>>,
    routes: &AuthRoutes,
) -> Result<AuthBindings, JsValue>
where
    B: Backend + 'static,
    S: KeyValueStore + 'static,
    C: Clock + 'static,
{
    let routes = Rc::new(routes.clone());

    let (svc, to) = (Rc::clone(accounts), Rc::clone(&routes));
    let sign_in = Closure::<dyn Fn(JsValue, JsValue) -> Promise>::new(
        move |email: JsValue, password: JsValue| {
            let (svc, to) = (Rc::clone(&svc), Rc::clone(&to));
            let email = email.as_string().unwrap_or_default();
            let password = password.as_string().unwrap_or_default();
            future_to_promise(async move {
                let reply = match svc.sign_in(email.trim(), &password).await {
                    Ok(identity) => AuthReply::signed_in(&identity, &to.map_url),
                    Err(err) => AuthReply::failed(&err),
                };
                resolve_reply(&reply)
            })
        },
    );

    let (svc, to) = (Rc::clone(accounts), Rc::clone(&routes));
    let sign_up = Closure::<dyn Fn(JsValue) -> Promise>::new(move |form: JsValue| {
        let (svc, to) = (Rc::clone(&svc), Rc::clone(&to));
        let fields: SignUpFields = serde_wasm_bindgen::from_value(form).unwrap_or_default();
        future_to_promise(async move {
            let reply = match svc.sign_up(&fields.into()).await {
                Ok(report) => AuthReply::signed_up(&report, &to.map_url),
                Err(err) => AuthReply::failed(&err),
            };
            resolve_reply(&reply)
        })
    });

    let (svc, to) = (Rc::clone(accounts), Rc::clone(&routes));
    let complete_oauth = Closure::<dyn Fn() -> Promise>::new(move || {
        let (svc, to) = (Rc::clone(&svc), Rc::clone(&to));
        future_to_promise(async move {
            let reply = match svc.complete_oauth().await {
                Ok(Some(identity)) => AuthReply::signed_in(&identity, &to.map_url),
                Ok(None) => AuthReply::default(),
                Err(err) => AuthReply::failed(&err),
            };
            resolve_reply(&reply)
        })
    });

    let (svc, to) = (Rc::clone(accounts), Rc::clone(&routes));
    let logout = Closure::<dyn Fn() -> Promise>::new(move || {
        let (svc, to) = (Rc::clone(&svc), Rc::clone(&to));
        future_to_promise(async move {
            let reply = match svc.logout().await {
                Ok(()) => AuthReply::signed_out(&to.login_url),
                Err(err) => AuthReply::failed(&err),
            };
            resolve_reply(&reply)
        })
    });

    let auth = Object::new();
    for (name, value) in [
        ("signIn", sign_in.as_ref()),
        ("signUp", sign_up.as_ref()),
        ("completeOAuth", complete_oauth.as_ref()),
        ("logout", logout.as_ref()),
    ] {
        Reflect::set(&auth, &JsValue::from_str(name), value)?;
    }
    dom::set_global(AUTH_GLOBAL, &auth)?;

    Ok(AuthBindings {
        sign_in,
        sign_up,
        complete_oauth,
        logout,
    })
}
