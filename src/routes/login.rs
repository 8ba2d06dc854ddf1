//! Superset's login view with token login in front of the password form.
//!
//! - `GET /login` - Token login (`?token=` or the `token` cookie), else the form
//! - `POST /login` - Username/password login against the user store
//! - `GET /logout` - Ends the session
//! - `GET /me` - The session's user

use std::collections::HashMap;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use handlebars::{Handlebars, RenderError, TemplateError};
use serde_json::{Map, Value, json};
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite as CookieSameSite, time::Duration as CookieDuration},
};

use crate::{
    AppState,
    auth::{AuthError, LoginMethod, Session, require_session, verify_password},
    config::{BrandingConfig, SameSite, SessionConfig},
    store::SupersetUser,
};

/// Shown for every failed form login, whatever the cause.
pub const INVALID_LOGIN_MESSAGE: &str = "Invalid login. Please try again.";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub roles: Vec<String>,
    pub extra: Map<String, Value>,
    pub login_method: LoginMethod,
    pub session_expires_at: DateTime<Utc>,
}

fn cookie_same_site(same_site: SameSite) -> CookieSameSite {
    match same_site {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    }
}

/// Session cookie. Persistent ("remember me") cookies outlive the browser.
fn build_session_cookie(
    config: &SessionConfig,
    session_id: String,
    persistent: bool,
) -> Cookie<'static> {
    let mut builder = Cookie::build((config.cookie_name.clone(), session_id))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(cookie_same_site(config.same_site));
    if persistent {
        builder = builder.max_age(CookieDuration::seconds(config.remember_secs as i64));
    }
    builder.build()
}

/// Build a session removal cookie with the same security attributes as the login cookie.
fn build_removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone())
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(cookie_same_site(config.same_site))
        .max_age(CookieDuration::ZERO)
        .build()
}

/// A 302 redirect; axum's `Redirect::to` answers 303.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Login view.
///
/// A token that fails to verify or sync falls through to the login form with
/// no visible error; the cause is in the logs.
#[tracing::instrument(name = "login.view", skip_all)]
pub async fn login_view(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    cookies: Cookies,
) -> Response {
    let login = &state.config.auth.login;

    let token = params
        .get(&login.token_param)
        .filter(|t| !t.is_empty())
        .cloned()
        .or_else(|| {
            cookies
                .get(&login.token_cookie)
                .map(|c| c.value().to_string())
                .filter(|t| !t.is_empty())
        });

    let Some(token) = token else {
        return render_login_form(&state, None, StatusCode::OK);
    };

    let user = match state.sso.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(error = %e, "Token login failed, showing the login form");
            return render_login_form(&state, None, StatusCode::OK);
        }
    };

    match start_session(&state, &cookies, &user, LoginMethod::Sso).await {
        Ok(()) => found(&login.index_url),
        Err(e) => e.into_response(),
    }
}

/// Form login.
#[tracing::instrument(name = "login.submit", skip_all)]
pub async fn login_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match authenticate_password(&state, &form).await {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials | AuthError::InactiveUser) => {
            return render_login_form(
                &state,
                Some(INVALID_LOGIN_MESSAGE),
                StatusCode::UNAUTHORIZED,
            );
        }
        Err(e) => return e.into_response(),
    };

    match start_session(&state, &cookies, &user, LoginMethod::Password).await {
        Ok(()) => found(&state.config.auth.login.index_url),
        Err(e) => e.into_response(),
    }
}

async fn authenticate_password(
    state: &AppState,
    form: &LoginForm,
) -> Result<SupersetUser, AuthError> {
    let user = match state.store.find_user_by_username(&form.username).await? {
        Some(user) => Some(user),
        None => state.store.find_user(&form.username).await?,
    };
    let Some(user) = user else {
        tracing::info!("Form login for unknown user");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(&form.password, &user.password) {
        tracing::info!(user_id = user.id, "Form login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }
    if !user.active {
        tracing::info!(user_id = user.id, "Form login for inactive user");
        return Err(AuthError::InactiveUser);
    }
    Ok(user)
}

async fn start_session(
    state: &AppState,
    cookies: &Cookies,
    user: &SupersetUser,
    method: LoginMethod,
) -> Result<(), AuthError> {
    let session_config = &state.config.auth.session;
    let ttl = chrono::Duration::seconds(session_config.remember_secs as i64);

    let session_id = state
        .sessions
        .create_session(Session::new(user, method, ttl))
        .await?;

    cookies.add(build_session_cookie(
        session_config,
        session_id,
        method == LoginMethod::Sso,
    ));

    if let Err(e) = state.store.record_login(user.id).await {
        tracing::warn!(user_id = user.id, error = %e, "Failed to record login");
    }

    tracing::info!(user_id = user.id, method = ?method, "Session created");
    Ok(())
}

/// Logout endpoint.
///
/// Also drops the main application's token cookie, which would otherwise log
/// the browser straight back in on the next visit to the login view.
#[tracing::instrument(name = "login.logout", skip_all)]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    let session_config = &state.config.auth.session;

    if let Some(cookie) = cookies.get(&session_config.cookie_name) {
        let session_id = cookie.value().to_string();
        if let Err(e) = state.sessions.delete_session(&session_id).await {
            tracing::warn!(error = %e, "Failed to delete session on logout");
        }
    }
    cookies.remove(build_removal_cookie(session_config));

    let token_cookie = &state.config.auth.login.token_cookie;
    if cookies.get(token_cookie).is_some() {
        cookies.remove(Cookie::build(token_cookie.clone()).path("/").build());
    }

    found("/login")
}

/// Get the current session's user.
#[tracing::instrument(name = "login.me", skip_all)]
pub async fn me(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<MeResponse>, AuthError> {
    let session_id = cookies
        .get(&state.config.auth.session.cookie_name)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::MissingCredentials)?;

    let session = require_session(state.sessions.as_ref(), &session_id).await?;

    // The account may have been removed since the session was created
    let user = state
        .store
        .find_user(&session.email)
        .await?
        .ok_or(AuthError::SessionNotFound)?;

    Ok(Json(MeResponse {
        id: user.id,
        roles: user.role_names(),
        username: user.username,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        active: user.active,
        extra: user.extra,
        login_method: session.method,
        session_expires_at: session.expires_at,
    }))
}

const LOGIN_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Login - {{app_name}}</title>
{{#if favicon}}<link rel="icon" href="{{favicon}}">{{/if}}
<style>
body { font-family: sans-serif; background: #f7f7f7; }
.panel { max-width: 360px; margin: 10vh auto; padding: 24px; background: #fff; border-radius: 4px; }
.panel label, .panel input { display: block; width: 100%; margin-bottom: 12px; }
.alert { color: #a94442; margin-bottom: 12px; }
.logo { max-height: 48px; }
</style>
{{#if custom_css}}<style>{{{custom_css}}}</style>{{/if}}
</head>
<body>
<div class="panel">
{{#if app_icon}}<a href="{{logo_target_path}}"><img class="logo" src="{{app_icon}}" alt="{{app_name}}"></a>{{/if}}
<h1>Sign in to {{app_name}}</h1>
{{#if error}}<div class="alert" role="alert">{{error}}</div>{{/if}}
<form method="post" action="/login">
<label for="username">Username</label>
<input id="username" name="username" type="text" autocomplete="username" required>
<label for="password">Password</label>
<input id="password" name="password" type="password" autocomplete="current-password" required>
<button type="submit">Sign in</button>
</form>
</div>
</body>
</html>
"#;

/// The password login page, compiled once at startup.
pub struct LoginPage {
    registry: Handlebars<'static>,
}

impl LoginPage {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("login", LOGIN_TEMPLATE)?;
        Ok(Self { registry })
    }

    /// Branding values are HTML-escaped; `custom_css` is inserted raw with
    /// closing tags neutralized.
    pub fn render(&self, branding: &BrandingConfig, error: Option<&str>) -> Result<String, RenderError> {
        let custom_css = branding
            .custom_css
            .as_deref()
            .map(|css| css.replace("</", "<\\/"));

        self.registry.render(
            "login",
            &json!({
                "app_name": branding.app_name,
                "app_icon": branding.app_icon,
                "favicon": branding.favicon,
                "logo_target_path": branding.logo_target_path,
                "custom_css": custom_css,
                "error": error,
            }),
        )
    }
}

fn render_login_form(state: &AppState, error: Option<&str>, status: StatusCode) -> Response {
    match state
        .login_page
        .render(&state.config.deployment.branding, error)
    {
        Ok(page) => (status, Html(page)).into_response(),
        Err(e) => AuthError::Internal(format!("failed to render login page: {e}")).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_page_escapes_branding() {
        let branding = BrandingConfig {
            app_name: r#"<b>"Tom" & Jerry</b>"#.into(),
            app_icon: Some("/static/logo.png".into()),
            custom_css: Some("h1 { color: red; }</style><script>".into()),
            ..BrandingConfig::default()
        };

        let page = LoginPage::new()
            .unwrap()
            .render(&branding, Some("<i>nope</i>"))
            .unwrap();

        assert!(page.contains("&lt;b&gt;&quot;Tom&quot; &amp; Jerry&lt;/b&gt;"));
        assert!(!page.contains("<b>"));
        assert!(page.contains(r#"<img class="logo" src="/static/logo.png""#));
        assert!(page.contains("h1 { color: red; }<\\/style><script>"));
        assert!(page.contains("&lt;i&gt;nope&lt;/i&gt;"));
    }

    #[test]
    fn test_login_page_omits_unset_branding() {
        let page = LoginPage::new()
            .unwrap()
            .render(&BrandingConfig::default(), None)
            .unwrap();

        assert!(page.contains(r#"<form method="post" action="/login">"#));
        assert!(!page.contains("rel=\"icon\""));
        assert!(!page.contains("class=\"alert\""));
        assert!(!page.contains("<img"));
    }

    #[test]
    fn test_persistent_cookie_has_max_age() {
        let config = SessionConfig::default();
        let cookie = build_session_cookie(&config, "abc".into(), true);
        assert_eq!(cookie.name(), config.cookie_name);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(
            cookie.max_age(),
            Some(CookieDuration::seconds(config.remember_secs as i64))
        );

        let cookie = build_session_cookie(&config, "abc".into(), false);
        assert_eq!(cookie.max_age(), None);
    }

    #[test]
    fn test_found_is_302() {
        let response = found("/superset/welcome/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/superset/welcome/"
        );
    }
}
