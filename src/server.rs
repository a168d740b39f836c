use crate::auth::AccessGate;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::filter::Selection;
use crate::html::Pages;
use crate::logo::load_logo;
use crate::overlay::parse_points;
use crate::render::{self, RenderSettings};
use crate::session::{Notice, SessionState, SessionStore, SESSION_COOKIE};
use crate::types::Dataset;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub dataset: Dataset,
    pub sessions: SessionStore,
    pub gate: AccessGate,
    pub pages: Pages,
    pub settings: RenderSettings,
    pub logo: Option<Vec<u8>>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, dataset: Dataset, logo: Option<Vec<u8>>) -> Result<Self> {
        Ok(Self {
            dataset,
            sessions: SessionStore::new(Duration::from_secs(config.auth.session_ttl_secs)),
            gate: AccessGate::new(config.resolve_password()),
            pages: Pages::new()?,
            settings: RenderSettings {
                title: config.server.title.clone(),
                geolocation: config.server.geolocation,
                has_logo: logo.is_some(),
            },
            logo,
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    password: String,
}

/// Query string written back by the browser's geolocation request.
#[derive(Deserialize, Default)]
pub struct PositionParams {
    lat: Option<String>,
    lon: Option<String>,
}

#[derive(Deserialize)]
pub struct LocateParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct LocateResponse {
    idse_new: Option<String>,
    region: Option<String>,
    cercle: Option<String>,
    commune: Option<String>,
    pop_se: u64,
    pop_se_ct: u64,
}

/// Builds the router. `static_dir` is served under `/static` when given.
pub fn app(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let max_upload = state.max_upload_bytes;

    let mut router = Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/select", post(select))
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(max_upload)))
        .route("/overlay/clear", post(clear_overlay))
        .route("/api/view", get(api_view))
        .route("/api/locate", get(api_locate))
        .route("/logo.png", get(logo))
        .route("/health", get(|| async { "ok" }));

    if let Some(dir) = static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: Dataset) -> Result<()> {
    let logo = match &config.input.logo {
        Some(path) => match load_logo(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "continuing without logo");
                None
            }
        },
        None => None,
    };

    let state = Arc::new(AppState::new(&config, dataset, logo)?);
    let router = app(state, Some(config.server.static_dir.clone()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// The browser's logged-in session. There is no anonymous session: a
/// missing, unknown or expired cookie is unauthorised.
fn authorized_session(state: &AppState, jar: &CookieJar) -> Result<(String, SessionState), AppError> {
    let id = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("no session".into()))?;
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::Unauthorized("login required".into()))?;
    Ok((id, session))
}

fn login_page(state: &AppState, warning: Option<String>) -> Result<Html<String>, AppError> {
    let view = render::login(&state.settings, warning);
    Ok(Html(state.pages.login(&view)?))
}

fn parse_position(params: &PositionParams) -> Option<Result<(f64, f64), String>> {
    let (lat, lon) = match (&params.lat, &params.lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return None,
    };
    let parsed = lat.trim().parse::<f64>().ok().zip(lon.trim().parse::<f64>().ok());
    Some(match parsed {
        Some((lat, lon))
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
        {
            Ok((lat, lon))
        }
        _ => Err(format!("Coordonnées invalides : {}, {}", lat, lon)),
    })
}

async fn index(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<PositionParams>,
) -> Result<Response, AppError> {
    let (id, mut session) = match authorized_session(&state, &jar) {
        Ok(found) => found,
        Err(_) => return Ok(login_page(&state, None)?.into_response()),
    };

    let mut page_warnings = Vec::new();
    let mut reported = false;
    match parse_position(&params) {
        Some(Ok(position)) => {
            session.position = Some(position);
            state.sessions.put(&id, session.clone());
            reported = true;
        }
        Some(Err(message)) => page_warnings.push(message),
        None => {}
    }

    let mut view = render::dashboard(&state.dataset, &session, &state.settings);
    view.recenter = reported;
    let body = state.pages.dashboard(&view, &page_warnings)?;
    Ok(Html(body).into_response())
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if !state.gate.check(&form.password) {
        warn!("rejected dashboard login");
        let page = login_page(&state, Some("Mot de passe incorrect.".to_string()))?;
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    }

    // Never promote an id the browser arrived with.
    if let Some(old) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(old.value());
    }
    let id = state.sessions.create(SessionState::new());
    info!("dashboard login");
    Ok((jar.add(session_cookie(id)), Redirect::to("/")).into_response())
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Redirect::to("/")).into_response()
}

async fn select(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(selection): Form<Selection>,
) -> Response {
    if let Ok((id, mut session)) = authorized_session(&state, &jar) {
        session.selection = selection;
        state.sessions.put(&id, session);
    }
    Redirect::to("/").into_response()
}

async fn upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let (id, mut session) = match authorized_session(&state, &jar) {
        Ok(found) => found,
        Err(_) => return Ok(Redirect::to("/").into_response()),
    };

    let contents = match read_upload(&mut multipart).await {
        Ok(contents) => contents,
        Err(message) => {
            warn!(error = %message, "rejected overlay upload");
            session.overlay.clear();
            session.overlay_notice = Some(Notice::Error(format!("Fichier CSV invalide : {}", message)));
            state.sessions.put(&id, session);
            return Ok(Redirect::to("/").into_response());
        }
    };

    match parse_points(&contents[..]) {
        Ok(overlay) => {
            info!(points = overlay.points.len(), dropped = overlay.dropped, "loaded overlay points");
            session.overlay_notice = Some(Notice::Success(format!(
                "{} point(s) chargé(s), {} ligne(s) sans coordonnées ignorée(s).",
                overlay.points.len(),
                overlay.dropped
            )));
            session.overlay = overlay.points;
        }
        Err(e) => {
            warn!(error = %e, "rejected overlay upload");
            session.overlay.clear();
            session.overlay_notice = Some(Notice::Error(format!("Fichier CSV invalide : {}", e)));
        }
    }
    state.sessions.put(&id, session);

    Ok(Redirect::to("/").into_response())
}

/// The bytes of the `file` field. Oversized or truncated bodies surface here.
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        if field.name() == Some("file") {
            return field.bytes().await.map_err(|e| e.body_text());
        }
    }
    Err("champ 'file' manquant".to_string())
}

async fn clear_overlay(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Ok((id, mut session)) = authorized_session(&state, &jar) {
        session.overlay.clear();
        session.overlay_notice = None;
        state.sessions.put(&id, session);
    }
    Redirect::to("/").into_response()
}

async fn api_view(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<render::DashboardView>, AppError> {
    let (_, session) = authorized_session(&state, &jar)?;
    Ok(Json(render::dashboard(&state.dataset, &session, &state.settings)))
}

async fn api_locate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    params: Option<Query<LocateParams>>,
) -> Result<Json<Option<LocateResponse>>, AppError> {
    authorized_session(&state, &jar)?;
    let Query(params) =
        params.ok_or_else(|| AppError::BadRequest("lat and lon must be numbers".into()))?;

    let found = state.dataset.locate(params.lat, params.lon).map(|area| LocateResponse {
        idse_new: area.area_id.clone(),
        region: area.region.clone(),
        cercle: area.cercle.clone(),
        commune: area.commune.clone(),
        pop_se: area.population,
        pop_se_ct: area.population_ct,
    });
    Ok(Json(found))
}

async fn logo(State(state): State<Arc<AppState>>) -> Response {
    match &state.logo {
        Some(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
