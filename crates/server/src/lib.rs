use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use pixel_office_engine::config::resolve_endpoint;
use pixel_office_engine::protocol::OfficeView;
use pixel_office_engine::snapshot::Snapshot;
use pixel_office_engine::{OfficeConfig, Point, StatusSource, Store};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

pub mod client;
mod memo;
mod mock;
pub mod push;
pub mod runtime;
mod viewer;


pub use client::{HttpPushConnector, HttpSource};
pub use runtime::{OfficeHandle, OfficeRuntime};

#[derive(Clone)]
pub struct AppState {
    pub office: OfficeHandle,
    pub config: Arc<OfficeConfig>,
    pub memory_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// Where the server keeps its files, plus the office configuration.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub db_path: PathBuf,
    pub memory_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config: OfficeConfig,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(viewer))
        .route("/health", get(health))
        .route("/api/status", get(mock::api_status))
        .route("/static-data.json", get(mock::static_data))
        .route("/api/sse", get(mock::api_sse))
        .route("/api/yesterday", get(memo::api_yesterday))
        .route("/api/office/frames", get(office_frames))
        .route("/api/office/characters", get(office_characters))
        .route("/api/office/select", post(office_select))
        .route("/api/office/live", post(office_live))
        .route("/api/office/push", post(office_push))
        .route("/api/office/running", post(office_running))
        .route("/api/office/speed", post(office_speed))
        .route("/api/office/plugins", post(office_plugins))
        .route("/api/office/export", post(office_export))
        .route("/api/office/import", post(office_import))
        .with_state(Arc::new(state))
        // Status and memo contents change constantly; never let a browser cache them.
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // The viewer may read yesterday's memo. Never use `Access-Control-Allow-Origin: *`.
        .layer(local_only_cors())
}

async fn health() -> &'static str {
    "ok"
}

async fn viewer() -> Html<&'static str> {
    Html(viewer::VIEWER_HTML)
}

fn runtime_gone(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}"))
}

async fn office_frames(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let frames = WatchStream::new(state.office.frames())
        .filter(|frame| std::future::ready(!frame.commands.is_empty()))
        .map(|frame| Event::default().json_data(&*frame));
    Sse::new(frames).keep_alive(KeepAlive::default())
}

async fn office_characters(State(state): State<Arc<AppState>>) -> Json<OfficeView> {
    Json((*state.office.view()).clone())
}

#[derive(Debug, Deserialize)]
struct SelectInput {
    x: f64,
    y: f64,
}

async fn office_select(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SelectInput>,
) -> Result<Json<OfficeView>, (StatusCode, String)> {
    state
        .office
        .select(Point::new(input.x, input.y))
        .await
        .map_err(runtime_gone)?;
    Ok(Json((*state.office.view()).clone()))
}

#[derive(Debug, Deserialize)]
struct ToggleInput {
    enabled: bool,
}

async fn office_live(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ToggleInput>,
) -> Result<Json<OfficeView>, (StatusCode, String)> {
    let view = state
        .office
        .set_live(input.enabled)
        .await
        .map_err(runtime_gone)?;
    Ok(Json(view))
}

async fn office_push(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ToggleInput>,
) -> Result<Json<OfficeView>, (StatusCode, String)> {
    let view = state
        .office
        .set_push(input.enabled)
        .await
        .map_err(runtime_gone)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct RunningInput {
    running: bool,
}

async fn office_running(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RunningInput>,
) -> Result<Json<OfficeView>, (StatusCode, String)> {
    let view = state
        .office
        .set_running(input.running)
        .await
        .map_err(runtime_gone)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct SpeedInput {
    speed: f64,
}

async fn office_speed(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SpeedInput>,
) -> Result<Json<OfficeView>, (StatusCode, String)> {
    let view = state
        .office
        .set_speed(input.speed)
        .await
        .map_err(runtime_gone)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct PluginInput {
    name: String,
    visible: bool,
}

async fn office_plugins(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PluginInput>,
) -> Result<StatusCode, (StatusCode, String)> {
    let found = state
        .office
        .set_plugin_visible(&input.name, input.visible)
        .await
        .map_err(runtime_gone)?;
    if !found {
        return Err((StatusCode::NOT_FOUND, format!("no plugin named {}", input.name)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct SnapshotSummary {
    saved_at: String,
    hash: String,
    characters: usize,
    completed_today: u64,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(s: &Snapshot) -> Self {
        Self {
            saved_at: s.saved_at.clone(),
            hash: s.hash.clone(),
            characters: s.characters.len(),
            completed_today: s.completed_today,
        }
    }
}

async fn office_export(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SnapshotSummary>, (StatusCode, String)> {
    let snap = state
        .office
        .export()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(SnapshotSummary::from(&snap)))
}

async fn office_import(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SnapshotSummary>, (StatusCode, String)> {
    match state.office.import().await {
        Ok(Some(snap)) => Ok(Json(SnapshotSummary::from(&snap))),
        Ok(None) => Err((StatusCode::NOT_FOUND, "no snapshot saved".to_string())),
        Err(e) => Err((StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}"))),
    }
}

/// Status sources in resolution order, with relative endpoints resolved
/// against the server's own address.
pub fn http_sources(
    config: &OfficeConfig,
    base: &str,
    http: &reqwest::Client,
) -> Vec<Arc<dyn StatusSource>> {
    let timeout = config.fetch_timeout();
    vec![
        Arc::new(HttpSource::local(
            resolve_endpoint(base, &config.local_endpoint),
            http.clone(),
            timeout,
        )),
        Arc::new(HttpSource::fallback(
            resolve_endpoint(base, &config.static_endpoint),
            http.clone(),
            timeout,
        )),
    ]
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    opts: ServeOptions,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let addr = listener.local_addr()?;
    let base = format!("http://{addr}");

    let store = Store::new(opts.db_path);
    // Fail fast if sqlite is unusable.
    drop(store.open()?);

    let http = reqwest::Client::builder().build()?;
    let sources = http_sources(&opts.config, &base, &http);
    let connector = Arc::new(HttpPushConnector::new(
        resolve_endpoint(&base, &opts.config.push_endpoint),
        http,
    ));
    let office = OfficeRuntime::new(&opts.config, sources, connector, Some(store))?.spawn();

    let state = AppState {
        office: office.clone(),
        config: Arc::new(opts.config),
        memory_dir: opts.memory_dir,
        data_dir: opts.data_dir,
    };
    let app = build_router(state);
    tracing::info!(%addr, "pixel office listening");
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;
    office.shutdown().await;
    served?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::debug!(%ip, "rejected peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
