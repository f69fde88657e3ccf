//! HTTP surface of the tracker.
//!
//! Form edits and views are JSON endpoints. All state is shared through [`AppState`]; the ticker and the
//! storage subscriptions live in [`TrackerRuntime`].

use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{Result, TrackerError};
use crate::log_store::LogStore;
use crate::models::{ApiResponse, DaySchedule, Level, LogEntry, ScheduleDocument, Timing};
use crate::projections::{ActivityStats, LogProjector};
use crate::resolver::{resolve_day_schedule, ActivityResolver, ResolutionView};
use crate::storage::{sync_component, Setter, Storage, SyncHandle, SCHEDULE_KEY, TOC_KEY, TRACKER_KEY};
use crate::ticker::{ResolverTicker, ScheduleSource};
use crate::toc::{SolutionLink, TocDocument};
use crate::tracker::{activity_catalogue, suggest_activity, TrackerForm};

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::InvalidInput(_) | TrackerError::InvalidTime(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
            }
            TrackerError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
            other => {
                warn!(error = %other, kind = other.label(), "request_failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| TrackerError::Lock(e.to_string()))
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub clock: Arc<dyn Clock>,
    pub schedule: ScheduleSource,
    pub toc: Arc<RwLock<Option<TocDocument>>>,
    pub logs: Arc<Mutex<LogStore>>,
    pub form: Arc<Mutex<TrackerForm>>,
    pub resolution: watch::Receiver<ResolutionView>,
}

impl AppState {
    fn schedule_document(&self) -> Option<ScheduleDocument> {
        self.schedule
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Lets the form pick up the current default again, e.g. after a reset.
    fn refresh_form_default(&self, form: &mut TrackerForm) {
        let view = self.resolution.borrow().clone();
        form.apply_resolution(&view.resolution);
    }
}

/// Owns the ticker and storage subscriptions behind an [`AppState`].
pub struct TrackerRuntime {
    pub state: AppState,
    ticker: ResolverTicker,
    sync: SyncHandle,
}

impl TrackerRuntime {
    /// Must be called inside a tokio runtime.
    pub fn start(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, tick_interval: Duration) -> Result<Self> {
        let schedule: ScheduleSource = Arc::new(RwLock::new(None));
        let toc: Arc<RwLock<Option<TocDocument>>> = Arc::new(RwLock::new(None));
        let logs = Arc::new(Mutex::new(LogStore::load(Arc::clone(&storage))?));
        let form = Arc::new(Mutex::new(TrackerForm::new()));

        let sync = sync_component(
            Arc::clone(&storage),
            vec![
                (SCHEDULE_KEY, document_setter(SCHEDULE_KEY, Arc::clone(&schedule))),
                (TRACKER_KEY, log_setter(Arc::clone(&logs))),
                (TOC_KEY, document_setter(TOC_KEY, Arc::clone(&toc))),
            ],
        )?;

        let mut resolver = ActivityResolver::new();
        let observed = Arc::clone(&form);
        resolver.on_change(move |change| {
            let mut form = observed.lock().unwrap_or_else(|p| p.into_inner());
            form.apply_resolution(&change.resolution);
        });
        let ticker = ResolverTicker::start(resolver, Arc::clone(&schedule), Arc::clone(&clock), tick_interval);

        let state = AppState {
            storage,
            clock,
            schedule,
            toc,
            logs,
            form,
            resolution: ticker.subscribe(),
        };
        Ok(Self { state, ticker, sync })
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn shutdown(self) {
        let Self { ticker, sync, .. } = self;
        sync.cleanup();
        ticker.stop().await;
    }
}

/// Keeps `slot` in step with a JSON document key. Unreadable documents are
/// treated as missing.
fn document_setter<T>(key: &'static str, slot: Arc<RwLock<Option<T>>>) -> Setter
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(move |value: Option<serde_json::Value>| {
        let parsed = match value {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match serde_json::from_value::<T>(value) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(key, error = %e, "document_malformed");
                    None
                }
            },
        };
        *slot.write().unwrap_or_else(|p| p.into_inner()) = parsed;
    })
}

fn log_setter(logs: Arc<Mutex<LogStore>>) -> Setter {
    Arc::new(move |value: Option<serde_json::Value>| match logs.try_lock() {
        Ok(mut store) => store.replace_from_storage(value),
        // The store is mid write-through and already holds this list
        Err(TryLockError::WouldBlock) => {}
        Err(TryLockError::Poisoned(p)) => p.into_inner().replace_from_storage(value),
    })
}

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/schedule", get(get_schedule))
        .route("/schedule/today", get(get_today))
        .route("/activities", get(get_activities))
        .route("/activity/current", get(get_current_activity))
        .route("/form", get(get_form).patch(update_form))
        .route("/form/activity", post(select_activity))
        .route("/form/submit", post(submit_form))
        .route("/form/reset", post(reset_form))
        .route("/logs", get(list_logs))
        .route("/logs/stats", get(log_stats))
        .route("/logs/:timestamp", axum::routing::delete(delete_log))
        .route("/logs/:timestamp/edit", post(edit_log))
        .route("/toc", get(get_toc))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> &'static str {
    "Routine Tracker API v0.1.0"
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn get_schedule(State(state): State<AppState>) -> ApiResult<Json<ScheduleDocument>> {
    state
        .schedule_document()
        .map(Json)
        .ok_or_else(|| TrackerError::NotFound("no schedule data".to_string()).into())
}

async fn get_today(State(state): State<AppState>) -> Json<DaySchedule> {
    let document = state.schedule_document().unwrap_or_default();
    Json(resolve_day_schedule(&document.schedules, state.clock.now()).into_owned())
}

async fn get_activities(State(state): State<AppState>) -> Json<Vec<String>> {
    let document = state.schedule_document().unwrap_or_default();
    Json(activity_catalogue(&document))
}

async fn get_current_activity(State(state): State<AppState>) -> Json<ResolutionView> {
    Json(state.resolution.borrow().clone())
}

async fn get_form(State(state): State<AppState>) -> ApiResult<Json<TrackerForm>> {
    Ok(Json(lock(&state.form)?.clone()))
}

#[derive(Debug, Deserialize)]
pub struct SelectActivity {
    pub activity: String,
}

/// Manual pick; holds until the form is submitted or reset
async fn select_activity(
    State(state): State<AppState>,
    Json(input): Json<SelectActivity>,
) -> ApiResult<Json<TrackerForm>> {
    let activity = input.activity.trim().to_string();
    let catalogue = activity_catalogue(&state.schedule_document().unwrap_or_default());

    if !catalogue.is_empty() && !catalogue.contains(&activity) {
        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            "UNKNOWN_ACTIVITY",
            format!("unknown activity '{}'", activity),
        );
        return Err(match suggest_activity(&activity, &catalogue) {
            Some(suggestion) => err.with_details(format!("did you mean '{}'?", suggestion)),
            None => err,
        });
    }

    let mut form = lock(&state.form)?;
    form.select_activity(activity);
    Ok(Json(form.clone()))
}

#[derive(Debug, Default, Deserialize)]
pub struct FormUpdate {
    pub timing: Option<Timing>,
    pub energy: Option<Level>,
    pub focus: Option<Level>,
}

async fn update_form(
    State(state): State<AppState>,
    Json(update): Json<FormUpdate>,
) -> ApiResult<Json<TrackerForm>> {
    let mut form = lock(&state.form)?;
    if let Some(timing) = update.timing {
        form.set_timing(timing);
    }
    if let Some(energy) = update.energy {
        form.set_energy(energy);
    }
    if let Some(focus) = update.focus {
        form.set_focus(focus);
    }
    Ok(Json(form.clone()))
}

async fn submit_form(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let submission = lock(&state.form)?.submit(Utc::now())?;

    let event = lock(&state.logs)?.record(submission.entry, submission.editing_timestamp.as_deref());

    // The manual flag was cleared by the submit
    state.refresh_form_default(&mut *lock(&state.form)?);

    let event = event?;
    info!(event = ?event.kind, "form_submitted");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Log recorded",
            Some(serde_json::to_value(&event).map_err(TrackerError::from)?),
        )),
    ))
}

async fn reset_form(State(state): State<AppState>) -> ApiResult<Json<TrackerForm>> {
    let mut form = lock(&state.form)?;
    form.reset();
    state.refresh_form_default(&mut form);
    Ok(Json(form.clone()))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub showing: usize,
    pub total: usize,
}

async fn list_logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> ApiResult<Json<LogPage>> {
    let store = lock(&state.logs)?;
    let logs = match query.limit {
        Some(limit) => store.recent(limit).to_vec(),
        None => store.entries().to_vec(),
    };
    Ok(Json(LogPage {
        showing: logs.len(),
        total: store.entries().len(),
        logs,
    }))
}

async fn log_stats(State(state): State<AppState>) -> ApiResult<Json<Vec<ActivityStats>>> {
    let store = lock(&state.logs)?;
    Ok(Json(LogProjector::activity_stats(store.entries())))
}

async fn edit_log(
    State(state): State<AppState>,
    Path(timestamp): Path<String>,
) -> ApiResult<Json<TrackerForm>> {
    let entry = lock(&state.logs)?
        .find(&timestamp)
        .cloned()
        .ok_or_else(|| TrackerError::NotFound(format!("log entry {}", timestamp)))?;

    let mut form = lock(&state.form)?;
    form.begin_edit(entry);
    Ok(Json(form.clone()))
}

async fn delete_log(
    State(state): State<AppState>,
    Path(timestamp): Path<String>,
) -> ApiResult<Json<ApiResponse>> {
    let event = lock(&state.logs)?.delete(&timestamp)?;
    Ok(Json(ApiResponse::success(
        "Log deleted",
        Some(serde_json::to_value(&event).map_err(TrackerError::from)?),
    )))
}

async fn get_toc(State(state): State<AppState>) -> ApiResult<Json<Vec<SolutionLink>>> {
    let toc = state.toc.read().unwrap_or_else(|p| p.into_inner());
    toc.as_ref()
        .map(|doc| Json(doc.navigation()))
        .ok_or_else(|| TrackerError::NotFound("no table of contents data".to_string()).into())
}
