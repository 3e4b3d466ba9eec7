//! REST API of the kernel.
//!
//! Paths and payloads follow what the SOS page and the admin map already call:
//! reports under `/update`, `/getActiveSOS`, `/removeSOS`, `/updateAdminMap`,
//! camps under `/getReliefCamps`, `/addReliefCamp`, `/removeReliefCamp`, alerts under
//! `/sendEmails`. Every failure answers `{"error": "..."}`.

use crate::config::AlertConf;
use crate::error::{NotifyError, RegistryError};
use crate::models::{EmergencyReport, ReliefCamp, ReportSubmission};
use crate::notify::{Alert, AlertRequest, AlertSink};
use crate::registry::SharedRegistry;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub alerts: Arc<dyn AlertSink>,
    pub alert_conf: AlertConf,
}

#[derive(Debug)]
pub enum ApiError {
    Body(JsonRejection),
    Registry(RegistryError),
    Notify(NotifyError),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::Body(e)
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<NotifyError> for ApiError {
    fn from(e: NotifyError) -> Self {
        Self::Notify(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            Self::Body(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            Self::Registry(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to persist state".to_string()),
            Self::Notify(NotifyError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            Self::Notify(NotifyError::Delivery(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to send emails".to_string())
            }
        };
        (code, Json(json!({ "error": msg }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// JSON body whose rejection is answered as `400 {"error": ...}` by `ApiError`.
type JsonBody<T> = Result<Json<T>, JsonRejection>;

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
struct AddCampIn {
    #[serde(default)]
    lat: Option<Value>,
    #[serde(default)]
    lng: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RemoveCampIn {
    #[serde(default)]
    index: Option<Value>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/update", post(update))
        .route("/getActiveSOS", get(get_active_sos))
        .route("/sos/{device_id}", get(get_sos))
        .route("/removeSOS", post(remove_sos))
        .route("/forceUpdate", get(force_update))
        .route("/updateAdminMap", post(update_admin_map))
        .route("/getReliefCamps", get(get_relief_camps))
        .route("/addReliefCamp", post(add_relief_camp))
        .route("/removeReliefCamp", post(remove_relief_camp))
        .route("/sendEmails", post(send_emails))
        .with_state(app_state)
}

// POST /update
async fn update(State(app): State<AppState>, body: JsonBody<ReportSubmission>) -> ApiResult {
    let Json(body) = body?;
    app.registry.upsert(body)?;
    Ok(success())
}

// GET /getActiveSOS
async fn get_active_sos(State(app): State<AppState>) -> Json<Vec<EmergencyReport>> {
    Json(app.registry.list())
}

// GET /sos/{device_id}; unknown devices read as an empty object
async fn get_sos(State(app): State<AppState>, Path(device_id): Path<String>) -> Json<Value> {
    let report = app
        .registry
        .get(&device_id)
        .and_then(|r| serde_json::to_value(r).ok())
        .unwrap_or_else(|| json!({}));
    Json(report)
}

// POST /removeSOS
async fn remove_sos(State(app): State<AppState>, body: JsonBody<Value>) -> ApiResult {
    let Json(body) = body?;
    if let Some(device_id) = ReportSubmission::from_value(body).device_id {
        app.registry.remove(&device_id)?;
    }
    Ok(success())
}

// GET /forceUpdate
async fn force_update(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "emergencies": app.registry.list() }))
}

// POST /updateAdminMap
async fn update_admin_map(
    State(app): State<AppState>,
    body: JsonBody<Vec<Value>>,
) -> ApiResult {
    let Json(pins) = body?;
    // decoded one by one so a malformed pin only costs itself
    let pins = pins.into_iter().map(ReportSubmission::from_value).collect();
    app.registry.bulk_upsert(pins)?;
    Ok(success())
}

// GET /getReliefCamps
async fn get_relief_camps(State(app): State<AppState>) -> Json<Vec<ReliefCamp>> {
    Json(app.registry.list_camps())
}

// POST /addReliefCamp
async fn add_relief_camp(State(app): State<AppState>, body: JsonBody<AddCampIn>) -> ApiResult {
    let Json(body) = body?;
    let name = body.name.as_ref().and_then(Value::as_str).map(str::to_string);
    app.registry
        .add_camp_from(body.lat.as_ref(), body.lng.as_ref(), name)?;
    Ok(success())
}

// POST /removeReliefCamp
async fn remove_relief_camp(State(app): State<AppState>, body: JsonBody<RemoveCampIn>) -> ApiResult {
    let Json(body) = body?;
    let index = body
        .index
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| RegistryError::index("Invalid camp index"))?;
    app.registry.remove_camp(index)?;
    Ok(success())
}

// POST /sendEmails
async fn send_emails(State(app): State<AppState>, body: JsonBody<AlertRequest>) -> ApiResult {
    let Json(body) = body?;
    let recipients = body.validate()?;
    let device_id = body.device_id.as_deref();
    let report = device_id.and_then(|id| app.registry.get(id));

    let alert = Alert::compose(
        &app.alert_conf,
        recipients,
        body.message.as_deref().unwrap_or_default(),
        device_id,
        report.as_ref(),
    );
    if let Err(e) = app.alerts.deliver(&alert) {
        tracing::error!(error = %e, "error sending alert");
        return Err(e.into());
    }
    Ok(Json(json!({ "success": true, "sent": alert.recipients.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use crate::registry::Registry;
    use crate::store::JsonStore;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Alert>>,
    }

    impl AlertSink for RecordingSink {
        fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
            self.sent.lock().push(alert.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn deliver(&self, _alert: &Alert) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".into()))
        }
    }

    struct TestApp {
        _dir: tempfile::TempDir,
        router: Router,
        registry: SharedRegistry,
    }

    fn app_with_sink(alerts: Arc<dyn AlertSink>) -> TestApp {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(JsonStore::new(dir.path().join("state.json"))));
        let router = build_router(AppState {
            registry: registry.clone(),
            alerts,
            alert_conf: AlertConf::default(),
        });
        TestApp { _dir: dir, router, registry }
    }

    fn app() -> TestApp {
        app_with_sink(Arc::new(RecordingSink::default()))
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_and_list() {
        let app = app();

        let (code, body) = call(
            &app.router,
            "POST",
            "/update",
            Some(json!({ "deviceId": "dev1", "status": "SOS", "lat": 12.9, "lon": 77.6 })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (code, list) = call(&app.router, "GET", "/getActiveSOS", None).await;
        assert_eq!(code, StatusCode::OK);
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["deviceId"], "dev1");
        assert_eq!(list[0]["lat"], 12.9);
        assert!(list[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_update_without_device_id_is_rejected() {
        let app = app();
        let (code, body) = call(&app.router, "POST", "/update", Some(json!({ "status": "SOS" }))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "deviceId required" }));
        assert!(app.registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_clear_and_remove() {
        let app = app();
        call(&app.router, "POST", "/update", Some(json!({ "deviceId": "a", "status": "SOS" }))).await;
        call(&app.router, "POST", "/update", Some(json!({ "deviceId": "b", "status": "SOS" }))).await;

        let (code, _) = call(&app.router, "POST", "/update", Some(json!({ "deviceId": "a", "status": "CLEAR" }))).await;
        assert_eq!(code, StatusCode::OK);
        assert!(app.registry.get("a").is_none());

        let (code, body) = call(&app.router, "POST", "/removeSOS", Some(json!({ "deviceId": "b" }))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
        assert!(app.registry.get("b").is_none());

        let (code, _) = call(&app.router, "POST", "/removeSOS", Some(json!({ "deviceId": "zzz" }))).await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_single_report() {
        let app = app();
        call(&app.router, "POST", "/update", Some(json!({ "deviceId": "dev1", "name": "Asha" }))).await;

        let (_, found) = call(&app.router, "GET", "/sos/dev1", None).await;
        assert_eq!(found["name"], "Asha");

        let (code, missing) = call(&app.router, "GET", "/sos/nobody", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(missing, json!({}));
    }

    #[tokio::test]
    async fn test_force_update_and_admin_map() {
        let app = app();
        let (code, body) = call(
            &app.router,
            "POST",
            "/updateAdminMap",
            Some(json!([
                { "deviceId": "p1", "lat": 10.0, "lon": 70.0 },
                { "lat": 11.0 },
                { "deviceId": "p2", "status": "SOS" }
            ])),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (_, body) = call(&app.router, "GET", "/forceUpdate", None).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["emergencies"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_mistyped_fields() {
        let app = app();
        let (code, body) = call(
            &app.router,
            "POST",
            "/update",
            Some(json!({ "deviceId": "d1", "lat": "12.9", "lon": 77.6, "isManual": "true" })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (_, found) = call(&app.router, "GET", "/sos/d1", None).await;
        assert_eq!(found["lat"], "12.9");
        assert_eq!(found["lon"], 77.6);
        assert_eq!(found["isManual"], "true");
    }

    #[tokio::test]
    async fn test_admin_map_mistyped_entry_does_not_drop_batch() {
        let app = app();
        let (code, _) = call(
            &app.router,
            "POST",
            "/updateAdminMap",
            Some(json!([
                { "deviceId": "p1", "lat": 10.0 },
                { "deviceId": "p2", "accuracy": "high" },
                "not a pin",
                { "deviceId": 7, "name": 42 }
            ])),
        )
        .await;
        assert_eq!(code, StatusCode::OK);

        assert_eq!(app.registry.get("p1").unwrap().fields.lat, Some(10.0));
        let p2 = app.registry.get("p2").unwrap();
        assert_eq!(p2.fields.accuracy, None);
        assert_eq!(p2.fields.extra.get("accuracy"), Some(&json!("high")));
        assert!(app.registry.get("7").is_some());
        assert_eq!(app.registry.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_body_answers_json_error() {
        let app = app();
        for (uri, content_type) in [
            ("/update", Some("application/json")),
            ("/updateAdminMap", Some("application/json")),
            ("/addReliefCamp", None),
        ] {
            let mut builder = Request::builder().method("POST").uri(uri);
            if let Some(content_type) = content_type {
                builder = builder.header("content-type", content_type);
            }
            let request = builder.body(Body::from("not json")).unwrap();

            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(body["error"].is_string(), "{uri}: {body}");
        }

        let (code, body) = call(&app.router, "POST", "/updateAdminMap", Some(json!({ "deviceId": "x" }))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert!(app.registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_camp_endpoints() {
        let app = app();
        let (code, _) = call(
            &app.router,
            "POST",
            "/addReliefCamp",
            Some(json!({ "lat": 19.0, "lng": 72.8, "name": "Camp A" })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        call(&app.router, "POST", "/addReliefCamp", Some(json!({ "lat": 19.1, "lng": 72.9 }))).await;

        let (_, camps) = call(&app.router, "GET", "/getReliefCamps", None).await;
        assert_eq!(
            camps,
            json!([
                { "lat": 19.0, "lng": 72.8, "name": "Camp A" },
                { "lat": 19.1, "lng": 72.9, "name": "Emergency Shelter" }
            ])
        );

        let (code, _) = call(&app.router, "POST", "/removeReliefCamp", Some(json!({ "index": 0 }))).await;
        assert_eq!(code, StatusCode::OK);
        let (_, camps) = call(&app.router, "GET", "/getReliefCamps", None).await;
        assert_eq!(camps, json!([{ "lat": 19.1, "lng": 72.9, "name": "Emergency Shelter" }]));
    }

    #[tokio::test]
    async fn test_camp_validation_errors() {
        let app = app();
        let (code, body) =
            call(&app.router, "POST", "/addReliefCamp", Some(json!({ "lat": 0, "lng": 72.8 }))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Coordinates are required" }));

        for index in [json!(-1), json!(0), json!(null), json!("zero")] {
            let (code, body) =
                call(&app.router, "POST", "/removeReliefCamp", Some(json!({ "index": index }))).await;
            assert_eq!(code, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "Invalid camp index" }));
        }
    }

    #[tokio::test]
    async fn test_send_emails() {
        let sink = Arc::new(RecordingSink::default());
        let app = app_with_sink(sink.clone());
        call(&app.router, "POST", "/update", Some(json!({ "deviceId": "dev1", "name": "Asha" }))).await;

        let (code, body) = call(
            &app.router,
            "POST",
            "/sendEmails",
            Some(json!({ "emails": ["a@b.c", "d@e.f"], "message": "Need help", "deviceId": "dev1" })),
        )
        .await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "sent": 2 }));
        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Name: Asha"));
    }

    #[tokio::test]
    async fn test_send_emails_errors() {
        let app = app();
        let (code, body) = call(&app.router, "POST", "/sendEmails", Some(json!({ "message": "hi" }))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Emails array is required" }));

        let failing = app_with_sink(Arc::new(FailingSink));
        let (code, body) = call(
            &failing.router,
            "POST",
            "/sendEmails",
            Some(json!({ "emails": ["a@b.c"], "message": "hi" })),
        )
        .await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Failed to send emails" }));
    }
}
