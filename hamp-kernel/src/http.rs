/**
 * API REST HAMP - Routes HTTP / WebSocket du kernel
 *
 * RÔLE :
 * Expose l'état des laveries : snapshot, machine unique, flux live.
 *
 * FONCTIONNEMENT :
 * - GET /api/utilities/laundry/{room}             snapshot (`?cache=false` = refresh forcé)
 * - GET /api/utilities/laundry/{room}/machines/{m} une machine, 404 si absente
 * - GET /api/utilities/laundry/{room}/live         WebSocket : état courant puis chaque mise à jour
 * - GET /, /api/, /health, /system/health          santé
 *
 * Le JSON reprend le format historique de l'API (camelCase, `type`, `time`,
 * `estimatedTime`). Un refresh forcé en échec retombe sur le dernier snapshot.
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::laundry::fanout::Subscription;
use crate::laundry::{LaundryError, LaundryRegistry};
use crate::models::{Machine, MachineKind, RoomSnapshot};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomView {
    id: String,
    name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    next_update: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    last_update: Option<OffsetDateTime>,
    machines: Vec<MachineView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MachineView {
    name: String,
    #[serde(rename = "type")]
    kind: Option<MachineKind>,
    status: String,
    time: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    estimated_time: Option<OffsetDateTime>,
}

/// `id` est l'identifiant upstream de la laverie, comme dans l'API historique
fn to_view(id: &str, room: &RoomSnapshot) -> RoomView {
    RoomView {
        id: id.to_string(),
        name: room.name.clone(),
        next_update: room.next_update,
        last_update: room.last_update,
        machines: room.machines.iter().map(to_machine_view).collect(),
    }
}

fn to_machine_view(m: &Machine) -> MachineView {
    MachineView {
        name: m.name.clone(),
        kind: m.kind,
        status: m.status.clone(),
        time: m.remaining.as_ref().map(|r| r.text.clone()),
        estimated_time: m.remaining.as_ref().and_then(|r| r.estimated_completion),
    }
}

impl IntoResponse for LaundryError {
    fn into_response(self) -> Response {
        let code = match &self {
            LaundryError::RoomNotFound(_) | LaundryError::MachineNotFound { .. } => StatusCode::NOT_FOUND,
            LaundryError::Fetch(_) => StatusCode::BAD_GATEWAY,
        };
        (code, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LaundryRegistry>,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, Deserialize)]
struct RoomParams {
    cache: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    let laundry = Router::new()
        .route("/", get(list_rooms))
        .route("/{room}", get(get_room))
        .route("/{room}/machines/{machine}", get(get_machine))
        .route("/{room}/live", get(live_room));

    Router::new()
        .route("/", get(health_check))
        .route("/api/", get(health_check))
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .nest("/api/utilities/laundry", laundry)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// GET / et /api/
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "data": "Server is up and running" }))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.registry))
}

// GET /api/utilities/laundry
async fn list_rooms(State(app): State<AppState>) -> Json<Vec<RoomView>> {
    let rooms = app
        .registry
        .rooms()
        .iter()
        .map(|r| to_view(r.upstream_id(), &r.snapshot()))
        .collect();
    Json(rooms)
}

// GET /api/utilities/laundry/{room}
async fn get_room(
    State(app): State<AppState>,
    Path(room): Path<String>,
    Query(params): Query<RoomParams>,
) -> Result<Json<RoomView>, LaundryError> {
    let force_refresh = params.cache.as_deref() == Some("false");

    let snapshot = match app.registry.get(&room, force_refresh).await {
        Ok(snapshot) => snapshot,
        Err(LaundryError::Fetch(e)) => {
            warn!(room = %room, "forced refresh failed, serving last snapshot: {e}");
            app.registry.get(&room, false).await?
        }
        Err(e) => return Err(e),
    };
    let id = app.registry.room(&room)?.upstream_id();
    Ok(Json(to_view(id, &snapshot)))
}

// GET /api/utilities/laundry/{room}/machines/{machine}
async fn get_machine(
    State(app): State<AppState>,
    Path((room, machine)): Path<(String, String)>,
) -> Result<Json<MachineView>, LaundryError> {
    let machine = app.registry.get_machine(&room, &machine)?;
    Ok(Json(to_machine_view(&machine)))
}

// GET /api/utilities/laundry/{room}/live
async fn live_room(
    ws: WebSocketUpgrade,
    State(app): State<AppState>,
    Path(room): Path<String>,
) -> Result<Response, LaundryError> {
    let subscription = app.registry.subscribe(&room)?;
    let id = app.registry.room(&room)?.upstream_id().to_string();
    Ok(ws.on_upgrade(move |socket| stream_room(socket, id, subscription)))
}

/// Pousse chaque snapshot au viewer jusqu'à sa déconnexion.
/// Le drop de la subscription en sortie le retire de la diffusion.
async fn stream_room(socket: WebSocket, id: String, mut subscription: Subscription) {
    let viewer = Uuid::new_v4();
    let room = subscription.room().to_string();
    let (mut sender, mut receiver) = socket.split();
    info!(room = %room, %viewer, "live viewer connected");

    loop {
        tokio::select! {
            update = subscription.next() => {
                let Some(snapshot) = update else { break };
                let payload = match serde_json::to_string(&to_view(&id, &snapshot)) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(room = %room, "failed to serialize snapshot: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(room = %room, %viewer, "live viewer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laundry::fetcher::FetchError;
    use crate::laundry::testing::{registry_with, ScriptedSource};
    use crate::models::Remaining;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use time::macros::datetime;
    use tower::ServiceExt;

    fn app(source: Arc<ScriptedSource>) -> (Router, Arc<LaundryRegistry>) {
        let health_tracker = HealthTracker::new();
        let registry = Arc::new(registry_with(source, health_tracker.clone()));
        let router = build_router(AppState {
            registry: registry.clone(),
            health_tracker,
        });
        (router, registry)
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn test_machine_view_json_shape() {
        let at = datetime!(2024-03-01 12:32 UTC);
        let view = to_machine_view(&Machine {
            name: "Washer 2".into(),
            kind: Some(MachineKind::Washer),
            status: "In Use".into(),
            remaining: Some(Remaining {
                text: "32 minutes left".into(),
                estimated_completion: Some(at),
            }),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Washer 2",
                "type": "Washer",
                "status": "In Use",
                "time": "32 minutes left",
                "estimatedTime": "2024-03-01T12:32:00Z"
            })
        );
    }

    #[tokio::test]
    async fn test_health_routes() {
        let (router, _) = app(ScriptedSource::always_ok());
        let (status, json) = get_json(&router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"], "Server is up and running");

        let (status, json) = get_json(&router, "/system/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["rooms_tracked"], 4);
    }

    #[tokio::test]
    async fn test_get_room_cached_and_forced() {
        let source = ScriptedSource::always_ok();
        let (router, _) = app(source.clone());

        let (status, json) = get_json(&router, "/api/utilities/laundry/dakin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "dakink");
        assert_eq!(json["machines"].as_array().unwrap().len(), 0);
        assert!(json["lastUpdate"].is_null());
        assert_eq!(source.calls(), 0);

        let (status, json) = get_json(&router, "/api/utilities/laundry/dakin?cache=false").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["machines"].as_array().unwrap().len(), 3);
        assert!(json["nextUpdate"].is_string());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_forced_refresh_failure_falls_back_to_last_snapshot() {
        let source = ScriptedSource::always_ok();
        let (router, registry) = app(source.clone());
        registry.get("merrill", true).await.unwrap();

        source.set_outcome(Err(FetchError::UpstreamUnavailable("HTTP 500".into())));
        let (status, json) = get_json(&router, "/api/utilities/laundry/merrill?cache=false").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["machines"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_machine_and_not_found() {
        let (router, registry) = app(ScriptedSource::always_ok());
        registry.get("enfield", true).await.unwrap();

        let (status, json) =
            get_json(&router, "/api/utilities/laundry/enfield/machines/Washer%203").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Washer 3");
        assert_eq!(json["type"], "Washer");

        let (status, _) = get_json(&router, "/api/utilities/laundry/enfield/machines/Washer%209").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(&router, "/api/utilities/laundry/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_rooms() {
        let (router, _) = app(ScriptedSource::always_ok());
        let (status, json) = get_json(&router, "/api/utilities/laundry").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Dakin", "Merrill", "Enfield", "Prescott"]);
        assert_eq!(json[0]["id"], "dakink");
        assert_eq!(json[1]["id"], "merrill");
    }

    type LiveSocket = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn next_json(ws: &mut LiveSocket) -> serde_json::Value {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_live_streams_current_then_updates_until_disconnect() {
        use hamp_devkit::wait_until;
        use tokio_tungstenite::connect_async;

        let (router, registry) = app(ScriptedSource::always_ok());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let url = format!("ws://{addr}/api/utilities/laundry/dakin/live");
        let (mut ws, _) = connect_async(url).await.unwrap();

        // état courant d'abord
        let first = next_json(&mut ws).await;
        assert_eq!(first["id"], "dakink");
        assert_eq!(first["machines"].as_array().unwrap().len(), 0);
        assert_eq!(registry.live_viewers(), 1);

        // puis chaque publication
        registry.get("dakin", true).await.unwrap();
        let update = next_json(&mut ws).await;
        assert_eq!(update["machines"].as_array().unwrap().len(), 3);
        assert!(update["lastUpdate"].is_string());

        ws.close(None).await.unwrap();
        assert!(wait_until(2000, || registry.live_viewers() == 0).await);

        server.abort();
    }

    #[tokio::test]
    async fn test_live_unknown_room_is_not_found() {
        let (router, _) = app(ScriptedSource::always_ok());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let url = format!("ws://{addr}/api/utilities/laundry/nowhere/live");
        assert!(tokio_tungstenite::connect_async(url).await.is_err());

        server.abort();
    }
}
