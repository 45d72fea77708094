//! REST API for the packing service.
//!
//! Pick-list endpoints wrap [`PackingService`]; `/pack` and `/pack_stream` run a
//! one-off calculation without storing anything. Packing is CPU-bound and runs on
//! the blocking thread pool.

use std::convert::Infallible;
use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::config::ApiConfig;
use crate::error::PackingError;
use crate::model::{CartonType, Item, Orientation, PickList, PickListLine, RotationPolicy, UnplacedReason};
use crate::normalizer::normalize;
use crate::service::PackingService;
use crate::solver::PackingConfig;
use crate::strategy::{Strategy, pack_lines, pack_with_progress};
use crate::wire::{
    CalculatePackingResponse, CartonAssignment, CartonGeometry, ItemInfo, PackingSummary,
    Position3d, Positions3d, UnplacedItem, VisualizationData, VisualizationPattern,
};

type SharedService = Arc<PackingService>;

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>carton_pack API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Body of `PUT /pick-lists/{id}`.
#[derive(Deserialize, ToSchema)]
#[schema(example = json!({
    "lines": [
        {
            "item": { "code": "ITEM-001", "length": 12.0, "width": 9.0, "height": 10.0, "weight": 0.4 },
            "quantity": 24
        }
    ]
}))]
pub struct PickListRequest {
    pub lines: Vec<PickListLine>,
}

/// Body of `POST /pick-lists/{id}/packing`.
#[derive(Deserialize, ToSchema)]
pub struct CalculatePackingRequest {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_enable_3d")]
    pub enable_3d: bool,
}

fn default_enable_3d() -> bool {
    true
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VisualizationQuery {
    /// Index into `carton_assignments` (0-based).
    #[serde(default)]
    pub carton_index: usize,
}

#[derive(Serialize, ToSchema)]
pub struct CatalogResponse {
    pub carton_types: usize,
}

#[derive(Serialize, ToSchema)]
pub struct PickListResponse {
    pub id: String,
    pub lines: usize,
}

/// Body of the stateless `/pack` and `/pack_stream` endpoints.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "cartons": [
            { "id": "CTN-M", "length": 40.0, "width": 30.0, "height": 30.0, "max_weight": 20.0, "cost": 1.2 }
        ],
        "items": [
            { "item": { "code": "ITEM-001", "length": 12.0, "width": 9.0, "height": 10.0, "weight": 0.4 }, "quantity": 24 }
        ],
        "strategy": "minimize_cartons",
        "allow_rotations": true
    })
)]
pub struct PackRequest {
    pub cartons: Vec<CartonType>,
    pub items: Vec<PickListLine>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    #[schema(nullable = true)]
    pub allow_rotations: Option<bool>,
}

impl PackRequest {
    fn validate(&self) -> Result<(), Response> {
        if self.cartons.is_empty() {
            return Err(validation_error(
                "At least one carton type must be specified",
            ));
        }
        for carton in &self.cartons {
            carton
                .validate()
                .map_err(|err| packing_error_response(&err))?;
        }
        Ok(())
    }

    fn packing_config(&self, base: PackingConfig) -> PackingConfig {
        let mut config = base;
        if let Some(allow_rotations) = self.allow_rotations {
            config.allow_item_rotation = allow_rotations;
        }
        config
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn error_status(err: &PackingError) -> (StatusCode, &'static str) {
    match err {
        PackingError::InvalidItemData(_)
        | PackingError::NoSuitableCarton { .. }
        | PackingError::ItemExceedsCartonWeight { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data")
        }
        PackingError::InvalidCartonData(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid carton configuration",
        ),
        PackingError::NoPackingResult(_) => (StatusCode::NOT_FOUND, "No packing result"),
        PackingError::InvalidCartonIndex { .. } => {
            (StatusCode::NOT_FOUND, "Invalid carton assignment index")
        }
        PackingError::PickListNotFound(_) => (StatusCode::NOT_FOUND, "Pick list not found"),
        PackingError::CalculationInProgress(_) => {
            (StatusCode::CONFLICT, "Calculation already running")
        }
        PackingError::MalformedPositions(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stored packing data is unreadable",
        ),
    }
}

fn packing_error_response(err: &PackingError) -> Response {
    let (status, error) = error_status(err);
    error_response(status, error, err.to_string())
}

fn task_failed(err: tokio::task::JoinError) -> Response {
    log::error!("❌ Packing task failed: {err}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Packing task failed",
        err.to_string(),
    )
}

/// Runs a service call on the blocking pool and maps its outcome to a response.
async fn run_blocking<T, F>(call: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(err)) => packing_error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_put_cartons,
        handle_put_pick_list,
        handle_calculate_packing,
        handle_get_packing,
        handle_get_visualization,
        handle_pack,
        handle_pack_stream
    ),
    components(
        schemas(
            CartonType,
            Item,
            PickListLine,
            RotationPolicy,
            Orientation,
            Strategy,
            UnplacedReason,
            PickListRequest,
            PickListResponse,
            CatalogResponse,
            CalculatePackingRequest,
            CalculatePackingResponse,
            PackRequest,
            PackingSummary,
            CartonAssignment,
            Position3d,
            Positions3d,
            UnplacedItem,
            VisualizationData,
            VisualizationPattern,
            CartonGeometry,
            ItemInfo,
            ErrorResponse
        )
    ),
    tags(
        (name = "pick-lists", description = "Stored packing calculations per pick list"),
        (name = "packing", description = "One-off packing calculations")
    )
)]
struct ApiDoc;

fn router(service: SharedService) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cartons", put(handle_put_cartons))
        .route("/pick-lists/{id}", put(handle_put_pick_list))
        .route(
            "/pick-lists/{id}/packing",
            post(handle_calculate_packing).get(handle_get_packing),
        )
        .route(
            "/pick-lists/{id}/visualization",
            get(handle_get_visualization),
        )
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(service)
}

/// Starts the API server and serves until it terminates.
pub async fn start_api_server(config: ApiConfig, service: SharedService) -> std::io::Result<()> {
    let app = router(service);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        log::error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    let display_host = config.display_host().to_string();
    log::info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        log::info!("💡 Local access: http://localhost:{}", config.port());
    }
    log::info!("📦 API Endpoints:");
    log::info!("   - PUT  /cartons");
    log::info!("   - PUT  /pick-lists/{{id}}");
    log::info!("   - POST /pick-lists/{{id}}/packing");
    log::info!("   - GET  /pick-lists/{{id}}/packing");
    log::info!("   - GET  /pick-lists/{{id}}/visualization?carton_index=N");
    log::info!("   - POST /pack");
    log::info!("   - POST /pack_stream");
    log::info!("📑 Documentation:");
    log::info!("   - GET /docs");
    log::info!("   - GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Replaces the carton catalog.
#[utoipa::path(
    put,
    path = "/cartons",
    request_body = Vec<CartonType>,
    responses(
        (status = 200, description = "Catalog replaced", body = CatalogResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid carton data", body = ErrorResponse)
    ),
    tag = "pick-lists"
)]
async fn handle_put_cartons(
    State(service): State<SharedService>,
    payload: Result<Json<Vec<CartonType>>, JsonRejection>,
) -> Response {
    let Json(cartons) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    match service.source().replace_cartons(cartons) {
        Ok(carton_types) => {
            log::info!("🗃️ Carton catalog replaced: {carton_types} types");
            (StatusCode::OK, Json(CatalogResponse { carton_types })).into_response()
        }
        Err(err) => packing_error_response(&err),
    }
}

/// Registers or replaces a pick list.
#[utoipa::path(
    put,
    path = "/pick-lists/{id}",
    params(("id" = String, Path, description = "Pick list id")),
    request_body = PickListRequest,
    responses(
        (status = 200, description = "Pick list stored", body = PickListResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid item data", body = ErrorResponse)
    ),
    tag = "pick-lists"
)]
async fn handle_put_pick_list(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    payload: Result<Json<PickListRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    let lines = request.lines.len();
    let pick_list = PickList {
        id: id.clone(),
        lines: request.lines,
    };
    match service.source().put_pick_list(pick_list) {
        Ok(()) => (StatusCode::OK, Json(PickListResponse { id, lines })).into_response(),
        Err(err) => packing_error_response(&err),
    }
}

/// Calculates and stores the packing of a pick list.
#[utoipa::path(
    post,
    path = "/pick-lists/{id}/packing",
    params(("id" = String, Path, description = "Pick list id")),
    request_body = CalculatePackingRequest,
    responses(
        (status = 200, description = "Packing calculated (check unplaced_items)", body = CalculatePackingResponse),
        (status = NOT_FOUND, description = "Unknown pick list", body = ErrorResponse),
        (status = CONFLICT, description = "Calculation already running", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid item data", body = ErrorResponse)
    ),
    tag = "pick-lists"
)]
async fn handle_calculate_packing(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    payload: Result<Json<CalculatePackingRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    run_blocking(move || service.calculate_packing(&id, request.strategy, request.enable_3d)).await
}

/// Summary of the stored packing result.
#[utoipa::path(
    get,
    path = "/pick-lists/{id}/packing",
    params(("id" = String, Path, description = "Pick list id")),
    responses(
        (status = 200, description = "Stored packing summary", body = PackingSummary),
        (status = NOT_FOUND, description = "No result calculated yet", body = ErrorResponse)
    ),
    tag = "pick-lists"
)]
async fn handle_get_packing(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Response {
    match service.packing_summary(&id) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => packing_error_response(&err),
    }
}

/// 3D viewer data for one carton assignment.
#[utoipa::path(
    get,
    path = "/pick-lists/{id}/visualization",
    params(("id" = String, Path, description = "Pick list id"), VisualizationQuery),
    responses(
        (status = 200, description = "Carton geometry and placements", body = VisualizationData),
        (status = NOT_FOUND, description = "No result or invalid carton index", body = ErrorResponse)
    ),
    tag = "pick-lists"
)]
async fn handle_get_visualization(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    Query(query): Query<VisualizationQuery>,
) -> Response {
    match service.visualization_data(&id, query.carton_index) {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(err) => packing_error_response(&err),
    }
}

/// Packs items into the given cartons without storing the result.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Packing result", body = PackingSummary),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or carton configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(service): State<SharedService>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    if let Err(response) = request.validate() {
        return response;
    }

    log::info!(
        "📥 New pack request: {} lines, {} carton types, strategy {}",
        request.items.len(),
        request.cartons.len(),
        request.strategy
    );
    let config = request.packing_config(*service.config());
    run_blocking(move || {
        let result = pack_lines(&request.items, &request.cartons, request.strategy, &config)?;
        log::info!(
            "📦 Result: {} cartons, {} unplaced units",
            result.total_cartons,
            result.unplaced_count()
        );
        Ok(PackingSummary::from_result(&result))
    })
    .await
}

/// Streams solver events as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or carton configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_stream(
    State(service): State<SharedService>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    if let Err(response) = request.validate() {
        return response;
    }
    let normalized = match normalize(&request.items) {
        Ok(normalized) => normalized,
        Err(err) => return packing_error_response(&err),
    };

    let config = request.packing_config(*service.config());
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        pack_with_progress(
            &normalized,
            &request.cartons,
            request.strategy,
            &config,
            |evt| {
                if let Ok(json) = serde_json::to_string(evt) {
                    // A closed receiver means the client left; later events are dropped.
                    let _ = tx.blocking_send(json);
                }
            },
        );
    });

    let stream =
        ReceiverStream::new(rx).map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
