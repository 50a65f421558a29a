use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::cors::build_cors_layer;
use crate::features::{health, upload};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 已存储图片随时可能被同名上传替换，要求客户端每次回源校验。
async fn no_cache_middleware(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    if res.status().is_success() && res.headers().get(header::CACHE_CONTROL).is_none() {
        res.headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    res
}

/// JSON 与文档资源压缩；JPEG 本身已压缩，不再重复处理。
fn compression_predicate() -> impl Predicate {
    SizeAbove::default()
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::const_new("application/octet-stream"))
}

/// 组装全部路由：
/// - `POST /upload`
/// - `GET <public_path>/*`（存储根目录静态服务）
/// - `GET /health`
/// - `/docs` Swagger UI
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let images = Router::new()
        .nest_service(config.public_path(), ServeDir::new(config.storage_root()))
        .layer(middleware::from_fn(no_cache_middleware));

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .merge(upload::create_upload_router(&config))
        .merge(images)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }

    app.layer(middleware::from_fn(request_id_middleware))
}
