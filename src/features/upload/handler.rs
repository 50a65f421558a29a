use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    routing::post,
};

use super::models::{ImageKey, UploadForm, UploadResponse};
use super::service;
use super::temp::{TempUpload, TempUploadError};
use crate::config::AppConfig;
use crate::error::{AppError, ErrorEnvelope};
use crate::state::AppState;

/// 文件字段名
pub const IMAGE_FIELD: &str = "image";
/// key 字段名
pub const TYPE_FIELD: &str = "type";

/// 请求体上限在文件上限之外额外预留的 multipart 边界/头部开销
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_upload_router(config: &AppConfig) -> Router<AppState> {
    let body_limit = config
        .storage
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// 解析完成的表单
#[derive(Default)]
struct ReceivedForm {
    image: Option<TempUpload>,
    key: Option<String>,
}

fn map_multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::Validation(err.body_text())
    }
}

/// 逐个读取 multipart 字段；文件字段在第一个字节落盘前完成 MIME 校验。
///
/// 中途返回错误时，已落盘的临时文件由 `TempUpload` 的 `Drop` 删除。
async fn receive_form(
    multipart: &mut Multipart,
    config: &AppConfig,
) -> Result<ReceivedForm, AppError> {
    let limit = config.storage.max_upload_bytes;
    let temp_dir = config.temp_dir();
    let mut form = ReceivedForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                if form.image.is_some() {
                    return Err(AppError::Validation(format!(
                        "只允许上传一个 {IMAGE_FIELD} 文件"
                    )));
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("image/") {
                    return Err(AppError::UnsupportedMediaType(content_type));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();

                let upload = TempUpload::receive(field, &temp_dir, limit)
                    .await
                    .map_err(|e| match e {
                        TempUploadError::TooLarge { limit } => AppError::PayloadTooLarge { limit },
                        TempUploadError::Stream(e) => map_multipart_error(e, limit),
                        TempUploadError::Io(e) => {
                            tracing::error!(error = %e, "上传文件落盘失败");
                            AppError::ProcessingFailed
                        }
                    })?;
                tracing::debug!(
                    file_name = %file_name,
                    content_type = %content_type,
                    size = upload.size(),
                    "已接收上传文件"
                );
                form.image = Some(upload);
            }
            Some(TYPE_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| map_multipart_error(e, limit))?;
                form.key = Some(text);
            }
            // 其他字段忽略
            _ => {}
        }
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/upload",
    summary = "上传图片",
    description = "上传一张图片并保存为 `<type>.jpg`：按 EXIF 方向摆正，缩进 1920x1080（不放大），以 JPEG 质量 85 重新编码。同名 type 会被原子替换。",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "上传成功", body = UploadResponse),
        (status = 400, description = "缺少文件 / 文件过大 / 非图片 / type 非法", body = ErrorEnvelope),
        (status = 500, description = "处理失败", body = ErrorEnvelope)
    ),
    tag = "Upload"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    let form = receive_form(&mut multipart, &state.config).await?;

    let Some(upload) = form.image else {
        return Err(AppError::MissingFile);
    };

    let key = match form.key.as_deref().map(ImageKey::parse) {
        Some(Ok(key)) => key,
        Some(Err(e)) => {
            upload.discard().await;
            return Err(AppError::InvalidKey(e.to_string()));
        }
        None => {
            upload.discard().await;
            return Err(AppError::InvalidKey(format!("缺少 {TYPE_FIELD} 字段")));
        }
    };

    let result = service::normalize_and_store(&state, &key, &upload).await;
    upload.discard().await;

    match result {
        Ok(path) => {
            tracing::info!(key = %key, path = %path.display(), "上传成功");
            let image_url = format!("{}/{}", state.config.public_path(), key.file_name());
            Ok(Json(UploadResponse::success(image_url)))
        }
        Err(e) => {
            tracing::error!(key = %key, error = %e, "上传处理失败");
            Err(AppError::ProcessingFailed)
        }
    }
}
