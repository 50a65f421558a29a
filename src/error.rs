use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 请求中没有文件部分
    #[error("未上传文件")]
    MissingFile,

    /// 文件超过大小上限
    #[error("文件过大（上限 {limit} 字节）")]
    PayloadTooLarge { limit: usize },

    /// 声明的 Content-Type 不是 image/*
    #[error("仅支持上传图片文件（收到 {0}）")]
    UnsupportedMediaType(String),

    /// `type` 字段缺失或不可作为文件名
    #[error("无效的 type: {0}")]
    InvalidKey(String),

    /// multipart 解析等框架层校验错误
    #[error("请求格式错误: {0}")]
    Validation(String),

    /// 解码 / 转换 / 写入失败（原因不对外暴露）
    #[error("上传失败")]
    ProcessingFailed,

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 失败响应的 JSON 信封
///
/// `code` 与成功响应同为整数（此处取 HTTP 状态码），稳定的错误标识放在 `error`。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// HTTP 状态码
    #[schema(example = 400)]
    pub code: u16,
    /// 稳定的错误标识，用于程序化处理
    #[schema(example = "MISSING_FILE")]
    pub error: String,
    /// 固定为 false
    pub success: bool,
    /// 人类可读的错误信息
    #[schema(example = "未上传文件")]
    pub message: String,
    /// 请求追踪 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingFile
            | AppError::PayloadTooLarge { .. }
            | AppError::UnsupportedMediaType(_)
            | AppError::InvalidKey(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ProcessingFailed | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn stable_code(&self) -> &'static str {
        match self {
            AppError::MissingFile => "MISSING_FILE",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            AppError::InvalidKey(_) => "INVALID_KEY",
            AppError::Validation(_) => "BAD_REQUEST",
            AppError::ProcessingFailed => "PROCESSING_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let envelope = ErrorEnvelope {
            code: status.as_u16(),
            error: self.stable_code().to_string(),
            success: false,
            message: self.to_string(),
            request_id: crate::request_id::current_request_id(),
        };
        (status, Json(envelope)).into_response()
    }
}
