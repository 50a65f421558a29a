use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 上传成功提示
pub const UPLOAD_SUCCESS_MESSAGE: &str = "上传成功";

/// 图片槽位 key（即 multipart 中的 `type` 字段），同时作为文件名主干。
///
/// 只接受 `[A-Za-z0-9_-]`，长度 1..=64，不可能构成 `..`、路径分隔符或隐藏文件。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

/// key 校验错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("type 不能为空")]
    Empty,
    #[error("type 过长（{len} > {max}）")]
    TooLong { len: usize, max: usize },
    #[error("type 含非法字符 {0:?}（仅允许字母、数字、- 和 _）")]
    InvalidChar(char),
}

impl ImageKey {
    pub const MAX_LEN: usize = 64;

    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if raw.len() > Self::MAX_LEN {
            return Err(KeyError::TooLong {
                len: raw.len(),
                max: Self::MAX_LEN,
            });
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(KeyError::InvalidChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 落盘文件名：`<key>.jpg`
    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.0)
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 上传成功响应
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// 固定为 0
    #[schema(example = 0)]
    pub code: i32,
    /// 固定为 true
    pub success: bool,
    #[schema(example = "上传成功")]
    pub message: String,
    /// 相对访问路径
    #[schema(example = "/images/avatar.jpg")]
    pub image_url: String,
}

impl UploadResponse {
    pub fn success(image_url: String) -> Self {
        Self {
            code: 0,
            success: true,
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            image_url,
        }
    }
}

/// `POST /upload` 的 multipart 表单（仅用于 OpenAPI 文档）
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// 图片文件，Content-Type 必须为 image/*
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    /// 图片槽位 key，保存为 `<type>.jpg`
    #[serde(rename = "type")]
    #[schema(example = "avatar")]
    pub key: String,
}
