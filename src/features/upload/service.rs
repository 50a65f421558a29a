use std::path::PathBuf;

use thiserror::Error;

use super::models::ImageKey;
use super::pipeline::{self, TransformError};
use super::store::StoreError;
use super::temp::TempUpload;
use crate::state::AppState;

/// 处理阶段错误；对外统一折叠为 `AppError::ProcessingFailed`。
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("读取临时文件失败: {0}")]
    ReadTemp(#[source] std::io::Error),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("转换任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("处理许可已关闭")]
    SemaphoreClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 读取暂存文件 → 转换（blocking 池，受信号量限流）→ 原子替换目标文件。
pub async fn normalize_and_store(
    state: &AppState,
    key: &ImageKey,
    upload: &TempUpload,
) -> Result<PathBuf, ProcessError> {
    let input = upload.read().await.map_err(ProcessError::ReadTemp)?;

    let permit = state
        .transform_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ProcessError::SemaphoreClosed)?;

    let opts = state.transform;
    let started = std::time::Instant::now();
    let output = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        pipeline::normalize(&input, &opts)
    })
    .await??;

    tracing::debug!(
        key = %key,
        input_bytes = upload.size(),
        output_bytes = output.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "图片转换完成"
    );

    Ok(state.store.replace(key, output).await?)
}
