use std::io;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const TEMP_SUFFIX: &str = ".upload";

#[derive(Debug, Error)]
pub enum TempUploadError<E> {
    #[error("文件超过 {limit} 字节")]
    TooLarge { limit: usize },
    #[error("读取上传流失败: {0}")]
    Stream(E),
    #[error("写入临时文件失败: {0}")]
    Io(#[from] io::Error),
}

/// 落在暂存目录里的上传文件。
///
/// 正常路径调用 [`TempUpload::discard`]；请求被取消或中途出错时由 `Drop` 兜底删除。
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    size: usize,
    armed: bool,
}

impl TempUpload {
    /// 把分片流写入 `dir` 下的新临时文件，累计超过 `limit` 字节立即中止。
    pub async fn receive<S, E>(
        stream: S,
        dir: &Path,
        limit: usize,
    ) -> Result<Self, TempUploadError<E>>
    where
        S: Stream<Item = Result<Bytes, E>>,
    {
        let mut upload = Self {
            path: dir.join(format!("{}{}", Uuid::new_v4().simple(), TEMP_SUFFIX)),
            size: 0,
            armed: true,
        };
        let mut file = tokio::fs::File::create(&upload.path).await?;

        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    upload.discard().await;
                    return Err(TempUploadError::Stream(e));
                }
            };
            upload.size += chunk.len();
            if upload.size > limit {
                drop(file);
                upload.discard().await;
                return Err(TempUploadError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(upload)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// 尽力删除；失败只记录日志，不影响请求结果。
    pub async fn discard(mut self) {
        self.armed = false;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            log_cleanup_failure(&self.path, &e);
        }
    }
}

impl Drop for TempUpload {
    // 只在请求取消或出错提前返回时触发，同步删除一次小文件可接受
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            log_cleanup_failure(&self.path, &e);
        }
    }
}

fn log_cleanup_failure(path: &Path, err: &io::Error) {
    if err.kind() != io::ErrorKind::NotFound {
        tracing::warn!(path = %path.display(), error = %err, "清理临时文件失败");
    }
}

/// 启动时清扫上次进程遗留的临时文件，返回删除数量。
pub async fn sweep(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(TEMP_SUFFIX) || !entry.file_type().await?.is_file() {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => log_cleanup_failure(&entry.path(), &e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, Infallible>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).expect("read_dir").next().is_none()
    }

    #[tokio::test]
    async fn receive_writes_all_chunks_and_discard_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let upload = TempUpload::receive(chunks(&[b"abc", b"def"]), dir.path(), 16)
            .await
            .expect("receive");
        assert_eq!(upload.size(), 6);
        assert_eq!(upload.read().await.expect("read"), b"abcdef");

        let path = upload.path().to_path_buf();
        upload.discard().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn exceeding_limit_leaves_nothing_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TempUpload::receive(chunks(&[b"0123", b"4567"]), dir.path(), 5)
            .await
            .expect_err("too large");
        assert!(matches!(err, TempUploadError::TooLarge { limit: 5 }));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn stream_error_leaves_nothing_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parts = stream::iter(vec![Ok(Bytes::from_static(b"ab")), Err("boom")]);
        let err = TempUpload::receive(parts, dir.path(), 64)
            .await
            .expect_err("stream error");
        assert!(matches!(err, TempUploadError::Stream("boom")));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn drop_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let upload = TempUpload::receive(chunks(&[b"x"]), dir.path(), 4)
            .await
            .expect("receive");
        drop(upload);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn sweep_only_touches_temp_uploads() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("stale.upload"), b"x").expect("write");
        std::fs::write(dir.path().join("keep.txt"), b"x").expect("write");

        assert_eq!(sweep(dir.path()).await.expect("sweep"), 1);
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("stale.upload").exists());
    }
}
