use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::models::ImageKey;

const PARTIAL_SUFFIX: &str = ".partial";

type LockTable = Mutex<HashMap<ImageKey, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("写入 {path} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("写入任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 图片存储：`<root>/<key>.jpg`，每个 key 至多一个文件。
///
/// 替换流程为“写 partial 文件 → fsync → rename 覆盖”，读者只会看到旧文件或新文件；
/// 同一 key 的写入由 key 级互斥锁串行化，最后拿到锁的请求胜出。
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
    locks: Arc<LockTable>,
}

/// 锁表项的一份引用；最后一份释放时从表中移除。
///
/// 表内 `Arc` 的克隆与释放都在表锁内完成，等待中被取消的请求同样会回收。
struct KeyEntry {
    table: Arc<LockTable>,
    key: ImageKey,
    mutex: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl Drop for KeyEntry {
    fn drop(&mut self) {
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.mutex.take());
        if locks
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// 持有期间独占某个 key。
///
/// 字段按声明顺序释放：先放锁，再回收表项。
struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
    _entry: KeyEntry,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ImageKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    async fn lock_key(&self, key: &ImageKey) -> KeyGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        let entry = KeyEntry {
            table: self.locks.clone(),
            key: key.clone(),
            mutex: Some(mutex.clone()),
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// 当前仍有持有者或等待者的 key 数量
    pub fn active_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 原子替换 key 对应的图片，返回最终路径。
    ///
    /// 写入与 rename 在 blocking 线程中执行并持有 key 锁直到结束；
    /// 调用方被取消（如客户端断开）也不会在存储目录留下 partial 文件。
    pub async fn replace(&self, key: &ImageKey, bytes: Vec<u8>) -> Result<PathBuf, StoreError> {
        let guard = self.lock_key(key).await;

        let dest = self.path_for(key);
        let partial = self.root.join(format!(
            ".{}.{}{}",
            key.as_str(),
            Uuid::new_v4().simple(),
            PARTIAL_SUFFIX
        ));

        let size = bytes.len();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_then_rename(&partial, &target, &bytes)
        })
        .await?
        .map_err(|source| StoreError::Write {
            path: dest.clone(),
            source,
        })?;

        tracing::debug!(key = %key, path = %dest.display(), size, "图片已替换");
        Ok(dest)
    }

    /// 启动时清扫崩溃遗留的 partial 文件，返回删除数量。
    pub async fn sweep_partials(&self) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "清理 partial 文件失败")
                }
            }
        }
        Ok(removed)
    }
}

fn write_then_rename(partial: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let result = (|| {
        let mut file = std::fs::File::create(partial)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(partial, dest)
    })();

    if result.is_err()
        && let Err(e) = std::fs::remove_file(partial)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %partial.display(), error = %e, "清理 partial 文件失败");
    }
    result
}
