use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::upload::{ImageStore, temp};
use std::path::Path;

/// 执行启动检查
///
/// 1. 检查并创建存储根目录与暂存目录
/// 2. 拒绝两者指向同一目录（否则清扫暂存目录会误删图片）
/// 3. 清扫上次进程遗留的临时文件与 partial 文件
pub async fn run_startup_checks(config: &AppConfig, store: &ImageStore) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    let temp_dir = config.temp_dir();
    ensure_folder("存储根目录", store.root()).await?;
    ensure_folder("暂存目录", &temp_dir).await?;
    ensure_distinct(store.root(), &temp_dir).await?;

    match temp::sweep(&temp_dir).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("🧹 已清理 {} 个遗留临时文件", n),
        Err(e) => tracing::warn!("清理暂存目录失败: {}", e),
    }
    match store.sweep_partials().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("🧹 已清理 {} 个遗留 partial 文件", n),
        Err(e) => tracing::warn!("清理存储目录失败: {}", e),
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// 确保目录存在（递归创建）
async fn ensure_folder(label: &str, path: &Path) -> Result<(), AppError> {
    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        tracing::info!("✅ {}已存在: {:?}", label, path);
        return Ok(());
    }

    tracing::warn!("📁 未找到{}，正在创建: {:?}", label, path);
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| AppError::Internal(format!("创建{label}失败: {e}")))?;
    tracing::info!("✅ {}创建成功", label);
    Ok(())
}

async fn ensure_distinct(root: &Path, temp_dir: &Path) -> Result<(), AppError> {
    let canonical = |p: &Path| {
        let p = p.to_path_buf();
        async move {
            tokio::fs::canonicalize(&p)
                .await
                .map_err(|e| AppError::Internal(format!("解析路径 {p:?} 失败: {e}")))
        }
    };
    if canonical(root).await? == canonical(temp_dir).await? {
        return Err(AppError::Internal(
            "storage.root 与 storage.temp_dir 不能是同一目录".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run_startup_checks;
    use crate::config::AppConfig;
    use crate::features::upload::ImageStore;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.storage.root = dir.join("nested/images").to_string_lossy().into_owned();
        cfg.storage.temp_dir = dir.join("nested/tmp").to_string_lossy().into_owned();
        cfg
    }

    #[tokio::test]
    async fn creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config_in(dir.path());
        let store = ImageStore::new(cfg.storage_root());

        run_startup_checks(&cfg, &store).await.expect("startup");
        assert!(cfg.storage_root().is_dir());
        assert!(cfg.temp_dir().is_dir());
    }

    #[tokio::test]
    async fn sweeps_stale_artifacts_but_keeps_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config_in(dir.path());
        std::fs::create_dir_all(cfg.storage_root()).expect("mkdir");
        std::fs::create_dir_all(cfg.temp_dir()).expect("mkdir");
        std::fs::write(cfg.storage_root().join("logo.jpg"), b"x").expect("write");
        std::fs::write(cfg.storage_root().join(".logo.abc.partial"), b"x").expect("write");
        std::fs::write(cfg.temp_dir().join("abc.upload"), b"x").expect("write");

        let store = ImageStore::new(cfg.storage_root());
        run_startup_checks(&cfg, &store).await.expect("startup");

        assert!(cfg.storage_root().join("logo.jpg").exists());
        assert!(!cfg.storage_root().join(".logo.abc.partial").exists());
        assert!(!cfg.temp_dir().join("abc.upload").exists());
    }

    #[tokio::test]
    async fn rejects_shared_root_and_temp_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config_in(dir.path());
        cfg.storage.temp_dir = cfg.storage.root.clone();
        let store = ImageStore::new(cfg.storage_root());

        assert!(run_startup_checks(&cfg, &store).await.is_err());
    }
}
