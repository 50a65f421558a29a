use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::features::upload::{ImageStore, TransformOptions};

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ImageStore>,
    /// 图片转换参数
    pub transform: TransformOptions,
    /// 控制并发转换的信号量（限制 CPU 密集型任务数量）
    pub transform_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let permits = match config.image.max_parallel as usize {
            0 => num_cpus::get(),
            n => n,
        };
        Self {
            store: Arc::new(ImageStore::new(config.storage_root())),
            transform: TransformOptions::from_config(&config.image),
            transform_semaphore: Arc::new(Semaphore::new(permits)),
            config: Arc::new(config),
        }
    }
}
