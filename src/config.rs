use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 单个上传文件的默认大小上限（5 MiB）
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口（`PORT` 环境变量优先）
    pub port: u16,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 图片存储根目录，`<root>/<type>.jpg`
    pub root: String,
    /// 上传暂存目录（multipart 流式落盘）
    pub temp_dir: String,
    /// 单个文件大小上限（字节）
    #[serde(default = "StorageConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// 对外访问路径前缀
    #[serde(default = "StorageConfig::default_public_path")]
    pub public_path: String,
}

impl StorageConfig {
    fn default_max_upload_bytes() -> usize {
        DEFAULT_MAX_UPLOAD_BYTES
    }

    fn default_public_path() -> String {
        "/images".to_string()
    }
}

/// 图片处理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// 输出最大宽度（只缩小不放大）
    #[serde(default = "ImageConfig::default_max_width")]
    pub max_width: u32,
    /// 输出最大高度（只缩小不放大）
    #[serde(default = "ImageConfig::default_max_height")]
    pub max_height: u32,
    /// JPEG 质量 1-100
    #[serde(default = "ImageConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 是否优先速度缩放（Triangle），默认 Lanczos3
    #[serde(default)]
    pub optimize_speed: bool,
    /// 并发处理许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 解码时单边像素上限，防止解压炸弹
    #[serde(default = "ImageConfig::default_max_decode_dimension")]
    pub max_decode_dimension: u32,
}

impl ImageConfig {
    fn default_max_width() -> u32 {
        1920
    }
    fn default_max_height() -> u32 {
        1080
    }
    fn default_jpeg_quality() -> u8 {
        85
    }
    fn default_max_decode_dimension() -> u32 {
        16384
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: Self::default_max_width(),
            max_height: Self::default_max_height(),
            jpeg_quality: Self::default_jpeg_quality(),
            optimize_speed: false,
            max_parallel: 0,
            max_decode_dimension: Self::default_max_decode_dimension(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 未设置时生效）
    pub level: String,
    /// 日志格式：full | compact
    pub format: String,
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_headers: Vec<String>,
    /// 是否允许携带凭证（Cookie/Authorization）
    #[serde(default)]
    pub allow_credentials: bool,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        true
    }

    fn wildcard() -> Vec<String> {
        vec!["*".to_string()]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Self::wildcard(),
            allowed_methods: Self::wildcard(),
            allowed_headers: Self::wildcard(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 收到退出信号后等待在途请求的最长时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 加载配置：内置默认值 < config.toml（可选）< `APP_*` 环境变量 < `PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let port = std::env::var("PORT").ok().filter(|p| !p.trim().is_empty());
        Self::load_from(&Self::get_config_path(), port)
    }

    /// 从指定文件与端口覆盖值加载配置。
    ///
    /// 环境变量以 `APP_` 开头，层级之间用双下划线分隔，
    /// 例如 `APP_STORAGE__MAX_UPLOAD_BYTES=1048576`。
    pub fn load_from(config_path: &Path, port_override: Option<String>) -> Result<Self, ConfigError> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default())?;

        let config: Self = ConfigBuilder::builder()
            .add_source(defaults)
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", port_override)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.max_upload_bytes == 0 {
            return Err(ConfigError::Message(
                "storage.max_upload_bytes 必须大于 0".to_string(),
            ));
        }
        if self.image.max_width == 0 || self.image.max_height == 0 {
            return Err(ConfigError::Message(
                "image.max_width / image.max_height 必须大于 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(ConfigError::Message(
                "image.jpeg_quality 必须在 1-100 之间".to_string(),
            ));
        }
        let public_path = self.storage.public_path.trim_end_matches('/');
        if !public_path.starts_with('/') {
            return Err(ConfigError::Message(
                "storage.public_path 必须以 / 开头且不能为根路径".to_string(),
            ));
        }
        Ok(())
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<&'static AppConfig, ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(Self::global())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 图片存储根目录
    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }

    /// 上传暂存目录
    pub fn temp_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.temp_dir)
    }

    /// 对外访问路径前缀（去掉末尾 `/`）
    pub fn public_path(&self) -> &str {
        self.storage.public_path.trim_end_matches('/')
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 4000,
            },
            storage: StorageConfig {
                root: "./assets/images".to_string(),
                temp_dir: "./assets/tmp".to_string(),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                public_path: StorageConfig::default_public_path(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "full".to_string(),
            },
            image: ImageConfig::default(),
            cors: CorsConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = AppConfig::load_from(&dir.path().join("missing.toml"), None).expect("load");
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.storage.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.image.max_width, 1920);
        assert_eq!(cfg.image.max_height, 1080);
        assert_eq!(cfg.image.jpeg_quality, 85);
        assert_eq!(cfg.public_path(), "/images");
    }

    #[test]
    fn config_file_and_port_override_are_layered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).expect("create");
        writeln!(
            f,
            "[server]\nport = 5000\n\n[storage]\nroot = \"/srv/img\"\n\n[image]\njpeg_quality = 70"
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path, None).expect("load");
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.storage.root, "/srv/img");
        assert_eq!(cfg.image.jpeg_quality, 70);
        // 未覆盖的字段保持默认
        assert_eq!(cfg.storage.temp_dir, "./assets/tmp");

        let cfg = AppConfig::load_from(&path, Some("8081".to_string())).expect("load");
        assert_eq!(cfg.server.port, 8081);
    }

    #[test]
    fn root_public_path_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\npublic_path = \"/\"\n").expect("write");
        assert!(AppConfig::load_from(&path, None).is_err());
    }

    #[test]
    fn invalid_quality_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[image]\njpeg_quality = 0\n").expect("write");
        assert!(AppConfig::load_from(&path, None).is_err());
    }
}
