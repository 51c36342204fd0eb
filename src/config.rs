use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// TCP keep-alive 空闲时间（秒）
    #[serde(default = "ServerConfig::default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        8080
    }
    fn default_keep_alive() -> u64 {
        5
    }

    /// 获取 keep-alive 空闲时间
    pub fn keep_alive_duration(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            keep_alive_secs: Self::default_keep_alive(),
        }
    }
}

/// 请求计时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// 请求超时阈值（秒）。超过该阈值的请求以 408 响应。
    #[serde(default = "TimingConfig::default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl TimingConfig {
    fn default_request_timeout() -> u64 {
        30
    }

    /// 获取请求超时阈值
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: Self::default_request_timeout(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）。超过期限后强制关闭剩余连接。
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        5
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 文档存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 存储集群地址
    #[serde(default = "StoreConfig::default_host")]
    pub host: String,
    /// 用户名
    #[serde(default = "StoreConfig::default_user")]
    pub user: String,
    /// 密码
    #[serde(default = "StoreConfig::default_password")]
    pub password: String,
    /// bucket 名称
    #[serde(default = "StoreConfig::default_bucket")]
    pub bucket: String,
}

impl StoreConfig {
    fn default_host() -> String {
        "couchbase://localhost".to_string()
    }
    fn default_user() -> String {
        "Administrator".to_string()
    }
    fn default_password() -> String {
        "password".to_string()
    }
    fn default_bucket() -> String {
        "travel-sample".to_string()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            user: Self::default_user(),
            password: Self::default_password(),
            bucket: Self::default_bucket(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 请求计时配置
    #[serde(default)]
    pub timing: TimingConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// 文档存储配置
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// 配置文件 `config.toml` 可缺省，此时全部取默认值；
    /// 环境变量前缀为 `APP`，层级分隔符为双下划线，
    /// 例如 `APP_SERVER__PORT`、`APP_SHUTDOWN__TIMEOUT_SECS`。
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            // 加载配置文件（可缺省）
            .add_source(File::with_name("config").required(false))
            // 支持环境变量覆盖，例如：APP_SERVER__PORT
            // 层级分隔符必须与字段内的下划线区分开，
            // 否则 keep_alive_secs 这类多词字段无法被覆盖
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.keep_alive_secs, 5);
        assert_eq!(config.timing.request_timeout_secs, 30);
        assert_eq!(config.shutdown.timeout_secs, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn server_addr_joins_host_and_port() {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9000,
                keep_alive_secs: 5,
            },
            ..AppConfig::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn env_overrides_apply_to_every_documented_key() {
        // 环境变量是进程级状态，集中在一个用例内设置并清理，
        // 避免与其他用例交错
        let vars = [
            ("APP_SERVER__PORT", "9999"),
            ("APP_SERVER__KEEP_ALIVE_SECS", "7"),
            ("APP_TIMING__REQUEST_TIMEOUT_SECS", "42"),
            ("APP_SHUTDOWN__TIMEOUT_SECS", "99"),
            ("APP_LOGGING__LEVEL", "debug"),
            ("APP_STORE__HOST", "couchbase://db.internal"),
        ];
        for (key, value) in vars {
            unsafe { std::env::set_var(key, value) };
        }

        let loaded = AppConfig::load();

        for (key, _) in vars {
            unsafe { std::env::remove_var(key) };
        }

        let config = loaded.expect("load with env overrides");
        assert_eq!(config.server.port, 9999, "server.port env override");
        assert_eq!(
            config.server.keep_alive_secs, 7,
            "server.keep_alive_secs env override"
        );
        assert_eq!(
            config.timing.request_timeout_secs, 42,
            "timing.request_timeout_secs env override"
        );
        assert_eq!(
            config.shutdown.timeout_secs, 99,
            "shutdown.timeout_secs env override"
        );
        assert_eq!(config.logging.level, "debug", "logging.level env override");
        assert_eq!(
            config.store.host, "couchbase://db.internal",
            "store.host env override"
        );
    }

    #[test]
    fn duration_helpers_convert_seconds() {
        let config = AppConfig::default();
        assert_eq!(
            config.timing.request_timeout_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(config.shutdown.timeout_duration(), Duration::from_secs(5));
        assert_eq!(config.server.keep_alive_duration(), Duration::from_secs(5));
    }
}
