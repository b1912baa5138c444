use std::path::PathBuf;
use std::time::Duration;

/// 服务器配置 - 集成中枢的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/hub | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | {WORK_DIR}/logs | 日志目录 (存在时写入滚动文件) |
/// | DB_FILE | {WORK_DIR}/hub.redb | redb 数据库文件 |
/// | REFERENCE_DATA_PATH | - | 静态参考数据 JSON (缺省使用内置表) |
/// | NOTIFICATION_QUEUE_URL | - | 通知队列地址 (缺省只记录日志) |
/// | STOPLIST_QUEUE | stoplist-alerts | 停售报告默认队列 |
/// | LOG_LINK_TEMPLATE | - | 日志链接模板, `{order_id}` 占位 |
/// | HTTP_TIMEOUT_MS | 15000 | 外部 HTTP 调用超时(毫秒) |
/// | STOPLIST_SCHEDULE_INTERVAL_SECS | 60 | 定时停售扫描间隔 |
/// | PREORDER_SWEEP_INTERVAL_SECS | 60 | 延迟提交扫描间隔 |
/// | STATUS_REFRESH_INTERVAL_SECS | 120 | POS 状态刷新间隔 |
/// | {AGGREGATOR}_BASE_URL / {AGGREGATOR}_TOKEN | - | 聚合平台地址和令牌 (如 WOLT_BASE_URL) |
/// | {POS}_BASE_URL / {POS}_TOKEN | - | POS 地址和令牌 (如 IIKO_BASE_URL) |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/hub HTTP_PORT=8080 cargo run -p hub-server
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: String,
    pub db_file: String,
    pub reference_data_path: Option<String>,
    pub notification_queue_url: Option<String>,
    /// 停售失败报告的默认队列 (门店可覆盖)
    pub stoplist_queue: String,
    pub log_link_template: Option<String>,
    pub http_timeout_ms: u64,
    pub stoplist_schedule_interval_secs: u64,
    pub preorder_sweep_interval_secs: u64,
    pub status_refresh_interval_secs: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let work_dir = std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/hub".into());
        Self {
            http_port: env_parse("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").unwrap_or_else(|_| format!("{work_dir}/logs")),
            db_file: std::env::var("DB_FILE").unwrap_or_else(|_| format!("{work_dir}/hub.redb")),
            reference_data_path: env_opt("REFERENCE_DATA_PATH"),
            notification_queue_url: env_opt("NOTIFICATION_QUEUE_URL"),
            stoplist_queue: std::env::var("STOPLIST_QUEUE")
                .unwrap_or_else(|_| "stoplist-alerts".into()),
            log_link_template: env_opt("LOG_LINK_TEMPLATE"),
            http_timeout_ms: env_parse("HTTP_TIMEOUT_MS", 15_000),
            stoplist_schedule_interval_secs: env_parse("STOPLIST_SCHEDULE_INTERVAL_SECS", 60),
            preorder_sweep_interval_secs: env_parse("PREORDER_SWEEP_INTERVAL_SECS", 60),
            status_refresh_interval_secs: env_parse("STATUS_REFRESH_INTERVAL_SECS", 120),
            work_dir,
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        let work_dir = work_dir.into();
        config.log_dir = format!("{work_dir}/logs");
        config.db_file = format!("{work_dir}/hub.redb");
        config.work_dir = work_dir;
        config.http_port = http_port;
        config
    }

    /// 外部服务的连接信息 (`{NAME}_BASE_URL`, `{NAME}_TOKEN`)
    pub fn endpoint(&self, name: &str) -> Endpoint {
        let prefix = name.to_ascii_uppercase();
        Endpoint {
            base_url: std::env::var(format!("{prefix}_BASE_URL"))
                .unwrap_or_else(|_| format!("https://{}.invalid", name.to_ascii_lowercase())),
            token: env_opt(&format!("{prefix}_TOKEN")),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// 外部 HTTP 服务端点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub token: Option<String>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_overrides_rebases_paths() {
        let config = Config::with_overrides("/tmp/hub-test", 4000);
        assert_eq!(config.http_port, 4000);
        assert_eq!(config.work_dir, "/tmp/hub-test");
        assert_eq!(config.db_file, "/tmp/hub-test/hub.redb");
        assert_eq!(config.log_dir, "/tmp/hub-test/logs");
    }

    #[test]
    fn test_endpoint_defaults_to_invalid_host() {
        let config = Config::with_overrides("/tmp/hub-test", 4000);
        let endpoint = config.endpoint("unconfigured_vendor_xyz");
        assert_eq!(endpoint.base_url, "https://unconfigured_vendor_xyz.invalid");
        assert!(endpoint.token.is_none());
    }
}
