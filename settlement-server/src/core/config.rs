use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

use crate::utils::time::parse_cutoff;

/// 服务配置 - 结算引擎的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖（启动时会先加载 `.env`）：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/marketplace/settlement | 工作目录 |
/// | DATABASE_FILE | settlement.redb | 数据库文件 (相对 WORK_DIR) |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 (RUST_LOG 优先) |
/// | LOG_JSON | false | JSON 格式日志 |
/// | LOG_DIR | (无) | 日志目录，存在时按天滚动写文件 |
/// | TIMEZONE | UTC | 业务时区 (IANA 名称) |
/// | COMMISSION_RATE | 0.10 | 平台佣金率 |
/// | LOYALTY_POINTS_RATE | 0.01 | 积分比例 (订单金额 × 比例) |
/// | RETURN_WINDOW_DAYS | 7 | 签收后可申请退货的天数 |
/// | DAILY_RELEASE_TIME | 00:05 | 每日结算时间 (HH:MM, 业务时区) |
/// | SWEEP_LEASE_TTL_SECS | 600 | 结算租约有效期 |
/// | FAULT_SUSPENSION_THRESHOLD | 3 | 客户违约次数达到后暂停 |
/// | INSTANCE_ID | hostname 或随机 | 当前实例标识 (租约持有者) |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/settlement COMMISSION_RATE=0.12 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// 数据库文件名
    pub database_file: String,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    /// 引擎业务参数
    pub engine: EngineSettings,
    pub fault_suspension_threshold: u32,
}

/// Business parameters consumed by the engine components
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Default commission rate (wallet override wins)
    pub commission_rate: Decimal,
    pub loyalty_points_rate: Decimal,
    pub return_window_days: i64,
    pub timezone: Tz,
    /// Daily sweep trigger time in `timezone`
    pub daily_release_time: NaiveTime,
    pub sweep_lease_ttl_secs: u64,
    /// Lease holder identity
    pub instance_id: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(10, 2),
            loyalty_points_rate: Decimal::new(1, 2),
            return_window_days: 7,
            timezone: chrono_tz::UTC,
            daily_release_time: NaiveTime::from_hms_opt(0, 5, 0).unwrap_or(NaiveTime::MIN),
            sweep_lease_ttl_secs: 600,
            instance_id: "local".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid config value, using default");
            None
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let defaults = EngineSettings::default();

        let timezone = std::env::var("TIMEZONE")
            .ok()
            .and_then(|name| match name.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    tracing::warn!(timezone = %name, "Unknown TIMEZONE, falling back to UTC");
                    None
                }
            })
            .unwrap_or(defaults.timezone);

        let daily_release_time = std::env::var("DAILY_RELEASE_TIME")
            .ok()
            .and_then(|raw| {
                let parsed = parse_cutoff(&raw);
                if parsed.is_none() {
                    tracing::warn!(value = %raw, "Invalid DAILY_RELEASE_TIME, expected HH:MM");
                }
                parsed
            })
            .unwrap_or(defaults.daily_release_time);

        let instance_id = std::env::var("INSTANCE_ID")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("instance-{}", uuid::Uuid::new_v4().simple()));

        Self {
            work_dir: std::env::var("WORK_DIR")
                .unwrap_or_else(|_| "/var/lib/marketplace/settlement".into()),
            database_file: std::env::var("DATABASE_FILE").unwrap_or_else(|_| "settlement.redb".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON").unwrap_or(false),
            log_dir: std::env::var("LOG_DIR").ok(),
            engine: EngineSettings {
                commission_rate: env_parse("COMMISSION_RATE")
                    .filter(|r: &Decimal| !r.is_sign_negative() && *r <= Decimal::ONE)
                    .unwrap_or(defaults.commission_rate),
                loyalty_points_rate: env_parse("LOYALTY_POINTS_RATE")
                    .filter(|r: &Decimal| !r.is_sign_negative())
                    .unwrap_or(defaults.loyalty_points_rate),
                return_window_days: env_parse("RETURN_WINDOW_DAYS")
                    .filter(|d: &i64| *d >= 0)
                    .unwrap_or(defaults.return_window_days),
                timezone,
                daily_release_time,
                sweep_lease_ttl_secs: env_parse("SWEEP_LEASE_TTL_SECS")
                    .unwrap_or(defaults.sweep_lease_ttl_secs),
                instance_id,
            },
            fault_suspension_threshold: env_parse("FAULT_SUSPENSION_THRESHOLD").unwrap_or(3),
        }
    }

    /// 使用自定义工作目录覆盖配置
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// 数据库完整路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join(&self.database_file)
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
