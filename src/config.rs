use crate::error::ConfigError;
use std::str::FromStr;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 浏览器启动后打开的页面
    pub start_url: String,
    /// 目标 TOML 文件存放目录
    pub targets_folder: String,
    /// 申请人资料文件
    pub profile_path: String,
    /// 附件（简历）目录
    pub attachments_dir: String,
    /// 状态文件
    pub state_file: String,
    /// 记录表文件（每个目标一行）
    pub tracker_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,

    // --- 决策 ---
    /// 高置信度阈值（含）
    pub high_threshold: f64,
    /// 低置信度阈值（不含）
    pub low_threshold: f64,

    // --- 表单流程 ---
    /// 单个目标最多处理的步骤数
    pub max_steps: usize,
    /// 同一字段签名连续出现多少次视为停滞
    pub stagnation_repeats: usize,
    /// 累计未解决字段的上限，超过即视为停滞
    pub unresolved_cap: usize,
    /// 枚举答案不在选项内时的置信度系数
    pub enum_mismatch_penalty: f64,
    /// 页面暂时性故障的重试次数
    pub ui_retries: usize,
    /// 页面操作超时（秒）
    pub ui_timeout_secs: u64,

    // --- 状态存储 ---
    /// 记录保留天数
    pub state_max_age_days: i64,

    // --- 节奏 ---
    /// 两个目标之间的随机间隔（毫秒）
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,

    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 单次 LLM 调用超时（秒）
    pub oracle_timeout_secs: u64,
    pub oracle_max_retries: usize,
    /// 重试间隔（毫秒）
    pub oracle_retry_delay_ms: u64,

    // --- 通知 ---
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            start_url: "about:blank".to_string(),
            targets_folder: "data/targets".to_string(),
            profile_path: "config/profile.toml".to_string(),
            attachments_dir: "config/attachments".to_string(),
            state_file: "data/logs/application_state.json".to_string(),
            tracker_file: "data/logs/tracker.tsv".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            high_threshold: 0.85,
            low_threshold: 0.65,
            max_steps: 10,
            stagnation_repeats: 3,
            unresolved_cap: 3,
            enum_mismatch_penalty: 0.8,
            ui_retries: 2,
            ui_timeout_secs: 20,
            state_max_age_days: 30,
            pacing_min_ms: 3_000,
            pacing_max_ms: 8_000,
            llm_api_key: String::new(),
            llm_api_base_url: "https://openrouter.ai/api/v1".to_string(),
            llm_model_name: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
            oracle_timeout_secs: 30,
            oracle_max_retries: 3,
            oracle_retry_delay_ms: 2_000,
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，缺失的项使用默认值
    ///
    /// 无法解析的值返回错误，而不是静默回退
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        let config = Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port)?,
            start_url: env_string("START_URL", default.start_url),
            targets_folder: env_string("TARGETS_FOLDER", default.targets_folder),
            profile_path: env_string("PROFILE_PATH", default.profile_path),
            attachments_dir: env_string("ATTACHMENTS_DIR", default.attachments_dir),
            state_file: env_string("STATE_FILE", default.state_file),
            tracker_file: env_string("TRACKER_FILE", default.tracker_file),
            output_log_file: env_string("OUTPUT_LOG_FILE", default.output_log_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging)?,
            high_threshold: env_parse("HIGH_THRESHOLD", default.high_threshold)?,
            low_threshold: env_parse("LOW_THRESHOLD", default.low_threshold)?,
            max_steps: env_parse("MAX_STEPS", default.max_steps)?,
            stagnation_repeats: env_parse("STAGNATION_REPEATS", default.stagnation_repeats)?,
            unresolved_cap: env_parse("UNRESOLVED_CAP", default.unresolved_cap)?,
            enum_mismatch_penalty: env_parse(
                "ENUM_MISMATCH_PENALTY",
                default.enum_mismatch_penalty,
            )?,
            ui_retries: env_parse("UI_RETRIES", default.ui_retries)?,
            ui_timeout_secs: env_parse("UI_TIMEOUT_SECS", default.ui_timeout_secs)?,
            state_max_age_days: env_parse("STATE_MAX_AGE_DAYS", default.state_max_age_days)?,
            pacing_min_ms: env_parse("PACING_MIN_MS", default.pacing_min_ms)?,
            pacing_max_ms: env_parse("PACING_MAX_MS", default.pacing_max_ms)?,
            llm_api_key: env_string("LLM_API_KEY", default.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME", default.llm_model_name),
            oracle_timeout_secs: env_parse("ORACLE_TIMEOUT_SECS", default.oracle_timeout_secs)?,
            oracle_max_retries: env_parse("ORACLE_MAX_RETRIES", default.oracle_max_retries)?,
            oracle_retry_delay_ms: env_parse(
                "ORACLE_RETRY_DELAY_MS",
                default.oracle_retry_delay_ms,
            )?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty()),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.high_threshold)
            || !in_unit(self.low_threshold)
            || self.low_threshold >= self.high_threshold
        {
            return Err(ConfigError::InvalidThresholds {
                high: self.high_threshold,
                low: self.low_threshold,
            });
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps", "至少为 1"));
        }
        if self.stagnation_repeats < 2 {
            return Err(invalid("stagnation_repeats", "至少为 2"));
        }
        if !(0.0..=1.0).contains(&self.enum_mismatch_penalty) {
            return Err(invalid("enum_mismatch_penalty", "必须在 [0, 1] 内"));
        }
        if self.pacing_min_ms > self.pacing_max_ms {
            return Err(invalid("pacing_min_ms", "不能大于 pacing_max_ms"));
        }
        if self.oracle_max_retries == 0 {
            return Err(invalid("oracle_max_retries", "至少为 1"));
        }
        Ok(())
    }

    /// 是否配置了 Telegram 通知
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Some((token.as_str(), chat_id.as_str())),
            _ => None,
        }
    }
}

fn env_string(var_name: &str, default: String) -> String {
    std::env::var(var_name).unwrap_or(default)
}

fn env_parse<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(default),
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
