//! 설정 관리 -- tracewarden.toml 파싱 및 런타임 설정
//!
//! [`TracewardenConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TRACEWARDEN_MONITOR_MODE=realtime` 형식)
//! 3. 설정 파일 (`tracewarden.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tracewarden_core::error::TracewardenError> {
//! use tracewarden_core::config::TracewardenConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TracewardenConfig::load("tracewarden.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TracewardenConfig::parse("[monitor]\nmode = \"realtime\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TracewardenError};
use crate::types::MonitorMode;

/// 트레이서가 지원하는 시스템 콜 카테고리
const KNOWN_TRACE_CATEGORIES: &[&str] = &[
    "file", "process", "network", "desc", "memory", "signal", "ipc", "creds",
];

/// Tracewarden 통합 설정
///
/// `tracewarden.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracewardenConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 트레이서 실행 설정
    #[serde(default)]
    pub tracer: TracerConfig,
    /// 모니터링 세션 설정
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// 분류 규칙 데이터
    #[serde(default)]
    pub rules: RulesConfig,
}

impl TracewardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TracewardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 기본값에 환경변수 오버라이드만 적용한 설정을 만듭니다.
    ///
    /// 설정 파일 없이 실행할 때 사용합니다.
    pub fn from_env() -> Result<Self, TracewardenError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TracewardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TracewardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TracewardenError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TracewardenError> {
        toml::from_str(toml_str).map_err(|e| {
            TracewardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TRACEWARDEN_{SECTION}_{FIELD}`
    /// 예: `TRACEWARDEN_TRACER_INTERPRETER=python3.12`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TRACEWARDEN_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "TRACEWARDEN_GENERAL_LOG_FORMAT",
        );

        // Tracer
        override_string(&mut self.tracer.program, "TRACEWARDEN_TRACER_PROGRAM");
        override_string(
            &mut self.tracer.interpreter,
            "TRACEWARDEN_TRACER_INTERPRETER",
        );
        override_csv(&mut self.tracer.categories, "TRACEWARDEN_TRACER_CATEGORIES");
        override_usize(
            &mut self.tracer.string_limit,
            "TRACEWARDEN_TRACER_STRING_LIMIT",
        );
        override_bool(
            &mut self.tracer.follow_forks,
            "TRACEWARDEN_TRACER_FOLLOW_FORKS",
        );
        override_bool(&mut self.tracer.timestamps, "TRACEWARDEN_TRACER_TIMESTAMPS");

        // Monitor
        override_string(&mut self.monitor.mode, "TRACEWARDEN_MONITOR_MODE");
        override_bool(
            &mut self.monitor.terminate_on_high_risk,
            "TRACEWARDEN_MONITOR_TERMINATE_ON_HIGH_RISK",
        );
        override_bool(
            &mut self.monitor.audit_enabled,
            "TRACEWARDEN_MONITOR_AUDIT_ENABLED",
        );
        override_bool(
            &mut self.monitor.tolerate_hook_failure,
            "TRACEWARDEN_MONITOR_TOLERATE_HOOK_FAILURE",
        );
        override_string(
            &mut self.monitor.audit_feed_path,
            "TRACEWARDEN_MONITOR_AUDIT_FEED_PATH",
        );
        override_usize(
            &mut self.monitor.queue_capacity,
            "TRACEWARDEN_MONITOR_QUEUE_CAPACITY",
        );
        override_u64(
            &mut self.monitor.grace_timeout_ms,
            "TRACEWARDEN_MONITOR_GRACE_TIMEOUT_MS",
        );
        override_u64(
            &mut self.monitor.drain_timeout_ms,
            "TRACEWARDEN_MONITOR_DRAIN_TIMEOUT_MS",
        );
        override_u64(
            &mut self.monitor.poll_interval_ms,
            "TRACEWARDEN_MONITOR_POLL_INTERVAL_MS",
        );
        override_u32(
            &mut self.monitor.max_subprocess_count,
            "TRACEWARDEN_MONITOR_MAX_SUBPROCESS_COUNT",
        );
        override_bool(
            &mut self.monitor.retain_unmatched,
            "TRACEWARDEN_MONITOR_RETAIN_UNMATCHED",
        );

        // Rules
        override_string(&mut self.rules.rule_dir, "TRACEWARDEN_RULES_RULE_DIR");
        override_csv(
            &mut self.rules.sensitive_paths,
            "TRACEWARDEN_RULES_SENSITIVE_PATHS",
        );
        override_csv(
            &mut self.rules.sensitive_open_paths,
            "TRACEWARDEN_RULES_SENSITIVE_OPEN_PATHS",
        );
        override_csv(&mut self.rules.temp_dirs, "TRACEWARDEN_RULES_TEMP_DIRS");
        override_csv(
            &mut self.rules.network_syscalls,
            "TRACEWARDEN_RULES_NETWORK_SYSCALLS",
        );
        override_csv(
            &mut self.rules.dangerous_modules,
            "TRACEWARDEN_RULES_DANGEROUS_MODULES",
        );
        override_csv(
            &mut self.rules.high_risk_modules,
            "TRACEWARDEN_RULES_HIGH_RISK_MODULES",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TracewardenError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.tracer.program.trim().is_empty() {
            return Err(invalid("tracer.program", "must not be empty"));
        }
        if self.tracer.interpreter.trim().is_empty() {
            return Err(invalid("tracer.interpreter", "must not be empty"));
        }
        if self.tracer.categories.is_empty() {
            return Err(invalid(
                "tracer.categories",
                "at least one syscall category is required",
            ));
        }
        for category in &self.tracer.categories {
            if !KNOWN_TRACE_CATEGORIES.contains(&category.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "tracer.categories".to_owned(),
                    reason: format!(
                        "unknown category '{category}', expected one of: {}",
                        KNOWN_TRACE_CATEGORIES.join(", ")
                    ),
                }
                .into());
            }
        }
        if self.tracer.string_limit == 0 {
            return Err(invalid("tracer.string_limit", "must be greater than 0"));
        }

        if MonitorMode::from_str_loose(&self.monitor.mode).is_none() {
            return Err(invalid("monitor.mode", "must be one of: once, realtime"));
        }
        if self.monitor.queue_capacity == 0 {
            return Err(invalid("monitor.queue_capacity", "must be greater than 0"));
        }
        if self.monitor.grace_timeout_ms == 0 {
            return Err(invalid("monitor.grace_timeout_ms", "must be greater than 0"));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(invalid("monitor.poll_interval_ms", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> TracewardenError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 트레이서 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// 트레이서 실행 파일
    pub program: String,
    /// 대상 스크립트를 실행할 인터프리터
    pub interpreter: String,
    /// 추적할 시스템 콜 카테고리 (`-e trace=...`)
    pub categories: Vec<String>,
    /// 문자열 인자 캡처 길이 (`-s`)
    pub string_limit: usize,
    /// 자식 프로세스 추적 여부 (`-f`)
    pub follow_forks: bool,
    /// 라인별 epoch 타임스탬프 기록 여부 (`-ttt`)
    pub timestamps: bool,
    /// 추가 트레이서 인자
    pub extra_args: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            program: "strace".to_owned(),
            interpreter: "python3".to_owned(),
            categories: vec![
                "file".to_owned(),
                "process".to_owned(),
                "network".to_owned(),
            ],
            string_limit: 1024,
            follow_forks: true,
            timestamps: true,
            extra_args: Vec::new(),
        }
    }
}

/// 모니터링 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 모니터링 모드 (once, realtime)
    pub mode: String,
    /// High 이상 Finding 발생 시 프로세스 그룹 종료 여부
    pub terminate_on_high_risk: bool,
    /// 런타임 감사 훅 활성화 여부
    pub audit_enabled: bool,
    /// 훅 등록 실패 시 트레이서 단독 모니터링으로 계속할지 여부
    pub tolerate_hook_failure: bool,
    /// 감사 레코드 피드 파일 경로 (비어 있으면 사용하지 않음)
    pub audit_feed_path: String,
    /// 이벤트 큐 용량
    pub queue_capacity: usize,
    /// SIGTERM 이후 SIGKILL까지의 유예 시간 (밀리초)
    pub grace_timeout_ms: u64,
    /// 종료 후 남은 트레이스 출력을 읽는 최대 시간 (밀리초)
    pub drain_timeout_ms: u64,
    /// 실시간 모드 로그 파일 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 허용되는 최대 하위 프로그램 실행 수 (0이면 제한 없음)
    pub max_subprocess_count: u32,
    /// 규칙에 매칭되지 않은 이벤트도 보고서에 보관할지 여부
    pub retain_unmatched: bool,
}

impl MonitorConfig {
    /// 검증된 모드 값을 반환합니다. 알 수 없는 값이면 기본값(once)입니다.
    pub fn mode(&self) -> MonitorMode {
        MonitorMode::from_str_loose(&self.mode).unwrap_or_default()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: "once".to_owned(),
            terminate_on_high_risk: false,
            audit_enabled: false,
            tolerate_hook_failure: true,
            audit_feed_path: String::new(),
            queue_capacity: 1024,
            grace_timeout_ms: 2000,
            drain_timeout_ms: 1000,
            poll_interval_ms: 50,
            max_subprocess_count: 50,
            retain_unmatched: false,
        }
    }
}

/// 분류 규칙 데이터
///
/// 민감 경로 문자열 등은 로직이 아니라 데이터이므로 설정으로 분리합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 추가 YAML 규칙 디렉토리 (비어 있으면 내장 규칙만 사용)
    pub rule_dir: String,
    /// 민감 경로 부분 문자열 (대소문자 구분)
    pub sensitive_paths: Vec<String>,
    /// 열기에서만 민감한 경로 부분 문자열
    ///
    /// 동적 로더처럼 매 실행마다 존재만 확인하는 경로는 여기에 둡니다.
    /// 존재 확인(access, stat)은 분류하지 않고 실제 열기만 분류합니다.
    pub sensitive_open_paths: Vec<String>,
    /// 임시 디렉토리 접두사
    pub temp_dirs: Vec<String>,
    /// 네트워크 시스템 콜 이름
    pub network_syscalls: Vec<String>,
    /// 가져오기/사용 시 Critical로 분류되는 모듈
    pub dangerous_modules: Vec<String>,
    /// 가져오기/사용 시 High로 분류되는 모듈
    pub high_risk_modules: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rule_dir: String::new(),
            sensitive_paths: to_owned_vec(&[
                "/etc/passwd",
                "/etc/shadow",
                "/etc/gshadow",
                "/etc/sudoers",
                "/etc/group",
                "/etc/hosts",
                "/etc/cron",
                "/etc/sysctl.conf",
                "/etc/security/access.conf",
                "/etc/apparmor",
                "/var/spool/cron",
                "/.ssh/",
                "/.aws/credentials",
                "/.gnupg/",
                "/proc/kcore",
                "/dev/mem",
                "/proc/self/mem",
                "/var/run/docker.sock",
                "/run/docker.sock",
            ]),
            sensitive_open_paths: to_owned_vec(&["/etc/ld.so.preload"]),
            temp_dirs: to_owned_vec(&["/tmp/", "/var/tmp/", "/dev/shm/"]),
            network_syscalls: to_owned_vec(&[
                "socket", "connect", "bind", "listen", "accept", "accept4", "sendto", "sendmsg",
                "sendmmsg", "recvfrom", "recvmsg",
            ]),
            dangerous_modules: to_owned_vec(&[
                "os",
                "subprocess",
                "socket",
                "pickle",
                "marshal",
                "ctypes",
                "pty",
            ]),
            high_risk_modules: to_owned_vec(&["webbrowser", "requests"]),
        }
    }
}

fn to_owned_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = TracewardenConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.tracer.program, "strace");
        assert_eq!(config.tracer.string_limit, 1024);
        assert_eq!(config.monitor.mode(), MonitorMode::Once);
        assert!(!config.monitor.terminate_on_high_risk);
        assert!(config.rules.sensitive_paths.iter().any(|p| p == "/etc/shadow"));
        assert!(!config.rules.sensitive_paths.iter().any(|p| p == "/etc/ld.so.preload"));
        assert_eq!(config.rules.sensitive_open_paths, ["/etc/ld.so.preload"]);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = TracewardenConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = TracewardenConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.monitor.queue_capacity, 1024);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[monitor]
mode = "realtime"
terminate_on_high_risk = true

[rules]
temp_dirs = ["/scratch/"]
"#;
        let config = TracewardenConfig::parse(toml).unwrap();
        assert_eq!(config.monitor.mode(), MonitorMode::Realtime);
        assert!(config.monitor.terminate_on_high_risk);
        // grace_timeout_ms는 기본값 유지
        assert_eq!(config.monitor.grace_timeout_ms, 2000);
        assert_eq!(config.rules.temp_dirs, vec!["/scratch/"]);
        // 지정하지 않은 목록은 기본값 유지
        assert!(!config.rules.network_syscalls.is_empty());
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = TracewardenConfig::parse("[monitor\nmode = ");
        assert!(matches!(
            result,
            Err(TracewardenError::Config(ConfigError::ParseFailed { .. }))
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = TracewardenConfig::default();
        config.general.log_level = "loud".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_level"));
    }

    #[test]
    fn validate_rejects_invalid_mode() {
        let mut config = TracewardenConfig::default();
        config.monitor.mode = "sometimes".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.mode"));
    }

    #[test]
    fn validate_rejects_zero_queue_capacity() {
        let mut config = TracewardenConfig::default();
        config.monitor.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_trace_category() {
        let mut config = TracewardenConfig::default();
        config.tracer.categories.push("everything".to_owned());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("everything"));
    }

    #[test]
    fn validate_rejects_empty_interpreter() {
        let mut config = TracewardenConfig::default();
        config.tracer.interpreter = "  ".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TRACEWARDEN_STR", "overridden") };
        override_string(&mut val, "TEST_TRACEWARDEN_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_TRACEWARDEN_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TRACEWARDEN_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_TRACEWARDEN_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_TRACEWARDEN_BOOL_BAD") };
    }

    #[test]
    fn env_override_csv_skips_empty_items() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TRACEWARDEN_CSV", "/tmp/, ,/dev/shm/") };
        override_csv(&mut val, "TEST_TRACEWARDEN_CSV");
        assert_eq!(val, vec!["/tmp/", "/dev/shm/"]);
        unsafe { std::env::remove_var("TEST_TRACEWARDEN_CSV") };
    }

    #[test]
    fn env_override_u64_invalid_keeps_original() {
        let mut val = 2000;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TRACEWARDEN_U64_BAD", "-5") };
        override_u64(&mut val, "TEST_TRACEWARDEN_U64_BAD");
        assert_eq!(val, 2000);
        unsafe { std::env::remove_var("TEST_TRACEWARDEN_U64_BAD") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = TracewardenConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = TracewardenConfig::parse(&toml_str).unwrap();
        assert_eq!(config.tracer.categories, parsed.tracer.categories);
        assert_eq!(config.rules.sensitive_paths, parsed.rules.sensitive_paths);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = TracewardenConfig::from_file("/nonexistent/path/tracewarden.toml").await;
        assert!(matches!(
            result,
            Err(TracewardenError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
