//! 모니터링 세션 설정
//!
//! [`SessionConfig`]는 core의 [`TracewardenConfig`]와 실행 인자(대상 스크립트,
//! 로그 경로)를 합쳐 한 번의 실행에 필요한 값을 모두 해석해 둔 구조체입니다.
//! 엔진은 이 값만 보고 동작하며 설정 파일이나 환경변수를 직접 읽지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! use tracewarden_core::config::TracewardenConfig;
//! use tracewarden_monitor::config::SessionConfig;
//!
//! let core_config = TracewardenConfig::default();
//! let config = SessionConfig::from_core(&core_config, "job.py", "trace.log");
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use tracewarden_core::config::{TracerConfig, TracewardenConfig};
use tracewarden_core::types::MonitorMode;

use crate::error::MonitorError;

/// 로그 경로 자리 표시자
pub const PLACEHOLDER_LOG: &str = "{log}";
/// 인터프리터 자리 표시자
pub const PLACEHOLDER_INTERPRETER: &str = "{interpreter}";
/// 대상 스크립트 자리 표시자
pub const PLACEHOLDER_SCRIPT: &str = "{script}";

const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// 트레이서 실행 방법
///
/// `args`는 자리 표시자를 포함한 인자 템플릿이며, 실행 직전에
/// [`TracerSettings::command_args`]로 실제 값이 채워집니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TracerSettings {
    /// 트레이서 실행 파일
    pub program: String,
    /// 대상 스크립트를 실행할 인터프리터
    pub interpreter: String,
    /// 인자 템플릿
    pub args: Vec<String>,
}

impl TracerSettings {
    /// core 트레이서 설정으로 strace 인자 템플릿을 만듭니다.
    ///
    /// 기본값 기준 결과:
    /// `-f -ttt -e trace=file,process,network -s 1024 -o {log} {interpreter} {script}`
    pub fn from_core(core: &TracerConfig) -> Self {
        let mut args = Vec::new();
        if core.follow_forks {
            args.push("-f".to_owned());
        }
        if core.timestamps {
            args.push("-ttt".to_owned());
        }
        if !core.categories.is_empty() {
            args.push("-e".to_owned());
            args.push(format!("trace={}", core.categories.join(",")));
        }
        args.push("-s".to_owned());
        args.push(core.string_limit.to_string());
        args.extend(core.extra_args.iter().cloned());
        args.push("-o".to_owned());
        args.push(PLACEHOLDER_LOG.to_owned());
        args.push(PLACEHOLDER_INTERPRETER.to_owned());
        args.push(PLACEHOLDER_SCRIPT.to_owned());

        Self {
            program: core.program.clone(),
            interpreter: core.interpreter.clone(),
            args,
        }
    }

    /// 임의의 실행 파일과 인자 템플릿으로 설정을 만듭니다.
    pub fn custom(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            interpreter: String::new(),
            args,
        }
    }

    /// 자리 표시자를 채운 실제 인자 목록을 만듭니다.
    ///
    /// 인자 전체가 자리 표시자와 정확히 같을 때만 치환하므로 채워 넣은 값은
    /// 다시 해석되지 않습니다. 인터프리터가 비어 있으면 그 자리는 빠지고,
    /// 스크립트 인자는 템플릿 뒤에 붙습니다.
    pub fn command_args(&self, log_path: &Path, script: &Path, script_args: &[String]) -> Vec<String> {
        let mut command = Vec::with_capacity(self.args.len() + script_args.len());
        for arg in &self.args {
            match arg.as_str() {
                PLACEHOLDER_LOG => command.push(log_path.display().to_string()),
                PLACEHOLDER_SCRIPT => command.push(script.display().to_string()),
                PLACEHOLDER_INTERPRETER if self.interpreter.is_empty() => {}
                PLACEHOLDER_INTERPRETER => command.push(self.interpreter.clone()),
                _ => command.push(arg.clone()),
            }
        }
        command.extend(script_args.iter().cloned());
        command
    }
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self::from_core(&TracerConfig::default())
    }
}

/// 한 번의 모니터링 실행을 위한 설정
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    /// 대상 스크립트 경로
    pub script: PathBuf,
    /// 대상 스크립트에 넘길 인자
    pub script_args: Vec<String>,
    /// 트레이서 출력 로그 경로
    pub log_path: PathBuf,
    /// 모니터링 모드
    pub mode: MonitorMode,
    /// High 이상 Finding 발생 시 프로세스 그룹 종료
    pub terminate_on_high_risk: bool,
    /// 런타임 감사 훅 사용
    pub audit_enabled: bool,
    /// 훅 등록 실패 시 트레이서 단독으로 계속
    pub tolerate_hook_failure: bool,
    /// 감사 레코드 피드 파일
    pub audit_feed_path: Option<PathBuf>,
    /// 트레이서 실행 방법
    pub tracer: TracerSettings,
    /// 이벤트 큐 용량
    pub queue_capacity: usize,
    /// SIGTERM 이후 SIGKILL까지의 유예 시간
    pub grace_timeout: Duration,
    /// 종료 후 남은 출력을 읽는 최대 시간
    pub drain_timeout: Duration,
    /// 로그 파일 폴링 주기
    pub poll_interval: Duration,
    /// 허용되는 최대 하위 프로그램 실행 수 (0이면 제한 없음)
    pub max_subprocess_count: u32,
    /// 매칭되지 않은 이벤트 보관
    pub retain_unmatched: bool,
}

impl SessionConfig {
    /// 기본값으로 세션 설정을 만듭니다.
    pub fn new(script: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self::from_core(&TracewardenConfig::default(), script, log_path)
    }

    /// core 설정에서 세션 설정을 만듭니다.
    pub fn from_core(
        core: &TracewardenConfig,
        script: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        let monitor = &core.monitor;
        Self {
            script: script.into(),
            script_args: Vec::new(),
            log_path: log_path.into(),
            mode: monitor.mode(),
            terminate_on_high_risk: monitor.terminate_on_high_risk,
            audit_enabled: monitor.audit_enabled,
            tolerate_hook_failure: monitor.tolerate_hook_failure,
            audit_feed_path: (!monitor.audit_feed_path.is_empty())
                .then(|| PathBuf::from(&monitor.audit_feed_path)),
            tracer: TracerSettings::from_core(&core.tracer),
            queue_capacity: monitor.queue_capacity,
            grace_timeout: Duration::from_millis(monitor.grace_timeout_ms),
            drain_timeout: Duration::from_millis(monitor.drain_timeout_ms),
            poll_interval: Duration::from_millis(monitor.poll_interval_ms),
            max_subprocess_count: monitor.max_subprocess_count,
            retain_unmatched: monitor.retain_unmatched,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 대상 스크립트는 오프라인 분석에서 비어 있을 수 있으므로 실행 시점에 확인합니다.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.log_path.as_os_str().is_empty() {
            return Err(config_error("log_path", "log path must not be empty"));
        }
        if self.tracer.program.is_empty() {
            return Err(config_error("tracer.program", "must not be empty"));
        }
        if !self.tracer.args.iter().any(|a| a == PLACEHOLDER_LOG) {
            return Err(config_error(
                "tracer.args",
                "argument template must direct output to {log}",
            ));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(config_error(
                "queue_capacity",
                &format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.grace_timeout.is_zero() {
            return Err(config_error("grace_timeout", "must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(config_error("poll_interval", "must be greater than 0"));
        }
        if self.audit_feed_path.is_some() && !self.audit_enabled {
            return Err(config_error(
                "audit_feed_path",
                "requires the runtime hook to be enabled",
            ));
        }
        Ok(())
    }
}

fn config_error(field: &str, reason: &str) -> MonitorError {
    MonitorError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 세션 설정 빌더
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 기본값에서 시작하는 빌더를 생성합니다.
    pub fn new(script: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            config: SessionConfig::new(script, log_path),
        }
    }

    /// 기존 설정에서 시작하는 빌더를 생성합니다.
    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// 스크립트 인자를 설정합니다.
    pub fn script_args(mut self, args: Vec<String>) -> Self {
        self.config.script_args = args;
        self
    }

    /// 모니터링 모드를 설정합니다.
    pub fn mode(mut self, mode: MonitorMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// High 이상 Finding 발생 시 종료 여부를 설정합니다.
    pub fn terminate_on_high_risk(mut self, enabled: bool) -> Self {
        self.config.terminate_on_high_risk = enabled;
        self
    }

    /// 런타임 감사 훅 사용 여부를 설정합니다.
    pub fn audit_enabled(mut self, enabled: bool) -> Self {
        self.config.audit_enabled = enabled;
        self
    }

    /// 훅 등록 실패 허용 여부를 설정합니다.
    pub fn tolerate_hook_failure(mut self, tolerate: bool) -> Self {
        self.config.tolerate_hook_failure = tolerate;
        self
    }

    /// 감사 피드 파일을 설정합니다.
    pub fn audit_feed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.audit_feed_path = Some(path.into());
        self
    }

    /// 트레이서 실행 방법을 설정합니다.
    pub fn tracer(mut self, tracer: TracerSettings) -> Self {
        self.config.tracer = tracer;
        self
    }

    /// 인터프리터를 설정합니다.
    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.config.tracer.interpreter = interpreter.into();
        self
    }

    /// 이벤트 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 종료 유예 시간을 설정합니다.
    pub fn grace_timeout(mut self, timeout: Duration) -> Self {
        self.config.grace_timeout = timeout;
        self
    }

    /// 잔여 출력 드레인 시간을 설정합니다.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// 폴링 주기를 설정합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// 하위 프로그램 실행 허용 수를 설정합니다.
    pub fn max_subprocess_count(mut self, max: u32) -> Self {
        self.config.max_subprocess_count = max;
        self
    }

    /// 매칭되지 않은 이벤트 보관 여부를 설정합니다.
    pub fn retain_unmatched(mut self, retain: bool) -> Self {
        self.config.retain_unmatched = retain;
        self
    }

    /// 설정을 검증하고 `SessionConfig`를 생성합니다.
    pub fn build(self) -> Result<SessionConfig, MonitorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
