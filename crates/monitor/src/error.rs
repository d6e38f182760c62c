//! 모니터 에러 타입
//!
//! [`MonitorError`]는 모니터링 세션 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<MonitorError> for TracewardenError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! # 전파 정책
//! - 치명적: 트레이서 실행 실패, 훅 등록 실패(허용 설정이 없을 때), 설정/규칙 에러
//! - 비치명적: 라인 파싱 실패(카운트만 증가), 종료 실패(보고서 경고로 기록)

use tracewarden_core::error::{self as core_error, ConfigError, TracewardenError};

/// 모니터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 트레이서 실행 파일이 없거나 실행할 수 없음
    #[error("tracer unavailable: {program}: {reason}")]
    TracerUnavailable {
        /// 트레이서 실행 파일
        program: String,
        /// 실패 사유
        reason: String,
    },

    /// 런타임 훅 등록 실패
    #[error("hook registration failed: {0}")]
    HookRegistration(String),

    /// 프로세스 그룹을 유예 시간 안에 종료하지 못함
    #[error("termination failed for process group {pid}: {reason}")]
    TerminationFailure {
        /// 프로세스 그룹 리더 PID
        pid: u32,
        /// 실패 사유
        reason: String,
    },

    /// 트레이스 라인 또는 감사 레코드 파싱 실패
    #[error("parse failure: {reason}")]
    Parse {
        /// 실패 사유
        reason: String,
    },

    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl MonitorError {
    /// 세션을 즉시 중단시키는 에러인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Parse { .. } | Self::TerminationFailure { .. }
        )
    }
}

impl From<MonitorError> for TracewardenError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Config { field, reason } => {
                TracewardenError::Config(ConfigError::InvalidValue { field, reason })
            }
            MonitorError::Io(e) => TracewardenError::Io(e),
            MonitorError::TracerUnavailable { .. } => TracewardenError::Monitor(
                core_error::MonitorError::TracerUnavailable(err.to_string()),
            ),
            MonitorError::HookRegistration(reason) => {
                TracewardenError::Monitor(core_error::MonitorError::HookRegistration(reason))
            }
            MonitorError::TerminationFailure { .. } => TracewardenError::Monitor(
                core_error::MonitorError::Termination(err.to_string()),
            ),
            MonitorError::Parse { reason } => {
                TracewardenError::Parse(core_error::ParseError::Unrecognized(reason))
            }
            MonitorError::RuleLoad { .. }
            | MonitorError::RuleValidation { .. }
            | MonitorError::Regex(_) => {
                TracewardenError::Monitor(core_error::MonitorError::Rule(err.to_string()))
            }
            MonitorError::Channel(_) => {
                TracewardenError::Monitor(core_error::MonitorError::Session(err.to_string()))
            }
        }
    }
}
