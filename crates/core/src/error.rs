//! 에러 타입 -- 도메인별 에러 정의

/// Tracewarden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TracewardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 모니터링 세션 에러
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 모니터링 세션 에러 (상위 레이어용 요약)
///
/// 세부 원인은 `tracewarden-monitor`의 도메인 에러가 담고,
/// 여기서는 치명적 실패의 종류만 구분합니다.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 트레이서를 실행할 수 없음
    #[error("tracer unavailable: {0}")]
    TracerUnavailable(String),

    /// 런타임 훅 등록 실패
    #[error("hook registration failed: {0}")]
    HookRegistration(String),

    /// 프로세스 그룹 종료 실패
    #[error("termination failed: {0}")]
    Termination(String),

    /// 규칙 로딩/검증 실패
    #[error("rule error: {0}")]
    Rule(String),

    /// 기타 세션 실패
    #[error("session failed: {0}")]
    Session(String),
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 인식할 수 없는 라인 형식
    #[error("unrecognized line: {0}")]
    Unrecognized(String),

    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: TracewardenError = ConfigError::FileNotFound {
            path: "/etc/tracewarden.toml".to_owned(),
        }
        .into();
        assert!(matches!(err, TracewardenError::Config(_)));
        assert!(err.to_string().contains("/etc/tracewarden.toml"));
    }

    #[test]
    fn monitor_error_display() {
        let err: TracewardenError =
            MonitorError::TracerUnavailable("strace: not found".to_owned()).into();
        assert_eq!(
            err.to_string(),
            "monitor error: tracer unavailable: strace: not found"
        );
    }

    #[test]
    fn parse_error_display() {
        let err = ParseError::Failed {
            offset: 7,
            reason: "unbalanced parenthesis".to_owned(),
        };
        assert!(err.to_string().contains("offset 7"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TracewardenError = io.into();
        assert!(matches!(err, TracewardenError::Io(_)));
    }
}
