//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! 레코더가 설치되지 않은 경우 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tracewarden_`
//! - 모듈명: `monitor_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(tracewarden_core::metrics::MONITOR_PARSE_FAILURES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 이벤트 출처 레이블 키 (tracer, runtime_hook)
pub const LABEL_SOURCE: &str = "source";

/// 결과 레이블 키 (graceful, forced, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Monitor 메트릭 ────────────────────────────────────────────────

/// Monitor: 읽어들인 트레이스 라인 수 (counter)
pub const MONITOR_TRACE_LINES_TOTAL: &str = "tracewarden_monitor_trace_lines_total";

/// Monitor: 파싱 실패 라인 수 (counter)
pub const MONITOR_PARSE_FAILURES_TOTAL: &str = "tracewarden_monitor_parse_failures_total";

/// Monitor: 분류된 이벤트 수 (counter, label: source)
pub const MONITOR_EVENTS_TOTAL: &str = "tracewarden_monitor_events_total";

/// Monitor: 생성된 Finding 수 (counter, label: severity)
pub const MONITOR_FINDINGS_TOTAL: &str = "tracewarden_monitor_findings_total";

/// Monitor: 런타임 훅으로 전달된 이벤트 수 (counter)
pub const MONITOR_HOOK_EVENTS_TOTAL: &str = "tracewarden_monitor_hook_events_total";

/// Monitor: 프로세스 그룹 종료 시도 수 (counter, label: result)
pub const MONITOR_TERMINATIONS_TOTAL: &str = "tracewarden_monitor_terminations_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        MONITOR_TRACE_LINES_TOTAL,
        "Total number of raw trace lines read from the tracer output"
    );
    describe_counter!(
        MONITOR_PARSE_FAILURES_TOTAL,
        "Total number of trace lines or audit records that could not be parsed"
    );
    describe_counter!(
        MONITOR_EVENTS_TOTAL,
        "Total number of structured events classified, by source"
    );
    describe_counter!(
        MONITOR_FINDINGS_TOTAL,
        "Total number of findings produced, by severity"
    );
    describe_counter!(
        MONITOR_HOOK_EVENTS_TOTAL,
        "Total number of runtime hook notifications delivered to the engine"
    );
    describe_counter!(
        MONITOR_TERMINATIONS_TOTAL,
        "Total number of process group terminations, by result"
    );
}
