//! 이벤트 파싱 모듈 -- 트레이서 라인과 런타임 감사 레코드
//!
//! 두 관찰 소스의 원시 입력을 공통 [`Event`]로 변환합니다.
//!
//! # 지원 형식
//! - strace 텍스트 출력 ([`StraceParser`])
//! - 런타임 감사 이벤트와 JSON 감사 레코드 ([`parse_runtime_event`], [`AuditRecord`])
//!
//! # 사용 예시
//! ```ignore
//! use tracewarden_monitor::parser::TraceDecoder;
//!
//! let mut decoder = TraceDecoder::new();
//! for line in log.lines() {
//!     if let Some(event) = decoder.decode(line) {
//!         // 분류
//!     }
//! }
//! println!("{:?}", decoder.stats());
//! ```

pub mod runtime;
pub mod strace;

pub use runtime::{AuditRecord, parse_runtime_event};
pub use strace::{StraceParser, TraceLine, parse_trace_line, split_args};

use serde::{Deserialize, Serialize};

use tracewarden_core::event::Event;
use tracewarden_core::metrics as m;

/// 세션 단위 파싱 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// 읽은 라인 수
    pub lines: u64,
    /// 이벤트로 변환된 라인 수
    pub parsed: u64,
    /// 이벤트가 아닌 정상 라인 수
    pub ignored: u64,
    /// 해석할 수 없어 건너뛴 라인 수
    pub failures: u64,
}

impl ParseStats {
    /// 다른 통계를 더합니다.
    pub fn merge(&mut self, other: &ParseStats) {
        self.lines += other.lines;
        self.parsed += other.parsed;
        self.ignored += other.ignored;
        self.failures += other.failures;
    }
}

/// 통계를 기록하는 트레이스 라인 디코더
///
/// 라인 단위 파싱 실패는 카운트만 올리고 세션을 중단시키지 않습니다.
#[derive(Debug, Default)]
pub struct TraceDecoder {
    parser: StraceParser,
    stats: ParseStats,
}

impl TraceDecoder {
    /// 새 디코더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 라인 하나를 디코딩합니다.
    pub fn decode(&mut self, raw: &str) -> Option<Event> {
        self.stats.lines += 1;
        metrics::counter!(m::MONITOR_TRACE_LINES_TOTAL).increment(1);

        match self.parser.parse(raw) {
            Ok(TraceLine::Syscall(event)) => {
                self.stats.parsed += 1;
                Some(event)
            }
            Ok(TraceLine::Ignored) => {
                self.stats.ignored += 1;
                None
            }
            Err(e) => {
                self.stats.failures += 1;
                metrics::counter!(m::MONITOR_PARSE_FAILURES_TOTAL).increment(1);
                tracing::debug!(error = %e, "skipping unparseable trace line");
                None
            }
        }
    }

    /// 지금까지의 통계
    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}
