#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`parser`]: strace 라인과 런타임 감사 레코드를 [`Event`](tracewarden_core::Event)로 변환
//! - [`rule`]: 순서 고정 규칙 테이블, YAML 사용자 규칙, 첫 매칭 우선 분류
//! - [`collector`]: 기록 중인 트레이스 로그 따라가기
//! - [`supervisor`]: 트레이서 자식 프로세스의 실행, 대기, 종료, 회수
//! - [`hook`]: 프로세스 전역 런타임 훅과 감사 피드
//! - [`engine`]: 세션 오케스트레이션과 종료 정책
//! - [`report`]: 심각도별로 묶이는 불변 보고서
//! - [`config`]: 세션 설정 (core 설정 해석)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! TracerSupervisor -> trace log -> TraceDecoder --+
//!                                                 +--> bounded queue -> RuleSet -> Report
//! AuditFeed -> RuntimeHookAdapter (notify) -------+            |
//!                                                   High 이상 + 종료 정책 -> killpg
//! ```

pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod parser;
pub mod report;
pub mod rule;
pub mod supervisor;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{MonitorEngine, MonitorEngineBuilder, merge_by_time, run};

// 설정
pub use config::{SessionConfig, SessionConfigBuilder, TracerSettings};

// 에러
pub use error::MonitorError;

// 파서
pub use parser::{
    AuditRecord, ParseStats, StraceParser, TraceDecoder, parse_runtime_event, parse_trace_line,
};

// 규칙
pub use rule::{Rule, RuleLoader, RuleSet};

// 감독자
pub use supervisor::{ExitReason, SupervisorState, TracerSupervisor};

// 런타임 훅
pub use hook::{AUDIT_FEED_ENV, AuditFeed, RuntimeHookAdapter};

// 보고서
pub use report::{Report, StopCause};
