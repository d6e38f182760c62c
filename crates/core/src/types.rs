//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 심각도, 이벤트 출처, 모니터링 모드처럼 모든 크레이트가 공유하는
//! 작은 열거형들을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// 관찰된 동작의 위험도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    #[serde(alias = "info")]
    Info,
    /// 낮은 심각도
    #[serde(alias = "low")]
    Low,
    /// 중간 심각도
    #[serde(alias = "medium")]
    Medium,
    /// 높은 심각도
    #[serde(alias = "high")]
    High,
    /// 치명적 -- 즉시 대응 필요
    #[serde(alias = "critical")]
    Critical,
}

impl Severity {
    /// 보고서 그룹 순서 (높은 심각도부터)
    pub const REPORT_ORDER: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 종료 정책을 발동시키는 심각도인지 확인합니다 (`High` 이상).
    pub fn is_high_risk(&self) -> bool {
        *self >= Severity::High
    }

    /// 메트릭 레이블에 쓰는 소문자 이름
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 이벤트 출처
///
/// 시스템 콜 트레이서에서 온 이벤트인지, 런타임 감사 훅에서 온 이벤트인지 구분합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// 외부 시스템 콜 트레이서 (strace)
    Tracer,
    /// 인터프리터 내부 감사 훅
    RuntimeHook,
}

impl EventSource {
    /// 메트릭 레이블에 쓰는 이름
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Tracer => "tracer",
            Self::RuntimeHook => "runtime_hook",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// 모니터링 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// 대상이 종료될 때까지 기다린 뒤 전체 로그를 한 번에 분석
    #[default]
    Once,
    /// 트레이스 출력을 실시간으로 따라가며 분석
    Realtime,
}

impl MonitorMode {
    /// 문자열에서 모드를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "once" | "one-time" | "onetime" => Some(Self::Once),
            "realtime" | "real-time" | "live" => Some(Self::Realtime),
            _ => None,
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => write!(f, "once"),
            Self::Realtime => write!(f, "realtime"),
        }
    }
}
