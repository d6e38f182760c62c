//! 세션 보고서
//!
//! [`Report`]는 한 번의 모니터링 실행 결과를 담는 불변 값입니다.
//! Finding은 도착 순서 그대로 보관되고, 출력 시 심각도별로 묶입니다.
//!
//! ```text
//! === Critical ===
//! Process execution: execve("/bin/ls", ["ls"], 0x7ffd...) [tracer]
//! === High ===
//! none
//! === Medium ===
//! none
//! === Low ===
//! none
//! ```

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tracewarden_core::event::{Event, Finding};
use tracewarden_core::types::{MonitorMode, Severity};

use crate::parser::ParseStats;
use crate::supervisor::ExitReason;

/// 항상 출력되는 심각도 그룹 (Info는 내용이 있을 때만)
const ALWAYS_SHOWN: [Severity; 4] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
];

/// 세션이 끝난 이유
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StopCause {
    /// 대상이 스스로 종료함
    TargetExited,
    /// High 이상 Finding으로 종료 정책이 발동함
    HighRisk {
        /// 정책을 발동시킨 규칙 레이블
        label: String,
    },
    /// 외부 취소 요청
    Cancelled,
    /// 하위 프로그램 실행 수 초과
    SubprocessBudget,
    /// 기존 로그를 끝까지 분석함 (트레이서 없이)
    EndOfLog,
}

impl StopCause {
    /// 종료 정책에 의해 멈췄는지 확인합니다.
    pub fn is_policy_stop(&self) -> bool {
        matches!(self, Self::HighRisk { .. } | Self::SubprocessBudget)
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetExited => write!(f, "target exited"),
            Self::HighRisk { label } => write!(f, "high-risk behavior: {label}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::SubprocessBudget => write!(f, "subprocess budget exceeded"),
            Self::EndOfLog => write!(f, "end of log"),
        }
    }
}

/// 모니터링 세션 보고서
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// 세션 ID
    pub session_id: Uuid,
    /// 대상 스크립트
    pub script: PathBuf,
    /// 트레이스 로그 경로
    pub log_path: PathBuf,
    /// 모니터링 모드
    pub mode: MonitorMode,
    /// 시작 시각
    pub started_at: DateTime<Utc>,
    /// 종료 시각
    pub finished_at: DateTime<Utc>,
    /// 트레이서 종료 사유 (오프라인 분석이면 없음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitReason>,
    /// 세션 종료 원인
    pub stop_cause: StopCause,
    /// 도착 순서대로의 Finding
    pub findings: Vec<Finding>,
    /// 어떤 규칙에도 매칭되지 않은 이벤트 (보관 설정 시)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<Event>,
    /// 파싱 통계 (트레이서 로그와 감사 피드 합산)
    pub parse_stats: ParseStats,
    /// 치명적이지 않은 경고
    pub notes: Vec<String>,
}

impl Report {
    /// 심각도별 그룹을 출력 순서대로 돌려줍니다.
    ///
    /// Critical, High, Medium, Low는 비어 있어도 포함되고 Info는 내용이 있을 때만 포함됩니다.
    /// 그룹 안의 순서는 도착 순서입니다.
    pub fn groups(&self) -> Vec<(Severity, Vec<&Finding>)> {
        let mut groups: Vec<(Severity, Vec<&Finding>)> = ALWAYS_SHOWN
            .iter()
            .map(|severity| (*severity, self.with_severity(*severity).collect()))
            .collect();

        let info: Vec<&Finding> = self.with_severity(Severity::Info).collect();
        if !info.is_empty() {
            groups.push((Severity::Info, info));
        }
        groups
    }

    /// 특정 심각도의 Finding
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }

    /// 특정 심각도의 Finding 수
    pub fn count(&self, severity: Severity) -> usize {
        self.with_severity(severity).count()
    }

    /// 가장 높은 심각도
    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// High 이상 Finding이 있는지 확인합니다.
    pub fn has_high_risk(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_high_risk())
    }

    /// 세션 소요 시간
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// 그룹 본문만 출력합니다 (머리말과 노트 제외).
    pub fn render_groups(&self) -> String {
        let mut out = String::new();
        for (severity, findings) in self.groups() {
            out.push_str(&format!("=== {severity} ===\n"));
            if findings.is_empty() {
                out.push_str("none\n");
            }
            for finding in findings {
                out.push_str(&finding.message());
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {}", self.session_id)?;
        writeln!(f, "Script:   {}", self.script.display())?;
        writeln!(f, "Log:      {}", self.log_path.display())?;
        writeln!(f, "Mode:     {}", self.mode)?;
        match &self.exit {
            Some(exit) => writeln!(f, "Tracer:   {exit}")?,
            None => writeln!(f, "Tracer:   (offline analysis)")?,
        }
        writeln!(f, "Stopped:  {}", self.stop_cause)?;
        writeln!(f)?;
        f.write_str(&self.render_groups())?;

        if !self.notes.is_empty() {
            writeln!(f)?;
            writeln!(f, "Notes:")?;
            for note in &self.notes {
                writeln!(f, "  - {note}")?;
            }
        }
        Ok(())
    }
}
