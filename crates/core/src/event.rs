//! 이벤트 모델 -- 두 관찰 소스를 하나로 묶는 기본 단위
//!
//! [`Event`]는 트레이서 라인 또는 런타임 감사 알림 하나를 구조화한 값이며,
//! 생성 이후에는 변경되지 않습니다. [`Finding`]은 규칙에 매칭된 이벤트에
//! 심각도와 레이블을 붙인 결과입니다.

use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::{EventSource, Severity};

/// 요약 출력 시 인자 하나의 최대 길이 (문자)
const SUMMARY_ARG_MAX_CHARS: usize = 96;
/// 요약 출력 시 포함하는 최대 인자 수
const SUMMARY_MAX_ARGS: usize = 4;

/// 관찰된 단일 동작
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// 이벤트 출처
    pub source: EventSource,
    /// 시스템 콜 이름 또는 런타임 내부 동작 식별자
    pub name: String,
    /// 원본 텍스트 그대로의 인자 토큰
    pub args: Vec<String>,
    /// 원본 라인 (런타임 이벤트는 재구성된 표현)
    pub raw_text: String,
    /// 관찰 시각
    pub timestamp: SystemTime,
    /// 관찰된 프로세스 ID (알 수 있는 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Event {
    /// 트레이서 라인에서 얻은 이벤트를 생성합니다.
    pub fn tracer(
        name: impl Into<String>,
        args: Vec<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            source: EventSource::Tracer,
            name: name.into(),
            args,
            raw_text: raw_text.into(),
            timestamp: SystemTime::now(),
            pid: None,
        }
    }

    /// 런타임 감사 알림에서 얻은 이벤트를 생성합니다.
    ///
    /// `raw_text`는 `name(arg, ...)` 형태로 재구성됩니다.
    pub fn runtime(name: impl Into<String>, args: Vec<String>) -> Self {
        let name = name.into();
        let raw_text = format!("{}({})", name, args.join(", "));
        Self {
            source: EventSource::RuntimeHook,
            name,
            args,
            raw_text,
            timestamp: SystemTime::now(),
            pid: None,
        }
    }

    /// 관찰 시각을 지정합니다.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 프로세스 ID를 지정합니다.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// 따옴표를 벗긴 인자 값을 순서대로 돌려줍니다.
    pub fn unquoted_args(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.args.iter().map(|arg| unquote_arg(arg))
    }

    /// 사람이 읽는 한 줄 요약 (`name(arg, ...)`)
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .args
            .iter()
            .take(SUMMARY_MAX_ARGS)
            .map(|arg| truncate_chars(arg, SUMMARY_ARG_MAX_CHARS))
            .collect();
        if self.args.len() > SUMMARY_MAX_ARGS {
            parts.push("...".to_owned());
        }
        format!("{}({})", self.name, parts.join(", "))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.summary())
    }
}

/// 규칙에 매칭되어 분류된 관찰 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// 근거 이벤트
    pub event: Event,
    /// 심각도
    pub severity: Severity,
    /// 규칙 레이블 (사람이 읽는 분류명)
    pub label: String,
    /// 매칭된 규칙 ID
    pub rule_id: String,
}

impl Finding {
    /// 새 Finding을 생성합니다.
    pub fn new(
        event: Event,
        severity: Severity,
        label: impl Into<String>,
        rule_id: impl Into<String>,
    ) -> Self {
        Self {
            event,
            severity,
            label: label.into(),
            rule_id: rule_id.into(),
        }
    }

    /// 보고서에 출력되는 한 줄 메시지
    pub fn message(&self) -> String {
        format!(
            "{}: {} [{}]",
            self.label,
            self.event.summary(),
            self.event.source
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message())
    }
}

/// 인자 토큰의 따옴표를 벗깁니다.
///
/// `"abc"` 와 잘린 문자열 `"abc"...` 는 `abc`가 되고, `\"`, `\\` 이스케이프는 풀립니다.
/// 따옴표로 시작하지 않는 토큰은 앞뒤 공백만 제거합니다.
pub fn unquote_arg(token: &str) -> Cow<'_, str> {
    let trimmed = token.trim();
    let Some(body) = trimmed.strip_prefix('"') else {
        return Cow::Borrowed(trimmed);
    };

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '"' => return Cow::Owned(out),
            other => out.push(other),
        }
    }
    // 닫는 따옴표가 없는 잘린 토큰
    Cow::Owned(out)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}
