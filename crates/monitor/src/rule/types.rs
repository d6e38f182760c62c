//! 분류 규칙 데이터 타입
//!
//! 내장 규칙 테이블과 YAML 규칙 파일이 같은 구조체를 사용합니다.

use serde::{Deserialize, Serialize};

use tracewarden_core::types::{EventSource, Severity};

use crate::error::MonitorError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;

/// 분류 규칙 -- 하나의 YAML 규칙 파일에 대응합니다.
///
/// `name`과 모든 `args` 조건이 만족되어야 매칭됩니다 (AND 결합).
///
/// # YAML 스키마
/// ```yaml
/// id: curl_download
/// label: Download tool execution
/// severity: High
/// source: tracer
/// name:
///   exact: [execve]
/// args:
///   - index: 0
///     modifier: ends_with
///     values: ["/curl", "/wget"]
/// tags:
///   - network
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 규칙 고유 ID
    pub id: String,
    /// 보고서에 표시되는 분류명
    pub label: String,
    /// 규칙 설명
    #[serde(default)]
    pub description: String,
    /// 심각도
    pub severity: Severity,
    /// 규칙 상태
    #[serde(default)]
    pub status: RuleStatus,
    /// 적용할 이벤트 출처 (없으면 모든 출처)
    #[serde(default)]
    pub source: Option<EventSource>,
    /// 이벤트 이름 조건
    #[serde(default)]
    pub name: NamePattern,
    /// 인자 조건 목록 (AND 결합)
    #[serde(default)]
    pub args: Vec<ArgCondition>,
    /// 분류 태그
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Rule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.id.is_empty() {
            return Err(MonitorError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(MonitorError::RuleValidation {
                rule_id: self.id.clone(),
                reason: format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            });
        }

        if self.label.is_empty() {
            return Err(MonitorError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule label must not be empty".to_owned(),
            });
        }

        for (idx, condition) in self.args.iter().enumerate() {
            if condition.values.is_empty() {
                return Err(MonitorError::RuleValidation {
                    rule_id: self.id.clone(),
                    reason: format!("args[{idx}] must list at least one value"),
                });
            }
        }

        Ok(())
    }

    /// 규칙이 활성 상태인지 확인합니다.
    pub fn is_enabled(&self) -> bool {
        self.status == RuleStatus::Enabled
    }
}

/// 규칙 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화
    Disabled,
}

/// 이벤트 이름 조건
///
/// 비어 있지 않은 항목 중 하나라도 맞으면 매칭됩니다 (OR 결합).
/// 모든 항목이 비어 있으면 모든 이름에 매칭됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamePattern {
    /// 정확히 일치하는 이름
    #[serde(default)]
    pub exact: Vec<String>,
    /// 이름 접두사
    #[serde(default)]
    pub prefix: Vec<String>,
    /// 모듈 이름 (`module` 자체이거나 `module.`으로 시작)
    #[serde(default)]
    pub module: Vec<String>,
    /// 정규식
    #[serde(default)]
    pub regex: Option<String>,
}

impl NamePattern {
    /// 정확히 일치하는 이름 목록으로 조건을 만듭니다.
    pub fn exact<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            exact: names.iter().map(|n| n.as_ref().to_owned()).collect(),
            ..Self::default()
        }
    }

    /// 모듈 이름 목록으로 조건을 만듭니다.
    pub fn module<S: AsRef<str>>(modules: &[S]) -> Self {
        Self {
            module: modules.iter().map(|m| m.as_ref().to_owned()).collect(),
            ..Self::default()
        }
    }

    /// 아무 조건도 없는지 확인합니다.
    pub fn is_wildcard(&self) -> bool {
        self.exact.is_empty()
            && self.prefix.is_empty()
            && self.module.is_empty()
            && self.regex.is_none()
    }
}

/// 인자 매칭 조건
///
/// `index`가 주어지면 해당 위치의 인자만, 없으면 모든 인자를 검사합니다.
/// `values` 중 하나라도 맞으면 조건이 만족됩니다 (`flags_all` 제외).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgCondition {
    /// 검사할 인자 위치 (0부터)
    #[serde(default)]
    pub index: Option<usize>,
    /// 매칭 수정자
    #[serde(default)]
    pub modifier: ArgModifier,
    /// 매칭할 값 목록
    pub values: Vec<String>,
}

impl ArgCondition {
    /// 모든 인자를 대상으로 하는 조건을 만듭니다.
    pub fn any_arg<S: AsRef<str>>(modifier: ArgModifier, values: &[S]) -> Self {
        Self {
            index: None,
            modifier,
            values: values.iter().map(|v| v.as_ref().to_owned()).collect(),
        }
    }

    /// 특정 위치의 인자를 대상으로 하는 조건을 만듭니다.
    pub fn at<S: AsRef<str>>(index: usize, modifier: ArgModifier, values: &[S]) -> Self {
        Self {
            index: Some(index),
            ..Self::any_arg(modifier, values)
        }
    }
}

/// 인자 매칭 수정자
///
/// 모든 비교는 따옴표를 벗긴 인자 값에 대해 대소문자를 구분하여 수행합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgModifier {
    /// 부분 문자열 포함 (기본값)
    #[default]
    Contains,
    /// 정확히 일치
    Exact,
    /// 접두사 일치
    StartsWith,
    /// 접미사 일치
    EndsWith,
    /// 정규식 매칭
    Regex,
    /// `|`로 구분된 플래그에 모든 값이 포함
    FlagsAll,
    /// `|`로 구분된 플래그에 값 중 하나가 포함
    FlagsAny,
    /// 모듈 이름 일치 (`value` 또는 `value.`으로 시작)
    Module,
}
