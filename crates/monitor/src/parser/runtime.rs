//! 런타임 감사 이벤트 파서
//!
//! 인터프리터 감사 훅이 넘겨주는 이벤트는 이미 구조화되어 있으므로
//! [`parse_runtime_event`]는 값을 그대로 [`Event`]로 감쌉니다.
//!
//! 감사 피드 파일은 레코드 하나당 JSON 한 줄입니다.
//! ```json
//! {"event": "os.system", "args": ["id"], "kwargs": {}, "ts": 1700000000.5, "pid": 4821}
//! ```

use std::time::{Duration, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{Map, Value};

use tracewarden_core::event::Event;

use crate::error::MonitorError;

/// 감사 레코드 한 줄의 최대 길이 (바이트)
const MAX_RECORD_LEN: usize = 64 * 1024;

/// 런타임 이벤트를 [`Event`]로 변환합니다.
///
/// 출처는 항상 `RuntimeHook`이며 `raw_text`는 `name(arg, ...)`로 재구성됩니다.
pub fn parse_runtime_event(name: impl Into<String>, args: Vec<String>) -> Event {
    Event::runtime(name, args)
}

/// 감사 피드의 JSON 레코드
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditRecord {
    /// 런타임 내부 동작 이름
    pub event: String,
    /// 위치 인자 스냅샷
    #[serde(default)]
    pub args: Vec<Value>,
    /// 키워드 인자 스냅샷
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// epoch 초 단위 발생 시각
    #[serde(default)]
    pub ts: Option<f64>,
    /// 이벤트를 일으킨 프로세스
    #[serde(default)]
    pub pid: Option<u32>,
}

impl AuditRecord {
    /// JSON 한 줄을 파싱합니다.
    pub fn parse(line: &str) -> Result<Self, MonitorError> {
        if line.len() > MAX_RECORD_LEN {
            return Err(MonitorError::Parse {
                reason: format!(
                    "audit record too large: {} bytes (max: {MAX_RECORD_LEN})",
                    line.len()
                ),
            });
        }

        let record: Self = serde_json::from_str(line.trim()).map_err(|e| MonitorError::Parse {
            reason: format!("invalid audit record: {e}"),
        })?;

        if record.event.is_empty() {
            return Err(MonitorError::Parse {
                reason: "audit record has empty event name".to_owned(),
            });
        }
        Ok(record)
    }

    /// 위치 인자 뒤에 `key=value` 형태의 키워드 인자를 붙인 인자 목록
    pub fn flat_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(render_value)
            .chain(
                self.kwargs
                    .iter()
                    .map(|(key, value)| format!("{key}={}", render_value(value))),
            )
            .collect()
    }

    /// 레코드를 이벤트로 변환합니다.
    pub fn into_event(self) -> Event {
        let mut event = parse_runtime_event(self.event.clone(), self.flat_args());
        if let Some(ts) = self
            .ts
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .and_then(|d| UNIX_EPOCH.checked_add(d))
        {
            event = event.with_timestamp(ts);
        }
        if let Some(pid) = self.pid {
            event = event.with_pid(pid);
        }
        event
    }
}

/// JSON 값을 인자 문자열로 바꿉니다. 문자열은 따옴표 없이 그대로 씁니다.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_owned(),
        other => other.to_string(),
    }
}
