//! strace 출력 라인 파서
//!
//! `strace -f -ttt -o <log>` 가 기록하는 라인을 [`Event`]로 변환합니다.
//!
//! # 라인 형식
//! ```text
//! [PID ]TIMESTAMP NAME(ARG, ARG, ...) = RET
//! 4821  1700000000.123456 openat(AT_FDCWD, "/etc/shadow", O_RDONLY) = -1 EACCES (Permission denied)
//! [pid  4822] 1700000000.200001 execve("/bin/sh", ["sh", "-c", "id"], 0x7ffd /* 20 vars */ <unfinished ...>
//! ```
//!
//! 정식 문법이 없는 텍스트 프로토콜이므로 최선 노력 방식으로 파싱합니다.
//! - `<... NAME resumed>`, `--- SIG... ---`, `+++ exited ... +++`, 빈 라인: 무시
//! - `NAME(ARGS <unfinished ...>`: 반환값 없이 이벤트로 변환
//! - 그 밖에 해석할 수 없는 라인: 파싱 실패
//!
//! 어떤 입력에도 패닉하지 않습니다.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracewarden_core::event::Event;
use tracewarden_core::pipeline::TraceParser;

use crate::error::MonitorError;

/// 기본 최대 라인 길이 (바이트)
const DEFAULT_MAX_LINE_LEN: usize = 256 * 1024;

/// 완료되지 않은 시스템 콜 표식
const UNFINISHED_MARKER: &str = "<unfinished ...>";

/// 라인 하나의 해석 결과
#[derive(Debug, Clone, PartialEq)]
pub enum TraceLine {
    /// 시스템 콜 이벤트
    Syscall(Event),
    /// 이벤트가 아닌 정상 라인 (재개, 시그널, 종료, 빈 줄)
    Ignored,
}

/// strace 라인 파서
///
/// core의 [`TraceParser`] trait을 구현합니다.
#[derive(Debug, Clone)]
pub struct StraceParser {
    /// 최대 허용 라인 길이 (바이트)
    max_line_len: usize,
}

impl StraceParser {
    /// 기본 설정으로 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// 최대 라인 길이를 설정합니다.
    pub fn with_max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len;
        self
    }

    /// 원시 라인 하나를 해석합니다.
    ///
    /// # Errors
    /// 시스템 콜 형태로 해석할 수 없는 라인은 [`MonitorError::Parse`]를 반환합니다.
    pub fn parse(&self, raw: &str) -> Result<TraceLine, MonitorError> {
        if raw.len() > self.max_line_len {
            return Err(parse_error(format!(
                "line too long: {} bytes (max: {})",
                raw.len(),
                self.max_line_len
            )));
        }

        let line = raw.trim();
        if line.is_empty() || line.starts_with("strace:") {
            return Ok(TraceLine::Ignored);
        }

        let (pid, rest) = take_pid(line)?;
        let (timestamp, rest) = take_timestamp(rest);

        if rest.starts_with("<...") || rest.starts_with("---") || rest.starts_with("+++") {
            return Ok(TraceLine::Ignored);
        }

        let name_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let name = &rest[..name_len];
        if name.is_empty() || name.as_bytes()[0].is_ascii_digit() {
            return Err(parse_error(format!("no syscall name in line: {}", preview(line))));
        }

        let Some(body) = rest[name_len..].strip_prefix('(') else {
            return Err(parse_error(format!("missing '(' after {name}")));
        };

        let split = split_args(body);
        match split.close {
            Some(close) => {
                let tail = body[close + 1..].trim_start();
                if !tail.starts_with('=') {
                    return Err(parse_error(format!("missing return value for {name}")));
                }
            }
            None => {
                if !line.ends_with(UNFINISHED_MARKER) {
                    return Err(parse_error(format!("truncated call to {name}")));
                }
            }
        }

        let args = match split.close {
            Some(_) => split.args,
            None => {
                let body = body.trim_end();
                let body = body.strip_suffix(UNFINISHED_MARKER).unwrap_or(body);
                split_args(body).args
            }
        };

        let mut event = Event::tracer(name, args, line);
        if let Some(ts) = timestamp {
            event = event.with_timestamp(ts);
        }
        if let Some(pid) = pid {
            event = event.with_pid(pid);
        }
        Ok(TraceLine::Syscall(event))
    }
}

impl Default for StraceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceParser for StraceParser {
    fn format_name(&self) -> &str {
        "strace"
    }

    fn parse_line(&self, raw: &str) -> Option<Event> {
        match self.parse(raw) {
            Ok(TraceLine::Syscall(event)) => Some(event),
            Ok(TraceLine::Ignored) | Err(_) => None,
        }
    }
}

/// 트레이스 라인 하나를 이벤트로 변환합니다.
///
/// 이벤트가 아닌 라인과 해석할 수 없는 라인은 모두 `None`입니다.
pub fn parse_trace_line(raw: &str) -> Option<Event> {
    StraceParser::new().parse_line(raw)
}

/// 인자 분할 결과
#[derive(Debug, Default, PartialEq)]
pub struct SplitArgs {
    /// 최상위 쉼표로 나눈 인자 토큰 (앞뒤 공백 제거)
    pub args: Vec<String>,
    /// 인자 목록을 닫는 `)`의 바이트 위치 (없으면 잘린 라인)
    pub close: Option<usize>,
}

/// 여는 괄호 뒤의 텍스트를 최상위 쉼표 기준으로 나눕니다.
///
/// 문자열 리터럴(이스케이프 포함), `[]`, `{}`, `()` 중첩, `/* */` 주석 안의
/// 쉼표는 구분자로 취급하지 않습니다. 닫는 괄호를 찾지 못하면 남은 텍스트를
/// 마지막 토큰으로 넣고 `close`는 `None`입니다.
pub fn split_args(body: &str) -> SplitArgs {
    let bytes = body.as_bytes();
    let mut out = SplitArgs::default();
    let mut start = 0;
    let mut depth = 0usize;
    let mut in_str = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_str {
            match b {
                b'\\' => i += 1,
                b'"' => in_str = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => in_str = true,
            b'/' if bytes.get(i + 1) == Some(&b'*') => match body[i + 2..].find("*/") {
                Some(offset) => {
                    i += offset + 4;
                    continue;
                }
                None => break,
            },
            b'(' | b'[' | b'{' => depth += 1,
            b')' if depth == 0 => {
                push_token(&mut out.args, &body[start..i]);
                out.close = Some(i);
                return out;
            }
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                push_token(&mut out.args, &body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    push_token(&mut out.args, &body[start..]);
    out
}

fn push_token(args: &mut Vec<String>, token: &str) {
    let token = token.trim();
    if !token.is_empty() {
        args.push(token.to_owned());
    }
}

/// 선택적인 PID 접두사(`1234 ` 또는 `[pid  1234] `)를 분리합니다.
fn take_pid(line: &str) -> Result<(Option<u32>, &str), MonitorError> {
    if let Some(rest) = line.strip_prefix("[pid") {
        let Some(end) = rest.find(']') else {
            return Err(parse_error("unterminated [pid ...] prefix".to_owned()));
        };
        let pid = rest[..end]
            .trim()
            .parse::<u32>()
            .map_err(|e| parse_error(format!("invalid pid prefix: {e}")))?;
        return Ok((Some(pid), rest[end + 1..].trim_start()));
    }

    if let Some((first, rest)) = line.split_once(char::is_whitespace) {
        if !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(pid) = first.parse::<u32>() {
                return Ok((Some(pid), rest.trim_start()));
            }
        }
    }
    Ok((None, line))
}

/// 선택적인 타임스탬프 접두사를 분리합니다.
///
/// `-ttt` 형식(`1700000000.123456`)은 시각으로 변환하고,
/// `-t`/`-tt` 형식(`12:34:56.789012`)은 날짜 정보가 없으므로 건너뛰기만 합니다.
fn take_timestamp(rest: &str) -> (Option<SystemTime>, &str) {
    let Some((first, tail)) = rest.split_once(char::is_whitespace) else {
        return (None, rest);
    };
    let looks_numeric = !first.is_empty()
        && first.bytes().next().is_some_and(|b| b.is_ascii_digit())
        && first.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b':');
    if !looks_numeric {
        return (None, rest);
    }

    let ts = if first.contains(':') {
        None
    } else {
        first
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .and_then(|d| UNIX_EPOCH.checked_add(d))
    };
    (ts, tail.trim_start())
}

fn parse_error(reason: String) -> MonitorError {
    MonitorError::Parse { reason }
}

/// 에러 메시지용 라인 앞부분
fn preview(line: &str) -> &str {
    match line.char_indices().nth(64) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syscall(raw: &str) -> Event {
        match StraceParser::new().parse(raw).unwrap() {
            TraceLine::Syscall(event) => event,
            TraceLine::Ignored => panic!("line was ignored: {raw}"),
        }
    }

    #[test]
    fn parses_plain_line() {
        let event = syscall(r#"openat(AT_FDCWD, "/etc/shadow", O_RDONLY|O_CLOEXEC) = 3"#);
        assert_eq!(event.name, "openat");
        assert_eq!(event.args, ["AT_FDCWD", "\"/etc/shadow\"", "O_RDONLY|O_CLOEXEC"]);
        assert_eq!(event.pid, None);
    }

    #[test]
    fn parses_pid_and_epoch_timestamp() {
        let event = syscall(r#"4821  1700000000.250000 connect(3, {sa_family=AF_INET, sin_port=htons(443), sin_addr=inet_addr("1.2.3.4")}, 16) = 0"#);
        assert_eq!(event.name, "connect");
        assert_eq!(event.pid, Some(4821));
        assert_eq!(event.args.len(), 3);
        assert!(event.args[1].starts_with("{sa_family=AF_INET"));
        let expected = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        assert_eq!(event.timestamp, expected);
    }

    #[test]
    fn parses_bracketed_pid_prefix() {
        let event = syscall(r#"[pid  4822] 1700000000.000001 unlink("/var/log/auth.log") = 0"#);
        assert_eq!(event.pid, Some(4822));
        assert_eq!(event.name, "unlink");
    }

    #[test]
    fn clock_timestamp_is_skipped() {
        let event = syscall(r#"12:00:01.123456 getpid() = 42"#);
        assert_eq!(event.name, "getpid");
        assert!(event.args.is_empty());
    }

    #[test]
    fn keeps_array_and_comment_tokens_intact() {
        let event = syscall(
            r#"execve("/bin/sh", ["sh", "-c", "echo a, b"], 0x7ffd8c3a /* 20 vars, more */) = 0"#,
        );
        assert_eq!(event.args.len(), 3);
        assert_eq!(event.args[1], r#"["sh", "-c", "echo a, b"]"#);
        assert_eq!(event.args[2], "0x7ffd8c3a /* 20 vars, more */");
    }

    #[test]
    fn escaped_quotes_do_not_split() {
        let event = syscall(r#"write(1, "a\", b", 6) = 6"#);
        assert_eq!(event.args, ["1", r#""a\", b""#, "6"]);
    }

    #[test]
    fn truncated_string_argument_is_tolerated() {
        let event = syscall(r#"write(1, "aaaaaaaa"..., 4096) = 4096"#);
        assert_eq!(event.args[1], r#""aaaaaaaa"..."#);
    }

    #[test]
    fn error_return_is_parsed() {
        let event = syscall(
            r#"openat(AT_FDCWD, "/etc/shadow", O_RDONLY) = -1 EACCES (Permission denied)"#,
        );
        assert_eq!(event.name, "openat");
    }

    #[test]
    fn unfinished_line_is_an_event() {
        let event = syscall(
            r#"[pid  10] execve("/usr/bin/id", ["id"], 0x7ffe /* 3 vars */ <unfinished ...>"#,
        );
        assert_eq!(event.name, "execve");
        assert_eq!(event.args, ["\"/usr/bin/id\"", "[\"id\"]", "0x7ffe /* 3 vars */"]);
    }

    #[test]
    fn non_event_lines_are_ignored() {
        let parser = StraceParser::new();
        for raw in [
            "",
            "   ",
            "10 <... execve resumed>) = 0",
            "--- SIGCHLD {si_signo=SIGCHLD, si_code=CLD_EXITED} ---",
            "4821  1700000000.5 +++ exited with 0 +++",
            "+++ killed by SIGKILL +++",
            "strace: Process 4822 attached",
        ] {
            assert_eq!(parser.parse(raw).unwrap(), TraceLine::Ignored, "{raw:?}");
        }
    }

    #[test]
    fn malformed_lines_fail() {
        let parser = StraceParser::new();
        for raw in [
            r#"openat(AT_FDCWD, "/etc"#,
            "openat(AT_FDCWD)",
            "not a syscall",
            "123abc(1) = 0",
            "(1, 2) = 0",
            "[pid 12 openat() = 0",
        ] {
            assert!(parser.parse(raw).is_err(), "{raw:?}");
            assert!(parse_trace_line(raw).is_none());
        }
    }

    #[test]
    fn oversized_line_fails() {
        let parser = StraceParser::new().with_max_line_len(16);
        assert!(parser.parse("openat(AT_FDCWD, \"/x\") = 3").is_err());
    }

    #[test]
    fn split_reports_missing_close() {
        let split = split_args("1, \"abc");
        assert_eq!(split.close, None);
        assert_eq!(split.args, ["1", "\"abc"]);
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let event = syscall("openat(AT_FDCWD, \"/tmp/\u{d55c}\u{ae00}\\\u{d55c}\", O_RDONLY) = 3");
        assert_eq!(event.args.len(), 3);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_input_does_not_panic(raw in ".{0,512}") {
                let _ = StraceParser::new().parse(&raw);
            }

            #[test]
            fn arbitrary_bytes_do_not_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
                let raw = String::from_utf8_lossy(&bytes);
                let _ = parse_trace_line(&raw);
            }

            #[test]
            fn well_formed_line_recovers_name(
                name in "[a-z_][a-z0-9_]{0,15}",
                args in prop::collection::vec("[A-Za-z0-9_|/ .-]{1,20}", 0..6),
                ret in -1i64..100_000,
            ) {
                let line = format!("{}({}) = {}", name, args.join(", "), ret);
                let event = parse_trace_line(&line);
                prop_assert!(event.is_some());
                let event = event.unwrap();
                prop_assert_eq!(event.name, name);
            }
        }
    }
}
