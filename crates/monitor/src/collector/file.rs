//! 트레이스 로그 파일 수집기
//!
//! 트레이서가 기록 중인 로그 파일을 오프셋 0부터 따라가며 완성된 라인을
//! 돌려줍니다. `tail -f`와 유사한 동작을 폴링 방식으로 구현합니다.
//!
//! # 동작
//! - 파일이 아직 없으면 빈 결과를 돌려주고 다음 폴링에서 다시 엽니다.
//! - 줄바꿈으로 끝나지 않은 마지막 조각은 다음 읽기까지 보관합니다.
//! - 파일 크기가 현재 오프셋보다 작아지면 (truncation) 처음부터 다시 읽습니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::MonitorError;

/// 한 번의 읽기 호출에서 읽는 최대 바이트 수
const MAX_READ_PER_POLL: usize = 1024 * 1024;
/// 읽기 청크 크기
const READ_CHUNK: usize = 16 * 1024;

/// 로그 수집기 설정
#[derive(Debug, Clone)]
pub struct LogTailConfig {
    /// 새 데이터 확인 주기
    pub poll_interval: Duration,
    /// 최대 라인 길이 (바이트). 넘는 조각은 강제로 한 라인으로 내보냅니다.
    pub max_line_length: usize,
}

impl Default for LogTailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_line_length: 256 * 1024,
        }
    }
}

/// 증가하는 로그 파일을 따라가는 수집기
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    config: LogTailConfig,
    file: Option<File>,
    /// 마지막 읽기 위치 (바이트 오프셋)
    offset: u64,
    /// 아직 줄바꿈을 만나지 못한 바이트
    pending: BytesMut,
}

impl LogTail {
    /// 새 수집기를 생성합니다. 파일은 첫 읽기 때 엽니다.
    pub fn new(path: impl Into<PathBuf>, config: LogTailConfig) -> Self {
        Self {
            path: path.into(),
            config,
            file: None,
            offset: 0,
            pending: BytesMut::new(),
        }
    }

    /// 따라가는 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// 지금까지 읽은 바이트 수
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 현재까지 기록된 완성 라인을 읽습니다. 새 데이터가 없으면 빈 목록입니다.
    pub async fn read_available(&mut self) -> Result<Vec<String>, MonitorError> {
        if self.file.is_none() {
            match File::open(&self.path).await {
                Ok(file) => self.file = Some(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            tracing::debug!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "log file truncated, rereading from start"
            );
            file.seek(SeekFrom::Start(0)).await?;
            self.offset = 0;
            self.pending.clear();
        }

        let mut read_total = 0;
        while read_total < MAX_READ_PER_POLL {
            self.pending.reserve(READ_CHUNK);
            let n = file.read_buf(&mut self.pending).await?;
            if n == 0 {
                break;
            }
            read_total += n;
            self.offset += n as u64;
        }

        Ok(self.split_lines())
    }

    /// 줄바꿈 없이 남은 마지막 조각을 꺼냅니다.
    ///
    /// 트레이서가 종료되어 더 이상 쓰지 않을 때만 호출합니다.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = self.pending.split();
        Some(decode_line(&rest))
    }

    fn split_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(pos + 1);
            lines.push(decode_line(&line[..pos]));
        }
        if self.pending.len() > self.config.max_line_length {
            let oversized = self.pending.split();
            lines.push(decode_line(&oversized));
        }
        lines
    }
}

/// 완성된 트레이스 로그 전체를 라인 단위로 읽습니다.
pub async fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>, MonitorError> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    Ok(bytes.split(|b| *b == b'\n').map(decode_line).filter(|l| !l.is_empty()).collect())
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&*text).to_owned()
}
