//! 런타임 훅 어댑터 -- 프로세스 전역 감사 콜백
//!
//! 인터프리터 감사 알림은 프로세스 전체에서 하나의 콜백으로만 받습니다.
//! [`RuntimeHookAdapter`]는 그 콜백 자리를 세션 하나가 독점하도록 하는
//! 권한 객체이며, `enable`/`disable`만이 전역 상태를 바꿉니다.
//!
//! - 같은 어댑터를 두 번 켜거나, 다른 세션이 이미 등록한 상태에서 켜면
//!   [`MonitorError::HookRegistration`]입니다. 전달이 중복되는 일은 없습니다.
//! - 어댑터가 drop되면 등록은 자동으로 해제됩니다 (에러 경로 포함).
//! - 훅은 이벤트를 큐에 넣을 뿐 프로세스 종료를 결정하지 않습니다.
//!
//! 대상 인터프리터는 별도 프로세스이므로 [`AuditFeed`]가 감사 레코드 파일을
//! 따라가며 레코드마다 [`notify_event`]를 호출합니다.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tracewarden_core::event::Event;
use tracewarden_core::metrics as m;

use crate::error::MonitorError;
use crate::parser::{AuditRecord, ParseStats, parse_runtime_event};

/// 대상 프로세스에 감사 피드 경로를 알려주는 환경변수
pub const AUDIT_FEED_ENV: &str = "TRACEWARDEN_AUDIT_FEED";

/// 감사 피드 한 번의 읽기 크기
const FEED_READ_CHUNK: usize = 16 * 1024;

/// 현재 등록된 콜백
struct Registration {
    id: u64,
    sink: mpsc::Sender<Event>,
}

static REGISTRY: Mutex<Option<Registration>> = Mutex::new(None);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> MutexGuard<'static, Option<Registration>> {
    // 잠금 중 패닉이 나도 등록 정보 자체는 일관성을 유지함
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 전역 콜백이 등록되어 있는지 확인합니다.
pub fn is_registered() -> bool {
    registry().is_some()
}

fn current_sink() -> Option<mpsc::Sender<Event>> {
    registry().as_ref().map(|reg| reg.sink.clone())
}

/// 런타임 알림 하나를 등록된 세션에 전달합니다.
///
/// 등록된 세션이 없거나 세션이 이미 수신을 멈췄으면 `false`입니다.
/// 큐가 가득 차면 빌 때까지 기다리므로 비동기 런타임 워커가 아닌
/// 스레드에서만 호출해야 합니다.
pub fn notify(name: &str, args: &[String]) -> bool {
    notify_event(parse_runtime_event(name, args.to_vec()))
}

/// 이미 만들어진 런타임 이벤트를 전달합니다. [`notify`] 참고.
pub fn notify_event(event: Event) -> bool {
    // 잠금을 쥔 채로 대기하지 않도록 sender만 복제해서 보냄
    let Some(sink) = current_sink() else {
        return false;
    };
    let delivered = sink.blocking_send(event).is_ok();
    if delivered {
        metrics::counter!(m::MONITOR_HOOK_EVENTS_TOTAL).increment(1);
    }
    delivered
}

/// 세션 하나가 소유하는 런타임 훅 등록 권한
///
/// # 사용 예시
/// ```ignore
/// let (tx, mut rx) = tokio::sync::mpsc::channel(1024);
/// let mut hook = RuntimeHookAdapter::new();
/// hook.enable(tx)?;
/// // ... 세션 진행 ...
/// hook.disable();
/// ```
#[derive(Debug, Default)]
pub struct RuntimeHookAdapter {
    id: Option<u64>,
}

impl RuntimeHookAdapter {
    /// 등록되지 않은 어댑터를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 전역 콜백을 등록합니다. 이후 알림은 `sink`로 전달됩니다.
    ///
    /// # Errors
    /// 이미 켜져 있거나 다른 세션이 등록해 둔 경우 [`MonitorError::HookRegistration`]
    pub fn enable(&mut self, sink: mpsc::Sender<Event>) -> Result<(), MonitorError> {
        if self.id.is_some() {
            return Err(MonitorError::HookRegistration(
                "runtime hook is already enabled for this session".to_owned(),
            ));
        }

        let mut slot = registry();
        if let Some(existing) = slot.as_ref() {
            return Err(MonitorError::HookRegistration(format!(
                "runtime hook is held by another session (registration {})",
                existing.id
            )));
        }

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        *slot = Some(Registration { id, sink });
        self.id = Some(id);
        info!(registration = id, "runtime hook enabled");
        Ok(())
    }

    /// 등록을 해제합니다. 여러 번 호출해도 안전합니다.
    pub fn disable(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let mut slot = registry();
        if slot.as_ref().is_some_and(|reg| reg.id == id) {
            *slot = None;
            info!(registration = id, "runtime hook disabled");
        }
    }

    /// 이 어댑터가 등록을 쥐고 있는지 확인합니다.
    pub fn is_enabled(&self) -> bool {
        self.id.is_some()
    }
}

impl Drop for RuntimeHookAdapter {
    fn drop(&mut self) {
        self.disable();
    }
}

/// 감사 레코드 파일을 따라가며 전역 훅으로 전달하는 피드
///
/// 별도 스레드에서 동작합니다. 중지 요청을 받으면 파일 끝까지 읽은 뒤 끝납니다.
pub struct AuditFeed {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<ParseStats>>,
}

impl AuditFeed {
    /// 피드 파일을 새로 만들고(기존 내용은 비움) 따라가기 시작합니다.
    pub fn start(path: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self, MonitorError> {
        let path = path.into();
        let file = File::create(&path)?;
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("tracewarden-audit-feed".to_owned())
            .spawn(move || follow_feed(file, poll_interval, &thread_stop))?;

        info!(path = %path.display(), "audit feed started");
        Ok(Self {
            path,
            stop,
            handle: Some(handle),
        })
    }

    /// 피드 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 남은 레코드를 읽고 멈추도록 요청합니다.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// 중지를 요청하고 스레드가 끝날 때까지 기다립니다.
    pub async fn finish(mut self) -> ParseStats {
        self.request_stop();
        let Some(handle) = self.handle.take() else {
            return ParseStats::default();
        };
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(stats)) => stats,
            _ => {
                warn!(path = %self.path.display(), "audit feed thread did not finish cleanly");
                ParseStats::default()
            }
        }
    }
}

impl Drop for AuditFeed {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn follow_feed(mut file: File, poll_interval: Duration, stop: &AtomicBool) -> ParseStats {
    let mut stats = ParseStats::default();
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; FEED_READ_CHUNK];

    loop {
        // 중지 요청을 읽기 전에 확인해야 요청 직전에 쓰인 레코드를 놓치지 않음
        let stopping = stop.load(Ordering::Acquire);
        let n = match file.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "audit feed read failed");
                break;
            }
        };

        if n == 0 {
            if stopping {
                break;
            }
            std::thread::sleep(poll_interval);
            continue;
        }

        pending.extend_from_slice(&chunk[..n]);
        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            handle_record(&line[..pos], &mut stats);
        }
    }

    if !pending.is_empty() {
        handle_record(&pending, &mut stats);
    }
    debug!(?stats, "audit feed finished");
    stats
}

fn handle_record(bytes: &[u8], stats: &mut ParseStats) {
    let line = String::from_utf8_lossy(bytes);
    if line.trim().is_empty() {
        return;
    }
    stats.lines += 1;

    match AuditRecord::parse(&line) {
        Ok(record) => {
            stats.parsed += 1;
            if !notify_event(record.into_event()) {
                debug!("audit record dropped, no session is receiving");
            }
        }
        Err(e) => {
            stats.failures += 1;
            metrics::counter!(m::MONITOR_PARSE_FAILURES_TOTAL).increment(1);
            debug!(error = %e, "skipping malformed audit record");
        }
    }
}
