//! 모니터링 엔진 -- 세션 오케스트레이션과 종료 정책
//!
//! [`MonitorEngine`]은 한 번의 실행(`run`)마다 세션을 만들고 다음 순서로 진행합니다.
//!
//! 1. (선택) 런타임 훅 등록, 감사 피드 시작
//! 2. 트레이서 실행
//! 3. 두 소스의 이벤트를 하나의 bounded 큐로 받아 분류
//! 4. 종료 정책이 발동하면 프로세스 그룹 종료 (SIGTERM, 유예, SIGKILL, 회수)
//! 5. 남은 출력 드레인, 훅 해제, [`Report`] 생성
//!
//! # 내부 아키텍처
//! ```text
//!                 realtime: LogTail -> TraceDecoder --+
//!                                                     +--> mpsc(queue_capacity) --> Session::receive
//! AuditFeed thread -> hook::notify_event -> Registry -+
//!
//! once: 대상 종료 후 전체 로그 파싱 -> 훅 이벤트와 시간순 병합 -> 분류
//! ```
//!
//! 큐가 가득 차면 프로듀서는 기다립니다. 백프레셔로 이벤트를 버리는 일은 없습니다.
//! 종료 정책이 발동한 뒤에는 큐를 닫으므로 더 이상 분류되는 이벤트가 없습니다.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tracewarden_core::config::RulesConfig;
use tracewarden_core::event::{Event, Finding};
use tracewarden_core::metrics as m;
use tracewarden_core::pipeline::Classifier;
use tracewarden_core::types::{EventSource, MonitorMode, Severity};

use crate::collector::{self, LogTail, LogTailConfig};
use crate::config::SessionConfig;
use crate::error::MonitorError;
use crate::hook::{AUDIT_FEED_ENV, AuditFeed, RuntimeHookAdapter};
use crate::parser::{AuditRecord, ParseStats, TraceDecoder};
use crate::report::{Report, StopCause};
use crate::rule::RuleSet;
use crate::rule::builtin::{EXEC_SYSCALLS, RUNTIME_SUBPROCESS_EVENTS};
use crate::supervisor::TracerSupervisor;

/// 하위 프로그램 실행 수 초과 Finding의 규칙 ID
pub const SUBPROCESS_BUDGET_RULE_ID: &str = "subprocess_budget";
/// 하위 프로그램 실행 수 초과 Finding의 레이블
pub const SUBPROCESS_BUDGET_LABEL: &str = "Excessive subprocess spawning";

/// 보관하는 미매칭 이벤트 최대 수
const MAX_UNMATCHED: usize = 10_000;

/// 모니터링 엔진
///
/// # 사용 예시
/// ```ignore
/// let engine = MonitorEngine::builder()
///     .config(SessionConfig::new("job.py", "trace.log"))
///     .rules(RuleSet::from_config(&core_config.rules).await?)
///     .build()?;
///
/// let cancel = engine.cancellation_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     cancel.cancel();
/// });
///
/// let report = engine.run().await?;
/// println!("{report}");
/// ```
pub struct MonitorEngine {
    config: SessionConfig,
    rules: RuleSet,
    cancel: CancellationToken,
}

impl MonitorEngine {
    /// 검증된 설정과 규칙 집합으로 엔진을 생성합니다.
    pub fn new(config: SessionConfig, rules: RuleSet) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            rules,
            cancel: CancellationToken::new(),
        })
    }

    /// 빌더를 생성합니다.
    pub fn builder() -> MonitorEngineBuilder {
        MonitorEngineBuilder::new()
    }

    /// 실행 중인 세션을 취소하는 토큰
    ///
    /// 취소는 종료 정책과 같은 종료, 드레인, 회수 경로를 거칩니다.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 규칙 집합
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// 대상 스크립트를 트레이서 아래에서 실행하고 보고서를 만듭니다.
    ///
    /// # Errors
    /// - [`MonitorError::TracerUnavailable`]: 트레이서를 실행할 수 없음
    /// - [`MonitorError::HookRegistration`]: 훅 등록 실패 (허용 설정이 꺼진 경우)
    /// - [`MonitorError::Io`]: 로그 파일 생성/읽기 실패
    pub async fn run(&self) -> Result<Report, MonitorError> {
        let config = &self.config;
        if config.script.as_os_str().is_empty() {
            return Err(MonitorError::Config {
                field: "script".to_owned(),
                reason: "target script path must not be empty".to_owned(),
            });
        }
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %session_id,
            script = %config.script.display(),
            log = %config.log_path.display(),
            mode = %config.mode,
            terminate_on_high_risk = config.terminate_on_high_risk,
            audit = config.audit_enabled,
            "monitoring session starting"
        );

        // 이전 실행의 내용을 따라 읽지 않도록 로그를 비워 둠
        tokio::fs::File::create(&config.log_path).await?;

        let (tx, mut rx) = mpsc::channel(config.queue_capacity);
        let mut session = Session::new(config, &self.rules);

        let mut hook = RuntimeHookAdapter::new();
        let mut feed = None;
        if config.audit_enabled {
            match hook.enable(tx.clone()) {
                Ok(()) => {
                    if let Some(path) = &config.audit_feed_path {
                        feed = Some(AuditFeed::start(path, config.poll_interval)?);
                    }
                }
                Err(e) if config.tolerate_hook_failure => {
                    warn!(error = %e, "runtime hook unavailable, continuing with tracer only");
                    session.note(format!(
                        "runtime hook unavailable, continued with tracer only: {e}"
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        let mut supervisor = TracerSupervisor::new(config.tracer.clone());
        if let Some(feed) = &feed {
            supervisor = supervisor.env(AUDIT_FEED_ENV, feed.path().display().to_string());
        }
        supervisor.start(&config.script, &config.script_args, &config.log_path)?;

        // 트레이서 출력 수집 태스크 (realtime)
        let tail_stop = CancellationToken::new();
        let _tail_guard = tail_stop.clone().drop_guard();
        let mut tail_task = match config.mode {
            MonitorMode::Realtime => supervisor
                .follow_output(LogTailConfig {
                    poll_interval: config.poll_interval,
                    ..LogTailConfig::default()
                })
                .map(|tail| tokio::spawn(follow_trace(tail, tx.clone(), tail_stop.clone()))),
            MonitorMode::Once => None,
        };
        drop(tx);

        // 1단계: 대상 실행 중
        let mut stop = self.watch(&mut session, &mut supervisor, &mut rx).await?;

        // 2단계: 프로듀서에게 남은 입력을 마저 읽고 끝내도록 요청
        tail_stop.cancel();
        let mut feed_task = feed.map(|feed| tokio::spawn(feed.finish()));
        if stop.is_none() {
            stop = self
                .drain(&mut session, &mut rx, &mut tail_task, &mut feed_task)
                .await;
        }

        // 큐를 닫아 이후 이벤트는 분류하지 않음
        drop(rx);
        if let Some(cause) = stop {
            session.stop(cause);
            self.terminate(&mut session, &mut supervisor).await;
        }
        self.collect_producers(&mut session, tail_task, feed_task).await;
        hook.disable();

        if config.mode == MonitorMode::Once {
            let lines = supervisor.collect_output().await?;
            let mut decoder = TraceDecoder::new();
            let events: Vec<Event> = lines.iter().filter_map(|l| decoder.decode(l)).collect();
            session.parse_stats.merge(&decoder.stats());
            let hook_events = std::mem::take(&mut session.hook_buffer);
            session.classify_merged(events, hook_events);
        }

        let exit = supervisor.finish();
        let report = session.into_report(session_id, started_at, Some(exit), StopCause::TargetExited);
        info!(
            %session_id,
            findings = report.findings.len(),
            stop_cause = %report.stop_cause,
            "monitoring session finished"
        );
        Ok(report)
    }

    /// 이미 기록된 트레이스 로그를 오프라인으로 분류합니다.
    ///
    /// 감사 피드 경로가 설정되어 있으면 그 레코드도 시간순으로 병합합니다.
    /// 대상 스크립트 경로가 비어 있으면 부트스트랩 exec 필터는 꺼집니다.
    pub async fn analyze(&self) -> Result<Report, MonitorError> {
        let config = &self.config;
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut session = Session::new(config, &self.rules);

        let lines = collector::read_lines(&config.log_path).await?;
        let mut decoder = TraceDecoder::new();
        let events: Vec<Event> = lines.iter().filter_map(|l| decoder.decode(l)).collect();
        session.parse_stats.merge(&decoder.stats());

        let hook_events = match &config.audit_feed_path {
            Some(path) => read_audit_records(path, &mut session.parse_stats).await?,
            None => Vec::new(),
        };

        info!(
            log = %config.log_path.display(),
            trace_events = events.len(),
            runtime_events = hook_events.len(),
            "analyzing recorded trace"
        );
        session.classify_merged(events, hook_events);
        Ok(session.into_report(session_id, started_at, None, StopCause::EndOfLog))
    }

    /// 대상이 끝나거나 정지 조건이 생길 때까지 이벤트를 받습니다.
    ///
    /// 대상이 스스로 끝나면 `None`입니다.
    async fn watch(
        &self,
        session: &mut Session<'_>,
        supervisor: &mut TracerSupervisor,
        rx: &mut mpsc::Receiver<Event>,
    ) -> Result<Option<StopCause>, MonitorError> {
        let mut rx_open = true;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("cancellation requested");
                    return Ok(Some(StopCause::Cancelled));
                }
                received = rx.recv(), if rx_open => match received {
                    Some(event) => {
                        if let Some(cause) = session.receive(event) {
                            return Ok(Some(cause));
                        }
                    }
                    None => rx_open = false,
                },
                exit = supervisor.wait() => {
                    let exit = exit?;
                    debug!(%exit, "target finished, draining");
                    return Ok(None);
                }
            }
        }
    }

    /// 대상 종료 후 프로듀서가 남은 입력을 모두 보낼 때까지 계속 받습니다.
    ///
    /// `drain_timeout`이 지나면 노트를 남기고 멈춥니다.
    async fn drain(
        &self,
        session: &mut Session<'_>,
        rx: &mut mpsc::Receiver<Event>,
        tail_task: &mut Option<JoinHandle<ParseStats>>,
        feed_task: &mut Option<JoinHandle<ParseStats>>,
    ) -> Option<StopCause> {
        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut rx_open = true;

        while tail_task.is_some() || feed_task.is_some() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Some(StopCause::Cancelled),
                received = rx.recv(), if rx_open => match received {
                    Some(event) => {
                        if let Some(cause) = session.receive(event) {
                            return Some(cause);
                        }
                    }
                    None => rx_open = false,
                },
                stats = join_producer(&mut *tail_task), if tail_task.is_some() => {
                    *tail_task = None;
                    session.merge_stats(stats);
                }
                stats = join_producer(&mut *feed_task), if feed_task.is_some() => {
                    *feed_task = None;
                    session.merge_stats(stats);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        drain_timeout_ms = self.config.drain_timeout.as_millis() as u64,
                        "drain timed out"
                    );
                    session.note(format!(
                        "output drain timed out after {}ms; trace may be incomplete",
                        self.config.drain_timeout.as_millis()
                    ));
                    break;
                }
            }
        }

        // 프로듀서가 끝난 뒤 큐에 남아 있는 이벤트
        while let Ok(event) = rx.try_recv() {
            if let Some(cause) = session.receive(event) {
                return Some(cause);
            }
        }
        None
    }

    /// 프로세스 그룹을 종료합니다. 실패는 보고서 노트로만 남깁니다.
    async fn terminate(&self, session: &mut Session<'_>, supervisor: &mut TracerSupervisor) {
        if let Err(e) = supervisor.terminate(self.config.grace_timeout).await {
            warn!(error = %e, "process group termination failed");
            session.note(e.to_string());
        }
    }

    /// 드레인 중 끝나지 않은 프로듀서의 통계를 회수합니다.
    async fn collect_producers(
        &self,
        session: &mut Session<'_>,
        tail_task: Option<JoinHandle<ParseStats>>,
        feed_task: Option<JoinHandle<ParseStats>>,
    ) {
        for (name, task) in [("trace tail", tail_task), ("audit feed", feed_task)] {
            let Some(mut task) = task else {
                continue;
            };
            match tokio::time::timeout(self.config.drain_timeout, &mut task).await {
                Ok(Ok(stats)) => session.parse_stats.merge(&stats),
                Ok(Err(e)) => warn!(producer = name, error = %e, "producer task failed"),
                Err(_) => {
                    task.abort();
                    session.note(format!(
                        "{name} did not stop within {}ms",
                        self.config.drain_timeout.as_millis()
                    ));
                }
            }
        }
    }
}

/// 엔진 빌더
pub struct MonitorEngineBuilder {
    config: Option<SessionConfig>,
    rules: Option<RuleSet>,
    cancel: Option<CancellationToken>,
}

impl MonitorEngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: None,
            rules: None,
            cancel: None,
        }
    }

    /// 세션 설정을 지정합니다.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 규칙 집합을 지정합니다. 지정하지 않으면 기본 설정의 내장 규칙을 씁니다.
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// 외부 취소 토큰을 연결합니다.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 엔진을 빌드합니다.
    pub fn build(self) -> Result<MonitorEngine, MonitorError> {
        let config = self.config.ok_or_else(|| MonitorError::Config {
            field: "session".to_owned(),
            reason: "session config is required".to_owned(),
        })?;
        let rules = match self.rules {
            Some(rules) => rules,
            None => RuleSet::builtin(&RulesConfig::default())?,
        };
        let mut engine = MonitorEngine::new(config, rules)?;
        if let Some(cancel) = self.cancel {
            engine.cancel = cancel;
        }
        Ok(engine)
    }
}

impl Default for MonitorEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 내장 규칙으로 세션 하나를 실행합니다.
pub async fn run(config: SessionConfig) -> Result<Report, MonitorError> {
    MonitorEngine::builder().config(config).build()?.run().await
}

/// 두 이벤트 시퀀스를 시간순으로 안정 병합합니다.
///
/// 각 시퀀스 내부 순서는 유지되고, 시각이 같으면 트레이서 이벤트가 먼저입니다.
pub fn merge_by_time(tracer: Vec<Event>, runtime: Vec<Event>) -> Vec<Event> {
    let mut merged = Vec::with_capacity(tracer.len() + runtime.len());
    let mut tracer = tracer.into_iter().peekable();
    let mut runtime = runtime.into_iter().peekable();
    loop {
        let take_tracer = match (tracer.peek(), runtime.peek()) {
            (Some(t), Some(r)) => t.timestamp <= r.timestamp,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_tracer {
            tracer.next()
        } else {
            runtime.next()
        };
        merged.extend(next);
    }
    merged
}

/// 트레이서 자신이 인터프리터를 실행하는 첫 exec을 걸러냅니다.
#[derive(Debug)]
struct BootstrapFilter {
    script: String,
    pending: bool,
}

impl BootstrapFilter {
    fn new(script: &Path) -> Self {
        let script = script.display().to_string();
        let pending = !script.is_empty();
        Self { script, pending }
    }

    fn is_bootstrap(&mut self, event: &Event) -> bool {
        if !self.pending
            || event.source != EventSource::Tracer
            || !EXEC_SYSCALLS.contains(&event.name.as_str())
        {
            return false;
        }
        if event.args.iter().any(|arg| arg.contains(&self.script)) {
            self.pending = false;
            debug!(raw = %event.raw_text, "skipping tracer bootstrap exec");
            return true;
        }
        false
    }
}

/// 대상 쪽 감사 심이 피드 파일을 여는 트레이서 이벤트를 걸러냅니다.
///
/// 피드 경로는 세션이 대상에 넘긴 값 그대로 트레이서 로그에 나타납니다.
struct AuditFeedFilter {
    path: Option<String>,
}

impl AuditFeedFilter {
    fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(|p| p.display().to_string()),
        }
    }

    fn is_feed_access(&self, event: &Event) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if event.source != EventSource::Tracer
            || !event.unquoted_args().any(|arg| arg == path.as_str())
        {
            return false;
        }
        debug!(raw = %event.raw_text, "skipping audit feed access");
        true
    }
}

fn is_program_execution(event: &Event) -> bool {
    match event.source {
        EventSource::Tracer => EXEC_SYSCALLS.contains(&event.name.as_str()),
        EventSource::RuntimeHook => RUNTIME_SUBPROCESS_EVENTS.contains(&event.name.as_str()),
    }
}

/// 한 번의 실행 동안 누적되는 상태
///
/// 큐의 유일한 소비자만 접근하므로 잠금이 필요 없습니다.
struct Session<'a> {
    config: &'a SessionConfig,
    rules: &'a RuleSet,
    bootstrap: BootstrapFilter,
    audit_feed: AuditFeedFilter,
    findings: Vec<Finding>,
    unmatched: Vec<Event>,
    /// once 모드에서 대상 종료 전까지 모아 두는 훅 이벤트
    hook_buffer: Vec<Event>,
    notes: Vec<String>,
    parse_stats: ParseStats,
    exec_count: u32,
    budget_exceeded: bool,
    stop_cause: Option<StopCause>,
}

impl<'a> Session<'a> {
    fn new(config: &'a SessionConfig, rules: &'a RuleSet) -> Self {
        Self {
            config,
            rules,
            bootstrap: BootstrapFilter::new(&config.script),
            audit_feed: AuditFeedFilter::new(config.audit_feed_path.as_deref()),
            findings: Vec::new(),
            unmatched: Vec::new(),
            hook_buffer: Vec::new(),
            notes: Vec::new(),
            parse_stats: ParseStats::default(),
            exec_count: 0,
            budget_exceeded: false,
            stop_cause: None,
        }
    }

    fn note(&mut self, note: String) {
        self.notes.push(note);
    }

    fn merge_stats(&mut self, stats: Option<ParseStats>) {
        if let Some(stats) = stats {
            self.parse_stats.merge(&stats);
        }
    }

    /// 첫 정지 원인만 기록합니다.
    fn stop(&mut self, cause: StopCause) {
        if self.stop_cause.is_none() {
            info!(cause = %cause, "session stopping");
            self.stop_cause = Some(cause);
        }
    }

    /// 큐에서 꺼낸 이벤트를 모드에 맞게 처리합니다.
    fn receive(&mut self, event: Event) -> Option<StopCause> {
        match self.config.mode {
            MonitorMode::Realtime => self.classify(event),
            MonitorMode::Once => self.buffer_hook_event(event),
        }
    }

    /// once 모드: 훅 이벤트는 병합을 위해 보관하되, 종료 정책은 즉시 판단합니다.
    fn buffer_hook_event(&mut self, event: Event) -> Option<StopCause> {
        let mut cause = None;
        if self.config.terminate_on_high_risk {
            if let Some(finding) = self.rules.classify(&event) {
                if finding.severity.is_high_risk() {
                    cause = Some(StopCause::HighRisk {
                        label: finding.label,
                    });
                }
            }
        }
        self.hook_buffer.push(event);
        cause
    }

    /// 이벤트 하나를 분류하고 종료 정책을 판단합니다.
    fn classify(&mut self, event: Event) -> Option<StopCause> {
        if self.bootstrap.is_bootstrap(&event) || self.audit_feed.is_feed_access(&event) {
            return None;
        }
        metrics::counter!(m::MONITOR_EVENTS_TOTAL, m::LABEL_SOURCE => event.source.as_label())
            .increment(1);

        let execution = is_program_execution(&event);
        let cause = match self.rules.classify(&event) {
            Some(finding) => self.record(finding),
            None => {
                if self.config.retain_unmatched && self.unmatched.len() < MAX_UNMATCHED {
                    self.unmatched.push(event.clone());
                }
                None
            }
        };
        if cause.is_some() || !execution {
            return cause;
        }
        self.count_execution(&event)
    }

    fn record(&mut self, finding: Finding) -> Option<StopCause> {
        metrics::counter!(m::MONITOR_FINDINGS_TOTAL, m::LABEL_SEVERITY => finding.severity.as_label())
            .increment(1);
        info!(
            severity = %finding.severity,
            rule_id = %finding.rule_id,
            event = %finding.event.summary(),
            "finding"
        );

        let cause = (self.config.terminate_on_high_risk && finding.severity.is_high_risk())
            .then(|| StopCause::HighRisk {
                label: finding.label.clone(),
            });
        self.findings.push(finding);
        cause
    }

    fn count_execution(&mut self, event: &Event) -> Option<StopCause> {
        self.exec_count += 1;
        let max = self.config.max_subprocess_count;
        if max == 0 || self.budget_exceeded || self.exec_count <= max {
            return None;
        }

        self.budget_exceeded = true;
        warn!(count = self.exec_count, max, "subprocess budget exceeded");
        let finding = Finding::new(
            event.clone(),
            Severity::High,
            format!("{SUBPROCESS_BUDGET_LABEL} ({} > {max})", self.exec_count),
            SUBPROCESS_BUDGET_RULE_ID,
        );
        self.record(finding).map(|_| StopCause::SubprocessBudget)
    }

    /// 트레이서 이벤트와 훅 이벤트를 병합해 순서대로 분류합니다.
    ///
    /// 종료 정책이 켜져 있으면 첫 High 이상 Finding에서 멈춥니다.
    fn classify_merged(&mut self, tracer: Vec<Event>, runtime: Vec<Event>) {
        for event in merge_by_time(tracer, runtime) {
            if let Some(cause) = self.classify(event) {
                self.stop(cause);
                break;
            }
        }
    }

    fn into_report(
        self,
        session_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        exit: Option<crate::supervisor::ExitReason>,
        default_cause: StopCause,
    ) -> Report {
        Report {
            session_id,
            script: self.config.script.clone(),
            log_path: self.config.log_path.clone(),
            mode: self.config.mode,
            started_at,
            finished_at: Utc::now(),
            exit,
            stop_cause: self.stop_cause.unwrap_or(default_cause),
            findings: self.findings,
            unmatched: self.unmatched,
            parse_stats: self.parse_stats,
            notes: self.notes,
        }
    }
}

async fn join_producer(task: &mut Option<JoinHandle<ParseStats>>) -> Option<ParseStats> {
    match task.as_mut() {
        Some(handle) => handle.await.ok(),
        None => std::future::pending().await,
    }
}

/// realtime 모드의 트레이서 출력 수집 태스크
///
/// 중지 요청 후에는 파일 끝까지 읽고 끝납니다. 큐가 닫히면 즉시 끝납니다.
async fn follow_trace(
    mut tail: LogTail,
    tx: mpsc::Sender<Event>,
    stop: CancellationToken,
) -> ParseStats {
    let mut decoder = TraceDecoder::new();
    loop {
        // 읽기 전에 확인해야 중지 직전에 쓰인 라인을 놓치지 않음
        let stopping = stop.is_cancelled();
        let lines = match tail.read_available().await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %tail.path().display(), error = %e, "trace log read failed");
                break;
            }
        };

        if lines.is_empty() {
            if stopping {
                break;
            }
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep(tail.poll_interval()) => {}
            }
            continue;
        }

        for line in lines {
            if let Some(event) = decoder.decode(&line) {
                if tx.send(event).await.is_err() {
                    return decoder.stats();
                }
            }
        }
    }

    if let Some(rest) = tail.take_partial() {
        if let Some(event) = decoder.decode(&rest) {
            let _ = tx.send(event).await;
        }
    }
    decoder.stats()
}

async fn read_audit_records(
    path: &Path,
    stats: &mut ParseStats,
) -> Result<Vec<Event>, MonitorError> {
    let lines = collector::read_lines(path).await?;
    let mut events = Vec::with_capacity(lines.len());
    for line in lines {
        stats.lines += 1;
        match AuditRecord::parse(&line) {
            Ok(record) => {
                stats.parsed += 1;
                events.push(record.into_event());
            }
            Err(e) => {
                stats.failures += 1;
                metrics::counter!(m::MONITOR_PARSE_FAILURES_TOTAL).increment(1);
                debug!(error = %e, "skipping malformed audit record");
            }
        }
    }
    Ok(events)
}
