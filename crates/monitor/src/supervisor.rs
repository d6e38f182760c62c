//! 트레이서 감독자 -- 트레이서 자식 프로세스의 생명주기 관리
//!
//! [`TracerSupervisor`]는 외부 트레이서를 대상 스크립트의 부모로 실행하고
//! 대기, 종료, 회수까지 책임집니다. 트레이서는 새 프로세스 그룹의 리더로
//! 실행되므로 종료 신호는 트레이서와 대상 스크립트, 그 자손 전체에 전달됩니다.
//!
//! # 상태 전이
//! ```text
//! Idle -> Launching -> Running -> Draining -> Stopped(Exited | Killed | Failed)
//!              |                                  ^
//!              +------ spawn 실패 ----------------+
//! ```
//!
//! - `Running -> Draining`: 대상 종료, 종료 정책 발동, 외부 취소
//! - `Draining -> Stopped`: 남은 출력을 읽은 뒤 [`TracerSupervisor::finish`]

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use tracewarden_core::metrics as m;

use crate::collector::{LogTail, LogTailConfig};
use crate::config::TracerSettings;
use crate::error::MonitorError;

/// 그룹 잔여 프로세스 확인 주기
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 트레이서 종료 사유
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ExitReason {
    /// 스스로 종료 (시그널로 끝난 경우 코드 없음)
    Exited(Option<i32>),
    /// 종료 정책이나 취소로 강제 종료됨
    Killed,
    /// 실행 자체에 실패
    Failed(String),
}

impl ExitReason {
    fn from_status(status: ExitStatus) -> Self {
        Self::Exited(status.code())
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(Some(code)) => write!(f, "exited with code {code}"),
            Self::Exited(None) => write!(f, "exited by signal"),
            Self::Killed => write!(f, "killed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// 감독자 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// 아직 시작하지 않음
    Idle,
    /// 트레이서 실행 중
    Launching,
    /// 트레이서 동작 중
    Running,
    /// 프로세스는 끝났고 남은 출력을 읽는 중
    Draining,
    /// 회수 완료
    Stopped(ExitReason),
}

impl SupervisorState {
    /// 상태 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped(_) => "stopped",
        }
    }
}

/// 트레이서 감독자
///
/// # 사용 예시
/// ```ignore
/// let mut supervisor = TracerSupervisor::new(TracerSettings::default());
/// supervisor.start(Path::new("job.py"), &[], Path::new("trace.log"))?;
/// let exit = supervisor.wait().await?;
/// let exit = supervisor.finish();
/// ```
pub struct TracerSupervisor {
    settings: TracerSettings,
    env: Vec<(String, String)>,
    state: SupervisorState,
    child: Option<Child>,
    /// 프로세스 그룹 ID (트레이서 PID와 같음)
    pgid: Option<u32>,
    log_path: Option<PathBuf>,
    /// 프로세스 종료 후 `finish` 전까지 보관하는 종료 사유
    exit: Option<ExitReason>,
}

impl TracerSupervisor {
    /// 새 감독자를 생성합니다.
    pub fn new(settings: TracerSettings) -> Self {
        Self {
            settings,
            env: Vec::new(),
            state: SupervisorState::Idle,
            child: None,
            pgid: None,
            log_path: None,
            exit: None,
        }
    }

    /// 트레이서(와 대상 스크립트)에 전달할 환경변수를 추가합니다.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// 현재 상태
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// 트레이서 PID (프로세스 그룹 ID)
    pub fn pid(&self) -> Option<u32> {
        self.pgid
    }

    /// 트레이서를 실행합니다.
    ///
    /// # Errors
    /// 실행 파일이 없거나 실행할 수 없으면 [`MonitorError::TracerUnavailable`]
    pub fn start(
        &mut self,
        script: &Path,
        script_args: &[String],
        log_path: &Path,
    ) -> Result<u32, MonitorError> {
        if self.state != SupervisorState::Idle {
            return Err(MonitorError::Config {
                field: "supervisor".to_owned(),
                reason: format!("cannot start from state {}", self.state.name()),
            });
        }
        self.state = SupervisorState::Launching;

        let args = self.settings.command_args(log_path, script, script_args);
        info!(program = %self.settings.program, ?args, "launching tracer");

        let mut command = Command::new(&self.settings.program);
        command
            .args(&args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = SupervisorState::Stopped(ExitReason::Failed(e.to_string()));
                return Err(MonitorError::TracerUnavailable {
                    program: self.settings.program.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let Some(pid) = child.id() else {
            self.state = SupervisorState::Stopped(ExitReason::Failed(
                "process exited before it could be observed".to_owned(),
            ));
            return Err(MonitorError::TracerUnavailable {
                program: self.settings.program.clone(),
                reason: "process exited before it could be observed".to_owned(),
            });
        };

        info!(pid, "tracer running");
        self.child = Some(child);
        self.pgid = Some(pid);
        self.log_path = Some(log_path.to_path_buf());
        self.state = SupervisorState::Running;
        Ok(pid)
    }

    /// 트레이서가 스스로 끝날 때까지 기다리고 회수합니다.
    ///
    /// 취소 안전합니다. 완료되면 상태는 `Draining`이 됩니다.
    pub async fn wait(&mut self) -> Result<ExitReason, MonitorError> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }
        let Some(child) = self.child.as_mut() else {
            return Err(MonitorError::Channel("tracer was never started".to_owned()));
        };

        let status = child.wait().await?;
        let reason = ExitReason::from_status(status);
        info!(pid = ?self.pgid, exit = %reason, "tracer exited");

        self.child = None;
        self.exit = Some(reason.clone());
        self.state = SupervisorState::Draining;
        Ok(reason)
    }

    /// 프로세스 그룹 전체를 종료합니다.
    ///
    /// SIGTERM을 보낸 뒤 `grace` 동안 기다리고, 남은 프로세스가 있으면
    /// SIGKILL로 강제 종료한 다음 트레이서를 회수합니다.
    ///
    /// # Errors
    /// 유예 시간 안에 트레이서를 회수하지 못하면 [`MonitorError::TerminationFailure`].
    /// 이 경우에도 상태는 `Draining`으로 넘어갑니다.
    pub async fn terminate(&mut self, grace: Duration) -> Result<(), MonitorError> {
        let Some(pgid) = self.pgid else {
            return Ok(());
        };
        if self.exit.is_some() && !group_alive(pgid) {
            return Ok(());
        }

        self.state = SupervisorState::Draining;
        info!(pid = pgid, grace_ms = grace.as_millis() as u64, "terminating process group");

        if let Err(e) = signal_group(pgid, Signal::Term) {
            debug!(pid = pgid, error = %e, "SIGTERM delivery failed");
        }

        let deadline = tokio::time::Instant::now() + grace;
        let leader_reaped = match self.child.as_mut() {
            Some(child) => tokio::time::timeout_at(deadline, child.wait()).await.is_ok(),
            None => true,
        };
        if leader_reaped {
            self.child = None;
            // 리더가 먼저 끝나도 자손이 남아 있을 수 있음
            while group_alive(pgid) && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(GROUP_POLL_INTERVAL).await;
            }
        }

        if !leader_reaped || group_alive(pgid) {
            warn!(pid = pgid, "process group survived SIGTERM, sending SIGKILL");
            if let Err(e) = signal_group(pgid, Signal::Kill) {
                debug!(pid = pgid, error = %e, "SIGKILL delivery failed");
            }
        }

        if let Some(child) = self.child.as_mut() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(_) => self.child = None,
                Err(_) => {
                    let _ = child.start_kill();
                    metrics::counter!(m::MONITOR_TERMINATIONS_TOTAL, m::LABEL_RESULT => "failed")
                        .increment(1);
                    self.exit = Some(ExitReason::Killed);
                    return Err(MonitorError::TerminationFailure {
                        pid: pgid,
                        reason: format!("tracer not reaped within {}ms after SIGKILL", grace.as_millis()),
                    });
                }
            }
        }

        metrics::counter!(m::MONITOR_TERMINATIONS_TOTAL, m::LABEL_RESULT => "ok").increment(1);
        // 스스로 끝난 뒤 남은 자손만 정리한 경우에는 원래 종료 사유를 유지
        self.exit.get_or_insert(ExitReason::Killed);
        Ok(())
    }

    /// 출력 드레인을 마치고 `Stopped`로 전이합니다.
    pub fn finish(&mut self) -> ExitReason {
        let reason = match &self.state {
            SupervisorState::Stopped(reason) => reason.clone(),
            _ => self
                .exit
                .clone()
                .unwrap_or_else(|| ExitReason::Failed("tracer was never reaped".to_owned())),
        };
        self.state = SupervisorState::Stopped(reason.clone());
        reason
    }

    /// 실행 중인 트레이서 출력을 따라가는 수집기를 만듭니다.
    pub fn follow_output(&self, config: LogTailConfig) -> Option<LogTail> {
        self.log_path
            .as_ref()
            .map(|path| LogTail::new(path.clone(), config))
    }

    /// 종료된 트레이서의 전체 출력을 라인 단위로 읽습니다.
    pub async fn collect_output(&self) -> Result<Vec<String>, MonitorError> {
        match &self.log_path {
            Some(path) => match crate::collector::read_lines(path).await {
                Ok(lines) => Ok(lines),
                Err(MonitorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "tracer produced no output file");
                    Ok(Vec::new())
                }
                Err(e) => Err(e),
            },
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for TracerSupervisor {
    fn drop(&mut self) {
        // 에러 경로에서도 프로세스 그룹을 남기지 않음
        if let (Some(pgid), Some(_)) = (self.pgid, self.child.as_ref()) {
            let _ = signal_group(pgid, Signal::Kill);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: Signal) -> std::io::Result<()> {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: killpg는 메모리를 건드리지 않으며 실패는 반환값으로만 알립니다.
    let rc = unsafe { libc::killpg(pgid, sig) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: Signal) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process groups are not supported on this platform",
    ))
}

/// 프로세스 그룹에 아직 멤버가 있는지 확인합니다.
#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    // SAFETY: 시그널 0은 존재 여부만 확인합니다.
    unsafe { libc::killpg(pgid, 0) == 0 }
}

#[cfg(not(unix))]
fn group_alive(_pgid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> TracerSettings {
        TracerSettings::custom(
            "/bin/sh",
            vec![
                "-c".to_owned(),
                script.to_owned(),
                "fake-tracer".to_owned(),
                "{log}".to_owned(),
                "{script}".to_owned(),
            ],
        )
    }

    #[tokio::test]
    async fn missing_tracer_is_unavailable() {
        let mut supervisor = TracerSupervisor::new(TracerSettings::custom(
            "/nonexistent/tracer-binary",
            vec!["{log}".to_owned()],
        ));
        let err = supervisor
            .start(Path::new("job.py"), &[], Path::new("/tmp/none.log"))
            .unwrap_err();
        assert!(matches!(err, MonitorError::TracerUnavailable { .. }));
        assert!(matches!(
            supervisor.state(),
            SupervisorState::Stopped(ExitReason::Failed(_))
        ));
    }

    #[tokio::test]
    async fn natural_exit_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.log");
        let mut supervisor = TracerSupervisor::new(sh(
            r#"echo 'openat(AT_FDCWD, "/etc/hosts", O_RDONLY) = 3' > "$1"; exit 3"#,
        ));
        supervisor.start(Path::new("job.py"), &[], &log).unwrap();
        assert_eq!(supervisor.state(), &SupervisorState::Running);

        let exit = supervisor.wait().await.unwrap();
        assert_eq!(exit, ExitReason::Exited(Some(3)));
        assert_eq!(supervisor.state(), &SupervisorState::Draining);

        let lines = supervisor.collect_output().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(supervisor.finish(), ExitReason::Exited(Some(3)));
        assert!(matches!(supervisor.state(), SupervisorState::Stopped(_)));
    }

    #[tokio::test]
    async fn env_and_script_path_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.log");
        let mut supervisor =
            TracerSupervisor::new(sh(r#"echo "$2 $SUPERVISOR_TEST_VAR" > "$1""#))
                .env("SUPERVISOR_TEST_VAR", "hello");
        supervisor.start(Path::new("job.py"), &[], &log).unwrap();
        supervisor.wait().await.unwrap();
        let lines = supervisor.collect_output().await.unwrap();
        assert_eq!(lines, ["job.py hello"]);
    }

    #[tokio::test]
    async fn terminate_kills_group_within_grace() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.log");
        let mut supervisor = TracerSupervisor::new(sh("sleep 30 & sleep 30; wait"));
        supervisor.start(Path::new("job.py"), &[], &log).unwrap();

        let started = std::time::Instant::now();
        supervisor
            .terminate(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(supervisor.finish(), ExitReason::Killed);
    }

    #[tokio::test]
    async fn sigterm_ignoring_group_is_force_killed() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.log");
        let mut supervisor = TracerSupervisor::new(sh("trap '' TERM; sleep 30; sleep 30"));
        supervisor.start(Path::new("job.py"), &[], &log).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        supervisor
            .terminate(Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(supervisor.finish(), ExitReason::Killed);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.log");
        let mut supervisor = TracerSupervisor::new(sh("exit 0"));
        supervisor.start(Path::new("a"), &[], &log).unwrap();
        assert!(supervisor.start(Path::new("a"), &[], &log).is_err());
        supervisor.wait().await.unwrap();
    }
}
