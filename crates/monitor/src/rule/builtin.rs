//! 내장 분류 규칙 테이블
//!
//! 규칙은 아래 선언 순서대로 평가되며 처음 매칭된 규칙이 결과를 결정합니다.
//! 같은 이벤트에 여러 규칙이 걸릴 수 있는 경우 더 구체적인 규칙을 먼저 둡니다.
//!
//! | 순서 | ID | 심각도 |
//! |------|----|--------|
//! | 1 | `shell_command_exec` | Critical |
//! | 2 | `process_execution` | Critical |
//! | 3 | `log_tampering` | High |
//! | 4 | `sensitive_file_write` | High |
//! | 5 | `sensitive_file_access` | High |
//! | 6 | `sensitive_file_open` | High |
//! | 7 | `temp_executable_create` | High |
//! | 8 | `temp_executable_creat` | High |
//! | 9 | `dns_connect` | Medium |
//! | 10 | `network_activity` | High |
//! | 11 | `mount_operation` | Medium |
//! | 12 | `namespace_probe` | Medium |
//! | 13 | `web_server_config_read` | Medium |
//! | 14 | `stdout_write` | Low |
//! | 15 | `runtime_audit_hook_tampering` | Critical |
//! | 16 | `runtime_subprocess` | Critical |
//! | 17 | `runtime_dynamic_code` | Critical |
//! | 18 | `runtime_deserialization` | Critical |
//! | 19 | `runtime_sensitive_open` | High |
//! | 20 | `runtime_network` | High |
//! | 21 | `runtime_dangerous_import` | Critical |
//! | 22 | `runtime_dangerous_module` | Critical |
//! | 23 | `runtime_high_risk_import` | High |
//! | 24 | `runtime_high_risk_module` | High |
//!
//! `sensitive_open_paths`는 열기 시스템 콜에서만 분류합니다. 동적 로더는 매 실행마다
//! `access("/etc/ld.so.preload")`로 존재를 확인합니다.
//! `stdout_write`는 트레이서 카테고리에 `desc`가 포함될 때만 발생합니다.

use tracewarden_core::config::RulesConfig;
use tracewarden_core::types::{EventSource, Severity};

use super::types::{ArgCondition, ArgModifier, NamePattern, Rule, RuleStatus};

/// 트레이서 관점의 프로그램 실행 시스템 콜
pub const EXEC_SYSCALLS: &[&str] = &["execve", "execveat"];

/// 트레이서 관점의 프로세스 생성/실행 시스템 콜
const PROCESS_SYSCALLS: &[&str] = &["execve", "execveat", "fork", "vfork", "clone", "clone3"];

/// 경로 인자를 받는 파일 열기/조회 시스템 콜
const PATH_SYSCALLS: &[&str] = &[
    "open",
    "openat",
    "openat2",
    "creat",
    "stat",
    "lstat",
    "newfstatat",
    "fstatat64",
    "statx",
    "access",
    "faccessat",
    "faccessat2",
    "readlink",
    "readlinkat",
];

/// 파일 열기 시스템 콜
const OPEN_SYSCALLS: &[&str] = &["open", "openat", "openat2"];

/// 셸 실행 파일
const SHELLS: &[&str] = &[
    "/bin/sh",
    "/bin/bash",
    "/bin/dash",
    "/usr/bin/sh",
    "/usr/bin/bash",
    "/usr/bin/dash",
];

/// 컨테이너/네임스페이스 환경 탐색 경로
const NAMESPACE_PROBE_PATHS: &[&str] = &["/proc/mounts", "/proc/self/mounts", "/proc/self/ns/"];

/// 웹 서버 설정 파일
const WEB_SERVER_CONFIGS: &[&str] = &["/etc/nginx/nginx.conf", "/etc/apache2/apache2.conf"];

/// DNS 포트로 향하는 소켓 주소 조각
const DNS_PORTS: &[&str] = &["sin_port=htons(53)", "sin6_port=htons(53)"];

/// 런타임 하위 프로세스 생성 이벤트
pub const RUNTIME_SUBPROCESS_EVENTS: &[&str] = &[
    "os.system",
    "os.exec",
    "os.posix_spawn",
    "os.spawn",
    "os.fork",
    "os.forkpty",
    "subprocess.Popen",
    "pty.spawn",
];

/// 런타임 동적 코드 실행 이벤트
const RUNTIME_DYNAMIC_CODE_EVENTS: &[&str] = &["exec", "eval", "compile"];

/// 런타임 역직렬화 이벤트
const RUNTIME_DESERIALIZATION_EVENTS: &[&str] =
    &["pickle.find_class", "marshal.load", "marshal.loads"];

/// 런타임 파일 열기 이벤트
const RUNTIME_OPEN_EVENTS: &[&str] = &["open", "os.open", "io.open"];

/// 런타임 네트워크 이벤트
const RUNTIME_NETWORK_EVENTS: &[&str] = &[
    "socket.connect",
    "socket.create_connection",
    "socket.bind",
    "socket.sendto",
    "socket.sendmsg",
    "urllib.Request",
];

/// 설정 데이터로 내장 규칙 테이블을 만듭니다.
pub fn default_rules(config: &RulesConfig) -> Vec<Rule> {
    let all_sensitive: Vec<&str> = config
        .sensitive_paths
        .iter()
        .chain(&config.sensitive_open_paths)
        .map(String::as_str)
        .collect();

    vec![
        rule(
            "shell_command_exec",
            "Shell command execution (subprocess)",
            Severity::Critical,
            Some(EventSource::Tracer),
            NamePattern::exact(EXEC_SYSCALLS),
            vec![
                ArgCondition::at(0, ArgModifier::Exact, SHELLS),
                ArgCondition::at(1, ArgModifier::Contains, &["\"-c\""]),
            ],
            &["process"],
        ),
        rule(
            "process_execution",
            "Process execution (subprocess spawn)",
            Severity::Critical,
            Some(EventSource::Tracer),
            NamePattern::exact(PROCESS_SYSCALLS),
            vec![],
            &["process"],
        ),
        rule(
            "log_tampering",
            "System log deletion or renaming",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(&[
                "unlink",
                "unlinkat",
                "rename",
                "renameat",
                "renameat2",
                "truncate",
            ]),
            vec![ArgCondition::any_arg(ArgModifier::StartsWith, &["/var/log/"])],
            &["file", "anti-forensics"],
        ),
        rule(
            "sensitive_file_write",
            "Sensitive file opened for writing",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(OPEN_SYSCALLS),
            vec![
                ArgCondition::any_arg(ArgModifier::Contains, &all_sensitive),
                ArgCondition::any_arg(ArgModifier::FlagsAny, &["O_WRONLY", "O_RDWR"]),
            ],
            &["file"],
        ),
        rule(
            "sensitive_file_access",
            "Sensitive file access",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(PATH_SYSCALLS),
            vec![ArgCondition::any_arg(
                ArgModifier::Contains,
                &config.sensitive_paths,
            )],
            &["file"],
        ),
        rule(
            "sensitive_file_open",
            "Sensitive file access",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(OPEN_SYSCALLS),
            vec![ArgCondition::any_arg(
                ArgModifier::Contains,
                &config.sensitive_open_paths,
            )],
            &["file"],
        ),
        rule(
            "temp_executable_create",
            "Executable file creation in temporary directory",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(OPEN_SYSCALLS),
            vec![
                ArgCondition::any_arg(ArgModifier::StartsWith, &config.temp_dirs),
                ArgCondition::any_arg(ArgModifier::FlagsAll, &["O_CREAT"]),
                ArgCondition::any_arg(ArgModifier::FlagsAny, &["O_WRONLY", "O_RDWR"]),
            ],
            &["file", "persistence"],
        ),
        rule(
            "temp_executable_creat",
            "Executable file creation in temporary directory",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(&["creat"]),
            vec![ArgCondition::at(
                0,
                ArgModifier::StartsWith,
                &config.temp_dirs,
            )],
            &["file", "persistence"],
        ),
        rule(
            "dns_connect",
            "DNS protocol use (possible covert channel)",
            Severity::Medium,
            Some(EventSource::Tracer),
            NamePattern::exact(&["connect", "sendto"]),
            vec![ArgCondition::any_arg(ArgModifier::Contains, DNS_PORTS)],
            &["network"],
        ),
        rule(
            "network_activity",
            "Network activity",
            Severity::High,
            Some(EventSource::Tracer),
            NamePattern::exact(&config.network_syscalls),
            vec![],
            &["network"],
        ),
        rule(
            "mount_operation",
            "Filesystem mount operation",
            Severity::Medium,
            Some(EventSource::Tracer),
            NamePattern::exact(&["mount", "umount", "umount2"]),
            vec![],
            &["file"],
        ),
        rule(
            "namespace_probe",
            "Container or namespace environment probing",
            Severity::Medium,
            Some(EventSource::Tracer),
            NamePattern::exact(OPEN_SYSCALLS),
            vec![ArgCondition::any_arg(
                ArgModifier::StartsWith,
                NAMESPACE_PROBE_PATHS,
            )],
            &["file", "container"],
        ),
        rule(
            "web_server_config_read",
            "Web server configuration read",
            Severity::Medium,
            Some(EventSource::Tracer),
            NamePattern::exact(OPEN_SYSCALLS),
            vec![ArgCondition::any_arg(ArgModifier::Exact, WEB_SERVER_CONFIGS)],
            &["file"],
        ),
        rule(
            "stdout_write",
            "Standard output write",
            Severity::Low,
            Some(EventSource::Tracer),
            NamePattern::exact(&["write"]),
            vec![ArgCondition::at(0, ArgModifier::Exact, &["1"])],
            &["output"],
        ),
        rule(
            "runtime_audit_hook_tampering",
            "Audit hook modification",
            Severity::Critical,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(&["sys.addaudithook"]),
            vec![],
            &["runtime", "anti-forensics"],
        ),
        rule(
            "runtime_subprocess",
            "Subprocess execution (runtime)",
            Severity::Critical,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(RUNTIME_SUBPROCESS_EVENTS),
            vec![],
            &["process", "runtime"],
        ),
        rule(
            "runtime_dynamic_code",
            "Dynamic code execution",
            Severity::Critical,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(RUNTIME_DYNAMIC_CODE_EVENTS),
            vec![],
            &["runtime"],
        ),
        rule(
            "runtime_deserialization",
            "Unsafe deserialization",
            Severity::Critical,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(RUNTIME_DESERIALIZATION_EVENTS),
            vec![],
            &["runtime"],
        ),
        rule(
            "runtime_sensitive_open",
            "Sensitive file access (runtime)",
            Severity::High,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(RUNTIME_OPEN_EVENTS),
            vec![ArgCondition::any_arg(ArgModifier::Contains, &all_sensitive)],
            &["file", "runtime"],
        ),
        rule(
            "runtime_network",
            "Network activity (runtime)",
            Severity::High,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(RUNTIME_NETWORK_EVENTS),
            vec![],
            &["network", "runtime"],
        ),
        rule(
            "runtime_dangerous_import",
            "Dangerous module import",
            Severity::Critical,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(&["import"]),
            vec![ArgCondition::at(
                0,
                ArgModifier::Module,
                &config.dangerous_modules,
            )],
            &["runtime"],
        ),
        rule(
            "runtime_dangerous_module",
            "Dangerous module use",
            Severity::Critical,
            Some(EventSource::RuntimeHook),
            NamePattern::module(&config.dangerous_modules),
            vec![],
            &["runtime"],
        ),
        rule(
            "runtime_high_risk_import",
            "High-risk module import",
            Severity::High,
            Some(EventSource::RuntimeHook),
            NamePattern::exact(&["import"]),
            vec![ArgCondition::at(
                0,
                ArgModifier::Module,
                &config.high_risk_modules,
            )],
            &["runtime"],
        ),
        rule(
            "runtime_high_risk_module",
            "High-risk module use",
            Severity::High,
            Some(EventSource::RuntimeHook),
            NamePattern::module(&config.high_risk_modules),
            vec![],
            &["runtime"],
        ),
    ]
    .into_iter()
    .filter(|rule| !has_empty_data_list(rule))
    .collect()
}

/// 설정 목록이 비어 조건을 만족할 수 없는 규칙인지 확인합니다.
///
/// 빈 목록으로 만든 규칙은 검증에 실패하거나(인자 조건) 모든 이름에
/// 매칭되므로(이름 조건) 테이블에서 제외합니다.
fn has_empty_data_list(rule: &Rule) -> bool {
    rule.name.is_wildcard() || rule.args.iter().any(|c| c.values.is_empty())
}

fn rule(
    id: &str,
    label: &str,
    severity: Severity,
    source: Option<EventSource>,
    name: NamePattern,
    args: Vec<ArgCondition>,
    tags: &[&str],
) -> Rule {
    Rule {
        id: id.to_owned(),
        label: label.to_owned(),
        description: String::new(),
        severity,
        status: RuleStatus::Enabled,
        source,
        name,
        args,
        tags: tags.iter().map(|t| (*t).to_owned()).collect(),
    }
}
