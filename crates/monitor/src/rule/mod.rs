//! 분류 규칙 엔진 -- 순서가 고정된 규칙 테이블과 첫 매칭 우선 분류
//!
//! 내장 규칙 테이블([`builtin`])을 먼저 두고, 규칙 디렉토리의 YAML 규칙을
//! 그 뒤에 덧붙입니다. 이벤트 하나에 여러 규칙이 매칭될 수 있어도
//! 가장 먼저 선언된 규칙 하나만 [`Finding`]을 만듭니다.
//!
//! # 아키텍처
//! - [`RuleSet`]: 순서 있는 규칙 목록 및 분류 코디네이터
//! - [`builtin`]: 설정 데이터로 만드는 내장 규칙 테이블
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`matcher`]: 조건 매칭 로직 (exact, contains, flags, regex 등)
//! - [`types`]: 규칙 데이터 구조 정의

pub mod builtin;
pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::RuleMatcher;
pub use types::{ArgCondition, ArgModifier, NamePattern, Rule, RuleStatus};

use std::path::Path;

use tracewarden_core::config::RulesConfig;
use tracewarden_core::event::{Event, Finding};
use tracewarden_core::pipeline::Classifier;

use crate::error::MonitorError;

/// 규칙 집합 -- 선언 순서대로 평가되는 분류기
///
/// # 사용 예시
/// ```ignore
/// let mut rules = RuleSet::builtin(&config.rules)?;
/// rules.load_rules_from_dir("/etc/tracewarden/rules").await?;
///
/// if let Some(finding) = rules.classify(&event) {
///     println!("{finding}");
/// }
/// ```
#[derive(Debug, Default)]
pub struct RuleSet {
    /// 평가 순서대로 정렬된 규칙
    rules: Vec<Rule>,
    /// 컴파일된 매처
    matcher: RuleMatcher,
}

impl RuleSet {
    /// 빈 규칙 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 규칙 테이블로 규칙 집합을 생성합니다.
    pub fn builtin(config: &RulesConfig) -> Result<Self, MonitorError> {
        Self::from_rules(builtin::default_rules(config))
    }

    /// 주어진 순서 그대로 규칙 집합을 생성합니다.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Result<Self, MonitorError> {
        let mut set = Self::new();
        for rule in rules {
            set.add_rule(rule)?;
        }
        Ok(set)
    }

    /// 설정에 따라 내장 규칙과 규칙 디렉토리의 규칙을 모두 담은 집합을 만듭니다.
    pub async fn from_config(config: &RulesConfig) -> Result<Self, MonitorError> {
        let mut set = Self::builtin(config)?;
        if !config.rule_dir.is_empty() {
            set.load_rules_from_dir(&config.rule_dir).await?;
        }
        Ok(set)
    }

    /// 규칙을 테이블 끝에 추가합니다 (가장 낮은 우선순위).
    ///
    /// # Errors
    /// 유효성 검증 실패, 정규식 컴파일 실패, 이미 존재하는 ID
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), MonitorError> {
        rule.validate()?;
        if self.get(&rule.id).is_some() {
            return Err(MonitorError::RuleValidation {
                rule_id: rule.id.clone(),
                reason: "duplicate rule id".to_owned(),
            });
        }
        self.matcher.compile_rule(&rule)?;
        self.rules.push(rule);
        Ok(())
    }

    /// 디렉토리에서 YAML 규칙을 로드해 테이블 끝에 추가합니다.
    ///
    /// 내장 규칙과 ID가 겹치는 규칙은 경고 후 건너뜁니다.
    /// 추가된 규칙 수를 반환합니다.
    pub async fn load_rules_from_dir(
        &mut self,
        dir: impl AsRef<Path>,
    ) -> Result<usize, MonitorError> {
        let rules = RuleLoader::load_directory(dir).await?;
        let mut added = 0;
        for rule in rules {
            let rule_id = rule.id.clone();
            match self.add_rule(rule) {
                Ok(()) => added += 1,
                Err(e) => {
                    tracing::warn!(rule_id = %rule_id, error = %e, "skipping custom rule");
                }
            }
        }
        Ok(added)
    }

    /// 규칙을 제거합니다.
    pub fn remove_rule(&mut self, rule_id: &str) -> Option<Rule> {
        let pos = self.rules.iter().position(|r| r.id == rule_id)?;
        self.matcher.remove_rule(rule_id);
        Some(self.rules.remove(pos))
    }

    /// ID로 규칙을 찾습니다.
    pub fn get(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    /// 평가 순서대로 규칙을 돌려줍니다.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 이벤트에 처음 매칭되는 활성 규칙을 찾습니다.
    pub fn first_match(&self, event: &Event) -> Option<&Rule> {
        self.rules.iter().filter(|r| r.is_enabled()).find(|rule| {
            match self.matcher.matches(rule, event) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "rule evaluation failed");
                    false
                }
            }
        })
    }
}

impl Classifier for RuleSet {
    fn name(&self) -> &str {
        "rule-set"
    }

    fn classify(&self, event: &Event) -> Option<Finding> {
        self.first_match(event).map(|rule| {
            Finding::new(event.clone(), rule.severity, rule.label.clone(), rule.id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewarden_core::types::{EventSource, Severity};

    fn builtin() -> RuleSet {
        RuleSet::builtin(&RulesConfig::default()).unwrap()
    }

    fn tracer(name: &str, args: &[&str]) -> Event {
        let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        let raw = format!("{name}({}) = 0", args.join(", "));
        Event::tracer(name, args, raw)
    }

    fn runtime(name: &str, args: &[&str]) -> Event {
        Event::runtime(name, args.iter().map(|a| (*a).to_owned()).collect())
    }

    fn custom(id: &str, severity: Severity, name: &str) -> Rule {
        Rule {
            id: id.to_owned(),
            label: id.to_owned(),
            description: String::new(),
            severity,
            status: RuleStatus::Enabled,
            source: None,
            name: NamePattern::exact(&[name]),
            args: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn shell_exec_is_critical() {
        let event = tracer(
            "execve",
            &["\"/bin/sh\"", "[\"sh\", \"-c\", \"id\"]", "0x7ffd /* 20 vars */"],
        );
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.rule_id, "shell_command_exec");
        assert!(finding.label.contains("subprocess"));
    }

    #[test]
    fn plain_exec_is_process_execution() {
        let event = tracer("execve", &["\"/usr/bin/id\"", "[\"id\"]", "0x7ffd"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.rule_id, "process_execution");
    }

    #[test]
    fn sensitive_read_is_high() {
        let event = tracer("openat", &["AT_FDCWD", "\"/etc/shadow\"", "O_RDONLY|O_CLOEXEC"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.rule_id, "sensitive_file_access");
    }

    #[test]
    fn sensitive_write_precedes_access() {
        let event = tracer("openat", &["AT_FDCWD", "\"/etc/passwd\"", "O_WRONLY|O_APPEND"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "sensitive_file_write");
    }

    #[test]
    fn sensitive_path_matching_is_case_sensitive() {
        let event = tracer("openat", &["AT_FDCWD", "\"/ETC/SHADOW\"", "O_RDONLY"]);
        assert!(builtin().classify(&event).is_none());
    }

    #[test]
    fn sensitive_path_matches_as_substring() {
        let backup = tracer("openat", &["AT_FDCWD", "\"/etc/shadow-\"", "O_RDONLY"]);
        assert!(builtin().classify(&backup).is_some());
        let chroot = tracer("stat", &["\"/srv/jail/etc/shadow\"", "0x7ffd"]);
        assert!(builtin().classify(&chroot).is_some());
    }

    #[test]
    fn temp_file_with_create_write_is_high() {
        let event = tracer(
            "openat",
            &["AT_FDCWD", "\"/tmp/payload.sh\"", "O_WRONLY|O_CREAT|O_TRUNC", "0755"],
        );
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "temp_executable_create");
        assert_eq!(finding.severity, Severity::High);
    }

    #[test]
    fn temp_prefix_is_a_directory_boundary() {
        let event = tracer(
            "openat",
            &["AT_FDCWD", "\"/var/tmpx/payload\"", "O_WRONLY|O_CREAT", "0644"],
        );
        assert!(builtin().classify(&event).is_none());
    }

    #[test]
    fn temp_file_read_only_is_ignored() {
        let event = tracer("openat", &["AT_FDCWD", "\"/tmp/data.txt\"", "O_RDONLY"]);
        assert!(builtin().classify(&event).is_none());
    }

    #[test]
    fn non_temp_read_only_is_ignored() {
        let event = tracer("openat", &["AT_FDCWD", "\"/usr/lib/libc.so.6\"", "O_RDONLY|O_CLOEXEC"]);
        assert!(builtin().classify(&event).is_none());
    }

    #[test]
    fn creat_in_temp_is_high() {
        let event = tracer("creat", &["\"/dev/shm/x\"", "0755"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "temp_executable_creat");
    }

    #[test]
    fn network_syscall_is_high() {
        let event = tracer(
            "connect",
            &["3", "{sa_family=AF_INET, sin_port=htons(80)}", "16"],
        );
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.rule_id, "network_activity");
    }

    #[test]
    fn loader_preload_probe_is_not_a_finding() {
        let probe = tracer("access", &["\"/etc/ld.so.preload\"", "R_OK"]);
        assert!(builtin().classify(&probe).is_none());
        let lookup = tracer("newfstatat", &["AT_FDCWD", "\"/etc/ld.so.preload\"", "0x7ffd", "0"]);
        assert!(builtin().classify(&lookup).is_none());
    }

    #[test]
    fn sensitive_lookup_is_still_high() {
        let event = tracer("access", &["\"/etc/shadow\"", "R_OK"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "sensitive_file_access");
    }

    #[test]
    fn existing_preload_file_open_is_high() {
        let event = tracer("openat", &["AT_FDCWD", "\"/etc/ld.so.preload\"", "O_RDONLY|O_CLOEXEC"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "sensitive_file_open");
        assert_eq!(finding.severity, Severity::High);

        let write = tracer("openat", &["AT_FDCWD", "\"/etc/ld.so.preload\"", "O_WRONLY|O_TRUNC"]);
        assert_eq!(builtin().classify(&write).unwrap().rule_id, "sensitive_file_write");
    }

    #[test]
    fn dns_connect_is_medium() {
        let event = tracer(
            "connect",
            &["3", "{sa_family=AF_INET, sin_port=htons(53), sin_addr=inet_addr(\"8.8.8.8\")}", "16"],
        );
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "dns_connect");
        assert_eq!(finding.severity, Severity::Medium);

        let https = tracer("connect", &["3", "{sa_family=AF_INET, sin_port=htons(530)}", "16"]);
        assert_eq!(builtin().classify(&https).unwrap().rule_id, "network_activity");
    }

    #[test]
    fn namespace_probing_is_medium() {
        for path in ["\"/proc/mounts\"", "\"/proc/self/ns/mnt\""] {
            let event = tracer("openat", &["AT_FDCWD", path, "O_RDONLY|O_CLOEXEC"]);
            let finding = builtin().classify(&event).unwrap();
            assert_eq!(finding.rule_id, "namespace_probe");
            assert_eq!(finding.severity, Severity::Medium);
        }
        let other = tracer("openat", &["AT_FDCWD", "\"/proc/self/status\"", "O_RDONLY"]);
        assert!(builtin().classify(&other).is_none());
    }

    #[test]
    fn web_server_config_read_is_medium() {
        let event = tracer("openat", &["AT_FDCWD", "\"/etc/nginx/nginx.conf\"", "O_RDONLY"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "web_server_config_read");
        assert_eq!(finding.severity, Severity::Medium);
    }

    #[test]
    fn stdout_write_is_low() {
        let event = tracer("write", &["1", "\"hello\\n\"", "6"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "stdout_write");
        assert_eq!(finding.severity, Severity::Low);
        assert!(builtin().classify(&tracer("write", &["4", "\"x\"", "1"])).is_none());
    }

    #[test]
    fn runtime_audit_hook_addition_is_critical() {
        let finding = builtin()
            .classify(&runtime("sys.addaudithook", &[]))
            .unwrap();
        assert_eq!(finding.rule_id, "runtime_audit_hook_tampering");
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn log_tampering_is_high() {
        let event = tracer("unlinkat", &["AT_FDCWD", "\"/var/log/auth.log\"", "0"]);
        let finding = builtin().classify(&event).unwrap();
        assert_eq!(finding.rule_id, "log_tampering");
    }

    #[test]
    fn mount_is_medium() {
        let event = tracer("mount", &["\"none\"", "\"/mnt\"", "\"tmpfs\"", "0", "NULL"]);
        assert_eq!(builtin().classify(&event).unwrap().severity, Severity::Medium);
    }

    #[test]
    fn runtime_subprocess_is_critical() {
        let finding = builtin().classify(&runtime("os.system", &["id"])).unwrap();
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.rule_id, "runtime_subprocess");
    }

    #[test]
    fn runtime_dynamic_code_is_critical() {
        for name in ["exec", "eval", "compile"] {
            let finding = builtin().classify(&runtime(name, &["<code>"])).unwrap();
            assert_eq!(finding.rule_id, "runtime_dynamic_code");
        }
        let finding = builtin()
            .classify(&runtime("pickle.find_class", &["os", "system"]))
            .unwrap();
        assert_eq!(finding.rule_id, "runtime_deserialization");
    }

    #[test]
    fn runtime_imports_follow_module_lists() {
        let set = builtin();
        let dangerous = set.classify(&runtime("import", &["ctypes"])).unwrap();
        assert_eq!(dangerous.severity, Severity::Critical);
        let risky = set.classify(&runtime("import", &["requests"])).unwrap();
        assert_eq!(risky.severity, Severity::High);
        assert!(set.classify(&runtime("import", &["json"])).is_none());
    }

    #[test]
    fn runtime_open_of_sensitive_path_is_high() {
        let finding = builtin()
            .classify(&runtime("open", &["/etc/shadow", "r"]))
            .unwrap();
        assert_eq!(finding.rule_id, "runtime_sensitive_open");
        assert!(builtin().classify(&runtime("open", &["/home/u/a.txt", "r"])).is_none());
    }

    #[test]
    fn runtime_socket_connect_is_network_not_module_use() {
        let finding = builtin()
            .classify(&runtime("socket.connect", &["<socket>", "('1.2.3.4', 80)"]))
            .unwrap();
        assert_eq!(finding.rule_id, "runtime_network");
        assert_eq!(finding.event.source, EventSource::RuntimeHook);
    }

    #[test]
    fn tracer_rules_ignore_runtime_events() {
        // 런타임 "connect" 이벤트는 트레이서 네트워크 규칙 대상이 아님
        assert!(builtin().classify(&runtime("connect", &["3"])).is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let set = builtin();
        let event = tracer("openat", &["AT_FDCWD", "\"/etc/shadow\"", "O_RDONLY"]);
        let first = set.classify(&event);
        for _ in 0..10 {
            assert_eq!(set.classify(&event), first);
        }
    }

    #[test]
    fn earlier_declared_rule_wins() {
        let low_first = RuleSet::from_rules([
            custom("low", Severity::Low, "connect"),
            custom("high", Severity::High, "connect"),
        ])
        .unwrap();
        let high_first = RuleSet::from_rules([
            custom("high", Severity::High, "connect"),
            custom("low", Severity::Low, "connect"),
        ])
        .unwrap();
        let event = tracer("connect", &["3"]);
        assert_eq!(low_first.classify(&event).unwrap().severity, Severity::Low);
        assert_eq!(high_first.classify(&event).unwrap().severity, Severity::High);
    }

    #[test]
    fn custom_rules_follow_builtins() {
        let mut set = builtin();
        set.add_rule(custom("connect_low", Severity::Low, "connect"))
            .unwrap();
        let finding = set.classify(&tracer("connect", &["3"])).unwrap();
        assert_eq!(finding.rule_id, "network_activity");

        set.add_rule(custom("chmod_watch", Severity::Medium, "chmod"))
            .unwrap();
        let finding = set.classify(&tracer("chmod", &["\"/a\"", "0777"])).unwrap();
        assert_eq!(finding.rule_id, "chmod_watch");
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let mut rule = custom("off", Severity::High, "connect");
        rule.status = RuleStatus::Disabled;
        let set = RuleSet::from_rules([rule, custom("on", Severity::Low, "connect")]).unwrap();
        let finding = set.classify(&tracer("connect", &["3"])).unwrap();
        assert_eq!(finding.rule_id, "on");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut set = RuleSet::new();
        set.add_rule(custom("x", Severity::Low, "a")).unwrap();
        assert!(set.add_rule(custom("x", Severity::High, "b")).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_rule_keeps_order() {
        let mut set = RuleSet::from_rules([
            custom("a", Severity::Low, "a"),
            custom("b", Severity::Low, "b"),
            custom("c", Severity::Low, "c"),
        ])
        .unwrap();
        assert!(set.remove_rule("b").is_some());
        let ids: Vec<_> = set.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert!(set.remove_rule("missing").is_none());
    }

    #[tokio::test]
    async fn custom_rule_dir_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("chmod.yml"),
            "id: chmod_watch\nlabel: Permission change\nseverity: Medium\nname:\n  exact: [chmod, fchmodat]\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("dup.yml"),
            "id: network_activity\nlabel: Shadowing builtin\nseverity: Low\n",
        )
        .unwrap();

        let config = RulesConfig {
            rule_dir: dir.path().display().to_string(),
            ..RulesConfig::default()
        };
        let set = RuleSet::from_config(&config).await.unwrap();
        let builtin_len = builtin::default_rules(&RulesConfig::default()).len();
        assert_eq!(set.len(), builtin_len + 1);
        assert_eq!(set.rules().last().unwrap().id, "chmod_watch");
        assert_eq!(set.get("network_activity").unwrap().label, "Network activity");
    }
}
