//! 규칙 매칭 로직 -- 조건 평가 및 정규식 캐싱
//!
//! [`RuleMatcher`]는 규칙의 이름/인자 조건을 [`Event`]에 대해 평가합니다.
//! 정규식 패턴은 규칙 추가 시 한 번만 컴파일하여 캐싱합니다.

use std::collections::HashMap;

use regex::Regex;

use tracewarden_core::event::{Event, unquote_arg};

use super::types::{ArgCondition, ArgModifier, NamePattern, Rule};
use crate::error::MonitorError;

/// 정규식 캐시 키: (rule_id, 위치)
type RegexKey = (String, RegexSlot);

/// 규칙 안에서 정규식의 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RegexSlot {
    /// 이름 조건의 정규식
    Name,
    /// 인자 조건의 정규식: (condition_index, value_index)
    Arg(usize, usize),
}

/// 규칙 매처 -- 조건 평가 및 정규식 캐싱
///
/// 규칙 추가 시 정규식을 미리 컴파일하여 매칭 시 재컴파일 오버헤드를 제거합니다.
#[derive(Debug, Default)]
pub struct RuleMatcher {
    regex_cache: HashMap<RegexKey, Regex>,
}

impl RuleMatcher {
    /// 새 매처를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 규칙의 정규식 조건을 미리 컴파일합니다.
    ///
    /// 규칙 추가 시 호출하여 정규식 패턴의 유효성을 검증하고 캐싱합니다.
    pub fn compile_rule(&mut self, rule: &Rule) -> Result<(), MonitorError> {
        if let Some(pattern) = &rule.name.regex {
            let regex = Regex::new(pattern).map_err(|e| MonitorError::RuleValidation {
                rule_id: rule.id.clone(),
                reason: format!("invalid name regex: {e}"),
            })?;
            self.regex_cache
                .insert((rule.id.clone(), RegexSlot::Name), regex);
        }

        for (cond_idx, condition) in rule.args.iter().enumerate() {
            if condition.modifier != ArgModifier::Regex {
                continue;
            }
            for (value_idx, pattern) in condition.values.iter().enumerate() {
                let regex = Regex::new(pattern).map_err(|e| MonitorError::RuleValidation {
                    rule_id: rule.id.clone(),
                    reason: format!("invalid regex in args[{cond_idx}].values[{value_idx}]: {e}"),
                })?;
                self.regex_cache
                    .insert((rule.id.clone(), RegexSlot::Arg(cond_idx, value_idx)), regex);
            }
        }
        Ok(())
    }

    /// 규칙 제거 시 캐시를 정리합니다.
    pub fn remove_rule(&mut self, rule_id: &str) {
        self.regex_cache.retain(|(id, _), _| id != rule_id);
    }

    /// 규칙이 이벤트에 매칭되는지 평가합니다.
    ///
    /// 출처, 이름, 모든 인자 조건이 AND 결합으로 평가됩니다.
    pub fn matches(&self, rule: &Rule, event: &Event) -> Result<bool, MonitorError> {
        if let Some(source) = rule.source {
            if source != event.source {
                return Ok(false);
            }
        }

        if !self.name_matches(rule, &rule.name, &event.name)? {
            return Ok(false);
        }

        for (cond_idx, condition) in rule.args.iter().enumerate() {
            if !self.arg_condition_matches(rule, cond_idx, condition, event)? {
                return Ok(false); // AND 로직: 하나라도 실패하면 전체 실패
            }
        }

        Ok(true)
    }

    fn name_matches(
        &self,
        rule: &Rule,
        pattern: &NamePattern,
        name: &str,
    ) -> Result<bool, MonitorError> {
        if pattern.is_wildcard() {
            return Ok(true);
        }

        if pattern.exact.iter().any(|n| n == name) {
            return Ok(true);
        }
        if pattern.prefix.iter().any(|p| name.starts_with(p.as_str())) {
            return Ok(true);
        }
        if pattern.module.iter().any(|m| is_module_member(name, m)) {
            return Ok(true);
        }
        if pattern.regex.is_some() {
            let regex = self.cached(rule, RegexSlot::Name)?;
            return Ok(regex.is_match(name));
        }
        Ok(false)
    }

    fn arg_condition_matches(
        &self,
        rule: &Rule,
        cond_idx: usize,
        condition: &ArgCondition,
        event: &Event,
    ) -> Result<bool, MonitorError> {
        match condition.index {
            Some(idx) => match event.args.get(idx) {
                Some(arg) => self.value_matches(rule, cond_idx, condition, &unquote_arg(arg)),
                None => Ok(false), // 인자가 없으면 매칭 실패
            },
            None => {
                for arg in event.unquoted_args() {
                    if self.value_matches(rule, cond_idx, condition, &arg)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// 단일 인자 값에 대해 조건을 평가합니다.
    fn value_matches(
        &self,
        rule: &Rule,
        cond_idx: usize,
        condition: &ArgCondition,
        arg: &str,
    ) -> Result<bool, MonitorError> {
        let values = &condition.values;
        let matched = match condition.modifier {
            ArgModifier::Contains => values.iter().any(|v| arg.contains(v.as_str())),
            ArgModifier::Exact => values.iter().any(|v| arg == v),
            ArgModifier::StartsWith => values.iter().any(|v| arg.starts_with(v.as_str())),
            ArgModifier::EndsWith => values.iter().any(|v| arg.ends_with(v.as_str())),
            ArgModifier::Module => values.iter().any(|v| is_module_member(arg, v)),
            ArgModifier::FlagsAll => {
                let flags: Vec<&str> = split_flags(arg).collect();
                values.iter().all(|v| flags.contains(&v.as_str()))
            }
            ArgModifier::FlagsAny => split_flags(arg).any(|f| values.iter().any(|v| v == f)),
            ArgModifier::Regex => {
                for value_idx in 0..values.len() {
                    let regex = self.cached(rule, RegexSlot::Arg(cond_idx, value_idx))?;
                    if regex.is_match(arg) {
                        return Ok(true);
                    }
                }
                false
            }
        };
        Ok(matched)
    }

    fn cached(&self, rule: &Rule, slot: RegexSlot) -> Result<&Regex, MonitorError> {
        self.regex_cache
            .get(&(rule.id.clone(), slot))
            .ok_or_else(|| MonitorError::RuleValidation {
                rule_id: rule.id.clone(),
                reason: format!("regex not compiled for {slot:?}"),
            })
    }
}

/// `name`이 모듈 `module` 자체이거나 그 하위 속성인지 확인합니다.
fn is_module_member(name: &str, module: &str) -> bool {
    name == module
        || name
            .strip_prefix(module)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn split_flags(arg: &str) -> impl Iterator<Item = &str> {
    arg.split('|').map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use super::*;
    use tracewarden_core::types::{EventSource, Severity};

    fn rule(name: NamePattern, args: Vec<ArgCondition>) -> Rule {
        Rule {
            id: "test".to_owned(),
            label: "Test".to_owned(),
            description: String::new(),
            severity: Severity::High,
            status: RuleStatus::Enabled,
            source: None,
            name,
            args,
            tags: Vec::new(),
        }
    }

    fn openat(path: &str, flags: &str) -> Event {
        let raw = format!("openat(AT_FDCWD, \"{path}\", {flags}) = 3");
        Event::tracer(
            "openat",
            vec![
                "AT_FDCWD".to_owned(),
                format!("\"{path}\""),
                flags.to_owned(),
            ],
            raw,
        )
    }

    fn compiled(rule: &Rule) -> RuleMatcher {
        let mut matcher = RuleMatcher::new();
        matcher.compile_rule(rule).unwrap();
        matcher
    }

    #[test]
    fn exact_name_matches() {
        let r = rule(NamePattern::exact(&["openat", "open"]), vec![]);
        let m = compiled(&r);
        assert!(m.matches(&r, &openat("/x", "O_RDONLY")).unwrap());
        let other = Event::tracer("stat", vec![], "stat(...) = 0");
        assert!(!m.matches(&r, &other).unwrap());
    }

    #[test]
    fn source_filter_excludes_other_source() {
        let mut r = rule(NamePattern::exact(&["open"]), vec![]);
        r.source = Some(EventSource::Tracer);
        let m = compiled(&r);
        let runtime = Event::runtime("open", vec!["/etc/shadow".to_owned()]);
        assert!(!m.matches(&r, &runtime).unwrap());
    }

    #[test]
    fn contains_checks_unquoted_path() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::Contains, &["/etc/shadow"])],
        );
        let m = compiled(&r);
        assert!(m.matches(&r, &openat("/etc/shadow", "O_RDONLY")).unwrap());
        assert!(!m.matches(&r, &openat("/etc/hostname", "O_RDONLY")).unwrap());
    }

    #[test]
    fn starts_with_uses_unquoted_value() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::StartsWith, &["/tmp/"])],
        );
        let m = compiled(&r);
        assert!(m.matches(&r, &openat("/tmp/payload.sh", "O_RDONLY")).unwrap());
        assert!(!m.matches(&r, &openat("/var/tmpx/a", "O_RDONLY")).unwrap());
    }

    #[test]
    fn indexed_condition_only_inspects_that_arg() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::at(0, ArgModifier::Exact, &["/etc/shadow"])],
        );
        let m = compiled(&r);
        // 경로는 index 1에 있으므로 매칭되지 않음
        assert!(!m.matches(&r, &openat("/etc/shadow", "O_RDONLY")).unwrap());
    }

    #[test]
    fn indexed_condition_missing_arg_fails() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::at(9, ArgModifier::Contains, &["x"])],
        );
        let m = compiled(&r);
        assert!(!m.matches(&r, &openat("/x", "O_RDONLY")).unwrap());
    }

    #[test]
    fn flags_all_requires_every_flag() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::FlagsAll, &["O_CREAT", "O_WRONLY"])],
        );
        let m = compiled(&r);
        assert!(
            m.matches(&r, &openat("/tmp/a", "O_WRONLY|O_CREAT|O_TRUNC"))
                .unwrap()
        );
        assert!(!m.matches(&r, &openat("/tmp/a", "O_WRONLY|O_TRUNC")).unwrap());
    }

    #[test]
    fn flags_any_requires_one_flag() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::FlagsAny, &["O_WRONLY", "O_RDWR"])],
        );
        let m = compiled(&r);
        assert!(m.matches(&r, &openat("/a", "O_RDWR|O_CLOEXEC")).unwrap());
        assert!(!m.matches(&r, &openat("/a", "O_RDONLY|O_CLOEXEC")).unwrap());
    }

    #[test]
    fn module_name_matches_attribute_access() {
        let r = rule(NamePattern::module(&["os"]), vec![]);
        let m = compiled(&r);
        assert!(m.matches(&r, &Event::runtime("os.system", vec![])).unwrap());
        assert!(m.matches(&r, &Event::runtime("os", vec![])).unwrap());
        assert!(!m.matches(&r, &Event::runtime("ossaudiodev.open", vec![])).unwrap());
    }

    #[test]
    fn module_arg_matches_import_target() {
        let r = rule(
            NamePattern::exact(&["import"]),
            vec![ArgCondition::at(0, ArgModifier::Module, &["pickle"])],
        );
        let m = compiled(&r);
        let hit = Event::runtime("import", vec!["pickle".to_owned()]);
        let sub = Event::runtime("import", vec!["pickle.tools".to_owned()]);
        let miss = Event::runtime("import", vec!["pickletools".to_owned()]);
        assert!(m.matches(&r, &hit).unwrap());
        assert!(m.matches(&r, &sub).unwrap());
        assert!(!m.matches(&r, &miss).unwrap());
    }

    #[test]
    fn regex_name_and_arg() {
        let r = rule(
            NamePattern {
                regex: Some("^exec(ve|veat)$".to_owned()),
                ..NamePattern::default()
            },
            vec![ArgCondition::at(0, ArgModifier::Regex, &[r"/(curl|wget)$"])],
        );
        let m = compiled(&r);
        let hit = Event::tracer(
            "execve",
            vec!["\"/usr/bin/curl\"".to_owned()],
            "execve(\"/usr/bin/curl\", ...) = 0",
        );
        assert!(m.matches(&r, &hit).unwrap());
    }

    #[test]
    fn invalid_regex_rejected_at_compile() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::Regex, &["[unclosed"])],
        );
        let mut m = RuleMatcher::new();
        assert!(m.compile_rule(&r).is_err());
    }

    #[test]
    fn uncompiled_regex_reports_error() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::Regex, &["x"])],
        );
        let m = RuleMatcher::new();
        assert!(m.matches(&r, &openat("/x", "O_RDONLY")).is_err());
    }

    #[test]
    fn remove_rule_clears_cache() {
        let r = rule(
            NamePattern::default(),
            vec![ArgCondition::any_arg(ArgModifier::Regex, &["x"])],
        );
        let mut m = compiled(&r);
        m.remove_rule("test");
        assert!(m.matches(&r, &openat("/x", "O_RDONLY")).is_err());
    }
}
