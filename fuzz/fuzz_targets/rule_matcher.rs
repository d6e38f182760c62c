#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use tracewarden_core::event::Event;
use tracewarden_core::types::Severity;
use tracewarden_monitor::rule::{
    ArgCondition, ArgModifier, NamePattern, Rule, RuleMatcher, RuleStatus,
};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 인자 조건 목록 (최대 8개로 제한)
    conditions: Vec<FuzzCondition>,
    name_regex: Option<String>,
    runtime: bool,
    /// 매칭 대상 이벤트
    event_name: String,
    event_args: Vec<String>,
}

#[derive(Arbitrary, Debug)]
struct FuzzCondition {
    index: Option<u8>,
    modifier: FuzzModifier,
    values: Vec<String>,
}

#[derive(Arbitrary, Debug)]
enum FuzzModifier {
    Contains,
    Exact,
    StartsWith,
    EndsWith,
    Regex,
    FlagsAll,
    FlagsAny,
    Module,
}

impl FuzzModifier {
    fn to_arg_modifier(&self) -> ArgModifier {
        match self {
            FuzzModifier::Contains => ArgModifier::Contains,
            FuzzModifier::Exact => ArgModifier::Exact,
            FuzzModifier::StartsWith => ArgModifier::StartsWith,
            FuzzModifier::EndsWith => ArgModifier::EndsWith,
            FuzzModifier::Regex => ArgModifier::Regex,
            FuzzModifier::FlagsAll => ArgModifier::FlagsAll,
            FuzzModifier::FlagsAny => ArgModifier::FlagsAny,
            FuzzModifier::Module => ArgModifier::Module,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    // 조건 수 제한 (성능)
    let args: Vec<ArgCondition> = input
        .conditions
        .iter()
        .take(8)
        .map(|c| ArgCondition {
            index: c.index.map(usize::from),
            modifier: c.modifier.to_arg_modifier(),
            values: c.values.iter().take(8).cloned().collect(),
        })
        .collect();

    let rule = Rule {
        id: "fuzz_rule".to_owned(),
        label: "Fuzz Rule".to_owned(),
        description: String::new(),
        severity: Severity::Info,
        status: RuleStatus::Enabled,
        source: None,
        name: NamePattern {
            regex: input.name_regex,
            ..NamePattern::default()
        },
        args,
        tags: Vec::new(),
    };

    let mut matcher = RuleMatcher::new();

    // compile_rule이 실패해도 크래시는 안 됨
    if matcher.compile_rule(&rule).is_err() {
        return;
    }

    let event = if input.runtime {
        Event::runtime(input.event_name, input.event_args)
    } else {
        let raw = format!("{}({})", input.event_name, input.event_args.join(", "));
        Event::tracer(input.event_name, input.event_args, raw)
    };

    // matches도 크래시 없이 Ok/Err 반환해야 함
    let _ = matcher.matches(&rule, &event);
});
