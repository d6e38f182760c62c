#![no_main]

use libfuzzer_sys::fuzz_target;
use tracewarden_monitor::rule::{RuleLoader, RuleSet};

fuzz_target!(|data: &[u8]| {
    // YAML 파서는 &str을 받으므로 UTF-8 변환 필요
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(rule) = RuleLoader::parse_yaml(yaml_str, "fuzz-input.yml") {
            // 파싱된 규칙은 검증/컴파일 단계에서도 패닉하지 않아야 한다
            let _ = RuleSet::new().add_rule(rule);
        }
    }
});
