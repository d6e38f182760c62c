#![no_main]

use libfuzzer_sys::fuzz_target;
use tracewarden_monitor::parser::{StraceParser, TraceDecoder, split_args};

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);

    // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
    let _ = StraceParser::new().parse(&line);
    let _ = split_args(&line);

    // 디코더는 모든 라인을 정확히 한 번씩 세어야 한다
    let mut decoder = TraceDecoder::new();
    for l in line.lines() {
        let _ = decoder.decode(l);
    }
    let stats = decoder.stats();
    assert_eq!(stats.lines, stats.parsed + stats.ignored + stats.failures);
});
