#![no_main]

use libfuzzer_sys::fuzz_target;
use tracewarden_monitor::parser::AuditRecord;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(record) = AuditRecord::parse(line) {
            let _ = record.into_event();
        }
    }
});
