//! 트레이스 파서 벤치마크
//!
//! strace 라인 형태별 파싱 비용과 감사 레코드 파싱 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tracewarden_monitor::parser::{AuditRecord, StraceParser, TraceDecoder, split_args};

/// 짧은 시스템 콜
const SHORT: &str = "close(3) = 0";

/// pid와 -ttt 타임스탬프가 붙은 파일 열기
const OPENAT: &str = r#"4821 1700000000.123456 openat(AT_FDCWD, "/etc/ld.so.cache", O_RDONLY|O_CLOEXEC) = 3"#;

/// 구조체와 주석이 있는 긴 execve
const EXECVE: &str = r#"[pid  4822] 1700000000.223456 execve("/usr/bin/python3", ["python3", "-c", "import os; os.system('id')", "--flag=value", "--another"], 0x7ffd5a1c8e40 /* 24 vars */) = 0"#;

/// 잘린 문자열이 있는 write
const TRUNCATED: &str = r#"write(1, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"..., 4096) = 4096"#;

/// 무시되는 종료 라인
const EXITED: &str = "+++ exited with 0 +++";

/// 감사 레코드
const AUDIT: &str = r#"{"event":"subprocess.Popen","args":["/bin/ls",["ls","-l"],null,-1],"kwargs":{"shell":false},"ts":1700000000.5,"pid":4821}"#;

fn bench_line_shapes(c: &mut Criterion) {
    let parser = StraceParser::new();
    let mut group = c.benchmark_group("strace_line");
    group.throughput(Throughput::Elements(1));

    for (name, line) in [
        ("short", SHORT),
        ("openat", OPENAT),
        ("execve", EXECVE),
        ("truncated", TRUNCATED),
        ("exited", EXITED),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| parser.parse(black_box(line)))
        });
    }
    group.finish();
}

fn bench_split_args(c: &mut Criterion) {
    let body = EXECVE
        .split_once("execve(")
        .map(|(_, body)| body)
        .unwrap_or(EXECVE);
    c.bench_function("split_args/execve", |b| b.iter(|| split_args(black_box(body))));
}

fn bench_decoder_throughput(c: &mut Criterion) {
    let lines: Vec<&str> = [SHORT, OPENAT, EXECVE, TRUNCATED, EXITED]
        .iter()
        .cycle()
        .take(1000)
        .copied()
        .collect();

    let mut group = c.benchmark_group("decoder");
    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("mixed_1000", |b| {
        b.iter(|| {
            let mut decoder = TraceDecoder::new();
            for line in &lines {
                black_box(decoder.decode(line));
            }
            decoder.stats()
        })
    });
    group.finish();
}

fn bench_audit_record(c: &mut Criterion) {
    c.bench_function("audit_record/parse_into_event", |b| {
        b.iter(|| AuditRecord::parse(black_box(AUDIT)).map(AuditRecord::into_event))
    });
}

criterion_group!(
    benches,
    bench_line_shapes,
    bench_split_args,
    bench_decoder_throughput,
    bench_audit_record
);
criterion_main!(benches);
