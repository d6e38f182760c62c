//! 트레이스 출력 수집 모듈
//!
//! 트레이서는 로그 파일에 기록하고, 수집기는 그 파일을 읽어 라인 단위로
//! 넘겨줍니다.
//!
//! - 실시간 모드: [`LogTail`]이 기록 중인 파일을 폴링하며 따라갑니다.
//! - 일회성 모드: 트레이서 종료 후 [`read_lines`]로 전체를 한 번에 읽습니다.

pub mod file;

pub use file::{LogTail, LogTailConfig, read_lines};
