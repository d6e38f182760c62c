//! 파이프라인 trait -- 모듈 확장 포인트 정의

use crate::event::{Event, Finding};

/// 트레이스 라인 파서 trait
///
/// 새로운 트레이서 출력 형식을 지원하려면 이 trait을 구현합니다.
/// 구현은 전체 함수여야 하며, 어떤 입력에도 패닉하지 않아야 합니다.
pub trait TraceParser: Send + Sync {
    /// 지원하는 출력 형식 이름
    fn format_name(&self) -> &str;

    /// 원시 라인 하나를 이벤트로 변환합니다.
    ///
    /// 인식할 수 없거나 잘린 라인은 `None`을 반환합니다.
    fn parse_line(&self, raw: &str) -> Option<Event>;
}

/// 이벤트 분류기 trait
///
/// 같은 이벤트에 대해 항상 같은 결과를 돌려주는 순수 함수여야 합니다.
pub trait Classifier: Send + Sync {
    /// 분류기 이름
    fn name(&self) -> &str;

    /// 이벤트를 분류합니다. 매칭되는 규칙이 없으면 `None`입니다.
    fn classify(&self, event: &Event) -> Option<Finding>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    struct NameClassifier;

    impl Classifier for NameClassifier {
        fn name(&self) -> &str {
            "name"
        }

        fn classify(&self, event: &Event) -> Option<Finding> {
            (event.name == "connect")
                .then(|| Finding::new(event.clone(), Severity::High, "Network", "net"))
        }
    }

    #[test]
    fn classifier_is_object_safe() {
        let classifier: Box<dyn Classifier> = Box::new(NameClassifier);
        let hit = Event::tracer("connect", vec![], "connect(3, ...) = 0");
        let miss = Event::tracer("read", vec![], "read(3, ...) = 0");
        assert!(classifier.classify(&hit).is_some());
        assert!(classifier.classify(&miss).is_none());
    }
}
