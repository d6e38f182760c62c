//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 디렉토리 내의 `.yml`/`.yaml` 파일을 파일 이름 순으로 파싱합니다.
//! 적용 순서가 곧 매칭 우선순위이므로 디렉토리 순회 순서에 의존하지 않습니다.
//! 개별 파일 파싱 실패는 경고 로그를 남기고 건너뜁니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::MonitorError;

use super::types::Rule;

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 모든 YAML 규칙 파일을 로드합니다.
    ///
    /// `.yml` 또는 `.yaml` 확장자를 가진 파일만 파일 이름 순서로 처리합니다.
    /// 개별 파일 로딩 실패와 중복 ID는 경고 로그를 남기고 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<Rule>, MonitorError> {
        let dir = dir.as_ref();
        let paths = Self::rule_files(dir).await?;

        if paths.len() > MAX_RULES_COUNT {
            return Err(MonitorError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }

        let mut rules = Vec::with_capacity(paths.len());
        let mut seen_ids = HashSet::new();

        for path in paths {
            match Self::load_file(&path).await {
                Ok(rule) => {
                    if !seen_ids.insert(rule.id.clone()) {
                        tracing::warn!(
                            rule_id = %rule.id,
                            path = %path.display(),
                            "duplicate rule id, skipping"
                        );
                        continue;
                    }
                    rules.push(rule);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = rules.len(),
            "loaded custom rules"
        );

        Ok(rules)
    }

    /// 디렉토리의 YAML 파일 경로를 이름 순으로 정렬해 돌려줍니다.
    async fn rule_files(dir: &Path) -> Result<Vec<PathBuf>, MonitorError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| MonitorError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MonitorError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory entry: {e}"),
            })?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }

    /// 단일 YAML 파일에서 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Rule, MonitorError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| MonitorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(MonitorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MonitorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱하여 규칙을 생성합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Rule, MonitorError> {
        let rule: Rule = serde_yaml::from_str(yaml_str).map_err(|e| MonitorError::RuleLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;

        rule.validate()?;

        Ok(rule)
    }
}
