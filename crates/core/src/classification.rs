//! 分类结果与人工反馈记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 分类引擎输出，生成后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub document_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl ClassificationResult {
    pub fn new(document_type: impl Into<String>, confidence: f32) -> Self {
        Self {
            document_type: document_type.into(),
            sub_type: None,
            confidence,
            reasoning: None,
        }
    }
}

/// 反馈来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSource {
    /// 置信度达标自动接受
    Auto,
    /// 人工确认或纠正
    Manual,
    /// 处理完成后的复核
    Review,
}

/// 分类反馈记录
///
/// 每次分类决策生成一条，只追加不删除（保留策略清理由外部负责）。
/// `has_been_used_for_training` 只能从 false 变为 true。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationFeedback {
    pub id: String,
    pub document_id: String,
    pub original_classification: Option<ClassificationResult>,
    pub corrected_document_type: Option<String>,
    pub source: FeedbackSource,
    pub timestamp: DateTime<Utc>,
    has_been_used_for_training: bool,
}

impl ClassificationFeedback {
    pub fn new(
        document_id: impl Into<String>,
        original_classification: Option<ClassificationResult>,
        corrected_document_type: Option<String>,
        source: FeedbackSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            original_classification,
            corrected_document_type,
            source,
            timestamp: Utc::now(),
            has_been_used_for_training: false,
        }
    }

    pub fn has_been_used_for_training(&self) -> bool {
        self.has_been_used_for_training
    }

    pub fn mark_used_for_training(&mut self) {
        self.has_been_used_for_training = true;
    }

    /// 最终生效的文档类型：纠正值优先
    pub fn effective_document_type(&self) -> Option<&str> {
        self.corrected_document_type.as_deref().or(self
            .original_classification
            .as_ref()
            .map(|c| c.document_type.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_flag_is_one_way() {
        let mut feedback = ClassificationFeedback::new(
            "doc-1",
            Some(ClassificationResult::new("invoice", 0.92)),
            None,
            FeedbackSource::Auto,
        );
        assert!(!feedback.has_been_used_for_training());
        for _ in 0..3 {
            feedback.mark_used_for_training();
            assert!(feedback.has_been_used_for_training());
        }
    }

    #[test]
    fn test_training_flag_survives_serde() {
        let mut feedback = ClassificationFeedback::new(
            "doc-1",
            None,
            Some("receipt".into()),
            FeedbackSource::Manual,
        );
        feedback.mark_used_for_training();
        let json = serde_json::to_string(&feedback).unwrap();
        assert!(json.contains("\"hasBeenUsedForTraining\":true"));
        let back: ClassificationFeedback = serde_json::from_str(&json).unwrap();
        assert!(back.has_been_used_for_training());
        assert_eq!(back.source, FeedbackSource::Manual);
    }

    #[test]
    fn test_effective_document_type() {
        let original = Some(ClassificationResult::new("invoice", 0.4));
        let confirmed =
            ClassificationFeedback::new("d", original.clone(), None, FeedbackSource::Manual);
        assert_eq!(confirmed.effective_document_type(), Some("invoice"));

        let corrected = ClassificationFeedback::new(
            "d",
            original,
            Some("bank_statement".into()),
            FeedbackSource::Manual,
        );
        assert_eq!(corrected.effective_document_type(), Some("bank_statement"));
    }
}
