//! 分类置信度闸门
//!
//! 纯状态机：`transition(snapshot, event)` 只计算新状态与需要执行的命令，
//! 协作者调用由 [`crate::workflow::ClassificationWorkflow`] 驱动。
//!
//! 每次 `Reset` 递增代数，异步结果事件携带发起时的代数，代数不符的结果直接丢弃。

use serde::{Deserialize, Serialize};

use crate::classification::{ClassificationResult, FeedbackSource};
use crate::config::GateConfig;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GateState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Uploading { document_id: String },
    #[serde(rename_all = "camelCase")]
    Classifying { document_id: String },
    #[serde(rename_all = "camelCase")]
    Classified {
        document_id: String,
        classification: ClassificationResult,
    },
    #[serde(rename_all = "camelCase")]
    VerificationNeeded {
        document_id: String,
        classification: ClassificationResult,
    },
    #[serde(rename_all = "camelCase")]
    Processing {
        document_id: String,
        classification: ClassificationResult,
        document_type: String,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        document_id: String,
        classification: ClassificationResult,
        document_type: String,
    },
    Error { message: String },
}

impl GateState {
    pub fn name(&self) -> &'static str {
        match self {
            GateState::Idle => "Idle",
            GateState::Uploading { .. } => "Uploading",
            GateState::Classifying { .. } => "Classifying",
            GateState::Classified { .. } => "Classified",
            GateState::VerificationNeeded { .. } => "VerificationNeeded",
            GateState::Processing { .. } => "Processing",
            GateState::Completed { .. } => "Completed",
            GateState::Error { .. } => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::Completed { .. } | GateState::Error { .. })
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            GateState::Idle | GateState::Error { .. } => None,
            GateState::Uploading { document_id }
            | GateState::Classifying { document_id }
            | GateState::Classified { document_id, .. }
            | GateState::VerificationNeeded { document_id, .. }
            | GateState::Processing { document_id, .. }
            | GateState::Completed { document_id, .. } => Some(document_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    Submit { document_id: String },
    UploadSucceeded { generation: u64 },
    UploadFailed { generation: u64, message: String },
    ClassificationSucceeded {
        generation: u64,
        result: ClassificationResult,
    },
    ClassificationFailed { generation: u64, message: String },
    /// 人工确认（`verified = true`）或纠正
    VerificationResolved {
        verified: bool,
        corrected_document_type: Option<String>,
    },
    /// 对已自动接受的分类开始后续处理
    Process,
    ProcessingSucceeded { generation: u64 },
    ProcessingFailed { generation: u64, message: String },
    Reset,
}

impl GateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GateEvent::Submit { .. } => "Submit",
            GateEvent::UploadSucceeded { .. } => "UploadSucceeded",
            GateEvent::UploadFailed { .. } => "UploadFailed",
            GateEvent::ClassificationSucceeded { .. } => "ClassificationSucceeded",
            GateEvent::ClassificationFailed { .. } => "ClassificationFailed",
            GateEvent::VerificationResolved { .. } => "VerificationResolved",
            GateEvent::Process => "Process",
            GateEvent::ProcessingSucceeded { .. } => "ProcessingSucceeded",
            GateEvent::ProcessingFailed { .. } => "ProcessingFailed",
            GateEvent::Reset => "Reset",
        }
    }

    /// 异步结果事件发起时的代数
    pub fn generation(&self) -> Option<u64> {
        match self {
            GateEvent::UploadSucceeded { generation }
            | GateEvent::UploadFailed { generation, .. }
            | GateEvent::ClassificationSucceeded { generation, .. }
            | GateEvent::ClassificationFailed { generation, .. }
            | GateEvent::ProcessingSucceeded { generation }
            | GateEvent::ProcessingFailed { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}

/// 待写入的反馈记录（id 与时间戳由驱动方生成）
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDraft {
    pub document_id: String,
    pub original_classification: Option<ClassificationResult>,
    pub corrected_document_type: Option<String>,
    pub source: FeedbackSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateCommand {
    Upload { generation: u64 },
    RequestClassification { generation: u64 },
    RecordFeedback(FeedbackDraft),
    StartProcessing { generation: u64, document_type: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub state: GateState,
    pub generation: u64,
}

impl GateSnapshot {
    /// 事件是否来自已被重置的旧一轮
    pub fn is_stale(&self, event: &GateEvent) -> bool {
        event.generation().is_some_and(|g| g != self.generation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationGate {
    config: GateConfig,
}

impl ClassificationGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn threshold_for(&self, document_type: &str) -> f32 {
        self.config.threshold_for(document_type)
    }

    /// 计算状态转移
    ///
    /// 旧一轮的异步结果返回原快照且不产生命令；当前状态不接受的事件返回
    /// [`CoreError::InvalidTransition`]。
    pub fn transition(
        &self,
        snapshot: &GateSnapshot,
        event: GateEvent,
    ) -> Result<(GateSnapshot, Vec<GateCommand>)> {
        if snapshot.is_stale(&event) {
            log::debug!(
                "[Gate] 丢弃过期事件 {} (当前代数 {})",
                event.name(),
                snapshot.generation
            );
            return Ok((snapshot.clone(), Vec::new()));
        }

        let generation = snapshot.generation;
        let next = |state: GateState| GateSnapshot { state, generation };
        let invalid = |event: &GateEvent| CoreError::InvalidTransition {
            state: snapshot.state.name(),
            event: event.name(),
        };

        let outcome = match (&snapshot.state, event) {
            (_, GateEvent::Reset) => (
                GateSnapshot {
                    state: GateState::Idle,
                    generation: generation + 1,
                },
                Vec::new(),
            ),

            (GateState::Idle, GateEvent::Submit { document_id }) => (
                next(GateState::Uploading { document_id }),
                vec![GateCommand::Upload { generation }],
            ),

            (GateState::Uploading { document_id }, GateEvent::UploadSucceeded { .. }) => (
                next(GateState::Classifying {
                    document_id: document_id.clone(),
                }),
                vec![GateCommand::RequestClassification { generation }],
            ),

            (
                GateState::Classifying { document_id },
                GateEvent::ClassificationSucceeded { result, .. },
            ) => {
                let threshold = self.threshold_for(&result.document_type);
                if result.confidence >= threshold {
                    log::info!(
                        "[Gate] {} 置信度 {:.2} >= {:.2}，自动接受",
                        result.document_type,
                        result.confidence,
                        threshold
                    );
                    let draft = FeedbackDraft {
                        document_id: document_id.clone(),
                        original_classification: Some(result.clone()),
                        corrected_document_type: None,
                        source: FeedbackSource::Auto,
                    };
                    (
                        next(GateState::Classified {
                            document_id: document_id.clone(),
                            classification: result,
                        }),
                        vec![GateCommand::RecordFeedback(draft)],
                    )
                } else {
                    log::info!(
                        "[Gate] {} 置信度 {:.2} < {:.2}，等待人工确认",
                        result.document_type,
                        result.confidence,
                        threshold
                    );
                    (
                        next(GateState::VerificationNeeded {
                            document_id: document_id.clone(),
                            classification: result,
                        }),
                        Vec::new(),
                    )
                }
            }

            (
                GateState::VerificationNeeded {
                    document_id,
                    classification,
                },
                GateEvent::VerificationResolved {
                    verified,
                    corrected_document_type,
                },
            ) => {
                let corrected = if verified {
                    None
                } else {
                    let corrected = corrected_document_type
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .ok_or(CoreError::MissingCorrection)?;
                    Some(corrected)
                };
                let document_type = corrected
                    .clone()
                    .unwrap_or_else(|| classification.document_type.clone());
                let draft = FeedbackDraft {
                    document_id: document_id.clone(),
                    original_classification: Some(classification.clone()),
                    corrected_document_type: corrected,
                    source: FeedbackSource::Manual,
                };
                (
                    next(GateState::Processing {
                        document_id: document_id.clone(),
                        classification: classification.clone(),
                        document_type: document_type.clone(),
                    }),
                    vec![
                        GateCommand::RecordFeedback(draft),
                        GateCommand::StartProcessing {
                            generation,
                            document_type,
                        },
                    ],
                )
            }

            (
                GateState::Classified {
                    document_id,
                    classification,
                },
                GateEvent::Process,
            ) => {
                let document_type = classification.document_type.clone();
                (
                    next(GateState::Processing {
                        document_id: document_id.clone(),
                        classification: classification.clone(),
                        document_type: document_type.clone(),
                    }),
                    vec![GateCommand::StartProcessing {
                        generation,
                        document_type,
                    }],
                )
            }

            (
                GateState::Processing {
                    document_id,
                    classification,
                    document_type,
                },
                GateEvent::ProcessingSucceeded { .. },
            ) => (
                next(GateState::Completed {
                    document_id: document_id.clone(),
                    classification: classification.clone(),
                    document_type: document_type.clone(),
                }),
                Vec::new(),
            ),

            (GateState::Uploading { .. }, GateEvent::UploadFailed { message, .. })
            | (GateState::Classifying { .. }, GateEvent::ClassificationFailed { message, .. })
            | (GateState::Processing { .. }, GateEvent::ProcessingFailed { message, .. }) => {
                log::warn!("[Gate] {} -> Error: {}", snapshot.state.name(), message);
                (next(GateState::Error { message }), Vec::new())
            }

            (_, event) => return Err(invalid(&event)),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ClassificationGate {
        ClassificationGate::default()
    }

    fn step(snapshot: &GateSnapshot, event: GateEvent) -> (GateSnapshot, Vec<GateCommand>) {
        gate().transition(snapshot, event).unwrap()
    }

    fn classifying() -> GateSnapshot {
        let (s, _) = step(
            &GateSnapshot::default(),
            GateEvent::Submit {
                document_id: "doc".into(),
            },
        );
        let (s, commands) = step(&s, GateEvent::UploadSucceeded { generation: 0 });
        assert_eq!(commands, vec![GateCommand::RequestClassification { generation: 0 }]);
        s
    }

    fn classified_with(confidence: f32) -> (GateSnapshot, Vec<GateCommand>) {
        step(
            &classifying(),
            GateEvent::ClassificationSucceeded {
                generation: 0,
                result: ClassificationResult::new("invoice", confidence),
            },
        )
    }

    #[test]
    fn test_high_confidence_auto_accepts() {
        let (s, commands) = classified_with(0.92);
        assert_eq!(s.state.name(), "Classified");
        match commands.as_slice() {
            [GateCommand::RecordFeedback(draft)] => {
                assert_eq!(draft.source, FeedbackSource::Auto);
                assert_eq!(draft.corrected_document_type, None);
                assert_eq!(draft.document_id, "doc");
            }
            other => panic!("unexpected commands: {other:?}"),
        }

        let (s, commands) = step(&s, GateEvent::Process);
        assert_eq!(s.state.name(), "Processing");
        assert_eq!(
            commands,
            vec![GateCommand::StartProcessing {
                generation: 0,
                document_type: "invoice".into()
            }]
        );
        let (s, _) = step(&s, GateEvent::ProcessingSucceeded { generation: 0 });
        assert!(s.state.is_terminal());
        assert_eq!(s.state.name(), "Completed");
    }

    #[test]
    fn test_low_confidence_needs_verification() {
        let (s, commands) = classified_with(0.45);
        assert_eq!(s.state.name(), "VerificationNeeded");
        assert!(commands.is_empty());

        // 等待人工确认期间不接受其他推进事件
        assert!(matches!(
            gate().transition(&s, GateEvent::Process),
            Err(CoreError::InvalidTransition {
                state: "VerificationNeeded",
                event: "Process"
            })
        ));
        assert!(gate()
            .transition(&s, GateEvent::Submit { document_id: "other".into() })
            .is_err());

        let (s, commands) = step(
            &s,
            GateEvent::VerificationResolved {
                verified: false,
                corrected_document_type: Some("receipt".into()),
            },
        );
        match &s.state {
            GateState::Processing { document_type, .. } => assert_eq!(document_type, "receipt"),
            other => panic!("unexpected state: {other:?}"),
        }
        match commands.as_slice() {
            [
                GateCommand::RecordFeedback(draft),
                GateCommand::StartProcessing { document_type, .. },
            ] => {
                assert_eq!(draft.source, FeedbackSource::Manual);
                assert_eq!(draft.corrected_document_type.as_deref(), Some("receipt"));
                assert_eq!(draft.original_classification.as_ref().unwrap().confidence, 0.45);
                assert_eq!(document_type, "receipt");
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn test_confirmation_keeps_classified_type() {
        let (s, _) = classified_with(0.5);
        let (s, commands) = step(
            &s,
            GateEvent::VerificationResolved {
                verified: true,
                corrected_document_type: Some("ignored".into()),
            },
        );
        assert!(matches!(
            &s.state,
            GateState::Processing { document_type, .. } if document_type == "invoice"
        ));
        assert!(matches!(
            &commands[0],
            GateCommand::RecordFeedback(FeedbackDraft {
                corrected_document_type: None,
                ..
            })
        ));
    }

    #[test]
    fn test_correction_requires_type() {
        let (s, _) = classified_with(0.3);
        for corrected in [None, Some("  ".to_string())] {
            let err = gate()
                .transition(
                    &s,
                    GateEvent::VerificationResolved {
                        verified: false,
                        corrected_document_type: corrected,
                    },
                )
                .unwrap_err();
            assert!(matches!(err, CoreError::MissingCorrection));
        }
    }

    #[test]
    fn test_threshold_per_document_type() {
        let mut config = GateConfig::default();
        config.thresholds.insert("passport".into(), 0.95);
        let gate = ClassificationGate::new(&config);

        let (s, _) = gate
            .transition(
                &classifying(),
                GateEvent::ClassificationSucceeded {
                    generation: 0,
                    result: ClassificationResult::new("passport", 0.92),
                },
            )
            .unwrap();
        assert_eq!(s.state.name(), "VerificationNeeded");

        let (s, _) = gate
            .transition(
                &classifying(),
                GateEvent::ClassificationSucceeded {
                    generation: 0,
                    result: ClassificationResult::new("invoice", 0.8),
                },
            )
            .unwrap();
        assert_eq!(s.state.name(), "Classified");
    }

    #[test]
    fn test_reset_drops_stale_results() {
        let s = classifying();
        let (reset, commands) = step(&s, GateEvent::Reset);
        assert_eq!(reset.state, GateState::Idle);
        assert_eq!(reset.generation, 1);
        assert!(commands.is_empty());

        let (after, commands) = step(
            &reset,
            GateEvent::ClassificationSucceeded {
                generation: 0,
                result: ClassificationResult::new("invoice", 0.99),
            },
        );
        assert_eq!(after, reset);
        assert!(commands.is_empty());

        let (s, commands) = step(&reset, GateEvent::Submit { document_id: "next".into() });
        assert_eq!(commands, vec![GateCommand::Upload { generation: 1 }]);
        assert_eq!(s.state.document_id(), Some("next"));
    }

    #[test]
    fn test_collaborator_failures_go_to_error() {
        let (s, _) = step(
            &classifying(),
            GateEvent::ClassificationFailed {
                generation: 0,
                message: "model unavailable".into(),
            },
        );
        assert_eq!(
            s.state,
            GateState::Error {
                message: "model unavailable".into()
            }
        );
        assert!(s.state.is_terminal());
        assert!(gate().transition(&s, GateEvent::Process).is_err());
        let (s, _) = step(&s, GateEvent::Reset);
        assert_eq!(s.state, GateState::Idle);
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let (s, _) = classified_with(0.92);
        let json = serde_json::to_value(&s.state).unwrap();
        assert_eq!(json["state"], "classified");
        assert_eq!(json["documentId"], "doc");
    }
}
