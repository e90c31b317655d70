//! 分类工作流驱动
//!
//! 持有闸门快照与当前文档，把 [`GateCommand`] 翻译为协作者调用，再把调用结果作为事件
//! 送回闸门。锁只在同步区间内持有，不跨越 `.await`。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::{ClassificationFeedback, FeedbackSource};
use crate::collaborators::ArtifactLocator;
use crate::compositor::{FallbackPlacement, RedactionCompositor, RedactionRequest, RendererKind};
use crate::context::PipelineContext;
use crate::document::{Field, PipelineResult};
use crate::error::{CoreError, Result};
use crate::gate::{
    ClassificationGate, FeedbackDraft, GateCommand, GateEvent, GateSnapshot, GateState,
};
use crate::orchestrator::{PageOrchestrator, ProgressEvent};
use crate::taxonomy::{apply_semantic_matches, apply_taxonomy};

/// 已提交的源文档
#[derive(Debug, Clone)]
struct SubmittedDocument {
    bytes: Arc<Vec<u8>>,
    mime_type: String,
    locator: Option<ArtifactLocator>,
}

/// 已存储的脱敏产物
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedArtifact {
    pub locator: ArtifactLocator,
    pub content_type: String,
    pub renderer: RendererKind,
    pub filled_regions: usize,
    pub fallback_placements: Vec<FallbackPlacement>,
    pub warnings: Vec<String>,
}

/// 后续处理的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOutcome {
    pub document_type: String,
    pub source_locator: Option<ArtifactLocator>,
    pub result: PipelineResult,
    pub taxonomy_matches: usize,
    pub semantic_matches: usize,
    pub redaction: Option<RedactedArtifact>,
}

fn log_progress(event: ProgressEvent) {
    log::debug!("[Workflow] 进度 {:?}", event);
}

#[derive(Default)]
struct Session {
    snapshot: GateSnapshot,
    document: Option<SubmittedDocument>,
    outcome: Option<ProcessingOutcome>,
}

pub struct ClassificationWorkflow {
    context: PipelineContext,
    gate: ClassificationGate,
    orchestrator: PageOrchestrator,
    compositor: RedactionCompositor,
    session: Mutex<Session>,
}

impl ClassificationWorkflow {
    pub fn new(context: PipelineContext) -> Self {
        let config = &context.config;
        Self {
            gate: ClassificationGate::new(&config.gate),
            orchestrator: PageOrchestrator::new(&config.orchestrator),
            compositor: RedactionCompositor::new(&config.redaction),
            session: Mutex::new(Session::default()),
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> GateState {
        self.lock().snapshot.state.clone()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.lock().snapshot.clone()
    }

    /// 最近一次完成的处理结果，重置后清空
    pub fn outcome(&self) -> Option<ProcessingOutcome> {
        self.lock().outcome.clone()
    }

    /// 送入事件并保存新快照；`on_accept` 只在事件未过期时执行
    fn apply(
        &self,
        event: GateEvent,
        on_accept: impl FnOnce(&mut Session),
    ) -> Result<Vec<GateCommand>> {
        let mut session = self.lock();
        let stale = session.snapshot.is_stale(&event);
        let (snapshot, commands) = self.gate.transition(&session.snapshot, event)?;
        if !stale {
            on_accept(&mut session);
        }
        session.snapshot = snapshot;
        Ok(commands)
    }

    /// 当前一轮的文档；已被重置时返回 None
    fn document_for(&self, generation: u64) -> Option<SubmittedDocument> {
        let session = self.lock();
        if session.snapshot.generation != generation {
            return None;
        }
        session.document.clone()
    }

    /// 提交文档：上传、分类，高置信度时自动接受
    pub async fn submit(&self, bytes: Vec<u8>, mime_type: &str) -> Result<GateState> {
        let document = SubmittedDocument {
            bytes: Arc::new(bytes),
            mime_type: mime_type.to_string(),
            locator: None,
        };
        let document_id = Uuid::new_v4().to_string();
        log::info!("[Workflow] 提交文档 {} ({})", document_id, mime_type);
        let commands = self.apply(GateEvent::Submit { document_id }, |session| {
            session.document = Some(document);
            session.outcome = None;
        })?;
        self.run(commands).await
    }

    /// 人工确认或纠正分类后开始处理
    pub async fn resolve_verification(
        &self,
        verified: bool,
        corrected_document_type: Option<String>,
    ) -> Result<GateState> {
        let commands = self.apply(
            GateEvent::VerificationResolved {
                verified,
                corrected_document_type,
            },
            |_| {},
        )?;
        self.run(commands).await
    }

    /// 对自动接受的分类开始处理
    pub async fn process(&self) -> Result<GateState> {
        let commands = self.apply(GateEvent::Process, |_| {})?;
        self.run(commands).await
    }

    /// 回到 Idle 并丢弃当前文档；进行中的调用结果到达后会被忽略
    pub fn reset(&self) -> GateState {
        let reset = self.apply(GateEvent::Reset, |session| {
            session.document = None;
            session.outcome = None;
        });
        if let Err(e) = reset {
            log::error!("[Workflow] 重置失败: {}", e);
        }
        let snapshot = self.snapshot();
        log::info!("[Workflow] 已重置 (代数 {})", snapshot.generation);
        snapshot.state
    }

    /// 处理完成后的复核反馈
    pub async fn record_review(&self, corrected_document_type: Option<String>) -> Result<String> {
        let (document_id, classification) = match self.state() {
            GateState::Completed {
                document_id,
                classification,
                ..
            } => (document_id, classification),
            other => {
                return Err(CoreError::InvalidTransition {
                    state: other.name(),
                    event: "Review",
                })
            }
        };
        let corrected = corrected_document_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let feedback = ClassificationFeedback::new(
            document_id,
            Some(classification),
            corrected,
            FeedbackSource::Review,
        );
        self.context
            .feedback
            .append(feedback)
            .await
            .map_err(|e| CoreError::Storage(format!("{:#}", e)))
    }

    async fn run(&self, commands: Vec<GateCommand>) -> Result<GateState> {
        let mut queue: VecDeque<GateCommand> = commands.into();
        while let Some(command) = queue.pop_front() {
            let follow_up = match command {
                GateCommand::Upload { generation } => self.upload(generation).await?,
                GateCommand::RequestClassification { generation } => {
                    self.classify(generation).await?
                }
                GateCommand::RecordFeedback(draft) => {
                    self.record_feedback(draft).await;
                    Vec::new()
                }
                GateCommand::StartProcessing {
                    generation,
                    document_type,
                } => self.start_processing(generation, &document_type).await?,
            };
            queue.extend(follow_up);
        }
        Ok(self.state())
    }

    async fn upload(&self, generation: u64) -> Result<Vec<GateCommand>> {
        let Some(document) = self.document_for(generation) else {
            return Ok(Vec::new());
        };
        match self
            .context
            .artifacts
            .put(document.bytes.to_vec(), &document.mime_type)
            .await
        {
            Ok(locator) => {
                log::debug!("[Workflow] 源文档已存储: {}", locator);
                self.apply(GateEvent::UploadSucceeded { generation }, |session| {
                    if let Some(document) = session.document.as_mut() {
                        document.locator = Some(locator);
                    }
                })
            }
            Err(e) => {
                let message = CoreError::Storage(format!("{:#}", e)).to_string();
                self.apply(GateEvent::UploadFailed { generation, message }, |_| {})
            }
        }
    }

    async fn classify(&self, generation: u64) -> Result<Vec<GateCommand>> {
        let Some(document) = self.document_for(generation) else {
            return Ok(Vec::new());
        };
        let classified = self
            .context
            .classifier
            .classify(&document.bytes, &document.mime_type)
            .await;
        let event = match classified {
            Ok(mut result) if result.confidence.is_finite() => {
                result.confidence = result.confidence.clamp(0.0, 1.0);
                GateEvent::ClassificationSucceeded { generation, result }
            }
            Ok(result) => GateEvent::ClassificationFailed {
                generation,
                message: CoreError::ClassificationFailure(format!(
                    "invalid confidence {}",
                    result.confidence
                ))
                .to_string(),
            },
            Err(e) => GateEvent::ClassificationFailed {
                generation,
                message: CoreError::ClassificationFailure(format!("{:#}", e)).to_string(),
            },
        };
        self.apply(event, |_| {})
    }

    /// 反馈写入失败不影响流程
    async fn record_feedback(&self, draft: FeedbackDraft) {
        let source = draft.source;
        let feedback = ClassificationFeedback::new(
            draft.document_id,
            draft.original_classification,
            draft.corrected_document_type,
            draft.source,
        );
        match self.context.feedback.append(feedback).await {
            Ok(id) => log::info!("[Workflow] 记录反馈 {} ({:?})", id, source),
            Err(e) => log::warn!("[Workflow] 反馈写入失败: {:#}", e),
        }
    }

    async fn start_processing(
        &self,
        generation: u64,
        document_type: &str,
    ) -> Result<Vec<GateCommand>> {
        let Some(document) = self.document_for(generation) else {
            return Ok(Vec::new());
        };
        match self.run_processing(&document, document_type).await {
            Ok(outcome) => self.apply(GateEvent::ProcessingSucceeded { generation }, |session| {
                session.outcome = Some(outcome);
            }),
            Err(e) => {
                log::warn!("[Workflow] 处理失败: {}", e);
                self.apply(
                    GateEvent::ProcessingFailed {
                        generation,
                        message: e.to_string(),
                    },
                    |_| {},
                )
            }
        }
    }

    /// 提取、分类体系匹配、脱敏并存储产物
    async fn run_processing(
        &self,
        document: &SubmittedDocument,
        document_type: &str,
    ) -> Result<ProcessingOutcome> {
        let context = &self.context;
        let elements = context
            .taxonomy
            .expected_elements(document_type)
            .await
            .map_err(|e| CoreError::ProcessingFailure(format!("taxonomy lookup: {:#}", e)))?;

        let mut result = self
            .orchestrator
            .process_document(
                &document.bytes,
                &document.mime_type,
                Some(document_type),
                context.renderer.as_ref(),
                context.extractor.as_ref(),
                &log_progress,
            )
            .await?;

        let label_matched = apply_taxonomy(&mut result.fields, &elements);
        let taxonomy_matches = label_matched.len();
        let mut semantic_matches = 0;
        if let Some(matcher) = &context.matcher {
            let unmatched: Vec<Field> = result
                .fields
                .iter()
                .filter(|f| !label_matched.contains(&f.id))
                .cloned()
                .collect();
            if !unmatched.is_empty() && !elements.is_empty() {
                match matcher.match_fields(&unmatched, &elements).await {
                    Ok(matches) => {
                        semantic_matches = apply_semantic_matches(
                            &mut result.fields,
                            &elements,
                            &matches,
                            &label_matched,
                        );
                    }
                    Err(e) => log::warn!("[Workflow] 语义匹配失败，忽略: {:#}", e),
                }
            }
        }

        let redaction = if result.fields.iter().any(|f| f.action.redacts()) {
            let request = RedactionRequest::for_redactable(
                &document.bytes,
                &document.mime_type,
                &result.fields,
            );
            let redacted = self.compositor.composite(&request, &result.fields)?;
            let locator = context
                .artifacts
                .put(redacted.bytes, &redacted.content_type)
                .await
                .map_err(|e| CoreError::Storage(format!("{:#}", e)))?;
            Some(RedactedArtifact {
                locator,
                content_type: redacted.content_type,
                renderer: redacted.renderer,
                filled_regions: redacted.filled_regions,
                fallback_placements: redacted.fallback_placements,
                warnings: redacted.warnings,
            })
        } else {
            None
        };

        log::info!(
            "[Workflow] {} 处理完成: 字段 {} 个, 分类体系匹配 {}, 语义匹配 {}, 脱敏 {}",
            document_type,
            result.fields.len(),
            taxonomy_matches,
            semantic_matches,
            redaction.is_some()
        );

        Ok(ProcessingOutcome {
            document_type: document_type.to_string(),
            source_locator: document.locator.clone(),
            result,
            taxonomy_matches,
            semantic_matches,
            redaction,
        })
    }
}
