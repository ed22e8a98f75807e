//! The conversion flow: inspect → select → convert → save, for one file or a
//! sequential multi-file bulk run.
//!
//! ## Single-file flow
//!
//! ```text
//! Idle ─begin()─▶ Inspecting ─▶ AwaitingSelection ─confirm()─▶ Validating ─▶ Converting
//!   │                 │                ▲       │                    │             │
//!   │                 │                └───────┘ (inline error)     │             ├─▶ Succeeded
//!   └─────────────────┴──────────────────────────────────────────────┴─────────────┴─▶ Failed
//! ```
//!
//! `begin()` rejects quota-exhausted accounts and non-PDF files without
//! contacting the service. A rejected selection keeps the flow in
//! `AwaitingSelection` with the inline [`SelectionError`] attached.
//!
//! ## Bulk flow
//!
//! Pro accounts dropping two or more PDFs get a bulk run: every file is
//! converted in full, strictly one after another. A failed file is recorded
//! and the run moves on. Usage is re-read once the run ends, whatever the
//! outcome.

use crate::api::{is_pdf_file, ConversionApi, InspectionResult, UploadFile};
use crate::error::{ApiError, SelectionError, TabularisError};
use crate::output::{ArtifactSink, ConversionOutcome, SavedArtifact};
use crate::pages::PageSet;
use crate::progress::{
    file_progress_message, run_summary_message, NoopProgressCallback, ProgressCallback,
};
use crate::quota::{PlanTier, QuotaGate};
use crate::selection::{Selection, SelectionLimits, SelectionValidator};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Flow state ───────────────────────────────────────────────────────────

/// Payload-free name of a [`FlowState`], handed to progress listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Idle,
    Inspecting,
    AwaitingSelection,
    Validating,
    Converting,
    Succeeded,
    Failed,
}

impl FlowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowStep::Idle => "idle",
            FlowStep::Inspecting => "inspecting",
            FlowStep::AwaitingSelection => "awaiting selection",
            FlowStep::Validating => "validating",
            FlowStep::Converting => "converting",
            FlowStep::Succeeded => "succeeded",
            FlowStep::Failed => "failed",
        }
    }

    /// `true` for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowStep::Succeeded | FlowStep::Failed)
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single-file flow.
#[derive(Debug, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Inspecting {
        file_name: String,
    },
    AwaitingSelection {
        file: UploadFile,
        inspection: InspectionResult,
        /// Current selection; seeded with the default for this file.
        selection: Selection,
        /// Why the last confirmed selection was rejected.
        error: Option<SelectionError>,
    },
    Validating {
        file_name: String,
    },
    Converting {
        file_name: String,
        /// Canonical page spec, `None` for all pages.
        pages: Option<String>,
    },
    Succeeded {
        source: String,
        artifact: SavedArtifact,
    },
    Failed {
        source: String,
        error: TabularisError,
    },
}

impl FlowState {
    pub fn step(&self) -> FlowStep {
        match self {
            FlowState::Idle => FlowStep::Idle,
            FlowState::Inspecting { .. } => FlowStep::Inspecting,
            FlowState::AwaitingSelection { .. } => FlowStep::AwaitingSelection,
            FlowState::Validating { .. } => FlowStep::Validating,
            FlowState::Converting { .. } => FlowStep::Converting,
            FlowState::Succeeded { .. } => FlowStep::Succeeded,
            FlowState::Failed { .. } => FlowStep::Failed,
        }
    }

    /// Name of the file the flow is working on; empty when idle.
    pub fn file_name(&self) -> &str {
        match self {
            FlowState::Idle => "",
            FlowState::Inspecting { file_name }
            | FlowState::Validating { file_name }
            | FlowState::Converting { file_name, .. } => file_name,
            FlowState::AwaitingSelection { file, .. } => &file.name,
            FlowState::Succeeded { source, .. } | FlowState::Failed { source, .. } => source,
        }
    }

    /// The inspection of the file awaiting selection.
    pub fn inspection(&self) -> Option<&InspectionResult> {
        match self {
            FlowState::AwaitingSelection { inspection, .. } => Some(inspection),
            _ => None,
        }
    }

    /// Inline error from the last rejected selection.
    pub fn selection_error(&self) -> Option<&SelectionError> {
        match self {
            FlowState::AwaitingSelection { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// Collapse a terminal state into an outcome; `None` for other states.
    pub fn outcome(&self) -> Option<ConversionOutcome> {
        match self {
            FlowState::Succeeded { source, artifact } => Some(ConversionOutcome::Succeeded {
                source: source.clone(),
                artifact: artifact.clone(),
            }),
            FlowState::Failed { source, error } => Some(ConversionOutcome::Failed {
                source: source.clone(),
                message: error.to_string(),
            }),
            _ => None,
        }
    }
}

/// What the caller wants converted once a file is inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRequest {
    /// Whatever the flow pre-selected for this file.
    Default,
    /// "Convert all"; permitted only when the inspection allows it.
    All,
    /// A page spec typed in "selected pages" mode.
    Spec(String),
    /// An already-built page set (page grid, presets).
    Pages(PageSet),
}

impl std::str::FromStr for SelectionRequest {
    type Err = std::convert::Infallible;

    /// `"all"` (any case) is [`SelectionRequest::All`], anything else a spec.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("all") {
            SelectionRequest::All
        } else {
            SelectionRequest::Spec(s.to_string())
        })
    }
}

// ── Bulk run ─────────────────────────────────────────────────────────────

/// Running tally of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkRunState {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    /// Names of files that failed, in run order.
    pub failed: Vec<String>,
}

impl BulkRunState {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: &ConversionOutcome) {
        self.completed += 1;
        match outcome {
            ConversionOutcome::Succeeded { .. } => self.succeeded += 1,
            ConversionOutcome::Failed { source, .. } => self.failed.push(source.clone()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }

    /// `"Done: ok/n"`.
    pub fn summary(&self) -> String {
        run_summary_message(self.succeeded, self.total)
    }
}

/// Final result of a bulk run: the tally plus every per-file outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub state: BulkRunState,
    pub outcomes: Vec<ConversionOutcome>,
}

// ── Mode selection ───────────────────────────────────────────────────────

/// Which flow a set of dropped files gets.
#[derive(Debug)]
pub enum RunPlan {
    /// Nothing to do.
    Empty,
    Single(UploadFile),
    Bulk(Vec<UploadFile>),
}

/// Decide between the single-file and bulk flow.
///
/// Non-PDF entries are ignored. Bulk needs a Pro plan and at least two PDFs;
/// otherwise the first PDF runs alone. When nothing is a PDF the first file
/// is kept so the single flow can reject it with a message.
pub fn plan_run(files: Vec<UploadFile>, plan: PlanTier) -> RunPlan {
    let (mut pdfs, others): (Vec<_>, Vec<_>) = files.into_iter().partition(is_pdf_file);
    if !others.is_empty() {
        debug!("Ignoring {} non-PDF file(s)", others.len());
    }

    if plan.is_pro() && pdfs.len() >= 2 {
        return RunPlan::Bulk(pdfs);
    }
    if !pdfs.is_empty() {
        return RunPlan::Single(pdfs.swap_remove(0));
    }
    match others.into_iter().next() {
        Some(file) => RunPlan::Single(file),
        None => RunPlan::Empty,
    }
}

/// Result of [`ConversionOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunReport {
    Empty,
    Single { outcome: ConversionOutcome },
    Bulk { summary: BulkSummary },
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Drives conversion flows against a [`ConversionApi`].
///
/// Owns the flow state and the quota snapshot; both change only through its
/// methods. Every call into the service is awaited before the next one
/// starts.
///
/// # Example
/// ```rust,no_run
/// # async fn demo() -> Result<(), tabularis::TabularisError> {
/// use std::sync::Arc;
/// use tabularis::{
///     ClientConfig, ConversionOrchestrator, DirectorySink, HttpConversionApi,
///     SelectionRequest, UploadFile,
/// };
///
/// let config = ClientConfig::builder().access_token("token").build()?;
/// let api = Arc::new(HttpConversionApi::new(&config)?);
/// let sink = Arc::new(DirectorySink::from_config(&config));
/// let mut flow = ConversionOrchestrator::new(api, sink);
/// flow.refresh_quota().await?;
///
/// let file = UploadFile::from_path("statement.pdf").await?;
/// let outcome = flow
///     .run_single(file, SelectionRequest::Spec("1-3".into()))
///     .await;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct ConversionOrchestrator {
    api: Arc<dyn ConversionApi>,
    sink: Arc<dyn ArtifactSink>,
    quota: QuotaGate,
    plan_override: Option<PlanTier>,
    progress: ProgressCallback,
    state: FlowState,
}

impl fmt::Debug for ConversionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOrchestrator")
            .field("quota", &self.quota)
            .field("plan_override", &self.plan_override)
            .field("state", &self.state.step())
            .finish()
    }
}

impl ConversionOrchestrator {
    /// A new orchestrator. The quota starts unlimited until
    /// [`Self::refresh_quota`] or [`Self::set_quota`] says otherwise.
    pub fn new(api: Arc<dyn ConversionApi>, sink: Arc<dyn ArtifactSink>) -> Self {
        Self {
            api,
            sink,
            quota: QuotaGate::unlimited(),
            plan_override: None,
            progress: Arc::new(NoopProgressCallback),
            state: FlowState::Idle,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Apply `plan` to every account snapshot read from now on.
    pub fn with_plan_override(mut self, plan: Option<PlanTier>) -> Self {
        self.plan_override = plan;
        self
    }

    pub fn with_quota(mut self, quota: QuotaGate) -> Self {
        self.quota = quota;
        self
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    pub fn set_quota(&mut self, quota: QuotaGate) {
        self.quota = quota;
        self.progress.on_quota_refreshed(&self.quota);
    }

    /// Re-read plan and usage from the service.
    pub async fn refresh_quota(&mut self) -> Result<&QuotaGate, ApiError> {
        let account = self.api.account().await?;
        self.quota = QuotaGate::from_account(account, self.plan_override);
        debug!(
            "Quota refreshed: {} {}",
            self.quota.plan(),
            self.quota.usage_label()
        );
        self.progress.on_quota_refreshed(&self.quota);
        Ok(&self.quota)
    }

    /// [`Self::refresh_quota`] for after a run: failures are logged only.
    async fn refresh_quota_after_run(&mut self) {
        if let Err(e) = self.refresh_quota().await {
            warn!("Could not refresh usage: {}", e);
        }
    }

    fn transition(&mut self, state: FlowState) {
        debug!(
            "Flow {} → {} ({})",
            self.state.step(),
            state.step(),
            state.file_name()
        );
        self.state = state;
        self.progress.on_step(self.state.file_name(), self.state.step());
    }

    fn fail(&mut self, source: String, error: TabularisError) {
        warn!("{}: {}", source, error);
        self.transition(FlowState::Failed { source, error });
    }

    fn quota_exceeded(&self) -> TabularisError {
        TabularisError::QuotaExceeded {
            used: self.quota.used(),
            limit: self.quota.limit(),
            resets_in: self.quota.time_until_reset(Utc::now()),
        }
    }

    // ── Single-file flow ─────────────────────────────────────────────────

    /// Start a flow for `file`, replacing whatever flow was in progress.
    ///
    /// Ends in `AwaitingSelection` when inspection succeeds, otherwise in
    /// `Failed`.
    pub async fn begin(&mut self, file: UploadFile) -> &FlowState {
        if !self.quota.can_start() {
            let error = self.quota_exceeded();
            self.fail(file.name, error);
            return &self.state;
        }
        if !is_pdf_file(&file) {
            let error = TabularisError::NotAPdf {
                name: file.name.clone(),
            };
            self.fail(file.name, error);
            return &self.state;
        }

        self.transition(FlowState::Inspecting {
            file_name: file.name.clone(),
        });
        let inspected = self.api.inspect(&file).await;
        match inspected {
            Ok(inspection) => {
                info!(
                    "Inspected {}: {} page(s), convert all {}",
                    file.name,
                    inspection.total_pages,
                    if inspection.can_convert_all {
                        "permitted"
                    } else {
                        "not permitted"
                    }
                );
                let selection =
                    SelectionValidator::new(SelectionLimits::from(&inspection)).default_selection();
                self.transition(FlowState::AwaitingSelection {
                    file,
                    inspection,
                    selection,
                    error: None,
                });
            }
            Err(e) => self.fail(file.name, e.into()),
        }
        &self.state
    }

    /// Parse and validate `spec` against the file awaiting selection,
    /// without changing state. Used for live feedback while typing.
    pub fn preview(&self, spec: &str) -> Result<PageSet, TabularisError> {
        let inspection = self
            .state
            .inspection()
            .ok_or_else(|| TabularisError::InvalidState {
                action: "preview a selection",
                state: self.state.step().as_str(),
            })?;
        Ok(SelectionValidator::new(SelectionLimits::from(inspection)).check_spec(spec)?)
    }

    /// Confirm a selection and convert.
    ///
    /// A rejected selection returns to `AwaitingSelection` with the inline
    /// error set; nothing is sent to the service. Only calling this outside
    /// `AwaitingSelection` is an `Err`.
    pub async fn confirm(&mut self, request: SelectionRequest) -> Result<&FlowState, TabularisError> {
        if self.state.step() != FlowStep::AwaitingSelection {
            return Err(TabularisError::InvalidState {
                action: "confirm a selection",
                state: self.state.step().as_str(),
            });
        }
        let FlowState::AwaitingSelection {
            file,
            inspection,
            selection: current,
            ..
        } = std::mem::take(&mut self.state)
        else {
            return Err(TabularisError::Internal("flow state changed during confirm".into()));
        };

        self.transition(FlowState::Validating {
            file_name: file.name.clone(),
        });
        let validator = SelectionValidator::new(SelectionLimits::from(&inspection));
        let checked = match request {
            SelectionRequest::Default => validator.check(&current).map(|()| current.clone()),
            SelectionRequest::All => validator.check(&Selection::All).map(|()| Selection::All),
            SelectionRequest::Pages(set) => {
                let selection = Selection::Pages(set);
                validator.check(&selection).map(|()| selection)
            }
            SelectionRequest::Spec(spec) => validator.check_spec(&spec).map(Selection::Pages),
        };

        let selection = match checked {
            Ok(selection) => selection,
            Err(error) => {
                debug!("Selection rejected for {}: {}", file.name, error);
                self.transition(FlowState::AwaitingSelection {
                    file,
                    inspection,
                    selection: current,
                    error: Some(error),
                });
                return Ok(&self.state);
            }
        };

        let pages = selection.to_spec();
        self.transition(FlowState::Converting {
            file_name: file.name.clone(),
            pages: pages.clone(),
        });
        let converted = self.convert_and_save(&file, pages.as_deref()).await;
        match converted {
            Ok(artifact) => {
                info!("Converted {} → {}", file.name, artifact.filename);
                self.transition(FlowState::Succeeded {
                    source: file.name,
                    artifact,
                });
                self.refresh_quota_after_run().await;
            }
            Err(error) => self.fail(file.name, error),
        }
        Ok(&self.state)
    }

    /// Abandon the file awaiting selection.
    pub fn cancel(&mut self) {
        if self.state.step() == FlowStep::AwaitingSelection {
            debug!("Selection cancelled for {}", self.state.file_name());
            self.transition(FlowState::Idle);
        }
    }

    /// Back to `Idle` from any state.
    pub fn reset(&mut self) {
        if self.state.step() != FlowStep::Idle {
            self.transition(FlowState::Idle);
        }
    }

    /// Run a whole single-file flow non-interactively.
    ///
    /// A rejected selection ends the flow as `Failed` since there is nobody
    /// to correct it.
    pub async fn run_single(
        &mut self,
        file: UploadFile,
        request: SelectionRequest,
    ) -> ConversionOutcome {
        self.begin(file).await;
        if self.state.step() == FlowStep::AwaitingSelection {
            let confirmed = self.confirm(request).await.map(|_| ());
            if let Err(e) = confirmed {
                let source = self.state.file_name().to_string();
                self.fail(source, e);
            }
        }
        if let Some(error) = self.state.selection_error().cloned() {
            let source = self.state.file_name().to_string();
            self.fail(source, error.into());
        }

        match self.state.outcome() {
            Some(outcome) => outcome,
            None => ConversionOutcome::Failed {
                source: self.state.file_name().to_string(),
                message: format!("Flow stopped while {}", self.state.step()),
            },
        }
    }

    async fn convert_and_save(
        &self,
        file: &UploadFile,
        pages: Option<&str>,
    ) -> Result<SavedArtifact, TabularisError> {
        let artifact = self.api.convert(file, pages).await?;
        self.sink.save(&artifact).await
    }

    // ── Bulk flow ────────────────────────────────────────────────────────

    /// Convert every file in full, one after another.
    ///
    /// Only Pro accounts may bulk convert. Any single-file flow in progress
    /// is reset first. Non-PDFs are recorded as failures without being
    /// uploaded. Per-file failures are recorded in the summary and never
    /// stop the run. Usage is refreshed at the end regardless of failures.
    pub async fn run_bulk(&mut self, files: Vec<UploadFile>) -> Result<BulkSummary, TabularisError> {
        if !self.quota.plan().is_pro() {
            return Err(TabularisError::BulkNotAvailable);
        }
        if !self.quota.can_start() {
            return Err(self.quota_exceeded());
        }
        self.reset();

        let total = files.len();
        let mut state = BulkRunState::new(total);
        let mut outcomes = Vec::with_capacity(total);
        info!("Bulk run: {} file(s)", total);
        self.progress.on_run_start(total);

        for (i, file) in files.into_iter().enumerate() {
            let index = i + 1;
            info!("{}", file_progress_message(index, total, &file.name));
            self.progress.on_file_start(index, total, &file.name);

            let converted = if is_pdf_file(&file) {
                self.convert_and_save(&file, None).await
            } else {
                Err(TabularisError::NotAPdf {
                    name: file.name.clone(),
                })
            };
            let outcome = match converted {
                Ok(artifact) => {
                    self.progress.on_file_complete(index, total, &artifact);
                    ConversionOutcome::Succeeded {
                        source: file.name,
                        artifact,
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("{} failed: {}", file.name, message);
                    self.progress.on_file_error(index, total, &file.name, &message);
                    ConversionOutcome::Failed {
                        source: file.name,
                        message,
                    }
                }
            };
            state.record(&outcome);
            outcomes.push(outcome);
        }

        info!("{}", state.summary());
        self.progress.on_run_complete(total, state.succeeded);
        self.refresh_quota_after_run().await;

        Ok(BulkSummary { state, outcomes })
    }

    /// Pick a flow for `files` with [`plan_run`] and run it.
    ///
    /// Single-file runs use `request`; bulk runs always convert all pages.
    pub async fn run(
        &mut self,
        files: Vec<UploadFile>,
        request: SelectionRequest,
    ) -> Result<RunReport, TabularisError> {
        match plan_run(files, self.quota.plan()) {
            RunPlan::Empty => Ok(RunReport::Empty),
            RunPlan::Single(file) => Ok(RunReport::Single {
                outcome: self.run_single(file, request).await,
            }),
            RunPlan::Bulk(files) => Ok(RunReport::Bulk {
                summary: self.run_bulk(files).await?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, media: Option<&str>) -> UploadFile {
        UploadFile::new(name, media.map(str::to_string), b"%PDF-1.7".to_vec())
    }

    #[test]
    fn plan_run_single_for_free() {
        let files = vec![file("a.pdf", None), file("b.pdf", None)];
        match plan_run(files, PlanTier::Free) {
            RunPlan::Single(f) => assert_eq!(f.name, "a.pdf"),
            other => panic!("expected single, got {other:?}"),
        }
    }

    #[test]
    fn plan_run_bulk_for_pro() {
        let files = vec![
            file("a.pdf", None),
            file("notes.txt", Some("text/plain")),
            file("scan", Some("application/pdf")),
        ];
        match plan_run(files, PlanTier::Pro) {
            RunPlan::Bulk(f) => {
                let names: Vec<_> = f.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["a.pdf", "scan"]);
            }
            other => panic!("expected bulk, got {other:?}"),
        }
    }

    #[test]
    fn plan_run_pro_with_one_pdf_is_single() {
        let files = vec![file("notes.txt", Some("text/plain")), file("b.PDF", None)];
        match plan_run(files, PlanTier::Pro) {
            RunPlan::Single(f) => assert_eq!(f.name, "b.PDF"),
            other => panic!("expected single, got {other:?}"),
        }
    }

    #[test]
    fn plan_run_without_pdfs() {
        assert!(matches!(plan_run(vec![], PlanTier::Pro), RunPlan::Empty));
        match plan_run(vec![file("x.docx", None)], PlanTier::Free) {
            RunPlan::Single(f) => assert_eq!(f.name, "x.docx"),
            other => panic!("expected single, got {other:?}"),
        }
    }

    #[test]
    fn bulk_state_tally() {
        let mut s = BulkRunState::new(3);
        let ok = ConversionOutcome::Succeeded {
            source: "a.pdf".into(),
            artifact: SavedArtifact {
                filename: "a.xlsx".into(),
                location: None,
                size_bytes: 1,
            },
        };
        let failed = ConversionOutcome::Failed {
            source: "b.pdf".into(),
            message: "boom".into(),
        };
        s.record(&ok);
        s.record(&failed);
        assert!(!s.is_finished());
        s.record(&ok);
        assert!(s.is_finished());
        assert_eq!(s.succeeded, 2);
        assert_eq!(s.failed, vec!["b.pdf".to_string()]);
        assert_eq!(s.summary(), "Done: 2/3");
    }

    #[test]
    fn selection_request_from_str() {
        assert_eq!("ALL".parse::<SelectionRequest>().unwrap(), SelectionRequest::All);
        assert_eq!(
            "1-3".parse::<SelectionRequest>().unwrap(),
            SelectionRequest::Spec("1-3".into())
        );
    }

    #[test]
    fn step_names() {
        assert_eq!(FlowStep::AwaitingSelection.to_string(), "awaiting selection");
        assert!(FlowStep::Failed.is_terminal());
        assert!(!FlowStep::Converting.is_terminal());
        assert_eq!(FlowState::default().step(), FlowStep::Idle);
    }
}
