//! # tabularis
//!
//! Client for a PDF-to-spreadsheet conversion service: pick pages, check the
//! plan's quota, convert one file or many, save the results.
//!
//! ## Why this crate?
//!
//! The service does the table extraction. What remains on the client is the
//! part that is easy to get subtly wrong: page selections typed by people
//! ("1,3,5-7"), plan limits that must be enforced before a request is spent,
//! and a multi-file run that must keep going when one file fails. Each of
//! these is a plain function or a small state machine here, independent of
//! any UI.
//!
//! ## Flow Overview
//!
//! ```text
//! PDF file(s)
//!  │
//!  ├─ 1. Gate      QuotaGate::can_start, is_pdf_file (no network)
//!  ├─ 2. Inspect   POST /inspect → page count, plan limits
//!  ├─ 3. Select    pages::parse → SelectionValidator::check
//!  ├─ 4. Convert   POST /convert (pages omitted = all)
//!  ├─ 5. Save      ArtifactSink (atomic write into the output directory)
//!  └─ 6. Refresh   GET /me → updated usage
//! ```
//!
//! Pro accounts with two or more PDFs skip steps 2–3 and run a sequential
//! bulk conversion of every page of every file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabularis::{
//!     ClientConfig, ConversionOrchestrator, DirectorySink, HttpConversionApi, RunReport,
//!     SelectionRequest, UploadFile,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .api_base_url("https://convert.example.com/api")
//!         .access_token(std::env::var("TABULARIS_TOKEN")?)
//!         .build()?;
//!     let api = Arc::new(HttpConversionApi::new(&config)?);
//!     let sink = Arc::new(DirectorySink::from_config(&config));
//!     let mut flow = ConversionOrchestrator::new(api, sink);
//!     flow.refresh_quota().await?;
//!
//!     let files = vec![UploadFile::from_path("q3-report.pdf").await?];
//!     match flow.run(files, "1-3,5".parse()?).await? {
//!         RunReport::Single { outcome } => println!("{outcome:?}"),
//!         RunReport::Bulk { summary } => println!("{}", summary.state.summary()),
//!         RunReport::Empty => {}
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tabularis` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! tabularis = { version = "0.1", default-features = false }
//! ```
//!
//! ## Plans
//!
//! | Plan | Quota | Convert all | Bulk |
//! |------|-------|-------------|------|
//! | Free trial | `conversions_limit` per period | when the service allows it for the file | no |
//! | Pro | unlimited (`limit = 0`) | yes | yes |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pages;
pub mod progress;
pub mod quota;
pub mod selection;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{
    is_pdf_file, ConversionApi, ConvertedArtifact, HttpConversionApi, InspectionResult,
    UploadFile,
};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ApiError, SelectionError, TabularisError};
pub use orchestrator::{
    plan_run, BulkRunState, BulkSummary, ConversionOrchestrator, FlowState, FlowStep, RunPlan,
    RunReport, SelectionRequest,
};
pub use output::{ArtifactSink, ConversionOutcome, DirectorySink, SavedArtifact};
pub use pages::{PageRange, PageSet};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use quota::{AccountSnapshot, PlanTier, QuotaGate};
pub use selection::{Selection, SelectionLimits, SelectionValidator};
