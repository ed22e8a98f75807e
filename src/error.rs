//! Error types for the tabularis library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`SelectionError`] — **Inline**: the page selection the user typed is
//!   malformed or violates the document/plan limits. Recovered locally and
//!   shown next to the input; the conversion service is never contacted.
//!   Cheap to clone so it can live inside [`crate::orchestrator::FlowState`].
//!
//! * [`ApiError`] — **Remote**: an inspect/convert/account call failed. The
//!   human-readable message has already been extracted from the response.
//!   Never retried automatically.
//!
//! * [`TabularisError`] — **Reported**: everything a flow can end in. A
//!   single-file flow surfaces it as its `Failed` state; a bulk run records
//!   it against one filename and moves on. None of these are fatal to the
//!   process: every variant leaves the client ready for another attempt.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All reported failures of the tabularis library.
///
/// Selection failures use [`SelectionError`] and are wrapped here only when
/// a non-interactive caller (e.g. [`crate::orchestrator::ConversionOrchestrator::run_single`])
/// has nobody to show the inline message to.
#[derive(Debug, Error)]
pub enum TabularisError {
    // ── Selection errors ──────────────────────────────────────────────────
    /// The page selection was rejected before any API call.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The supplied file is neither declared as `application/pdf` nor named `*.pdf`.
    #[error("'{name}' is not a PDF file. Only PDF files can be converted.")]
    NotAPdf { name: String },

    /// Could not read a local input file.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Plan errors ───────────────────────────────────────────────────────
    /// The plan's conversion quota is used up.
    ///
    /// `resets_in` is best-effort advisory text ("2d 5h", "14m") and is empty
    /// when the account carries no usable reset timestamp.
    #[error("Conversion limit reached ({used}/{limit}).{}", resets_suffix(.resets_in))]
    QuotaExceeded {
        used: u32,
        limit: u32,
        resets_in: String,
    },

    /// A bulk run was requested on a plan that does not allow it.
    #[error("Bulk conversion is only available on the Pro plan")]
    BulkNotAvailable,

    // ── Remote errors ─────────────────────────────────────────────────────
    /// The conversion service rejected or failed a request.
    #[error(transparent)]
    Api(#[from] ApiError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write a converted artifact to disk.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Flow errors ───────────────────────────────────────────────────────
    /// An orchestrator method was called in a state that does not accept it.
    #[error("Cannot {action} while the flow is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn resets_suffix(resets_in: &str) -> String {
    if resets_in.is_empty() {
        String::new()
    } else {
        format!(" Resets in {resets_in}.")
    }
}

/// A page-selection failure, shown inline while the user edits the selection.
///
/// Display strings are the user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SelectionError {
    /// Malformed page-range text (bad token, zero, non-integer, empty token).
    #[error("Invalid page selection.")]
    InvalidSpec { spec: String, token: String },

    /// "Selected pages" mode with nothing selected.
    #[error("Select at least one page.")]
    EmptySelection,

    /// A page lies outside `1..=total`.
    #[error("Pages out of range.")]
    OutOfRange { page: u32, total: u32 },

    /// More pages selected than the plan allows.
    #[error("Too many pages (max {max}).")]
    TooManyPages { selected: usize, max: usize },

    /// "Convert all" was requested but the inspection does not permit it.
    #[error("Converting all pages is only available on the Pro plan.")]
    ConvertAllNotPermitted,
}

/// A failed call to the conversion service.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status, `None` for transport failures.
    pub status: Option<u16>,
    /// Human-readable message extracted from the response.
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}
