//! Selection validation: is this page set acceptable for this file and plan?
//!
//! Validation is a pure function of its inputs. It runs on every keystroke
//! of an interactive page editor, so it never allocates per page and never
//! mutates the [`PageSet`] it is given.

use crate::api::InspectionResult;
use crate::error::SelectionError;
use crate::pages::{self, PageSet};
use serde::Serialize;

/// What the user asked to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Selection {
    /// Every page ("convert all"). Sent to the service as no page spec.
    All,
    /// An explicit set of pages ("convert selected").
    Pages(PageSet),
}

impl Selection {
    /// Page spec to send with the convert call; `None` means all pages.
    pub fn to_spec(&self) -> Option<String> {
        match self {
            Selection::All => None,
            Selection::Pages(set) => Some(pages::serialize(set)),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

/// Bounds a selection must respect, taken from one file's inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionLimits {
    pub total_pages: u32,
    pub max_select_pages: u32,
    pub can_convert_all: bool,
    pub free_max_pages: u32,
}

impl From<&InspectionResult> for SelectionLimits {
    fn from(r: &InspectionResult) -> Self {
        Self {
            total_pages: r.total_pages,
            max_select_pages: r.max_select_pages,
            can_convert_all: r.can_convert_all,
            free_max_pages: r.free_max_pages,
        }
    }
}

/// Validates selections against the limits it was constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionValidator {
    limits: SelectionLimits,
}

impl SelectionValidator {
    pub fn new(limits: SelectionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SelectionLimits {
        &self.limits
    }

    /// The selection offered before the user touches anything.
    ///
    /// "Convert all" when the file permits it; otherwise the first
    /// `min(free_max_pages, total_pages)` pages.
    pub fn default_selection(&self) -> Selection {
        if self.limits.can_convert_all {
            Selection::All
        } else {
            Selection::Pages(PageSet::first_n(
                self.limits.free_max_pages.min(self.limits.total_pages),
            ))
        }
    }

    /// The "First N" preset: `1..=min(max_select_pages, total_pages)`.
    pub fn first_pages_preset(&self) -> PageSet {
        PageSet::first_n(self.limits.max_select_pages.min(self.limits.total_pages))
    }

    /// Check a full selection.
    ///
    /// "Convert all" skips page checks but is only accepted when the file
    /// permits it.
    pub fn check(&self, selection: &Selection) -> Result<(), SelectionError> {
        match selection {
            Selection::All if self.limits.can_convert_all => Ok(()),
            Selection::All => Err(SelectionError::ConvertAllNotPermitted),
            Selection::Pages(set) => validate(
                set,
                self.limits.total_pages,
                self.limits.max_select_pages as usize,
            ),
        }
    }

    /// Parse and check a page spec typed in "selected pages" mode.
    pub fn check_spec(&self, spec: &str) -> Result<PageSet, SelectionError> {
        let set = pages::parse(spec)?;
        validate(
            &set,
            self.limits.total_pages,
            self.limits.max_select_pages as usize,
        )?;
        Ok(set)
    }
}

/// Validate an explicit ("selected pages") selection.
///
/// Checks, in order: non-empty, every page within `1..=total_pages`, at most
/// `max_select` pages.
pub fn validate(pages: &PageSet, total_pages: u32, max_select: usize) -> Result<(), SelectionError> {
    if pages.is_empty() {
        return Err(SelectionError::EmptySelection);
    }
    // Sorted runs: only the extremes can be out of range.
    if let Some(page) = pages
        .first()
        .filter(|&p| p < 1)
        .or_else(|| pages.last().filter(|&p| p > total_pages))
    {
        return Err(SelectionError::OutOfRange {
            page,
            total: total_pages,
        });
    }
    let selected = pages.len();
    if selected > max_select {
        return Err(SelectionError::TooManyPages {
            selected,
            max: max_select,
        });
    }
    Ok(())
}
