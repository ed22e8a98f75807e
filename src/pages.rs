//! Page-specification codec: `"1,3,5-7"` ⇄ canonical page set.
//!
//! ## Grammar
//!
//! ```text
//! spec  := token ("," token)*
//! token := INT | INT "-" INT
//! ```
//!
//! Whitespace around tokens and around the `-` is ignored. Range tokens are
//! order-independent (`"7-3"` means pages 3 to 7). An empty or blank spec is
//! the empty set, the semantic "no explicit selection".
//!
//! ## Representation
//!
//! [`PageSet`] keeps its pages as a sorted list of maximal runs of
//! consecutive pages rather than one entry per page. A spec such as
//! `"1-4000000"` therefore costs one [`PageRange`], not four million
//! integers, while iteration still yields every page in ascending order.
//! Because the runs are always maximal, [`serialize`] is a direct rendering
//! of the stored runs and is the unique fewest-token form of the set.

use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A closed interval of pages `[start, end]`, `1 <= start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Build a range from two endpoints in either order.
    ///
    /// Returns `None` when either endpoint is zero.
    pub fn new(a: u32, b: u32) -> Option<Self> {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        (start >= 1).then_some(Self { start, end })
    }

    /// A single-page range.
    pub fn single(page: u32) -> Option<Self> {
        Self::new(page, page)
    }

    /// Number of pages in the range.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always `false`; a range holds at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, page: u32) -> bool {
        self.start <= page && page <= self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Canonical, deduplicated, ascending set of 1-indexed page numbers.
///
/// Invariant: `ranges` is sorted and every two neighbours are separated by
/// at least one missing page (`prev.end + 1 < next.start`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PageSet {
    ranges: Vec<PageRange>,
}

impl PageSet {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// `{1, 2, …, n}`; empty when `n == 0`.
    pub fn first_n(n: u32) -> Self {
        let mut set = Self::new();
        if let Some(range) = PageRange::new(1, n) {
            set.insert_range(range);
        }
        set
    }

    /// Build a set from arbitrary page numbers.
    ///
    /// Returns `None` if any page is zero.
    pub fn from_pages<I: IntoIterator<Item = u32>>(pages: I) -> Option<Self> {
        let ranges = pages
            .into_iter()
            .map(PageRange::single)
            .collect::<Option<Vec<_>>>()?;
        Some(Self::from_unsorted(ranges))
    }

    /// Sort then merge in one pass, whatever order the ranges arrive in.
    fn from_unsorted(mut ranges: Vec<PageRange>) -> Self {
        ranges.sort_unstable_by_key(|r| r.start);
        let mut merged: Vec<PageRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// Number of pages in the set.
    pub fn len(&self) -> usize {
        self.ranges.iter().map(PageRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Smallest page, if any.
    pub fn first(&self) -> Option<u32> {
        self.ranges.first().map(|r| r.start)
    }

    /// Largest page, if any.
    pub fn last(&self) -> Option<u32> {
        self.ranges.last().map(|r| r.end)
    }

    pub fn contains(&self, page: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.end < page);
        self.ranges.get(idx).is_some_and(|r| r.contains(page))
    }

    /// The maximal runs of consecutive pages, ascending.
    pub fn ranges(&self) -> &[PageRange] {
        &self.ranges
    }

    /// Every page in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.start..=r.end)
    }

    /// Collect every page into a `Vec`.
    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }

    /// Union a range into the set, merging with any overlapping or adjacent runs.
    pub fn insert_range(&mut self, range: PageRange) {
        // First run that overlaps or touches `range` from the left.
        let lo = self
            .ranges
            .partition_point(|r| r.end.saturating_add(1) < range.start);
        // First run lying strictly beyond `range` with a gap.
        let hi = self
            .ranges
            .partition_point(|r| r.start <= range.end.saturating_add(1));

        let mut merged = range;
        if lo < hi {
            merged.start = merged.start.min(self.ranges[lo].start);
            merged.end = merged.end.max(self.ranges[hi - 1].end);
        }
        self.ranges.splice(lo..hi, std::iter::once(merged));
    }

    /// Insert one page. Returns `false` for page zero.
    pub fn insert(&mut self, page: u32) -> bool {
        match PageRange::single(page) {
            Some(r) => {
                self.insert_range(r);
                true
            }
            None => false,
        }
    }

    /// Remove one page, splitting its run if needed. Returns whether it was present.
    pub fn remove(&mut self, page: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.end < page);
        let Some(run) = self.ranges.get(idx).copied() else {
            return false;
        };
        if !run.contains(page) {
            return false;
        }

        let left = (page > run.start).then(|| PageRange {
            start: run.start,
            end: page - 1,
        });
        let right = (page < run.end).then(|| PageRange {
            start: page + 1,
            end: run.end,
        });
        self.ranges.splice(idx..=idx, left.into_iter().chain(right));
        true
    }

    /// The set with `[from, to]` added, both ends clamped into `1..=total`.
    ///
    /// This is the "add range" editor action: the endpoints may be typed in
    /// either order and outside the document. The edit is rejected with
    /// [`SelectionError::TooManyPages`] when the result would exceed `max`.
    pub fn with_range(
        &self,
        from: u32,
        to: u32,
        total: u32,
        max: usize,
    ) -> Result<PageSet, SelectionError> {
        let mut next = self.clone();
        if total == 0 {
            return Ok(next);
        }
        let a = from.clamp(1, total);
        let b = to.clamp(1, total);
        if let Some(range) = PageRange::new(a, b) {
            next.insert_range(range);
        }
        if next.len() > max {
            return Err(SelectionError::TooManyPages {
                selected: next.len(),
                max,
            });
        }
        Ok(next)
    }

    /// The set with `page` flipped: removed if present, added otherwise.
    ///
    /// Adding is rejected with [`SelectionError::TooManyPages`] once the set
    /// already holds `max` pages. Page zero is rejected as an invalid spec.
    pub fn toggled(&self, page: u32, max: usize) -> Result<PageSet, SelectionError> {
        let mut next = self.clone();
        if next.remove(page) {
            return Ok(next);
        }
        if !next.insert(page) {
            return Err(SelectionError::InvalidSpec {
                spec: page.to_string(),
                token: page.to_string(),
            });
        }
        if next.len() > max {
            return Err(SelectionError::TooManyPages {
                selected: next.len(),
                max,
            });
        }
        Ok(next)
    }
}

impl fmt::Display for PageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

impl FromStr for PageSet {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl FromIterator<PageRange> for PageSet {
    fn from_iter<I: IntoIterator<Item = PageRange>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl Serialize for PageSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Parse a page spec into a [`PageSet`].
///
/// # Errors
/// [`SelectionError::InvalidSpec`] when the spec is non-blank and any token
/// is empty, is not `INT` or `INT-INT`, or resolves to page zero.
///
/// # Example
/// ```rust
/// use tabularis::pages::parse;
///
/// let set = parse("1,3,5-7").unwrap();
/// assert_eq!(set.to_vec(), vec![1, 3, 5, 6, 7]);
/// assert!(parse("").unwrap().is_empty());
/// assert!(parse("3-1-2").is_err());
/// ```
pub fn parse(spec: &str) -> Result<PageSet, SelectionError> {
    if spec.trim().is_empty() {
        return Ok(PageSet::new());
    }

    let ranges = spec
        .split(',')
        .map(str::trim)
        .map(|token| {
            parse_token(token).ok_or_else(|| SelectionError::InvalidSpec {
                spec: spec.to_string(),
                token: token.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PageSet::from_unsorted(ranges))
}

/// Render a [`PageSet`] in its canonical fewest-token form, e.g. `"1-3,5"`.
///
/// Returns `""` for the empty set. `parse(&serialize(s)) == s` for every set.
pub fn serialize(pages: &PageSet) -> String {
    pages.to_string()
}

fn parse_token(token: &str) -> Option<PageRange> {
    match token.split_once('-') {
        Some((a, b)) => PageRange::new(parse_page(a)?, parse_page(b)?),
        None => PageRange::single(parse_page(token)?),
    }
}

/// A positive decimal integer that fits in `u32`. Signs, decimals and
/// exponents are rejected.
fn parse_page(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok().filter(|&n| n >= 1)
}
