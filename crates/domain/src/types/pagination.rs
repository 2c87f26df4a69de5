//! Pagination windows for sequenced requests.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGINATION_WINDOWS};
use crate::errors::{MarketLensError, Result};

/// One `(offset, limit)` request unit of a paginated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaginationWindow {
    pub offset: u64,
    pub limit: u64,
}

impl PaginationWindow {
    /// # Errors
    /// Returns `Validation` when `limit` is zero.
    pub fn new(offset: u64, limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(MarketLensError::Validation(
                "pagination limit must be greater than zero".to_string(),
            ));
        }
        Ok(Self { offset, limit })
    }

    /// Sort key used to restore sequence order after out-of-order
    /// completion.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.offset.saturating_add(self.limit)
    }
}

/// Split the inclusive record range `min..=max` into windows of at most
/// `limit` records. The final window carries the remainder when the range
/// is not evenly divisible.
///
/// # Errors
/// Returns `Validation` when `limit` is zero, `max < min`, the range
/// covers more than `u64::MAX` records, or it expands to more than
/// [`MAX_PAGINATION_WINDOWS`] windows.
pub fn compute_windows(min: u64, max: u64, limit: u64) -> Result<Vec<PaginationWindow>> {
    if limit == 0 {
        return Err(MarketLensError::Validation(
            "pagination limit must be greater than zero".to_string(),
        ));
    }
    if max < min {
        return Err(MarketLensError::Validation(format!(
            "pagination range is empty: max {max} is below min {min}"
        )));
    }

    let total = (max - min).checked_add(1).ok_or_else(|| {
        MarketLensError::Validation(format!(
            "pagination range {min}..={max} exceeds the addressable record count"
        ))
    })?;
    let num_pages = total.div_ceil(limit);
    if num_pages > MAX_PAGINATION_WINDOWS {
        return Err(MarketLensError::Validation(format!(
            "pagination range {min}..={max} with limit {limit} needs {num_pages} windows, \
             more than the {MAX_PAGINATION_WINDOWS} allowed"
        )));
    }
    let remainder = total % limit;

    // page * limit < total, so every offset stays at or below max.
    let windows = (0..num_pages)
        .map(|page| {
            let is_last = page + 1 == num_pages;
            let window_limit = if is_last && remainder != 0 { remainder } else { limit };
            PaginationWindow { offset: min + page * limit, limit: window_limit }
        })
        .collect();

    Ok(windows)
}

/// How a dispatch should be split into windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaginationPlan {
    /// One request with the caller-supplied offset and limit.
    Single { offset: u64, limit: u64 },

    /// Inclusive record range split into pages of `limit`.
    Sequenced { min: u64, max: u64, limit: u64 },
}

impl PaginationPlan {
    #[must_use]
    pub fn single(offset: u64, limit: u64) -> Self {
        Self::Single { offset, limit }
    }

    #[must_use]
    pub fn sequenced(min: u64, max: u64, limit: u64) -> Self {
        Self::Sequenced { min, max, limit }
    }

    /// Windows in logical sequence order.
    ///
    /// # Errors
    /// Returns `Validation` for a zero limit or an inverted range.
    pub fn windows(&self) -> Result<Vec<PaginationWindow>> {
        match *self {
            Self::Single { offset, limit } => Ok(vec![PaginationWindow::new(offset, limit)?]),
            Self::Sequenced { min, max, limit } => compute_windows(min, max, limit),
        }
    }
}

impl Default for PaginationPlan {
    fn default() -> Self {
        Self::Single { offset: 0, limit: DEFAULT_PAGE_LIMIT }
    }
}
