//! Shared request pieces and integer money helpers.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A product/quantity pair used by transfers and returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Pagination parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Maximum number of rows a paginated list may return.
pub const MAX_PAGE_LIMIT: i64 = 500;

fn default_limit() -> i64 {
    100
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Page {
    /// Clamp limit and offset into a safe range.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
            offset: self.offset.max(0),
        }
    }
}

/// Require a non-blank string field.
pub fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Require an amount in minor units to be zero or more.
pub fn require_non_negative(value: i64, field: &str) -> Result<(), AppError> {
    if value < 0 {
        return Err(AppError::Validation(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

/// Validate a list of line items: non-empty, ids present, quantities positive.
pub fn validate_lines<'a, I>(lines: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut count = 0;
    for (product_id, quantity) in lines {
        count += 1;
        require_text(product_id, "productId")?;
        if quantity <= 0 {
            return Err(AppError::Validation(format!(
                "Quantity for product {} must be positive",
                product_id
            )));
        }
    }
    if count == 0 {
        return Err(AppError::Validation("At least one item is required".to_string()));
    }
    Ok(())
}

/// `quantity * unit_amount`, rejecting overflow.
pub fn line_total(quantity: i64, unit_amount: i64) -> Result<i64, AppError> {
    quantity
        .checked_mul(unit_amount)
        .ok_or_else(|| AppError::Validation("Line amount is too large".to_string()))
}

/// Sum amounts, rejecting overflow.
pub fn sum_amounts<I: IntoIterator<Item = i64>>(amounts: I) -> Result<i64, AppError> {
    amounts.into_iter().try_fold(0i64, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| AppError::Validation("Total amount is too large".to_string()))
    })
}

/// Share of `total` attributable to `part` out of `whole`, rounded down.
///
/// Used to spread a sale-level discount across returned lines.
pub fn prorate(part: i64, total: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return 0;
    }
    ((part as i128 * total as i128) / whole as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prorate_spreads_discount() {
        // subtotal 1000, total 900 after discount; a 250 line is worth 225
        assert_eq!(prorate(250, 900, 1000), 225);
        assert_eq!(prorate(1000, 900, 1000), 900);
        assert_eq!(prorate(333, 100, 1000), 33);
        assert_eq!(prorate(10, 10, 0), 0);
    }

    #[test]
    fn test_line_total_overflow() {
        assert_eq!(line_total(3, 250).unwrap(), 750);
        assert!(line_total(i64::MAX, 2).is_err());
        assert!(sum_amounts([i64::MAX, 1]).is_err());
        assert_eq!(sum_amounts([1, 2, 3]).unwrap(), 6);
    }

    #[test]
    fn test_validate_lines() {
        assert!(validate_lines(Vec::<(&str, i64)>::new()).is_err());
        assert!(validate_lines([("p1", 0)]).is_err());
        assert!(validate_lines([("", 1)]).is_err());
        assert!(validate_lines([("p1", 2), ("p2", 1)]).is_ok());
    }

    #[test]
    fn test_page_clamped() {
        let page = Page {
            limit: 10_000,
            offset: -5,
        }
        .clamped();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.offset, 0);
    }
}
