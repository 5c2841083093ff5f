//! Request validation.
//!
//! Bodies and query strings are validated before they reach the repository or
//! the catalog. Every failure is a 400 with the offending field named.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use serde::Deserialize;
use std::fmt;

use crate::error::AppError;
use crate::repository::Page;

/// Longest accepted product id, in characters.
pub const MAX_PRODUCT_ID_LEN: usize = 255;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_POPULAR_LIMIT: usize = 10;

/// Validation error detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field that failed validation (if applicable).
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

#[derive(Debug, Deserialize)]
struct RawFavoriteBody {
    product_id: Option<serde_json::Value>,
    #[serde(default)]
    notes: Option<String>,
}

/// A validated `POST /favorites/` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFavorite {
    pub product_id: String,
    pub notes: String,
}

/// Parses and validates a favorite body.
///
/// # Errors
///
/// Returns a validation error for malformed JSON, a missing or non-string
/// `product_id`, or a `product_id` outside 1..=255 characters.
pub fn parse_new_favorite(body: &[u8]) -> ValidationResult<NewFavorite> {
    let raw: RawFavoriteBody = serde_json::from_slice(body)
        .map_err(|e| ValidationError::new(format!("Invalid JSON body: {e}")))?;

    let product_id = match raw.product_id {
        Some(serde_json::Value::String(id)) => id,
        Some(_) => {
            return Err(ValidationError::for_field(
                "product_id",
                "must be a string",
            ));
        }
        None => return Err(ValidationError::for_field("product_id", "is required")),
    };
    validate_product_id(&product_id)?;

    Ok(NewFavorite {
        product_id,
        notes: raw.notes.unwrap_or_default(),
    })
}

/// Checks the product id length bounds.
///
/// # Errors
///
/// Returns a validation error for empty or overlong ids.
pub fn validate_product_id(product_id: &str) -> ValidationResult {
    let len = product_id.chars().count();
    if len == 0 {
        return Err(ValidationError::for_field("product_id", "cannot be empty"));
    }
    if len > MAX_PRODUCT_ID_LEN {
        return Err(ValidationError::for_field(
            "product_id",
            format!("cannot exceed {MAX_PRODUCT_ID_LEN} characters"),
        ));
    }
    Ok(())
}

/// Raw pagination query; values are validated by [`Pagination::parse`].
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Validated pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    /// Zero means no limit.
    pub limit: usize,
}

impl Pagination {
    /// # Errors
    ///
    /// Returns a validation error for non-numeric values or `page < 1`.
    pub fn parse(query: &PageQuery) -> ValidationResult<Self> {
        let page = parse_number("page", query.page.as_deref(), 1)?;
        if page < 1 {
            return Err(ValidationError::for_field("page", "must be at least 1"));
        }
        let limit = parse_number("limit", query.limit.as_deref(), DEFAULT_PAGE_SIZE)?;
        Ok(Self { page, limit })
    }

    /// Repository window for this page.
    #[must_use]
    pub const fn window(&self) -> Page {
        if self.limit == 0 {
            return Page {
                skip: 0,
                limit: None,
            };
        }
        Page {
            skip: self.page.saturating_sub(1).saturating_mul(self.limit),
            limit: Some(self.limit),
        }
    }

    /// `ceil(count / limit)`, or 1 without a limit.
    #[must_use]
    pub const fn total_pages(&self, count: u64) -> u64 {
        if self.limit == 0 {
            return 1;
        }
        count.div_ceil(self.limit as u64)
    }
}

/// Parses `?limit=` on the popular products endpoint.
///
/// # Errors
///
/// Returns a validation error for non-numeric values.
pub fn parse_popular_limit(limit: Option<&str>) -> ValidationResult<usize> {
    parse_number("limit", limit, DEFAULT_POPULAR_LIMIT)
}

fn parse_number(field: &str, value: Option<&str>, default: usize) -> ValidationResult<usize> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::for_field(field, "must be a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new_favorite() -> ValidationResult {
        let parsed = parse_new_favorite(br#"{"product_id": "P-1", "notes": "for later"}"#)?;
        assert_eq!(parsed.product_id, "P-1");
        assert_eq!(parsed.notes, "for later");

        let without_notes = parse_new_favorite(br#"{"product_id": "P-2"}"#)?;
        assert_eq!(without_notes.notes, "");
        Ok(())
    }

    #[test]
    fn test_parse_new_favorite_rejects_bad_bodies() {
        assert!(parse_new_favorite(b"{not json").is_err());
        assert!(parse_new_favorite(br#"{"notes": "x"}"#).is_err());
        assert!(parse_new_favorite(br#"{"product_id": 12}"#).is_err());
        assert!(parse_new_favorite(br#"{"product_id": ""}"#).is_err());
    }

    #[test]
    fn test_product_id_length_bounds() {
        let longest = "p".repeat(MAX_PRODUCT_ID_LEN);
        let too_long = "p".repeat(MAX_PRODUCT_ID_LEN + 1);

        assert!(validate_product_id(&longest).is_ok());
        assert_eq!(
            validate_product_id(&too_long).map_err(|e| e.field),
            Err(Some("product_id".to_string()))
        );
    }

    #[test]
    fn test_pagination_defaults() -> ValidationResult {
        let pagination = Pagination::parse(&PageQuery::default())?;
        assert_eq!(pagination, Pagination { page: 1, limit: 20 });
        assert_eq!(pagination.window(), Page::first(20));
        Ok(())
    }

    #[test]
    fn test_pagination_window_and_total_pages() -> ValidationResult {
        let pagination = Pagination::parse(&PageQuery {
            page: Some("3".to_string()),
            limit: Some("10".to_string()),
        })?;

        assert_eq!(pagination.window(), Page { skip: 20, limit: Some(10) });
        assert_eq!(pagination.total_pages(0), 0);
        assert_eq!(pagination.total_pages(21), 3);
        assert_eq!(pagination.total_pages(30), 3);
        Ok(())
    }

    #[test]
    fn test_zero_limit_means_everything() -> ValidationResult {
        let pagination = Pagination::parse(&PageQuery {
            page: Some("4".to_string()),
            limit: Some("0".to_string()),
        })?;

        assert_eq!(pagination.window(), Page { skip: 0, limit: None });
        assert_eq!(pagination.total_pages(57), 1);
        Ok(())
    }

    #[test]
    fn test_pagination_rejects_bad_values() {
        let bad = |page: &str, limit: &str| {
            Pagination::parse(&PageQuery {
                page: Some(page.to_string()),
                limit: Some(limit.to_string()),
            })
            .is_err()
        };

        assert!(bad("0", "10"));
        assert!(bad("-1", "10"));
        assert!(bad("one", "10"));
        assert!(bad("1", "ten"));
    }

    #[test]
    fn test_popular_limit() {
        assert_eq!(parse_popular_limit(None), Ok(10));
        assert_eq!(parse_popular_limit(Some("3")), Ok(3));
        assert!(parse_popular_limit(Some("many")).is_err());
    }
}
