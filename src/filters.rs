//! Pagination and sorting for list endpoints.
//!
//! Raw query strings are resolved into a [`Filters`] value exactly once. A
//! `Filters` can only be obtained through validation, so the sort column it
//! exposes is always a member of the endpoint's allow-list and is safe to
//! interpolate into an `ORDER BY` clause.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::validator::{ValidationErrors, Validator, permitted_value};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// ListParams
///
/// Query string accepted by every paginated endpoint. Values arrive as text so
/// that a non-numeric `page` is reported as a field error rather than a rejected request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Records per page, 1..=100 (default 20).
    pub page_size: Option<String>,
    /// Sort key; a leading `-` sorts descending.
    pub sort: Option<String>,
    /// Case-insensitive email substring (ikigai report only).
    pub search: Option<String>,
    /// Restrict to one user's records (admin activity listing only).
    pub user_id: Option<String>,
}

/// Filters
///
/// Validated paging and sort parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    page: i64,
    page_size: i64,
    sort: String,
}

/// SortSpec
///
/// Per-endpoint sort configuration: the default key and every accepted key.
#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub default: &'static str,
    pub safelist: &'static [&'static str],
}

impl Filters {
    /// Validates already-typed paging values against the bounds and `safelist`.
    pub fn new(
        page: i64,
        page_size: i64,
        sort: &str,
        safelist: &[&str],
    ) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let filters = Self {
            page,
            page_size,
            sort: sort.to_string(),
        };
        filters.validate(&mut v, safelist);
        v.finish().map(|()| filters)
    }

    /// Resolves raw query parameters, applying the defaults for absent values.
    /// Parse errors and bound violations are reported together.
    pub fn from_params(params: &ListParams, spec: SortSpec) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let filters = Self::read(params, spec, &mut v);
        v.finish().map(|()| filters)
    }

    /// Like [`Filters::from_params`] but records failures into a caller-owned
    /// validator, so endpoint-specific parameters can be checked in the same pass.
    pub fn read(params: &ListParams, spec: SortSpec, v: &mut Validator) -> Self {
        let filters = Self {
            page: read_int(params.page.as_deref(), "page", DEFAULT_PAGE, v),
            page_size: read_int(params.page_size.as_deref(), "page_size", DEFAULT_PAGE_SIZE, v),
            sort: params
                .sort
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| spec.default.to_string()),
        };
        filters.validate(v, spec.safelist);
        filters
    }

    fn validate(&self, v: &mut Validator, safelist: &[&str]) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        v.check(
            permitted_value(&self.sort.as_str(), safelist),
            "sort",
            "invalid sort value",
        );
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') {
            "DESC"
        } else {
            "ASC"
        }
    }
}

/// Parses an optional integer query value, recording a field error when it is not numeric.
pub fn read_int(raw: Option<&str>, field: &str, default: i64, v: &mut Validator) -> i64 {
    match raw {
        None | Some("") => default,
        Some(s) => match s.parse() {
            Ok(n) => n,
            Err(_) => {
                v.add_error(field, "must be an integer value");
                default
            }
        },
    }
}

/// Metadata
///
/// Pagination details returned next to every list. All fields are zero (and
/// omitted from the JSON) when the query matched no records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }

    pub fn for_filters(total_records: i64, filters: &Filters) -> Self {
        Self::calculate(total_records, filters.page(), filters.page_size())
    }
}
