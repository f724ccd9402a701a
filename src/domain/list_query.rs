//! Parameters of a paginated, sorted and filtered list, and their flat
//! key/value form (`page`, `perPage`, `sortBy`, `sortType`, then one entry
//! per filter) used for persisted queries and the order API alike.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const PAGE_KEY: &str = "page";
pub const PER_PAGE_KEY: &str = "perPage";
pub const SORT_BY_KEY: &str = "sortBy";
pub const SORT_TYPE_KEY: &str = "sortType";
pub const SEARCH_KEY: &str = "search";

/// Keys that never fold into filters.
pub const RESERVED_KEYS: [&str; 4] = [PAGE_KEY, PER_PAGE_KEY, SORT_BY_KEY, SORT_TYPE_KEY];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    #[default]
    Asc,
    Desc,
}

impl SortType {
    pub fn as_str(self) -> &'static str {
        match self {
            SortType::Asc => "asc",
            SortType::Desc => "desc",
        }
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortType::Asc),
            "desc" => Ok(SortType::Desc),
            other => Err(format!("unknown sort type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
    /// Server-supplied row count across all pages.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub by: String,
    pub direction: SortType,
}

/// Fallbacks for anything the persisted query does not provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDefaults {
    pub page: u32,
    pub per_page: u32,
    pub sorting: Sorting,
}

impl Default for ListDefaults {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            sorting: Sorting {
                by: "name".to_string(),
                direction: SortType::Asc,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQueryState {
    pub pagination: Pagination,
    pub sorting: Sorting,
    pub filters: BTreeMap<String, String>,
    pub loading: bool,
    pub error: Option<String>,
}

/// What a single list request asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    pub page: u32,
    pub per_page: u32,
    pub sort_by: String,
    pub sort_type: SortType,
    pub filters: BTreeMap<String, String>,
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

impl ListQueryState {
    /// Build the initial state from a persisted query. Reserved keys set
    /// pagination and sorting; every other key becomes a filter.
    pub fn initialize(persisted: &BTreeMap<String, String>, defaults: &ListDefaults) -> Self {
        let page = persisted
            .get(PAGE_KEY)
            .and_then(|v| parse_positive(v))
            .unwrap_or(defaults.page);
        let per_page = persisted
            .get(PER_PAGE_KEY)
            .and_then(|v| parse_positive(v))
            .unwrap_or(defaults.per_page);
        let by = persisted
            .get(SORT_BY_KEY)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| defaults.sorting.by.clone());
        let direction = persisted
            .get(SORT_TYPE_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sorting.direction);

        let filters = persisted
            .iter()
            .filter(|(key, _)| !is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            pagination: Pagination {
                page,
                per_page,
                total: 0,
            },
            sorting: Sorting { by, direction },
            filters,
            loading: false,
            error: None,
        }
    }

    pub fn params(&self) -> FetchParams {
        FetchParams {
            page: self.pagination.page,
            per_page: self.pagination.per_page,
            sort_by: self.sorting.by.clone(),
            sort_type: self.sorting.direction,
            filters: self.filters.clone(),
        }
    }
}

impl FetchParams {
    /// Flat key/value form. Filters with empty values are omitted.
    pub fn to_query(&self) -> BTreeMap<String, String> {
        let mut query = BTreeMap::new();
        query.insert(PAGE_KEY.to_string(), self.page.to_string());
        query.insert(PER_PAGE_KEY.to_string(), self.per_page.to_string());
        query.insert(SORT_BY_KEY.to_string(), self.sort_by.clone());
        query.insert(SORT_TYPE_KEY.to_string(), self.sort_type.to_string());
        for (key, value) in &self.filters {
            if !value.is_empty() && !is_reserved(key) {
                query.insert(key.clone(), value.clone());
            }
        }
        query
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// Leading-digit integer parse that only accepts values `>= 1`.
fn parse_positive(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    let digits = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed, |end| &trimmed[..end]);
    digits.parse::<u32>().ok().filter(|n| *n >= 1)
}
