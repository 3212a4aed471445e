use crate::entity::Record;
use crate::error::ModelResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of a list or query request.
///
/// An ordered JSON object; later layers override earlier ones through
/// [`QueryParams::merged`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(Map<String, Value>);

impl QueryParams {
    /// Parameter name carrying the page number.
    pub const PAGE: &'static str = "page";
    /// Parameter name carrying the page size.
    pub const PAGE_SIZE: &'static str = "page_size";

    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Gets a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a copy of `self` with every parameter of `overrides` applied
    /// on top.
    #[must_use]
    pub fn merged(&self, overrides: &QueryParams) -> Self {
        let mut out = self.clone();
        for (name, value) in &overrides.0 {
            out.0.insert(name.clone(), value.clone());
        }
        out
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the parameters as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for QueryParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// What a list endpoint answered with.
///
/// Serializes back to the shape it was read from. Reading goes through
/// [`ListResponse::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    /// A bare array of records.
    Items(Vec<T>),
    /// A page of records with the server-side total.
    Page { data: Vec<T>, total: u64 },
    /// Anything else. Containers treat this as an empty result.
    Unrecognized(Value),
}

impl<T: Record> ListResponse<T> {
    /// Classifies a raw JSON response.
    ///
    /// Arrays become [`ListResponse::Items`]; objects with an array `data`
    /// and an integer `total` become [`ListResponse::Page`]. Elements that
    /// fail to deserialize are an error, not an unrecognized shape.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        match value {
            Value::Array(_) => Ok(Self::Items(serde_json::from_value(value)?)),
            Value::Object(mut obj) => {
                let has_data = matches!(obj.get("data"), Some(Value::Array(_)));
                match (has_data, obj.get("total").and_then(Value::as_u64)) {
                    (true, Some(total)) => {
                        let data = obj.remove("data").unwrap_or_default();
                        Ok(Self::Page {
                            data: serde_json::from_value(data)?,
                            total,
                        })
                    }
                    _ => Ok(Self::Unrecognized(Value::Object(obj))),
                }
            }
            other => Ok(Self::Unrecognized(other)),
        }
    }
}

impl<T> ListResponse<T> {
    /// Records carried by the response, empty for unrecognized shapes.
    #[must_use]
    pub fn items(&self) -> &[T] {
        match self {
            Self::Items(items) | Self::Page { data: items, .. } => items,
            Self::Unrecognized(_) => &[],
        }
    }

    /// Server-side total if the response is paged.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        match self {
            Self::Page { total, .. } => Some(*total),
            _ => None,
        }
    }
}

/// Page cursor and totals of a paginated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// A cursor at `page` with nothing loaded yet.
    #[must_use]
    pub const fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            total: 0,
            total_pages: 0,
        }
    }

    /// Returns the cursor with `total` applied and `total_pages` recomputed.
    #[must_use]
    pub fn with_total(self, total: u64) -> Self {
        Self {
            total,
            total_pages: Self::pages_for(total, self.page_size),
            ..self
        }
    }

    /// `ceil(total / page_size)`, zero when `page_size` is zero.
    #[must_use]
    pub fn pages_for(total: u64, page_size: u32) -> u32 {
        if page_size == 0 {
            return 0;
        }
        let pages = total.div_ceil(u64::from(page_size));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// The cursor as request parameters.
    #[must_use]
    pub fn to_params(&self) -> QueryParams {
        QueryParams::new()
            .with(QueryParams::PAGE, self.page)
            .with(QueryParams::PAGE_SIZE, self.page_size)
    }
}
