//! Query options for collection and item fetches.

use serde::{Deserialize, Deserializer, Serialize};

/// Options for a list fetch, translated into OData query parameters.
///
/// Field lists (`select`, `expand`) may be given in configuration either as
/// a comma-separated string or as an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ListQueryOptions {
    #[serde(default, deserialize_with = "deserialize_field_list")]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub top: Option<u32>,
    #[serde(default)]
    pub skip: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_field_list")]
    pub expand: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldList {
    Joined(String),
    Items(Vec<String>),
}

fn deserialize_field_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<FieldList> = Option::deserialize(deserializer)?;
    Ok(raw.map(|list| match list {
        FieldList::Joined(s) => s.split(',').map(str::to_string).collect(),
        FieldList::Items(items) => items,
    }))
}

impl ListQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn expand<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Canonical form used for cache identity.
    ///
    /// Field lists are trimmed, deduplicated and sorted (selection order does
    /// not change the result set); blank strings and empty lists collapse to
    /// `None`.
    pub fn normalized(&self) -> Self {
        Self {
            select: normalize_fields(self.select.as_deref()),
            filter: normalize_text(self.filter.as_deref()),
            order_by: normalize_text(self.order_by.as_deref()),
            top: self.top,
            skip: self.skip.filter(|s| *s > 0),
            expand: normalize_fields(self.expand.as_deref()),
        }
    }

    /// Query parameters for a collection fetch. `$top` falls back to the
    /// configured page size when not set.
    pub fn collection_params(&self, default_page_size: u32) -> Vec<(&'static str, String)> {
        self.params(Some(default_page_size))
    }

    /// Query parameters, with `$top` only emitted when set here or defaulted.
    pub fn params(&self, default_top: Option<u32>) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(select) = joined(self.select.as_deref()) {
            params.push(("$select", select));
        }
        if let Some(filter) = normalize_text(self.filter.as_deref()) {
            params.push(("$filter", filter));
        }
        if let Some(order_by) = normalize_text(self.order_by.as_deref()) {
            params.push(("$orderby", order_by));
        }
        if let Some(top) = self.top.or(default_top) {
            params.push(("$top", top.to_string()));
        }
        if let Some(skip) = self.skip.filter(|s| *s > 0) {
            params.push(("$skip", skip.to_string()));
        }
        if let Some(expand) = joined(self.expand.as_deref()) {
            params.push(("$expand", expand));
        }
        params
    }

    /// Query parameters for a single-record fetch (only select and expand apply).
    pub fn item_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(select) = joined(self.select.as_deref()) {
            params.push(("$select", select));
        }
        if let Some(expand) = joined(self.expand.as_deref()) {
            params.push(("$expand", expand));
        }
        params
    }

    /// Compact description for log lines and key display.
    pub fn describe(&self) -> String {
        let normalized = self.normalized();
        let mut parts = Vec::new();
        if let Some(select) = normalized.select {
            parts.push(format!("select={}", select.join(",")));
        }
        if let Some(filter) = normalized.filter {
            parts.push(format!("filter={}", filter));
        }
        if let Some(order_by) = normalized.order_by {
            parts.push(format!("orderby={}", order_by));
        }
        if let Some(top) = normalized.top {
            parts.push(format!("top={}", top));
        }
        if let Some(skip) = normalized.skip {
            parts.push(format!("skip={}", skip));
        }
        if let Some(expand) = normalized.expand {
            parts.push(format!("expand={}", expand.join(",")));
        }
        if parts.is_empty() {
            "*".to_string()
        } else {
            parts.join("&")
        }
    }
}

fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_fields(fields: Option<&[String]>) -> Option<Vec<String>> {
    let mut fields: Vec<String> = fields?
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    fields.sort();
    fields.dedup();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Join a field list in the caller's order (the backend echoes it).
fn joined(fields: Option<&[String]>) -> Option<String> {
    let fields: Vec<&str> = fields?
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields.join(","))
    }
}
