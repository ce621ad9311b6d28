use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;

/// Caller-supplied filter fields, forwarded unmodified on every page request.
///
/// Field order is preserved so that every page URL carries the filters in the
/// order the caller sent them.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FilterPayload(IndexMap<String, FilterValue>);

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
    /// JSON `null`, forwarded as an empty value
    Empty,
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Number(n) => write!(f, "{n}"),
            FilterValue::Flag(b) => write!(f, "{b}"),
            FilterValue::Empty => Ok(()),
        }
    }
}

impl FilterPayload {
    /// Parses a JSON object body. An empty body is an empty payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, FilterValue)> for FilterPayload {
    fn from_iter<I: IntoIterator<Item = (K, FilterValue)>>(iter: I) -> Self {
        FilterPayload(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}
