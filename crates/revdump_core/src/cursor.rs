use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Request parameters sent to the API. Ordered so requests are reproducible.
pub type Params = BTreeMap<String, String>;

/// Server supplied continuation token set.
///
/// Cursors are tied to the loop that produced them: a cursor taken from an
/// `allrevisions` response means nothing to a `prop=revisions` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationCursor {
    params: Params,
    legacy: bool,
}

impl ContinuationCursor {
    /// Reads the cursor from a response.
    ///
    /// The `continue` object is preferred; the pre-1.21 `query-continue`
    /// object is used only when it is absent. Returns `None` when the
    /// response carries neither, which ends the pagination loop.
    pub fn from_response(response: &Value) -> Option<Self> {
        if let Some(object) = response.get("continue").and_then(Value::as_object) {
            let params = flatten(object);
            return (!params.is_empty()).then_some(Self {
                params,
                legacy: false,
            });
        }

        let legacy = response.get("query-continue").and_then(Value::as_object)?;
        let mut params = Params::new();
        for module in legacy.values() {
            if let Some(inner) = module.as_object() {
                params.extend(flatten(inner));
            }
        }
        (!params.is_empty()).then_some(Self {
            params,
            legacy: true,
        })
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Builds the next request from the loop's base parameters.
    ///
    /// `base` is left untouched, so keys from an earlier cursor never leak
    /// into a later request.
    pub fn apply(&self, base: &Params) -> Params {
        let mut next = base.clone();
        for (key, value) in &self.params {
            next.insert(key.clone(), value.clone());
        }
        next
    }
}

fn flatten(object: &Map<String, Value>) -> Params {
    object
        .iter()
        .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
