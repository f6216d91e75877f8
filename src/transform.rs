use serde_json::{Map, Value};

pub const DEFAULT_REGIONS: [&str; 2] = ["US", "BR"];

/// Projects a watch-provider response to `id` plus the listed regions.
///
/// Absent or `null` values are left out rather than written as `null`.
pub fn watch_providers_selector<S: AsRef<str>>(data: &Value, regions: &[S]) -> Value {
    let mut selected = Map::new();

    if let Some(id) = data.get("id").filter(|id| !id.is_null()) {
        selected.insert("id".to_owned(), id.clone());
    }

    let results = data.get("results");
    for region in regions {
        let region = region.as_ref();
        let value = results
            .and_then(|results| results.get(region))
            .filter(|value| !value.is_null());
        if let Some(value) = value {
            selected.insert(region.to_owned(), value.clone());
        }
    }

    Value::Object(selected)
}
