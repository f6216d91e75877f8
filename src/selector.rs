use crate::error::{Error, Result};

use serde_json::{Map, Value};
use std::{fmt, str::FromStr};
use tracing::warn;

/// A JSONPath expression. Bare paths such as `results` are read as `$.results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    expression: String,
}

impl JsonPath {
    pub fn root() -> JsonPath {
        JsonPath {
            expression: "$".to_owned(),
        }
    }

    pub fn parse(path: &str) -> Result<JsonPath> {
        let path = path.trim();
        let expression = if path.is_empty() {
            "$".to_owned()
        } else if path.starts_with('$') {
            path.to_owned()
        } else if path.starts_with('[') {
            format!("${}", path)
        } else {
            format!("$.{}", path)
        };

        jsonpath_lib::select(&Value::Null, &expression)
            .map_err(|err| Error::Config(format!("Invalid JSONPath {}: {:?}", path, err)))?;

        Ok(JsonPath { expression })
    }

    pub fn is_root(&self) -> bool {
        self.expression == "$"
    }

    /// The trailing member name, used as the key of a projected field.
    pub fn last(&self) -> Option<&str> {
        let tail = self
            .expression
            .rsplit(|c: char| c == '.' || c == '[')
            .find(|segment| !segment.is_empty())?;
        let name = tail
            .trim_end_matches(']')
            .trim_matches(|c: char| c == '\'' || c == '"');

        match name {
            "" | "$" | "*" => None,
            name => Some(name),
        }
    }

    /// Every non-null match, in document order.
    pub fn lookup<'a>(&self, json: &'a Value) -> Vec<&'a Value> {
        match jsonpath_lib::select(json, &self.expression) {
            Ok(matches) => matches.into_iter().filter(|value| !value.is_null()).collect(),
            Err(err) => {
                warn!("Failed to evaluate {}: {:?}", self.expression, err);
                Vec::new()
            }
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Where the records of a response live.
///
/// A single selected array yields its elements, a single selected object
/// yields itself, several matches yield one record each, and a missing or
/// `null` selection yields an empty page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSelector {
    Path(JsonPath),
    /// `[id, results.US]`: one object keyed by each path's last segment.
    Fields(Vec<JsonPath>),
}

impl DataSelector {
    pub fn root() -> DataSelector {
        DataSelector::Path(JsonPath::root())
    }

    pub fn path(path: &str) -> Result<DataSelector> {
        Ok(DataSelector::Path(JsonPath::parse(path)?))
    }

    pub fn fields(paths: &[&str]) -> Result<DataSelector> {
        let paths = paths
            .iter()
            .map(|path| JsonPath::parse(path))
            .collect::<Result<Vec<JsonPath>>>()?;

        if paths.is_empty() {
            return Err(Error::Config("Field projection needs at least one path.".to_owned()));
        }
        if let Some(path) = paths.iter().find(|path| path.last().is_none()) {
            return Err(Error::Config(format!(
                "Field projection path {} does not end in a member name.",
                path
            )));
        }

        Ok(DataSelector::Fields(paths))
    }

    pub fn select(&self, body: &Value) -> Vec<Value> {
        match self {
            DataSelector::Path(path) => match path.lookup(body).as_slice() {
                [] => Vec::new(),
                [Value::Array(records)] => records.clone(),
                matches => matches.iter().map(|&record| record.clone()).collect(),
            },
            DataSelector::Fields(paths) => {
                let record: Map<String, Value> = paths
                    .iter()
                    .filter_map(|path| {
                        let key = path.last()?;
                        let value = path.lookup(body).into_iter().next()?;
                        Some((key.to_owned(), value.clone()))
                    })
                    .collect();

                if record.is_empty() {
                    Vec::new()
                } else {
                    vec![Value::Object(record)]
                }
            }
        }
    }
}

impl FromStr for DataSelector {
    type Err = Error;

    fn from_str(selector: &str) -> Result<DataSelector> {
        let selector = selector.trim();
        match selector
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .filter(|inner| !inner.starts_with(['\'', '"', '*']))
        {
            Some(inner) => {
                let paths: Vec<&str> = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .collect();
                Self::fields(&paths)
            }
            None => Self::path(selector),
        }
    }
}

impl fmt::Display for DataSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSelector::Path(path) => write!(f, "{}", path),
            DataSelector::Fields(paths) => {
                let paths: Vec<String> = paths.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", paths.join(", "))
            }
        }
    }
}
