use crate::ui::card::AnnotatorItem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
    Items(Vec<AnnotatorItem>),
}

impl ArgValue {
    pub fn display_value(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::List(values) => format!("[{}]", values.join(", ")),
            Self::Items(items) => format!("[{} items]", items.len()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(value) => !value.is_empty(),
            Self::List(values) => !values.is_empty(),
            Self::Items(items) => !items.is_empty(),
        }
    }
}

/// Sparse bag of named values sent with one request. A missing name means
/// the control did not change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args {
    values: BTreeMap<String, ArgValue>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(ArgValue::is_truthy)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    pub fn to_log_line(&self) -> String {
        if self.values.is_empty() {
            return "args=-".to_string();
        }
        self.values
            .iter()
            .map(|(name, value)| format!("{name}={}", value.display_value()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub events: Args,
}

impl Request {
    pub fn new(args: Args) -> Self {
        Self {
            args,
            events: Args::default(),
        }
    }

    /// Marks that `source` raised `event`, e.g. `annotator` raising `draw`.
    pub fn with_event(mut self, source: impl Into<String>, event: &str) -> Self {
        self.events.set(source, ArgValue::Text(event.to_string()));
        self
    }
}

/// What a rendered widget asks the shell to do.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Submit(Request),
    Upload {
        name: String,
        paths: Vec<PathBuf>,
        args: Args,
    },
}
