use crate::ui::event::Args;
use crate::ui::page::Page;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

pub mod store;

pub const EVENT_LOG_LIMIT: usize = 32;

/// Client (one window or tab) scope: its state, its page, the
/// initialization flag owned by the server and the recent widget events.
#[derive(Debug, Default)]
pub struct ClientSession<C> {
    pub initialized: bool,
    pub state: C,
    pub page: Page,
    pub events: VecDeque<String>,
}

impl<C> ClientSession<C> {
    /// Appends `source: event` lines, oldest dropped first.
    pub fn log_events(&mut self, events: &Args) {
        for (source, event) in events.iter() {
            if self.events.len() == EVENT_LOG_LIMIT {
                self.events.pop_front();
            }
            self.events.push_back(format!("{source}: {}", event.display_value()));
        }
    }
}

#[derive(Debug, Default)]
pub struct UserSession<U> {
    pub state: U,
}

/// Renders a scope as `key: value` lines.
pub fn dump_scope<T: Serialize + ?Sized>(scope: &T) -> Vec<String> {
    match serde_json::to_value(scope) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .map(|(key, value)| format!("{key}: {}", display_value(&value)))
            .collect(),
        Ok(Value::Null) => Vec::new(),
        Ok(other) => vec![display_value(&other)],
        Err(err) => vec![format!("<unserializable scope: {err}>")],
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}
