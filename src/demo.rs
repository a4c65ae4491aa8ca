//! Demo application — a click counter exercising the framework end to end.
//!
//! DESIGN
//! ======
//! Startup builds a three-node tree (window → label, button) and records the
//! initial structure change. A `click` on the button increments the counter
//! and records the label's new text; a `property` event writes an arbitrary
//! property onto the target component. This is the application wired up by
//! `main` and by the test helpers.

use std::sync::Arc;

use serde_json::json;

use crate::app::{AppContext, Application, ApplicationError, ApplicationFactory, ClientEvent};
use crate::component::ComponentId;
use crate::update::Change;

pub struct CounterApp {
    label: Option<ComponentId>,
    button: Option<ComponentId>,
    count: i64,
}

impl CounterApp {
    #[must_use]
    pub fn new() -> Self {
        Self { label: None, button: None, count: 0 }
    }

    #[must_use]
    pub fn button_id(&self) -> Option<ComponentId> {
        self.button
    }

    #[must_use]
    pub fn label_id(&self) -> Option<ComponentId> {
        self.label
    }
}

impl Default for CounterApp {
    fn default() -> Self {
        Self::new()
    }
}

impl Application for CounterApp {
    fn init(&mut self, cx: AppContext<'_>) -> Result<(), ApplicationError> {
        let root = cx.tree.create_root("window");
        let label = cx
            .tree
            .add_child(root, "label")
            .ok_or_else(|| ApplicationError::from("root vanished during init"))?;
        let button = cx
            .tree
            .add_child(root, "button")
            .ok_or_else(|| ApplicationError::from("root vanished during init"))?;

        cx.tree.set_property(label, "text", json!("0"));
        cx.tree.set_property(button, "label", json!("Increment"));

        cx.updates
            .record_change(root, Change::Structure { removed_descendants: Vec::new() });

        self.label = Some(label);
        self.button = Some(button);
        Ok(())
    }

    fn process_event(&mut self, event: &ClientEvent, cx: AppContext<'_>) -> Result<(), ApplicationError> {
        match event.event_type.as_str() {
            "click" => {
                if Some(event.component_id) != self.button {
                    return Err(ApplicationError(format!(
                        "component {} is not clickable",
                        event.component_id
                    )));
                }
                self.count += 1;
                let label = self
                    .label
                    .ok_or_else(|| ApplicationError::from("application not started"))?;
                let text = json!(self.count.to_string());
                cx.tree.set_property(label, "text", text.clone());
                cx.updates
                    .record_change(label, Change::Property { name: "text".into(), value: text });
                Ok(())
            }
            "property" => {
                let name = event
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ApplicationError::from("property event missing name"))?;
                let value = event.payload.get("value").cloned().unwrap_or(json!(null));
                cx.tree.set_property(event.component_id, name, value.clone());
                cx.updates.record_change(
                    event.component_id,
                    Change::Property { name: name.to_string(), value },
                );
                Ok(())
            }
            other => Err(ApplicationError(format!("unknown event type: {other}"))),
        }
    }
}

/// Factory producing one `CounterApp` per session.
#[must_use]
pub fn factory() -> ApplicationFactory {
    Arc::new(|| Box::new(CounterApp::new()))
}

#[cfg(test)]
#[path = "demo_test.rs"]
mod tests;
