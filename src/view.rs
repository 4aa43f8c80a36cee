//! Call result and the text rendering of the functions panel.

use std::fmt::Write;

use serde_json::Value;

pub const HEADING: &str = "Call your Azure Functions";
pub const INTRO: &str =
    "An Azure Functions app is running. Authorize this app and click below to call it for a response:";
pub const BUTTON_LABEL: &str = "Authorize and call Azure Functions";
pub const EDIT_HEADING: &str = "How to edit the Azure Functions";
const SPINNER: &str = "…";

/// Outcome of the latest call, as the panel sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallResult {
    /// No call has completed, or the function returned nothing.
    #[default]
    Empty,
    Loading,
    Data(Value),
    Error(String),
}

impl CallResult {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Text for the result block: pretty JSON, the error string, or nothing.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Loading => SPINNER.to_string(),
            Self::Data(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            Self::Error(message) => message.clone(),
        }
    }
}

/// Static panel content around the result block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub code_path: String,
    pub docs_url: Option<String>,
}

impl Panel {
    #[must_use]
    pub fn render(&self, result: &CallResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {HEADING}");
        let _ = writeln!(out);
        let _ = writeln!(out, "{INTRO}");
        let _ = writeln!(out);
        if !result.is_loading() {
            let _ = writeln!(out, "[ {BUTTON_LABEL} ]");
            let _ = writeln!(out);
        }
        match result {
            CallResult::Error(message) => {
                let _ = writeln!(out, "error: {message}");
            }
            other => {
                let _ = writeln!(out, "```");
                let body = other.render();
                if !body.is_empty() {
                    let _ = writeln!(out, "{body}");
                }
                let _ = writeln!(out, "```");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "#### {EDIT_HEADING}");
        let _ = writeln!(out);
        let _ = writeln!(out, "See the code in `{}` to add your business logic.", self.code_path);
        if let Some(docs) = &self.docs_url {
            let _ = writeln!(out);
            let _ = writeln!(out, "For more information, see the docs: {docs}");
        }
        out
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
