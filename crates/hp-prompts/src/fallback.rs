//! Hard-coded default prompt templates.
//!
//! The [`FallbackCatalog`] is the last line of defense before the generic
//! not-found literal. It must hold an entry for every prompt name the service
//! requests ([`REQUIRED_PROMPTS`]), so that a deployment with no reachable
//! prompt store still produces usable prompts.

use std::collections::HashMap;

/// System prompt for the modification chat. Expects the model to answer in JSON.
pub const CHAT_SYSTEM: &str = "chat_system";
/// Compiles a session's conversation into fix instructions.
pub const FIX_INSTRUCTIONS: &str = "fix_instructions";
/// Turns a preview selection into a follow-up question for the user.
pub const SELECTION_ANALYSIS: &str = "selection_analysis";
pub const AUTO_QUESTION_DEFAULT: &str = "auto_question_default";
pub const GENERATE_FIX_DEFAULT: &str = "generate_fix_default";

/// Prompt names the service resolves at runtime.
pub const REQUIRED_PROMPTS: &[&str] = &[CHAT_SYSTEM, FIX_INSTRUCTIONS, SELECTION_ANALYSIS];

const CHAT_SYSTEM_TEMPLATE: &str = "\
You are an assistant helping a client review a generated website preview. \
The user may have selected an element on the page and will describe what \
they want changed.

Decide how to handle each message:
- \"immediate\": a small, unambiguous visual change that can be applied to the \
preview right now (text replacement, color, size, removal).
- \"batch\": a larger or structural change that should be recorded for the \
developers' fix-instruction document.
- \"question\": the request is unclear; ask one short clarifying question.

Always answer with a single JSON object and nothing else:
{\"action\": \"immediate\" | \"batch\" | \"question\", \
\"response\": \"message shown to the user\", \
\"modification\": {\"selector\": \"CSS selector\", \
\"action\": \"replace\" | \"style\" | \"insert\" | \"remove\", \
\"content\": \"new HTML for replace/insert\", \
\"styles\": {\"css-property\": \"value\"}} | null}

Only include \"modification\" when action is \"immediate\". Keep responses \
polite and brief.";

const FIX_INSTRUCTIONS_TEMPLATE: &str = "\
You are an assistant that turns client feedback on a website into precise \
fix instructions for the developers.

Session: {session_id}
Generated at: {timestamp}

Conversation log:
{conversation_text}

Write a fix-instruction document in HTML using only <h1>, <h2>, <h3> and <p> \
elements. Start with an <h1> title, group related requests under <h2> \
headings by page area, and for each request state the target element, the \
current state, and the requested change. Omit greetings and small talk.";

const SELECTION_ANALYSIS_TEMPLATE: &str = "\
The user selected the following {selection_type} in the website preview:

{selection_content}

{user_comment}

What would you like to change about this part? For example the wording, \
the color or size, or whether it should be removed.";

const AUTO_QUESTION_TEMPLATE: &str = "\
Generate a short question asking the user what they would like to change \
about the selected text.";

const GENERATE_FIX_TEMPLATE: &str = "\
Generate fix instructions for the selected text based on the user's request.";

/// Static name → template map populated at construction.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    templates: HashMap<String, String>,
}

impl FallbackCatalog {
    /// The builtin catalog covering every name in [`REQUIRED_PROMPTS`].
    pub fn builtin() -> Self {
        let templates = [
            (CHAT_SYSTEM, CHAT_SYSTEM_TEMPLATE),
            (FIX_INSTRUCTIONS, FIX_INSTRUCTIONS_TEMPLATE),
            (SELECTION_ANALYSIS, SELECTION_ANALYSIS_TEMPLATE),
            (AUTO_QUESTION_DEFAULT, AUTO_QUESTION_TEMPLATE),
            (GENERATE_FIX_DEFAULT, GENERATE_FIX_TEMPLATE),
        ]
        .into_iter()
        .map(|(name, template)| (name.to_string(), template.to_string()))
        .collect();
        Self { templates }
    }

    /// A catalog with no entries.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Add or replace an entry. Empty templates are ignored so the catalog
    /// never hands out empty content.
    pub fn with_entry(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        if !template.trim().is_empty() {
            self.templates.insert(name.into(), template);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Entry names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names from `required` that this catalog cannot serve.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect()
    }
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{placeholders, try_render, vars};

    #[test]
    fn builtin_covers_required_prompts() {
        let catalog = FallbackCatalog::builtin();
        assert!(catalog.missing(REQUIRED_PROMPTS).is_empty());
        for name in catalog.names() {
            assert!(!catalog.get(name).unwrap().trim().is_empty(), "{name} is empty");
        }
    }

    #[test]
    fn chat_system_has_no_placeholders() {
        let catalog = FallbackCatalog::builtin();
        assert!(placeholders(catalog.get(CHAT_SYSTEM).unwrap()).is_empty());
    }

    #[test]
    fn selection_analysis_renders_with_service_variables() {
        let catalog = FallbackCatalog::builtin();
        let out = try_render(
            catalog.get(SELECTION_ANALYSIS).unwrap(),
            &vars([
                ("selection_content", "Welcome to our shop"),
                ("selection_type", "heading"),
                ("user_comment", ""),
            ]),
        )
        .unwrap();
        assert!(out.contains("following heading"));
        assert!(out.contains("Welcome to our shop"));
    }

    #[test]
    fn fix_instructions_placeholders() {
        let catalog = FallbackCatalog::builtin();
        assert_eq!(
            placeholders(catalog.get(FIX_INSTRUCTIONS).unwrap()),
            vec!["session_id", "timestamp", "conversation_text"]
        );
    }

    #[test]
    fn with_entry_ignores_empty_templates() {
        let catalog = FallbackCatalog::empty()
            .with_entry("a", "content")
            .with_entry("b", "   ");
        assert_eq!(catalog.names(), vec!["a"]);
        assert_eq!(catalog.missing(&["a", "b"]), vec!["b"]);
    }
}
