//! # Prompt template
//!
//! The fixed instructional framing wrapped around the retrieved context and the
//! customer's question before it is sent to the completion endpoint.
//!
//! The built-in framing ([`PromptTemplate::default`]) can be overridden per
//! installation with a small YAML file under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! instructions: "You are a helpful customer support chatbot. Use the provided context to answer the user's question as accurately and helpfully as possible."
//! context_label: "Context:"
//! question_label: "User Question:"
//! closing: "Based on the above context, please provide a detailed and helpful response to the user's question."
//! ```
//!
//! ## Rendering
//!
//! ```rust
//! use awful_support::template::PromptTemplate;
//!
//! let prompt = PromptTemplate::default().render("Related entities:\n", "hello");
//! assert!(prompt.contains("User Question:\nhello"));
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::Path};

/// Framing text placed around context and question.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Opening instruction, first thing in the prompt.
    pub instructions: String,

    /// Line introducing the retrieved context block.
    pub context_label: String,

    /// Line introducing the customer's question.
    pub question_label: String,

    /// Closing instruction, last thing in the prompt.
    pub closing: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instructions: "You are a helpful customer support chatbot. Use the provided context to answer the user's question as accurately and helpfully as possible.".to_string(),
            context_label: "Context:".to_string(),
            question_label: "User Question:".to_string(),
            closing: "Based on the above context, please provide a detailed and helpful response to the user's question.".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Build the single prompt sent to the completion endpoint.
    pub fn render(&self, context: &str, question: &str) -> String {
        format!(
            "{}\n\n{}\n{}\n{}\n{}\n\n{}",
            self.instructions,
            self.context_label,
            context,
            self.question_label,
            question,
            self.closing
        )
    }
}

/// Load a prompt template by name from the user's config directory.
///
/// Resolves `<config_dir>/templates/<name>.yaml`.
pub fn load_template(name: &str) -> Result<PromptTemplate, Box<dyn Error>> {
    let path = crate::config_dir()?.join(format!("templates/{}.yaml", name));
    load_template_from(&path)
}

/// Load a prompt template from an explicit YAML file.
pub fn load_template_from(path: &Path) -> Result<PromptTemplate, Box<dyn Error>> {
    tracing::info!("Loading template: {}", path.display());
    let content = fs::read_to_string(path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_render_places_context_before_question() {
        let prompt = PromptTemplate::default().render(
            "Previous similar conversations:\nRelated entities:\n",
            "Where is my refund?",
        );

        let context_at = prompt.find("Previous similar conversations:").unwrap();
        let question_at = prompt.find("Where is my refund?").unwrap();
        assert!(prompt.starts_with("You are a helpful customer support chatbot."));
        assert!(context_at < question_at);
        assert!(prompt.ends_with("helpful response to the user's question."));
    }

    #[test]
    fn test_load_template_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
instructions: "Answer briefly."
context_label: "Known facts:"
question_label: "Customer asks:"
closing: "Reply in one sentence."
"#
        )
        .unwrap();

        let template = load_template_from(temp_file.path()).unwrap();
        assert_eq!(template.instructions, "Answer briefly.");
        assert_eq!(
            template.render("ctx", "q"),
            "Answer briefly.\n\nKnown facts:\nctx\nCustomer asks:\nq\n\nReply in one sentence."
        );
    }

    #[test]
    fn test_load_template_invalid_file() {
        let template = load_template("non/existent/path");
        assert!(template.is_err(), "Expected error for missing template");
    }

    #[test]
    fn test_load_template_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: template: format"#).unwrap();

        let template = load_template_from(temp_file.path());
        assert!(template.is_err(), "Expected YAML parse error");
    }
}
