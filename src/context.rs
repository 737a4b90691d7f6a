//! # Context assembly
//!
//! Turns retrieved conversations and entities into the plain-text context block
//! placed in the prompt:
//!
//! ```text
//! Previous similar conversations:
//! Q: I want a refund for my subscription
//! A: We can process a refund.
//!
//! Related entities:
//! - refund (ACTION): action mentioned in customer interaction
//! ```
//!
//! Both headers are always emitted, even with nothing under them, so the prompt
//! keeps the same shape regardless of what retrieval found. Rows keep retrieval
//! order.

use crate::models::{Conversation, Entity};

pub const CONVERSATIONS_HEADER: &str = "Previous similar conversations:";
pub const ENTITIES_HEADER: &str = "Related entities:";

/// Format conversations as Q/A pairs, then entities as `name (TYPE): description`.
pub fn assemble<'a, C, E>(conversations: C, entities: E) -> String
where
    C: IntoIterator<Item = &'a Conversation>,
    E: IntoIterator<Item = &'a Entity>,
{
    let mut context = format!("{CONVERSATIONS_HEADER}\n");
    for conversation in conversations {
        context.push_str(&format!(
            "Q: {}\nA: {}\n\n",
            conversation.user_input, conversation.bot_response
        ));
    }

    context.push_str(ENTITIES_HEADER);
    context.push('\n');
    for entity in entities {
        context.push_str(&format!(
            "- {} ({}): {}\n",
            entity.name, entity.entity_type, entity.description
        ));
    }

    context
}
