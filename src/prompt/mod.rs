//! Prompt templates and the built-in prompt library.

pub mod library;
mod template;

pub use template::{Bindings, PromptTemplate, UndeclaredPlaceholder, bindings, placeholders};
