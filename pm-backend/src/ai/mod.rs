//! AI helpers. Nothing here writes to the vault; callers decide what to keep.

pub mod story_assist;

pub use story_assist::{merge_suggestion, FieldSuggester, OpenAiSuggester, SuggestError};
