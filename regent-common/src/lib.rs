//! Regent Common Types
//!
//! Shared types used by the Regent client core: the OpenAI-compatible
//! completion wire format, persisted chat sessions and identity records.

pub mod chat;
pub mod identity;
pub mod session;

pub use chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, Usage};
pub use identity::{AuthOrder, IdentityRecord, OrderQuery, OrderStatus};
pub use session::{ChatSession, Role, SessionMessage};
