//! # prompter-llm — gateways and the `Prompter` factory
//!
//! Concrete [`ModelGateway`](prompter_core::ModelGateway) implementations:
//!   - **OpenAI** chat completions with forced function calling
//!     ([`OpenAiGateway`]); the API key comes from `OPENAI_API_KEY` (or the
//!     configured variable) at call time.
//!   - **Scripted** in-memory replies ([`ScriptedGateway`]) for tests.
//!
//! [`Prompter`] picks a gateway by provider name and registers prompts
//! against it.

pub mod client;
pub mod prompter;
pub mod scripted;

pub use client::OpenAiGateway;
pub use prompter::{Prompter, ProviderKind};
pub use scripted::{RecordedCall, ScriptedGateway};
