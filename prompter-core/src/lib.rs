//! # prompter-core — typed prompts for LLM calls
//!
//! Turns a prompt template plus a declared return type into a validated call
//! against an LLM provider:
//!
//! ```text
//! bindings ──► PromptCompiler ──► [Message] ──► ModelGateway ──► text
//!                  (render + split)      ▲                         │
//!                                        │ ResponseSchema          ▼
//!                                   ReturnSpec<T> ───────────► cast ──► T
//! ```
//!
//! - [`prompt`] renders a template (`{name}` or Jinja) and splits it on `">> "`
//!   into one-key YAML turns.
//! - [`schema`] derives the response schema from a [`ReturnSpec`] and casts
//!   provider text back into the declared type.
//! - [`gateway`] is the provider boundary.
//! - [`pipeline`] runs compile → call → cast with fixed-delay retry and
//!   appends the rendered prompt to the final error.
//!
//! ```no_run
//! # async fn demo(gateway: std::sync::Arc<dyn prompter_core::ModelGateway>) -> prompter_core::error::Result<()> {
//! use prompter_core::{Bindings, CallPipeline, ReturnSpec};
//!
//! let count: CallPipeline<u32> = CallPipeline::builder()
//!     .template(">> system: Answer with a number only.\n>> user: How many legs does a {animal} have?")
//!     .returns(ReturnSpec::primitive())
//!     .gateway(gateway)
//!     .build()?;
//!
//! let legs = count.call(&Bindings::new().with("animal", "spider")).await?;
//! # let _ = legs;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod types;

pub use config::PrompterConfig;
pub use error::{ErrorKind, GatewayError, PrompterError};
pub use gateway::ModelGateway;
pub use pipeline::{CallPipeline, PipelineBuilder};
pub use prompt::{PromptCompiler, TemplateMode};
pub use retry::RetryPolicy;
pub use schema::{FunctionSchema, ResponseSchema, ReturnSpec};
pub use types::{Bindings, Message};
