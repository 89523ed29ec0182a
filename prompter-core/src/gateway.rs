//! The boundary to a concrete LLM provider.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::schema::ResponseSchema;
use crate::types::Message;

/// A single schema-constrained call to an LLM provider.
///
/// Implementations translate [`Message`]s into the provider's wire format,
/// force the provider to answer through `schema`, and return the raw text
/// of that answer (for function schemas: the emitted arguments).
///
/// Gateways never retry; [`CallPipeline`](crate::pipeline::CallPipeline)
/// owns the retry policy.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Provider name, e.g. `"openai"`.
    fn provider(&self) -> &str;

    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Execute one call.
    async fn call(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<String, GatewayError>;
}
