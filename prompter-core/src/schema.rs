//! Return-type declarations and the response schemas derived from them.
//!
//! A registered prompt declares what it returns with a [`ReturnSpec`]:
//!
//! - [`ReturnSpec::structured`] for types with a JSON schema (`schemars`).
//!   The provider is forced to call a single function whose parameters are
//!   that schema, and the arguments are deserialized back with `serde_json`.
//! - [`ReturnSpec::primitive`] for plain `FromStr` types. The provider is
//!   only told the type name, and the raw text is parsed directly.
//!
//! Both are resolved once, at registration, and never depend on call inputs.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PrompterError, Result};

/// Description of a single function the provider must invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    /// Function name (the schema title).
    pub name: String,
    /// Human description (the type's doc comment, or empty).
    pub description: String,
    /// Full JSON schema of the arguments.
    pub parameters: Value,
}

/// What the gateway is told about the expected output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseSchema {
    /// Forced function call with a JSON schema.
    Function(FunctionSchema),
    /// Bare type name for primitive casts.
    TypeName(String),
}

impl ResponseSchema {
    /// The forced function, if this is a structured schema.
    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionSchema> {
        match self {
            Self::Function(f) => Some(f),
            Self::TypeName(_) => None,
        }
    }

    /// Function name or type name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Function(f) => &f.name,
            Self::TypeName(name) => name,
        }
    }
}

/// Structured return: JSON schema in, `serde_json` deserialization out.
pub struct StructuredReturn<T> {
    schema: FunctionSchema,
    parse: fn(&str) -> serde_json::Result<T>,
}

impl<T> StructuredReturn<T> {
    /// The forced-function description for this type.
    #[must_use]
    pub fn llm_schema(&self) -> ResponseSchema {
        ResponseSchema::Function(self.schema.clone())
    }

    /// Deserialize provider text into `T`.
    ///
    /// # Errors
    /// Returns `PrompterError::Validation` carrying `text` if it is not JSON
    /// matching `T`.
    pub fn cast(&self, text: &str) -> Result<T> {
        (self.parse)(text).map_err(|e| PrompterError::Validation {
            reason: e.to_string(),
            text: text.to_string(),
        })
    }
}

/// Primitive return: type name in, `FromStr` out.
pub struct PrimitiveReturn<T> {
    type_name: String,
    parse: fn(&str) -> std::result::Result<T, String>,
}

impl<T> PrimitiveReturn<T> {
    /// The bare type name advertised to the provider.
    #[must_use]
    pub fn llm_schema(&self) -> ResponseSchema {
        ResponseSchema::TypeName(self.type_name.clone())
    }

    /// Parse provider text into `T`.
    ///
    /// The raw text is tried first, so `String` keeps surrounding
    /// whitespace; only if that fails is the trimmed text tried.
    ///
    /// # Errors
    /// Returns `PrompterError::Cast` carrying `text` if both parses fail.
    pub fn cast(&self, text: &str) -> Result<T> {
        let trimmed = text.trim();
        (self.parse)(text)
            .or_else(|raw_err| {
                if trimmed.len() == text.len() {
                    Err(raw_err)
                } else {
                    (self.parse)(trimmed)
                }
            })
            .map_err(|reason| PrompterError::Cast {
                type_name: self.type_name.clone(),
                reason,
                text: text.to_string(),
            })
    }
}

/// Declared return type of a registered prompt.
pub enum ReturnSpec<T> {
    /// Self-describing type with a JSON schema.
    Structured(StructuredReturn<T>),
    /// Plain type constructed from text.
    Primitive(PrimitiveReturn<T>),
}

impl<T> ReturnSpec<T> {
    /// Declare a structured return type.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` if the generated schema has no
    /// title or does not describe a JSON object, since neither can be sent
    /// as a function definition.
    pub fn structured() -> Result<Self>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let root = schemars::schema_for!(T);
        let parameters = serde_json::to_value(&root).map_err(|e| {
            PrompterError::Configuration(format!(
                "schema for {} is not serializable: {e}",
                short_type_name::<T>()
            ))
        })?;

        let name = parameters
            .get("title")
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| {
                PrompterError::Configuration(format!(
                    "schema for {} has no title to name the response function",
                    short_type_name::<T>()
                ))
            })?
            .to_string();

        if parameters.get("type").and_then(Value::as_str) != Some("object") {
            return Err(PrompterError::Configuration(format!(
                "return type {name} must be a JSON object to be used as function parameters"
            )));
        }

        let description = parameters
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self::Structured(StructuredReturn {
            schema: FunctionSchema {
                name,
                description,
                parameters,
            },
            parse: parse_json::<T>,
        }))
    }

    /// Declare a primitive return type, advertised by its short type name.
    #[must_use]
    pub fn primitive() -> Self
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Self::primitive_named(short_type_name::<T>())
    }

    /// Declare a primitive return type with an explicit advertised name.
    #[must_use]
    pub fn primitive_named(type_name: impl Into<String>) -> Self
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Self::Primitive(PrimitiveReturn {
            type_name: type_name.into(),
            parse: parse_from_str::<T>,
        })
    }

    /// Schema handed to the gateway.
    #[must_use]
    pub fn llm_schema(&self) -> ResponseSchema {
        match self {
            Self::Structured(s) => s.llm_schema(),
            Self::Primitive(p) => p.llm_schema(),
        }
    }

    /// Cast provider text into `T`.
    ///
    /// # Errors
    /// `Validation` for structured types, `Cast` for primitive types.
    pub fn cast(&self, text: &str) -> Result<T> {
        match self {
            Self::Structured(s) => s.cast(text),
            Self::Primitive(p) => p.cast(text),
        }
    }
}

impl<T> fmt::Debug for ReturnSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(s) => f.debug_tuple("Structured").field(&s.schema.name).finish(),
            Self::Primitive(p) => f.debug_tuple("Primitive").field(&p.type_name).finish(),
        }
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    serde_json::from_str(text)
}

fn parse_from_str<T>(text: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.parse::<T>().map_err(|e| e.to_string())
}

/// `alloc::string::String` -> `String`, `a::Wrapper<b::C>` -> `Wrapper`.
fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
