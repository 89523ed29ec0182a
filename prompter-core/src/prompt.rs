//! Prompt compilation: template + bindings -> ordered conversation turns.
//!
//! A template is plain text in which each turn starts with the [`TURN_DELIMITER`]
//! token followed by a one-key YAML mapping:
//!
//! ```text
//! >> system: You are a terse assistant.
//! >> user: Summarize {topic} in one sentence.
//! ```
//!
//! The key is the role, the value is the content. Values may be nested YAML;
//! every value is re-serialized to JSON in the `", "`/`": "` layout with
//! non-ASCII escaped, so `user: hi` becomes the content `"hi"` (quoted) and
//! `user: {a: 1}` becomes `{"a": 1}`. There is no escape for the delimiter
//! itself.

use std::io;

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::Formatter;
use tracing::debug;

use crate::error::{PrompterError, Result};
use crate::types::{Bindings, Message};

/// Literal token separating turns in a rendered template.
pub const TURN_DELIMITER: &str = ">> ";

/// How placeholders in a template are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    /// `{name}` substitution, `{{`/`}}` for literal braces.
    #[default]
    Literal,
    /// Jinja-style rendering (`{{ name }}`, `{% for %}`, filters).
    Templated,
}

impl From<bool> for TemplateMode {
    fn from(templated: bool) -> Self {
        if templated { Self::Templated } else { Self::Literal }
    }
}

/// Renders one template and splits it into [`Message`]s.
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    template: String,
    mode: TemplateMode,
}

impl PromptCompiler {
    /// Create a compiler for `template`.
    #[must_use]
    pub fn new(template: impl Into<String>, mode: TemplateMode) -> Self {
        Self {
            template: template.into(),
            mode,
        }
    }

    /// The raw template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder resolution mode.
    #[must_use]
    pub fn mode(&self) -> TemplateMode {
        self.mode
    }

    /// Render the template against `bindings` without segmenting it.
    ///
    /// # Errors
    /// Returns `PrompterError::Template` on a missing placeholder, a
    /// malformed template or a binding that failed to serialize.
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        bindings.check()?;
        match self.mode {
            TemplateMode::Literal => render_template(&self.template, bindings),
            TemplateMode::Templated => render_jinja(&self.template, bindings),
        }
    }

    /// Render and segment into an ordered conversation.
    ///
    /// # Errors
    /// `Template` if rendering fails, `PromptParse` if a segment is malformed.
    pub fn compile(&self, bindings: &Bindings) -> Result<Vec<Message>> {
        let rendered = self.render(bindings)?;
        let messages = parse_turns(&rendered)?;
        debug!(turns = messages.len(), "compiled prompt");
        Ok(messages)
    }

    /// The compiled turns, one `role: content` line each.
    ///
    /// # Errors
    /// Same as [`PromptCompiler::compile`].
    pub fn render_debug(&self, bindings: &Bindings) -> Result<String> {
        let messages = self.compile(bindings)?;
        Ok(messages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Literal `{key}` interpolation.
///
/// String bindings are inserted as-is, every other value as its JSON text.
/// Dotted keys (`{user.name}`) walk into object bindings.
///
/// # Errors
/// Returns `PrompterError::Template` if a placeholder has no binding, is
/// empty, or a brace is unbalanced.
pub fn render_template(template: &str, bindings: &Bindings) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                result.push('{');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    key.push(next);
                }
                if !closed {
                    return Err(PrompterError::Template(format!(
                        "unclosed placeholder '{{{key}'"
                    )));
                }
                result.push_str(&lookup(bindings, &key)?);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                result.push('}');
            }
            '}' => {
                return Err(PrompterError::Template(
                    "single '}' encountered in template".into(),
                ));
            }
            other => result.push(other),
        }
    }

    Ok(result)
}

fn lookup(bindings: &Bindings, key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(PrompterError::Template(
            "positional placeholder '{}' is not supported, use a named binding".into(),
        ));
    }

    let mut parts = key.split('.');
    let head = parts.next().unwrap_or(key);
    let mut value = bindings
        .get(head)
        .ok_or_else(|| PrompterError::Template(format!("missing binding for placeholder '{head}'")))?;
    for field in parts {
        value = value.get(field).ok_or_else(|| {
            PrompterError::Template(format!("binding '{head}' has no field '{field}' (in '{key}')"))
        })?;
    }

    Ok(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn render_jinja(template: &str, bindings: &Bindings) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.render_str(template, bindings)
        .map_err(|e| PrompterError::Template(e.to_string()))
}

/// Split rendered text on [`TURN_DELIMITER`] and parse each turn.
///
/// Segments that trim to empty are skipped.
///
/// # Errors
/// Returns `PrompterError::PromptParse` with the offending segment and the
/// full text if a segment is not a single `role: content` YAML mapping.
pub fn parse_turns(rendered: &str) -> Result<Vec<Message>> {
    rendered
        .split(TURN_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            parse_turn(segment).map_err(|reason| PrompterError::PromptParse {
                reason,
                segment: segment.to_string(),
                rendered: rendered.to_string(),
            })
        })
        .collect()
}

fn parse_turn(segment: &str) -> std::result::Result<Message, String> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(segment).map_err(|e| format!("invalid YAML: {e}"))?;

    let serde_yaml::Value::Mapping(mapping) = doc else {
        return Err("expected a single `role: content` mapping".into());
    };
    if mapping.len() != 1 {
        return Err(format!(
            "expected exactly one `role: content` entry, found {}",
            mapping.len()
        ));
    }

    let Some((role, content)) = mapping.into_iter().next() else {
        return Err("expected a single `role: content` mapping".into());
    };
    let serde_yaml::Value::String(role) = role else {
        return Err("turn role must be a string".into());
    };
    let content = content_text(&content)
        .map_err(|e| format!("content of '{role}' cannot be serialized: {e}"))?;

    Ok(Message::new(role, content))
}

/// JSON text with `", "`/`": "` separators and every non-ASCII character
/// escaped as `\uXXXX` (UTF-16 units), so `{a: [1, é]}` becomes
/// `{"a": [1, "\u00e9"]}`.
fn content_text(value: &serde_yaml::Value) -> std::result::Result<String, String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
    value.serialize(&mut ser).map_err(|e| e.to_string())?;
    String::from_utf8(buf).map_err(|e| e.to_string())
}

struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut bytes = [0_u8; 4];
        let mut units = [0_u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(c.encode_utf8(&mut bytes).as_bytes())?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_turn_scenario() {
        let compiler = PromptCompiler::new(">> system: hello\n>> user: {q}", TemplateMode::Literal);
        let messages = compiler
            .compile(&Bindings::new().with("q", "hi"))
            .expect("compiles");
        assert_eq!(
            messages,
            vec![
                Message::new("system", "\"hello\""),
                Message::new("user", "\"hi\""),
            ]
        );
    }

    #[test]
    fn literal_rendering_works() {
        let rendered = render_template(
            "Hello {name}, you are {age}.",
            &Bindings::new().with("name", "Goran").with("age", 41),
        )
        .expect("renders");
        assert_eq!(rendered, "Hello Goran, you are 41.");
    }

    #[test]
    fn literal_missing_binding_is_template_error() {
        let err = render_template("Hello {name}.", &Bindings::new()).expect_err("no binding");
        match err {
            PrompterError::Template(msg) => assert!(msg.contains("name")),
            other => panic!("expected template error, got {other:?}"),
        }
    }

    #[test]
    fn literal_double_braces_escape() {
        let rendered = render_template("{{\"k\": {v}}}", &Bindings::new().with("v", 1))
            .expect("renders");
        assert_eq!(rendered, "{\"k\": 1}");
    }

    #[test]
    fn literal_dotted_lookup() {
        let bindings = Bindings::new().with("user", serde_json::json!({"name": "Ada"}));
        assert_eq!(render_template("{user.name}", &bindings).expect("renders"), "Ada");
        assert!(render_template("{user.age}", &bindings).is_err());
    }

    #[test]
    fn literal_unbalanced_braces_fail() {
        assert!(render_template("oops }", &Bindings::new()).is_err());
        assert!(render_template("oops {name", &Bindings::new().with("name", "x")).is_err());
        assert!(render_template("oops {}", &Bindings::new()).is_err());
    }

    #[test]
    fn unserializable_binding_fails_compilation() {
        let grid: std::collections::BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let bindings = Bindings::new().with("grid", grid);

        for mode in [TemplateMode::Literal, TemplateMode::Templated] {
            let template = match mode {
                TemplateMode::Literal => ">> user: {grid}",
                TemplateMode::Templated => ">> user: \"{{ grid }}\"",
            };
            let err = PromptCompiler::new(template, mode)
                .compile(&bindings)
                .expect_err("grid is not JSON");
            assert!(matches!(err, PrompterError::Template(_)), "{mode:?}: {err:?}");
        }
    }

    #[test]
    fn templated_mode_renders_jinja() {
        let compiler = PromptCompiler::new(
            ">> user: |\n  {% for item in items %}- {{ item }}\n  {% endfor %}",
            TemplateMode::Templated,
        );
        let bindings = Bindings::new().with("items", ["a", "b"]);
        let messages = compiler.compile(&bindings).expect("compiles");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert!(messages[0].content.contains("- a"));
        assert!(messages[0].content.contains("- b"));
    }

    #[test]
    fn templated_mode_keeps_trailing_newline() {
        let compiler = PromptCompiler::new("{{ q }}\n", TemplateMode::Templated);
        let rendered = compiler.render(&Bindings::new().with("q", "x")).expect("renders");
        assert_eq!(rendered, "x\n");
    }

    #[test]
    fn templated_mode_missing_binding_is_template_error() {
        let compiler = PromptCompiler::new(">> user: {{ q }}", TemplateMode::Templated);
        let err = compiler.compile(&Bindings::new()).expect_err("undefined q");
        assert!(matches!(err, PrompterError::Template(_)));
    }

    #[test]
    fn nested_content_is_flattened_to_json() {
        let messages = parse_turns(">> user:\n  question: why\n  tags: [a, b]").expect("parses");
        assert_eq!(messages.len(), 1);
        let content: Value = serde_json::from_str(&messages[0].content).expect("json content");
        assert_eq!(content, serde_json::json!({"question": "why", "tags": ["a", "b"]}));
    }

    #[test]
    fn content_uses_spaced_separators() {
        let messages = parse_turns(">> user:\n  a: 1\n  b: [x, y]").expect("parses");
        assert_eq!(messages[0].content, "{\"a\": 1, \"b\": [\"x\", \"y\"]}");
    }

    #[test]
    fn content_escapes_non_ascii() {
        let messages = parse_turns(">> user: café 😀").expect("parses");
        assert_eq!(messages[0].content, "\"caf\\u00e9 \\ud83d\\ude00\"");
    }

    #[test]
    fn empty_segments_are_dropped() {
        let messages = parse_turns("  >>   >> system: a\n>>    \n>> user: b\n").expect("parses");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn empty_text_yields_empty_script() {
        assert!(parse_turns("").expect("parses").is_empty());
        assert!(parse_turns("   \n").expect("parses").is_empty());
    }

    #[test]
    fn invalid_yaml_reports_segment_and_text() {
        let rendered = ">> system: ok\n>> user: [unclosed";
        let err = parse_turns(rendered).expect_err("bad yaml");
        match err {
            PrompterError::PromptParse { segment, rendered: full, .. } => {
                assert_eq!(segment, "user: [unclosed");
                assert_eq!(full, rendered);
            }
            other => panic!("expected prompt parse error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(parse_turns(">> just a sentence").is_err());
        assert!(parse_turns(">> system: a\nuser: b").is_err());
        assert!(parse_turns(">> - system\n- user").is_err());
    }

    #[test]
    fn debug_rendering_joins_lines() {
        let compiler = PromptCompiler::new(">> system: hello\n>> user: {q}", TemplateMode::Literal);
        let text = compiler
            .render_debug(&Bindings::new().with("q", "hi"))
            .expect("renders");
        assert_eq!(text, "system: \"hello\"\nuser: \"hi\"");
    }

    #[test]
    fn template_mode_from_bool() {
        assert_eq!(TemplateMode::from(true), TemplateMode::Templated);
        assert_eq!(TemplateMode::from(false), TemplateMode::Literal);
    }
}
