//! Command templates.
//!
//! A template is the literal text sent to an instrument with named
//! placeholders: `"ATTN {index} {value}"`. `{value}` (or the bare `{}`) is the
//! value slot filled when a parameter is set; any other name, such as `{index}`,
//! has to be bound before the template is attached to a parameter. Braces are
//! escaped by doubling them and a placeholder may carry a format spec
//! (`{value:>6}`), applied with `strfmt`.

use std::fmt;

use crate::error::{ParamError, ParamResult};

/// Name of the value slot.
pub const VALUE_SLOT: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Slot { name: String, spec: Option<String> },
}

/// Parsed command pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    tokens: Vec<Token>,
}

impl CommandTemplate {
    /// Parse a pattern, failing on unbalanced braces or invalid placeholder names.
    pub fn parse(pattern: &str) -> ParamResult<Self> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    if !closed {
                        return Err(ParamError::Template(format!(
                            "unclosed placeholder in '{pattern}'"
                        )));
                    }
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Self::parse_slot(pattern, &body)?);
                }
                '}' => {
                    return Err(ParamError::Template(format!(
                        "unmatched '}}' in '{pattern}'"
                    )));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(Self { tokens })
    }

    fn parse_slot(pattern: &str, body: &str) -> ParamResult<Token> {
        let (name, spec) = match body.split_once(':') {
            Some((name, spec)) => (name, Some(spec.to_string())),
            None => (body, None),
        };
        let name = if name.is_empty() { VALUE_SLOT } else { name };
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ParamError::Template(format!(
                "invalid placeholder '{{{body}}}' in '{pattern}'"
            )));
        }
        Ok(Token::Slot {
            name: name.to_string(),
            spec,
        })
    }

    /// Number of value slots.
    pub fn value_slots(&self) -> usize {
        self.slot_names().filter(|n| *n == VALUE_SLOT).count()
    }

    /// Placeholders other than the value slot that still need binding.
    pub fn unbound(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.slot_names().filter(|n| *n != VALUE_SLOT) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Slot { name, .. } => Some(name.as_str()),
            Token::Literal(_) => None,
        })
    }

    /// Substitute every `{name}` placeholder, keeping the others in place.
    pub fn bind(&self, name: &str, replacement: impl fmt::Display) -> ParamResult<Self> {
        let replacement = replacement.to_string();
        let tokens = self
            .tokens
            .iter()
            .map(|token| match token {
                Token::Slot { name: slot, spec } if slot == name => {
                    format_slot(slot, spec.as_deref(), &replacement).map(Token::Literal)
                }
                other => Ok(other.clone()),
            })
            .collect::<ParamResult<Vec<_>>>()?;
        Ok(Self {
            tokens: merge_literals(tokens),
        })
    }

    /// Text of a template that has no placeholders left.
    pub fn render_plain(&self) -> ParamResult<String> {
        self.render_with(None)
    }

    /// Text with the value slot filled by `value`.
    pub fn render(&self, value: &str) -> ParamResult<String> {
        self.render_with(Some(value))
    }

    fn render_with(&self, value: Option<&str>) -> ParamResult<String> {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Slot { name, spec } if name == VALUE_SLOT => {
                    let value = value.ok_or_else(|| {
                        ParamError::Template(format!("no value for the slot in '{self}'"))
                    })?;
                    out.push_str(&format_slot(name, spec.as_deref(), value)?);
                }
                Token::Slot { name, .. } => {
                    return Err(ParamError::Template(format!(
                        "placeholder '{{{name}}}' is not bound in '{self}'"
                    )));
                }
            }
        }
        Ok(out)
    }
}

fn format_slot(name: &str, spec: Option<&str>, text: &str) -> ParamResult<String> {
    let Some(spec) = spec else {
        return Ok(text.to_string());
    };
    let pattern = format!("{{{name}:{spec}}}");
    let as_text = || strfmt::strfmt_map(&pattern, |mut f: strfmt::Formatter| f.str(text));
    let formatted = if is_numeric_spec(spec) {
        // Precision, sign and radix only mean something for numbers.
        strfmt::strfmt_map(&pattern, |mut f: strfmt::Formatter| {
            match (text.parse::<i64>(), text.parse::<f64>()) {
                (Ok(n), _) if !spec.contains('.') => f.i64(n),
                (_, Ok(x)) if x.is_finite() => f.f64(x),
                _ => f.str(text),
            }
        })
        .or_else(|_| as_text())
    } else {
        as_text()
    };
    formatted.map_err(|e| ParamError::Template(format!("cannot format '{pattern}': {e}")))
}

/// True when `spec` carries a precision, a sign flag or an integer radix.
fn is_numeric_spec(spec: &str) -> bool {
    spec.contains(['.', '+']) || spec.ends_with(['x', 'X', 'o', 'b'])
}

fn merge_literals(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match (merged.last_mut(), token) {
            (Some(Token::Literal(prev)), Token::Literal(next)) => prev.push_str(&next),
            (_, token) => merged.push(token),
        }
    }
    merged
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            match token {
                Token::Literal(text) => f.write_str(&text.replace('{', "{{").replace('}', "}}"))?,
                Token::Slot { name, spec: None } => write!(f, "{{{name}}}")?,
                Token::Slot {
                    name,
                    spec: Some(spec),
                } => write!(f, "{{{name}:{spec}}}")?,
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for CommandTemplate {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
