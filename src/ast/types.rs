use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::{split_top_level, unquote, ValueContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Datetime,
    DateRange,
    Link,
    Number,
}

impl PrimitiveType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(PrimitiveType::String),
            "datetime" => Some(PrimitiveType::Datetime),
            "daterange" => Some(PrimitiveType::DateRange),
            "link" => Some(PrimitiveType::Link),
            "number" => Some(PrimitiveType::Number),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Datetime => "datetime",
            PrimitiveType::DateRange => "daterange",
            PrimitiveType::Link => "link",
            PrimitiveType::Number => "number",
        }
    }
}

/// A metadata field type: `string`, `"a" | "b"`, `link[]`, `(string | link)[]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeExpression {
    Primitive(PrimitiveType),
    Literal(String),
    Array(Box<TypeExpression>),
    Union(Vec<TypeExpression>),
}

/// A type expression that failed to parse. Kept on the field so the checker can report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvalidType {
    pub text: String,
    pub message: String,
}

impl fmt::Display for InvalidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid type `{}`: {}", self.text, self.message)
    }
}

impl TypeExpression {
    pub fn parse(text: &str) -> Result<TypeExpression, InvalidType> {
        let invalid = |message: &str| InvalidType {
            text: text.to_string(),
            message: message.to_string(),
        };
        parse_union(text.trim()).map_err(|message| invalid(&message))
    }

    /// Whether `value` is acceptable for a field of this type. A scalar is accepted where an
    /// array of its type is expected.
    pub fn accepts(&self, value: &ValueContent) -> bool {
        match self {
            TypeExpression::Primitive(primitive) => match (primitive, value) {
                (PrimitiveType::String, ValueContent::QuotedString(_))
                | (PrimitiveType::String, ValueContent::Plain(_))
                | (PrimitiveType::Datetime, ValueContent::Datetime(_))
                | (PrimitiveType::DateRange, ValueContent::DateRange { .. })
                | (PrimitiveType::Link, ValueContent::Link(_))
                | (PrimitiveType::Number, ValueContent::Number(_)) => true,
                _ => false,
            },
            TypeExpression::Literal(literal) => match value {
                ValueContent::QuotedString(s) | ValueContent::Plain(s) => s == literal,
                _ => false,
            },
            TypeExpression::Array(inner) => match value {
                ValueContent::Array(items) => items.iter().all(|item| inner.accepts(item)),
                scalar => inner.accepts(scalar),
            },
            TypeExpression::Union(options) => options.iter().any(|option| option.accepts(value)),
        }
    }

    /// Whether an array appears anywhere in this type, including inside unions.
    pub fn contains_array(&self) -> bool {
        match self {
            TypeExpression::Array(_) => true,
            TypeExpression::Union(options) => options.iter().any(|o| o.contains_array()),
            TypeExpression::Primitive(_) | TypeExpression::Literal(_) => false,
        }
    }

    /// String literals allowed by this type, if it is made only of literals.
    pub fn literals(&self) -> Vec<&str> {
        match self {
            TypeExpression::Literal(literal) => vec![literal.as_str()],
            TypeExpression::Union(options) => options.iter().flat_map(|o| o.literals()).collect(),
            TypeExpression::Array(inner) => inner.literals(),
            TypeExpression::Primitive(_) => vec![],
        }
    }
}

impl fmt::Display for TypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpression::Primitive(primitive) => f.write_str(primitive.as_str()),
            TypeExpression::Literal(literal) => write!(f, "\"{literal}\""),
            TypeExpression::Array(inner) => match inner.as_ref() {
                TypeExpression::Union(_) => write!(f, "({inner})[]"),
                _ => write!(f, "{inner}[]"),
            },
            TypeExpression::Union(options) => {
                for (idx, option) in options.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{option}")?;
                }
                Ok(())
            }
        }
    }
}

fn parse_union(text: &str) -> Result<TypeExpression, String> {
    if text.is_empty() {
        return Err("empty type".to_string());
    }
    let parts = split_top_level(text, '|');
    if parts.len() == 1 {
        return parse_term(parts[0].trim());
    }
    let mut options = vec![];
    for part in parts {
        match parse_term(part.trim())? {
            TypeExpression::Union(nested) => options.extend(nested),
            option => options.push(option),
        }
    }
    Ok(TypeExpression::Union(options))
}

fn parse_term(text: &str) -> Result<TypeExpression, String> {
    if text.is_empty() {
        return Err("empty union member".to_string());
    }
    if let Some(inner) = text.strip_suffix("[]") {
        let element = parse_term(inner.trim())?;
        if element.contains_array() {
            return Err("nested arrays are not supported".to_string());
        }
        return Ok(TypeExpression::Array(Box::new(element)));
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return parse_union(inner.trim());
    }
    if text.starts_with('"') {
        return match unquote(text) {
            Some(literal) => Ok(TypeExpression::Literal(literal)),
            None => Err("unterminated string literal".to_string()),
        };
    }
    PrimitiveType::from_name(text)
        .map(TypeExpression::Primitive)
        .ok_or_else(|| format!("unknown type `{text}`"))
}
