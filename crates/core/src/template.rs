use crate::record::FileRecord;
use crate::sanitize::sanitize_value;
use chrono::Datelike;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Year,
    Month,
    Day,
    Name,
    Ext,
    Country,
    State,
    City,
    Camera,
}

/// The recognized token vocabulary. Lookup is table-driven so the list
/// below is the single source of truth for what a template may contain.
const TOKENS: &[(&str, Token)] = &[
    ("year", Token::Year),
    ("month", Token::Month),
    ("day", Token::Day),
    ("name", Token::Name),
    ("ext", Token::Ext),
    ("country", Token::Country),
    ("state", Token::State),
    ("city", Token::City),
    ("camera", Token::Camera),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,
    #[error("unbalanced braces in template")]
    UnbalancedBraces,
    #[error("unknown template token: {0}")]
    UnknownToken(String),
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

/// Splits the template into literal runs and `{token}` references. Both
/// brace characters are significant: a stray `}` or an unterminated or
/// nested `{` is rejected outright.
pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    if input.is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut parts = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let Some(brace) = rest.find(['{', '}']) else {
            parts.push(TemplatePart::Literal(rest.to_string()));
            break;
        };
        if rest.as_bytes()[brace] == b'}' {
            return Err(TemplateError::UnbalancedBraces);
        }
        if brace > 0 {
            parts.push(TemplatePart::Literal(rest[..brace].to_string()));
        }

        let body = &rest[brace + 1..];
        let Some(close) = body.find('}') else {
            return Err(TemplateError::UnbalancedBraces);
        };
        let name = &body[..close];
        if name.is_empty() || name.contains('{') {
            return Err(TemplateError::UnbalancedBraces);
        }
        parts.push(TemplatePart::Token(lookup_token(name)?));
        rest = &body[close + 1..];
    }

    Ok(parts)
}

/// Substitutes record values into the parsed template. Missing date parts
/// fall back to "Unknown"/"00", missing place and camera values to
/// "Unknown"; name and extension always come from the source path.
///
/// Substituted values are sanitized so path separators and other hostile
/// characters inside a value cannot change the rendered layout; only the
/// template's literal text introduces directory boundaries.
pub fn render_template(parts: &[TemplatePart], record: &FileRecord) -> String {
    let date = record.effective_date();

    let mut output = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => output.push_str(s),
            TemplatePart::Token(token) => {
                let value = match token {
                    Token::Year => date
                        .map(|d| format!("{:04}", d.year()))
                        .unwrap_or_else(|| "Unknown".to_string()),
                    Token::Month => date
                        .map(|d| format!("{:02}", d.month()))
                        .unwrap_or_else(|| "00".to_string()),
                    Token::Day => date
                        .map(|d| format!("{:02}", d.day()))
                        .unwrap_or_else(|| "00".to_string()),
                    Token::Name => record.file_stem(),
                    Token::Ext => record.extension_with_dot(),
                    Token::Country => record
                        .location
                        .as_ref()
                        .and_then(|l| l.country.as_deref())
                        .map(str::to_string)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    Token::State => record
                        .location
                        .as_ref()
                        .and_then(|l| l.state.as_deref())
                        .map(str::to_string)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    Token::City => record
                        .location
                        .as_ref()
                        .map(|l| l.city.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    Token::Camera => record
                        .normalized_camera()
                        .map(str::to_string)
                        .unwrap_or_else(|| "Unknown".to_string()),
                };
                output.push_str(&sanitize_value(&value));
            }
        }
    }

    output
}

fn lookup_token(name: &str) -> Result<Token, TemplateError> {
    TOKENS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, token)| *token)
        .ok_or_else(|| TemplateError::UnknownToken(name.to_string()))
}
