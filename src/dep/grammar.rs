//! Query-string grammar shared by the dependency variants.
//!
//! The full form is `[<tag>.]<name>[@<region>]`:
//! - `name` is required: word characters, `-`, `/`, `_`
//! - `tag` is optional, terminated by the first `.`, and may itself
//!   contain `:` (e.g. `tag:value.name`)
//! - `region` is an optional suffix after `@`: word characters, `-`, `.`
//!
//! Templates embed these strings literally, so accept/reject decisions
//! here are part of the external interface and must stay bit-exact.

use crate::errors::ParseError;

/// Parsed `[<tag>.]<name>[@<region>]` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceQuerySpec {
    pub tag: Option<String>,
    pub name: String,
    pub region: Option<String>,
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_tag_char(c: char) -> bool {
    is_word(c) || c == '-' || c == ':'
}

fn is_name_char(c: char) -> bool {
    is_word(c) || c == '-' || c == '/'
}

fn is_region_char(c: char) -> bool {
    is_word(c) || c == '-' || c == '.'
}

fn check(
    kind: &'static str,
    input: &str,
    component: &'static str,
    value: &str,
    accept: fn(char) -> bool,
) -> Result<(), ParseError> {
    if value.is_empty() {
        return Err(ParseError::InvalidFormat {
            kind,
            input: input.to_string(),
        });
    }
    match value.chars().find(|c| !accept(*c)) {
        Some(ch) => Err(ParseError::IllegalCharacter {
            kind,
            component,
            ch,
            input: input.to_string(),
        }),
        None => Ok(()),
    }
}

/// Split an optional `@<region>` suffix off a query string.
pub(crate) fn split_region(
    kind: &'static str,
    input: &str,
) -> Result<(String, Option<String>), ParseError> {
    match input.split_once('@') {
        Some((left, region)) => {
            check(kind, input, "region", region, is_region_char)?;
            Ok((left.to_string(), Some(region.to_string())))
        }
        None => Ok((input.to_string(), None)),
    }
}

/// Parse the full `[<tag>.]<name>[@<region>]` form.
pub(crate) fn parse_service_query(
    kind: &'static str,
    input: &str,
) -> Result<ServiceQuerySpec, ParseError> {
    let (left, region) = split_region(kind, input)?;

    let (tag, name) = match left.split_once('.') {
        Some((tag, name)) => {
            check(kind, input, "tag", tag, is_tag_char)?;
            (Some(tag.to_string()), name.to_string())
        }
        None => (None, left),
    };

    if name.is_empty() {
        return Err(ParseError::MissingName {
            kind,
            input: input.to_string(),
        });
    }
    check(kind, input, "name", &name, is_name_char)?;

    Ok(ServiceQuerySpec { tag, name, region })
}

/// Parse a `<path>[@<region>]` key/value query. Paths may contain `.`
/// and `/`, so there is no tag component to strip.
pub(crate) fn parse_path_query(
    kind: &'static str,
    input: &str,
) -> Result<(String, Option<String>), ParseError> {
    let (path, region) = split_region(kind, input)?;

    if path.is_empty() {
        return Err(ParseError::MissingName {
            kind,
            input: input.to_string(),
        });
    }
    check(kind, input, "path", &path, |c| {
        is_name_char(c) || c == '.'
    })?;

    Ok((path, region))
}

/// Canonical `tag.name@region` rendering with absent components elided.
pub(crate) fn canonical(tag: Option<&str>, name: &str, region: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(tag) = tag {
        out.push_str(tag);
        out.push('.');
    }
    out.push_str(name);
    if let Some(region) = region {
        out.push('@');
        out.push_str(region);
    }
    out
}
