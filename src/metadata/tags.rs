//! Tag-string parsing.
//!
//! A tag is a `;`-separated list of `key=value` assignments and bare flags:
//!
//! ```text
//! name=title;unique
//! relationship=ACTED_IN;direction=outgoing
//! pk;pk_type=uuid
//! name=attrs;properties
//! -
//! ```

use super::descriptor::Direction;

/// Parsed form of one field's tag string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSpec {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub direction: Option<Direction>,
    pub pk: bool,
    pub pk_type: Option<String>,
    pub unique: bool,
    pub index: bool,
    pub properties: bool,
    pub ignore: bool,
}

fn assign(slot: &mut Option<String>, key: &str, value: &str) -> Result<(), String> {
    if slot.is_some() {
        return Err(format!("'{}' declared twice", key));
    }
    *slot = Some(value.to_string());
    Ok(())
}

fn flag(slot: &mut bool, token: &str) -> Result<(), String> {
    if *slot {
        return Err(format!("'{}' declared twice", token));
    }
    *slot = true;
    Ok(())
}

/// Parse a tag string. Errors are plain messages; the registry adds type and field context.
pub fn parse_tag(tag: &str) -> Result<TagSpec, String> {
    let tokens: Vec<&str> = tag
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mut spec = TagSpec::default();

    if tokens.contains(&"-") {
        if tokens.len() > 1 {
            return Err("'-' cannot be combined with other tokens".to_string());
        }
        spec.ignore = true;
        return Ok(spec);
    }

    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                let value = value.trim();
                if value.is_empty() {
                    return Err(format!("malformed assignment '{}': empty value", token));
                }
                match key {
                    "name" => assign(&mut spec.name, key, value)?,
                    "relationship" => assign(&mut spec.relationship, key, value)?,
                    "pk_type" => assign(&mut spec.pk_type, key, value)?,
                    "direction" => {
                        if spec.direction.is_some() {
                            return Err("'direction' declared twice".to_string());
                        }
                        spec.direction = Some(Direction::parse(value).ok_or_else(|| {
                            format!(
                                "malformed assignment '{}': direction must be incoming, outgoing or both",
                                token
                            )
                        })?);
                    }
                    "pk" | "unique" | "index" | "properties" => {
                        return Err(format!(
                            "malformed assignment '{}': '{}' takes no value",
                            token, key
                        ));
                    }
                    _ => return Err(format!("unknown token '{}'", token)),
                }
            }
            None => match token {
                "pk" => flag(&mut spec.pk, token)?,
                "unique" => flag(&mut spec.unique, token)?,
                "index" => flag(&mut spec.index, token)?,
                "properties" => flag(&mut spec.properties, token)?,
                "name" | "relationship" | "direction" | "pk_type" => {
                    return Err(format!("malformed assignment '{}': missing '=value'", token));
                }
                _ => return Err(format!("unknown token '{}'", token)),
            },
        }
    }

    match (&spec.relationship, &spec.direction) {
        (Some(_), None) => return Err("'relationship' requires 'direction'".to_string()),
        (None, Some(_)) => return Err("'direction' requires 'relationship'".to_string()),
        _ => {}
    }

    if spec.pk_type.is_some() && !spec.pk {
        return Err("'pk_type' requires 'pk'".to_string());
    }

    Ok(spec)
}
