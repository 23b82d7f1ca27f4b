//! Identifier quoting.
//!
//! Labels, relationship types and property names come from type
//! declarations, so they are always backtick-quoted rather than trusted.

/// Check if a string is a plain Cypher identifier (letter or underscore,
/// then letters, digits and underscores).
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier with backticks, doubling embedded backticks and
/// dropping control characters.
pub fn escape_identifier(s: &str) -> String {
    let cleaned: String = s.chars().filter(|c| !c.is_control()).collect();
    format!("`{}`", cleaned.replace('`', "``"))
}

/// `alias.`property`` reference.
pub fn property(alias: &str, name: &str) -> String {
    format!("{}.{}", alias, escape_identifier(name))
}
