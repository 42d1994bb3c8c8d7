use std::fmt;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("invalid SQL identifier '{0}'")]
    Invalid(String),
}

/// A table or procedure name that is safe to splice into SQL text.
///
/// Accepts `name` or `schema.name`, each part made of ASCII letters, digits
/// and underscores and not starting with a digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_plain_ident(p)) {
            return Err(IdentifierError::Invalid(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_plain_ident(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_schema_qualified_names() {
        assert_eq!(SqlIdent::parse("evncpc_tb_2").unwrap().as_str(), "evncpc_tb_2");
        assert_eq!(SqlIdent::parse(" metering.readings ").unwrap().as_str(), "metering.readings");
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(matches!(SqlIdent::parse("t; DROP TABLE t"), Err(IdentifierError::Invalid(_))));
        assert!(matches!(SqlIdent::parse("a.b.c"), Err(IdentifierError::Invalid(_))));
        assert!(matches!(SqlIdent::parse("1table"), Err(IdentifierError::Invalid(_))));
        assert_eq!(SqlIdent::parse("  "), Err(IdentifierError::Empty));
    }
}
