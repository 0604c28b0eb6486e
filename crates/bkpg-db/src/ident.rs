//! SQL identifier checks.
//!
//! Table names, column names and routine names are interpolated into SQL
//! text, so they are restricted to plain (optionally schema-qualified)
//! identifiers.

use std::sync::OnceLock;

use regex::Regex;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
    })
}

/// Returns `true` if `name` is a plain or schema-qualified SQL identifier.
///
/// ```
/// use bkpg_db::ident::is_valid_identifier;
///
/// assert!(is_valid_identifier("public.producto"));
/// assert!(!is_valid_identifier("producto; DROP TABLE x"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_re().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["id", "_tmp", "Producto2", "public.producto", "a.b_c"] {
            assert!(is_valid_identifier(name), "{name}");
        }
    }

    #[test]
    fn test_invalid_identifiers() {
        for name in ["", "2col", "a.b.c", "name--", "x y", "\"quoted\"", "a.", ".a"] {
            assert!(!is_valid_identifier(name), "{name}");
        }
    }
}
