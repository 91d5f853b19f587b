//! Update-mask construction.
//!
//! A partial write lists every field it may touch as an
//! `updateMask.fieldPaths` query parameter. Field names that are not simple
//! identifiers must be wrapped in backticks, with `` ` `` and `\` escaped.

use crate::types::Fields;
use std::borrow::Cow;

/// Returns `true` when `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_simple_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote a field name for use as a field path.
pub fn quote_field_path(name: &str) -> Cow<'_, str> {
    if is_simple_field_name(name) {
        return Cow::Borrowed(name);
    }
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('`');
    for c in name.chars() {
        if c == '`' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('`');
    Cow::Owned(quoted)
}

/// Percent-encoded `updateMask.fieldPaths=...` parameters for every field,
/// joined with `&`.
pub fn update_mask_query(fields: &Fields) -> String {
    fields
        .names()
        .map(|name| {
            format!(
                "updateMask.fieldPaths={}",
                urlencoding::encode(&quote_field_path(name))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names_pass_through() {
        assert_eq!(quote_field_path("link"), "link");
        assert_eq!(quote_field_path("action_timestamp"), "action_timestamp");
        assert_eq!(quote_field_path("_private9"), "_private9");
    }

    #[test]
    fn names_with_spaces_are_backticked() {
        assert_eq!(quote_field_path("team role"), "`team role`");
    }

    #[test]
    fn leading_digit_is_quoted() {
        assert!(!is_simple_field_name("9lives"));
        assert_eq!(quote_field_path("9lives"), "`9lives`");
    }

    #[test]
    fn backtick_and_backslash_are_escaped() {
        assert_eq!(quote_field_path("a`b"), "`a\\`b`");
        assert_eq!(quote_field_path("a\\b"), "`a\\\\b`");
    }

    #[test]
    fn empty_name_is_quoted() {
        assert_eq!(quote_field_path(""), "``");
    }

    #[test]
    fn mask_query_lists_every_field_encoded() {
        let fields = Fields::new()
            .with_string("link", "https://example.com/")
            .with_string("team role", "dev");
        assert_eq!(
            update_mask_query(&fields),
            "updateMask.fieldPaths=link&updateMask.fieldPaths=%60team%20role%60"
        );
    }

    #[test]
    fn mask_query_empty_for_no_fields() {
        assert_eq!(update_mask_query(&Fields::new()), "");
    }
}
