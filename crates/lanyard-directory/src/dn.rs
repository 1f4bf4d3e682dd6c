//! Distinguished-name utilities
//!
//! Escaping and string inspection helpers shared by the connection
//! implementations and the bind-login composition. Attribute names and DN
//! components are compared case-insensitively throughout (RFC 4512).

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// DN escaping is different from filter escaping. Characters that must be
/// escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == char_count - 1;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => {
                result.push_str("\\00");
            }
            ' ' if is_first || is_last => {
                result.push_str("\\20");
            }
            '#' if is_first => {
                result.push_str("\\23");
            }
            _ => {
                result.push(ch);
            }
        }
    }

    result
}

/// Check that a string is usable as an attribute name in a filter or a
/// modification without further escaping (RFC 4512 attribute descriptors).
pub fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Find the first occurrence of `needle` in `haystack`, ignoring ASCII case.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Check whether `dn` ends with `suffix`, ignoring ASCII case.
pub fn ends_with_ignore_ascii_case(dn: &str, suffix: &str) -> bool {
    dn.len() >= suffix.len() && dn.as_bytes()[dn.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Extract the attribute name used immediately before `suffix` in `dn`: the
/// token preceding the `=` whose value is directly followed by the suffix.
///
/// For `uid=jdoe,ou=people,dc=example,dc=com` with suffix
/// `,ou=people,dc=example,dc=com` this yields `uid`. Returns `None` when the
/// suffix does not occur in the DN or no attribute token precedes it.
pub fn attribute_before_suffix<'a>(dn: &'a str, suffix: &str) -> Option<&'a str> {
    let pos = find_ignore_ascii_case(dn, suffix)?;
    let head = &dn[..pos];
    let eq = head.rfind('=')?;
    let start = head[..eq].rfind(',').map_or(0, |comma| comma + 1);
    let attribute = head[start..eq].trim();
    if attribute.is_empty() {
        None
    } else {
        Some(attribute)
    }
}

/// Split the leading RDN off a DN: `("uid=jdoe", "ou=people,dc=example,dc=com")`.
/// A DN without a parent yields an empty remainder.
pub fn split_first_rdn(dn: &str) -> (&str, &str) {
    match dn.split_once(',') {
        Some((rdn, rest)) => (rdn, rest),
        None => (dn, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("alice"), "alice");
        assert_eq!(escape_filter_value("a*b"), "a\\2ab");
        assert_eq!(escape_filter_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_filter_value("a\\b"), "a\\5cb");
    }

    #[test]
    fn test_escape_dn_value_special_chars() {
        assert_eq!(escape_dn_value("Doe, John"), "Doe\\, John");
        assert_eq!(escape_dn_value("a=b"), "a\\=b");
        assert_eq!(escape_dn_value("x+y"), "x\\+y");
        assert_eq!(escape_dn_value("plain"), "plain");
    }

    #[test]
    fn test_escape_dn_value_spaces_and_hash() {
        assert_eq!(escape_dn_value(" leading"), "\\20leading");
        assert_eq!(escape_dn_value("trailing "), "trailing\\20");
        assert_eq!(escape_dn_value("#hash"), "\\23hash");
        assert_eq!(escape_dn_value("mid hash#ok"), "mid hash#ok");
    }

    #[test]
    fn test_escape_dn_value_injection() {
        // A crafted username must not be able to relocate the entry.
        let dn = format!("cn={},ou=people,dc=example,dc=com", escape_dn_value("x,dc=evil"));
        assert_eq!(dn, "cn=x\\,dc\\=evil,ou=people,dc=example,dc=com");
    }

    #[test]
    fn test_valid_attribute_names() {
        assert!(is_valid_attribute_name("uid"));
        assert!(is_valid_attribute_name("sAMAccountName"));
        assert!(is_valid_attribute_name("x-custom-attr"));
        assert!(!is_valid_attribute_name(""));
        assert!(!is_valid_attribute_name("2fa"));
        assert!(!is_valid_attribute_name("uid=x)(cn"));
    }

    #[test]
    fn test_attribute_before_suffix() {
        let suffix = ",ou=people,dc=example,dc=com";
        assert_eq!(
            attribute_before_suffix("uid=jdoe,ou=people,dc=example,dc=com", suffix),
            Some("uid")
        );
        assert_eq!(
            attribute_before_suffix("cn=John Doe,ou=people,dc=example,dc=com", suffix),
            Some("cn")
        );
        // Case differences between the DN and the configured suffix are fine.
        assert_eq!(
            attribute_before_suffix("UID=jdoe,OU=People,DC=Example,DC=Com", suffix),
            Some("UID")
        );
    }

    #[test]
    fn test_attribute_before_suffix_nested_rdn() {
        // The token directly before the suffix wins, not the leading RDN.
        assert_eq!(
            attribute_before_suffix(
                "cn=jdoe,ou=sub,dc=example,dc=com",
                ",dc=example,dc=com"
            ),
            Some("ou")
        );
    }

    #[test]
    fn test_attribute_before_suffix_no_match() {
        let suffix = ",ou=people,dc=example,dc=com";
        assert_eq!(
            attribute_before_suffix("uid=jdoe,ou=staff,dc=example,dc=com", suffix),
            None
        );
        assert_eq!(attribute_before_suffix("uid=jdoe", suffix), None);
        assert_eq!(attribute_before_suffix("", suffix), None);
    }

    #[test]
    fn test_ends_with_ignore_ascii_case() {
        assert!(ends_with_ignore_ascii_case(
            "uid=jdoe,DC=Example,DC=Com",
            ",dc=example,dc=com"
        ));
        assert!(!ends_with_ignore_ascii_case("uid=jdoe", ",dc=example,dc=com"));
    }

    #[test]
    fn test_split_first_rdn() {
        assert_eq!(
            split_first_rdn("uid=jdoe,ou=people,dc=example,dc=com"),
            ("uid=jdoe", "ou=people,dc=example,dc=com")
        );
        assert_eq!(split_first_rdn("dc=com"), ("dc=com", ""));
    }
}
