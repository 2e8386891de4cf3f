/// Map a mailbox identifier to a key the remote store accepts.
///
/// Trims, lowercases and replaces every `.` with `,` (store keys may not
/// contain `.`, `#`, `$`, `[` or `]`). There is no inverse: identifiers that
/// differ only by `.` versus `,` share a key.
pub fn encode(identifier: &str) -> String {
    identifier.trim().to_lowercase().replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_whitespace_and_dots() {
        assert_eq!(encode(" A.B@X.com "), "a,b@x,com");
        assert_eq!(encode(" A.B@X.com "), encode("a.b@x.com"));
    }

    #[test]
    fn empty_identifier_encodes_to_empty_key() {
        assert_eq!(encode("   "), "");
    }

    #[test]
    fn dot_and_comma_collide() {
        assert_eq!(encode("a.b@x.com"), encode("a,b@x,com"));
    }
}
