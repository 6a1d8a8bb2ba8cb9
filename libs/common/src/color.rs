/// Check that `value` is a `#rrggbb` color: a `#` followed by exactly six hex digits.
///
/// Hex digits are matched case-insensitively, so `#ABCDEF` and `#abcdef` both pass.
pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_digit_hex() {
        assert!(is_hex_color("#1a2b3c"));
        assert!(is_hex_color("#000000"));
        assert!(is_hex_color("#ABCDEF"));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(!is_hex_color("not-a-color"));
        assert!(!is_hex_color("1a2b3c"));
        assert!(!is_hex_color("#1a2b3"));
        assert!(!is_hex_color("#1a2b3c4"));
        assert!(!is_hex_color("#1a2b3g"));
        assert!(!is_hex_color(""));
        assert!(!is_hex_color("#"));
    }
}
