//! Phone number formatting

/// Strip everything but digits
pub fn digits_only(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a phone number to E.164.
///
/// Strips non-digits, prepends the US country code when exactly 10 digits
/// remain, then prepends `+`. Idempotent: normalizing an already-normalized
/// number returns it unchanged.
pub fn normalize_phone(input: &str) -> String {
    let digits = digits_only(input);

    if digits.len() == 10 {
        format!("+1{}", digits)
    } else {
        format!("+{}", digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digit_number_gets_country_code() {
        assert_eq!(normalize_phone("5551112222"), "+15551112222");
        assert_eq!(normalize_phone("(555) 111-2222"), "+15551112222");
    }

    #[test]
    fn test_eleven_digit_number_kept() {
        assert_eq!(normalize_phone("15551112222"), "+15551112222");
        assert_eq!(normalize_phone("+1 555 111 2222"), "+15551112222");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for raw in ["5551112222", "+15551112222", "44 20 7946 0958"] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once);
        }
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("+1 (555) 111-2222"), "15551112222");
        assert_eq!(digits_only("no digits"), "");
    }
}
