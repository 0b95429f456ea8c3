use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use base64::{Engine as _, engine::general_purpose};

/// The size of opaque credential tokens in bytes (256 bits of entropy).
const OPAQUE_TOKEN_SIZE: usize = 32;

/// The number of digits in a human-typeable link code.
pub const LINK_CODE_DIGITS: u32 = 6;

/// Generates an opaque random token for sessions and connect tokens.
///
/// # Returns
///
/// A URL-safe base64-encoded token.
pub fn generate_opaque_token() -> String {
    let mut token = [0u8; OPAQUE_TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Generates a short human-typeable link code, e.g. `"483920"`.
///
/// Codes are uniform over the six-digit space; uniqueness among outstanding
/// codes is enforced at insertion time, not here.
pub fn generate_link_code() -> String {
    let n: u32 = OsRng.gen_range(0..10u32.pow(LINK_CODE_DIGITS));
    format!("{:0width$}", n, width = LINK_CODE_DIGITS as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn opaque_tokens_are_long_and_url_safe() {
        let token = generate_opaque_token();
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn opaque_tokens_do_not_repeat() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_opaque_token()));
        }
    }

    #[test]
    fn link_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_link_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
