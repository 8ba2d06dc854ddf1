//! Verification of Werkzeug password hashes as stored by Flask-AppBuilder.
//!
//! Only the `pbkdf2:sha256[:iterations]$salt$hexdigest` format is supported.
//! Anything else, including the placeholder stored for SSO-created accounts,
//! fails verification.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Werkzeug's default when the method omits an iteration count.
const DEFAULT_ITERATIONS: u32 = 600_000;

/// Check `password` against a stored Werkzeug hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Some((method, salt, expected_hex)) = split_hash(stored_hash) else {
        return false;
    };

    let Some(iterations) = parse_method(method) else {
        tracing::debug!(method, "Unsupported password hash method");
        return false;
    };

    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    if expected.len() != 32 {
        return false;
    }

    let computed = pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations);
    computed.as_slice().ct_eq(expected.as_slice()).into()
}

fn split_hash(stored: &str) -> Option<(&str, &str, &str)> {
    let mut parts = stored.splitn(3, '$');
    let method = parts.next()?;
    let salt = parts.next()?;
    let digest = parts.next()?;
    Some((method, salt, digest))
}

/// Returns the iteration count for a `pbkdf2:sha256[:n]` method.
fn parse_method(method: &str) -> Option<u32> {
    let rest = method.strip_prefix("pbkdf2:sha256")?;
    if rest.is_empty() {
        return Some(DEFAULT_ITERATIONS);
    }
    let iterations: u32 = rest.strip_prefix(':')?.parse().ok()?;
    (iterations > 0).then_some(iterations)
}

/// PBKDF2-HMAC-SHA256 truncated to one 32-byte block, as Werkzeug stores it.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_known_vector() {
        let out = pbkdf2_sha256(b"password", b"salt", 1);
        assert_eq!(
            hex::encode(out),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );

        let out = pbkdf2_sha256(b"password", b"salt", 4096);
        assert_eq!(
            hex::encode(out),
            "c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"
        );
    }

    #[test]
    fn test_verify_werkzeug_hash() {
        let stored = "pbkdf2:sha256:1000$NaClSalt$d40ab484b6bc977e578a4210ede35cf71ce8f84896d8c00ec8cb59e1087e85a0";
        assert!(verify_password("correct horse", stored));
        assert!(!verify_password("battery staple", stored));
    }

    #[test]
    fn test_placeholder_never_verifies() {
        assert!(!verify_password("", crate::store::UNUSABLE_PASSWORD));
        assert!(!verify_password(
            crate::store::UNUSABLE_PASSWORD,
            crate::store::UNUSABLE_PASSWORD
        ));
        assert!(!verify_password("NOPASSWORD", "NOPASSWORD"));
    }

    #[test]
    fn test_unsupported_methods() {
        assert!(!verify_password("x", "scrypt:32768:8:1$salt$abcd"));
        assert!(!verify_password("x", "pbkdf2:sha256:0$salt$abcd"));
        assert!(!verify_password("x", "pbkdf2:sha256:1000$salt$not-hex"));
        assert!(!verify_password("x", "pbkdf2:sha256:1000$salt$abcd"));
    }

    #[test]
    fn test_parse_method_defaults_iterations() {
        assert_eq!(parse_method("pbkdf2:sha256"), Some(DEFAULT_ITERATIONS));
        assert_eq!(parse_method("pbkdf2:sha256:260000"), Some(260_000));
        assert_eq!(parse_method("pbkdf2:sha1:1000"), None);
    }
}
