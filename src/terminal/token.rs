//! Short-lived terminal session tokens
//!
//! Wire format (ASCII): the trailing characters are the expiry as a decimal
//! Unix timestamp; the first 8 are a slice of the keyed digest over
//! namespace, pod, expiry, and the process-wide app key. The token binds a
//! session to one pod for ten minutes and is verified by re-derivation.

use crate::error::Error;
use crate::Result;
use crate::TERMINAL_TOKEN_TTL_SECS;

/// Digest slice carried at the front of the token
const DIGEST_RANGE: std::ops::Range<usize> = 12..20;

fn sign(namespace: &str, pod: &str, exp: &str, app_key: &str) -> String {
    let digest = format!("{:x}", md5::compute(format!("{namespace}{pod}{exp}{app_key}")));
    format!("{}{exp}", &digest[DIGEST_RANGE])
}

/// Mint a token for the pod, expiring [`TERMINAL_TOKEN_TTL_SECS`] from `now`
pub fn generate_token(namespace: &str, pod: &str, app_key: &str, now: i64) -> String {
    let exp = now + TERMINAL_TOKEN_TTL_SECS;
    sign(namespace, pod, &exp.to_string(), app_key)
}

/// Verify a presented token against the pod coordinates it claims
///
/// Every failure collapses to [`Error::Unauthorized`]; callers never learn
/// whether the token was malformed, expired, or forged.
pub fn verify_token(
    token: &str,
    namespace: &str,
    pod: &str,
    app_key: &str,
    now: i64,
) -> Result<()> {
    let exp_str = token.get(8..).filter(|s| !s.is_empty()).ok_or(Error::Unauthorized)?;
    let exp: i64 = exp_str.parse().map_err(|_| Error::Unauthorized)?;

    if now >= exp {
        return Err(Error::Unauthorized);
    }

    if sign(namespace, pod, exp_str, app_key) != token {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_KEY: &str = "test-app-key";

    /// A freshly minted token verifies for its own pod at any instant
    /// before expiry and at no instant from expiry on.
    #[test]
    fn token_honors_the_expiry_boundary() {
        let t0 = 1_700_000_000;
        let token = generate_token("default", "web-0", APP_KEY, t0);

        assert!(verify_token(&token, "default", "web-0", APP_KEY, t0).is_ok());
        let exp = t0 + TERMINAL_TOKEN_TTL_SECS;
        assert!(verify_token(&token, "default", "web-0", APP_KEY, exp - 1).is_ok());
        assert!(verify_token(&token, "default", "web-0", APP_KEY, exp).is_err());
        assert!(verify_token(&token, "default", "web-0", APP_KEY, exp + 1).is_err());
    }

    /// Rebinding the token to another namespace or pod must fail.
    #[test]
    fn token_is_bound_to_its_pod() {
        let t0 = 1_700_000_000;
        let token = generate_token("default", "web-0", APP_KEY, t0);

        assert!(verify_token(&token, "other", "web-0", APP_KEY, t0).is_err());
        assert!(verify_token(&token, "default", "web-1", APP_KEY, t0).is_err());
        assert!(verify_token(&token, "default", "web-0", "wrong-key", t0).is_err());
    }

    /// Flipping any single byte of the token invalidates it.
    #[test]
    fn any_tampered_byte_is_rejected() {
        let t0 = 1_700_000_000;
        let token = generate_token("default", "web-0", APP_KEY, t0);

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(bytes).expect("ascii");
            assert!(
                verify_token(&tampered, "default", "web-0", APP_KEY, t0).is_err(),
                "tampering byte {i} must invalidate the token"
            );
        }
    }

    /// Truncated and garbage tokens fail without panicking.
    #[test]
    fn malformed_tokens_are_rejected() {
        let t0 = 1_700_000_000;
        assert!(verify_token("", "ns", "pod", APP_KEY, t0).is_err());
        assert!(verify_token("short", "ns", "pod", APP_KEY, t0).is_err());
        assert!(verify_token("aaaaaaaa", "ns", "pod", APP_KEY, t0).is_err());
        assert!(verify_token("aaaaaaaanotanum", "ns", "pod", APP_KEY, t0).is_err());
        // Multi-byte input must not panic the slicing
        assert!(verify_token("トークン無効です", "ns", "pod", APP_KEY, t0).is_err());
    }

    /// The wire layout is eight digest characters followed by the decimal
    /// expiry.
    #[test]
    fn wire_layout_is_digest_then_expiry() {
        let t0 = 1_700_000_000;
        let token = generate_token("ns", "pod", APP_KEY, t0);
        let exp = (t0 + TERMINAL_TOKEN_TTL_SECS).to_string();
        assert!(token.ends_with(&exp));
        assert_eq!(token.len(), 8 + exp.len());
        assert!(token[..8].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
