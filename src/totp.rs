//! TOTP second factor helpers.
//!
//! Standard parameters: SHA-1, 6 digits, 30 second step, one step of skew
//! either side.

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{EngineError, Result};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP: u64 = 30;

/// Material produced by a setup request. Nothing is persisted at this point;
/// the secret only reaches the user record once it is confirmed with a valid
/// code.
#[derive(Debug)]
pub struct TotpSetup {
    /// Base32-encoded shared secret.
    pub secret: String,
    /// `otpauth://` provisioning URL.
    pub url: String,
    /// PNG QR code encoding the URL, base64-encoded.
    pub qr_png_base64: String,
}

fn totp_for(
    secret_base32: &str,
    issuer: Option<String>,
    account: &str,
) -> Result<TOTP> {
    let secret = Secret::Encoded(secret_base32.trim().to_owned())
        .to_bytes()
        .map_err(|err| EngineError::Totp(format!("{err:?}")))?;

    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP, secret, issuer, account.to_owned())
        .map_err(|err| EngineError::Totp(format!("{err:?}")))
}

/// Generate a fresh random secret scoped to `(issuer, username)` with its
/// provisioning URL and scannable QR image.
pub fn generate(issuer: &str, username: &str) -> Result<TotpSetup> {
    let secret = Secret::generate_secret();
    let secret_base32 = secret.to_encoded().to_string();
    let totp = totp_for(&secret_base32, Some(issuer.to_owned()), username)?;

    Ok(TotpSetup {
        url: totp.get_url(),
        qr_png_base64: totp
            .get_qr_base64()
            .map_err(EngineError::Totp)?,
        secret: secret_base32,
    })
}

/// Check a submitted code against a base32 secret at the current time step.
pub fn verify(secret_base32: &str, code: &str) -> Result<bool> {
    let totp = totp_for(secret_base32, None, "user")?;
    Ok(totp.check_current(code).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn test_generate() {
        let setup = generate("keyrack", "alice").unwrap();

        assert!(setup.url.starts_with("otpauth://totp/"));
        assert!(setup.url.contains("keyrack"));
        assert!(setup.url.contains("alice"));
        assert!(!setup.qr_png_base64.is_empty());
        // Secrets from two setups are independent.
        assert_ne!(setup.secret, generate("keyrack", "alice").unwrap().secret);
    }

    #[test]
    fn test_verify_current_code() {
        let setup = generate("keyrack", "alice").unwrap();
        let totp = totp_for(&setup.secret, None, "user").unwrap();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let code = totp.generate(now);

        assert!(verify(&setup.secret, &code).unwrap());
    }

    #[test]
    fn test_verify_outside_window() {
        let setup = generate("keyrack", "alice").unwrap();
        let totp = totp_for(&setup.secret, None, "user").unwrap();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        // Four full steps ahead stays beyond the +-1 step skew even if the
        // clock crosses a step boundary mid-test.
        let code = totp.generate(now + 4 * STEP);

        assert!(!verify(&setup.secret, &code).unwrap());
    }

    #[test]
    fn test_verify_garbage_secret() {
        assert!(verify("not!base32!!", "123456").is_err());
    }
}
