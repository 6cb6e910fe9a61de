//! Secret masking for log output
//!
//! Passwords in DSNs and sensitive `with(..)` fields never reach a sink in
//! clear text.

use std::fmt;

/// Field keys whose values are always masked
const SENSITIVE_KEYS: [&str; 6] = ["password", "passwd", "secret", "token", "api_key", "dsn"];

/// Masked display of a secret value
///
/// Shows nothing of the secret itself, only whether one is set.
#[derive(Clone, Debug)]
pub struct Sensitive<'a> {
    inner: &'a str,
}

impl<'a> Sensitive<'a> {
    pub fn new(value: &'a str) -> Self {
        Self { inner: value }
    }
}

impl fmt::Display for Sensitive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.is_empty() {
            Ok(())
        } else {
            f.write_str("***")
        }
    }
}

pub fn mask_secret(value: &str) -> String {
    Sensitive::new(value).to_string()
}

/// Check whether a field key names a secret
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|sensitive| key.contains(sensitive))
}

/// Value to log for `key`, masked when the key names a secret
pub fn sanitize_field(key: &str, value: &str) -> String {
    if is_sensitive_key(key) {
        mask_secret(value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_display() {
        assert_eq!(Sensitive::new("hunter2").to_string(), "***");
        assert_eq!(Sensitive::new("").to_string(), "");
    }

    #[test]
    fn test_is_sensitive_key() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("DB_PASSWORD"));
        assert!(is_sensitive_key("refresh_token"));
        assert!(is_sensitive_key("mysql_dsn"));

        assert!(!is_sensitive_key("user"));
        assert!(!is_sensitive_key("request_id"));
    }

    #[test]
    fn test_sanitize_field() {
        assert_eq!(sanitize_field("password", "pw"), "***");
        assert_eq!(sanitize_field("user", "alice"), "alice");
    }
}
