//! Utility functions for minicoord

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::time::Duration;

/// Percent-encoding set for config keys (a key must stay one path segment)
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Maximum config key length in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Encode a key for use as a single namespace path segment
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Decode a percent-encoded key
pub fn decode_key(encoded: &str) -> crate::Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|e| crate::Error::InvalidEntry(format!("failed to decode key: {}", e)))
}

/// Validate key (must be non-empty, reasonable length)
pub fn validate_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::InvalidEntry("key cannot be empty".into()));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(crate::Error::InvalidEntry(format!(
            "key too long (max {} bytes)",
            MAX_KEY_LEN
        )));
    }

    if key.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidEntry(
            "key contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a config value (must be non-empty)
pub fn validate_value(key: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::InvalidEntry(format!(
            "value for '{}' cannot be empty",
            key
        )));
    }
    Ok(())
}

/// Parse duration string (e.g., "500ms", "30s", "5m")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        let split = s.len() - s.chars().last().map(char::len_utf8).unwrap_or(0);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_key() {
        let key = "feature/flags & more";
        let encoded = encode_key(key);
        assert!(encoded.contains("%2F"));
        assert!(!encoded.contains('/'));

        let decoded = decode_key(&encoded).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_plain_key_unchanged() {
        assert_eq!(encode_key("db.pool.size"), "db.pool.size");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("normal-key").is_ok());
        assert!(validate_key("path/to/key").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("bad\nkey").is_err());
        assert!(validate_key(&"x".repeat(2000)).is_err());
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value("k", "v").is_ok());
        assert!(validate_value("k", "").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }
}
