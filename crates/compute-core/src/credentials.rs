//! SSH and API key credentials
//!
//! - SSH public keys are validated on upload and fingerprinted once (MD5 of the
//!   decoded key blob, colon-separated hex, as `ssh-keygen -E md5` prints it)
//! - API keys are 32 random bytes shown to the caller once; only the SHA-256 of
//!   the secret is persisted

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Key types accepted for upload
pub const SSH_KEY_TYPES: &[&str] = &[
    "ssh-rsa",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "ssh-dss",
];

/// Number of random bytes in an API key secret
pub const API_KEY_BYTES: usize = 32;

/// A stored SSH public key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshKey {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub public_key: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// A stored API key (the secret itself is never stored)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

/// A freshly created API key together with its one-time secret
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    #[serde(flatten)]
    pub key: ApiKey,
    /// Plaintext secret; this is the only time it is available
    #[serde(rename = "key")]
    pub secret: String,
}

/// Validate an OpenSSH public key line (`<type> <base64> [comment]`)
pub fn validate_ssh_public_key(key: &str) -> Result<()> {
    let mut parts = key.split_whitespace();
    let (Some(key_type), Some(blob)) = (parts.next(), parts.next()) else {
        return Err(CoreError::InvalidSshKey {
            reason: "expected '<type> <base64-key> [comment]'".to_string(),
        });
    };

    if !SSH_KEY_TYPES.contains(&key_type) {
        return Err(CoreError::InvalidSshKey {
            reason: format!("unsupported key type '{}'", key_type),
        });
    }

    STANDARD
        .decode(blob)
        .map_err(|e| CoreError::InvalidSshKey {
            reason: format!("key data is not valid base64: {}", e),
        })?;

    Ok(())
}

/// MD5 fingerprint of a public key, e.g. `16:27:ac:...`
pub fn ssh_fingerprint(key: &str) -> Result<String> {
    use md5::{Digest, Md5};

    validate_ssh_public_key(key)?;
    let blob = key.split_whitespace().nth(1).unwrap_or_default();
    let decoded = STANDARD
        .decode(blob)
        .map_err(|e| CoreError::InvalidSshKey {
            reason: e.to_string(),
        })?;

    let digest = Md5::digest(&decoded);
    Ok(digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

/// Build an `authorized_keys` file: each key followed by a newline, in order
pub fn authorized_keys<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a SshKey>,
{
    let mut out = String::new();
    for key in keys {
        out.push_str(&key.public_key);
        out.push('\n');
    }
    out
}

/// Generate a new API key, returning `(plaintext, hash)`
pub fn generate_api_key() -> (String, String) {
    let bytes: [u8; API_KEY_BYTES] = rand::random();
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_api_key(&plaintext);
    (plaintext, hash)
}

/// Hex SHA-256 of an API key secret
pub fn hash_api_key(key: &str) -> String {
    use sha2::{Digest, Sha256};

    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl alice@laptop";

    fn key(id: i64, public_key: &str) -> SshKey {
        SshKey {
            id,
            user_id: 1,
            name: format!("key-{}", id),
            public_key: public_key.to_string(),
            fingerprint: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_accepts_known_types() {
        assert!(validate_ssh_public_key(ED25519).is_ok());
        assert!(validate_ssh_public_key("ssh-rsa AAAAB3NzaC1yc2E=").is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_keys() {
        assert!(validate_ssh_public_key("").is_err());
        assert!(validate_ssh_public_key("ssh-ed25519").is_err());
        assert!(validate_ssh_public_key("ssh-foo AAAA").is_err());
        assert!(validate_ssh_public_key("ssh-ed25519 not*base64").is_err());
    }

    #[test]
    fn test_fingerprint_format_and_stability() {
        let fp = ssh_fingerprint(ED25519).unwrap();
        assert_eq!(fp.len(), 16 * 3 - 1);
        assert_eq!(fp.split(':').count(), 16);
        assert_eq!(fp, ssh_fingerprint(ED25519).unwrap());

        // The comment does not participate in the fingerprint
        let without_comment = ED25519.rsplit_once(' ').unwrap().0;
        assert_eq!(fp, ssh_fingerprint(without_comment).unwrap());
    }

    #[test]
    fn test_fingerprint_known_value() {
        // md5("abc") = 900150983cd24fb0d6963f7d28e17f72
        let line = format!("ssh-rsa {}", STANDARD.encode(b"abc"));
        assert_eq!(
            ssh_fingerprint(&line).unwrap(),
            "90:01:50:98:3c:d2:4f:b0:d6:96:3f:7d:28:e1:7f:72"
        );
    }

    #[test]
    fn test_authorized_keys_preserves_order() {
        let first = key(2, "ssh-ed25519 AAAA second-id-first");
        let second = key(1, "ssh-rsa BBBB first-id-second");
        let content = authorized_keys([&first, &second]);
        assert_eq!(
            content,
            "ssh-ed25519 AAAA second-id-first\nssh-rsa BBBB first-id-second\n"
        );
    }

    #[test]
    fn test_generate_api_key() {
        let (plaintext, hash) = generate_api_key();
        assert_eq!(plaintext.len(), 43);
        assert!(!plaintext.contains('='));
        assert_eq!(hash, hash_api_key(&plaintext));
        assert_eq!(hash.len(), 64);

        let (other, _) = generate_api_key();
        assert_ne!(plaintext, other);
    }

    #[test]
    fn test_hash_api_key_known_value() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer("bearer  abc123 "), Some("abc123"));
        assert_eq!(parse_bearer("Basic abc123"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer   "), None);
    }

    #[test]
    fn test_issued_key_serializes_secret_once() {
        let issued = IssuedApiKey {
            key: ApiKey {
                id: 3,
                user_id: 1,
                name: "ci".to_string(),
                key_hash: "hash".to_string(),
                created_at: Utc::now(),
                last_used: None,
            },
            secret: "s3cret".to_string(),
        };
        let json = serde_json::to_value(&issued).unwrap();
        assert_eq!(json["key"], "s3cret");
        assert_eq!(json["name"], "ci");
        assert!(json.get("key_hash").is_none());
    }
}
