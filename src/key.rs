use sha2::{Digest, Sha256};

// Namespace mixed into hashed keys so the same raw value hashes differently
// for different strategies
const RAW_NAMESPACE: &str = "raw:";
const EMAIL_NAMESPACE: &str = "email:";

// Normalize an email so "Bob@Example.com " and "bob@example.com" share a record
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// Hash of namespace + raw value, hex encoded
pub fn hashed_key(namespace: &str, raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace);
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

/// How a raw client identifier becomes a limiter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    #[default]
    Raw,
    Email,
    /// Keeps raw identifiers out of process memory.
    Hashed,
    HashedEmail,
}

impl KeyStrategy {
    pub fn from_flags(email: bool, hashed: bool) -> Self {
        match (email, hashed) {
            (false, false) => Self::Raw,
            (true, false) => Self::Email,
            (false, true) => Self::Hashed,
            (true, true) => Self::HashedEmail,
        }
    }

    pub fn derive(&self, raw: &str) -> String {
        match self {
            Self::Raw => raw.to_string(),
            Self::Email => normalize_email(raw),
            Self::Hashed => hashed_key(RAW_NAMESPACE, raw),
            Self::HashedEmail => hashed_key(EMAIL_NAMESPACE, &normalize_email(raw)),
        }
    }
}
