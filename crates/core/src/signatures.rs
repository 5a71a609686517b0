//! Fault signatures: text patterns that identify a specific fault kind
//! inside an otherwise opaque backend error body.

use std::sync::LazyLock;

use regex::RegexSet;

/// Patterns indicating that the credential a handle was built with has
/// expired or been rejected by the backend's token verifier.
pub const EXPIRED_CREDENTIAL_PATTERNS: &[&str] = &[
    r"(?i)jwt\s+(has\s+)?expired",
    r"(?i)token\s+(is\s+|has\s+)?expired",
    r"(?i)signature\s+has\s+expired",
    r"(?i)invalid\s+jwt",
    r"PGRST30[13]",
    r#"(?i)"exp"\s+claim"#,
    r"\bCREDENTIAL_EXPIRED\b",
];

static EXPIRED_CREDENTIAL: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(EXPIRED_CREDENTIAL_PATTERNS).expect("valid expired-credential patterns")
});

/// A compiled set of patterns; a text matches if any pattern matches.
#[derive(Debug, Clone)]
pub struct FaultSignatures {
    set: RegexSet,
}

impl FaultSignatures {
    /// Compile a custom pattern set.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            set: RegexSet::new(patterns)?,
        })
    }

    /// The built-in expired-credential signature set.
    pub fn expired_credential() -> Self {
        Self {
            set: EXPIRED_CREDENTIAL.clone(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.set.is_match(text)
    }
}

impl Default for FaultSignatures {
    fn default() -> Self {
        Self::expired_credential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_common_expiry_messages() {
        let sigs = FaultSignatures::default();
        assert!(sigs.matches(r#"{"code":"PGRST301","message":"JWT expired"}"#));
        assert!(sigs.matches("Token is expired"));
        assert!(sigs.matches("invalid JWT: unable to parse or verify signature"));
        assert!(sigs.matches("Signature has expired"));
    }

    #[test]
    fn ignores_unrelated_failures() {
        let sigs = FaultSignatures::default();
        assert!(!sigs.matches("connection reset by peer"));
        assert!(!sigs.matches(r#"{"message":"relation \"users\" does not exist"}"#));
        assert!(!sigs.matches(""));
    }

    #[test]
    fn custom_patterns_compile_and_match() {
        let sigs = FaultSignatures::new(["lease revoked", "^E42$"]).unwrap();
        assert!(sigs.matches("the lease revoked at 12:00"));
        assert!(sigs.matches("E42"));
        assert!(!sigs.matches("jwt expired"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(FaultSignatures::new(["(unclosed"]).is_err());
    }
}
