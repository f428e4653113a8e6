use std::fmt;

/// Bearer token issued by the external auth service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for blank tokens.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tokens_are_rejected_and_debug_is_redacted() {
        assert!(Credential::new("   ").is_none());
        let credential = Credential::new(" abc.def \n").expect("token");
        assert_eq!(credential.expose(), "abc.def");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
    }
}
