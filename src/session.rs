use crate::keyring;

/// The signed-in mailbox identifier and the credential that authorizes
/// requests for it.
///
/// Obtaining the credential happens elsewhere; this only carries it and
/// persists it between runs.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub identifier: String,
    pub credential: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identifier", &self.identifier)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Session {
    pub fn new(identifier: impl Into<String>, credential: Option<String>) -> Self {
        Session {
            identifier: identifier.into(),
            credential,
        }
    }

    /// `None` when the identifier is empty or whitespace.
    pub fn identifier(&self) -> Option<&str> {
        let trimmed = self.identifier.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(&self.identifier)
        }
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Rebuild a session from the credential stored for `identifier`.
    pub fn restore(identifier: &str) -> Result<Self, String> {
        let token = keyring::get_token(identifier)?;
        log::info!("Session restored from keyring");
        Ok(Session::new(identifier, Some(token)))
    }

    /// Store the credential so [`restore`](Self::restore) can find it.
    pub fn persist(&self) -> Result<(), String> {
        match &self.credential {
            Some(token) => keyring::set_token(&self.identifier, token),
            None => Err("session has no credential to persist".into()),
        }
    }

    /// Forget the stored credential. A missing entry is not an error.
    pub fn sign_out(self) {
        if let Err(e) = keyring::delete_token(&self.identifier) {
            log::debug!("sign-out: {e}");
        }
    }
}

/// The identifier of `session`, if it names a mailbox.
pub(crate) fn active_identifier(session: Option<&Session>) -> Option<&str> {
    session.and_then(Session::identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifier_is_absent() {
        assert_eq!(Session::new("  ", None).identifier(), None);
        assert_eq!(active_identifier(None), None);
        let s = Session::new("a@x.com", Some("tok".into()));
        assert_eq!(active_identifier(Some(&s)), Some("a@x.com"));
    }

    #[test]
    fn debug_redacts_credential() {
        let s = Session::new("a@x.com", Some("secret-token".into()));
        let shown = format!("{s:?}");
        assert!(shown.contains("a@x.com"));
        assert!(!shown.contains("secret-token"));
    }

    #[test]
    fn persist_without_credential_fails() {
        assert!(Session::new("a@x.com", None).persist().is_err());
    }
}
