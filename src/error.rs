/// Failure of a single remote store call.
///
/// Every failure is terminal for the attempt that produced it; nothing in this
/// crate retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("remote store error {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("decode: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        StoreError::Remote {
            status,
            body: body.into(),
        }
    }

    /// HTTP status of a `Remote` failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Failure of an operation issued against a mounted view controller.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("view is no longer active")]
    Inactive,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_carries_status_and_body() {
        let err = StoreError::remote(401, "Permission denied");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "remote store error 401: Permission denied");
    }

    #[test]
    fn decode_error_has_no_status() {
        let err: StoreError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(matches!(err, StoreError::Decode(_)));
        assert_eq!(err.status(), None);
    }
}
