const SERVICE: &str = "neverlight-mail";

fn key_id(identifier: &str) -> String {
    format!("store-token-{}", crate::mailbox_key::encode(identifier))
}

fn entry(key: &str) -> Result<keyring::Entry, String> {
    keyring::Entry::new(SERVICE, key).map_err(|e| {
        log::error!("keyring Entry::new failed for key={key:?}: {e}");
        format!("keyring error: {e}")
    })
}

/// Get the stored store credential for a mailbox identifier.
pub fn get_token(identifier: &str) -> Result<String, String> {
    let key = key_id(identifier);
    log::debug!("keyring GET: service={SERVICE:?} key={key:?}");
    entry(&key)?.get_password().map_err(|e| {
        log::warn!("keyring get_password failed for key={key:?}: {e}");
        format!("keyring get: {e}")
    })
}

pub fn set_token(identifier: &str, token: &str) -> Result<(), String> {
    let key = key_id(identifier);
    log::debug!("keyring SET: service={SERVICE:?} key={key:?}");
    entry(&key)?.set_password(token).map_err(|e| {
        log::error!("keyring set_password failed for key={key:?}: {e}");
        format!("keyring set: {e}")
    })
}

pub fn delete_token(identifier: &str) -> Result<(), String> {
    let key = key_id(identifier);
    log::debug!("keyring DELETE: service={SERVICE:?} key={key:?}");
    entry(&key)?.delete_credential().map_err(|e| {
        log::warn!("keyring delete failed for key={key:?}: {e}");
        format!("keyring delete: {e}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_normalized_like_the_mailbox() {
        assert_eq!(key_id(" A.B@X.com"), "store-token-a,b@x,com");
    }
}
