use thiserror::Error;

const SERVICE_NAME: &str = "com.fluent.app";
const GEMINI_KEY_ACCOUNT: &str = "gemini_api_key";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secure storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to {action} secret `{account}`: {message}")]
    Access {
        action: &'static str,
        account: &'static str,
        message: String,
    },
}

/// One credential in the OS keyring.
#[derive(Debug, Clone, Copy)]
pub struct SecretSlot {
    service: &'static str,
    account: &'static str,
}

impl SecretSlot {
    pub const fn gemini_api_key() -> Self {
        Self {
            service: SERVICE_NAME,
            account: GEMINI_KEY_ACCOUNT,
        }
    }

    fn entry(&self) -> Result<keyring::Entry, SecretError> {
        keyring::Entry::new(self.service, self.account)
            .map_err(|err| SecretError::Unavailable(err.to_string()))
    }

    fn access_error(&self, action: &'static str, err: keyring::Error) -> SecretError {
        SecretError::Access {
            action,
            account: self.account,
            message: err.to_string(),
        }
    }

    /// Stored value, trimmed; a blank entry reads as absent.
    pub fn read(&self) -> Result<Option<String>, SecretError> {
        match self.entry()?.get_password() {
            Ok(value) => {
                let value = value.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(self.access_error("read", err)),
        }
    }

    /// Stores `secret`; a blank value deletes the entry instead.
    pub fn write(&self, secret: &str) -> Result<(), SecretError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return self.clear();
        }
        self.entry()?
            .set_password(secret)
            .map_err(|err| self.access_error("write", err))
    }

    pub fn clear(&self) -> Result<(), SecretError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(err) if is_missing(&err) => Ok(()),
            Err(err) => Err(self.access_error("clear", err)),
        }
    }

    /// Whether the keyring now holds `expected`. Some backends accept a write
    /// without persisting it.
    pub fn holds(&self, expected: &str) -> Result<bool, SecretError> {
        Ok(self
            .read()?
            .is_some_and(|stored| stored == expected.trim()))
    }
}

fn is_missing(err: &keyring::Error) -> bool {
    matches!(err, keyring::Error::NoEntry) || is_not_found_message(&err.to_string())
}

fn is_not_found_message(message: &str) -> bool {
    let normalized = message.to_lowercase();
    ["no entry", "not found", "no matching entry"]
        .iter()
        .any(|needle| normalized.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_not_found_wording_counts_as_missing() {
        assert!(is_not_found_message("No matching entry found in secure storage"));
        assert!(is_not_found_message("Item NOT FOUND"));
        assert!(!is_not_found_message("permission denied"));
        assert!(is_missing(&keyring::Error::NoEntry));
    }

    #[test]
    fn access_errors_name_the_account() {
        let err = SecretError::Access {
            action: "read",
            account: GEMINI_KEY_ACCOUNT,
            message: "locked".to_string(),
        };
        assert_eq!(err.to_string(), "failed to read secret `gemini_api_key`: locked");
    }
}
