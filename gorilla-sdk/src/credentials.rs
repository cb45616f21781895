//! Credential providers for identifying to the network's identity service.

/// Supplies the secret used to identify the bot's nick.
///
/// Injected at construction so the connection never prompts on its own.
pub trait CredentialProvider: Send + Sync {
    /// The secret, or `None` to skip identification.
    fn secret(&self) -> Option<String>;
}

/// Never identifies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn secret(&self) -> Option<String> {
        None
    }
}

/// A secret fixed at startup.
#[derive(Clone)]
pub struct StaticCredentials {
    secret: String,
}

impl StaticCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn secret(&self) -> Option<String> {
        Some(self.secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let creds = StaticCredentials::new("hunter2");
        assert_eq!(creds.secret().as_deref(), Some("hunter2"));
        assert!(!format!("{creds:?}").contains("hunter2"));
        assert_eq!(NoCredentials.secret(), None);
    }
}
