/// Gate in front of roster edits and connectivity settings
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, credential: &str) -> bool;
}

/// A single shared password from the config file.
///
/// Not hardened: this keeps students out of the settings, nothing more.
pub struct SharedPassword {
    password: String,
}

impl SharedPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl AccessPolicy for SharedPassword {
    fn authorize(&self, credential: &str) -> bool {
        credential == self.password
    }
}
