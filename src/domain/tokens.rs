use crate::domain::models::DiscoveryToken;
use std::collections::HashMap;

/// Discovery token → accessory name, so engine callbacks that only carry a
/// token can be attributed in logs.
#[derive(Debug, Default)]
pub struct TokenCache {
    names: HashMap<DiscoveryToken, String>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: DiscoveryToken, name: &str) {
        self.names.insert(token, name.to_string());
    }

    pub fn remove(&mut self, token: &DiscoveryToken) -> Option<String> {
        self.names.remove(token)
    }

    pub fn name(&self, token: &DiscoveryToken) -> Option<&str> {
        self.names.get(token).map(String::as_str)
    }

    /// Name for logging; falls back to the token's hex form.
    pub fn label(&self, token: &DiscoveryToken) -> String {
        self.name(token)
            .map(str::to_string)
            .unwrap_or_else(|| token.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
