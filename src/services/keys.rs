use std::collections::HashMap;

pub const FINNHUB_API_KEY: &str = "finnhub_api_key";
pub const NEWS_API_KEY: &str = "news_api_key";
pub const MARKETAUX_API_KEY: &str = "marketaux_api_key";
pub const LLM_API_KEY: &str = "llm_api_key";

/// Credential source for collectors and the LLM client. Missing keys
/// disable the corresponding collector/verifier rather than failing
/// startup. Encryption-at-rest is out of scope; this trait
/// is the seam a future implementation would plug into.
pub trait SecureKeyLoader: Send + Sync {
    fn load(&self) -> HashMap<String, String>;
}

/// Production loader: reads the recognized key names from the process
/// environment, the same `dotenvy` + `std::env` pattern used throughout
/// this codebase's `*Config::from_env` constructors.
pub struct EnvKeyLoader;

impl EnvKeyLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnvKeyLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureKeyLoader for EnvKeyLoader {
    fn load(&self) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        for (name, env_var) in [
            (FINNHUB_API_KEY, "FINNHUB_API_KEY"),
            (NEWS_API_KEY, "NEWS_API_KEY"),
            (MARKETAUX_API_KEY, "MARKETAUX_API_KEY"),
            (LLM_API_KEY, "LLM_API_KEY"),
        ] {
            if let Ok(value) = std::env::var(env_var) {
                if !value.is_empty() {
                    keys.insert(name.to_string(), value);
                }
            }
        }
        keys
    }
}

/// In-memory loader for tests, letting a test choose exactly which
/// collectors are constructible without touching process environment.
pub struct StaticKeyLoader {
    keys: HashMap<String, String>,
}

impl StaticKeyLoader {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }

    pub fn empty() -> Self {
        Self { keys: HashMap::new() }
    }
}

impl SecureKeyLoader for StaticKeyLoader {
    fn load(&self) -> HashMap<String, String> {
        self.keys.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_loader_returns_only_configured_keys() {
        let mut keys = HashMap::new();
        keys.insert(FINNHUB_API_KEY.to_string(), "abc".to_string());
        let loader = StaticKeyLoader::new(keys);
        let loaded = loader.load();
        assert_eq!(loaded.get(FINNHUB_API_KEY), Some(&"abc".to_string()));
        assert!(loaded.get(NEWS_API_KEY).is_none());
    }

    #[test]
    fn empty_loader_disables_everything() {
        let loader = StaticKeyLoader::empty();
        assert!(loader.load().is_empty());
    }
}
