use crate::edge::{AllowEntry, EdgePolicy, DEFAULT_ALLOW_LIST};
use secrecy::SecretString;

pub const DEFAULT_REGION: &str = "ap-northeast-1";

/// Settings read once at startup and shared by reference afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: Option<SecretString>,
    /// Falls back to `api_base_url` when unset.
    pub liveness_base_url: Option<String>,
    pub region: String,
    pub user_pool_id: Option<String>,
    pub user_pool_client_id: Option<String>,
    pub identity_pool_id: Option<String>,
    pub allow_guest_access: bool,
    pub allow_list: Vec<AllowEntry>,
    pub allowed_countries: Vec<String>,
}

impl Config {
    #[must_use]
    pub fn new(api_base_url: String) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key: None,
            liveness_base_url: None,
            region: DEFAULT_REGION.to_string(),
            user_pool_id: None,
            user_pool_client_id: None,
            identity_pool_id: None,
            allow_guest_access: false,
            allow_list: DEFAULT_ALLOW_LIST.to_vec(),
            allowed_countries: Vec::new(),
        }
    }

    #[must_use]
    pub fn liveness_base_url(&self) -> &str {
        self.liveness_base_url
            .as_deref()
            .map_or(self.api_base_url.as_str(), |url| url.trim_end_matches('/'))
    }

    #[must_use]
    pub fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::new(self.allow_list.clone(), self.allowed_countries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_config_defaults() {
        let config = Config::new("https://api.example.com/".to_string());
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.region, "ap-northeast-1");
        assert!(config.api_key.is_none());
        assert!(!config.allow_guest_access);
        assert_eq!(config.allow_list, DEFAULT_ALLOW_LIST.to_vec());
    }

    #[test]
    fn test_liveness_base_url_fallback() {
        let mut config = Config::new("https://api.example.com".to_string());
        assert_eq!(config.liveness_base_url(), "https://api.example.com");

        config.liveness_base_url = Some("https://liveness.example.com/".to_string());
        assert_eq!(config.liveness_base_url(), "https://liveness.example.com");
    }

    #[test]
    fn test_edge_policy() {
        let mut config = Config::new("https://api.example.com".to_string());
        config.allow_list = vec![AllowEntry {
            ip: Ipv4Addr::new(10, 0, 0, 0),
            prefix: 8,
        }];
        config.allowed_countries = vec![" jp ".to_string()];

        let policy = config.edge_policy();
        assert_eq!(policy.allow_list.len(), 1);
        assert_eq!(policy.allowed_countries, vec!["JP".to_string()]);
    }
}
