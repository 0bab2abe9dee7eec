//! Process configuration from the environment, plus the stored analytics and
//! server settings that live in the state file.

use crate::models::ServerSlot;
use crate::storage::resolve_data_path;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

pub const DEFAULT_PORT: u16 = 8080;
pub const MAX_WINDOW: u32 = 3650;
pub const POSTER_WIDTH: u32 = 300;
pub const POSTER_HEIGHT: u32 = 450;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_path: PathBuf,
    /// External `{posters: [...]}` endpoint for the landing page quilt.
    pub poster_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let poster_url = env::var("QUILT_POSTER_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Self {
            port,
            data_path: resolve_data_path(),
            poster_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub daily_trend_days: u32,
    pub monthly_trend_months: u32,
    /// Window for user activity, top content, pies and summary totals.
    pub history_days: u32,
    pub top_movies: u32,
    pub top_tv_shows: u32,
    pub top_users: u32,
    /// Window for the viewing history table on the dashboard.
    pub history_table_days: u32,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            daily_trend_days: 60,
            monthly_trend_months: 60,
            history_days: 60,
            top_movies: 30,
            top_tv_shows: 30,
            top_users: 20,
            history_table_days: 60,
        }
    }
}

impl AnalyticsSettings {
    pub fn validate(&self) -> Vec<String> {
        let fields = [
            ("daily_trend_days", self.daily_trend_days),
            ("monthly_trend_months", self.monthly_trend_months),
            ("history_days", self.history_days),
            ("top_movies", self.top_movies),
            ("top_tv_shows", self.top_tv_shows),
            ("top_users", self.top_users),
            ("history_table_days", self.history_table_days),
        ];

        fields
            .into_iter()
            .filter(|(_, value)| !(1..=MAX_WINDOW).contains(value))
            .map(|(name, _)| format!("{name} must be between 1 and {MAX_WINDOW}."))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub slot: ServerSlot,
    pub name: String,
    pub ip_address: String,
    pub api_key: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub verify_ssl: bool,
}

impl ServerConfig {
    pub fn server_url(&self) -> String {
        let protocol = if self.use_ssl { "https" } else { "http" };
        format!("{protocol}://{}", self.ip_address)
    }

    /// Browser-loadable URL for a Plex image path, served through Tautulli's
    /// image proxy. Absolute URLs pass through unchanged.
    pub fn image_proxy_url(&self, image_path: &str) -> Option<String> {
        let image_path = image_path.trim();
        if image_path.is_empty() {
            return None;
        }
        if image_path.starts_with("http://") || image_path.starts_with("https://") {
            return Some(image_path.to_string());
        }

        let width = POSTER_WIDTH.to_string();
        let height = POSTER_HEIGHT.to_string();
        reqwest::Url::parse_with_params(
            &format!("{}/pms_image_proxy", self.server_url()),
            [
                ("img", image_path),
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("fallback", "poster"),
            ],
        )
        .ok()
        .map(String::from)
    }

    pub fn masked(&self) -> ServerView {
        ServerView {
            slot: self.slot,
            name: self.name.clone(),
            ip_address: self.ip_address.clone(),
            api_key: mask_api_key(&self.api_key),
            use_ssl: self.use_ssl,
            verify_ssl: self.verify_ssl,
        }
    }
}

/// A server config as served back to clients; the API key is masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerView {
    pub slot: ServerSlot,
    pub name: String,
    pub ip_address: String,
    pub api_key: String,
    pub use_ssl: bool,
    pub verify_ssl: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServerInput {
    pub slot: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub verify_ssl: bool,
}

impl ServerInput {
    pub fn into_config(self) -> Result<ServerConfig, Vec<String>> {
        let mut errors = Vec::new();

        let slot = ServerSlot::parse(&self.slot);
        if slot.is_none() {
            errors.push("Server slot must be 'A' or 'B'.".to_string());
        }

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("Server name is required.".to_string());
        }

        let ip_address = self.ip_address.trim();
        if ip_address.is_empty() {
            errors.push("IP address is required.".to_string());
        } else if !ip_address.contains(':') {
            errors.push("IP address must include port (e.g., 192.168.1.100:8181).".to_string());
        }

        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            errors.push("API key is required.".to_string());
        } else if api_key.eq_ignore_ascii_case("YOUR_API_KEY") {
            errors.push(
                "Please replace \"YOUR_API_KEY\" with your actual Tautulli API key.".to_string(),
            );
        }

        match slot {
            Some(slot) if errors.is_empty() => Ok(ServerConfig {
                slot,
                name: name.to_string(),
                ip_address: ip_address.to_string(),
                api_key: api_key.to_string(),
                use_ssl: self.use_ssl,
                verify_ssl: self.verify_ssl,
            }),
            _ => Err(errors),
        }
    }
}

pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(slot: &str, ip: &str, key: &str) -> ServerInput {
        ServerInput {
            slot: slot.to_string(),
            name: "Apollo".to_string(),
            ip_address: ip.to_string(),
            api_key: key.to_string(),
            use_ssl: false,
            verify_ssl: false,
        }
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(AnalyticsSettings::default().validate().is_empty());
    }

    #[test]
    fn settings_reject_out_of_range_windows() {
        let settings = AnalyticsSettings {
            history_days: 0,
            top_users: MAX_WINDOW + 1,
            ..AnalyticsSettings::default()
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("history_days"));
        assert!(errors[1].starts_with("top_users"));
    }

    #[test]
    fn server_input_requires_port_and_real_key() {
        let errors = input("A", "192.168.1.10", "your_api_key").into_config().unwrap_err();
        assert_eq!(errors.len(), 2);

        let config = input("b", " 10.0.0.2:8181 ", "0123456789abcdef").into_config().unwrap();
        assert_eq!(config.slot, ServerSlot::B);
        assert_eq!(config.ip_address, "10.0.0.2:8181");
        assert_eq!(config.server_url(), "http://10.0.0.2:8181");
    }

    #[test]
    fn image_paths_go_through_the_proxy() {
        let mut config = input("A", "10.0.0.2:8181", "0123456789abcdef").into_config().unwrap();
        assert_eq!(
            config.image_proxy_url("/library/metadata/42/thumb/1700000000").as_deref(),
            Some(
                "http://10.0.0.2:8181/pms_image_proxy?img=%2Flibrary%2Fmetadata%2F42%2Fthumb%2F1700000000&width=300&height=450&fallback=poster"
            )
        );

        config.use_ssl = true;
        let url = config.image_proxy_url("/library/metadata/7/thumb/1").unwrap();
        assert!(url.starts_with("https://10.0.0.2:8181/pms_image_proxy?img="));

        assert_eq!(
            config.image_proxy_url("https://img.example/p1.jpg").as_deref(),
            Some("https://img.example/p1.jpg")
        );
        assert_eq!(config.image_proxy_url("  "), None);
    }

    #[test]
    fn server_input_rejects_unknown_slot() {
        let errors = input("C", "10.0.0.2:8181", "0123456789abcdef").into_config().unwrap_err();
        assert_eq!(errors, vec!["Server slot must be 'A' or 'B'.".to_string()]);
    }

    #[test]
    fn api_keys_are_masked() {
        assert_eq!(mask_api_key("0123456789abcdef"), "0123...cdef");
        assert_eq!(mask_api_key("short"), "***");
        assert_eq!(mask_api_key("12345678"), "***");
    }
}
