//! Endpoint and widget configuration.

use std::collections::HashMap;

use tracing::info;

const DEFAULT_API_ENDPOINT: &str = "http://localhost:9100";
const DEFAULT_WS_ENDPOINT: &str = "ws://localhost:9101";

/// Where the engine finds its collaborators and how it authenticates.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_endpoint: String,
    pub ws_endpoint: String,
    pub auth_token: String,
}

impl EngineConfig {
    /// Priority: build-time env -> runtime env -> default.
    pub fn from_env() -> Self {
        let api_endpoint = option_env!("RIPPLE_API_ENDPOINT")
            .map(String::from)
            .or_else(|| std::env::var("RIPPLE_API_ENDPOINT").ok())
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        let ws_endpoint = option_env!("RIPPLE_WS_ENDPOINT")
            .map(String::from)
            .or_else(|| std::env::var("RIPPLE_WS_ENDPOINT").ok())
            .unwrap_or_else(|| DEFAULT_WS_ENDPOINT.to_string());
        let auth_token = std::env::var("RIPPLE_AUTH_TOKEN").unwrap_or_default();

        info!(api = %api_endpoint, ws = %ws_endpoint, "resolved engine endpoints");
        Self {
            api_endpoint,
            ws_endpoint,
            auth_token,
        }
    }
}

/// Placement of the embedded widget on the host page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetPosition {
    pub bottom: String,
    pub right: String,
    pub left: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSize {
    pub width: String,
    pub height: String,
}

/// Configuration of an embedded widget instance, read from the `data-*`
/// attributes of the embed script tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    pub auth_token: String,
    pub api_endpoint: String,
    pub ws_endpoint: String,
    pub company_name: String,
    pub company_logo: Option<String>,
    pub position: WidgetPosition,
    pub size: WidgetSize,
    pub persistent_widget: bool,
    pub show_button_when_open: bool,
}

impl WidgetConfig {
    /// Parse the attribute map of the embed script tag, applying defaults
    /// for anything the host page omitted.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Self {
        let get = |key: &str| attrs.get(key).cloned();
        let get_or = |key: &str, default: &str| {
            attrs
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        let get_flag = |key: &str| attrs.get(key).map(|v| v == "true").unwrap_or(false);

        Self {
            auth_token: get_or("data-auth-token", ""),
            api_endpoint: get_or("data-api-endpoint", ""),
            ws_endpoint: get_or("data-ws-endpoint", ""),
            company_name: get_or("data-company-name", "Chat Support"),
            company_logo: get("data-company-logo"),
            position: WidgetPosition {
                bottom: get_or("data-position-bottom", "20px"),
                right: get_or("data-position-right", "20px"),
                left: get("data-position-left"),
            },
            size: WidgetSize {
                width: get_or("data-width", "380px"),
                height: get_or("data-height", "600px"),
            },
            persistent_widget: get_flag("data-persistent"),
            show_button_when_open: get_flag("data-show-button-when-open"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn widget_defaults_apply() {
        let config = WidgetConfig::from_attributes(&attrs(&[]));

        assert_eq!(config.company_name, "Chat Support");
        assert_eq!(config.position.bottom, "20px");
        assert_eq!(config.position.right, "20px");
        assert_eq!(config.position.left, None);
        assert_eq!(config.size.width, "380px");
        assert_eq!(config.size.height, "600px");
        assert!(!config.persistent_widget);
        assert!(!config.show_button_when_open);
    }

    #[test]
    fn widget_attributes_override_defaults() {
        let config = WidgetConfig::from_attributes(&attrs(&[
            ("data-auth-token", "t0k"),
            ("data-api-endpoint", "https://api.example.com"),
            ("data-ws-endpoint", "wss://ws.example.com"),
            ("data-company-name", "Acme Support"),
            ("data-position-left", "16px"),
            ("data-width", "420px"),
            ("data-persistent", "true"),
            ("data-show-button-when-open", "false"),
        ]));

        assert_eq!(config.auth_token, "t0k");
        assert_eq!(config.company_name, "Acme Support");
        assert_eq!(config.position.left.as_deref(), Some("16px"));
        assert_eq!(config.size.width, "420px");
        assert!(config.persistent_widget);
        assert!(!config.show_button_when_open);
    }
}
