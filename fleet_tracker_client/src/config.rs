use tracing::info;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_SOCKET_URL: &str = "http://localhost:5000";

/// Endpoints the client talks to. Defaults point at a local backend and
/// can be overridden through the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub socket_url: String,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, socket_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            socket_url: socket_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            api_base_url: load_url("FLEET_API_URL", DEFAULT_API_URL),
            socket_url: load_url("FLEET_SOCKET_URL", DEFAULT_SOCKET_URL),
        }
    }

    /// Endpoint receiving driver location reports.
    pub fn location_sink_url(&self) -> String {
        format!(
            "{}/api/driver/updateLocation",
            self.api_base_url.trim_end_matches('/')
        )
    }

    /// WebSocket dial address for the event bus, derived from the http(s)
    /// socket URL.
    pub fn websocket_url(&self) -> String {
        let base = self.socket_url.trim_end_matches('/');
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws}/ws")
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL, DEFAULT_SOCKET_URL)
    }
}

fn load_url(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }
    }
}
