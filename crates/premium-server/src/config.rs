//! Server Configuration

/// Settings read from the environment (`.env` is loaded first)
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Chrome extension id allowed to call the browser-facing routes
    pub extension_id: Option<String>,

    pub rust_log: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            extension_id: std::env::var("CHROME_EXTENSION_ID")
                .ok()
                .filter(|id| !id.trim().is_empty()),
            rust_log: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        }
    }

    pub fn allowed_origin(&self) -> Option<String> {
        self.extension_id
            .as_ref()
            .map(|id| format!("chrome-extension://{id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_origin() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            extension_id: Some("abcdefgh".into()),
            rust_log: "info".into(),
        };
        assert_eq!(config.allowed_origin().as_deref(), Some("chrome-extension://abcdefgh"));

        let open = ServerConfig {
            extension_id: None,
            ..config
        };
        assert_eq!(open.allowed_origin(), None);
    }
}
