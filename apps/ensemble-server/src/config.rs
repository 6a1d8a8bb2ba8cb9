use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Secret salt mixed into identity and color derivation.
    ///
    /// Rotating it invalidates every existing identity and stored color.
    pub salt: String,
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Path of the JSON file holding persisted profiles.
    pub users_file: PathBuf,
    /// Message of the day echoed in the `hi` reply.
    pub motd: String,
    /// Close sessions that send nothing for this long. Disabled when `None`.
    pub idle_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            salt: required_var("SALT"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            users_file: std::env::var("USERS_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("users.json")),
            motd: std::env::var("MOTD")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "tinympp".to_string()),
            idle_timeout: std::env::var("IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

// The salt must never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("salt", &"<redacted>")
            .field("port", &self.port)
            .field("users_file", &self.users_file)
            .field("motd", &self.motd)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_salt() {
        let config = Config {
            salt: "super-secret".to_string(),
            port: 3000,
            users_file: PathBuf::from("users.json"),
            motd: "tinympp".to_string(),
            idle_timeout: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
