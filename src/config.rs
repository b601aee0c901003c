//! Configuration loading from `.env` files.

use std::{env, time::Duration};

use anyhow::{Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// REST base URL, e.g. `http://127.0.0.1:4000/api`.
    pub api_url: String,
    /// Realtime channel URL, e.g. `ws://127.0.0.1:4001/`.
    pub ws_url: String,
    /// Bearer token; `None` sends unauthenticated requests.
    pub token: Option<String>,
    /// Current viewer's user id.
    pub user_id: String,
    /// Current viewer's display name.
    pub username: String,
    /// Current viewer's avatar URL.
    pub avatar: String,
    /// Moderator capability flag.
    pub is_admin: bool,
    /// Channel tuning knobs (handshake bound, retry caps).
    pub channel: ChannelTuning,
}

/// Bounds on the channel's connect and reconnect behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTuning {
    /// Upper bound on a single WebSocket handshake.
    pub handshake_timeout: Duration,
    /// Maximum consecutive reconnection attempts before giving up.
    pub reconnect_max: u32,
    /// Base delay between reconnection attempts; grows per attempt.
    pub reconnect_base: Duration,
    /// Ceiling on the grown delay.
    pub reconnect_cap: Duration,
}

impl Default for ChannelTuning {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            reconnect_max: 5,
            reconnect_base: Duration::from_millis(500),
            reconnect_cap: Duration::from_millis(5000),
        }
    }
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let api_url = env::var("API_URL").context("API_URL is required")?;
        let ws_url = env::var("WS_URL").context("WS_URL is required")?;
        let token = env::var("TOKEN").ok().filter(|s| !s.is_empty());
        let user_id = env::var("USER_ID").context("USER_ID is required")?;
        let username = env::var("USERNAME_DISPLAY").unwrap_or_else(|_| user_id.clone());
        let avatar = env::var("AVATAR").unwrap_or_default();
        let is_admin = env::var("IS_ADMIN").unwrap_or_else(|_| "0".into()) == "1";
        let defaults = ChannelTuning::default();
        let channel = ChannelTuning {
            handshake_timeout: duration_var(
                "HANDSHAKE_TIMEOUT_SECS",
                1000,
                defaults.handshake_timeout,
            ),
            reconnect_max: env::var("RECONNECT_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.reconnect_max),
            reconnect_base: duration_var("RECONNECT_BASE_MS", 1, defaults.reconnect_base),
            reconnect_cap: duration_var("RECONNECT_CAP_MS", 1, defaults.reconnect_cap),
        };
        Ok(Self {
            api_url,
            ws_url,
            token,
            user_id,
            username,
            avatar,
            is_admin,
            channel,
        })
    }
}

/// Read a duration variable expressed in `scale_ms`-millisecond units.
fn duration_var(name: &str, scale_ms: u64, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|v| Duration::from_millis(v * scale_ms))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, sync::Mutex};
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 11] = [
        "API_URL",
        "WS_URL",
        "TOKEN",
        "USER_ID",
        "USERNAME_DISPLAY",
        "AVATAR",
        "IS_ADMIN",
        "HANDSHAKE_TIMEOUT_SECS",
        "RECONNECT_MAX",
        "RECONNECT_BASE_MS",
        "RECONNECT_CAP_MS",
    ];

    fn clear_vars() {
        for v in VARS {
            std::env::remove_var(v);
        }
    }

    #[test]
    fn loads_env() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_vars();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            concat!(
                "API_URL=http://127.0.0.1:4000/api\n",
                "WS_URL=ws://127.0.0.1:4001/\n",
                "TOKEN=secret\n",
                "USER_ID=u1\n",
                "USERNAME_DISPLAY=ada\n",
                "AVATAR=a.png\n",
                "IS_ADMIN=1\n",
                "HANDSHAKE_TIMEOUT_SECS=10\n",
                "RECONNECT_MAX=3\n",
                "RECONNECT_BASE_MS=100\n",
                "RECONNECT_CAP_MS=800\n",
            ),
        )
        .unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.api_url, "http://127.0.0.1:4000/api");
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:4001/");
        assert_eq!(cfg.token.as_deref(), Some("secret"));
        assert_eq!(cfg.user_id, "u1");
        assert_eq!(cfg.username, "ada");
        assert!(cfg.is_admin);
        assert_eq!(cfg.channel.handshake_timeout, Duration::from_secs(10));
        assert_eq!(cfg.channel.reconnect_max, 3);
        assert_eq!(cfg.channel.reconnect_base, Duration::from_millis(100));
        assert_eq!(cfg.channel.reconnect_cap, Duration::from_millis(800));
    }

    #[test]
    fn defaults_when_optional_absent() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_vars();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            concat!(
                "API_URL=http://127.0.0.1:4000/api\n",
                "WS_URL=ws://127.0.0.1:4001/\n",
                "USER_ID=u1\n",
            ),
        )
        .unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert!(cfg.token.is_none());
        assert_eq!(cfg.username, "u1");
        assert!(!cfg.is_admin);
        assert_eq!(cfg.channel, ChannelTuning::default());
    }

    #[test]
    fn empty_token_is_none() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_vars();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            concat!(
                "API_URL=http://127.0.0.1:4000/api\n",
                "WS_URL=ws://127.0.0.1:4001/\n",
                "USER_ID=u1\n",
                "TOKEN=\n",
            ),
        )
        .unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert!(cfg.token.is_none());
    }

    #[test]
    fn missing_required_fields_error() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_vars();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "WS_URL=ws://127.0.0.1:4001/\nUSER_ID=u1\n").unwrap();
        assert!(Settings::from_env(env_path.to_str().unwrap()).is_err());
    }
}
