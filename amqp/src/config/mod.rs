//! # Handler Configuration
//!
//! Static configuration records passed into the handlers at construction.
//! [`ConnectionOptions`] holds everything the connection handler negotiates
//! on open; [`SessionOptions`] holds the entity path and open-timeout settings
//! of a session. Both deserialize from JSON with defaults for missing fields,
//! and connection options can also be loaded from `AMQP_*` environment
//! variables.
//!
//! ```no_run
//! use amqp::config::{ConnectionOptions, SessionOptions};
//! use std::time::Duration;
//!
//! let options = ConnectionOptions::new("ns.servicebus.windows.net")
//!     .with_connection_id("conn-1")
//!     .with_user_agent("my-app/1.0");
//! options.validate()?;
//!
//! let session = SessionOptions::new("my-hub").with_open_timeout(Duration::from_secs(30));
//! ```

use crate::common::ConfigError;
use crate::engine::PeerVerification;
use crate::utils::env::EnvUtils;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// AMQP over TLS port.
pub const AMQPS_PORT: u16 = 5671;

/// Maximum frame size advertised on open.
pub const MAX_FRAME_SIZE: u32 = 65536;

/// User agent strings longer than this are truncated before being sent.
pub const MAX_USER_AGENT_LENGTH: usize = 128;

/// Prefix of the environment variables read by [`ConnectionOptions::from_env`].
pub const ENV_PREFIX: &str = "AMQP";

/// Default time a session waits for the peer's begin frame.
pub const DEFAULT_SESSION_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection property keys sent with the open frame.
pub mod property_keys {
    pub const PRODUCT: &str = "product";
    pub const VERSION: &str = "version";
    pub const PLATFORM: &str = "platform";
    pub const FRAMEWORK: &str = "framework";
    pub const USER_AGENT: &str = "user-agent";
}

/// Connection-level configuration owned by the connection handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Container id sent on open; also tags every log line
    pub connection_id: String,
    /// Fully qualified namespace host name
    pub hostname: String,
    pub port: u16,
    pub max_frame_size: u32,
    pub product: String,
    pub client_version: String,
    pub platform: String,
    pub framework: String,
    pub user_agent: String,
    /// TLS peer verification. `Anonymous` skips certificate and name checks.
    pub peer_verification: PeerVerification,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            hostname: String::new(),
            port: AMQPS_PORT,
            max_frame_size: MAX_FRAME_SIZE,
            product: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            framework: "Rust tokio".to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            peer_verification: PeerVerification::default(),
        }
    }
}

impl ConnectionOptions {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_product(mut self, product: impl Into<String>, version: impl Into<String>) -> Self {
        self.product = product.into();
        self.client_version = version.into();
        self
    }

    pub fn with_platform(
        mut self,
        platform: impl Into<String>,
        framework: impl Into<String>,
    ) -> Self {
        self.platform = platform.into();
        self.framework = framework.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_peer_verification(mut self, peer_verification: PeerVerification) -> Self {
        self.peer_verification = peer_verification;
        self
    }

    /// Loads options from `AMQP_*` environment variables.
    ///
    /// `AMQP_HOSTNAME` is required. `AMQP_CONNECTION_ID`, `AMQP_PORT`,
    /// `AMQP_USER_AGENT`, `AMQP_PRODUCT`, `AMQP_CLIENT_VERSION` and
    /// `AMQP_PEER_VERIFICATION` (`anonymous`, `verify_peer`, `verify_peer_name`)
    /// override the defaults when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Same as [`from_env`](Self::from_env) with `{prefix}_HOSTNAME` and so on.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let var = |suffix: &str| format!("{prefix}_{suffix}");
        let mut options = Self::new(EnvUtils::get_validated_var(&var("HOSTNAME"))?);

        if let Some(connection_id) = EnvUtils::get_optional_var(&var("CONNECTION_ID")) {
            options.connection_id = connection_id;
        }
        if let Some(port) = EnvUtils::get_optional_parsed_var(&var("PORT"))? {
            options.port = port;
        }
        if let Some(user_agent) = EnvUtils::get_optional_var(&var("USER_AGENT")) {
            options.user_agent = user_agent;
        }
        if let Some(product) = EnvUtils::get_optional_var(&var("PRODUCT")) {
            options.product = product;
        }
        if let Some(version) = EnvUtils::get_optional_var(&var("CLIENT_VERSION")) {
            options.client_version = version;
        }
        if let Some(mode) = EnvUtils::get_optional_var(&var("PEER_VERIFICATION")) {
            options.peer_verification = parse_peer_verification(&mode)?;
        }

        options.validate()?;
        Ok(options)
    }

    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "hostname",
                reason: "must not be empty".to_string(),
            });
        }
        if self.connection_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "connection_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "port",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_frame_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// `hostname:port`, used as the connection's virtual host.
    pub fn virtual_host(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// User agent capped at [`MAX_USER_AGENT_LENGTH`] characters.
    pub fn truncated_user_agent(&self) -> String {
        self.user_agent.chars().take(MAX_USER_AGENT_LENGTH).collect()
    }

    /// Properties sent with the open frame.
    pub fn connection_properties(&self) -> HashMap<String, String> {
        HashMap::from([
            (property_keys::PRODUCT.to_string(), self.product.clone()),
            (property_keys::VERSION.to_string(), self.client_version.clone()),
            (property_keys::PLATFORM.to_string(), self.platform.clone()),
            (property_keys::FRAMEWORK.to_string(), self.framework.clone()),
            (property_keys::USER_AGENT.to_string(), self.truncated_user_agent()),
        ])
    }
}

fn parse_peer_verification(value: &str) -> Result<PeerVerification, ConfigError> {
    match value.to_lowercase().as_str() {
        "anonymous" => Ok(PeerVerification::Anonymous),
        "verify_peer" => Ok(PeerVerification::VerifyPeer),
        "verify_peer_name" => Ok(PeerVerification::VerifyPeerName),
        other => Err(ConfigError::Invalid {
            field: "peer_verification",
            reason: format!("unknown mode '{other}'"),
        }),
    }
}

/// What a session does when its open timeout elapses before the peer answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTimeoutPolicy {
    /// Log the timeout and leave the session alone.
    #[default]
    Ignore,
    /// Close the session with a timeout condition and publish the error.
    ForceClose,
}

/// Session-level configuration owned by the session handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub entity_path: String,
    #[serde(with = "duration_secs")]
    pub open_timeout: Duration,
    pub timeout_policy: SessionTimeoutPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            entity_path: String::new(),
            open_timeout: DEFAULT_SESSION_OPEN_TIMEOUT,
            timeout_policy: SessionTimeoutPolicy::default(),
        }
    }
}

impl SessionOptions {
    pub fn new(entity_path: impl Into<String>) -> Self {
        Self {
            entity_path: entity_path.into(),
            ..Self::default()
        }
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    pub fn with_timeout_policy(mut self, timeout_policy: SessionTimeoutPolicy) -> Self {
        self.timeout_policy = timeout_policy;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
