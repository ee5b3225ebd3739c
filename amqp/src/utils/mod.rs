//! # Utilities Module
//!
//! Helpers shared across the handler layer.
//!
//! The [`env`] module provides validated access to environment variables, used
//! by [`ConnectionOptions::from_env`](crate::config::ConnectionOptions::from_env):
//!
//! ```no_run
//! use amqp::utils::env::EnvUtils;
//!
//! let hostname = EnvUtils::get_validated_var("AMQP_HOSTNAME")?;
//! let user_agent = EnvUtils::get_optional_var("AMQP_USER_AGENT")
//!     .unwrap_or_else(|| "eventhubs-amqp".to_string());
//! ```

pub mod env;
