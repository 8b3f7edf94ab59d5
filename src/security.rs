// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pre-connection security gate for server configuration.
//!
//! Runs before any process is spawned or socket opened. Commands must be on
//! a fixed allow-list of runtime interpreters and process launchers,
//! arguments must be free of shell metacharacters, and URLs must use
//! http/https. A failure here is fatal to the whole multi-server setup
//! sequence (see [`crate::error::ConnectError::is_fatal`]).

use reqwest::Url;

use crate::config::ServerConfig;
use crate::error::ConfigError;

/// Runtime interpreters and process launchers allowed as server commands.
pub const ALLOWED_COMMANDS: [&str; 11] = [
    "node", "npx", "bun", "bunx", "deno", "python", "python3", "uv", "uvx", "pipx", "docker",
];

/// Shell metacharacters rejected anywhere in an argument.
pub const SHELL_METACHARACTERS: [char; 9] = ['&', ';', '|', '`', '$', '>', '<', '*', '?'];

/// Hosts flagged for audit logging when dialed (permitted, not an error).
const LOOPBACK_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Validate a server name and configuration before any connection work.
pub fn validate(name: &str, config: &ServerConfig) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyName);
    }

    if config.command.is_none() && config.url.is_none() {
        return Err(ConfigError::malformed(
            name,
            "config must specify either 'command' or 'url'",
        ));
    }

    if let Some(command) = &config.command {
        validate_command(command)?;
        for arg in &config.args {
            validate_argument(arg)?;
        }
        validate_env(config)?;
    }

    if let Some(url) = &config.url {
        validate_url(name, url)?;
    }

    Ok(())
}

fn validate_command(command: &str) -> Result<(), ConfigError> {
    // Only the executable name counts, not its path prefix.
    let binary = std::path::Path::new(command)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(command);

    if ALLOWED_COMMANDS.contains(&binary) {
        Ok(())
    } else {
        Err(ConfigError::CommandNotAllowed {
            command: command.to_string(),
            allowed: ALLOWED_COMMANDS.iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn validate_argument(arg: &str) -> Result<(), ConfigError> {
    if let Some(character) = arg.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(ConfigError::DangerousArgument {
            argument: arg.to_string(),
            character,
        });
    }
    Ok(())
}

fn validate_env(config: &ServerConfig) -> Result<(), ConfigError> {
    // The map type already guarantees string-to-string pairs; reject the
    // entries the OS cannot represent.
    for (key, value) in &config.env {
        if key.is_empty() {
            return Err(ConfigError::InvalidEnv {
                key: key.clone(),
                message: "key must be non-empty".to_string(),
            });
        }
        if key.contains('=') || key.contains('\0') {
            return Err(ConfigError::InvalidEnv {
                key: key.clone(),
                message: "key contains '=' or NUL".to_string(),
            });
        }
        if value.contains('\0') {
            return Err(ConfigError::InvalidEnv {
                key: key.clone(),
                message: "value contains NUL".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_url(name: &str, url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ConfigError::SchemeNotAllowed {
                url: url.to_string(),
                scheme: scheme.to_string(),
            })
        }
    }

    if let Some(host) = parsed.host_str() {
        if LOOPBACK_HOSTS.contains(&host) {
            tracing::warn!(server = name, url, "connecting to loopback address");
        }
    }

    Ok(())
}
