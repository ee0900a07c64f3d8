//! Local tool/auth report produced by the requirement detector script.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where the deploy CLI credentials were found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthSource {
    #[default]
    None,
    Env,
    Cli,
    Keychain,
}

impl AuthSource {
    fn parse(value: &str) -> Self {
        match value {
            "env" => Self::Env,
            "cli" => Self::Cli,
            "keychain" => Self::Keychain,
            _ => Self::None,
        }
    }
}

/// Which coding-agent CLIs are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    None,
    Claude,
    Codex,
    Both,
}

impl Provider {
    fn parse(value: &str) -> Self {
        match value {
            "claude" => Self::Claude,
            "codex" => Self::Codex,
            "both" => Self::Both,
            _ => Self::None,
        }
    }
}

/// Body of `GET /api/requirements`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub claude_installed: bool,
    pub codex_installed: bool,
    pub railway_installed: bool,
    pub git_installed: bool,
    pub bun_installed: bool,
    pub railway_auth: bool,
    pub railway_auth_source: AuthSource,
    pub provider: Provider,
}

impl Requirements {
    /// Parse the detector's `KEY=VALUE` report.
    ///
    /// Values may contain `=`; lines without one are ignored. Flags are only
    /// set by the literal `true`.
    pub fn parse(report: &str) -> Self {
        let map: HashMap<&str, &str> = report
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        let flag = |key: &str| map.get(key).is_some_and(|v| *v == "true");

        Self {
            claude_installed: flag("CLAUDE_INSTALLED"),
            codex_installed: flag("CODEX_INSTALLED"),
            railway_installed: flag("RAILWAY_INSTALLED"),
            git_installed: flag("GIT_INSTALLED"),
            bun_installed: flag("BUN_INSTALLED"),
            railway_auth: flag("RAILWAY_AUTH"),
            railway_auth_source: map
                .get("RAILWAY_AUTH_SOURCE")
                .map(|v| AuthSource::parse(v))
                .unwrap_or_default(),
            provider: map
                .get("PROVIDER")
                .map(|v| Provider::parse(v))
                .unwrap_or_default(),
        }
    }
}
