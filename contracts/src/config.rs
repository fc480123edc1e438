//! Network configuration for deployments.
//!
//! Loaded from environment variables (after `.env`, which the binary reads
//! with `dotenvy`). The signing key is the only required value; a deploy
//! never proceeds without one.

use crate::types::{Address, B256};
use alloy_primitives::hex::FromHexError;
use alloy_primitives::keccak256;
use serde::Serialize;
use std::env;
use thiserror::Error;

/// Signing key variable; 32-byte hex, `0x` optional
pub const PRIVATE_KEY_VAR: &str = "SEPOLIA_PRIVATE_KEY";
/// RPC endpoint variable
pub const RPC_URL_VAR: &str = "ALCHEMY_SEPOLIA_URL";
/// Source-verification key variable
pub const ETHERSCAN_KEY_VAR: &str = "ETHERSCAN_KEY";
/// Compiler version variable
pub const SOLIDITY_VERSION_VAR: &str = "SOLIDITY_VERSION";
/// Sourcify toggle variable
pub const SOURCIFY_VAR: &str = "SOURCIFY_ENABLED";
/// Network name variable
pub const NETWORK_VAR: &str = "NETWORK_NAME";
/// Log filter variable
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Why configuration could not be loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("{0} is not set")]
    Missing(&'static str),

    /// The signing key is not 32 bytes of hex
    #[error("{var} is not a valid signing key: {source}")]
    InvalidKey {
        /// Variable name
        var: &'static str,
        /// Decoding failure
        source: FromHexError,
    },

    /// A boolean variable holds something other than true/false
    #[error("{var} must be true or false, got {value:?}")]
    InvalidBool {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// A 32-byte deployer signing key
///
/// Never printed; `Debug` is redacted and the key is skipped when the
/// configuration is serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(B256);

impl SigningKey {
    /// Parses a hex-encoded key, `0x` optional
    ///
    /// # Errors
    ///
    /// [`FromHexError`] if the input is not exactly 32 bytes of hex.
    pub fn from_hex(input: &str) -> Result<Self, FromHexError> {
        input.trim().parse::<B256>().map(Self)
    }

    /// Ledger account controlled by this key
    ///
    /// The account is an opaque identifier, the low 20 bytes of the key's
    /// keccak-256 hash. It is not the secp256k1 address a wallet would show
    /// for the same key; the in-process ledger never verifies signatures.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::from_word(keccak256(self.0))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// A credential-bearing setting (API key, RPC URL with an embedded key)
///
/// `Debug` is redacted and the type is not serializable; read the value with
/// [`Secret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// The raw value
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Deployment target settings
#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfig {
    /// Network name
    pub network: String,
    /// RPC endpoint, if configured; Alchemy URLs embed the API key
    #[serde(skip)]
    pub rpc_url: Option<Secret>,
    /// Deployer key
    #[serde(skip)]
    pub signing_key: SigningKey,
    /// Source-verification key, if configured
    #[serde(skip)]
    pub etherscan_key: Option<Secret>,
    /// Compiler version the contracts target
    pub solidity_version: String,
    /// Whether Sourcify verification is enabled
    pub sourcify_enabled: bool,
    /// Log filter
    pub log_level: String,
}

impl NetworkConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// See [`NetworkConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] without a signing key,
    /// [`ConfigError::InvalidKey`] for a malformed one,
    /// [`ConfigError::InvalidBool`] for an unparsable `SOURCIFY_ENABLED`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let raw_key = get(PRIVATE_KEY_VAR).ok_or(ConfigError::Missing(PRIVATE_KEY_VAR))?;
        let signing_key = SigningKey::from_hex(&raw_key).map_err(|source| {
            ConfigError::InvalidKey {
                var: PRIVATE_KEY_VAR,
                source,
            }
        })?;

        let sourcify_enabled = match get(SOURCIFY_VAR) {
            None => true,
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool {
                var: SOURCIFY_VAR,
                value,
            })?,
        };

        Ok(Self {
            network: get(NETWORK_VAR).unwrap_or_else(|| "sepolia".to_string()),
            rpc_url: get(RPC_URL_VAR).map(Secret),
            signing_key,
            etherscan_key: get(ETHERSCAN_KEY_VAR).map(Secret),
            solidity_version: get(SOLIDITY_VERSION_VAR).unwrap_or_else(|| "0.8.27".to_string()),
            sourcify_enabled,
            log_level: get(LOG_LEVEL_VAR).unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Account that signs deployments
    #[must_use]
    pub fn deployer(&self) -> Address {
        self.signing_key.address()
    }

    /// Whether explorer verification can run
    #[must_use]
    pub const fn verification_enabled(&self) -> bool {
        self.etherscan_key.is_some()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
