//! Client configuration: built once at startup, read-only afterwards
use super::error::ConfigError;
use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<ClientConfig> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Resolve discovered peers as localhost, for a network running on one machine.
    pub discovery_as_localhost: bool,
    pub msp_id: String,
    pub app_user: String,
    pub channel_name: String,
    pub chaincode_name: String,
    pub ledger_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            discovery_as_localhost: true,
            msp_id: "Org1MSP".into(),
            app_user: "alice".into(),
            channel_name: "mychannel".into(),
            chaincode_name: "medicinecontract".into(),
            ledger_path: PathBuf::from("medical-supply.db"),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whichever variables `lookup` knows about.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("DISCOVERY_AS_LOCALHOST") {
            config.discovery_as_localhost = parse_flag("DISCOVERY_AS_LOCALHOST", value)?;
        }
        if let Some(value) = lookup("MEDSUPPLY_MSP_ID") {
            config.msp_id = value;
        }
        if let Some(value) = lookup("MEDSUPPLY_APP_USER") {
            config.app_user = value;
        }
        if let Some(value) = lookup("MEDSUPPLY_CHANNEL") {
            config.channel_name = value;
        }
        if let Some(value) = lookup("MEDSUPPLY_CHAINCODE") {
            config.chaincode_name = value;
        }
        if let Some(value) = lookup("MEDSUPPLY_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(value);
        }

        Ok(config)
    }
}

fn parse_flag(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { name, value }),
    }
}

/// Installs the process-wide configuration. Only the first call succeeds.
pub fn init(config: ClientConfig) -> Result<&'static ClientConfig, ConfigError> {
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

pub fn get() -> Option<&'static ClientConfig> {
    CONFIG.get()
}
