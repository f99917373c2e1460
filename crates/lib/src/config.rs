//! Configuration types and loading.
//!
//! Config is loaded once at startup from a YAML file (default `config.yaml`, or
//! `HLF_CONFIG_PATH`) and handed to the controller as an immutable value.
//! Missing file => defaults matching the Fabric `test-network` layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::operation::OperationKind;

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "HLF_CONFIG_PATH";

/// Env var overriding `network.scriptPath`.
pub const SCRIPT_PATH_ENV: &str = "HLF_NETWORK_SCRIPT_PATH";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP bind and port.
    #[serde(default)]
    pub server: ServerConfig,

    /// Network topology: script, CLI identity, orderer, peers.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Per-operation deadlines.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Process execution limits.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// HTTP server bind address and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Port (default 8081).
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8081
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
            port: default_server_port(),
        }
    }
}

/// Everything the command builder needs to address the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Path to `network.sh`. Overridden by HLF_NETWORK_SCRIPT_PATH; when both are empty,
    /// `~/fabric-samples/test-network/network.sh` is used.
    pub script_path: String,
    /// Container runtime binary used to reach the CLI container (default "docker").
    pub cli_binary: String,
    /// Name of the container running the peer CLI (default "cli").
    pub cli_container: String,
    /// Value of CORE_PEER_TLS_ENABLED; when true invoke also passes `--tls --cafile`.
    pub tls_enabled: bool,
    pub cli: CliIdentity,
    pub orderer: OrdererConfig,
    /// Endorsing peers, in the order they are passed to `peer chaincode invoke`.
    pub peers: Vec<PeerConfig>,
}

/// MSP identity injected into the CLI container's environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliIdentity {
    #[serde(rename = "mspID", alias = "mspId")]
    pub msp_id: String,
    pub peer_address: String,
    pub tls_root_cert_file: String,
    pub msp_config_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdererConfig {
    pub address: String,
    pub hostname_override: String,
    pub tls_ca_cert: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    pub address: String,
    pub tls_root_cert_file: String,
}

const CLI_CRYPTO_ROOT: &str = "/opt/gopath/src/github.com/hyperledger/fabric/peer/organizations";

impl Default for NetworkConfig {
    fn default() -> Self {
        let org_peer_cert = |org: &str, peer: &str| {
            format!("{CLI_CRYPTO_ROOT}/peerOrganizations/{org}/peers/{peer}/tls/ca.crt")
        };
        Self {
            script_path: String::new(),
            cli_binary: "docker".to_string(),
            cli_container: "cli".to_string(),
            tls_enabled: true,
            cli: CliIdentity {
                msp_id: "Org1MSP".to_string(),
                peer_address: "peer0.org1.example.com:7051".to_string(),
                tls_root_cert_file: org_peer_cert("org1.example.com", "peer0.org1.example.com"),
                msp_config_path: format!(
                    "{CLI_CRYPTO_ROOT}/peerOrganizations/org1.example.com/users/Admin@org1.example.com/msp"
                ),
            },
            orderer: OrdererConfig {
                address: "orderer.example.com:7050".to_string(),
                hostname_override: "orderer.example.com".to_string(),
                tls_ca_cert: format!(
                    "{CLI_CRYPTO_ROOT}/ordererOrganizations/example.com/orderers/orderer.example.com/msp/tlscacerts/tlsca.example.com-cert.pem"
                ),
            },
            peers: vec![
                PeerConfig {
                    address: "peer0.org1.example.com:7051".to_string(),
                    tls_root_cert_file: org_peer_cert("org1.example.com", "peer0.org1.example.com"),
                },
                PeerConfig {
                    address: "peer0.org2.example.com:9051".to_string(),
                    tls_root_cert_file: org_peer_cert("org2.example.com", "peer0.org2.example.com"),
                },
            ],
        }
    }
}

/// Deadline per operation kind. Durations are humantime strings ("2m", "300s").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutsConfig {
    /// Network up and down.
    #[serde(with = "humantime_serde")]
    pub network: Duration,
    #[serde(with = "humantime_serde")]
    pub channel: Duration,
    #[serde(with = "humantime_serde")]
    pub deploy: Duration,
    #[serde(with = "humantime_serde")]
    pub invoke: Duration,
    #[serde(with = "humantime_serde")]
    pub query: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            network: Duration::from_secs(120),
            channel: Duration::from_secs(120),
            deploy: Duration::from_secs(300),
            invoke: Duration::from_secs(120),
            query: Duration::from_secs(120),
        }
    }
}

impl TimeoutsConfig {
    /// Deadline for one operation kind.
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::NetworkUp | OperationKind::NetworkDown => self.network,
            OperationKind::ChannelCreate => self.channel,
            OperationKind::Deploy => self.deploy,
            OperationKind::Invoke => self.invoke,
            OperationKind::Query => self.query,
        }
    }
}

/// Limits applied around each spawned process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Serialize mutating operations that target the same channel/chaincode (default true).
    pub serialize_targets: bool,
    /// Upper bound on concurrently running external processes. None = unbounded.
    pub max_concurrent: Option<usize>,
    /// Captured output beyond this many bytes is dropped (default 4 MiB).
    pub max_output_bytes: usize,
    /// Time between SIGTERM and SIGKILL when a deadline expires.
    #[serde(with = "humantime_serde")]
    pub kill_grace: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            serialize_targets: true,
            max_concurrent: None,
            max_output_bytes: 4 * 1024 * 1024,
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Reject values that would make every request fail in a confusing way.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        let t = &self.timeouts;
        for (name, d) in [
            ("network", t.network),
            ("channel", t.channel),
            ("deploy", t.deploy),
            ("invoke", t.invoke),
            ("query", t.query),
        ] {
            if d.is_zero() {
                anyhow::bail!("timeouts.{} must be a positive duration", name);
            }
        }
        if self.execution.max_concurrent == Some(0) {
            anyhow::bail!("execution.maxConcurrent must be at least 1 when set");
        }
        Ok(())
    }
}

/// Resolve config path from env or default (`config.yaml` in the working directory).
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

/// Pick the orchestration script: env override, then configured value, then the fabric-samples default under `home`.
pub fn resolve_script_path(configured: &str, env_override: Option<&str>, home: Option<&Path>) -> String {
    if let Some(p) = env_override.map(str::trim).filter(|p| !p.is_empty()) {
        return p.to_string();
    }
    if !configured.trim().is_empty() {
        return configured.to_string();
    }
    home.unwrap_or_else(|| Path::new("."))
        .join("fabric-samples")
        .join("test-network")
        .join("network.sh")
        .to_string_lossy()
        .into_owned()
}

/// Parse config from YAML text. Empty text => defaults.
pub fn parse_config(s: &str) -> Result<Config> {
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(s)?)
}

/// Load config from `path` (or the default path). Missing file => default config.
/// Resolves the script path and validates before returning; the result is the
/// process-lifetime configuration. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::warn!(
            "config file not found, using defaults: {}",
            path.display()
        );
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&s).with_context(|| format!("parsing config from {}", path.display()))?
    };
    let env_script = std::env::var(SCRIPT_PATH_ENV).ok();
    config.network.script_path = resolve_script_path(
        &config.network.script_path,
        env_script.as_deref(),
        dirs::home_dir().as_deref(),
    );
    config
        .validate()
        .with_context(|| format!("validating config from {}", path.display()))?;
    Ok((config, path))
}
