//! Command builder: turn an [`OperationRequest`] into the program and argv to run.
//! No shell is used; every value is its own argument.
//!
//! Script operations (`up`, `down`, `createChannel`, `deployCC`) target `network.sh`.
//! Invoke and query go through `<cli_binary> exec ... <cli_container> peer chaincode ...`
//! with the CLI identity injected as `-e KEY=VALUE` pairs.

use serde::Serialize;
use std::fmt;

use crate::config::NetworkConfig;
use crate::operation::{ChaincodeCall, DeployRequest, NetworkAction, OperationRequest};

/// Program plus ordered arguments for one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            write!(f, " {}", a)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A topology value the command needs is empty; carries the config key.
    #[error("network config field {0} is empty")]
    EmptyField(String),
    #[error("network config has no peers; invoke needs at least one endorsing peer")]
    NoPeers,
    #[error("encoding invocation spec: {0}")]
    Spec(#[from] serde_json::Error),
}

/// `-c` payload for `peer chaincode invoke|query`.
#[derive(Serialize)]
struct InvocationSpec<'a> {
    function: &'a str,
    #[serde(rename = "Args")]
    args: &'a [String],
}

/// Which `peer chaincode` subcommand to emit.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ChaincodeVerb {
    Invoke,
    Query,
}

fn non_empty<'a>(key: &str, value: &'a str) -> Result<&'a str, BuildError> {
    if value.trim().is_empty() {
        Err(BuildError::EmptyField(key.to_string()))
    } else {
        Ok(value)
    }
}

/// Builds invocations from the network topology. Borrowing only; the topology is never modified.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    network: &'a NetworkConfig,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(network: &'a NetworkConfig) -> Self {
        Self { network }
    }

    /// Single entry point: dispatch on the request variant.
    pub fn build(&self, request: &OperationRequest) -> Result<Invocation, BuildError> {
        match request {
            OperationRequest::Network(action) => self.network_lifecycle(*action),
            OperationRequest::ChannelCreate { channel } => self.create_channel(channel),
            OperationRequest::Deploy(d) => self.deploy(d),
            OperationRequest::Invoke(call) => self.invoke(call),
            OperationRequest::Query(call) => self.query(call),
        }
    }

    pub fn network_lifecycle(&self, action: NetworkAction) -> Result<Invocation, BuildError> {
        self.script(vec![action.subcommand().to_string()])
    }

    pub fn create_channel(&self, channel: &str) -> Result<Invocation, BuildError> {
        self.script(vec![
            "createChannel".to_string(),
            "-c".to_string(),
            channel.to_string(),
        ])
    }

    pub fn deploy(&self, d: &DeployRequest) -> Result<Invocation, BuildError> {
        let args = [
            "deployCC",
            "-ccn",
            d.name.as_str(),
            "-ccp",
            d.path.as_str(),
            "-ccl",
            d.language.as_str(),
            "-ccv",
            d.version.as_str(),
            "-c",
            d.channel.as_str(),
        ];
        self.script(args.iter().map(|s| s.to_string()).collect())
    }

    pub fn invoke(&self, call: &ChaincodeCall) -> Result<Invocation, BuildError> {
        self.chaincode(ChaincodeVerb::Invoke, call)
    }

    pub fn query(&self, call: &ChaincodeCall) -> Result<Invocation, BuildError> {
        self.chaincode(ChaincodeVerb::Query, call)
    }

    fn script(&self, args: Vec<String>) -> Result<Invocation, BuildError> {
        let program = non_empty("network.scriptPath", &self.network.script_path)?;
        Ok(Invocation {
            program: program.to_string(),
            args,
        })
    }

    fn chaincode(&self, verb: ChaincodeVerb, call: &ChaincodeCall) -> Result<Invocation, BuildError> {
        let net = self.network;
        let program = non_empty("network.cliBinary", &net.cli_binary)?;
        let container = non_empty("network.cliContainer", &net.cli_container)?;
        let msp_id = non_empty("network.cli.mspID", &net.cli.msp_id)?;
        let peer_address = non_empty("network.cli.peerAddress", &net.cli.peer_address)?;
        let root_cert = non_empty("network.cli.tlsRootCertFile", &net.cli.tls_root_cert_file)?;
        let msp_path = non_empty("network.cli.mspConfigPath", &net.cli.msp_config_path)?;

        let mut args: Vec<String> = vec!["exec".to_string()];
        for (key, value) in [
            ("CORE_PEER_TLS_ENABLED", if net.tls_enabled { "true" } else { "false" }),
            ("CORE_PEER_LOCALMSPID", msp_id),
            ("CORE_PEER_TLS_ROOTCERT_FILE", root_cert),
            ("CORE_PEER_MSPCONFIGPATH", msp_path),
            ("CORE_PEER_ADDRESS", peer_address),
        ] {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(container.to_string());
        args.extend(["peer", "chaincode"].map(String::from));

        match verb {
            ChaincodeVerb::Invoke => {
                let orderer = non_empty("network.orderer.address", &net.orderer.address)?;
                let host = non_empty(
                    "network.orderer.hostnameOverride",
                    &net.orderer.hostname_override,
                )?;
                args.push("invoke".to_string());
                args.extend([
                    "-o".to_string(),
                    orderer.to_string(),
                    "--ordererTLSHostnameOverride".to_string(),
                    host.to_string(),
                ]);
                if net.tls_enabled {
                    let ca = non_empty("network.orderer.tlsCaCert", &net.orderer.tls_ca_cert)?;
                    args.extend(["--tls".to_string(), "--cafile".to_string(), ca.to_string()]);
                }
            }
            ChaincodeVerb::Query => args.push("query".to_string()),
        }

        args.extend([
            "-C".to_string(),
            call.channel.clone(),
            "-n".to_string(),
            call.chaincode.clone(),
        ]);

        if verb == ChaincodeVerb::Invoke {
            if net.peers.is_empty() {
                return Err(BuildError::NoPeers);
            }
            // endorsement order follows the configured peer order
            for (i, peer) in net.peers.iter().enumerate() {
                let address = non_empty(&format!("network.peers[{}].address", i), &peer.address)?;
                let cert = non_empty(
                    &format!("network.peers[{}].tlsRootCertFile", i),
                    &peer.tls_root_cert_file,
                )?;
                args.extend([
                    "--peerAddresses".to_string(),
                    address.to_string(),
                    "--tlsRootCertFiles".to_string(),
                    cert.to_string(),
                ]);
            }
        }

        let spec = serde_json::to_string(&InvocationSpec {
            function: &call.function,
            args: &call.args,
        })?;
        args.push("-c".to_string());
        args.push(spec);

        Ok(Invocation {
            program: program.to_string(),
            args,
        })
    }
}
