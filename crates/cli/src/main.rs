use clap::{Parser, Subcommand};
use hlf_controller::api::ApiResponse;
use hlf_controller::client::{CallParams, ControllerClient, DeployParams, DEFAULT_BASE_URL};

#[derive(Parser)]
#[command(name = "hlf-controller")]
#[command(about = "Hyperledger Fabric test-network controller", long_about = None)]
struct Cli {
    /// Controller base URL for client subcommands.
    #[arg(long, global = true, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the HTTP controller.
    Serve {
        /// Config file path (default: HLF_CONFIG_PATH or ./config.yaml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8081)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the effective configuration (after defaults and env overrides) as YAML.
    Config {
        /// Config file path (default: HLF_CONFIG_PATH or ./config.yaml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Bring the network up or down via a running controller.
    Network {
        #[command(subcommand)]
        action: NetworkCommand,
    },

    /// Channel operations via a running controller.
    Channel {
        #[command(subcommand)]
        action: ChannelCommand,
    },

    /// Chaincode operations via a running controller.
    Chaincode {
        #[command(subcommand)]
        action: ChaincodeCommand,
    },
}

#[derive(Subcommand)]
enum NetworkCommand {
    Up,
    Down,
}

#[derive(Subcommand)]
enum ChannelCommand {
    /// Create a channel (server default: mychannel).
    Create {
        #[arg(long, short)]
        channel: Option<String>,
    },
}

#[derive(clap::Args)]
struct CallArgs {
    #[arg(long, short = 'C')]
    channel: String,
    #[arg(long, short = 'n')]
    chaincode: String,
    #[arg(long, short)]
    function: String,
    /// Positional function arguments.
    args: Vec<String>,
}

impl From<CallArgs> for CallParams {
    fn from(a: CallArgs) -> Self {
        CallParams {
            channel: a.channel,
            chaincode: a.chaincode,
            function: a.function,
            args: a.args,
        }
    }
}

#[derive(Subcommand)]
enum ChaincodeCommand {
    /// Package, install, approve and commit a chaincode (network.sh deployCC).
    Deploy {
        #[arg(long)]
        name: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        language: String,
        /// Server default: 1.0
        #[arg(long)]
        version: Option<String>,
        /// Server default: mychannel
        #[arg(long, short)]
        channel: Option<String>,
    },
    /// Submit a transaction endorsed by every configured peer.
    Invoke(CallArgs),
    /// Evaluate a function on the CLI's peer.
    Query(CallArgs),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("hlf-controller {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Serve { config, port }) => run_serve(config, port).await,
        Some(Commands::Config { config }) => print_config(config),
        Some(Commands::Network { action }) => run_client(&cli.url, Request::Network(action)).await,
        Some(Commands::Channel { action }) => run_client(&cli.url, Request::Channel(action)).await,
        Some(Commands::Chaincode { action }) => {
            run_client(&cli.url, Request::Chaincode(action)).await
        }
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = hlf_controller::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "loaded configuration from {}; network script {}",
        path.display(),
        config.network.script_path
    );
    hlf_controller::api::run_server(config).await
}

fn print_config(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = hlf_controller::config::load_config(config_path)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

enum Request {
    Network(NetworkCommand),
    Channel(ChannelCommand),
    Chaincode(ChaincodeCommand),
}

async fn run_client(url: &str, request: Request) -> anyhow::Result<()> {
    let client = ControllerClient::new(Some(url.to_string()))?;
    let response: ApiResponse = match request {
        Request::Network(NetworkCommand::Up) => client.network_up().await?,
        Request::Network(NetworkCommand::Down) => client.network_down().await?,
        Request::Channel(ChannelCommand::Create { channel }) => {
            client.create_channel(channel.as_deref()).await?
        }
        Request::Chaincode(ChaincodeCommand::Deploy {
            name,
            path,
            language,
            version,
            channel,
        }) => {
            client
                .deploy(&DeployParams {
                    name,
                    path,
                    language,
                    version,
                    channel,
                })
                .await?
        }
        Request::Chaincode(ChaincodeCommand::Invoke(args)) => client.invoke(&args.into()).await?,
        Request::Chaincode(ChaincodeCommand::Query(args)) => client.query(&args.into()).await?,
    };
    println!("{}", response.message.trim_end());
    if !response.is_success() {
        anyhow::bail!("controller reported an error");
    }
    Ok(())
}
