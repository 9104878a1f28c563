use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use kinetic_deploy::adk::graph::RunnableConfig;
use kinetic_deploy::adk::model::OpenAIModel;
use kinetic_deploy::kinetic::config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use kinetic_deploy::kinetic::demo::{self, ChatState, DEMO_GRAPH_NAME};
use kinetic_deploy::kinetic::lifecycle::ConnectionPair;
use kinetic_deploy::kinetic::server;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the graph over HTTP (default)
    Serve {
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Create or migrate the store and checkpoint tables, then exit
    Setup,
    /// Run the graph once and print the final state
    Invoke {
        /// Request state as JSON, e.g. '{"messages":[{"role":"user","content":"hi"}]}'
        #[arg(short, long)]
        input: String,

        /// Thread to continue; a new one is created when omitted
        #[arg(short, long)]
        thread_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig::from_env()?;
    let model = Arc::new(OpenAIModel::from_env());

    match args.command.unwrap_or(Commands::Serve {
        host: DEFAULT_HOST.to_string(),
        port: DEFAULT_PORT,
    }) {
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", host, port))?;
            server::run(&config, addr, demo::builder(model)).await?;
        }
        Commands::Setup => {
            let connections = ConnectionPair::open(&config.database_url).await?;
            connections.release(config.shutdown_grace).await;
            println!("Store and checkpoint tables are up to date");
        }
        Commands::Invoke { input, thread_id } => {
            let state: ChatState =
                serde_json::from_str(&input).context("--input is not a valid request state")?;
            let thread_id = thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let connections = ConnectionPair::open(&config.database_url).await?;
            let result = async {
                let mut graph = demo::builder(model).compile(
                    connections.store.clone(),
                    connections.checkpointer.clone(),
                )?;
                graph.name = DEMO_GRAPH_NAME.to_string();
                graph
                    .invoke(&state, &RunnableConfig::with_thread_id(thread_id.clone()))
                    .await
            }
            .await;
            connections.release(config.shutdown_grace).await;

            let result = result?;
            println!("thread_id: {}", thread_id);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
