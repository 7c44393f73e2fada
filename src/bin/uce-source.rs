use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uce_traversal::{init_logging, ConnectionReversalSource, ReversalConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Connection reversal source", long_about = None)]
struct Args {
    /// Mediator address
    #[arg(short, long)]
    mediator: SocketAddr,

    /// Seconds to wait for the target or the mediator
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Have a registered target connect to us
    Connect {
        /// Unique user name of the target
        #[arg(short, long)]
        user: String,

        /// Local listening port (0 = ephemeral)
        #[arg(short, long, default_value_t = 0)]
        port: u16,

        /// Line sent to the target once connected
        #[arg(long)]
        greeting: Option<String>,
    },
    /// List users registered at the mediator
    Users,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let timeout = Duration::from_secs(args.timeout);
    let config = ReversalConfig::new(args.mediator)
        .with_accept_timeout(timeout)
        .with_list_timeout(timeout);
    let source = ConnectionReversalSource::new(config);

    match args.command {
        Command::Connect { user, port, greeting } => {
            let mut stream = source.connect_on_port(&user, port).await?;
            println!("Connected to {} at {}", user, stream.peer_addr()?);
            if let Some(line) = greeting {
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
            }
        }
        Command::Users => {
            let mut users: Vec<_> = source.get_user_list().await?.into_iter().collect();
            users.sort();
            if users.is_empty() {
                println!("No registered users");
            }
            for user in users {
                println!("{}", user);
            }
        }
    }

    Ok(())
}
