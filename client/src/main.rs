use clap::{Parser, ValueEnum};
use client::{ClientProvider, ClientState, GhastlyClient};
use log::{error, info, warn};
use shared::{BufferConfig, ConnectionProvider, DatagramProvider};
use std::net::SocketAddr;
use tokio::time::{interval, Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    Tcp,
    Udp,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    #[arg(long, value_enum, default_value = "tcp")]
    transport: Transport,

    /// Seconds to keep the identity before disconnecting
    #[arg(long, default_value = "5")]
    hold: u64,

    /// Seconds to wait for the server to answer
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Updates per second
    #[arg(short, long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..))]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;
    let config = BufferConfig::default();

    let provider: Box<dyn ConnectionProvider> = match args.transport {
        Transport::Tcp => Box::new(ClientProvider::connect(server_addr, config)?),
        Transport::Udp => Box::new(DatagramProvider::open("0.0.0.0:0".parse()?, config)?),
    };

    let mut client = GhastlyClient::new(provider, server_addr);
    info!("Requesting an identity from {}", server_addr);
    client.request_identity();

    let mut tick_interval = interval(Duration::from_secs_f32(1.0 / args.tick_rate as f32));
    let started = Instant::now();
    let mut last_tick = started;
    let mut connected_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                let now = Instant::now();
                client.update(now - last_tick);
                last_tick = now;

                match client.state() {
                    ClientState::Connected(_) => {
                        let since = *connected_at.get_or_insert(now);
                        if now - since >= Duration::from_secs(args.hold) {
                            client.disconnect();
                            break;
                        }
                    }
                    ClientState::Rejected => {
                        warn!("Server refused to hand out an identity");
                        break;
                    }
                    ClientState::Disconnected => {
                        info!("Session ended by the server");
                        break;
                    }
                    ClientState::Idle | ClientState::Requesting => {
                        if now - started >= Duration::from_secs(args.timeout) {
                            error!("No answer from {} after {}s", server_addr, args.timeout);
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                break;
            }
        }
    }

    client.provider().log_statistics();
    // Dropping the client flushes its farewell before the connection closes
    drop(client);
    Ok(())
}
