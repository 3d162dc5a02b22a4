use clap::{Parser, ValueEnum};
use log::{debug, info};
use server::{GhastlyServer, ServerProvider};
use shared::config::{DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MAX_PACKET_SIZE};
use shared::{BufferConfig, ConnectionProvider, DatagramProvider};
use std::net::SocketAddr;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    /// One stream connection per peer
    Tcp,
    /// A single datagram socket shared by every peer
    Udp,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Number of identities that can be handed out
    #[arg(short = 'c', long, default_value = "32")]
    max_clients: u32,

    /// Updates per second
    #[arg(short, long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..))]
    tick_rate: u32,

    #[arg(long, value_enum, default_value = "tcp")]
    transport: Transport,

    /// Packets queued per connection and direction before drops start
    #[arg(long, default_value_t = DEFAULT_MAX_BUFFER_SIZE)]
    max_buffer_size: usize,

    /// Largest packet accepted from a peer, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PACKET_SIZE)]
    max_packet_size: usize,

    /// Disconnect peers that stay silent for this many seconds
    #[arg(long)]
    host_timeout: Option<u64>,

    /// Seconds between connection statistics reports
    #[arg(long, default_value = "10")]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = BufferConfig::default()
        .with_max_buffer_size(args.max_buffer_size)
        .with_max_packet_size(args.max_packet_size);

    // Failing to open the transport ends the process before the update loop
    let provider: Box<dyn ConnectionProvider> = match args.transport {
        Transport::Tcp => Box::new(ServerProvider::bind(addr, config)?),
        Transport::Udp => Box::new(DatagramProvider::open(addr, config)?),
    };

    let mut server = GhastlyServer::new(provider, args.max_clients);
    if let Some(secs) = args.host_timeout {
        server = server.with_host_timeout(Duration::from_secs(secs));
    }

    info!(
        "Server listening on {} ({:?}) with room for {} clients at {}Hz",
        addr, args.transport, args.max_clients, args.tick_rate
    );

    let mut tick_interval = interval(Duration::from_secs_f32(1.0 / args.tick_rate as f32));
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats_interval = interval(Duration::from_secs(args.stats_interval.max(1)));
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                let now = Instant::now();
                let handled = server.update(now - last_tick);
                last_tick = now;
                if handled > 0 {
                    debug!("Handled {} packets, {} clients connected", handled, server.connected_count());
                }
            }
            _ = stats_interval.tick() => {
                server.provider().log_statistics();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    // Dropping the server notifies every connected client
    drop(server);
    Ok(())
}
