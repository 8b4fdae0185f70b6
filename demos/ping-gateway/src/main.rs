use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use ironlink::prelude::*;
use ironlink::protocol::{Codec, JsonCodec};
use serde_json::json;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// A minimal gateway: answers `ping`, reports who you are, and sends a
/// heartbeat to every client.
#[derive(Parser, Debug)]
#[command(name = "ping-gateway", version, about)]
struct Args {
    /// Path to the TOML config file (defaults are used if it's missing)
    #[arg(short, long, default_value = "ironlink.toml")]
    config: PathBuf,

    /// Port to listen on, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between heartbeat broadcasts (0 disables them)
    #[arg(long, default_value_t = 30)]
    heartbeat_secs: u64,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

struct Ping;

#[async_trait]
impl Router for Ping {
    async fn handle(&self, req: &Request) -> Result<(), HandlerError> {
        req.reply(&Envelope::ok("pong", req.seqno())).await
    }
}

/// Replies with the connection's id and the tags set on connect.
struct WhoAmI;

#[async_trait]
impl Router for WhoAmI {
    async fn handle(&self, req: &Request) -> Result<(), HandlerError> {
        let conn = req.connection();
        let connected_at = conn.attribute("connected_at")?;
        let reply = Envelope::ok("whoami", req.seqno()).with_data(json!({
            "conn_id": conn.id().into_inner(),
            "peer": conn.peer_addr().to_string(),
            "connected_at": connected_at,
        }));
        req.reply(&reply).await
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn builder(config: ServerConfig) -> ServerBuilder {
    Server::builder()
        .config(config)
        .route("ping", Ping)
        .route("whoami", WhoAmI)
        .on_connect(|conn| conn.set_attribute("connected_at", unix_secs()))
        .on_disconnect(|conn| tracing::info!(conn_id = %conn.id(), "gateway client left"))
}

/// Broadcasts a heartbeat envelope every `every` until the server stops.
async fn heartbeat(handle: ServerHandle, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let beat = Envelope::ok("heartbeat", "").with_data(json!({
            "connections": handle.connections().len(),
            "ts": unix_secs(),
        }));
        let body = match JsonCodec.encode(&beat) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "heartbeat encode failed");
                continue;
            }
        };
        if handle.broadcast(body).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    ironlink::logging::init(&args.log_level);

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let server = builder(config).build().await?;
    let handle = server.handle();

    if args.heartbeat_secs > 0 {
        tokio::spawn(heartbeat(handle.clone(), Duration::from_secs(args.heartbeat_secs)));
    }

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
            stopper.stop();
        }
    });

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironlink::protocol::{read_frame, write_frame};
    use tokio::net::TcpStream;

    async fn start() -> ServerHandle {
        let server = builder(ServerConfig::default())
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        let handle = server.handle();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle
    }

    async fn call(stream: &mut TcpStream, cmd: &str, seqno: &str) -> Envelope {
        let body = JsonCodec.encode(&Envelope::request(cmd, seqno)).unwrap();
        write_frame(stream, &Message::new(body)).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), read_frame(stream, 0))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        JsonCodec.decode(reply.body()).unwrap()
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let reply = call(&mut client, "ping", "abc").await;
        assert_eq!(reply.cmd, "pong");
        assert_eq!(reply.seqno, "abc");
    }

    #[tokio::test]
    async fn test_whoami_reports_connect_tag() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let reply = call(&mut client, "whoami", "1").await;
        assert_eq!(reply.status, 0);
        let data = reply.data.unwrap();
        assert_eq!(data["conn_id"], 0);
        assert!(data["connected_at"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_heartbeat_is_broadcast() {
        let handle = start().await;
        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
        // Make sure the client is registered before the first beat.
        call(&mut client, "ping", "0").await;

        tokio::spawn(heartbeat(handle.clone(), Duration::from_millis(20)));

        let frame = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut client, 0))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let beat: Envelope = JsonCodec.decode(frame.body()).unwrap();
        assert_eq!(beat.cmd, "heartbeat");
        assert_eq!(beat.data.unwrap()["connections"], 1);

        handle.stop();
    }
}
