//! Small command-line client for poking at a running server.
//!
//! `probe status` prints the server list JSON and round-trip time;
//! `probe chat --name steve --message hi` logs in, says something and
//! prints the chat it sees for a few seconds.

use clap::{Parser, Subcommand};
use env_logger::Env;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{
    ids, read_frame, write_frame, ChatMessage, ChatRequest, FrameCodec, Handshake, LoginStart,
    LoginSuccess, NextState, Packet, Ping, SetCompression, StatusResponse, MAX_FRAME_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout_at;
use tokio_util::codec::Framed;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, global = true, default_value = "127.0.0.1:25565")]
    server: SocketAddr,

    #[clap(subcommand)]
    command: ProbeCommand,
}

#[derive(Subcommand, Debug)]
enum ProbeCommand {
    /// Query the server list status
    Status,
    /// Log in and send one chat line
    Chat {
        /// Username to log in with
        #[clap(short, long)]
        name: String,
        /// Line to send once logged in
        #[clap(short, long, default_value = "hello")]
        message: String,
        /// Seconds to keep printing chat afterwards
        #[clap(short, long, default_value = "5")]
        listen: u64,
    },
}

fn handshake(server: SocketAddr, next_state: NextState) -> Handshake {
    Handshake {
        protocol_version: PROTOCOL_VERSION,
        server_address: server.ip().to_string(),
        server_port: server.port(),
        next_state,
    }
}

async fn status(server: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(server).await?;

    let frame = handshake(server, NextState::Status).to_frame()?;
    write_frame(&mut stream, frame.id, &frame.payload).await?;
    write_frame(&mut stream, ids::STATUS_REQUEST, &[]).await?;

    let response = StatusResponse::from_frame(&read_frame(&mut stream, MAX_FRAME_SIZE).await?)?;
    println!("{}", serde_json::to_string_pretty(&response.status)?);

    let sent_at = Instant::now();
    let ping = Ping { payload: 0x5EED }.to_frame()?;
    write_frame(&mut stream, ping.id, &ping.payload).await?;
    let pong = Ping::from_frame(&read_frame(&mut stream, MAX_FRAME_SIZE).await?)?;
    println!("ping {} answered in {:?}", pong.payload, sent_at.elapsed());

    Ok(())
}

async fn chat(
    server: SocketAddr,
    name: String,
    message: String,
    listen: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(server).await?;
    let mut framed = Framed::new(stream, FrameCodec::new());

    framed
        .send(handshake(server, NextState::Login).to_frame()?)
        .await?;
    framed.send(LoginStart { username: name }.to_frame()?).await?;

    let success = match framed.next().await {
        Some(frame) => LoginSuccess::from_frame(&frame?)?,
        None => return Err("server closed the connection during login (full?)".into()),
    };
    info!("Logged in as {} ({})", success.username, success.uuid);

    let compression = match framed.next().await {
        Some(frame) => SetCompression::from_frame(&frame?)?,
        None => return Err("server closed the connection during login".into()),
    };
    framed
        .codec_mut()
        .set_compression_threshold(Some(compression.threshold));

    framed.send(ChatRequest { message }.to_frame()?).await?;

    let deadline = tokio::time::Instant::now() + listen;
    loop {
        let frame = match timeout_at(deadline, framed.next()).await {
            Err(_) => break,
            Ok(None) => {
                info!("Server closed the connection");
                break;
            }
            Ok(Some(frame)) => frame?,
        };

        if frame.id == ids::CHAT_MESSAGE {
            println!("{}", ChatMessage::from_frame(&frame)?.text);
        } else {
            debug!("Received packet 0x{:02x} ({} bytes)", frame.id, frame.payload.len());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        ProbeCommand::Status => status(args.server).await,
        ProbeCommand::Chat {
            name,
            message,
            listen,
        } => chat(args.server, name, message, Duration::from_secs(listen)).await,
    }
}
