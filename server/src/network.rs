//! TCP listener: accepts sockets and spawns one task per connection

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ServerError, ServerResult};
use crate::game::Game;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Delay before accepting again after an accept error
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

pub struct Server {
    listener: TcpListener,
    game: Arc<Game>,
}

impl Server {
    /// Binds the listener and starts the hub.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(&config.address)
            .await
            .map_err(ServerError::Bind)?;
        let game = Game::start(config);

        if let Ok(addr) = listener.local_addr() {
            info!(
                "Server listening on {} (max {} players)",
                addr,
                game.max_players()
            );
        }
        Ok(Self { listener, game })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        self.listener.local_addr().map_err(ServerError::Bind)
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    /// Accept loop; only returns if the future is dropped.
    pub async fn run(&self) -> ServerResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let game = Arc::clone(&self.game);
                    tokio::spawn(handle_connection(stream, addr, game));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, game: Arc<Game>) {
    debug!("Accepted connection from {}", addr);
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
    }

    match Connection::new(stream, addr.to_string(), game).run().await {
        Ok(()) => debug!("Connection from {} closed", addr),
        Err(ServerError::FrameRead(ref e)) if e.is_disconnect() => {
            debug!("{} disconnected: {}", addr, e)
        }
        Err(e) => warn!("Connection from {} ended: {}", addr, e),
    }
}
