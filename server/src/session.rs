//! A logged-in player.
//!
//! A session runs three loops over one connection:
//! - the send loop, the only writer, draining the outbound queue
//! - the recv loop, reading chat and slash commands
//! - the tick loop, queueing keep-alives and time updates
//!
//! All three share a cancellation token. Whichever loop ends first cancels
//! it, the others stop at their next await point, and the supervisor in
//! [`Session::run`] unregisters the player exactly once.

use crate::commands::Command;
use crate::error::{ServerError, ServerResult};
use crate::game::Game;
use crate::registry::SessionHandle;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use shared::{
    ids, ChatMessage, ChatRequest, Frame, FrameCodec, JoinGame, KeepAlive, Packet,
    PositionAndLook, ProtocolError, SpawnPosition, TimeUpdate, MAX_CHAT_LEN, TICKS_PER_SECOND,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

pub struct Session<T> {
    id: u32,
    name: String,
    framed: Framed<T, FrameCodec>,
    game: Arc<Game>,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(id: u32, name: impl Into<String>, framed: Framed<T, FrameCodec>, game: Arc<Game>) -> Self {
        Self {
            id,
            name: name.into(),
            framed,
            game,
        }
    }

    /// Runs the session until the connection ends.
    ///
    /// Fails only if the hub refuses the player; every later failure is
    /// logged and ends in the normal teardown.
    pub async fn run(self) -> ServerResult<()> {
        let Session {
            id,
            name,
            framed,
            game,
        } = self;
        let config = game.config().clone();
        let hub = game.hub().clone();

        let (tx, rx) = mpsc::channel(config.session_queue_size);
        let (sink, stream) = framed.split();
        let token = CancellationToken::new();

        let send = spawn_loop("send", &name, token.clone(), send_loop(sink, rx, token.clone()));

        // Startup frames go in before the hub or the tick loop can add anything.
        for frame in startup_frames(id, config.max_players)? {
            if tx.send(frame).await.is_err() {
                break;
            }
        }

        if let Err(e) = hub.join(SessionHandle::new(id, name.clone(), tx.clone())).await {
            token.cancel();
            let _ = send.await;
            return Err(e);
        }
        info!("{} entered play (session {})", name, id);

        let recv = spawn_loop(
            "recv",
            &name,
            token.clone(),
            recv_loop(stream, tx.clone(), Arc::clone(&game), name.clone(), token.clone()),
        );
        let tick = spawn_loop(
            "tick",
            &name,
            token.clone(),
            tick_loop(
                tx,
                config.keep_alive_interval,
                config.time_update_interval,
                token.clone(),
            ),
        );

        let (send, recv, tick) = tokio::join!(send, recv, tick);
        for (task, result) in [("send", send), ("recv", recv), ("tick", tick)] {
            if let Err(e) = result {
                error!("{} loop for {} panicked: {}", task, name, e);
            }
        }

        info!("{} disconnected (session {})", name, id);
        hub.leave(name, id).await
    }
}

/// Frames every player gets before anything else.
pub fn startup_frames(id: u32, max_players: usize) -> Result<Vec<Frame>, ProtocolError> {
    Ok(vec![
        JoinGame::new(id as i32, max_players).to_frame()?,
        SpawnPosition { x: 0, y: 10, z: 0 }.to_frame()?,
        PositionAndLook::at(0.0, 128.0, 0.0).to_frame()?,
    ])
}

fn spawn_loop<F>(task: &'static str, name: &str, token: CancellationToken, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ServerResult<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => debug!("{} loop for {} finished", task, name),
            Err(ServerError::FrameRead(ref e)) | Err(ServerError::WriteFailure(ref e))
                if e.is_disconnect() =>
            {
                debug!("{} loop for {} lost the connection: {}", task, name, e)
            }
            Err(e) => warn!("{} loop for {} failed: {}", task, name, e),
        }
        token.cancel();
    })
}

async fn send_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Frame>,
    token: CancellationToken,
) -> ServerResult<()>
where
    S: Sink<Frame, Error = ProtocolError> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = rx.recv() => frame,
        };

        let Some(frame) = frame else {
            break;
        };

        // A peer that stops reading must not keep the session alive.
        tokio::select! {
            _ = token.cancelled() => break,
            result = sink.send(frame) => result.map_err(ServerError::WriteFailure)?,
        }
    }
    Ok(())
}

async fn recv_loop<S>(
    mut stream: S,
    tx: mpsc::Sender<Frame>,
    game: Arc<Game>,
    name: String,
    token: CancellationToken,
) -> ServerResult<()>
where
    S: Stream<Item = Result<Frame, ProtocolError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = stream.next() => frame,
        };

        let frame = match frame {
            Some(frame) => frame.map_err(ServerError::FrameRead)?,
            None => break,
        };

        if frame.id != ids::CHAT_REQUEST {
            debug!("Ignoring packet 0x{:02x} from {}", frame.id, name);
            continue;
        }

        let request = ChatRequest::from_frame(&frame)?;
        let message: String = request.message.chars().take(MAX_CHAT_LEN).collect();

        match Command::parse(&message) {
            Some(command) => {
                debug!("{} issued {:?}", name, command);
                let reply = command.execute(game.hub()).await?;
                if tx.send(ChatMessage::new(reply).to_frame()?).await.is_err() {
                    break;
                }
            }
            None => {
                info!("<{}> {}", name, message);
                game.hub().chat(format!("<{}> {}", name, message)).await?;
            }
        }
    }
    Ok(())
}

async fn tick_loop(
    tx: mpsc::Sender<Frame>,
    keep_alive_interval: Duration,
    time_update_interval: Duration,
    token: CancellationToken,
) -> ServerResult<()> {
    let start = Instant::now();
    let mut keep_alive = interval_at(start + keep_alive_interval, keep_alive_interval);
    let mut time_update = interval_at(start + time_update_interval, time_update_interval);
    let mut ticks: i64 = 0;

    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            _ = keep_alive.tick() => KeepAlive { id: 0 }.to_frame()?,
            _ = time_update.tick() => {
                ticks += TICKS_PER_SECOND;
                TimeUpdate::from_ticks(ticks).to_frame()?
            }
        };

        match tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => debug!("Outbound queue full, skipping tick"),
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    fn test_config(max_players: usize) -> ServerConfig {
        ServerConfig {
            keep_alive_interval: Duration::from_millis(200),
            time_update_interval: Duration::from_millis(50),
            ..ServerConfig::new("127.0.0.1:0", max_players)
        }
    }

    fn pair() -> (Framed<DuplexStream, FrameCodec>, Framed<DuplexStream, FrameCodec>) {
        let (client, server) = tokio::io::duplex(4096);
        let mut client_codec = FrameCodec::new();
        client_codec.set_compression_threshold(Some(256));
        let mut server_codec = FrameCodec::new();
        server_codec.set_compression_threshold(Some(256));
        (
            Framed::new(client, client_codec),
            Framed::new(server, server_codec),
        )
    }

    async fn next_frame(client: &mut Framed<DuplexStream, FrameCodec>) -> Frame {
        timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("bad frame")
    }

    async fn next_chat(client: &mut Framed<DuplexStream, FrameCodec>) -> String {
        loop {
            let frame = next_frame(client).await;
            if frame.id == ids::CHAT_MESSAGE {
                return ChatMessage::from_frame(&frame).unwrap().text;
            }
        }
    }

    #[test]
    fn test_startup_frames() {
        let frames = startup_frames(3, 20).unwrap();
        let frame_ids: Vec<u32> = frames.iter().map(|f| f.id).collect();
        assert_eq!(
            frame_ids,
            vec![ids::JOIN_GAME, ids::SPAWN_POSITION, ids::POSITION_AND_LOOK]
        );
        assert_eq!(
            SpawnPosition::from_frame(&frames[1]).unwrap(),
            SpawnPosition { x: 0, y: 10, z: 0 }
        );
    }

    #[tokio::test]
    async fn test_startup_frames_come_first() {
        let game = Game::start(test_config(4));
        let (mut client, server) = pair();
        tokio::spawn(Session::new(1, "steve", server, Arc::clone(&game)).run());

        assert_eq!(next_frame(&mut client).await.id, ids::JOIN_GAME);
        assert_eq!(next_frame(&mut client).await.id, ids::SPAWN_POSITION);
        assert_eq!(next_frame(&mut client).await.id, ids::POSITION_AND_LOOK);
        assert_eq!(next_chat(&mut client).await, "steve joined the game");

        let mut saw_time = false;
        let mut saw_keep_alive = false;
        while !(saw_time && saw_keep_alive) {
            let frame = next_frame(&mut client).await;
            match frame.id {
                ids::TIME_UPDATE => {
                    let update = TimeUpdate::from_frame(&frame).unwrap();
                    assert_eq!(update.world_age % TICKS_PER_SECOND, 0);
                    saw_time = true;
                }
                ids::KEEP_ALIVE => {
                    assert_eq!(KeepAlive::from_frame(&frame).unwrap().id, 0);
                    saw_keep_alive = true;
                }
                other => panic!("unexpected frame 0x{:02x}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_chat_is_broadcast_and_truncated() {
        let game = Game::start(test_config(4));
        let (mut client, server) = pair();
        tokio::spawn(Session::new(1, "steve", server, Arc::clone(&game)).run());
        assert_eq!(next_chat(&mut client).await, "steve joined the game");

        let long = "x".repeat(150);
        client
            .send(ChatRequest { message: long }.to_frame().unwrap())
            .await
            .unwrap();

        let text = next_chat(&mut client).await;
        assert_eq!(text, format!("<steve> {}", "x".repeat(MAX_CHAT_LEN)));
    }

    #[tokio::test]
    async fn test_command_reply_stays_private() {
        let game = Game::start(test_config(4));
        let (mut steve, steve_server) = pair();
        let (mut alex, alex_server) = pair();
        tokio::spawn(Session::new(1, "steve", steve_server, Arc::clone(&game)).run());
        assert_eq!(next_chat(&mut steve).await, "steve joined the game");
        tokio::spawn(Session::new(2, "alex", alex_server, Arc::clone(&game)).run());
        assert_eq!(next_chat(&mut alex).await, "alex joined the game");
        assert_eq!(next_chat(&mut steve).await, "alex joined the game");

        steve
            .send(ChatRequest { message: "/list".to_string() }.to_frame().unwrap())
            .await
            .unwrap();
        assert_eq!(next_chat(&mut steve).await, "Online (2): alex, steve");

        alex.send(ChatRequest { message: "hi".to_string() }.to_frame().unwrap())
            .await
            .unwrap();
        // alex's first chat after joining is its own line, not the /list reply
        assert_eq!(next_chat(&mut alex).await, "<alex> hi");
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let game = Game::start(test_config(4));
        let (mut client, server) = pair();
        let session = tokio::spawn(Session::new(7, "steve", server, Arc::clone(&game)).run());
        assert_eq!(next_chat(&mut client).await, "steve joined the game");
        assert_eq!(game.hub().online().await.unwrap(), 1);

        drop(client);
        timeout(Duration::from_secs(2), session)
            .await
            .expect("session did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(game.hub().online().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_half_closed_peer_that_never_reads_is_unregistered() {
        let game = Game::start(test_config(4));
        // small enough that tick frames fill it while nobody reads
        let (mut client, server) = tokio::io::duplex(64);
        let mut codec = FrameCodec::new();
        codec.set_compression_threshold(Some(256));
        let session = tokio::spawn(
            Session::new(3, "steve", Framed::new(server, codec), Arc::clone(&game)).run(),
        );

        timeout(Duration::from_secs(2), async {
            while game.hub().online().await.unwrap() != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never joined");

        // let the send loop block on the full pipe
        tokio::time::sleep(Duration::from_millis(300)).await;
        client.shutdown().await.unwrap();

        timeout(Duration::from_secs(2), session)
            .await
            .expect("session stayed alive after the peer hung up")
            .unwrap()
            .unwrap();
        assert_eq!(game.hub().online().await.unwrap(), 0);
        drop(client);
    }

    #[tokio::test]
    async fn test_rejected_when_full() {
        let game = Game::start(test_config(1));
        let (mut first, first_server) = pair();
        let (_second, second_server) = pair();
        tokio::spawn(Session::new(1, "steve", first_server, Arc::clone(&game)).run());
        assert_eq!(next_chat(&mut first).await, "steve joined the game");

        let result = Session::new(2, "alex", second_server, Arc::clone(&game))
            .run()
            .await;
        assert!(matches!(result, Err(ServerError::CapacityExceeded { .. })));
        assert_eq!(game.hub().online().await.unwrap(), 1);
    }
}
