//! Pre-play protocol handling.
//!
//! Every accepted socket starts here in [`ConnectionState::Handshake`]. The
//! handshake picks either the status exchange or login; a successful login
//! hands the framed socket over to a [`Session`] and this state machine is
//! done for good.

use crate::error::{ServerError, ServerResult};
use crate::game::Game;
use crate::session::Session;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{
    ids, Frame, FrameCodec, Handshake, LoginStart, LoginSuccess, NextState, Packet,
    SetCompression, StatusResponse, OFFLINE_UUID,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Play,
}

impl ConnectionState {
    /// States only ever move forward: Handshake to Status or Login, Login to Play.
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Handshake, Status) | (Handshake, Login) | (Login, Play)
        )
    }
}

impl From<NextState> for ConnectionState {
    fn from(next: NextState) -> Self {
        match next {
            NextState::Status => ConnectionState::Status,
            NextState::Login => ConnectionState::Login,
        }
    }
}

/// Outcome of handling one frame
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Close,
    Play(String),
}

pub struct Connection<T> {
    framed: Framed<T, FrameCodec>,
    state: ConnectionState,
    game: Arc<Game>,
    peer: String,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(io: T, peer: impl Into<String>, game: Arc<Game>) -> Self {
        Self {
            framed: Framed::new(io, FrameCodec::new()),
            state: ConnectionState::Handshake,
            game,
            peer: peer.into(),
        }
    }

    /// Drives the connection until it closes or becomes a session, then
    /// runs that session to completion.
    pub async fn run(mut self) -> ServerResult<()> {
        loop {
            let frame = match self.framed.next().await {
                Some(frame) => frame.map_err(ServerError::FrameRead)?,
                None => {
                    debug!("{} closed in state {:?}", self.peer, self.state);
                    return Ok(());
                }
            };

            match self.handle_frame(frame).await? {
                Step::Continue => {}
                Step::Close => return Ok(()),
                Step::Play(name) => {
                    let id = self.game.allocate_session_id();
                    info!("{} logged in as {} (session {})", self.peer, name, id);
                    return Session::new(id, name, self.framed, self.game).run().await;
                }
            }
        }
    }

    fn advance(&mut self, next: ConnectionState) -> ServerResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(ServerError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("{} moved from {:?} to {:?}", self.peer, self.state, next);
        self.state = next;
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> ServerResult<()> {
        self.framed
            .send(frame)
            .await
            .map_err(ServerError::WriteFailure)
    }

    async fn handle_frame(&mut self, frame: Frame) -> ServerResult<Step> {
        match (self.state, frame.id) {
            (ConnectionState::Handshake, ids::HANDSHAKE) => {
                let handshake = Handshake::from_frame(&frame)?;
                debug!(
                    "{} handshake: protocol {}, {}:{}",
                    self.peer,
                    handshake.protocol_version,
                    handshake.server_address,
                    handshake.server_port
                );
                self.advance(handshake.next_state.into())?;
                Ok(Step::Continue)
            }
            (ConnectionState::Status, ids::STATUS_REQUEST) => {
                let status = self.game.status().await?;
                self.send(StatusResponse { status }.to_frame()?).await?;
                Ok(Step::Continue)
            }
            (ConnectionState::Status, ids::PING) => {
                // echoed byte for byte, whatever the client put in it
                self.send(Frame::new(ids::PONG, frame.payload)).await?;
                Ok(Step::Continue)
            }
            (ConnectionState::Login, ids::LOGIN_START) => {
                let login = LoginStart::from_frame(&frame)?;
                self.login(login.username).await
            }
            (state, id) => {
                debug!("{} sent unknown packet 0x{:02x} in {:?}", self.peer, id, state);
                Ok(Step::Continue)
            }
        }
    }

    async fn login(&mut self, username: String) -> ServerResult<Step> {
        let online = self.game.hub().online().await?;
        let max = self.game.max_players();
        if online + 1 > max {
            info!(
                "{}",
                ServerError::CapacityExceeded {
                    name: username,
                    max
                }
            );
            return Ok(Step::Close);
        }

        self.send(
            LoginSuccess {
                uuid: OFFLINE_UUID.to_string(),
                username: username.clone(),
            }
            .to_frame()?,
        )
        .await?;

        let threshold = self.game.config().compression_threshold;
        self.send(SetCompression { threshold }.to_frame()?).await?;
        self.framed
            .codec_mut()
            .set_compression_threshold(Some(threshold));

        self.advance(ConnectionState::Play)?;
        Ok(Step::Play(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::registry::SessionHandle;
    use bytes::BytesMut;
    use shared::{JoinGame, Ping, ProtocolError, StatusRequest};
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_util::codec::Encoder;

    type Client = Framed<DuplexStream, FrameCodec>;

    fn connect(game: &Arc<Game>) -> (Client, tokio::task::JoinHandle<ServerResult<()>>) {
        let (client, server) = tokio::io::duplex(4096);
        let connection = Connection::new(server, "test", Arc::clone(game));
        (
            Framed::new(client, FrameCodec::new()),
            tokio::spawn(connection.run()),
        )
    }

    fn handshake(next_state: NextState) -> Frame {
        Handshake {
            protocol_version: 47,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state,
        }
        .to_frame()
        .unwrap()
    }

    async fn next_frame(client: &mut Client) -> Frame {
        timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("bad frame")
    }

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;
        assert!(Handshake.can_advance_to(Status));
        assert!(Handshake.can_advance_to(Login));
        assert!(Login.can_advance_to(Play));

        assert!(!Handshake.can_advance_to(Play));
        assert!(!Status.can_advance_to(Login));
        assert!(!Status.can_advance_to(Handshake));
        assert!(!Play.can_advance_to(Login));
        assert!(!Login.can_advance_to(Login));
    }

    #[tokio::test]
    async fn test_status_exchange_on_mock_socket() {
        let game = Game::start(ServerConfig::new("127.0.0.1:0", 2));
        let mut codec = FrameCodec::new();

        let mut inbound = BytesMut::new();
        codec.encode(handshake(NextState::Status), &mut inbound).unwrap();
        codec
            .encode(StatusRequest.to_frame().unwrap(), &mut inbound)
            .unwrap();

        let status = game.status().await.unwrap();
        let mut outbound = BytesMut::new();
        codec
            .encode(StatusResponse { status }.to_frame().unwrap(), &mut outbound)
            .unwrap();

        let mock = tokio_test::io::Builder::new()
            .read(&inbound)
            .write(&outbound)
            .build();
        Connection::new(mock, "mock", game).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_and_ping() {
        let game = Game::start(ServerConfig::new("127.0.0.1:0", 7));
        let (mut client, _task) = connect(&game);

        client.send(handshake(NextState::Status)).await.unwrap();
        client.send(StatusRequest.to_frame().unwrap()).await.unwrap();

        let status = StatusResponse::from_frame(&next_frame(&mut client).await)
            .unwrap()
            .status;
        assert_eq!(status.players.max, 7);
        assert_eq!(status.players.online, 0);
        assert_eq!(status.version.protocol, 47);

        client
            .send(Ping { payload: 0x0102_0304_0506_0708 }.to_frame().unwrap())
            .await
            .unwrap();
        let pong = next_frame(&mut client).await;
        assert_eq!(pong.id, ids::PONG);
        assert_eq!(&pong.payload[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_ignored() {
        let game = Game::start(ServerConfig::new("127.0.0.1:0", 2));
        let (mut client, _task) = connect(&game);

        client.send(Frame::new(0x2A, vec![1u8, 2])).await.unwrap();
        client.send(handshake(NextState::Status)).await.unwrap();
        client.send(Frame::empty(0x7F)).await.unwrap();
        client.send(StatusRequest.to_frame().unwrap()).await.unwrap();

        let frame = next_frame(&mut client).await;
        assert_eq!(frame.id, ids::STATUS_RESPONSE);
    }

    #[tokio::test]
    async fn test_invalid_next_state_closes() {
        let game = Game::start(ServerConfig::default());
        let (mut client, task) = connect(&game);

        let mut frame = handshake(NextState::Login);
        let mut payload = frame.payload.to_vec();
        *payload.last_mut().unwrap() = 3;
        frame.payload = payload.into();
        client.send(frame).await.unwrap();

        let result = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::InvalidNextState(3)))
        ));
    }

    #[tokio::test]
    async fn test_login_switches_framing() {
        let game = Game::start(ServerConfig::new("127.0.0.1:0", 2));
        let (mut client, _task) = connect(&game);

        client.send(handshake(NextState::Login)).await.unwrap();
        client
            .send(LoginStart { username: "steve".to_string() }.to_frame().unwrap())
            .await
            .unwrap();

        let success = LoginSuccess::from_frame(&next_frame(&mut client).await).unwrap();
        assert_eq!(success.uuid, OFFLINE_UUID);
        assert_eq!(success.username, "steve");

        let compression = SetCompression::from_frame(&next_frame(&mut client).await).unwrap();
        assert_eq!(compression.threshold, 65_536);
        client
            .codec_mut()
            .set_compression_threshold(Some(compression.threshold));

        let join = JoinGame::from_frame(&next_frame(&mut client).await).unwrap();
        assert_eq!(join.max_players, 2);
        assert_eq!(game.hub().online().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_rejected_when_full() {
        let game = Game::start(ServerConfig::new("127.0.0.1:0", 1));
        let (tx, _rx) = mpsc::channel(8);
        game.hub().join(SessionHandle::new(99, "alex", tx)).await.unwrap();

        let (mut client, task) = connect(&game);
        client.send(handshake(NextState::Login)).await.unwrap();
        client
            .send(LoginStart { username: "steve".to_string() }.to_frame().unwrap())
            .await
            .unwrap();

        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(client.next().await.is_none());
        assert_eq!(game.hub().names().await.unwrap(), vec!["alex"]);
    }

    #[tokio::test]
    async fn test_stray_packet_before_handshake() {
        let game = Game::start(ServerConfig::new("127.0.0.1:0", 2));
        let (mut client, _task) = connect(&game);

        // only 0x00 means anything before the handshake
        client.send(Frame::new(0x01, vec![0u8; 4])).await.unwrap();
        client.send(handshake(NextState::Login)).await.unwrap();
        client
            .send(LoginStart { username: "steve".to_string() }.to_frame().unwrap())
            .await
            .unwrap();

        assert_eq!(next_frame(&mut client).await.id, ids::LOGIN_SUCCESS);
    }
}
