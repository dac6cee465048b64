use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use metafile::metainfo::Metainfo;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use crate::config::cfg::Cfg;
use crate::download::engine::{EngineState, PieceBuffer};
use crate::download::piece_manager::{PieceManager, PieceManagerError};

use super::message_handler::{MessageHandler, MessageHandlerError};
use super::peer_message::{Bitfield, Frame, Message, MessageError, MessageId};
use super::remote_peer::RemotePeer;
use super::session_status::SessionStatus;

/// How long to sleep between pause polls.
const PAUSE_POLL_MILLIS: u64 = 200;
/// Send a keep-alive after this long without sending anything.
const KEEP_ALIVE_SECONDS: u64 = 60;
/// Consecutive undelivered requests tolerated before giving up on the peer.
const MAX_DELIVERY_STRIKES: u32 = 3;

/// Posible `PeerSession` errors.
#[derive(Debug)]
pub enum PeerSessionError {
    AddressResolutionError(String),
    ConnectionError(io::Error),
    ErrorSettingStreamTimeout,
    MessageHandlerError(MessageHandlerError),
    FramingError(MessageError),
    PieceManagerError(PieceManagerError),
    MalformedMessage(MessageId),
    NonCanonicalBitfield,
    PeerUnresponsive,
    PeerInactive,
    PeerClosedConnection,
    PoisonedBufferLock,
}

impl From<PieceManagerError> for PeerSessionError {
    fn from(err: PieceManagerError) -> Self {
        PeerSessionError::PieceManagerError(err)
    }
}

/// A `PeerSession` drives one downloader-side connection to a seeder.
///
/// It owns its socket and its copy of the per-connection state machine; the
/// shared piece manager is the only state it touches across threads.
pub struct PeerSession {
    peer: RemotePeer,
    meta: Metainfo,
    config: Cfg,
    piece_manager: Arc<PieceManager>,
    buffer: Arc<PieceBuffer>,
    state: Arc<EngineState>,
    message_handler: MessageHandler,
    status: SessionStatus,
}

impl PeerSession {
    pub fn new(
        peer: RemotePeer,
        meta: Metainfo,
        piece_manager: Arc<PieceManager>,
        buffer: Arc<PieceBuffer>,
        state: Arc<EngineState>,
        config: Cfg,
        client_peer_id: String,
    ) -> Self {
        let message_handler =
            MessageHandler::new(meta.clone(), client_peer_id, config.max_frame_length());
        let total_pieces = meta.total_pieces();

        PeerSession {
            peer,
            meta,
            config,
            piece_manager,
            buffer,
            state,
            message_handler,
            status: SessionStatus::new(Bitfield::with_length(total_pieces)),
        }
    }

    /// Connects, handshakes and drives the download loop until the torrent
    /// completes, the engine stops, or the connection fails.
    pub fn run(&mut self) -> Result<(), PeerSessionError> {
        let mut stream = self.connect()?;

        self.message_handler
            .send_handshake(&mut stream)
            .map_err(PeerSessionError::MessageHandlerError)?;
        self.message_handler
            .receive_handshake(&mut stream)
            .map_err(PeerSessionError::MessageHandlerError)?;

        info!("Handshake successful with {}", self.peer_key());

        self.state.register_socket(&stream);
        self.state.peer_connected();
        let result = self.drive(&mut stream);
        self.state.peer_disconnected();
        // Whatever this peer advertised or had in flight is no longer usable.
        let _ = self.piece_manager.forget_peer(&self.peer_key());
        result
    }

    /// The peer key used in the piece manager and in logs.
    pub fn peer_key(&self) -> String {
        self.peer.addr()
    }

    fn connect(&self) -> Result<TcpStream, PeerSessionError> {
        let addr = self
            .peer
            .addr()
            .to_socket_addrs()
            .map_err(|_| PeerSessionError::AddressResolutionError(self.peer.addr()))?
            .next()
            .ok_or_else(|| PeerSessionError::AddressResolutionError(self.peer.addr()))?;

        let stream = TcpStream::connect_timeout(
            &addr,
            Duration::from_secs(self.config.connect_seconds_timeout),
        )
        .map_err(PeerSessionError::ConnectionError)?;

        let io_timeout = Duration::from_secs(self.config.read_write_seconds_timeout);
        stream
            .set_read_timeout(Some(io_timeout))
            .map_err(|_| PeerSessionError::ErrorSettingStreamTimeout)?;
        stream
            .set_write_timeout(Some(io_timeout))
            .map_err(|_| PeerSessionError::ErrorSettingStreamTimeout)?;
        Ok(stream)
    }

    fn drive(&mut self, stream: &mut TcpStream) -> Result<(), PeerSessionError> {
        let inactivity = Duration::from_secs(self.config.inactivity_seconds_timeout);
        let mut inflight: Option<u32> = None;
        let mut strikes: u32 = 0;
        let mut last_sent = Instant::now();
        let mut last_received = Instant::now();

        loop {
            if !self.state.is_running() {
                if let Some(index) = inflight.take() {
                    let length = self.meta.piece_size(index) as u32;
                    let _ = self.message_handler.send_cancel(index, 0, length, stream);
                    self.piece_manager.mark_not_requested(index)?;
                }
                return Ok(());
            }
            if self.piece_manager.is_complete()? {
                return Ok(());
            }
            if self.state.is_paused() {
                // No new requests, but the socket stays open: keep the seeder
                // from expiring us and don't count its silence against it.
                if last_sent.elapsed() >= Duration::from_secs(KEEP_ALIVE_SECONDS) {
                    self.message_handler
                        .send_keep_alive(stream)
                        .map_err(PeerSessionError::MessageHandlerError)?;
                    last_sent = Instant::now();
                }
                last_received = Instant::now();
                thread::sleep(Duration::from_millis(PAUSE_POLL_MILLIS));
                continue;
            }

            if inflight.is_none() && !self.status.choked {
                if let Some(index) = self.next_request()? {
                    let length = self.meta.piece_size(index) as u32;
                    match self.message_handler.send_request(index, 0, length, stream) {
                        Ok(()) => {
                            debug!("Requested piece {} from {}", index, self.peer_key());
                            inflight = Some(index);
                            last_sent = Instant::now();
                        }
                        Err(err) => {
                            self.piece_manager.mark_not_requested(index)?;
                            return Err(PeerSessionError::MessageHandlerError(err));
                        }
                    }
                    continue;
                }
            }

            if last_sent.elapsed() >= Duration::from_secs(KEEP_ALIVE_SECONDS) {
                self.message_handler
                    .send_keep_alive(stream)
                    .map_err(PeerSessionError::MessageHandlerError)?;
                last_sent = Instant::now();
            }

            match self.message_handler.read_frame(stream) {
                Ok(Frame::KeepAlive) => {
                    last_received = Instant::now();
                }
                Ok(Frame::Message(message)) => {
                    last_received = Instant::now();
                    self.handle_message(message, &mut inflight, stream)?;
                }
                Err(MessageError::ReadError(err)) if is_timeout(&err) => {
                    if let Some(index) = inflight.take() {
                        self.piece_manager.mark_not_requested(index)?;
                        strikes += 1;
                        if strikes >= MAX_DELIVERY_STRIKES {
                            return Err(PeerSessionError::PeerUnresponsive);
                        }
                    }
                    if last_received.elapsed() >= inactivity {
                        return Err(PeerSessionError::PeerInactive);
                    }
                }
                Err(MessageError::ReadError(err))
                    if err.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    return Err(PeerSessionError::PeerClosedConnection);
                }
                Err(err) => return Err(PeerSessionError::FramingError(err)),
            }
        }
    }

    /// Picks the rarest missing piece this peer advertises and marks it
    /// requested. Loses the race gracefully if another session grabs it.
    fn next_request(&self) -> Result<Option<u32>, PeerSessionError> {
        while let Some(index) = self.piece_manager.next_to_request_for(&self.status.bitfield)? {
            if self.piece_manager.mark_requested(index, &self.peer_key())? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn handle_message(
        &mut self,
        message: Message,
        inflight: &mut Option<u32>,
        stream: &mut TcpStream,
    ) -> Result<(), PeerSessionError> {
        match message.id {
            MessageId::Choke => {
                self.status.choked = true;
                if let Some(index) = inflight.take() {
                    self.piece_manager.mark_not_requested(index)?;
                }
            }
            MessageId::Unchoke => {
                self.status.choked = false;
            }
            MessageId::Have => {
                if message.payload.len() != 4 {
                    return Err(PeerSessionError::MalformedMessage(MessageId::Have));
                }
                let mut index_bytes = [0u8; 4];
                index_bytes.copy_from_slice(&message.payload);
                let index = u32::from_be_bytes(index_bytes);
                if index < self.meta.total_pieces() {
                    self.status.bitfield.set_bit(index, true);
                    self.piece_manager
                        .record_peer_pieces(&self.peer_key(), &[index])?;
                    self.send_interested_if_needed(stream)?;
                }
            }
            MessageId::Bitfield => {
                let bitfield = Bitfield::new(message.payload);
                if !bitfield.is_canonical(self.meta.total_pieces()) {
                    return Err(PeerSessionError::NonCanonicalBitfield);
                }
                self.piece_manager.record_peer_pieces(
                    &self.peer_key(),
                    &bitfield.indices(self.meta.total_pieces()),
                )?;
                self.status.bitfield = bitfield;
                self.send_interested_if_needed(stream)?;
            }
            MessageId::Piece => {
                self.handle_piece(&message.payload, inflight)?;
            }
            other => {
                debug!("Ignoring message {:?} from {}", other, self.peer_key());
            }
        }
        Ok(())
    }

    fn handle_piece(
        &mut self,
        payload: &[u8],
        inflight: &mut Option<u32>,
    ) -> Result<(), PeerSessionError> {
        if payload.len() < 8 {
            return Err(PeerSessionError::MalformedMessage(MessageId::Piece));
        }

        let mut field = [0u8; 4];
        field.copy_from_slice(&payload[0..4]);
        let index = u32::from_be_bytes(field);
        field.copy_from_slice(&payload[4..8]);
        let begin = u32::from_be_bytes(field);
        let data = &payload[8..];

        if index >= self.meta.total_pieces()
            || begin != 0
            || data.len() as u64 != self.meta.piece_size(index)
        {
            warn!(
                "Discarding unexpected piece delivery ({}, offset {}, {} bytes) from {}",
                index,
                begin,
                data.len(),
                self.peer_key()
            );
            if *inflight == Some(index) {
                *inflight = None;
                self.piece_manager.mark_not_requested(index)?;
            }
            return Ok(());
        }

        let digest: [u8; 20] = Sha1::digest(data).into();
        let expected = self
            .meta
            .piece_hash(index)
            .map_err(|_| PeerSessionError::MalformedMessage(MessageId::Piece))?;

        if digest == expected {
            let first_delivery = {
                let mut buffer = self
                    .buffer
                    .lock()
                    .map_err(|_| PeerSessionError::PoisonedBufferLock)?;
                buffer.insert(index, data.to_vec()).is_none()
            };
            self.piece_manager.mark_completed(index)?;
            // A re-requested piece can arrive twice; count it once.
            if first_delivery {
                self.status.downloaded_bytes += data.len() as u64;
                self.state.add_downloaded_bytes(data.len() as u64);
            }
            debug!("Piece {} completed from {}", index, self.peer_key());
        } else {
            warn!(
                "Hash mismatch for piece {} from {}, demoting peer",
                index,
                self.peer_key()
            );
            self.piece_manager.mark_not_requested(index)?;
            self.piece_manager.demote_peer(&self.peer_key())?;
        }

        if *inflight == Some(index) {
            *inflight = None;
        }
        Ok(())
    }

    fn send_interested_if_needed(
        &mut self,
        stream: &mut TcpStream,
    ) -> Result<(), PeerSessionError> {
        if !self.status.interested && self.piece_manager.needs_any(&self.status.bitfield)? {
            self.message_handler
                .send_interested(stream)
                .map_err(PeerSessionError::MessageHandlerError)?;
            self.status.interested = true;
        }
        Ok(())
    }
}

/// Returns whether `err` is a read timeout rather than a broken connection.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
