use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use metafile::metainfo::Metainfo;
use tracing::{debug, info, warn};

use crate::config::cfg::Cfg;
use crate::peer::message_handler::{MessageHandler, MessageHandlerError};
use crate::peer::peer_message::{Frame, MessageError, MessageId, Request};
use crate::peer::peer_session::is_timeout;

use super::piece_store::PieceStore;

/// Posible `SeederServer` errors.
#[derive(Debug)]
pub enum SeederServerError {
    OpeningListenerError(io::Error),
    HandleConnectionError(io::Error),
    ErrorSettingStreamTimeout,
    MessageHandlerError(MessageHandlerError),
    FramingError(MessageError),
    MalformedRequest,
    PeerInactive,
}

/// Serves the pieces of one torrent to inbound peers.
///
/// A single acceptor loop spawns one task per connection; every connection
/// shares the read-only piece store, so a failing connection can never
/// corrupt what the others serve.
pub struct SeederServer {
    meta: Metainfo,
    store: Arc<PieceStore>,
    config: Cfg,
    client_peer_id: String,
    listener: TcpListener,
}

impl SeederServer {
    /// Binds the listening socket. Port 0 asks the OS for an ephemeral port;
    /// use `local_port` to learn which one was assigned.
    pub fn bind(
        meta: Metainfo,
        store: Arc<PieceStore>,
        config: Cfg,
        client_peer_id: String,
        port: u16,
    ) -> Result<Self, SeederServerError> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
            .map_err(SeederServerError::OpeningListenerError)?;
        Ok(Self {
            meta,
            store,
            config,
            client_peer_id,
            listener,
        })
    }

    /// Returns the port the server is listening on.
    pub fn local_port(&self) -> Result<u16, SeederServerError> {
        Ok(self
            .listener
            .local_addr()
            .map_err(SeederServerError::OpeningListenerError)?
            .port())
    }

    /// Accepts connections until the listener fails.
    pub fn serve(&self) -> Result<(), SeederServerError> {
        info!(
            "Seeding {} ({} pieces), listening for connections",
            self.meta.name(),
            self.store.total_pieces()
        );

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => match self.handle_connection(stream) {
                    Ok(_) => (),
                    Err(err) => warn!("Couldn't handle incoming connection: {:?}", err),
                },
                Err(err) => warn!("Couldn't accept incoming connection: {}", err),
            }
        }
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream) -> Result<(), SeederServerError> {
        let addr = stream
            .peer_addr()
            .map_err(SeederServerError::HandleConnectionError)?;

        let meta = self.meta.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let client_peer_id = self.client_peer_id.clone();

        let builder =
            thread::Builder::new().name(format!("Seeder: {} / Peer: {}", meta.name(), addr));
        builder
            .spawn(move || {
                match Self::serve_peer(stream, meta, store, config, client_peer_id) {
                    Ok(_) => debug!("Connection with {} closed", addr),
                    Err(err) => warn!("Connection with {} ended: {:?}", addr, err),
                }
            })
            .map_err(SeederServerError::HandleConnectionError)?;
        Ok(())
    }

    fn serve_peer(
        mut stream: TcpStream,
        meta: Metainfo,
        store: Arc<PieceStore>,
        config: Cfg,
        client_peer_id: String,
    ) -> Result<(), SeederServerError> {
        let io_timeout = Duration::from_secs(config.read_write_seconds_timeout);
        stream
            .set_read_timeout(Some(io_timeout))
            .map_err(|_| SeederServerError::ErrorSettingStreamTimeout)?;
        stream
            .set_write_timeout(Some(io_timeout))
            .map_err(|_| SeederServerError::ErrorSettingStreamTimeout)?;

        let handler = MessageHandler::new(meta, client_peer_id, config.max_frame_length());

        handler
            .send_handshake(&mut stream)
            .map_err(SeederServerError::MessageHandlerError)?;
        handler
            .receive_handshake(&mut stream)
            .map_err(SeederServerError::MessageHandlerError)?;

        // The seeder always serves: unchoke and advertise everything up front.
        handler
            .send_unchoke(&mut stream)
            .map_err(SeederServerError::MessageHandlerError)?;
        handler
            .send_bitfield(&store.bitfield(), &mut stream)
            .map_err(SeederServerError::MessageHandlerError)?;

        let inactivity = Duration::from_secs(config.inactivity_seconds_timeout);
        let mut last_activity = Instant::now();

        loop {
            match handler.read_frame(&mut stream) {
                Ok(Frame::KeepAlive) => {
                    last_activity = Instant::now();
                }
                Ok(Frame::Message(message)) => {
                    last_activity = Instant::now();
                    match message.id {
                        MessageId::Request => {
                            let request = Request::from_bytes(&message.payload)
                                .map_err(|_| SeederServerError::MalformedRequest)?;
                            Self::serve_request(&handler, &store, request, &mut stream)?;
                        }
                        MessageId::Interested => {
                            handler
                                .send_unchoke(&mut stream)
                                .map_err(SeederServerError::MessageHandlerError)?;
                        }
                        other => debug!("Ignoring message {:?}", other),
                    }
                }
                Err(MessageError::ReadError(err)) if is_timeout(&err) => {
                    if last_activity.elapsed() >= inactivity {
                        return Err(SeederServerError::PeerInactive);
                    }
                }
                Err(MessageError::ReadError(err))
                    if err.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    // Peer hung up; normal end of a serving session.
                    return Ok(());
                }
                Err(err) => return Err(SeederServerError::FramingError(err)),
            }
        }
    }

    fn serve_request(
        handler: &MessageHandler,
        store: &PieceStore,
        request: Request,
        stream: &mut TcpStream,
    ) -> Result<(), SeederServerError> {
        let piece = match store.piece(request.index) {
            Some(piece) => piece,
            None => {
                warn!("Request for piece {} out of range", request.index);
                return Ok(());
            }
        };

        let end = request.begin as u64 + request.length as u64;
        if end > piece.len() as u64 {
            warn!(
                "Request for piece {} beyond its size ({} + {} > {})",
                request.index,
                request.begin,
                request.length,
                piece.len()
            );
            return Ok(());
        }

        let block = &piece[request.begin as usize..end as usize];
        handler
            .send_piece(request.index, request.begin, block, stream)
            .map_err(SeederServerError::MessageHandlerError)?;
        debug!(
            "Sent piece {} (offset {}, {} bytes)",
            request.index,
            request.begin,
            block.len()
        );
        Ok(())
    }
}
