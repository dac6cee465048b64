use std::io::{Read, Write};

use metafile::metainfo::{Metainfo, MetainfoError};

use super::handshake::{FromHandshakeError, Handshake, HANDSHAKE_LENGTH};
use super::peer_message::{Bitfield, Frame, Message, MessageError, MessageId, Request};

/// Posible `MessageHandler` errors.
#[derive(Debug)]
pub enum MessageHandlerError {
    HandshakeError(FromHandshakeError),
    InfoHashMismatch,
    ErrorSendingHandshake(std::io::Error),
    ErrorReadingHandshake(std::io::Error),
    ErrorSendingMessage(MessageId),
    MetainfoError(MetainfoError),
}

/// Message handler for a peer connection.
///
/// It handles the handshake exchange as well as the sending and framing of
/// messages, for both sides of the protocol.
pub struct MessageHandler {
    meta: Metainfo,
    client_peer_id: String,
    max_frame_length: u32,
}

impl MessageHandler {
    pub fn new(meta: Metainfo, client_peer_id: String, max_frame_length: u32) -> MessageHandler {
        Self {
            meta,
            client_peer_id,
            max_frame_length,
        }
    }

    // ------------------------------------------------------------------------------------------------
    // Handshake

    /// Sends our handshake to the peer.
    pub fn send_handshake(&self, stream: &mut impl Write) -> Result<(), MessageHandlerError> {
        let info_hash = self
            .meta
            .info_hash_bytes()
            .map_err(MessageHandlerError::MetainfoError)?;

        let handshake = Handshake::new(info_hash, self.peer_id_bytes());
        stream
            .write_all(&handshake.as_bytes())
            .map_err(MessageHandlerError::ErrorSendingHandshake)
    }

    /// Receives and validates the peer handshake.
    ///
    /// # Errors
    /// - `ErrorReadingHandshake` if the peer closed or stalled before sending a full handshake.
    /// - `HandshakeError` if the bytes are not a handshake for our protocol.
    /// - `InfoHashMismatch` if the peer is talking about another torrent.
    pub fn receive_handshake(
        &self,
        stream: &mut impl Read,
    ) -> Result<Handshake, MessageHandlerError> {
        let mut bytes = [0u8; HANDSHAKE_LENGTH];
        stream
            .read_exact(&mut bytes)
            .map_err(MessageHandlerError::ErrorReadingHandshake)?;

        let handshake =
            Handshake::from_bytes(&bytes).map_err(MessageHandlerError::HandshakeError)?;

        let our_info_hash = self
            .meta
            .info_hash_bytes()
            .map_err(MessageHandlerError::MetainfoError)?;
        if handshake.info_hash != our_info_hash {
            return Err(MessageHandlerError::InfoHashMismatch);
        }

        Ok(handshake)
    }

    // ------------------------------------------------------------------------------------------------
    // Receiving messages

    /// Reads one frame from the peer, enforcing the configured frame ceiling.
    pub fn read_frame(&self, stream: &mut impl Read) -> Result<Frame, MessageError> {
        Frame::read_from(stream, self.max_frame_length)
    }

    // ------------------------------------------------------------------------------------------------
    // Sending messages

    /// Sends an interested message to the peer.
    pub fn send_interested(&self, stream: &mut impl Write) -> Result<(), MessageHandlerError> {
        self.send(stream, Message::new(MessageId::Interested, vec![]))
    }

    /// Sends an unchoke message to the peer.
    pub fn send_unchoke(&self, stream: &mut impl Write) -> Result<(), MessageHandlerError> {
        self.send(stream, Message::new(MessageId::Unchoke, vec![]))
    }

    /// Sends a keep-alive frame to the peer.
    pub fn send_keep_alive(&self, stream: &mut impl Write) -> Result<(), MessageHandlerError> {
        stream
            .write_all(&Frame::KeepAlive.as_bytes())
            .map_err(|_| MessageHandlerError::ErrorSendingMessage(MessageId::KeepAlive))
    }

    /// Sends a bitfield message to the peer.
    pub fn send_bitfield(
        &self,
        bitfield: &Bitfield,
        stream: &mut impl Write,
    ) -> Result<(), MessageHandlerError> {
        self.send(stream, Message::new(MessageId::Bitfield, bitfield.get_vec()))
    }

    /// Sends a request message to the peer.
    pub fn send_request(
        &self,
        index: u32,
        begin: u32,
        length: u32,
        stream: &mut impl Write,
    ) -> Result<(), MessageHandlerError> {
        let payload = Request::new(index, begin, length).as_bytes();
        self.send(stream, Message::new(MessageId::Request, payload))
    }

    /// Sends a cancel message to the peer.
    pub fn send_cancel(
        &self,
        index: u32,
        begin: u32,
        length: u32,
        stream: &mut impl Write,
    ) -> Result<(), MessageHandlerError> {
        let payload = Request::new(index, begin, length).as_bytes();
        self.send(stream, Message::new(MessageId::Cancel, payload))
    }

    /// Sends a piece message to the peer.
    pub fn send_piece(
        &self,
        index: u32,
        begin: u32,
        block: &[u8],
        stream: &mut impl Write,
    ) -> Result<(), MessageHandlerError> {
        let mut payload = Vec::with_capacity(8 + block.len());
        payload.extend(index.to_be_bytes());
        payload.extend(begin.to_be_bytes());
        payload.extend(block);

        self.send(stream, Message::new(MessageId::Piece, payload))
    }

    /// Generic sending function.
    fn send(&self, stream: &mut impl Write, message: Message) -> Result<(), MessageHandlerError> {
        stream
            .write_all(&message.as_bytes())
            .map_err(|_| MessageHandlerError::ErrorSendingMessage(message.id))
    }

    fn peer_id_bytes(&self) -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        let bytes = self.client_peer_id.as_bytes();
        let len = bytes.len().min(20);
        peer_id[..len].copy_from_slice(&bytes[..len]);
        peer_id
    }
}
