use std::io::{self, Read};

/// IDs of the messages defined in the protocol.
///
/// The keep-alive is the length-0 frame and carries no id byte on the wire;
/// it is modeled as its own variant so sessions can dispatch on it.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum MessageId {
    KeepAlive,
    Choke = 1,
    Unchoke = 2,
    Interested = 3,
    NotInterested = 4,
    Have = 5,
    Bitfield = 6,
    Request = 7,
    Piece = 8,
    Cancel = 9,
}

/// A message exchanged with a peer after the handshake.
///
/// It contains the message ID and the payload.
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

/// A single framed unit on the wire: either a keep-alive or a message.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    KeepAlive,
    Message(Message),
}

/// Posible message framing errors.
#[derive(Debug)]
pub enum MessageError {
    InvalidMessage,
    FrameTooLong { length: u32, max: u32 },
    ReadError(io::Error),
}

impl Message {
    /// Creates a new `Message` from a message ID and a payload.
    pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    /// Parses the body of a frame (id byte plus payload) into a `Message`.
    pub fn from_bytes(body: &[u8]) -> Result<Self, MessageError> {
        let id = match body.first() {
            Some(1) => MessageId::Choke,
            Some(2) => MessageId::Unchoke,
            Some(3) => MessageId::Interested,
            Some(4) => MessageId::NotInterested,
            Some(5) => MessageId::Have,
            Some(6) => MessageId::Bitfield,
            Some(7) => MessageId::Request,
            Some(8) => MessageId::Piece,
            Some(9) => MessageId::Cancel,
            _ => return Err(MessageError::InvalidMessage),
        };

        let payload = if body.len() > 1 {
            body[1..].to_vec()
        } else {
            vec![]
        };

        Ok(Self { id, payload })
    }

    /// Converts a `Message` to its framed byte representation.
    pub fn as_bytes(&self) -> Vec<u8> {
        let len = self.payload.len() + 1;
        let len_bytes: [u8; 4] = (len as u32).to_be_bytes();
        let mut bytes = vec![0; 4 + len];
        bytes[0..4].copy_from_slice(&len_bytes);
        bytes[4] = self.wire_id();
        bytes[5..].copy_from_slice(&self.payload);
        bytes
    }

    fn wire_id(&self) -> u8 {
        match self.id {
            MessageId::Choke => 1,
            MessageId::Unchoke => 2,
            MessageId::Interested => 3,
            MessageId::NotInterested => 4,
            MessageId::Have => 5,
            MessageId::Bitfield => 6,
            MessageId::Request => 7,
            MessageId::Piece => 8,
            MessageId::Cancel => 9,
            // Keep-alives have no id byte; they are encoded by `Frame`.
            MessageId::KeepAlive => 0,
        }
    }
}

impl Frame {
    /// Converts a `Frame` to its byte representation.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Frame::KeepAlive => vec![0, 0, 0, 0],
            Frame::Message(message) => message.as_bytes(),
        }
    }

    /// Reads one frame from `reader`.
    ///
    /// # Errors
    /// - `FrameTooLong` if the declared length exceeds `max_frame_length`.
    /// - `InvalidMessage` if the id byte is unknown.
    /// - `ReadError` on socket errors or timeouts.
    pub fn read_from<R: Read>(reader: &mut R, max_frame_length: u32) -> Result<Frame, MessageError> {
        let mut length_bytes = [0u8; 4];
        reader
            .read_exact(&mut length_bytes)
            .map_err(MessageError::ReadError)?;
        let length = u32::from_be_bytes(length_bytes);

        if length == 0 {
            return Ok(Frame::KeepAlive);
        }
        if length > max_frame_length {
            return Err(MessageError::FrameTooLong {
                length,
                max: max_frame_length,
            });
        }

        let mut body = vec![0u8; length as usize];
        reader
            .read_exact(&mut body)
            .map_err(MessageError::ReadError)?;

        Ok(Frame::Message(Message::from_bytes(&body)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const TEST_MAX_FRAME_LENGTH: u32 = 1024 * 1024;

    #[test]
    fn test_message_unchoke_from_bytes() {
        let body = 2u8.to_be_bytes();
        let msg = Message::from_bytes(&body).unwrap();

        assert_eq!(msg.id, MessageId::Unchoke);
        assert_eq!(msg.payload, Vec::<u8>::new());
    }

    #[test]
    fn test_message_interested_as_bytes() {
        let msg = Message::new(MessageId::Interested, vec![]);

        let bytes = msg.as_bytes();

        assert_eq!(bytes, vec![0, 0, 0, 1, 3]);
    }

    #[test]
    fn test_message_request_as_bytes() {
        let index = 0u32.to_be_bytes();
        let begin = 0u32.to_be_bytes();
        let length = 16384u32.to_be_bytes();
        let payload = [index, begin, length].concat();
        let msg = Message::new(MessageId::Request, payload.clone());

        let bytes = msg.as_bytes();

        let mut expected = vec![0, 0, 0, 13, 7];
        expected.extend(&payload);

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let body = [200u8, 1, 2, 3];
        assert!(matches!(
            Message::from_bytes(&body),
            Err(MessageError::InvalidMessage)
        ));
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert!(matches!(
            Message::from_bytes(&[]),
            Err(MessageError::InvalidMessage)
        ));
    }

    #[test]
    fn test_read_keep_alive() {
        let mut reader = Cursor::new(vec![0, 0, 0, 0]);

        let frame = Frame::read_from(&mut reader, TEST_MAX_FRAME_LENGTH).unwrap();

        assert_eq!(frame, Frame::KeepAlive);
        assert_eq!(frame.as_bytes(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_frame_round_trip() {
        let original = Message::new(MessageId::Have, 7u32.to_be_bytes().to_vec());
        let encoded = original.as_bytes();
        let mut reader = Cursor::new(encoded.clone());

        let decoded = Frame::read_from(&mut reader, TEST_MAX_FRAME_LENGTH).unwrap();

        assert_eq!(decoded.as_bytes(), encoded);
        match decoded {
            Frame::Message(msg) => {
                assert_eq!(msg.id, MessageId::Have);
                assert_eq!(msg.payload, 7u32.to_be_bytes().to_vec());
            }
            Frame::KeepAlive => panic!("expected a message frame"),
        }
    }

    #[test]
    fn test_frame_longer_than_ceiling_is_rejected() {
        let mut bytes = ((TEST_MAX_FRAME_LENGTH + 1).to_be_bytes()).to_vec();
        bytes.push(8);
        let mut reader = Cursor::new(bytes);

        assert!(matches!(
            Frame::read_from(&mut reader, TEST_MAX_FRAME_LENGTH),
            Err(MessageError::FrameTooLong { .. })
        ));
    }

    #[test]
    fn test_truncated_frame_is_a_read_error() {
        let mut reader = Cursor::new(vec![0, 0, 0, 5, 8, 1]);

        assert!(matches!(
            Frame::read_from(&mut reader, TEST_MAX_FRAME_LENGTH),
            Err(MessageError::ReadError(_))
        ));
    }
}
