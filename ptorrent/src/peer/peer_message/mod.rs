pub mod bitfield;
pub mod message;
pub mod request;

pub use bitfield::Bitfield;
pub use message::{Frame, Message, MessageError, MessageId};
pub use request::{FromRequestError, Request};
