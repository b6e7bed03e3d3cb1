//! Frame encoding for messages that leave the process.

use crate::{
    error::{Error, Result},
    transport::proto::Message,
};
use bytes::Bytes;

pub fn encode(message: &Message) -> Result<Bytes> {
    bincode::serialize(message)
        .map(Bytes::from)
        .map_err(|e| Error::new_codec(e.into()))
}

pub fn decode(frame: &[u8]) -> Result<Message> {
    bincode::deserialize(frame).map_err(|e| Error::new_codec(e.into()))
}
