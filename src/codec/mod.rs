//! Codec boundary.
//!
//! The engine never inspects bytes on the wire: it hands typed packets to a
//! [`Codec`] and receives typed replies back. Framing (length prefixes) is
//! handled by the connection, so a codec only sees complete frames.

#[cfg(test)]
mod codec_test;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::proto::ConnectRequest;
use crate::proto::ConnectResponse;
use crate::proto::ReplyPacket;
use crate::proto::RequestPacket;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait Codec: Send + Sync + 'static {
    fn encode_connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Bytes>;

    fn decode_connect(
        &self,
        frame: &[u8],
    ) -> Result<ConnectResponse>;

    fn encode(
        &self,
        packet: &RequestPacket,
    ) -> Result<Bytes>;

    fn decode(
        &self,
        frame: &[u8],
    ) -> Result<ReplyPacket>;
}

/// Default codec: serde types serialized with bincode.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode_connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(request)?))
    }

    fn decode_connect(
        &self,
        frame: &[u8],
    ) -> Result<ConnectResponse> {
        Ok(bincode::deserialize(frame)?)
    }

    fn encode(
        &self,
        packet: &RequestPacket,
    ) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(packet)?))
    }

    fn decode(
        &self,
        frame: &[u8],
    ) -> Result<ReplyPacket> {
        Ok(bincode::deserialize(frame)?)
    }
}
