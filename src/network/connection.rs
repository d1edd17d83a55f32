//! One physical connection to an ensemble member.
//!
//! Frames are length-delimited (4-byte big-endian prefix). The codec sees
//! whole frames only.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::debug;
use tracing::trace;

use crate::proto::ConnectRequest;
use crate::proto::ConnectResponse;
use crate::proto::ReplyPacket;
use crate::proto::RequestPacket;
use crate::Codec;
use crate::ConnectionConfig;
use crate::NetworkError;
use crate::ProtocolError;
use crate::Result;

pub(crate) struct Connection {
    addr: String,
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    codec: Arc<dyn Codec>,
    max_frame_size: usize,
}

impl std::fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Connection").field("addr", &self.addr).finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a TCP stream and completes the session handshake, bounded by
    /// `timeout` as a whole.
    pub(crate) async fn establish(
        addr: String,
        codec: Arc<dyn Codec>,
        config: ConnectionConfig,
        request: ConnectRequest,
        timeout: Duration,
    ) -> Result<(Self, ConnectResponse)> {
        let attempt = async {
            let mut conn = Self::open(addr.clone(), codec, &config).await?;
            let response = conn.handshake(&request).await?;
            Ok::<_, crate::Error>((conn, response))
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::ConnectTimeout {
                addr,
                duration: timeout,
            }
            .into()),
        }
    }

    async fn open(
        addr: String,
        codec: Arc<dyn Codec>,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr.as_str()).await.map_err(NetworkError::Io)?;
        stream.set_nodelay(config.tcp_nodelay).map_err(NetworkError::Io)?;
        debug!(%addr, "tcp connected");

        let framing = LengthDelimitedCodec::builder()
            .max_frame_length(config.max_frame_size)
            .new_codec();

        Ok(Self {
            addr,
            framed: Framed::new(stream, framing),
            codec,
            max_frame_size: config.max_frame_size,
        })
    }

    async fn handshake(
        &mut self,
        request: &ConnectRequest,
    ) -> Result<ConnectResponse> {
        let bytes = self.codec.encode_connect(request)?;
        self.write_frame(bytes).await?;

        let frame = self.read_frame().await?;
        self.codec.decode_connect(&frame)
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) async fn send(
        &mut self,
        packet: &RequestPacket,
    ) -> Result<()> {
        let bytes = self.codec.encode(packet)?;
        trace!(addr = %self.addr, xid = packet.xid, op = packet.request.op_name(), "send");
        self.write_frame(bytes).await
    }

    /// Waits for the next reply frame. Cancel safe.
    pub(crate) async fn recv(&mut self) -> Result<ReplyPacket> {
        let frame = self.read_frame().await?;
        self.codec.decode(&frame)
    }

    async fn write_frame(
        &mut self,
        bytes: Bytes,
    ) -> Result<()> {
        if bytes.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                limit: self.max_frame_size,
            }
            .into());
        }
        self.framed.send(bytes).await.map_err(NetworkError::Io)?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<bytes::BytesMut> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(NetworkError::Io(e).into()),
            None => Err(NetworkError::Closed(self.addr.clone()).into()),
        }
    }
}
