// Path: crates/networking/src/libp2p/codec.rs
//! A length-prefixed `request_response::Codec` carrying this core's own
//! canonical encoding, mirroring the teacher's `SyncCodec` but over
//! [`crate::sync::SyncRequest`]/[`crate::sync::SyncResponse`].

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::Codec;

use pop_types::codec::{from_bytes_canonical, to_bytes_canonical};

use crate::sync::{SyncRequest, SyncResponse};

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

async fn read_length_prefixed<T: AsyncRead + Unpin + Send>(io: &mut T, max_len: usize) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 8];
    io.read_exact(&mut len_buf).await?;
    let len = u64::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "message too large"));
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_length_prefixed<T: AsyncWrite + Unpin + Send>(io: &mut T, data: Vec<u8>) -> std::io::Result<()> {
    io.write_all(&(data.len() as u64).to_be_bytes()).await?;
    io.write_all(&data).await
}

/// Codec for the `/pop/sync/1` request-response protocol.
#[derive(Debug, Clone, Default)]
pub struct SyncCodec;

#[async_trait]
impl Codec for SyncCodec {
    type Protocol = &'static str;
    type Request = SyncRequest;
    type Response = SyncResponse;

    async fn read_request<T: AsyncRead + Unpin + Send>(&mut self, _: &Self::Protocol, io: &mut T) -> std::io::Result<Self::Request> {
        let bytes = read_length_prefixed(io, MAX_REQUEST_BYTES).await?;
        from_bytes_canonical(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    async fn read_response<T: AsyncRead + Unpin + Send>(&mut self, _: &Self::Protocol, io: &mut T) -> std::io::Result<Self::Response> {
        let bytes = read_length_prefixed(io, MAX_RESPONSE_BYTES).await?;
        from_bytes_canonical(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    async fn write_request<T: AsyncWrite + Unpin + Send>(&mut self, _: &Self::Protocol, io: &mut T, req: Self::Request) -> std::io::Result<()> {
        write_length_prefixed(io, to_bytes_canonical(&req)).await
    }

    async fn write_response<T: AsyncWrite + Unpin + Send>(&mut self, _: &Self::Protocol, io: &mut T, res: Self::Response) -> std::io::Result<()> {
        write_length_prefixed(io, to_bytes_canonical(&res)).await
    }
}
