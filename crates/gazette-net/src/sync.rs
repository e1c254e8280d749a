//! Pull-sync: a direct request/response stream protocol used to backfill
//! articles missed by gossip.
//!
//! Wire format is a length-prefixed JSON frame each way (4-byte big-endian
//! length, then the JSON body), request then response, then close. EOF
//! mid-stream is a normal cancel.

use async_trait::async_trait;
use futures::prelude::*;
use libp2p::request_response;
use serde::{Deserialize, Serialize};
use std::io;
use uuid::Uuid;

use gazette_shared::constants::{MAX_SYNC_ARTICLES, SYNC_PROTOCOL};
use gazette_shared::Article;

/// Hard cap on articles per response, enforced by the responder regardless
/// of what the request asks for.
pub const MAX_SYNC: usize = MAX_SYNC_ARTICLES;

const MAX_REQUEST_BYTES: usize = 1024 * 1024;
const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Unix seconds; return articles strictly newer than this.
    pub since: i64,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_ids: Option<Vec<Uuid>>,
}

impl SyncRequest {
    /// The limit a responder must honour: `min(limit, MAX_SYNC)`, with
    /// zero treated as "give me the maximum".
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            MAX_SYNC
        } else {
            (self.limit as usize).min(MAX_SYNC)
        }
    }

    pub fn excludes(&self, id: &Uuid) -> bool {
        self.exclude_ids
            .as_ref()
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub articles: Vec<Article>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct SyncProtocol;

impl AsRef<str> for SyncProtocol {
    fn as_ref(&self) -> &str {
        SYNC_PROTOCOL
    }
}

/// Length-prefixed JSON codec for the sync protocol.
#[derive(Debug, Clone, Default)]
pub struct SyncCodec;

async fn read_frame<T>(io: &mut T, max: usize) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame<T>(io: &mut T, data: &[u8]) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    let len = data.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(data).await?;
    io.flush().await
}

#[async_trait]
impl request_response::Codec for SyncCodec {
    type Protocol = SyncProtocol;
    type Request = SyncRequest;
    type Response = SyncResponse;

    async fn read_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let buf = read_frame(io, MAX_REQUEST_BYTES).await?;
        serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let buf = read_frame(io, MAX_RESPONSE_BYTES).await?;
        serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        request: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = serde_json::to_vec(&request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(io, &data).await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        response: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = serde_json::to_vec(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(io, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_capped_at_max_sync() {
        let req = SyncRequest {
            since: 0,
            limit: 10_000,
            exclude_ids: None,
        };
        assert_eq!(req.effective_limit(), MAX_SYNC);
    }

    #[test]
    fn zero_limit_means_max() {
        let req = SyncRequest {
            since: 0,
            limit: 0,
            exclude_ids: None,
        };
        assert_eq!(req.effective_limit(), MAX_SYNC);
    }

    #[test]
    fn small_limit_kept() {
        let req = SyncRequest {
            since: 0,
            limit: 5,
            exclude_ids: None,
        };
        assert_eq!(req.effective_limit(), 5);
    }

    #[test]
    fn excludes_listed_ids() {
        let id = Uuid::new_v4();
        let req = SyncRequest {
            since: 0,
            limit: 5,
            exclude_ids: Some(vec![id]),
        };
        assert!(req.excludes(&id));
        assert!(!req.excludes(&Uuid::new_v4()));
    }

    #[tokio::test]
    async fn frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        assert_eq!(&buf[..4], &5u32.to_be_bytes());

        let mut cursor = futures::io::Cursor::new(buf);
        let data = read_frame(&mut cursor, 1024).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &vec![0u8; 64]).await.unwrap();
        let mut cursor = futures::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor, 16).await.is_err());
    }

    #[test]
    fn request_json_shape() {
        let req = SyncRequest {
            since: 1700000000,
            limit: 50,
            exclude_ids: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"since":1700000000,"limit":50}"#);
    }
}
