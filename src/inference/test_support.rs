//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use super::transport::{
    HttpRequest, StreamingResponse, Transport, TransportError, TransportResponse,
};

/// One scripted reply.
pub enum Reply {
    /// Status plus the full body.
    Body(u16, Bytes),
    /// Status plus a body delivered in the given pieces.
    Chunks(u16, Vec<Result<Bytes, TransportError>>),
    /// Network-level failure.
    Fail(TransportError),
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Reply::Body(status, Bytes::from(body.to_string()))
    }

    pub fn text(status: u16, body: &str) -> Self {
        Reply::Body(status, Bytes::copy_from_slice(body.as_bytes()))
    }

    pub fn chunks(status: u16, pieces: &[&str]) -> Self {
        Reply::Chunks(
            status,
            pieces
                .iter()
                .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        )
    }
}

/// Replays scripted replies in order and records every request it sees.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: HttpRequest) -> Reply {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock transport ran out of scripted replies")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        let (status, body) = match self.next(request) {
            Reply::Body(status, body) => (status, body),
            Reply::Chunks(status, pieces) => {
                let mut body = Vec::new();
                for piece in pieces {
                    body.extend_from_slice(&piece?);
                }
                (status, Bytes::from(body))
            }
            Reply::Fail(e) => return Err(e),
        };
        Ok(TransportResponse {
            status,
            headers: Vec::new(),
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let (status, pieces) = match self.next(request) {
            Reply::Body(status, body) => (status, vec![Ok(body)]),
            Reply::Chunks(status, pieces) => (status, pieces),
            Reply::Fail(e) => return Err(e),
        };
        Ok(StreamingResponse {
            status,
            body: stream::iter(pieces).boxed(),
        })
    }
}
