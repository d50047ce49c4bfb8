//! HTTP status sources and the push-stream connector.

use crate::push::{FrameStream, PushConnector};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use pixel_office_engine::protocol::{PushFrame, StatusPayload};
use pixel_office_engine::{SourceError, StatusSource};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::time::Duration;

pub const LOCAL_SOURCE: &str = "local api";
pub const STATIC_SOURCE: &str = "static json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Exactly 200 with a JSON content type.
    StrictJson,
    /// Any 2xx; the body only has to parse.
    AnySuccess,
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    name: String,
    url: String,
    http: reqwest::Client,
    timeout: Duration,
    acceptance: Acceptance,
}

impl HttpSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        http: reqwest::Client,
        timeout: Duration,
        acceptance: Acceptance,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            http,
            timeout,
            acceptance,
        }
    }

    pub fn local(url: impl Into<String>, http: reqwest::Client, timeout: Duration) -> Self {
        Self::new(LOCAL_SOURCE, url, http, timeout, Acceptance::StrictJson)
    }

    pub fn fallback(url: impl Into<String>, http: reqwest::Client, timeout: Duration) -> Self {
        Self::new(STATIC_SOURCE, url, http, timeout, Acceptance::AnySuccess)
    }

    async fn fetch_once(&self) -> Result<StatusPayload, SourceError> {
        let resp = self
            .http
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        let status_ok = match self.acceptance {
            Acceptance::StrictJson => status == StatusCode::OK,
            Acceptance::AnySuccess => status.is_success(),
        };
        if !status_ok {
            return Err(SourceError::HttpStatus(status.as_u16()));
        }

        if self.acceptance == Acceptance::StrictJson {
            let ct = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if !ct.as_deref().is_some_and(is_json_content_type) {
                return Err(SourceError::ContentType(ct));
            }
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl StatusSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> BoxFuture<'_, Result<StatusPayload, SourceError>> {
        async move {
            match tokio::time::timeout(self.timeout, self.fetch_once()).await {
                Ok(res) => res,
                Err(_) => Err(SourceError::Timeout(self.timeout)),
            }
        }
        .boxed()
    }
}

pub fn is_json_content_type(ct: &str) -> bool {
    let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// Incremental `text/event-stream` parser. Feed it raw bytes as they arrive;
/// it hands back the `data` payload of every completed event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        let mut out = Vec::new();
        while let Some(end) = find_blank_line(&self.buf) {
            let block: Vec<u8> = self.buf.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if !data.is_empty() {
                out.push(data.join("\n"));
            }
        }
        out
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Opens the push endpoint with reqwest and decodes frames as they stream in.
#[derive(Debug, Clone)]
pub struct HttpPushConnector {
    url: String,
    http: reqwest::Client,
}

impl HttpPushConnector {
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }
}

impl PushConnector for HttpPushConnector {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, SourceError>> {
        async move {
            let resp = self
                .http
                .get(&self.url)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await
                .map_err(|e| SourceError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(SourceError::HttpStatus(resp.status().as_u16()));
            }
            Ok(decode_frames(resp))
        }
        .boxed()
    }
}

/// A frame that does not parse is logged and dropped; the connection stays up.
pub fn parse_frame(data: &str) -> Option<PushFrame> {
    match serde_json::from_str::<PushFrame>(data) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::debug!(error = %e, "skipping push frame");
            None
        }
    }
}

fn decode_frames(resp: reqwest::Response) -> FrameStream {
    let bytes = Box::pin(resp.bytes_stream());
    let pending: VecDeque<Result<PushFrame, SourceError>> = VecDeque::new();
    let state = (bytes, SseDecoder::default(), pending);
    futures_util::stream::unfold(state, |(mut bytes, mut decoder, mut pending)| async move {
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, (bytes, decoder, pending)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = decoder.feed(&chunk);
                    pending.extend(frames.iter().filter_map(|d| parse_frame(d)).map(Ok));
                }
                Some(Err(e)) => {
                    return Some((
                        Err(SourceError::Transport(e.to_string())),
                        (bytes, decoder, pending),
                    ))
                }
                None => return None,
            }
        }
    })
    .boxed()
}
