use futures_util::future::BoxFuture;
use pixel_office_protocol::StatusPayload;
use std::sync::Arc;
use std::time::Duration;

/// Why a status source could not deliver. Every variant means "try the next
/// one"; none of them is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    #[error("unexpected content type {0:?}")]
    ContentType(Option<String>),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("stream closed")]
    Closed,
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

/// A named place the office can read its status from.
pub trait StatusSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self) -> BoxFuture<'_, Result<StatusPayload, SourceError>>;
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub source: String,
    pub payload: StatusPayload,
}

#[derive(Debug)]
pub struct Failure {
    pub source: String,
    pub error: SourceError,
}

/// Tries `sources` in order and returns the first payload, or every failure
/// when none of them delivers.
pub async fn first_success(sources: &[Arc<dyn StatusSource>]) -> Result<Fetched, Vec<Failure>> {
    let mut failures = Vec::with_capacity(sources.len());
    for source in sources {
        match source.fetch().await {
            Ok(payload) => {
                return Ok(Fetched {
                    source: source.name().to_string(),
                    payload,
                })
            }
            Err(error) => failures.push(Failure {
                source: source.name().to_string(),
                error,
            }),
        }
    }
    Err(failures)
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers immediately with a canned result and counts calls.
    pub struct Canned {
        pub name: &'static str,
        pub body: Option<&'static str>,
        pub calls: AtomicUsize,
    }

    impl Canned {
        pub fn ok(name: &'static str, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                body: Some(body),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                body: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for Canned {
        fn name(&self) -> &str {
            self.name
        }

        fn fetch(&self) -> BoxFuture<'_, Result<StatusPayload, SourceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = match self.body {
                Some(body) => serde_json::from_str(body).map_err(SourceError::from),
                None => Err(SourceError::HttpStatus(503)),
            };
            async move { out }.boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::Canned;
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn first_success_stops_at_the_first_working_source() {
        let local = Canned::ok("local", r#"{"roles":[{"id":"fe"}]}"#);
        let fallback = Canned::ok("static", r#"{"roles":[]}"#);
        let sources: Vec<Arc<dyn StatusSource>> = vec![local.clone(), fallback.clone()];

        let got = first_success(&sources).now_or_never().unwrap().unwrap();
        assert_eq!(got.source, "local");
        assert_eq!(local.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[test]
    fn failures_fall_through_in_order() {
        let local = Canned::failing("local");
        let fallback = Canned::ok("static", r#"{"roles":[{"id":"qa"}]}"#);
        let sources: Vec<Arc<dyn StatusSource>> = vec![local.clone(), fallback.clone()];

        let got = first_success(&sources).now_or_never().unwrap().unwrap();
        assert_eq!(got.source, "static");
        assert_eq!(got.payload.records()[0].id, "qa");
        assert_eq!(local.calls(), 1);
    }

    #[test]
    fn malformed_payload_counts_as_failure() {
        let broken = Canned::ok("local", "<html>not json</html>");
        let sources: Vec<Arc<dyn StatusSource>> = vec![broken];
        let failures = first_success(&sources).now_or_never().unwrap().unwrap_err();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, SourceError::Payload(_)));
    }

    #[test]
    fn no_sources_is_an_empty_failure_list() {
        let failures = first_success(&[]).now_or_never().unwrap().unwrap_err();
        assert!(failures.is_empty());
    }
}
