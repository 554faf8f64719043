//! AMP CORS middleware.
//!
//! # Responsibilities
//! - Detect AMP requests by the `__amp_source_origin` query parameter
//! - Resolve the requesting origin (same-origin short-circuit or whitelist)
//! - Scrub the AMP parameter before the request reaches the inner service
//! - Decorate authorized responses with the AMP CORS headers
//!
//! # Flow
//! ```text
//! request ──▶ no __amp_source_origin ──────────────▶ inner service (untouched)
//!         └─▶ AMP flow ──▶ resolve origin ──┬─ fail ─▶ 401 "Unauthorized Request"
//!                                          └─ ok ───▶ scrub query ─▶ inner ─▶ add headers
//! ```
//!
//! # Design Decisions
//! - Guard state is immutable and shared through `Arc`, no locking
//! - Rejections are responses, never errors on the service
//! - Inner service errors are passed through unchanged

use std::borrow::Cow;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{
    header::{ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ORIGIN},
    uri::PathAndQuery,
    HeaderMap, HeaderValue, Request, Response, StatusCode, Uri,
};
use futures_util::future::{self, BoxFuture};
use tower::{Layer, Service};
use url::form_urlencoded;

use crate::config::AmpConfig;
use crate::observability::metrics;
use crate::security::origins::ValidOriginSet;

/// Query parameter carrying the origin claimed by the AMP cache.
pub const AMP_SOURCE_ORIGIN_PARAM: &str = "__amp_source_origin";

/// Request header set by AMP runtimes for same-origin fetches.
pub const AMP_SAME_ORIGIN: &str = "amp-same-origin";

/// Response header echoing the claimed source origin.
pub const AMP_ACCESS_CONTROL_ALLOW_SOURCE_ORIGIN: &str = "amp-access-control-allow-source-origin";

const EXPOSED_HEADERS: &str = "AMP-Access-Control-Allow-Source-Origin";
const UNAUTHORIZED_BODY: &str = "Unauthorized Request";

/// Errors raised while building a guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("publisher origin `{0}` must use the https:// scheme")]
    InsecurePublisherOrigin(String),

    #[error("extra query parameter `{0}` is reserved")]
    ReservedQueryParameter(String),
}

/// Why an AMP request was refused. Always answered with a 401.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("missing Origin header")]
    MissingOrigin,

    #[error("origin `{0}` is not allowed")]
    OriginNotAllowed(String),

    #[error("source origin `{0}` does not match the publisher origin")]
    SourceOriginMismatch(String),

    #[error("source origin is not a valid header value")]
    InvalidSourceOrigin,
}

impl Rejection {
    /// Render the rejection as the fixed 401 response.
    pub fn into_response<B>(self) -> Response<B>
    where
        B: From<&'static str>,
    {
        let mut response = Response::new(B::from(UNAUTHORIZED_BODY));
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        response
    }
}

/// A successful origin resolution.
#[derive(Debug, Clone)]
pub struct Authorization {
    allow_origin: HeaderValue,
    source_origin: HeaderValue,
    forwarded_uri: Uri,
}

impl Authorization {
    /// Value for `Access-Control-Allow-Origin`.
    pub fn allow_origin(&self) -> &HeaderValue {
        &self.allow_origin
    }

    /// Value for `AMP-Access-Control-Allow-Source-Origin`.
    pub fn source_origin(&self) -> &HeaderValue {
        &self.source_origin
    }

    /// Request target with the AMP parameter removed and extras merged.
    pub fn forwarded_uri(&self) -> &Uri {
        &self.forwarded_uri
    }

    /// Set the three AMP CORS headers, overwriting existing values.
    pub fn decorate(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(AMP_ACCESS_CONTROL_ALLOW_SOURCE_ORIGIN, self.source_origin.clone());
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
    }
}

/// Outcome of inspecting one request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Not an AMP request; forward as-is.
    Passthrough,
    /// Empty AMP claim; forward to this target with every AMP parameter
    /// removed and no CORS headers.
    Scrubbed(Uri),
    Authorized(Authorization),
    Rejected(Rejection),
}

/// Origin policy for AMP cache traffic of a single publisher.
#[derive(Debug, Clone)]
pub struct AmpOriginGuard {
    publisher_origin: String,
    valid_origins: ValidOriginSet,
    query_string: Vec<(String, String)>,
}

impl AmpOriginGuard {
    /// Create a guard for `publisher_origin`, which must be an `https://` origin.
    pub fn new(publisher_origin: impl Into<String>) -> Result<Self, GuardError> {
        let publisher_origin = publisher_origin.into();
        if !is_secure_origin(&publisher_origin) {
            return Err(GuardError::InsecurePublisherOrigin(publisher_origin));
        }

        Ok(Self {
            valid_origins: ValidOriginSet::for_publisher(&publisher_origin),
            publisher_origin,
            query_string: Vec::new(),
        })
    }

    /// Create a guard from the `[amp]` config section.
    pub fn from_config(config: &AmpConfig) -> Result<Self, GuardError> {
        Self::new(config.publisher_origin.clone())?.with_query_string(
            config
                .query_string
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        )
    }

    /// Extra query parameters merged into every authorized request.
    ///
    /// A configured name replaces any pair with the same name already in
    /// the request.
    pub fn with_query_string<I, K, V>(mut self, params: I) -> Result<Self, GuardError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in params {
            let name = name.into();
            if name == AMP_SOURCE_ORIGIN_PARAM {
                return Err(GuardError::ReservedQueryParameter(name));
            }
            self.query_string.push((name, value.into()));
        }
        Ok(self)
    }

    pub fn publisher_origin(&self) -> &str {
        &self.publisher_origin
    }

    pub fn valid_origins(&self) -> &ValidOriginSet {
        &self.valid_origins
    }

    /// Inspect a request and decide how it should be handled.
    pub fn decide<B>(&self, req: &Request<B>) -> Decision {
        let Some(source_origin) = amp_source_origin(req.uri()) else {
            return Decision::Passthrough;
        };

        if source_origin.is_empty() {
            return match rewrite_uri(req.uri(), &[]) {
                Ok(uri) => Decision::Scrubbed(uri),
                Err(rejection) => Decision::Rejected(rejection),
            };
        }

        match self.authorize(req, &source_origin) {
            Ok(authorization) => Decision::Authorized(authorization),
            Err(rejection) => Decision::Rejected(rejection),
        }
    }

    fn authorize<B>(
        &self,
        req: &Request<B>,
        source_origin: &str,
    ) -> Result<Authorization, Rejection> {
        let source_value =
            HeaderValue::from_str(source_origin).map_err(|_| Rejection::InvalidSourceOrigin)?;

        // Only reached inside the AMP flow, so the header is never trusted on its own.
        let allow_origin = if is_same_origin(req.headers()) {
            source_value.clone()
        } else {
            self.cross_origin(req.headers(), source_origin)?
        };

        Ok(Authorization {
            allow_origin,
            source_origin: source_value,
            forwarded_uri: rewrite_uri(req.uri(), &self.query_string)?,
        })
    }

    fn cross_origin(
        &self,
        headers: &HeaderMap,
        source_origin: &str,
    ) -> Result<HeaderValue, Rejection> {
        let origin = headers.get(ORIGIN).ok_or(Rejection::MissingOrigin)?;
        // Non-ASCII hosts arrive as raw UTF-8 bytes, which `to_str` refuses.
        let origin_str = std::str::from_utf8(origin.as_bytes()).map_err(|_| {
            Rejection::OriginNotAllowed(String::from_utf8_lossy(origin.as_bytes()).into_owned())
        })?;

        if !self.valid_origins.contains(origin_str) {
            return Err(Rejection::OriginNotAllowed(origin_str.to_string()));
        }
        if source_origin != self.publisher_origin {
            return Err(Rejection::SourceOriginMismatch(source_origin.to_string()));
        }

        Ok(origin.clone())
    }
}

fn is_secure_origin(origin: &str) -> bool {
    origin
        .get(..8)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
}

fn is_same_origin(headers: &HeaderMap) -> bool {
    headers
        .get(AMP_SAME_ORIGIN)
        .is_some_and(|value| value.as_bytes() == b"true")
}

/// Last occurrence wins. `Some("")` means the parameter is present but
/// does not mark an AMP request.
fn amp_source_origin(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| name == AMP_SOURCE_ORIGIN_PARAM)
        .last()
        .map(|(_, value)| value.into_owned())
}

/// Rebuild `uri` with the query passed through [`rewrite_query`].
///
/// The rebuilt target only fails to parse if the claimed source origin
/// segment was already unusable, so that is the reported reason.
fn rewrite_uri(uri: &Uri, extra: &[(String, String)]) -> Result<Uri, Rejection> {
    let query = rewrite_query(uri.query().unwrap_or_default(), extra);
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query).map_err(|_| Rejection::InvalidSourceOrigin)?,
    );
    Uri::from_parts(parts).map_err(|_| Rejection::InvalidSourceOrigin)
}

/// Drop the AMP parameter and any pair overridden by `extra`, then append
/// `extra`. Untouched segments keep their original encoding.
fn rewrite_query(query: &str, extra: &[(String, String)]) -> String {
    let mut segments: Vec<Cow<'_, str>> = query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| match segment_name(segment) {
            Some(name) => {
                name != AMP_SOURCE_ORIGIN_PARAM
                    && !extra.iter().any(|(extra_name, _)| extra_name.as_str() == &*name)
            }
            None => true,
        })
        .map(Cow::Borrowed)
        .collect();

    if !extra.is_empty() {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in extra {
            serializer.append_pair(name, value);
        }
        segments.push(Cow::Owned(serializer.finish()));
    }

    segments.join("&")
}

fn segment_name(segment: &str) -> Option<Cow<'_, str>> {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(name, _)| name)
}

/// Layer that applies [`AmpCors`] to a service.
#[derive(Debug, Clone)]
pub struct AmpCorsLayer {
    guard: Arc<AmpOriginGuard>,
}

impl AmpCorsLayer {
    pub fn new(guard: AmpOriginGuard) -> Self {
        Self::from_shared(Arc::new(guard))
    }

    /// Share one guard between several layers.
    pub fn from_shared(guard: Arc<AmpOriginGuard>) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for AmpCorsLayer {
    type Service = AmpCors<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AmpCors {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Middleware enforcing the AMP CORS policy in front of `S`.
#[derive(Debug, Clone)]
pub struct AmpCors<S> {
    inner: S,
    guard: Arc<AmpOriginGuard>,
}

impl<S> AmpCors<S> {
    pub fn new(inner: S, guard: Arc<AmpOriginGuard>) -> Self {
        Self { inner, guard }
    }

    pub fn guard(&self) -> &AmpOriginGuard {
        &self.guard
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AmpCors<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: From<&'static str> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let authorization = match self.guard.decide(&req) {
            Decision::Passthrough => {
                metrics::record_amp_decision("passthrough");
                return Box::pin(self.inner.call(req));
            }
            Decision::Scrubbed(uri) => {
                metrics::record_amp_decision("passthrough");
                *req.uri_mut() = uri;
                return Box::pin(self.inner.call(req));
            }
            Decision::Rejected(rejection) => {
                tracing::warn!(
                    path = %req.uri().path(),
                    reason = %rejection,
                    "Rejected AMP request"
                );
                metrics::record_amp_decision("rejected");
                return Box::pin(future::ready(Ok(rejection.into_response())));
            }
            Decision::Authorized(authorization) => authorization,
        };

        tracing::debug!(
            path = %req.uri().path(),
            origin = ?authorization.allow_origin(),
            "Authorized AMP request"
        );
        metrics::record_amp_decision("authorized");

        *req.uri_mut() = authorization.forwarded_uri().clone();
        let response = self.inner.call(req);

        Box::pin(async move {
            let mut response = response.await?;
            authorization.decorate(response.headers_mut());
            Ok(response)
        })
    }
}
