//! HTTP front end.
//!
//! Every inbound request is routed by hostname alone:
//!
//! * the host part of the request authority (port stripped) is looked up in
//!   the shared [`RoutingTable`];
//! * a hit is forwarded to `http://<address>:<port>` with the usual reverse
//!   proxy header rewriting, and the upstream response is streamed back;
//! * a miss is answered by the configured [`Fallback`].
//!
//! Protocol upgrades (WebSocket) are passed through: the `101` is relayed and
//! both upgraded connections are spliced together.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_TYPE, HOST, TE, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use log::{debug, error, info, warn};
use tokio::io::copy_bidirectional;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::index_page;
use crate::table::RoutingTable;
use crate::types::Endpoint;

/// Body type on both sides of the proxy.
pub type ProxyBody = UnsyncBoxBody<Bytes, hyper::Error>;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

const NOT_FOUND_BODY: &str = "404 page not found\n";

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that only describe the connection they arrive on.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response strategy for requests whose host has no routing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Discovery page linking every known name with the suffix appended.
    Index { domain_suffix: String },
    /// Plain `404 Not Found`.
    NotFound,
}

pub struct Dispatcher {
    table: Arc<RoutingTable>,
    fallback: Fallback,
    client: Client<HttpConnector, ProxyBody>,
}

impl Dispatcher {
    pub fn new(table: Arc<RoutingTable>, fallback: Fallback) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            table,
            fallback,
            client,
        }
    }

    pub async fn dispatch(
        &self,
        req: Request<ProxyBody>,
        remote: SocketAddr,
    ) -> Response<ProxyBody> {
        let authority = request_authority(&req);
        let key = routing_key(&authority);
        info!("New request to host {}, hostname={}", authority, key);

        match self.table.lookup(key) {
            Some(endpoint) => self.forward(req, endpoint, remote).await,
            None => self.fallback_response(),
        }
    }

    async fn forward(
        &self,
        mut req: Request<ProxyBody>,
        endpoint: Endpoint,
        remote: SocketAddr,
    ) -> Response<ProxyBody> {
        let upgrade = requested_upgrade(req.headers());
        let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut req));
        let (mut parts, body) = req.into_parts();

        let target_authority = endpoint.authority();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        parts.uri = match Uri::builder()
            .scheme(endpoint.scheme().as_str())
            .authority(target_authority.as_str())
            .path_and_query(path_and_query)
            .build()
        {
            Ok(uri) => uri,
            Err(e) => {
                warn!("Cannot build upstream URI for {}: {}", endpoint, e);
                return text_response(StatusCode::BAD_GATEWAY, None, Bytes::new());
            }
        };
        parts.version = Version::HTTP_11;

        let keep_trailers = lists_token(&parts.headers, TE, "trailers");
        strip_hop_by_hop(&mut parts.headers);
        if keep_trailers {
            parts.headers.insert(TE, HeaderValue::from_static("trailers"));
        }
        if let Some(protocol) = upgrade {
            set_upgrade(&mut parts.headers, protocol);
        }
        append_forwarded_for(&mut parts.headers, remote);
        if let Ok(host) = HeaderValue::from_str(&target_authority) {
            parts.headers.insert(HOST, host);
        }

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(resp) if resp.status() == StatusCode::SWITCHING_PROTOCOLS => {
                match client_upgrade {
                    Some(client_upgrade) => tunnel(client_upgrade, resp, endpoint),
                    None => {
                        warn!("{} switched protocols without being asked", endpoint);
                        text_response(StatusCode::BAD_GATEWAY, None, Bytes::new())
                    }
                }
            }
            Ok(resp) => {
                let (mut parts, body) = resp.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, body.boxed_unsync())
            }
            Err(e) => {
                warn!("Proxy error forwarding to {}: {}", endpoint, e);
                text_response(StatusCode::BAD_GATEWAY, None, Bytes::new())
            }
        }
    }

    fn fallback_response(&self) -> Response<ProxyBody> {
        match &self.fallback {
            Fallback::Index { domain_suffix } => {
                let page = index_page::render(self.table.names(), domain_suffix);
                text_response(StatusCode::OK, Some("text/html; charset=utf-8"), page)
            }
            Fallback::NotFound => text_response(
                StatusCode::NOT_FOUND,
                Some("text/plain; charset=utf-8"),
                NOT_FOUND_BODY,
            ),
        }
    }
}

/// Accepts connections until `cancel` fires, serving each one on its own task.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
    loop {
        let (stream, remote) = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Proxy listener stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    let req = req.map(BodyExt::boxed_unsync);
                    Ok::<_, Infallible>(dispatcher.dispatch(req, remote).await)
                }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                debug!("Connection from {} ended with error: {}", remote, e);
            }
        });
    }
}

/// The authority the client asked for: the absolute-form URI authority when
/// present, otherwise the `Host` header.
fn request_authority<B>(req: &Request<B>) -> String {
    if let Some(authority) = req.uri().authority() {
        return authority.as_str().to_string();
    }
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Host part of a `host:port` authority; anything else is returned verbatim.
pub fn routing_key(authority: &str) -> &str {
    split_host(authority).unwrap_or(authority)
}

fn split_host(hostport: &str) -> Option<&str> {
    let colon = hostport.rfind(':')?;
    let (host, port) = (&hostport[..colon], &hostport[colon + 1..]);
    if port.contains(['[', ']']) {
        return None;
    }

    match host.strip_prefix('[') {
        Some(bracketed) => {
            let inner = bracketed.strip_suffix(']')?;
            (!inner.contains(['[', ']'])).then_some(inner)
        }
        None => (!host.contains([':', '[', ']'])).then_some(host),
    }
}

/// Relays a `101` to the client and splices the two upgraded connections
/// once both sides have switched.
fn tunnel(
    client_upgrade: OnUpgrade,
    mut resp: Response<Incoming>,
    endpoint: Endpoint,
) -> Response<ProxyBody> {
    let upstream_upgrade = hyper::upgrade::on(&mut resp);
    tokio::spawn(async move {
        match tokio::try_join!(client_upgrade, upstream_upgrade) {
            Ok((client, upstream)) => {
                let mut client = TokioIo::new(client);
                let mut upstream = TokioIo::new(upstream);
                match copy_bidirectional(&mut client, &mut upstream).await {
                    Ok((up, down)) => debug!(
                        "Tunnel to {} closed ({} bytes up, {} bytes down)",
                        endpoint, up, down
                    ),
                    Err(e) => debug!("Tunnel to {} closed with error: {}", endpoint, e),
                }
            }
            Err(e) => warn!("Protocol upgrade to {} failed: {}", endpoint, e),
        }
    });

    let protocol = resp.headers().get(UPGRADE).cloned();
    let (mut parts, _) = resp.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    if let Some(protocol) = protocol {
        set_upgrade(&mut parts.headers, protocol);
    }
    Response::from_parts(parts, full(Bytes::new()))
}

/// Comma-separated tokens of every value of `name`.
fn header_tokens(headers: &HeaderMap, name: HeaderName) -> impl Iterator<Item = &str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn lists_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    header_tokens(headers, name).any(|t| t.eq_ignore_ascii_case(token))
}

/// The protocol a client asks to switch to, when `Connection` names `upgrade`.
fn requested_upgrade(headers: &HeaderMap) -> Option<HeaderValue> {
    if lists_token(headers, CONNECTION, "upgrade") {
        headers.get(UPGRADE).cloned()
    } else {
        None
    }
}

fn set_upgrade(headers: &mut HeaderMap, protocol: HeaderValue) {
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, protocol);
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = header_tokens(headers, CONNECTION)
        .filter_map(|token| HeaderName::from_bytes(token.as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, remote: SocketAddr) {
    let client_ip = remote.ip().to_string();
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let value = if prior.is_empty() {
        client_ip
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

fn full(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn text_response(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: impl Into<Bytes>,
) -> Response<ProxyBody> {
    let mut resp = Response::new(full(body));
    *resp.status_mut() = status;
    if let Some(content_type) = content_type {
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    resp
}
