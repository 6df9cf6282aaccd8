// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking HTTP client for DAAP shares.

use std::io::Read;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::codes::ContentCodes;
use crate::dmap::{self, Atom};
use crate::hasher::{hash_v2, hash_v3, VALIDATION_SELECT};
use crate::session::Session;

/// Default DAAP port.
pub const DEFAULT_PORT: u16 = 3689;

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request read timeout. The protocol prescribes none; a stuck server
/// surfaces as [`DaapError::Http`].
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by this crate.
///
/// # Examples
///
/// ```no_run
/// use daap_client::{Client, DaapError};
///
/// let mut client = Client::new();
/// match client.connect("192.168.1.2", daap_client::DEFAULT_PORT) {
///     Ok(()) => println!("connected"),
///     Err(DaapError::AuthRequired) => println!("share is password-protected"),
///     Err(DaapError::ServerBusy) => println!("too many clients, back off"),
///     Err(e) => println!("error: {e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum DaapError {
    /// A transport-level error from [`reqwest`] (refused, reset, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O error while decompressing or copying a response body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// [`Client::connect`] was called on an already-connected client.
    #[error("already connected")]
    AlreadyConnected,

    /// A request was issued before [`Client::connect`].
    #[error("not connected")]
    NotConnected,

    /// The share requires authentication (HTTP 401).
    #[error("server requires authentication")]
    AuthRequired,

    /// The server rejected our credentials or validation hash (HTTP 403).
    #[error("authentication failed")]
    AuthFailed,

    /// The server refused the connection slot (HTTP 503). iTunes caps
    /// concurrent clients; back off and reconnect later.
    #[error("server busy")]
    ServerBusy,

    /// A request was issued on a session that has been logged out.
    #[error("session is closed")]
    SessionClosed,

    /// An atom the protocol guarantees was absent from a response.
    #[error("required atom {0} is missing from the response")]
    Missing(&'static str),

    /// Malformed framing, an unexpected status code, or a response shape the
    /// protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The per-connection half of a [`Client`]; absent until `connect`.
#[derive(Debug)]
struct Connection {
    http: reqwest::blocking::Client,
    base: Url,
}

/// Blocking client for one DAAP server.
///
/// A client owns a keep-alive HTTP connection, the content-code registry it
/// learns from the server at connect time, and the monotonic request counter
/// that feeds the validation hash. All I/O is synchronous and serial — DAAP
/// servers cap concurrent connections per client and answer 503 when pushed,
/// so there is nothing to parallelize.
///
/// ```no_run
/// use std::fs::File;
/// use daap_client::{Client, DEFAULT_PORT};
///
/// # fn example() -> Result<(), daap_client::DaapError> {
/// let mut client = Client::new();
/// client.connect("192.168.1.2", DEFAULT_PORT)?;
///
/// let session = client.login()?;
/// let library = session.library()?;
/// println!("library: {}", library.name().unwrap_or("?"));
///
/// for track in library.tracks()? {
///     println!(
///         "{} — {}",
///         track.artist().unwrap_or("?"),
///         track.name().unwrap_or("?"),
///     );
/// }
///
/// // Stream the first track to disk.
/// if let Some(track) = library.tracks()?.first() {
///     let mut stream = track.open()?;
///     stream.copy_to(&mut File::create("track.mp3")?)?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    conn: Option<Connection>,
    codes: ContentCodes,
    /// Bumped once per media fetch; folded into every v3 validation hash.
    request_id: AtomicU32,
    /// iTunes 4.2 detected — validate with [`hash_v2`] instead of [`hash_v3`].
    old_itunes: bool,
}

impl Client {
    /// Create an unconnected client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conn: None,
            codes: ContentCodes::bootstrap(),
            request_id: AtomicU32::new(0),
            old_itunes: false,
        }
    }

    /// Connect to a share and perform the learning handshake.
    ///
    /// Opens the HTTP connection, fetches `/content-codes` into the
    /// registry, then `/server-info` to detect the server generation (an
    /// `apro` version with major half 2 means an old iTunes that expects the
    /// v2 validation hash). On any failure the client is left unconnected
    /// with its registry reset, and may be retried.
    ///
    /// # Errors
    ///
    /// [`DaapError::AlreadyConnected`] on a second call; otherwise whatever
    /// the handshake surfaced.
    #[instrument(skip(self))]
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), DaapError> {
        if self.conn.is_some() {
            return Err(DaapError::AlreadyConnected);
        }

        let base = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| DaapError::Protocol(format!("invalid host: {e}")))?;
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .pool_max_idle_per_host(1)
            .build()?;
        self.conn = Some(Connection { http, base });

        if let Err(e) = self.handshake() {
            // Back to the unconnected state: drop the connection and forget
            // anything a partial ingest may have taught us.
            self.conn = None;
            self.codes = ContentCodes::bootstrap();
            self.old_itunes = false;
            return Err(e);
        }
        Ok(())
    }

    fn handshake(&mut self) -> Result<(), DaapError> {
        let codes = self
            .request("/content-codes", &[])?
            .ok_or(DaapError::Missing("mccr"))?;
        self.codes.ingest(&codes)?;
        debug!(learned = self.codes.len(), "ingested content codes");

        let info = self
            .request("/server-info", &[])?
            .ok_or(DaapError::Missing("msrv"))?;
        if let Some((major, _)) = info.find(*b"apro").and_then(|a| a.value.as_version()) {
            self.old_itunes = major == 2;
            if self.old_itunes {
                debug!("old iTunes server, switching to the v2 validation hash");
            }
        }
        Ok(())
    }

    /// Whether the server was detected as an old (iTunes 4.2) share.
    #[must_use]
    pub fn is_old_itunes(&self) -> bool {
        self.old_itunes
    }

    /// The media-request counter sent as `Client-DAAP-Request-ID`.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        self.request_id.load(Ordering::SeqCst)
    }

    /// The content-code registry learned from this server.
    #[must_use]
    pub fn content_codes(&self) -> &ContentCodes {
        &self.codes
    }

    /// Log in and obtain a [`Session`].
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if the response carries no `mlid` session id;
    /// otherwise whatever the request surfaced.
    pub fn login(&self) -> Result<Session<'_>, DaapError> {
        let tree = self
            .request("/login", &[])?
            .ok_or(DaapError::Protocol("empty /login response".into()))?;
        let id = tree.u32_of(*b"mlid").ok_or(DaapError::Missing("mlid"))?;
        debug!(session = id, "logged in");
        Ok(Session::new(self, id))
    }

    /// Issue a GET and decode the DMAP body.
    ///
    /// `Ok(None)` is a `204 No Content` answer (logout). Gzip-encoded bodies
    /// are decompressed transparently.
    ///
    /// # Errors
    ///
    /// Status codes map per the protocol: 401 [`DaapError::AuthRequired`],
    /// 403 [`DaapError::AuthFailed`], 503 [`DaapError::ServerBusy`], any
    /// other non-200 [`DaapError::Protocol`].
    pub fn request(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<Atom>, DaapError> {
        let resp = self.get(path, params, true)?;
        match check_status(path, resp.status().as_u16())? {
            Body::None => return Ok(None),
            Body::Some => {}
        }

        let gzipped = resp
            .headers()
            .get(CONTENT_ENCODING)
            .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));
        let mut body = resp.bytes()?;
        if gzipped {
            let mut expanded = Vec::new();
            GzDecoder::new(body.as_ref()).read_to_end(&mut expanded)?;
            debug!(
                compressed = body.len(),
                expanded = expanded.len(),
                "gunzipped response body"
            );
            body = Bytes::from(expanded);
        }

        dmap::decode(&self.codes, &body).map(Some)
    }

    /// Issue a gzip-disabled GET and hand back the raw response for
    /// streaming. Media fetches use this; the body is never buffered here.
    pub(crate) fn request_raw(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::blocking::Response, DaapError> {
        let resp = self.get(path, params, false)?;
        match check_status(path, resp.status().as_u16())? {
            Body::Some => Ok(resp),
            Body::None => Err(DaapError::Protocol(format!("no content from {path}"))),
        }
    }

    /// Bump the request counter for a media fetch and return the new value.
    pub(crate) fn next_request_id(&self) -> u32 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn get(
        &self,
        path: &str,
        params: &[(&str, &str)],
        gzip: bool,
    ) -> Result<reqwest::blocking::Response, DaapError> {
        let conn = self.conn.as_ref().ok_or(DaapError::NotConnected)?;

        let mut url = conn
            .base
            .join(path)
            .map_err(|e| DaapError::Protocol(format!("invalid path {path}: {e}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        // The validation hash covers the exact request target, so build the
        // header from the same Url that goes on the wire.
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_owned(),
        };
        let request_id = self.request_id();
        let validation = if self.old_itunes {
            hash_v2(&target, VALIDATION_SELECT)
        } else {
            hash_v3(&target, VALIDATION_SELECT, request_id)
        };
        debug!(request = %target, request_id, "GET");

        let mut req = conn
            .http
            .get(url)
            .header("Client-DAAP-Version", "3.0")
            .header("Client-DAAP-Access-Index", "2")
            .header("Client-DAAP-Validation", validation);
        if gzip {
            req = req.header(ACCEPT_ENCODING, "gzip");
        }
        if request_id > 0 {
            req = req.header("Client-DAAP-Request-ID", request_id.to_string());
        }

        Ok(req.send()?)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

enum Body {
    Some,
    None,
}

fn check_status(path: &str, status: u16) -> Result<Body, DaapError> {
    match status {
        200 => Ok(Body::Some),
        204 => Ok(Body::None),
        401 => Err(DaapError::AuthRequired),
        403 => Err(DaapError::AuthFailed),
        503 => {
            warn!(path, "server refused the connection slot");
            Err(DaapError::ServerBusy)
        }
        other => Err(DaapError::Protocol(format!("HTTP {other} from {path}"))),
    }
}
