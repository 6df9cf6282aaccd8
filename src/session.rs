// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sessions and the library façade: databases, playlists, tracks, media.
//!
//! A [`Session`] threads its server-issued `session-id` through every query.
//! [`Database`], [`Playlist`] and [`Track`] are thin wrappers over subtrees
//! of decoded responses; their accessors resolve on each call by querying
//! the underlying atom, so a field the server did not send is simply `None`.

use std::cell::Cell;
use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::client::{Client, DaapError};
use crate::dmap::Atom;

/// The `meta` fields requested for track listings.
const TRACK_META: &str = "dmap.itemid,dmap.itemname,daap.songalbum,daap.songartist,\
                          daap.songformat,daap.songtime";

/// Recommended read size for media copies.
pub const MEDIA_CHUNK_SIZE: usize = 32 * 1024;

/// A logged-in DAAP session.
///
/// Obtained from [`Client::login`]; borrows the client, so the client must
/// outlive it. Dropping the session logs out; a logout that fails (the
/// server is gone, the share expired us) is logged and swallowed so teardown
/// never masks an earlier error.
#[derive(Debug)]
pub struct Session<'a> {
    client: &'a Client,
    id: u32,
    revision: u32,
    closed: Cell<bool>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(client: &'a Client, id: u32) -> Self {
        Self {
            client,
            id,
            revision: 1,
            closed: Cell::new(false),
        }
    }

    /// The server-issued session id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The current revision number (always 1 until an update dance).
    #[must_use]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Whether [`logout`](Self::logout) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Issue a GET with this session's `session-id` merged into the query.
    ///
    /// # Errors
    ///
    /// [`DaapError::SessionClosed`] after logout; otherwise whatever
    /// [`Client::request`] surfaces.
    pub fn request(&self, path: &str, params: &[(&str, &str)]) -> Result<Option<Atom>, DaapError> {
        if self.closed.get() {
            return Err(DaapError::SessionClosed);
        }
        let sid = self.id.to_string();
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("session-id", &sid));
        self.client.request(path, &query)
    }

    /// Poll `/update` and return the server's answer.
    ///
    /// # Errors
    ///
    /// Returns [`DaapError`] if the request fails.
    pub fn update(&self) -> Result<Option<Atom>, DaapError> {
        self.request("/update", &[])
    }

    /// List the databases the share publishes.
    ///
    /// The list is the children of the first `mlcl` container in the
    /// `/databases` response. In practice iTunes always publishes exactly
    /// one.
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if the response has no `mlcl` listing.
    pub fn databases(&self) -> Result<Vec<Database<'_>>, DaapError> {
        let tree = self
            .request("/databases", &[])?
            .ok_or_else(|| DaapError::Protocol("empty /databases response".into()))?;
        let listing = tree.find(*b"mlcl").ok_or(DaapError::Missing("mlcl"))?;
        Ok(listing
            .children()
            .iter()
            .cloned()
            .map(|atom| Database {
                session: self,
                atom,
            })
            .collect())
    }

    /// The first database — there is only ever one, and it is the library.
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if the share publishes no databases.
    pub fn library(&self) -> Result<Database<'_>, DaapError> {
        self.databases()?
            .into_iter()
            .next()
            .ok_or(DaapError::Missing("mlit"))
    }

    /// Log out and close the session.
    ///
    /// Idempotent: calling it twice, or after the connection has died, is a
    /// no-op. Failures are logged, never raised — the server expires the
    /// session on its own either way.
    pub fn logout(&self) {
        if self.closed.replace(true) {
            return;
        }
        let sid = self.id.to_string();
        match self.client.request("/logout", &[("session-id", &sid)]) {
            Ok(_) => debug!(session = self.id, "logged out"),
            Err(e) => warn!(session = self.id, error = %e, "logout failed"),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.logout();
    }
}

/// One shared database, wrapping an `mlit` row of the `/databases` listing.
#[derive(Debug)]
pub struct Database<'s> {
    session: &'s Session<'s>,
    atom: Atom,
}

impl<'s> Database<'s> {
    /// Database name (`minm`).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.atom.str_of(*b"minm")
    }

    /// Database id (`miid`).
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.atom.u32_of(*b"miid")
    }

    /// All tracks in this database.
    ///
    /// Fetches `/databases/{id}/items` with the fixed `meta` field list and
    /// wraps every `mlit` row of the listing.
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if this row carried no id or the response has
    /// no listing; otherwise whatever the request surfaced.
    pub fn tracks(&self) -> Result<Vec<Track<'_>>, DaapError> {
        let id = self.id().ok_or(DaapError::Missing("miid"))?;
        let tree = self
            .session
            .request(&format!("/databases/{id}/items"), &[("meta", TRACK_META)])?
            .ok_or_else(|| DaapError::Protocol("empty track listing".into()))?;
        let listing = tree.find(*b"mlcl").ok_or(DaapError::Missing("mlcl"))?;
        Ok(listing
            .children()
            .iter()
            .filter(|atom| atom.code == *b"mlit")
            .cloned()
            .map(|atom| Track {
                database: self,
                atom,
            })
            .collect())
    }

    /// The playlists of this database, from `/databases/{id}/containers`.
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if this row carried no id or the response has
    /// no listing; otherwise whatever the request surfaced.
    pub fn playlists(&self) -> Result<Vec<Playlist<'_>>, DaapError> {
        let id = self.id().ok_or(DaapError::Missing("miid"))?;
        let tree = self
            .session
            .request(&format!("/databases/{id}/containers"), &[])?
            .ok_or_else(|| DaapError::Protocol("empty playlist listing".into()))?;
        let listing = tree.find(*b"mlcl").ok_or(DaapError::Missing("mlcl"))?;
        Ok(listing
            .children()
            .iter()
            .cloned()
            .map(|atom| Playlist {
                database: self,
                atom,
            })
            .collect())
    }
}

/// One playlist row of a database's container listing.
#[derive(Debug)]
pub struct Playlist<'s> {
    database: &'s Database<'s>,
    atom: Atom,
}

impl<'s> Playlist<'s> {
    /// Playlist id (`miid`).
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.atom.u32_of(*b"miid")
    }

    /// Playlist name (`minm`).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.atom.str_of(*b"minm")
    }

    /// Number of items in the playlist (`mimc`).
    #[must_use]
    pub fn count(&self) -> Option<u32> {
        self.atom.u32_of(*b"mimc")
    }

    /// The tracks on this playlist.
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if ids are absent; otherwise whatever the
    /// request surfaced.
    pub fn tracks(&self) -> Result<Vec<Track<'s>>, DaapError> {
        let db = self.database.id().ok_or(DaapError::Missing("miid"))?;
        let id = self.id().ok_or(DaapError::Missing("miid"))?;
        let tree = self
            .database
            .session
            .request(
                &format!("/databases/{db}/containers/{id}/items"),
                &[("meta", TRACK_META)],
            )?
            .ok_or_else(|| DaapError::Protocol("empty track listing".into()))?;
        let listing = tree.find(*b"mlcl").ok_or(DaapError::Missing("mlcl"))?;
        Ok(listing
            .children()
            .iter()
            .filter(|atom| atom.code == *b"mlit")
            .cloned()
            .map(|atom| Track {
                database: self.database,
                atom,
            })
            .collect())
    }
}

/// One track row of an item listing.
#[derive(Debug)]
pub struct Track<'s> {
    database: &'s Database<'s>,
    atom: Atom,
}

impl<'s> Track<'s> {
    /// Track title (`minm`).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.atom.str_of(*b"minm")
    }

    /// Artist (`asar`).
    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.atom.str_of(*b"asar")
    }

    /// Album (`asal`).
    #[must_use]
    pub fn album(&self) -> Option<&str> {
        self.atom.str_of(*b"asal")
    }

    /// Item id (`miid`).
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.atom.u32_of(*b"miid")
    }

    /// File format, e.g. `mp3` (`asfm`).
    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.atom.str_of(*b"asfm")
    }

    /// Duration in milliseconds (`astm`).
    #[must_use]
    pub fn duration_ms(&self) -> Option<u32> {
        self.atom.u32_of(*b"astm")
    }

    /// File size in bytes (`astz`).
    #[must_use]
    pub fn size(&self) -> Option<u32> {
        self.atom.u32_of(*b"astz")
    }

    /// The decoded row this track wraps, for fields without an accessor.
    #[must_use]
    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// Open the track's media bytes as a stream.
    ///
    /// Bumps the owning client's request counter (future validation hashes
    /// fold in the new value), then issues a gzip-disabled GET against the
    /// track's media URL. The returned stream is single-pass and independent
    /// of later requests on the same client.
    ///
    /// # Errors
    ///
    /// [`DaapError::Missing`] if the track row lacks `miid` or `asfm`;
    /// [`DaapError::SessionClosed`] after logout; otherwise whatever the
    /// request surfaced.
    pub fn open(&self) -> Result<MediaStream, DaapError> {
        let session = self.database.session;
        if session.is_closed() {
            return Err(DaapError::SessionClosed);
        }
        let db = self.database.id().ok_or(DaapError::Missing("miid"))?;
        let id = self.id().ok_or(DaapError::Missing("miid"))?;
        let format = self.format().ok_or(DaapError::Missing("asfm"))?;

        let request_id = session.client.next_request_id();
        debug!(track = id, request_id, "opening media stream");

        let sid = session.id.to_string();
        let resp = session.client.request_raw(
            &format!("/databases/{db}/items/{id}.{format}"),
            &[("session-id", &sid)],
        )?;
        Ok(MediaStream { resp })
    }
}

/// A single-pass byte stream over one track's media data.
///
/// Implements [`Read`]; [`copy_to`](Self::copy_to) drains it in
/// [`MEDIA_CHUNK_SIZE`] chunks.
#[derive(Debug)]
pub struct MediaStream {
    resp: reqwest::blocking::Response,
}

impl MediaStream {
    /// The `Content-Length` the server advertised, if any.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.resp.content_length()
    }

    /// Copy the whole stream into `writer`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// [`DaapError::Io`] on read or write failure; the stream is dead after
    /// an error.
    pub fn copy_to<W: Write>(&mut self, writer: &mut W) -> Result<u64, DaapError> {
        let mut buf = vec![0u8; MEDIA_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = self.resp.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }
    }
}

impl Read for MediaStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.resp.read(buf)
    }
}
