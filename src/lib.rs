// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # daap-client
//!
//! Rust client for **DAAP**, the Digital Audio Access Protocol iTunes uses
//! to publish a music library over HTTP (default port **3689**).
//!
//! The crate speaks the whole client side of the protocol: the DMAP
//! tagged-data codec, the content-code dictionary learned from the server at
//! connect time, the `Client-DAAP-Validation` request hash (including the
//! modified MD5 that iTunes 4.5+ requires), session management, and chunked
//! streaming of track bytes. I/O is synchronous and serial over one
//! keep-alive connection — the shape the protocol itself enforces.
//!
//! ## Quick start
//!
//! ```no_run
//! use daap_client::{Client, DEFAULT_PORT};
//!
//! # fn example() -> Result<(), daap_client::DaapError> {
//! let mut client = Client::new();
//! client.connect("192.168.1.2", DEFAULT_PORT)?;
//!
//! let session = client.login()?;
//! let library = session.library()?;
//!
//! for track in library.tracks()? {
//!     println!(
//!         "{} — {} ({})",
//!         track.artist().unwrap_or("?"),
//!         track.name().unwrap_or("?"),
//!         track.album().unwrap_or("?"),
//!     );
//! }
//!
//! // Stream a track.
//! if let Some(track) = library.tracks()?.first() {
//!     let mut stream = track.open()?;
//!     let mut out = Vec::new();
//!     stream.copy_to(&mut out)?;
//! }
//!
//! session.logout();
//! # Ok(())
//! # }
//! ```
//!
//! Password-protected shares are not supported; a share that wants
//! credentials surfaces as [`DaapError::AuthRequired`].
//!
//! ## Layers
//!
//! | Layer | Types |
//! |---|---|
//! | **Session model** | [`Client`], [`Session`], [`Database`], [`Playlist`], [`Track`], [`MediaStream`] |
//! | **DMAP codec** | [`Atom`], [`Value`], [`dmap::decode`], [`dmap::encode`] |
//! | **Content codes** | [`ContentCodes`], [`DataType`] |
//! | **Validation hash** | [`hasher::hash_v2`], [`hasher::hash_v3`] |

mod apple_md5;
mod client;
pub mod codes;
pub mod dmap;
pub mod hasher;
mod session;

pub use client::{Client, DaapError, DEFAULT_PORT};
pub use codes::{ContentCodes, DataType};
pub use dmap::{Atom, Code, Value};
pub use session::{Database, MediaStream, Playlist, Session, Track, MEDIA_CHUNK_SIZE};
