#![allow(dead_code)]

//! DMAP byte fixtures: hand-framed atoms for mock server bodies.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Frame one atom: `code | length:u32be | payload`.
pub fn atom(code: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = code.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn container(code: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    atom(code, &children.concat())
}

pub fn string(code: &[u8; 4], value: &str) -> Vec<u8> {
    atom(code, value.as_bytes())
}

pub fn int(code: &[u8; 4], value: u32) -> Vec<u8> {
    atom(code, &value.to_be_bytes())
}

pub fn short(code: &[u8; 4], value: u16) -> Vec<u8> {
    atom(code, &value.to_be_bytes())
}

pub fn version(code: &[u8; 4], major: u16, minor: u16) -> Vec<u8> {
    let mut payload = major.to_be_bytes().to_vec();
    payload.extend_from_slice(&minor.to_be_bytes());
    atom(code, &payload)
}

/// One `mdcl` dictionary entry of a content-codes response.
pub fn dict_entry(code: &str, name: &str, kind: u16) -> Vec<u8> {
    container(
        b"mdcl",
        &[
            string(b"mcnm", code),
            string(b"mcna", name),
            short(b"mcty", kind),
        ],
    )
}

/// A `/content-codes` body defining every code the tests exercise, the way
/// a real server describes its whole vocabulary up front.
pub fn content_codes_body() -> Vec<u8> {
    let entries = [
        ("msrv", "dmap.serverinforesponse", 12),
        ("mlog", "dmap.loginresponse", 12),
        ("mupd", "dmap.updateresponse", 12),
        ("avdb", "daap.serverdatabases", 12),
        ("adbs", "daap.databasesongs", 12),
        ("aply", "daap.databaseplaylists", 12),
        ("apso", "daap.playlistsongs", 12),
        ("mlcl", "dmap.listing", 12),
        ("mlit", "dmap.listingitem", 12),
        ("apro", "daap.protocolversion", 11),
        ("mlid", "dmap.sessionid", 5),
        ("musr", "dmap.serverrevision", 5),
        ("miid", "dmap.itemid", 5),
        ("mimc", "dmap.itemcount", 5),
        ("minm", "dmap.itemname", 9),
        ("asar", "daap.songartist", 9),
        ("asal", "daap.songalbum", 9),
        ("asfm", "daap.songformat", 9),
        ("astm", "daap.songtime", 5),
        ("astz", "daap.songsize", 5),
    ];
    let mut children = vec![int(b"mstt", 200)];
    for (code, name, kind) in entries {
        children.push(dict_entry(code, name, kind));
    }
    container(b"mccr", &children)
}

/// A `/server-info` body advertising the given protocol version.
pub fn server_info_body(major: u16, minor: u16) -> Vec<u8> {
    container(
        b"msrv",
        &[
            int(b"mstt", 200),
            version(b"apro", major, minor),
            string(b"minm", "Mock Library"),
        ],
    )
}

/// A `/login` body issuing the given session id.
pub fn login_body(session_id: u32) -> Vec<u8> {
    container(b"mlog", &[int(b"mstt", 200), int(b"mlid", session_id)])
}

/// An `/update` body carrying the given server revision.
pub fn update_body(revision: u32) -> Vec<u8> {
    container(b"mupd", &[int(b"mstt", 200), int(b"musr", revision)])
}

/// A `/databases` body publishing one database.
pub fn databases_body(id: u32, name: &str) -> Vec<u8> {
    container(
        b"avdb",
        &[
            int(b"mstt", 200),
            container(
                b"mlcl",
                &[container(b"mlit", &[int(b"miid", id), string(b"minm", name)])],
            ),
        ],
    )
}

/// A track row: `(id, name, artist, album, format, time_ms)`.
pub type TrackRow<'a> = (u32, &'a str, &'a str, &'a str, &'a str, u32);

fn track_rows(rows: &[TrackRow<'_>]) -> Vec<u8> {
    let items: Vec<Vec<u8>> = rows
        .iter()
        .map(|(id, name, artist, album, format, time)| {
            container(
                b"mlit",
                &[
                    int(b"miid", *id),
                    string(b"minm", name),
                    string(b"asar", artist),
                    string(b"asal", album),
                    string(b"asfm", format),
                    int(b"astm", *time),
                ],
            )
        })
        .collect();
    container(b"mlcl", &items)
}

/// A `/databases/{id}/items` body listing the given tracks.
pub fn tracks_body(rows: &[TrackRow<'_>]) -> Vec<u8> {
    container(b"adbs", &[int(b"mstt", 200), track_rows(rows)])
}

/// A `/databases/{db}/containers/{pl}/items` body listing the given tracks.
pub fn playlist_tracks_body(rows: &[TrackRow<'_>]) -> Vec<u8> {
    container(b"apso", &[int(b"mstt", 200), track_rows(rows)])
}

/// A `/databases/{id}/containers` body publishing the given playlists as
/// `(id, name, count)` rows.
pub fn playlists_body(rows: &[(u32, &str, u32)]) -> Vec<u8> {
    let items: Vec<Vec<u8>> = rows
        .iter()
        .map(|(id, name, count)| {
            container(
                b"mlit",
                &[
                    int(b"miid", *id),
                    string(b"minm", name),
                    int(b"mimc", *count),
                ],
            )
        })
        .collect();
    container(
        b"aply",
        &[int(b"mstt", 200), container(b"mlcl", &items)],
    )
}

/// gzip a body the way a server would.
pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).expect("gzip write");
    encoder.finish().expect("gzip finish")
}
