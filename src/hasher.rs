// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `Client-DAAP-Validation` request hash.
//!
//! Every request to an iTunes share must carry a validation header: an MD5
//! digest over the request path, a fixed copyright string, and one entry of a
//! precomputed 255-entry seed table. iTunes 4.2 servers check the `v2` form
//! (stock MD5); 4.5 and later check the `v3` form, which uses the
//! [modified MD5](crate::apple_md5) and folds in the client's request
//! counter. The seed tables themselves are digests of fixed literal strings
//! chosen per bit of the table index; both the strings and the bit order are
//! part of the protocol, as recovered by libopendaap
//! (<http://crazney.net/programs/itunes/authentication.html>).
//!
//! Real clients always pass `select = 2`; the parameter exists because the
//! protocol allows any index below 255.

use md5::{Digest, Md5};
use once_cell::sync::Lazy;

use crate::apple_md5::AppleMd5;

/// Seed-table index used for every request this client issues.
pub const VALIDATION_SELECT: u8 = 2;

const COPYRIGHT: &str = "Copyright 2003 Apple Computer, Inc.";

/// Per-bit string choices for the v2 table, most significant bit first.
/// `(bit, if set, if clear)` — fed to the hash in this order.
const V2_CHOICES: [(u8, &str, &str); 8] = [
    (0x80, "Accept-Language", "user-agent"),
    (0x40, "max-age", "Authorization"),
    (0x20, "Client-DAAP-Version", "Accept-Encoding"),
    (0x10, "daap.protocolversion", "daap.songartist"),
    (0x08, "daap.songcomposer", "daap.songdatemodified"),
    (0x04, "daap.songdiscnumber", "daap.songdisabled"),
    (0x02, "playlist-item-spec", "revision-number"),
    (0x01, "session-id", "content-codes"),
];

/// Per-bit string choices for the v3 table. Bit `0x80` is consumed *last* —
/// the order is load-bearing, not a quirk to clean up.
const V3_CHOICES: [(u8, &str, &str); 8] = [
    (0x40, "eqwsdxcqwesdc", "op[;lm,piojkmn"),
    (0x20, "876trfvb 34rtgbvc", "=-0ol.,m3ewrdfv"),
    (0x10, "87654323e4rgbv ", "1535753690868867974342659792"),
    (0x08, "Song Name", "DAAP-CLIENT-ID:"),
    (0x04, "111222333444555", "4089961010"),
    (0x02, "playlist-item-spec", "revision-number"),
    (0x01, "session-id", "content-codes"),
    (0x80, "IUYHGFDCXWEDFGHN", "iuytgfdxwerfghjm"),
];

fn seed_v2_entry(i: u8) -> String {
    let mut ctx = Md5::new();
    for (bit, set, clear) in V2_CHOICES {
        ctx.update(if i & bit != 0 { set } else { clear });
    }
    hex::encode_upper(ctx.finalize())
}

fn seed_v3_entry(i: u8) -> String {
    let mut ctx = AppleMd5::new();
    for (bit, set, clear) in V3_CHOICES {
        ctx.update(if i & bit != 0 { set } else { clear });
    }
    hex::encode_upper(ctx.finalize())
}

// Indices 0..=254: the tables have 255 rows, not 256.
static SEED_V2: Lazy<Vec<String>> = Lazy::new(|| (0u8..255).map(seed_v2_entry).collect());
static SEED_V3: Lazy<Vec<String>> = Lazy::new(|| (0u8..255).map(seed_v3_entry).collect());

/// Validation hash understood by iTunes 4.2 servers.
///
/// Stock MD5 over `url || copyright || SEED_V2[select]`, rendered as 32
/// uppercase hex characters.
///
/// # Panics
///
/// Panics if `select` is 255 — the seed table has 255 entries (0..=254).
#[must_use]
pub fn hash_v2(url: &str, select: u8) -> String {
    let mut ctx = Md5::new();
    ctx.update(url);
    ctx.update(COPYRIGHT);
    ctx.update(&SEED_V2[usize::from(select)]);
    hex::encode_upper(ctx.finalize())
}

/// Validation hash understood by iTunes 4.5+ servers.
///
/// Same construction as [`hash_v2`] but with the [modified
/// MD5](crate::apple_md5) and the v3 seed table, and with the decimal ASCII
/// form of `sequence` appended when it is non-zero. `sequence` is the
/// client's `Client-DAAP-Request-ID` counter, which ties each hash to its
/// position in the request stream.
///
/// # Panics
///
/// Panics if `select` is 255 — the seed table has 255 entries (0..=254).
#[must_use]
pub fn hash_v3(url: &str, select: u8, sequence: u32) -> String {
    let mut ctx = AppleMd5::new();
    ctx.update(url);
    ctx.update(COPYRIGHT);
    ctx.update(&SEED_V3[usize::from(select)]);
    if sequence > 0 {
        ctx.update(sequence.to_string());
    }
    hex::encode_upper(ctx.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_upper_hex(s: &str) -> bool {
        s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    }

    #[test]
    fn tables_have_255_entries() {
        assert_eq!(SEED_V2.len(), 255);
        assert_eq!(SEED_V3.len(), 255);
    }

    #[test]
    fn table_entries_are_upper_hex() {
        assert!(SEED_V2.iter().all(|e| is_upper_hex(e)));
        assert!(SEED_V3.iter().all(|e| is_upper_hex(e)));
    }

    #[test]
    fn recomputing_entries_is_deterministic() {
        for i in [0u8, 1, 2, 127, 128, 254] {
            assert_eq!(seed_v2_entry(i), SEED_V2[usize::from(i)]);
            assert_eq!(seed_v3_entry(i), SEED_V3[usize::from(i)]);
        }
    }

    #[test]
    fn every_bit_changes_the_v2_entry() {
        for bit in 0..8u8 {
            assert_ne!(seed_v2_entry(0), seed_v2_entry(1 << bit), "bit {bit}");
        }
    }

    #[test]
    fn every_bit_changes_the_v3_entry() {
        for bit in 0..8u8 {
            assert_ne!(seed_v3_entry(0), seed_v3_entry(1 << bit), "bit {bit}");
        }
    }

    #[test]
    fn hash_v2_is_pure() {
        let a = hash_v2("/login", VALIDATION_SELECT);
        let b = hash_v2("/login", VALIDATION_SELECT);
        assert_eq!(a, b);
        assert!(is_upper_hex(&a));
    }

    #[test]
    fn hash_v3_is_pure() {
        let a = hash_v3("/login", VALIDATION_SELECT, 0);
        let b = hash_v3("/login", VALIDATION_SELECT, 0);
        assert_eq!(a, b);
        assert!(is_upper_hex(&a));
    }

    #[test]
    fn hash_v3_folds_in_the_sequence() {
        let url = "/databases/1/items/7.mp3?session-id=42";
        assert_ne!(hash_v3(url, 2, 0), hash_v3(url, 2, 1));
        assert_ne!(hash_v3(url, 2, 1), hash_v3(url, 2, 2));
    }

    #[test]
    fn hash_v3_differs_from_hash_v2() {
        assert_ne!(hash_v2("/login", 2), hash_v3("/login", 2, 0));
    }

    #[test]
    fn hashes_depend_on_the_url() {
        assert_ne!(hash_v2("/login", 2), hash_v2("/logout", 2));
        assert_ne!(hash_v3("/login", 2, 0), hash_v3("/logout", 2, 0));
    }

    #[test]
    fn hashes_depend_on_the_select_index() {
        assert_ne!(hash_v2("/login", 2), hash_v2("/login", 3));
        assert_ne!(hash_v3("/login", 2, 0), hash_v3("/login", 3, 0));
    }
}
