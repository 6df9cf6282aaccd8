// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The content-code registry.
//!
//! DMAP tags are opaque four-byte codes; their names and wire types are
//! published by the server itself under `/content-codes`. The registry starts
//! from a bootstrap set that is just large enough to parse that response,
//! then [`ingest`](ContentCodes::ingest)s it to learn everything else the
//! server will ever send. A few servers declare a code with the wrong type;
//! those get a fixed override after ingest.

use std::collections::HashMap;

use tracing::debug;

use crate::client::DaapError;
use crate::dmap::{code_str, Atom, Code};

/// Wire data types, as carried in `dmap.contentcodestype` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Str,
    Timestamp,
    Version,
    Container,
}

impl DataType {
    /// Map a wire type tag (1..=12) to a [`DataType`].
    #[must_use]
    pub fn from_wire(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => DataType::I8,
            2 => DataType::U8,
            3 => DataType::I16,
            4 => DataType::U16,
            5 => DataType::I32,
            6 => DataType::U32,
            7 => DataType::I64,
            8 => DataType::U64,
            9 => DataType::Str,
            10 => DataType::Timestamp,
            11 => DataType::Version,
            12 => DataType::Container,
            _ => return None,
        })
    }
}

/// Codes whose server-declared type is known to be wrong. Applied after
/// ingest, keyed by symbolic name.
const FUDGED_TYPES: [(&str, DataType); 1] = [("dmap.authenticationschemes", DataType::I8)];

#[derive(Debug, Clone)]
struct CodeEntry {
    name: String,
    kind: DataType,
}

/// Mapping from four-byte tag to `(symbolic name, data type)`.
///
/// One registry per [`Client`](crate::Client): it is filled during the
/// connect handshake and read-only afterwards. Re-inserting a tag overwrites
/// the previous definition, so ingesting twice is harmless.
#[derive(Debug, Clone)]
pub struct ContentCodes {
    map: HashMap<Code, CodeEntry>,
}

impl ContentCodes {
    /// The bootstrap set: exactly the codes needed to parse the
    /// `/content-codes` response that teaches us all the others.
    #[must_use]
    pub fn bootstrap() -> Self {
        let mut codes = Self {
            map: HashMap::new(),
        };
        codes.insert(*b"mccr", "dmap.contentcodesresponse", DataType::Container);
        codes.insert(*b"mstt", "dmap.status", DataType::U32);
        codes.insert(*b"mdcl", "dmap.dictionary", DataType::Container);
        codes.insert(*b"mcnm", "dmap.contentcodesnumber", DataType::Str);
        codes.insert(*b"mcna", "dmap.contentcodesname", DataType::Str);
        codes.insert(*b"mcty", "dmap.contentcodestype", DataType::U16);
        codes
    }

    /// Register (or redefine) a tag.
    pub fn insert(&mut self, code: Code, name: impl Into<String>, kind: DataType) {
        self.map.insert(
            code,
            CodeEntry {
                name: name.into(),
                kind,
            },
        );
    }

    /// Symbolic name and data type of a tag, if learned.
    #[must_use]
    pub fn lookup(&self, code: Code) -> Option<(&str, DataType)> {
        self.map.get(&code).map(|e| (e.name.as_str(), e.kind))
    }

    /// Data type of a tag, if learned.
    #[must_use]
    pub fn kind_of(&self, code: Code) -> Option<DataType> {
        self.map.get(&code).map(|e| e.kind)
    }

    /// Number of learned tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing has been learned (never the case after
    /// [`bootstrap`](Self::bootstrap)).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Learn the server's dictionary from a decoded `/content-codes`
    /// response.
    ///
    /// Each `dmap.dictionary` child contributes one tag: its four-byte code
    /// (`mcnm`, carried as a 4-character string), its name (`mcna`) and its
    /// wire type (`mcty`). Entries with an unrecognized type value default to
    /// string; entries missing any of the three fields are skipped. The
    /// fudge overrides are applied last.
    ///
    /// # Errors
    ///
    /// [`DaapError::Protocol`] if the root is not
    /// `dmap.contentcodesresponse`, or a top-level child is neither
    /// `dmap.status` nor `dmap.dictionary`, or a dictionary contains a
    /// foreign code.
    pub fn ingest(&mut self, root: &Atom) -> Result<(), DaapError> {
        if root.code != *b"mccr" {
            return Err(DaapError::Protocol(format!(
                "content-codes response rooted at {} instead of mccr",
                code_str(root.code)
            )));
        }

        for child in root.children() {
            match &child.code {
                b"mstt" => {}
                b"mdcl" => self.ingest_dictionary(child)?,
                other => {
                    return Err(DaapError::Protocol(format!(
                        "unexpected code {} in content-codes response",
                        code_str(*other)
                    )))
                }
            }
        }

        for (name, kind) in FUDGED_TYPES {
            if let Some(entry) = self.map.values_mut().find(|e| e.name == name) {
                entry.kind = kind;
            }
        }
        Ok(())
    }

    fn ingest_dictionary(&mut self, dict: &Atom) -> Result<(), DaapError> {
        let mut code = None;
        let mut name = None;
        let mut kind = None;

        for field in dict.children() {
            match &field.code {
                b"mcnm" => code = field.value.as_str().map(str::as_bytes).map(<[u8]>::to_vec),
                b"mcna" => name = field.value.as_str().map(str::to_owned),
                b"mcty" => {
                    let tag = field.value.as_u32().unwrap_or(0);
                    kind = Some(DataType::from_wire(tag as u16).unwrap_or_else(|| {
                        debug!(
                            tag,
                            name = name.as_deref().unwrap_or("?"),
                            "unknown data type in content-codes entry, defaulting to string"
                        );
                        DataType::Str
                    }));
                }
                other => {
                    return Err(DaapError::Protocol(format!(
                        "unexpected code {} in content-codes dictionary",
                        code_str(*other)
                    )))
                }
            }
        }

        match (code, name, kind) {
            (Some(code), Some(name), Some(kind)) => {
                let code: Code = match code.as_slice().try_into() {
                    Ok(code) => code,
                    Err(_) => {
                        debug!(name = %name, "content-codes entry with a non-4-byte tag, skipping");
                        return Ok(());
                    }
                };
                self.insert(code, name, kind);
            }
            _ => debug!("incomplete content-codes entry, skipping"),
        }
        Ok(())
    }
}
