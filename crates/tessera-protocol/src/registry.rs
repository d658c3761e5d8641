//! The packet registry: which schema a numeric id refers to.
//!
//! Every inbound frame carries a packet id. Before a single payload byte is
//! looked at, the id is resolved here to a [`PacketInfo`]: the schema that
//! describes the payload, the largest payload that packet may legitimately
//! have, and whether the payload is compressed on the wire.
//!
//! Ids and names are both unique. Registering a second packet under an
//! existing id or name is an error rather than a silent overwrite, so two
//! message definitions can never shadow each other.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tessera_codec::RecordSchema;
use tessera_transport::MAX_PAYLOAD_SIZE;

use crate::ProtocolError;

/// Numeric packet identifier as carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PacketId(pub i32);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the codec needs to know about one packet type.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub id: PacketId,
    pub name: &'static str,
    pub schema: Arc<RecordSchema>,
    /// Largest payload accepted for this packet.
    pub max_size: usize,
    /// Whether the payload is compressed on the wire.
    pub compressed: bool,
}

impl PacketInfo {
    /// Describes an uncompressed packet named after its schema, capped at
    /// the schema's maximum encoded size.
    pub fn new(id: i32, schema: Arc<RecordSchema>) -> Self {
        Self {
            id: PacketId(id),
            name: schema.name(),
            max_size: schema.max_encoded_size().min(MAX_PAYLOAD_SIZE),
            schema,
            compressed: false,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.min(MAX_PAYLOAD_SIZE);
        self
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
}

/// Maps packet ids and names to [`PacketInfo`].
#[derive(Debug, Clone, Default)]
pub struct PacketRegistry {
    by_id: BTreeMap<PacketId, Arc<PacketInfo>>,
    by_name: HashMap<&'static str, PacketId>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a packet.
    ///
    /// # Errors
    /// - [`ProtocolError::DuplicatePacketId`] if the id is taken
    /// - [`ProtocolError::DuplicatePacketName`] if the name is taken
    /// - [`ProtocolError::MaxSizeTooSmall`] if `max_size` cannot hold the
    ///   schema's fixed block
    pub fn register(&mut self, info: PacketInfo) -> Result<(), ProtocolError> {
        if let Some(existing) = self.by_id.get(&info.id) {
            return Err(ProtocolError::DuplicatePacketId {
                id: info.id,
                existing: existing.name,
            });
        }
        if self.by_name.contains_key(info.name) {
            return Err(ProtocolError::DuplicatePacketName(info.name));
        }
        let fixed = info.schema.fixed_block_size();
        if !info.compressed && info.max_size < fixed {
            return Err(ProtocolError::MaxSizeTooSmall {
                packet: info.name,
                max: info.max_size,
                fixed,
            });
        }
        self.by_name.insert(info.name, info.id);
        self.by_id.insert(info.id, Arc::new(info));
        Ok(())
    }

    pub fn by_id(&self, id: PacketId) -> Option<&Arc<PacketInfo>> {
        self.by_id.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<PacketInfo>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// All packets in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PacketInfo>> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
