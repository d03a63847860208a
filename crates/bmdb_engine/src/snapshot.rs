//! Committed snapshots and their on-disk encoding.
//!
//! A snapshot is an immutable view of every container. Trees are shared
//! through `Arc`, so a write transaction clones the snapshot cheaply and
//! copies only the trees it modifies.

use crate::engine::ContainerId;
use crate::error::{EngineError, EngineResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Magic bytes for the snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"BMDB";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Ordered key/value tree of one container.
pub(crate) type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// One named container.
#[derive(Debug, Clone)]
pub(crate) struct Container {
    pub(crate) name: String,
    pub(crate) tree: Arc<Tree>,
}

/// A point-in-time view of the environment.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    /// ID of the write transaction that produced this snapshot.
    pub(crate) txid: u64,
    /// Next container ID to hand out.
    pub(crate) next_id: u32,
    /// Containers by ID.
    pub(crate) containers: BTreeMap<u32, Container>,
    /// Container IDs by name.
    pub(crate) names: BTreeMap<String, u32>,
    /// Sum of key and value lengths across all containers.
    pub(crate) used_bytes: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            txid: 0,
            next_id: 1,
            containers: BTreeMap::new(),
            names: BTreeMap::new(),
            used_bytes: 0,
        }
    }
}

impl Snapshot {
    /// Looks up a container ID by name.
    pub(crate) fn find(&self, name: &str) -> Option<ContainerId> {
        self.names.get(name).copied().map(ContainerId::new)
    }

    /// Returns the tree behind `id`. The root container is synthesized from
    /// the container names.
    pub(crate) fn tree(&self, id: ContainerId) -> EngineResult<Arc<Tree>> {
        if id == ContainerId::ROOT {
            let root: Tree = self
                .names
                .keys()
                .map(|name| (name.as_bytes().to_vec(), Vec::new()))
                .collect();
            return Ok(Arc::new(root));
        }
        self.containers
            .get(&id.as_u32())
            .map(|c| Arc::clone(&c.tree))
            .ok_or(EngineError::BadContainer(id.as_u32()))
    }

    /// Returns a mutable tree, copying it if a reader still shares it.
    pub(crate) fn tree_mut(&mut self, id: ContainerId) -> EngineResult<&mut Tree> {
        if id == ContainerId::ROOT {
            return Err(EngineError::Incompatible("the root container is read-only"));
        }
        self.containers
            .get_mut(&id.as_u32())
            .map(|c| Arc::make_mut(&mut c.tree))
            .ok_or(EngineError::BadContainer(id.as_u32()))
    }

    /// Creates an empty container and returns its ID.
    pub(crate) fn create(&mut self, name: &str) -> ContainerId {
        let id = self.next_id;
        self.next_id += 1;
        self.containers.insert(
            id,
            Container {
                name: name.to_string(),
                tree: Arc::new(Tree::new()),
            },
        );
        self.names.insert(name.to_string(), id);
        ContainerId::new(id)
    }

    /// Removes a container entirely.
    pub(crate) fn remove(&mut self, id: ContainerId) -> EngineResult<()> {
        let container = self
            .containers
            .remove(&id.as_u32())
            .ok_or(EngineError::BadContainer(id.as_u32()))?;
        self.used_bytes -= payload_of(&container.tree);
        self.names.remove(&container.name);
        Ok(())
    }

    /// Number of named containers.
    pub(crate) fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Encodes the snapshot to bytes.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.used_bytes as usize);

        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.txid.to_le_bytes());
        buf.extend_from_slice(&self.next_id.to_le_bytes());
        buf.extend_from_slice(&(self.containers.len() as u32).to_le_bytes());

        for (id, container) in &self.containers {
            let name = container.name.as_bytes();
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name);
            buf.extend_from_slice(&(container.tree.len() as u64).to_le_bytes());
            for (key, value) in container.tree.iter() {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value);
            }
        }

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a snapshot, verifying magic, version and checksum.
    pub(crate) fn decode(data: &[u8]) -> EngineResult<Self> {
        if data.len() < 4 + 2 + 8 + 4 + 4 + 4 {
            return Err(EngineError::Corrupted("snapshot file too short".into()));
        }

        let (body, crc_bytes) = data.split_at(data.len() - 4);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(EngineError::Corrupted(format!(
                "checksum mismatch: expected {expected:08x}, got {actual:08x}"
            )));
        }

        let mut reader = Reader::new(body);
        if reader.take(4)? != SNAPSHOT_MAGIC {
            return Err(EngineError::Corrupted("bad magic".into()));
        }
        let version = reader.u16()?;
        if version != SNAPSHOT_VERSION {
            return Err(EngineError::Corrupted(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let mut snapshot = Snapshot {
            txid: reader.u64()?,
            next_id: reader.u32()?,
            ..Snapshot::default()
        };

        let count = reader.u32()?;
        for _ in 0..count {
            let id = reader.u32()?;
            let name_len = reader.u16()? as usize;
            let name = String::from_utf8(reader.take(name_len)?.to_vec())
                .map_err(|_| EngineError::Corrupted("container name is not UTF-8".into()))?;
            if id == 0 || id >= snapshot.next_id {
                return Err(EngineError::Corrupted(format!(
                    "container id {id} out of range"
                )));
            }

            let entries = reader.u64()?;
            let mut tree = Tree::new();
            for _ in 0..entries {
                let key_len = reader.u32()? as usize;
                let key = reader.take(key_len)?.to_vec();
                let value_len = reader.u32()? as usize;
                let value = reader.take(value_len)?.to_vec();
                snapshot.used_bytes += (key.len() + value.len()) as u64;
                tree.insert(key, value);
            }

            snapshot.names.insert(name.clone(), id);
            snapshot.containers.insert(
                id,
                Container {
                    name,
                    tree: Arc::new(tree),
                },
            );
        }

        if !reader.is_empty() {
            return Err(EngineError::Corrupted("trailing bytes after snapshot".into()));
        }
        Ok(snapshot)
    }
}

/// Sum of key and value lengths of one tree.
pub(crate) fn payload_of(tree: &Tree) -> u64 {
    tree.iter()
        .map(|(k, v)| (k.len() + v.len()) as u64)
        .sum()
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> EngineResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| EngineError::Corrupted(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> EngineResult<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        let id = snapshot.create("users");
        snapshot
            .tree_mut(id)
            .unwrap()
            .insert(b"alice".to_vec(), b"1".to_vec());
        snapshot.used_bytes += 6;
        snapshot.create("empty");
        snapshot.txid = 9;
        snapshot
    }

    #[test]
    fn decode_restores_containers() {
        let snapshot = sample();
        let decoded = Snapshot::decode(&snapshot.encode()).unwrap();

        assert_eq!(decoded.txid, 9);
        assert_eq!(decoded.next_id, 3);
        assert_eq!(decoded.used_bytes, 6);
        let users = decoded.find("users").unwrap();
        assert_eq!(
            decoded.tree(users).unwrap().get(b"alice".as_slice()),
            Some(&b"1".to_vec())
        );
        assert!(decoded.find("empty").is_some());
    }

    #[test]
    fn corrupted_byte_is_detected() {
        let mut bytes = sample().encode();
        bytes[10] ^= 0xFF;
        assert!(matches!(
            Snapshot::decode(&bytes),
            Err(EngineError::Corrupted(_))
        ));
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(Snapshot::decode(b"BMDB").is_err());
    }

    #[test]
    fn root_tree_lists_names() {
        let snapshot = sample();
        let root = snapshot.tree(ContainerId::ROOT).unwrap();
        let names: Vec<&[u8]> = root.keys().map(Vec::as_slice).collect();
        assert_eq!(names, vec![b"empty".as_slice(), b"users".as_slice()]);
    }

    #[test]
    fn root_tree_is_not_writable() {
        let mut snapshot = sample();
        assert!(matches!(
            snapshot.tree_mut(ContainerId::ROOT),
            Err(EngineError::Incompatible(_))
        ));
    }

    #[test]
    fn remove_releases_name_and_bytes() {
        let mut snapshot = sample();
        let users = snapshot.find("users").unwrap();
        snapshot.remove(users).unwrap();

        assert!(snapshot.find("users").is_none());
        assert_eq!(snapshot.used_bytes, 0);
        assert!(matches!(
            snapshot.tree(users),
            Err(EngineError::BadContainer(_))
        ));
    }
}
