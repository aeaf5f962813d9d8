//! Snapshot codec.
//!
//! Layout before compression (all integers little-endian):
//!
//! ```text
//! magic "GDBSNAP\0" | u32 format version
//! u32 node count  | node*
//! u32 edge count  | edge*
//! u32 op count    | op*
//! u32 tombstone count | (str id | u64 timestamp)*
//! u8 has clear mark   | u64 timestamp (only when set)
//!
//! node = str id | u64 timestamp | u64 version | json data | json meta
//! edge = str id | str from | str to | u64 timestamp | json data
//! op   = u8 tag (1 put, 2 link, 3 remove, 4 clear) | payload
//! str / json = u32 length | bytes
//! ```
//!
//! The framed bytes are then compressed with zstd.

use std::io::Cursor;

use serde_json::{Map, Value};

use crate::{
    errors::GraphDbError,
    graph::{EdgeRecord, GraphState, NodeRecord},
    oplog::Operation,
};

pub const MAGIC_BYTES: [u8; 8] = *b"GDBSNAP\0";
pub const FORMAT_VERSION: u32 = 2;
const COMPRESSION_LEVEL: i32 = 3;

const TAG_PUT: u8 = 1;
const TAG_LINK: u8 = 2;
const TAG_REMOVE: u8 = 3;
const TAG_CLEAR: u8 = 4;

/// Decoded contents of a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub oplog: Vec<Operation>,
    /// Remove timestamps per node id, oldest first.
    pub tombstones: Vec<(String, u64)>,
    pub cleared: Option<u64>,
}

/// Encodes and compresses the full state. Records are written in id order so the
/// same state always yields the same bytes.
pub fn encode_state(state: &GraphState) -> Result<Vec<u8>, GraphDbError> {
    let mut nodes: Vec<&NodeRecord> = state.nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let mut edges: Vec<&EdgeRecord> = state.edges().collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    let ops: Vec<&Operation> = state.oplog().iter().collect();
    let tombstones: Vec<(&str, u64)> = state.tombstones().collect();
    encode_parts(&nodes, &edges, &ops, &tombstones, state.cleared)
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, GraphDbError> {
    let nodes: Vec<&NodeRecord> = snapshot.nodes.iter().collect();
    let edges: Vec<&EdgeRecord> = snapshot.edges.iter().collect();
    let ops: Vec<&Operation> = snapshot.oplog.iter().collect();
    let tombstones: Vec<(&str, u64)> = snapshot
        .tombstones
        .iter()
        .map(|(id, ts)| (id.as_str(), *ts))
        .collect();
    encode_parts(&nodes, &edges, &ops, &tombstones, snapshot.cleared)
}

fn encode_parts(
    nodes: &[&NodeRecord],
    edges: &[&EdgeRecord],
    ops: &[&Operation],
    tombstones: &[(&str, u64)],
    cleared: Option<u64>,
) -> Result<Vec<u8>, GraphDbError> {
    let mut enc = Encoder::default();
    enc.bytes_raw(&MAGIC_BYTES);
    enc.u32(FORMAT_VERSION);
    enc.len(nodes.len())?;
    for node in nodes {
        enc.node(node)?;
    }
    enc.len(edges.len())?;
    for edge in edges {
        enc.edge(edge)?;
    }
    enc.len(ops.len())?;
    for op in ops {
        enc.operation(op)?;
    }
    enc.len(tombstones.len())?;
    for (id, timestamp) in tombstones {
        enc.str(id)?;
        enc.u64(*timestamp);
    }
    match cleared {
        Some(timestamp) => {
            enc.u8(1);
            enc.u64(timestamp);
        }
        None => enc.u8(0),
    }
    zstd::stream::encode_all(Cursor::new(enc.buf), COMPRESSION_LEVEL)
        .map_err(|e| GraphDbError::codec(format!("zstd encode failed: {e}")))
}

/// Decompresses and decodes a snapshot. Any truncation, bad magic, unknown tag or
/// trailing garbage is reported as [`GraphDbError::Codec`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, GraphDbError> {
    let raw = zstd::stream::decode_all(Cursor::new(bytes))
        .map_err(|e| GraphDbError::codec(format!("zstd decode failed: {e}")))?;
    let mut dec = Decoder::new(&raw);
    let magic = dec.take(MAGIC_BYTES.len())?;
    if magic != MAGIC_BYTES {
        return Err(GraphDbError::codec("bad snapshot magic"));
    }
    let version = dec.u32()?;
    if version != FORMAT_VERSION {
        return Err(GraphDbError::codec(format!(
            "unsupported snapshot version {version}"
        )));
    }
    let mut snapshot = Snapshot::default();
    for _ in 0..dec.u32()? {
        snapshot.nodes.push(dec.node()?);
    }
    for _ in 0..dec.u32()? {
        snapshot.edges.push(dec.edge()?);
    }
    for _ in 0..dec.u32()? {
        snapshot.oplog.push(dec.operation()?);
    }
    for _ in 0..dec.u32()? {
        snapshot.tombstones.push((dec.str()?, dec.u64()?));
    }
    snapshot.cleared = match dec.u8()? {
        0 => None,
        1 => Some(dec.u64()?),
        flag => return Err(GraphDbError::codec(format!("bad clear flag {flag}"))),
    };
    if !dec.is_done() {
        return Err(GraphDbError::codec(format!(
            "{} trailing bytes after snapshot",
            dec.remaining()
        )));
    }
    Ok(snapshot)
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn bytes_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn len(&mut self, len: usize) -> Result<(), GraphDbError> {
        let len = u32::try_from(len)
            .map_err(|_| GraphDbError::codec(format!("length {len} exceeds u32")))?;
        self.u32(len);
        Ok(())
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<(), GraphDbError> {
        self.len(bytes.len())?;
        self.bytes_raw(bytes);
        Ok(())
    }

    fn str(&mut self, s: &str) -> Result<(), GraphDbError> {
        self.bytes(s.as_bytes())
    }

    fn json(&mut self, value: &Value) -> Result<(), GraphDbError> {
        let payload = serde_json::to_vec(value).map_err(|e| GraphDbError::codec(e.to_string()))?;
        self.bytes(&payload)
    }

    fn meta(&mut self, meta: &Map<String, Value>) -> Result<(), GraphDbError> {
        if meta.is_empty() {
            return self.len(0);
        }
        let payload = serde_json::to_vec(meta).map_err(|e| GraphDbError::codec(e.to_string()))?;
        self.bytes(&payload)
    }

    fn node(&mut self, node: &NodeRecord) -> Result<(), GraphDbError> {
        self.str(&node.id)?;
        self.u64(node.timestamp);
        self.u64(node.version);
        self.json(&node.data)?;
        self.meta(&node.meta)
    }

    fn edge(&mut self, edge: &EdgeRecord) -> Result<(), GraphDbError> {
        self.str(&edge.id)?;
        self.str(&edge.from)?;
        self.str(&edge.to)?;
        self.u64(edge.timestamp);
        self.json(&edge.data)
    }

    fn operation(&mut self, op: &Operation) -> Result<(), GraphDbError> {
        match op {
            Operation::Put { node } => {
                self.u8(TAG_PUT);
                self.node(node)
            }
            Operation::Link { edge } => {
                self.u8(TAG_LINK);
                self.edge(edge)
            }
            Operation::Remove { id, timestamp } => {
                self.u8(TAG_REMOVE);
                self.str(id)?;
                self.u64(*timestamp);
                Ok(())
            }
            Operation::Clear { timestamp } => {
                self.u8(TAG_CLEAR);
                self.u64(*timestamp);
                Ok(())
            }
        }
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_done(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], GraphDbError> {
        if self.remaining() < n {
            return Err(GraphDbError::codec(format!(
                "truncated snapshot: wanted {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, GraphDbError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, GraphDbError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, GraphDbError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> Result<&'a [u8], GraphDbError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn str(&mut self) -> Result<String, GraphDbError> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|e| GraphDbError::codec(e.to_string()))
    }

    fn json(&mut self) -> Result<Value, GraphDbError> {
        serde_json::from_slice(self.bytes()?).map_err(|e| GraphDbError::codec(e.to_string()))
    }

    fn meta(&mut self) -> Result<Map<String, Value>, GraphDbError> {
        let raw = self.bytes()?;
        if raw.is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_slice(raw).map_err(|e| GraphDbError::codec(e.to_string()))
    }

    fn node(&mut self) -> Result<NodeRecord, GraphDbError> {
        Ok(NodeRecord {
            id: self.str()?,
            timestamp: self.u64()?,
            version: self.u64()?,
            data: self.json()?,
            meta: self.meta()?,
        })
    }

    fn edge(&mut self) -> Result<EdgeRecord, GraphDbError> {
        Ok(EdgeRecord {
            id: self.str()?,
            from: self.str()?,
            to: self.str()?,
            timestamp: self.u64()?,
            data: self.json()?,
        })
    }

    fn operation(&mut self) -> Result<Operation, GraphDbError> {
        match self.u8()? {
            TAG_PUT => Ok(Operation::Put { node: self.node()? }),
            TAG_LINK => Ok(Operation::Link { edge: self.edge()? }),
            TAG_REMOVE => Ok(Operation::Remove {
                id: self.str()?,
                timestamp: self.u64()?,
            }),
            TAG_CLEAR => Ok(Operation::Clear {
                timestamp: self.u64()?,
            }),
            tag => Err(GraphDbError::codec(format!("unknown operation tag {tag}"))),
        }
    }
}
