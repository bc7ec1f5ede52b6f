use anyhow::{bail, ensure, Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rstar::RTree;

use crate::geom::{BBox, BoundingBox};

const MAGIC: u8 = 0xfb;
const VERSION: u8 = 3;
const HEADER_SIZE: usize = 8;
const DEFAULT_NODE_SIZE: u16 = 16;

/// Coordinate array types, numbered as in the packed Hilbert R-tree header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayType {
    Float32 = 7,
    Float64 = 8,
}

impl ArrayType {
    fn from_code(code: u8) -> Result<Self> {
        match code {
            7 => Ok(Self::Float32),
            8 => Ok(Self::Float64),
            other => bail!("Unsupported index coordinate array type {other}"),
        }
    }

    #[inline]
    fn size(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

/// Total number of nodes (leaves included) of a packed tree.
fn num_nodes(num_items: usize, node_size: usize) -> usize {
    let mut n = num_items;
    let mut total = n;
    loop {
        n = n.div_ceil(node_size);
        total += n;
        if n == 1 { break total }
    }
}

/// Static spatial index from bounding boxes to bundle ids.
///
/// Parsed once from the dataset's packed Hilbert R-tree blob and never
/// mutated afterwards.
#[derive(Debug)]
pub struct BundleIndex {
    rtree: RTree<BoundingBox>,
    len: usize,
}

impl BundleIndex {
    /// Index over `boxes`, where bundle `i` covers `boxes[i]`.
    pub fn new(boxes: &[BBox]) -> Self {
        let leaves = boxes.iter()
            .enumerate()
            .map(|(id, bbox)| BoundingBox::new(id, *bbox))
            .collect();
        Self { rtree: RTree::bulk_load(leaves), len: boxes.len() }
    }

    /// Parse a packed Hilbert R-tree blob. Leaf entries map to bundle ids.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= HEADER_SIZE, "Index blob too short: {} bytes", bytes.len());
        let mut buf = bytes;

        let magic = buf.get_u8();
        ensure!(magic == MAGIC, "Index blob has bad magic byte {magic:#04x}");
        let version_and_type = buf.get_u8();
        let version = version_and_type >> 4;
        ensure!(version == VERSION, "Unsupported index version {version}, expected {VERSION}");
        let array_type = ArrayType::from_code(version_and_type & 0x0f)?;
        let node_size = buf.get_u16_le().max(2) as usize;
        let num_items = buf.get_u32_le() as usize;
        ensure!(num_items > 0, "Index blob contains no items");

        let num_nodes = num_nodes(num_items, node_size);
        let index_size = if num_nodes < 16384 { 2 } else { 4 };
        let expected = HEADER_SIZE + num_nodes * 4 * array_type.size() + num_nodes * index_size;
        ensure!(
            bytes.len() >= expected,
            "Index blob truncated: {} bytes, expected {expected} for {num_items} items",
            bytes.len()
        );

        let mut coords = Vec::with_capacity(num_items * 4);
        for _ in 0..num_items * 4 {
            coords.push(match array_type {
                ArrayType::Float32 => buf.get_f32_le() as f64,
                ArrayType::Float64 => buf.get_f64_le(),
            });
        }

        let mut ids = &bytes[HEADER_SIZE + num_nodes * 4 * array_type.size()..];
        let mut leaves = Vec::with_capacity(num_items);
        for chunk in coords.chunks_exact(4) {
            let id = if index_size == 2 { ids.get_u16_le() as usize } else { ids.get_u32_le() as usize };
            leaves.push(BoundingBox::new(id, BBox::new(chunk[0], chunk[1], chunk[2], chunk[3])));
        }

        Ok(Self { rtree: RTree::bulk_load(leaves), len: num_items })
    }

    /// Serialize as a packed Hilbert R-tree blob (Float64 coordinates) with
    /// leaves in bundle id order.
    pub fn encode(boxes: &[BBox]) -> Result<Bytes> {
        ensure!(!boxes.is_empty(), "Cannot encode an empty index");
        let num_items = u32::try_from(boxes.len()).context("Too many index items")?;
        let node_size = DEFAULT_NODE_SIZE as usize;
        let num_nodes = num_nodes(boxes.len(), node_size);

        // Level by level: each parent covers up to node_size consecutive children
        // and points at the position of its first child.
        let mut nodes: Vec<(BBox, usize)> = boxes.iter().copied().enumerate().map(|(i, b)| (b, i)).collect();
        let mut level_start = 0;
        while nodes.len() < num_nodes {
            let level_end = nodes.len();
            let mut pos = level_start;
            while pos < level_end {
                let end = (pos + node_size).min(level_end);
                let bbox = nodes[pos..end].iter()
                    .map(|(b, _)| *b)
                    .reduce(|a, b| a.union(&b))
                    .context("Empty index node")?;
                nodes.push((bbox, pos * 4));
                pos = end;
            }
            level_start = level_end;
        }

        let index_size = if num_nodes < 16384 { 2 } else { 4 };
        let mut out = BytesMut::with_capacity(HEADER_SIZE + num_nodes * (32 + index_size));
        out.put_u8(MAGIC);
        out.put_u8((VERSION << 4) | ArrayType::Float64 as u8);
        out.put_u16_le(DEFAULT_NODE_SIZE);
        out.put_u32_le(num_items);
        for (b, _) in &nodes {
            out.put_f64_le(b.min_x);
            out.put_f64_le(b.min_y);
            out.put_f64_le(b.max_x);
            out.put_f64_le(b.max_y);
        }
        for &(_, idx) in &nodes {
            if index_size == 2 {
                out.put_u16_le(u16::try_from(idx).context("Index node offset overflow")?);
            } else {
                out.put_u32_le(u32::try_from(idx).context("Index node offset overflow")?);
            }
        }
        Ok(out.freeze())
    }

    /// Ids of bundles whose bounds intersect `bbox`, ascending.
    pub fn search(&self, bbox: &BBox) -> Vec<usize> {
        let mut ids: Vec<usize> = self.rtree
            .locate_in_envelope_intersecting(&bbox.envelope())
            .map(BoundingBox::idx)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Bounds of one bundle.
    pub fn bounds(&self, id: usize) -> Option<BBox> {
        self.rtree.iter().find(|b| b.idx() == id).map(|b| *b.bbox())
    }

    #[inline] pub fn len(&self) -> usize { self.len }

    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }
}
