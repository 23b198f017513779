//! On-disk page frame codec.
//!
//! Every slot in a table file holds one frame:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       1     category tag
//! 1       4     CRC32 of the frame (little-endian)
//! 5       ...   category-specific payload
//! ```
//!
//! The checksum is computed over the whole frame with the checksum field
//! itself zeroed, so it can be verified without special handling. All
//! multi-byte integers are little-endian. Inter-page links are stored as
//! slot numbers plus category tags (the table id comes from the frame's
//! own identity), so the pointer graph survives a restart.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageCategory, PageKey, Result};
use crate::storage::page::{
    HeaderPage, InternalPage, LeafPage, Page, PageBody, RootPointerPage, SLOTS_PER_HEADER,
};
use crate::storage::tuple::{Field, Tuple};

const OFFSET_TAG: usize = 0;
const OFFSET_CHECKSUM: usize = 1;
const OFFSET_PAYLOAD: usize = 5;

/// Sentinel slot number for "no page" in optional links.
const NO_PAGE: u32 = u32::MAX;

/// Encode a page into a frame, checksum included.
pub fn encode_page(page: &Page) -> Result<[u8; PAGE_SIZE]> {
    let mut frame = [0u8; PAGE_SIZE];
    frame[OFFSET_TAG] = page.key().category as u8;

    let mut w = Writer::new(&mut frame, OFFSET_PAYLOAD);
    match page.body() {
        PageBody::Leaf(leaf) => encode_leaf(&mut w, leaf)?,
        PageBody::Internal(node) => encode_internal(&mut w, node)?,
        PageBody::RootPointer(ptr) => encode_root_pointer(&mut w, ptr)?,
        PageBody::Header(header) => encode_header(&mut w, header)?,
    }

    let checksum = frame_checksum(&frame);
    frame[OFFSET_CHECKSUM..OFFSET_CHECKSUM + 4].copy_from_slice(&checksum.to_le_bytes());
    Ok(frame)
}

/// Decode a frame read from disk into the page identified by `key`.
///
/// Verifies the checksum and that the stored category tag matches the
/// requested identity; a tag mismatch means the requested identity does
/// not exist at that slot.
pub fn decode_page(key: PageKey, frame: &[u8; PAGE_SIZE]) -> Result<Page> {
    let stored = u32::from_le_bytes([
        frame[OFFSET_CHECKSUM],
        frame[OFFSET_CHECKSUM + 1],
        frame[OFFSET_CHECKSUM + 2],
        frame[OFFSET_CHECKSUM + 3],
    ]);
    if stored != frame_checksum(frame) {
        return Err(Error::Corrupted("page frame checksum mismatch"));
    }

    match PageCategory::from_u8(frame[OFFSET_TAG]) {
        Some(tag) if tag == key.category => {}
        _ => return Err(Error::PageNotFound(key)),
    }

    let mut r = Reader::new(frame, OFFSET_PAYLOAD);
    let body = match key.category {
        PageCategory::Leaf => PageBody::Leaf(decode_leaf(&mut r, key)?),
        PageCategory::Internal => PageBody::Internal(decode_internal(&mut r, key)?),
        PageCategory::RootPointer => PageBody::RootPointer(decode_root_pointer(&mut r, key)?),
        PageCategory::Header => PageBody::Header(decode_header(&mut r)?),
    };
    Ok(Page::new(key, body))
}

fn frame_checksum(frame: &[u8; PAGE_SIZE]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&frame[..OFFSET_CHECKSUM]);
    hasher.update(&[0u8; 4]);
    hasher.update(&frame[OFFSET_CHECKSUM + 4..]);
    hasher.finalize()
}

// ============================================================================
// Payload codecs
// ============================================================================

fn encode_leaf(w: &mut Writer<'_>, leaf: &LeafPage) -> Result<()> {
    w.put_link(leaf.parent())?;
    w.put_opt_page_no(leaf.left_sibling().map(|k| k.page_no))?;
    w.put_opt_page_no(leaf.right_sibling().map(|k| k.page_no))?;

    let arity = leaf.tuples().first().map_or(0, Tuple::arity);
    w.put_u16(arity as u16)?;
    w.put_u16(leaf.num_tuples() as u16)?;
    for tuple in leaf.tuples() {
        if tuple.arity() != arity {
            return Err(Error::Invariant("leaf holds tuples of mixed arity"));
        }
        for field in tuple.fields() {
            w.put_i64(field.0)?;
        }
    }
    Ok(())
}

fn decode_leaf(r: &mut Reader<'_>, key: PageKey) -> Result<LeafPage> {
    let parent = r.get_link(key)?;
    let left = r
        .get_opt_page_no()?
        .map(|no| PageKey::new(key.table, no, PageCategory::Leaf));
    let right = r
        .get_opt_page_no()?
        .map(|no| PageKey::new(key.table, no, PageCategory::Leaf));

    let arity = r.get_u16()? as usize;
    let count = r.get_u16()? as usize;
    let mut tuples = Vec::with_capacity(count);
    for _ in 0..count {
        let mut fields = Vec::with_capacity(arity);
        for _ in 0..arity {
            fields.push(Field(r.get_i64()?));
        }
        tuples.push(Tuple::new(fields));
    }

    let mut leaf = LeafPage::from_parts(parent, left, right, tuples);
    leaf.renumber(key);
    Ok(leaf)
}

fn encode_internal(w: &mut Writer<'_>, node: &InternalPage) -> Result<()> {
    w.put_link(node.parent())?;
    w.put_u16(node.num_entries() as u16)?;
    w.put_u16(node.children().len() as u16)?;
    for child in node.children() {
        w.put_u32(child.page_no)?;
        w.put_u8(child.category as u8)?;
    }
    for key in node.keys() {
        w.put_i64(key.0)?;
    }
    Ok(())
}

fn decode_internal(r: &mut Reader<'_>, key: PageKey) -> Result<InternalPage> {
    let parent = r.get_link(key)?;
    let key_count = r.get_u16()? as usize;
    let child_count = r.get_u16()? as usize;
    if child_count != 0 && child_count != key_count + 1 {
        return Err(Error::Corrupted("internal page keys/children out of step"));
    }

    let mut children = Vec::with_capacity(child_count);
    for _ in 0..child_count {
        let page_no = r.get_u32()?;
        let category = PageCategory::from_u8(r.get_u8()?)
            .ok_or(Error::Corrupted("unknown child page category"))?;
        children.push(PageKey::new(key.table, page_no, category));
    }
    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        keys.push(Field(r.get_i64()?));
    }

    Ok(InternalPage::from_parts(parent, keys, children))
}

fn encode_root_pointer(w: &mut Writer<'_>, ptr: &RootPointerPage) -> Result<()> {
    w.put_u32(ptr.root().page_no)?;
    w.put_u8(ptr.root().category as u8)
}

fn decode_root_pointer(r: &mut Reader<'_>, key: PageKey) -> Result<RootPointerPage> {
    let page_no = r.get_u32()?;
    let category =
        PageCategory::from_u8(r.get_u8()?).ok_or(Error::Corrupted("unknown root category"))?;
    Ok(RootPointerPage::new(PageKey::new(
        key.table, page_no, category,
    )))
}

fn encode_header(w: &mut Writer<'_>, header: &HeaderPage) -> Result<()> {
    w.put_opt_page_no(header.next_header())?;
    w.put_bytes(header.bitmap())
}

fn decode_header(r: &mut Reader<'_>) -> Result<HeaderPage> {
    let next = r.get_opt_page_no()?;
    let bitmap = r.get_bytes(SLOTS_PER_HEADER / 8)?;
    HeaderPage::from_parts(next, bitmap)
}

// ============================================================================
// Cursor helpers
// ============================================================================

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8], pos: usize) -> Self {
        Writer { buf, pos }
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(Error::Invariant("encoded page exceeds frame size"));
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put_bytes(&[v])
    }

    fn put_u16(&mut self, v: u16) -> Result<()> {
        self.put_bytes(&v.to_le_bytes())
    }

    fn put_u32(&mut self, v: u32) -> Result<()> {
        self.put_bytes(&v.to_le_bytes())
    }

    fn put_i64(&mut self, v: i64) -> Result<()> {
        self.put_bytes(&v.to_le_bytes())
    }

    fn put_opt_page_no(&mut self, no: Option<u32>) -> Result<()> {
        self.put_u32(no.unwrap_or(NO_PAGE))
    }

    /// A link to another page in the same table: slot number + category.
    fn put_link(&mut self, key: PageKey) -> Result<()> {
        self.put_u32(key.page_no)?;
        self.put_u8(key.category as u8)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Reader { buf, pos }
    }

    fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(Error::Corrupted("page payload truncated"));
        }
        let bytes = self.buf[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    fn get_u16(&mut self) -> Result<u16> {
        let b = self.get_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn get_u32(&mut self) -> Result<u32> {
        let b = self.get_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_i64(&mut self) -> Result<i64> {
        let b = self.get_bytes(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn get_opt_page_no(&mut self) -> Result<Option<u32>> {
        let no = self.get_u32()?;
        Ok(if no == NO_PAGE { None } else { Some(no) })
    }

    fn get_link(&mut self, key: PageKey) -> Result<PageKey> {
        let page_no = self.get_u32()?;
        let category =
            PageCategory::from_u8(self.get_u8()?).ok_or(Error::Corrupted("unknown link category"))?;
        Ok(PageKey::new(key.table, page_no, category))
    }
}
