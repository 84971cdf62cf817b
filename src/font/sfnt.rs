//! Minimal sfnt table access: enough to identify a face and pick a
//! collection member without a full parse.

const TTC_TAG: &[u8; 4] = b"ttcf";

pub(crate) fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn is_collection(data: &[u8]) -> bool {
    data.get(..4) == Some(TTC_TAG.as_slice())
}

/// Offsets of each member's table directory in a TrueType collection.
pub fn collection_offsets(data: &[u8]) -> Option<Vec<u32>> {
    if !is_collection(data) {
        return None;
    }
    let count = be_u32(data, 8)? as usize;
    (0..count).map(|i| be_u32(data, 12 + i * 4)).collect()
}

/// Member index whose table directory starts at `member_offset`.
/// Unknown offsets resolve to the first member.
pub fn ttc_index(data: &[u8], member_offset: u32) -> u32 {
    collection_offsets(data)
        .and_then(|offsets| offsets.iter().position(|&o| o == member_offset))
        .map_or(0, |i| i as u32)
}

/// Wrapping sum of the first 256 little-endian words, used to key
/// collections in the face cache.
pub fn collection_checksum(data: &[u8]) -> u32 {
    data.chunks_exact(4)
        .take(256)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0u32, |sum, w| sum.wrapping_add(w))
}

/// Table directory offset of face `index`.
pub fn face_offset(data: &[u8], index: u32) -> Option<usize> {
    if is_collection(data) {
        collection_offsets(data)?
            .get(index as usize)
            .map(|&o| o as usize)
    } else if index == 0 {
        Some(0)
    } else {
        None
    }
}

/// Locates a table of the face whose directory starts at `face`.
pub fn find_table<'a>(data: &'a [u8], face: usize, tag: &[u8; 4]) -> Option<&'a [u8]> {
    let count = be_u16(data, face + 4)? as usize;
    for i in 0..count {
        let record = face + 12 + i * 16;
        if data.get(record..record + 4)? == tag.as_slice() {
            let offset = be_u32(data, record + 8)? as usize;
            let length = be_u32(data, record + 12)? as usize;
            return data.get(offset..offset.checked_add(length)?);
        }
    }
    None
}

/// Reads a name record, preferring the Macintosh Roman entry and falling
/// back to a Windows Unicode one.
pub fn name_string(data: &[u8], face: usize, name_id: u16) -> Option<String> {
    let table = find_table(data, face, b"name")?;
    let count = be_u16(table, 2)? as usize;
    let storage = be_u16(table, 4)? as usize;
    let mut windows = None;
    for i in 0..count {
        let record = 6 + i * 12;
        let platform = be_u16(table, record)?;
        let encoding = be_u16(table, record + 2)?;
        let id = be_u16(table, record + 6)?;
        if id != name_id {
            continue;
        }
        let length = be_u16(table, record + 8)? as usize;
        let offset = storage + be_u16(table, record + 10)? as usize;
        let Some(bytes) = table.get(offset..offset + length) else {
            continue;
        };
        match (platform, encoding) {
            (1, 0) => return Some(bytes.iter().map(|&b| b as char).collect()),
            (3, 0) | (3, 1) if windows.is_none() => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                windows = String::from_utf16(&units).ok();
            }
            _ => {}
        }
    }
    windows
}

/// `ulCodePageRange1` of the OS/2 table, when the table is long enough
/// to carry it.
pub fn os2_code_page_range(data: &[u8], face: usize) -> Option<u32> {
    let table = find_table(data, face, b"OS/2")?;
    if table.len() < 86 {
        return None;
    }
    be_u32(table, 78)
}

/// Whether the `gasp` table allows grayscale rendering at `ppem`.
/// `None` when the face has no usable table.
pub fn gasp_allows_gray(data: &[u8], face: usize, ppem: u16) -> Option<bool> {
    const GASP_DOGRAY: u16 = 0x0002;
    let table = find_table(data, face, b"gasp")?;
    let count = be_u16(table, 2)? as usize;
    for i in 0..count {
        let max_ppem = be_u16(table, 4 + i * 4)?;
        if ppem <= max_ppem {
            return Some(be_u16(table, 6 + i * 4)? & GASP_DOGRAY != 0);
        }
    }
    None
}
