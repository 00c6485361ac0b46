//! codec for the persistent `FSMN` index extension.
//!
//! ```text
//! u32  version           (1 or 2, big-endian)
//! if version == 1: u64 token_nanos (ascii decimal in memory)
//! if version == 2: c-string token  (NUL-terminated, arbitrary bytes)
//! u32  bitmap_bytes
//! bytes[bitmap_bytes] compressed bitmap payload
//! ```
//!
//! `store` always emits version 2; `load` accepts both.

use crate::error::{BitResult, FsmError};
use roaring::RoaringBitmap;
use std::convert::TryInto;
use std::io::Write;

const MIN_EXTENSION_LEN: usize = 4 + 1 + 4;

/// parses the `FSMN` extension payload, returning the token and the bitmap of dirty
/// entry positions it encodes. `entry_count` is the live index's entry count; a bitmap
/// claiming a higher bit size than that is rejected (our invariant excludes split-index
/// composition, where a wider assertion would be needed instead).
pub fn read_extension(data: &[u8], entry_count: usize) -> BitResult<(String, RoaringBitmap)> {
    if data.len() < MIN_EXTENSION_LEN {
        return Err(FsmError::Corrupt("too short").into());
    }

    let version = u32::from_be_bytes(data[0..4].try_into().unwrap());
    let mut offset = 4;

    let token = match version {
        1 => {
            if data.len() < offset + 8 {
                return Err(FsmError::Corrupt("too short").into());
            }
            let nanos = u64::from_be_bytes(data[offset..offset + 8].try_into().unwrap());
            offset += 8;
            nanos.to_string()
        }
        2 => {
            let nul = data[offset..]
                .iter()
                .position(|&b| b == 0)
                .ok_or(FsmError::Corrupt("unterminated token"))?;
            let token = String::from_utf8_lossy(&data[offset..offset + nul]).into_owned();
            offset += nul + 1;
            token
        }
        _ => return Err(FsmError::Corrupt("bad version").into()),
    };

    if data.len() < offset + 4 {
        return Err(FsmError::Corrupt("too short").into());
    }
    let bitmap_bytes = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
    offset += 4;

    let payload = data.get(offset..offset + bitmap_bytes).ok_or(FsmError::Corrupt("too short"))?;
    let mut cursor = payload;
    let bitmap = RoaringBitmap::deserialize_from(&mut cursor)
        .map_err(|_| FsmError::Corrupt("bitmap parse"))?;
    if cursor.len() != 0 {
        return Err(FsmError::Corrupt("bitmap parse").into());
    }

    if let Some(max) = bitmap.max() {
        ensure!(
            (max as usize) < entry_count,
            "fsmonitor extension bitmap references entry {} but index only has {} entries",
            max,
            entry_count
        );
    }

    Ok((token, bitmap))
}

/// serializes `token` and `bitmap` as a version-2 `FSMN` extension payload.
pub fn write_extension(token: &str, bitmap: &RoaringBitmap) -> BitResult<Vec<u8>> {
    let mut out = Vec::new();
    out.write_all(&2u32.to_be_bytes())?;
    out.write_all(token.as_bytes())?;
    out.write_all(&[0u8])?;

    let mut bitmap_bytes = Vec::new();
    bitmap.serialize_into(&mut bitmap_bytes)?;

    out.write_all(&(bitmap_bytes.len() as u32).to_be_bytes())?;
    out.write_all(&bitmap_bytes)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_version_2_extension() -> BitResult<()> {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(0);
        bitmap.insert(4);
        bitmap.insert(5);

        let encoded = write_extension("deadbeef", &bitmap)?;
        let (token, decoded) = read_extension(&encoded, 6)?;
        assert_eq!(token, "deadbeef");
        assert_eq!(decoded, bitmap);
        Ok(())
    }

    #[test]
    fn upgrades_a_version_1_token_to_decimal_nanos() -> BitResult<()> {
        let mut buf = vec![];
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&1_234_567_890u64.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());

        let (token, bitmap) = read_extension(&buf, 0)?;
        assert_eq!(token, "1234567890");
        assert!(bitmap.is_empty());

        let reencoded = write_extension(&token, &bitmap)?;
        let (token2, bitmap2) = read_extension(&reencoded, 0)?;
        assert_eq!(token2, token);
        assert_eq!(bitmap2, bitmap);
        Ok(())
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert!(read_extension(&[0, 0, 0, 2], 0).is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut buf = vec![];
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        assert!(read_extension(&buf, 0).is_err());
    }

    #[test]
    fn rejects_bitmap_wider_than_the_index() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(10);
        let encoded = write_extension("tok", &bitmap).unwrap();
        assert!(read_extension(&encoded, 2).is_err());
    }
}
