//! Little-endian reads over byte slices. Out-of-range reads yield `None`.

pub(crate) fn to_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

pub(crate) fn to_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

pub(crate) fn to_u64(bytes: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(at..at + 8)?.try_into().ok()?))
}

/// Sector and table indexes are stored as 32-bit values.
pub(crate) fn to_usize(bytes: &[u8], at: usize) -> Option<usize> {
    to_u32(bytes, at).and_then(|value| usize::try_from(value).ok())
}

/// Every complete 4-byte word of `bytes`; a trailing partial word is ignored.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes
        .chunks_exact(4)
        .filter_map(|chunk| chunk.try_into().ok())
        .map(u32::from_le_bytes)
        .filter_map(|value| usize::try_from(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_little_endian_values() {
        let bytes = [0x34, 0x12, 0x78, 0x56, 0x00, 0x00, 0x00, 0x80];
        assert_eq!(to_u16(&bytes, 0), Some(0x1234));
        assert_eq!(to_u32(&bytes, 0), Some(0x5678_1234));
        assert_eq!(to_u64(&bytes, 0), Some(0x8000_0000_5678_1234));
        assert_eq!(to_usize(&bytes, 4), Some(0x8000_0000));
    }

    #[test]
    fn short_slices_yield_none() {
        assert_eq!(to_u16(&[1], 0), None);
        assert_eq!(to_u32(&[1, 2, 3, 4], 1), None);
        assert_eq!(to_u64(&[], 0), None);
    }

    #[test]
    fn word_iteration_drops_the_partial_tail() {
        let words: Vec<usize> = to_usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0, 9]).collect();
        assert_eq!(words, vec![1, 2]);
    }
}
