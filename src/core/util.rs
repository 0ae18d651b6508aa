// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// The smallest number divisible by `align_to` and at least `num`.
/// Precondition: `align_to` is a power of 2.
/// Precondition: `num` + `align_to` < usize::MAX + 1.
#[inline]
pub fn align_to(num: usize, align_to: usize) -> usize {
    let agn = align_to - 1;

    (num + agn) & !agn
}

/// Return the portion of the slice before the first \0, or the whole slice
/// if it contains no \0.
pub fn slice_to_null(slc: &[u8]) -> &[u8] {
    slc.iter()
        .position(|c| *c == b'\0')
        .map_or(slc, |i| &slc[..i])
}

/// Read N bytes at `offset`, or None if the slice is too short.
fn read_array<const N: usize>(slc: &[u8], offset: usize) -> Option<[u8; N]> {
    slc.get(offset..offset.checked_add(N)?)
        .and_then(|bytes| bytes.try_into().ok())
}

/// Read a host-order u32 at `offset`.
pub fn read_ne_u32(slc: &[u8], offset: usize) -> Option<u32> {
    read_array(slc, offset).map(u32::from_ne_bytes)
}

/// Read a host-order i32 at `offset`.
pub fn read_ne_i32(slc: &[u8], offset: usize) -> Option<i32> {
    read_array(slc, offset).map(i32::from_ne_bytes)
}

/// Read a host-order u64 at `offset`.
pub fn read_ne_u64(slc: &[u8], offset: usize) -> Option<u64> {
    read_array(slc, offset).map(u64::from_ne_bytes)
}

/// Read a fixed-width byte array at `offset`.
pub fn read_ne_bytes<const N: usize>(slc: &[u8], offset: usize) -> Option<[u8; N]> {
    read_array(slc, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 8), 0);
        assert_eq!(align_to(1, 8), 8);
        assert_eq!(align_to(8, 8), 8);
        assert_eq!(align_to(21, 8), 24);
    }

    #[test]
    fn test_slice_to_null() {
        assert_eq!(slice_to_null(b"linear\0\0\0"), b"linear");
        assert_eq!(slice_to_null(b"\0abc"), b"");
        assert_eq!(slice_to_null(b"abc"), b"abc");
    }

    #[test]
    fn test_read_bounds() {
        let buf = 7u32.to_ne_bytes();
        assert_eq!(read_ne_u32(&buf, 0), Some(7));
        assert_eq!(read_ne_u32(&buf, 1), None);
        assert_eq!(read_ne_u64(&buf, 0), None);
        assert_eq!(read_ne_u32(&buf, usize::MAX), None);
    }
}
