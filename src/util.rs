/// Returns the padding that brings `len` up to the next 32-bit boundary.
pub(crate) fn get_padding_size(len: usize) -> usize {
    if len % 4 == 0 {
        0
    } else {
        4 - (len % 4)
    }
}

/// Writes the RTCP padding run for a body of `len` bytes; the final octet
/// carries the padding count. Assumes `buf` has room for the whole run.
pub(crate) fn put_padding(buf: &mut [u8], len: usize) {
    let padding_size = get_padding_size(len);
    for i in 0..padding_size {
        if i == padding_size - 1 {
            buf[i] = padding_size as u8;
        } else {
            buf[i] = 0;
        }
    }
}
