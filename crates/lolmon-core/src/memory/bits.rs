//! Bit and formatting helpers for register values

/// Value with only bit `n` set; zero when `n` is out of range
pub fn bit(n: u32) -> u32 {
    1u32.checked_shl(n).unwrap_or(0)
}

/// Value with the low `n` bits set
pub fn mask(n: u32) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1u32 << n) - 1
    }
}

const HEXDUMP_WIDTH: usize = 16;

/// Format `data` as a classic hex dump, offsets starting at zero
pub fn hexdump(data: &[u8]) -> String {
    hexdump_at(0, data)
}

/// Format `data` as a hex dump with offsets starting at `base`.
///
/// ```text
/// 00001000:  48 65 6c 6c 6f 00 01 02  03 04 05 06 07 08 09 0a  Hello...........
/// ```
pub fn hexdump_at(base: u32, data: &[u8]) -> String {
    let mut out = String::new();

    for (row, chunk) in data.chunks(HEXDUMP_WIDTH).enumerate() {
        if row > 0 {
            out.push('\n');
        }
        let offset = base.wrapping_add((row * HEXDUMP_WIDTH) as u32);
        out.push_str(&format!("{:08x}: ", offset));

        for i in 0..HEXDUMP_WIDTH {
            if i == HEXDUMP_WIDTH / 2 {
                out.push(' ');
            }
            match chunk.get(i) {
                Some(b) => out.push_str(&format!(" {:02x}", b)),
                None => out.push_str("   "),
            }
        }

        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bit_and_mask() {
        assert_eq!(bit(0), 1);
        assert_eq!(bit(31), 0x8000_0000);
        assert_eq!(bit(32), 0);
        assert_eq!(mask(0), 0);
        assert_eq!(mask(4), 0xf);
        assert_eq!(mask(32), u32::MAX);
    }

    #[test]
    fn test_hexdump_partial_row() {
        let dump = hexdump(b"Hi\x00");
        assert!(dump.starts_with("00000000:  48 69 00   "));
        assert!(dump.ends_with("   Hi."));
        // Offset, 16 byte columns with the mid gap, separator and ASCII
        assert_eq!(dump.len(), 10 + 16 * 3 + 1 + 2 + 3);
    }

    #[test]
    fn test_hexdump_rows_and_offsets() {
        let data: Vec<u8> = (0u8..20).collect();
        let dump = hexdump_at(0x1000, &data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00001000:  00 01 02 03 04 05 06 07  08 09"));
        assert!(lines[1].starts_with("00001010:  10 11 12 13"));
    }
}
