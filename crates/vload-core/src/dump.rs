use std::fmt::Write;

/// Render bytes as a hex dump, 16 bytes per line.
///
/// Each line starts with its offset in octal prefixed by `0`; bytes follow as
/// two-digit hex, grouped in pairs by a leading space. The output always ends
/// with a newline, so an empty buffer renders as `"\n"`.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + 1);
    for (i, byte) in data.iter().enumerate() {
        if i % 16 == 0 {
            let _ = write!(out, "0{:o}", i);
        }
        if i % 2 == 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
        if i % 16 == 15 {
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(hex_dump(&[]), "\n");
    }

    #[test]
    fn test_partial_line() {
        assert_eq!(hex_dump(b"abc"), "00 6162 63\n");
    }

    #[test]
    fn test_offsets_are_octal() {
        let data: Vec<u8> = (0..20).collect();
        let dump = hex_dump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(
            lines[0],
            "00 0001 0203 0405 0607 0809 0a0b 0c0d 0e0f"
        );
        assert_eq!(lines[1], "020 1011 1213");
    }
}
