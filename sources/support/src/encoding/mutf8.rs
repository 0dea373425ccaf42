use anyhow::{anyhow, Result};

/// Encode a string into the modified UTF-8 form used by `CONSTANT_Utf8` entries.
pub fn encode_modified_utf8(str: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(str.len());

    for unit in str.encode_utf16() {
        match unit {
            0x0001..=0x007F => bytes.push(unit as u8),
            0x0000..=0x07FF => {
                bytes.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }

    bytes
}

fn decode_units(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    let continuation = |at: usize| -> Result<u16> {
        let byte = *bytes
            .get(at)
            .ok_or(anyhow!("truncated sequence at byte {at}"))?;
        if byte & 0xC0 != 0x80 {
            return Err(anyhow!("invalid continuation byte {byte:#04x} at {at}"));
        }
        Ok((byte & 0x3F) as u16)
    };

    while i < bytes.len() {
        let byte = bytes[i];
        if byte == 0 || byte >= 0xF0 {
            return Err(anyhow!("invalid leading byte {byte:#04x} at {i}"));
        }

        if byte & 0x80 == 0 {
            units.push(byte as u16);
            i += 1;
        } else if byte & 0xE0 == 0xC0 {
            units.push((((byte & 0x1F) as u16) << 6) | continuation(i + 1)?);
            i += 2;
        } else if byte & 0xF0 == 0xE0 {
            units.push(
                (((byte & 0x0F) as u16) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?,
            );
            i += 3;
        } else {
            return Err(anyhow!("invalid leading byte {byte:#04x} at {i}"));
        }
    }

    Ok(units)
}

/// Decode modified UTF-8 bytes, failing on malformed sequences or unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let units = decode_units(bytes)?;
    Ok(String::from_utf16(&units)?)
}

/// Decode for display purposes. Malformed input is replaced rather than rejected.
pub fn decode_modified_utf8_lossy(bytes: &[u8]) -> String {
    match decode_units(bytes) {
        Ok(units) => String::from_utf16_lossy(&units),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_modified_utf8, encode_modified_utf8};

    #[test]
    fn it_encodes_ascii_verbatim() {
        assert_eq!(encode_modified_utf8("java/lang/Object"), b"java/lang/Object");
    }

    #[test]
    fn it_encodes_nul_as_two_bytes() {
        assert_eq!(encode_modified_utf8("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
    }

    #[test]
    fn it_encodes_supplementary_chars_as_surrogates() {
        let encoded = encode_modified_utf8("\u{1F600}");
        assert_eq!(encoded, vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "\u{1F600}");
    }

    #[test]
    fn it_decodes_what_it_encodes() {
        for str in ["", "x$rc", "caf\u{e9}", "\u{4e2d}\u{6587}", "nul\0inside"] {
            assert_eq!(decode_modified_utf8(&encode_modified_utf8(str)).unwrap(), str);
        }
    }

    #[test]
    fn it_rejects_raw_nul_bytes() {
        assert!(decode_modified_utf8(&[b'a', 0x00]).is_err());
    }

    #[test]
    fn it_rejects_truncated_sequences() {
        assert!(decode_modified_utf8(&[0xE4, 0xB8]).is_err());
    }
}
