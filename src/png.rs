//! Deterministic PNG output.
//!
//! Writes 8-bit RGBA images with no interlacing and filter type 0 on every
//! scanline. The IDAT stream is a zlib wrapper (CMF `0x78`, FLG `0x01`)
//! around *stored* (uncompressed) DEFLATE blocks of up to 65,535 bytes,
//! followed by the Adler-32 of the raw scanline data. Identical pixels
//! always produce identical bytes, which keeps slice reruns and chamfer
//! round-trips byte-comparable.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Largest payload of a stored DEFLATE block.
const STORED_BLOCK_MAX: usize = 65_535;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xedb8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    let mut c = crc;
    for &byte in data {
        c = CRC_TABLE[((c ^ byte as u32) & 0xff) as usize] ^ (c >> 8);
    }
    c
}

fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    let mut s1: u32 = 1;
    let mut s2: u32 = 0;
    // Defer the modulo across runs short enough not to overflow u32.
    for chunk in data.chunks(5_552) {
        for &byte in chunk {
            s1 += byte as u32;
            s2 += s1;
        }
        s1 %= MOD;
        s2 %= MOD;
    }
    s2 << 16 | s1
}

/// Append one chunk: length, type, data, CRC-32 over type+data.
fn push_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let crc = !crc32_update(crc32_update(0xffff_ffff, kind), data);
    out.extend_from_slice(&crc.to_be_bytes());
}

/// Encode an RGBA pixel buffer (4 bytes per pixel, row-major) as PNG
/// bytes. `pixels.len()` must equal `4 * width * height`.
pub fn encode_rgba_png(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    assert_eq!(pixels.len(), 4 * width as usize * height as usize);

    // Filter byte 0 in front of every scanline.
    let stride = 4 * width as usize;
    let mut raw = Vec::with_capacity((stride + 1) * height as usize);
    for row in pixels.chunks_exact(stride) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    // zlib wrapper with stored blocks only.
    let mut idat = Vec::with_capacity(raw.len() + raw.len() / STORED_BLOCK_MAX * 5 + 16);
    idat.push(0x78);
    idat.push(0x01);
    let mut blocks = raw.chunks(STORED_BLOCK_MAX).peekable();
    loop {
        let block = blocks.next().unwrap_or(&[]);
        let last = blocks.peek().is_none();
        let len = block.len() as u16;
        idat.push(last as u8);
        idat.extend_from_slice(&len.to_le_bytes());
        idat.extend_from_slice(&(!len).to_le_bytes());
        idat.extend_from_slice(block);
        if last {
            break;
        }
    }
    idat.extend_from_slice(&adler32(&raw).to_be_bytes());

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    // Bit depth 8, color type 6 (RGBA), compression 0, filter 0,
    // interlace 0.
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

    let mut out = Vec::with_capacity(idat.len() + 64);
    out.extend_from_slice(&PNG_SIGNATURE);
    push_chunk(&mut out, b"IHDR", &ihdr);
    push_chunk(&mut out, b"IDAT", &idat);
    push_chunk(&mut out, b"IEND", &[]);
    out
}

/// Write an RGBA pixel buffer to `path` as PNG.
pub fn write_rgba_png<P: AsRef<Path>>(
    path: P,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> io::Result<()> {
    let encoded = encode_rgba_png(width, height, pixels);
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&encoded)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adler32_known_values() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"abc"), 0x024d_0127);
    }

    #[test]
    fn test_signature_and_chunk_layout() {
        let png = encode_rgba_png(2, 1, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&png[..8], &PNG_SIGNATURE);
        // IHDR length 13 and type.
        assert_eq!(&png[8..12], &[0, 0, 0, 13]);
        assert_eq!(&png[12..16], b"IHDR");
        // Width 2, height 1, depth 8, color type 6 RGBA.
        assert_eq!(&png[16..24], &[0, 0, 0, 2, 0, 0, 0, 1]);
        assert_eq!(&png[24..27], &[8, 6, 0]);
        // The file ends with the fixed empty IEND chunk.
        assert_eq!(
            &png[png.len() - 12..],
            &[0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xae, 0x42, 0x60, 0x82]
        );
    }

    #[test]
    fn test_zlib_header_and_stored_block() {
        let png = encode_rgba_png(1, 1, &[9, 8, 7, 6]);
        // IDAT starts after signature + IHDR chunk (8 + 25 bytes).
        assert_eq!(&png[37..41], b"IDAT");
        let idat = &png[41..];
        assert_eq!(&idat[..2], &[0x78, 0x01]);
        // One final stored block of 5 bytes (filter byte + one pixel).
        assert_eq!(idat[2], 1);
        assert_eq!(&idat[3..7], &[5, 0, 0xfa, 0xff]);
        assert_eq!(&idat[7..12], &[0, 9, 8, 7, 6]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let pixels: Vec<u8> = (0..4 * 7 * 5).map(|i| (i % 251) as u8).collect();
        let a = encode_rgba_png(7, 5, &pixels);
        let b = encode_rgba_png(7, 5, &pixels);
        assert_eq!(a, b);
    }

    #[test]
    fn test_large_image_splits_stored_blocks() {
        // 200x100 RGBA is 80,100 raw bytes once filter bytes are added,
        // forcing a second stored block.
        let pixels = vec![0x5au8; 4 * 200 * 100];
        let png = encode_rgba_png(200, 100, &pixels);
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (200, 100));
        assert!(decoded.pixels().all(|p| p.0 == [0x5a; 4]));
    }

    #[test]
    fn test_decodes_back_to_input_pixels() {
        let pixels: Vec<u8> = (0..4 * 3 * 2).map(|i| i as u8).collect();
        let png = encode_rgba_png(3, 2, &pixels);
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.png");
        write_rgba_png(&path, 2, 2, &[0xff; 16]).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
    }
}
