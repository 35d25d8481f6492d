//! # QOI encoder and decoder
//!
//! This module contains [`qoi_encode`] and [`qoi_decode`], a faithful
//! implementation of the format described by [`qoi.h`](https://github.com/phoboslab/qoi)
//! by Dominic Szablewski.
//!
//! ## Decode Image
//!
//! [`qoi_decode`] takes `impl Read` which must provide the bytes of a qoi
//! file and optionally a [`ChannelMode`] to force the output layout. It
//! returns a flat `Vec<u8>` of pixels in RGB or RGBA order together with the
//! [`QoiDescriptor`] read from the header.
//!
//! ## Encode Image
//!
//! [`qoi_encode`] takes a flat `&[u8]` of RGB or RGBA pixel values and a
//! [`QoiDescriptor`] and returns the encoded bytes.
use std::io::{Read, Write};

/// Describes the input pixel data.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QoiDescriptor {
    pub width: usize,
    pub height: usize,
    pub channels: ChannelMode,
    pub colorspace: Colorspace,
}

/// Rgb or Rgba mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChannelMode {
    Rgb = 3,
    Rgba = 4,
}

impl TryFrom<u8> for ChannelMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(ChannelMode::Rgb),
            4 => Ok(ChannelMode::Rgba),
            other => Err(Error::InvalidChannels(other)),
        }
    }
}

/// Colorspace used in the image. Informational only; it does not affect
/// encoding or decoding.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Colorspace {
    Srgb = 0,
    Linear = 1,
}

impl TryFrom<u8> for Colorspace {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Colorspace::Srgb),
            1 => Ok(Colorspace::Linear),
            other => Err(Error::InvalidColorspace(other)),
        }
    }
}

/// Errors produced by the codec core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("header magic is not \"qoif\": {0:?}")]
    BadMagic([u8; 4]),
    #[error("invalid channel count: {0} (must be 3 or 4)")]
    InvalidChannels(u8),
    #[error("invalid colorspace: {0} (must be 0 or 1)")]
    InvalidColorspace(u8),
    #[error("input ended before the expected number of pixels or the end marker")]
    UnexpectedEof,
    #[error("trailing bytes do not match the qoi end marker")]
    MissingEndMarker,
    #[error("width or height is zero")]
    EmptyImage,
    #[error("exceeded the maximum safe pixel count")]
    TooManyPixels,
    #[error("pixel buffer length does not match width * height * channels")]
    PixelBufferSizeMismatch,
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

fn io_result<T>(result: std::io::Result<T>) -> Result<T, Error> {
    result.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    })
}

#[derive(Copy, Clone, PartialEq, Eq)]
struct QoiRgba {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl QoiRgba {
    /// Create a new RGBA pixel from individual values.
    const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Encodes index in the pixel cache: `00xxxxxx`.
const QOI_OP_INDEX: u8 = 0x00;
/// Encodes a small delta of pixels: `01xxxxxx`.
const QOI_OP_DIFF: u8 = 0x40;
/// Encodes a luma-style delta: `10xxxxxx`.
const QOI_OP_LUMA: u8 = 0x80;
/// Encodes a run of identical pixels: `11xxxxxx`.
const QOI_OP_RUN: u8 = 0xc0;
/// Literal RGB pixel: `11111110`.
const QOI_OP_RGB: u8 = 0xfe;
/// Literal RGBA pixel: `11111111`.
const QOI_OP_RGBA: u8 = 0xff;
/// Selects only the top two bits: `11000000`.
const QOI_MASK: u8 = 0xc0;

/// Maximum run length encodable in a single QOI_OP_RUN chunk.
const QOI_RUN_MAX: u8 = 62;

/// Hash of an RGBA pixel, reduced to the cache's 6-bit index space by the caller.
const fn color_hash(pixel: QoiRgba) -> usize {
    let QoiRgba { r, g, b, a } = pixel;
    r.wrapping_mul(3) as usize
        + g.wrapping_mul(5) as usize
        + b.wrapping_mul(7) as usize
        + a.wrapping_mul(11) as usize
}

/// Size of the qoi header, in bytes.
const QOI_HEADER_SIZE: usize = 14;

/// Maximum safe pixel count.
///
/// 2GB is the max file size that this implementation can safely handle. We
/// guard against anything larger than that, assuming the worst case with 5
/// bytes per pixel, rounded down to a nice clean value. 400 million pixels
/// ought to be enough for anybody.
const QOI_PIXELS_MAX: usize = 400_000_000;
/// Size of qoi's end marker, in bytes.
const QOI_PADDING_SIZE: usize = 8;
/// The literal bytes of the qoi end marker.
const QOI_PADDING: [u8; QOI_PADDING_SIZE] = [0, 0, 0, 0, 0, 0, 0, 1];

fn check_dimensions(width: usize, height: usize) -> Result<(), Error> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage);
    }
    if height >= QOI_PIXELS_MAX / width {
        return Err(Error::TooManyPixels);
    }
    Ok(())
}

/// Encode raw RGB or RGBA pixels into a QOI image in memory.
///
/// `pixels` must be laid out in row-major, top-to-bottom, left-to-right
/// order, one `desc.channels`-sized group per pixel.
pub fn qoi_encode(pixels: &[u8], desc: &QoiDescriptor) -> Result<Vec<u8>, Error> {
    let channels = desc.channels as usize;
    if pixels.len() != desc.width * desc.height * channels {
        return Err(Error::PixelBufferSizeMismatch);
    }
    check_dimensions(desc.width, desc.height)?;

    let max_size =
        desc.width * desc.height * (channels + 1) + QOI_HEADER_SIZE + QOI_PADDING_SIZE;
    let mut bytes = Vec::with_capacity(max_size);

    bytes.write_all(b"qoif")?;
    bytes.write_all(&(desc.width as u32).to_be_bytes())?;
    bytes.write_all(&(desc.height as u32).to_be_bytes())?;
    bytes.write_all(&[desc.channels as u8, desc.colorspace as u8])?;

    let read_pixel = |pos: usize| -> QoiRgba {
        match desc.channels {
            ChannelMode::Rgba => {
                QoiRgba::new(pixels[pos], pixels[pos + 1], pixels[pos + 2], pixels[pos + 3])
            }
            ChannelMode::Rgb => QoiRgba::new(pixels[pos], pixels[pos + 1], pixels[pos + 2], 255),
        }
    };

    let mut pp = QoiRgba::new(0, 0, 0, 255);
    let mut index = [QoiRgba::new(0, 0, 0, 0); 64];

    let mut col = 0usize;
    let mut pixel_pos = 0usize;

    while pixel_pos < pixels.len() {
        let cp = read_pixel(pixel_pos);

        // The very first pixel of the stream can never start a run: `pp`'s
        // initial value is bookkeeping for hashing and diffing, not a
        // previously emitted pixel, so there is nothing yet to repeat. This
        // mirrors the same deliberate asymmetry the cache's initial alpha
        // has for QOI_OP_INDEX (see the design notes on initial cache
        // alpha): the sentinel primes comparisons without itself being a
        // legitimate match target.
        if cp == pp && pixel_pos != 0 {
            // A run never spans a scanline: it terminates at the row
            // boundary even if the next row's first pixel is also equal
            // to `pp`.
            let mut run_len: u8 = 1;
            let mut scan_col = col;
            let mut scan_pos = pixel_pos;
            while run_len < QOI_RUN_MAX && scan_col + 1 < desc.width {
                let next_pos = scan_pos + channels;
                if read_pixel(next_pos) != pp {
                    break;
                }
                run_len += 1;
                scan_col += 1;
                scan_pos = next_pos;
            }

            bytes.write_all(&[QOI_OP_RUN | (run_len - 1)])?;
            pixel_pos = scan_pos + channels;
            col = scan_col + 1;
            if col >= desc.width {
                col = 0;
            }
            continue;
        }

        let hash = color_hash(cp) % 64;

        if index[hash] == cp {
            bytes.write_all(&[QOI_OP_INDEX | hash as u8])?;
        } else {
            index[hash] = cp;

            if cp.a != pp.a {
                bytes.write_all(&[QOI_OP_RGBA, cp.r, cp.g, cp.b, cp.a])?;
            } else {
                let dr = cp.r.wrapping_sub(pp.r) as i8;
                let dg = cp.g.wrapping_sub(pp.g) as i8;
                let db = cp.b.wrapping_sub(pp.b) as i8;

                let dg_dr = dr.wrapping_sub(dg);
                let dg_db = db.wrapping_sub(dg);

                if (-2..=1).contains(&dr) && (-2..=1).contains(&dg) && (-2..=1).contains(&db) {
                    bytes.write_all(&[QOI_OP_DIFF
                        | ((dr + 2) as u8) << 4
                        | ((dg + 2) as u8) << 2
                        | ((db + 2) as u8)])?;
                } else if (-8..=7).contains(&dg_dr)
                    && (-8..=7).contains(&dg_db)
                    && (-32..=31).contains(&dg)
                {
                    bytes.write_all(&[
                        QOI_OP_LUMA | ((dg + 32) as u8),
                        ((dg_dr + 8) as u8) << 4 | ((dg_db + 8) as u8),
                    ])?;
                } else {
                    bytes.write_all(&[QOI_OP_RGB, cp.r, cp.g, cp.b])?;
                }
            }
        }

        pp = cp;
        pixel_pos += channels;
        col += 1;
        if col >= desc.width {
            col = 0;
        }
    }

    bytes.write_all(&QOI_PADDING)?;
    bytes.flush()?;
    Ok(bytes)
}

/// Decode a QOI image from `impl Read`.
///
/// Uses the channel mode from the header unless `channels` forces a
/// different output layout.
pub fn qoi_decode(
    mut data: impl Read,
    channels: Option<ChannelMode>,
) -> Result<(Vec<u8>, QoiDescriptor), Error> {
    let mut u32_buf = [0u8; 4];
    let mut u8_buf = [0u8; 1];
    macro_rules! read_u32 {
        () => {{
            io_result(data.read_exact(&mut u32_buf))?;
            u32::from_be_bytes(u32_buf)
        }};
    }
    macro_rules! read_u8 {
        () => {{
            io_result(data.read_exact(&mut u8_buf))?;
            u8_buf[0]
        }};
    }

    let mut header_magic: [u8; 4] = [0; 4];
    io_result(data.read_exact(&mut header_magic))?;
    if &header_magic != b"qoif" {
        return Err(Error::BadMagic(header_magic));
    }

    let width = read_u32!() as usize;
    let height = read_u32!() as usize;

    let header_channels = ChannelMode::try_from(read_u8!())?;
    let channels = channels.unwrap_or(header_channels);
    let colorspace = Colorspace::try_from(read_u8!())?;

    let desc = QoiDescriptor {
        width,
        height,
        channels,
        colorspace,
    };

    check_dimensions(desc.width, desc.height)?;

    let pixel_len = desc.width * desc.height * (channels as usize);
    let mut pixels = Vec::with_capacity(pixel_len);

    let mut index = [QoiRgba::new(0, 0, 0, 0); 64];
    let mut pp = QoiRgba::new(0, 0, 0, 255);

    let mut run = 0u8;
    for _ in 0..(desc.width * desc.height) {
        let cp;
        if run > 0 {
            run -= 1;
            cp = pp;
        } else {
            let op_byte = read_u8!();

            if op_byte == QOI_OP_RGB {
                cp = QoiRgba::new(read_u8!(), read_u8!(), read_u8!(), pp.a);
                index[color_hash(cp) % 64] = cp;
            } else if op_byte == QOI_OP_RGBA {
                cp = QoiRgba::new(read_u8!(), read_u8!(), read_u8!(), read_u8!());
                index[color_hash(cp) % 64] = cp;
            } else if (op_byte & QOI_MASK) == QOI_OP_INDEX {
                // Already present in the cache; no re-store needed.
                cp = index[op_byte as usize];
            } else if (op_byte & QOI_MASK) == QOI_OP_DIFF {
                let dr = ((op_byte >> 4) & 0x03) as i8 - 2;
                let dg = ((op_byte >> 2) & 0x03) as i8 - 2;
                let db = (op_byte & 0x03) as i8 - 2;
                cp = QoiRgba::new(
                    pp.r.wrapping_add_signed(dr),
                    pp.g.wrapping_add_signed(dg),
                    pp.b.wrapping_add_signed(db),
                    pp.a,
                );
                index[color_hash(cp) % 64] = cp;
            } else if (op_byte & QOI_MASK) == QOI_OP_LUMA {
                let delta_byte = read_u8!();
                let dg = (op_byte & 0x3f) as i8 - 32;
                let dr = dg - 8 + ((delta_byte >> 4) & 0x0f) as i8;
                let db = dg - 8 + (delta_byte & 0x0f) as i8;
                cp = QoiRgba::new(
                    pp.r.wrapping_add_signed(dr),
                    pp.g.wrapping_add_signed(dg),
                    pp.b.wrapping_add_signed(db),
                    pp.a,
                );
                index[color_hash(cp) % 64] = cp;
            } else {
                // (op_byte & QOI_MASK) == QOI_OP_RUN. This iteration emits
                // the first pixel of the run; `run` counts the remaining
                // `length - 1` repetitions.
                run = op_byte & 0x3f;
                cp = pp;
            }
        }

        pp = cp;

        pixels.push(cp.r);
        pixels.push(cp.g);
        pixels.push(cp.b);
        if channels as usize == 4 {
            pixels.push(cp.a);
        }
    }

    let mut end_marker = [0u8; QOI_PADDING_SIZE];
    io_result(data.read_exact(&mut end_marker))?;
    if end_marker != QOI_PADDING {
        return Err(Error::MissingEndMarker);
    }

    Ok((pixels, desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn desc(width: usize, height: usize, channels: ChannelMode) -> QoiDescriptor {
        QoiDescriptor {
            width,
            height,
            channels,
            colorspace: Colorspace::Linear,
        }
    }

    #[test]
    fn inverse_application_test() {
        let pixels = [255, 0, 0, 15, 1, 255, 255, 255, 191, 255, 0, 0, 15, 1, 74];
        let d = desc(pixels.len() / 3, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let (pixels_, _desc) = qoi_decode(Cursor::new(bytes), None).unwrap();
        assert_eq!(pixels_, pixels);
    }

    #[test]
    fn indexing_simple() {
        let pixels = [0, 0, 1, 0, 0, 0, 0, 0, 1];
        let d = desc(pixels.len() / 3, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let (pixels_, _desc) = qoi_decode(Cursor::new(bytes), None).unwrap();
        assert_eq!(pixels_, pixels);
    }

    #[test]
    fn first_pixel_zero() {
        let pixels = [0, 0, 0, 0, 0, 1];
        let d = desc(pixels.len() / 3, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let (pixels_decoded, _desc) = qoi_decode(Cursor::new(bytes), None).unwrap();
        assert_eq!(pixels_decoded, pixels);
    }

    // Scenario S1 from the format's concrete test vectors: a single black
    // RGB pixel must produce a QOI_OP_DIFF chunk of 0x6A, not an index hit.
    #[test]
    fn s1_single_black_pixel_is_diff() {
        let pixels = [0u8, 0, 0];
        let d = desc(1, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        assert_eq!(
            bytes,
            vec![
                b'q', b'o', b'i', b'f', 0, 0, 0, 1, 0, 0, 0, 1, 3, 1, 0x6A, 0, 0, 0, 0, 0, 0, 0, 1
            ]
        );
    }

    // Scenario S2: two identical pixels in a row encode as DIFF then a
    // length-1 RUN.
    #[test]
    fn s2_repeated_pixel_is_run() {
        let pixels = [0u8, 0, 0, 0, 0, 0];
        let d = desc(2, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let payload = &bytes[QOI_HEADER_SIZE..bytes.len() - QOI_PADDING_SIZE];
        assert_eq!(payload, &[0x6A, 0xC0]);
    }

    // Scenario S3: an alpha change forces a literal RGBA chunk even though
    // the pixel would otherwise be cache-eligible.
    #[test]
    fn s3_alpha_change_forces_rgba() {
        let pixels = [10u8, 20, 30, 40];
        let d = desc(1, 1, ChannelMode::Rgba);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let payload = &bytes[QOI_HEADER_SIZE..bytes.len() - QOI_PADDING_SIZE];
        assert_eq!(payload, &[0xFF, 0x0A, 0x14, 0x1E, 0x28]);
    }

    // Scenario S4: a delta too large for QOI_OP_DIFF but within the wider
    // luma ranges produces a two-byte QOI_OP_LUMA chunk.
    #[test]
    fn s4_luma_delta() {
        let pixels = [100u8, 100, 100, 125, 130, 124];
        let d = desc(2, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let payload = &bytes[QOI_HEADER_SIZE..bytes.len() - QOI_PADDING_SIZE];
        // First pixel (100,100,100) vs pp (0,0,0,255): goes to RGB literal
        // since dg=100 is out of luma range. Tag + 3 literal bytes, then the
        // luma chunk for the second pixel.
        assert_eq!(&payload[..4], &[QOI_OP_RGB, 100, 100, 100]);
        assert_eq!(&payload[4..], &[0xBE, 0x32]);
    }

    // Scenario S5: a long run of identical pixels never collapses into one
    // chunk beyond length 62; 64 repeats of the same pixel split into a
    // length-62 run and a length-1 run.
    #[test]
    fn s5_max_run_length_splits() {
        let mut pixels = vec![0u8; 3]; // a leading pixel distinct in tag from the run
        for _ in 0..64 {
            pixels.extend_from_slice(&[5, 5, 5]);
        }
        let d = desc(pixels.len() / 3, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let payload = &bytes[QOI_HEADER_SIZE..bytes.len() - QOI_PADDING_SIZE];
        // The first (5,5,5) pixel differs from pp and gets its own tag; the
        // remaining 63 repeats split into a length-62 run (0xFD) and a
        // length-1 run (0xC0), never a single length-63+ chunk.
        let run_bytes: Vec<u8> = payload
            .iter()
            .copied()
            .filter(|b| b & QOI_MASK == QOI_OP_RUN)
            .collect();
        assert_eq!(run_bytes, vec![0xFD, 0xC0]);
        let (decoded, _) = qoi_decode(Cursor::new(bytes.clone()), None).unwrap();
        assert_eq!(decoded, pixels);
    }

    // Scenario S6: a stream with a corrupted end marker must fail to decode.
    #[test]
    fn s6_missing_end_marker_errors() {
        let pixels = [1u8, 2, 3];
        let d = desc(1, 1, ChannelMode::Rgb);
        let mut bytes = qoi_encode(&pixels, &d).unwrap();
        let len = bytes.len();
        bytes[len - 1] = 0;
        let err = qoi_decode(Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(err, Error::MissingEndMarker));
    }

    #[test]
    fn run_never_spans_scanline() {
        // Two rows of width 2, each entirely (9,9,9): a flat-offset run
        // tracker with no notion of rows would emit one run covering the
        // last 3 pixels; the scanline-bounded encoder must stop the row-0
        // run at the row boundary and start a fresh run on row 1.
        let pixels = vec![9u8; 2 * 2 * 3];
        let d = desc(2, 2, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let payload = &bytes[QOI_HEADER_SIZE..bytes.len() - QOI_PADDING_SIZE];
        let run_chunks: Vec<u8> = payload
            .iter()
            .copied()
            .filter(|b| b & QOI_MASK == QOI_OP_RUN && *b != QOI_OP_RGB && *b != QOI_OP_RGBA)
            .collect();
        // row 0's second pixel is a length-1 run (0xC0); row 1 starts its
        // own length-2 run (0xC1) rather than extending row 0's.
        assert_eq!(run_chunks, vec![0xC0, 0xC1]);
        let (decoded, _) = qoi_decode(Cursor::new(bytes.clone()), None).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = qoi_encode(&[0, 0, 0], &desc(1, 1, ChannelMode::Rgb)).unwrap();
        bytes[0] = b'x';
        let err = qoi_decode(Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(err, Error::BadMagic(_)));
    }

    #[test]
    fn invalid_channels_is_rejected() {
        let mut bytes = qoi_encode(&[0, 0, 0], &desc(1, 1, ChannelMode::Rgb)).unwrap();
        bytes[12] = 5;
        let err = qoi_decode(Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(err, Error::InvalidChannels(5)));
    }

    #[test]
    fn truncated_stream_is_unexpected_eof() {
        let bytes = qoi_encode(&[0, 0, 0], &desc(1, 1, ChannelMode::Rgb)).unwrap();
        let truncated = &bytes[..bytes.len() - 4];
        let err = qoi_decode(Cursor::new(truncated), None).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }

    #[test]
    fn rgba_round_trip_with_varied_alpha() {
        let pixels: Vec<u8> = (0..16u8)
            .flat_map(|i| [i, i.wrapping_mul(7), i.wrapping_mul(13), 255 - i])
            .collect();
        let d = desc(4, 4, ChannelMode::Rgba);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let (decoded, decoded_desc) = qoi_decode(Cursor::new(bytes), None).unwrap();
        assert_eq!(decoded, pixels);
        assert_eq!(decoded_desc.channels, ChannelMode::Rgba);
    }

    #[test]
    fn forced_channel_mode_on_decode() {
        let pixels = [1u8, 2, 3, 4, 5, 6];
        let d = desc(2, 1, ChannelMode::Rgb);
        let bytes = qoi_encode(&pixels, &d).unwrap();
        let (decoded, decoded_desc) =
            qoi_decode(Cursor::new(bytes), Some(ChannelMode::Rgba)).unwrap();
        assert_eq!(decoded.len(), 2 * 4);
        assert_eq!(decoded_desc.channels, ChannelMode::Rgba);
    }
}
