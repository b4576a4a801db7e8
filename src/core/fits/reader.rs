use crate::config::args::FitsLoadArgs;
use crate::core::fits::card::{card_keyword, join_long_strings, parse_card, CARD_SIZE};
use crate::core::fits::{HduList, BLOCK_SIZE};
use crate::domain::header::Header;
use crate::domain::model::{HduKind, ImageData, ImageHdu, PixelData};
use crate::utils::error::{DatasetError, Result};
use std::io::{self, Read};

/// Reads at most one block. Returns the number of bytes read, which is
/// less than `BLOCK_SIZE` only at end of stream.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8; BLOCK_SIZE]) -> Result<usize> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

enum HeaderRead {
    Header(Header),
    EndOfStream,
}

fn read_header<R: Read>(
    reader: &mut R,
    expect_extension: bool,
    ignore_missing_end: bool,
) -> Result<HeaderRead> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut cards = Vec::new();
    let mut first_block = true;

    loop {
        let filled = read_block(reader, &mut block)?;
        if filled == 0 && first_block {
            return Ok(HeaderRead::EndOfStream);
        }
        if first_block && expect_extension && card_keyword(&block[..CARD_SIZE.min(filled)]) != "XTENSION" {
            tracing::warn!("Ignoring {} byte(s) of trailing data that is not an extension", filled);
            return Ok(HeaderRead::EndOfStream);
        }
        first_block = false;

        for record in block[..filled - filled % CARD_SIZE].chunks_exact(CARD_SIZE) {
            if card_keyword(record) == "END" {
                return Ok(HeaderRead::Header(Header::from_cards(join_long_strings(cards))));
            }
            // Blank padding cards before END carry nothing.
            if record.iter().all(|&b| b == b' ') {
                continue;
            }
            cards.push(parse_card(record)?);
        }

        if filled < BLOCK_SIZE {
            if ignore_missing_end && !cards.is_empty() {
                tracing::debug!("Header ended at end of stream without an END card");
                return Ok(HeaderRead::Header(Header::from_cards(join_long_strings(cards))));
            }
            return Err(DatasetError::codec(
                "header is missing its END card (stream ended inside the header)",
            ));
        }
    }
}

struct DataLayout {
    bitpix: i64,
    shape: Vec<usize>,
    byte_len: usize,
}

fn data_layout(header: &Header, kind: &HduKind) -> Result<DataLayout> {
    let bitpix = header
        .get_i64("BITPIX")
        .ok_or_else(|| DatasetError::codec("missing required keyword BITPIX"))?;
    if ![8, 16, 32, 64, -32, -64].contains(&bitpix) {
        return Err(DatasetError::codec(format!("unsupported BITPIX {}", bitpix)));
    }
    let naxis = header
        .get_i64("NAXIS")
        .ok_or_else(|| DatasetError::codec("missing required keyword NAXIS"))?;
    if !(0..=999).contains(&naxis) {
        return Err(DatasetError::codec(format!("invalid NAXIS {}", naxis)));
    }

    let mut shape = Vec::with_capacity(naxis as usize);
    for axis in 1..=naxis {
        let keyword = format!("NAXIS{}", axis);
        let extent = header
            .get_i64(&keyword)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| DatasetError::codec(format!("missing or negative {}", keyword)))?;
        shape.push(extent);
    }

    let count = |keyword: &str, default: i64| {
        usize::try_from(header.get_i64(keyword).unwrap_or(default).max(0))
            .map_err(|_| DatasetError::codec(format!("{} is out of range", keyword)))
    };
    let (pcount, gcount) = match kind {
        HduKind::Primary => (0, 1),
        _ => (count("PCOUNT", 0)?, count("GCOUNT", 1)?),
    };

    // Sizes come straight from the header, so every step is checked.
    let byte_len = if shape.is_empty() {
        Some(0)
    } else {
        shape
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
            .and_then(|elements| elements.checked_add(pcount))
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix.unsigned_abs() as usize / 8))
    }
    .ok_or_else(|| {
        DatasetError::codec(format!(
            "data size declared by the header overflows (BITPIX={}, shape={:?}, PCOUNT={}, GCOUNT={})",
            bitpix, shape, pcount, gcount
        ))
    })?;

    Ok(DataLayout {
        bitpix,
        shape,
        byte_len,
    })
}

fn decode_pixels(bitpix: i64, bytes: &[u8]) -> PixelData {
    match bitpix {
        8 => PixelData::U8(bytes.to_vec()),
        16 => PixelData::I16(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_be_bytes([c[0], c[1]]))
                .collect(),
        ),
        32 => PixelData::I32(
            bytes
                .chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        64 => PixelData::I64(
            bytes
                .chunks_exact(8)
                .map(|c| i64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        -32 => PixelData::F32(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        _ => PixelData::F64(
            bytes
                .chunks_exact(8)
                .map(|c| f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
    }
}

fn hdu_kind(header: &Header, index: usize) -> Result<HduKind> {
    if index == 0 {
        let first = header.cards().first().map(|card| card.keyword.to_ascii_uppercase());
        return match first.as_deref() {
            Some("SIMPLE") => Ok(HduKind::Primary),
            other => Err(DatasetError::codec(format!(
                "not a FITS file: first keyword is {:?}, expected SIMPLE",
                other.unwrap_or("")
            ))),
        };
    }
    let xtension = header
        .get_str("XTENSION")
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase();
    Ok(if xtension == "IMAGE" {
        HduKind::Image
    } else {
        HduKind::Other(xtension)
    })
}

/// Reads exactly `byte_len` bytes of data. The buffer grows with the bytes
/// actually present, never with the size the header claims.
fn read_data<R: Read>(reader: &mut R, byte_len: usize, index: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let read = reader
        .by_ref()
        .take(byte_len as u64)
        .read_to_end(&mut bytes)?;
    if read < byte_len {
        return Err(truncated(index, read, byte_len));
    }
    Ok(bytes)
}

/// Skips a data unit that is not decoded.
fn skip_data<R: Read>(reader: &mut R, byte_len: usize, index: usize) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(byte_len as u64), &mut io::sink())?;
    if skipped < byte_len as u64 {
        return Err(truncated(index, skipped as usize, byte_len));
    }
    Ok(())
}

fn truncated(index: usize, read: usize, expected: usize) -> DatasetError {
    DatasetError::codec(format!(
        "file is truncated inside the data of HDU {} ({} of {} byte(s) present)",
        index, read, expected
    ))
}

/// Skips the zero padding after a data unit. Missing padding at the very
/// end of a file is tolerated.
fn skip_padding<R: Read>(reader: &mut R, byte_len: usize) -> Result<()> {
    let padding = (BLOCK_SIZE - byte_len % BLOCK_SIZE) % BLOCK_SIZE;
    if padding > 0 {
        let mut sink = vec![0u8; padding];
        let mut filled = 0;
        while filled < padding {
            match reader.read(&mut sink[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
    }
    Ok(())
}

/// Parses every HDU in a stream. Image data is decoded; data of other
/// extension types is skipped.
pub fn read_hdu_list<R: Read>(mut reader: R, options: &FitsLoadArgs) -> Result<HduList> {
    let ignore_missing_end = options.ignore_missing_end.unwrap_or(false);
    let mut hdus = Vec::new();

    loop {
        let header = match read_header(&mut reader, !hdus.is_empty(), ignore_missing_end)? {
            HeaderRead::Header(header) => header,
            HeaderRead::EndOfStream if hdus.is_empty() => {
                return Err(DatasetError::codec("empty stream is not a FITS file"))
            }
            HeaderRead::EndOfStream => break,
        };

        let index = hdus.len();
        let kind = hdu_kind(&header, index)?;

        let layout = data_layout(&header, &kind)?;
        let data = match kind {
            HduKind::Other(_) => {
                skip_data(&mut reader, layout.byte_len, index)?;
                None
            }
            _ if layout.byte_len == 0 => None,
            _ => {
                let bytes = read_data(&mut reader, layout.byte_len, index)?;
                Some(ImageData::new(
                    layout.shape,
                    decode_pixels(layout.bitpix, &bytes),
                )?)
            }
        };
        skip_padding(&mut reader, layout.byte_len)?;
        tracing::debug!("Read HDU {} ({})", index, kind);
        hdus.push(ImageHdu { kind, header, data });
    }

    Ok(HduList::from_hdus(hdus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fits::card::{end_card, format_card};
    use crate::core::fits::VerifyOption;
    use crate::domain::header::Card;
    use crate::utils::error::ErrorKind;

    fn header_block(cards: &[Card]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for card in cards {
            bytes.extend(format_card(card).unwrap());
        }
        bytes.extend(end_card());
        let padded = bytes.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        bytes.resize(padded, b' ');
        bytes
    }

    fn primary_cards(bitpix: i64, axes: &[i64]) -> Vec<Card> {
        let mut cards = vec![
            Card::new("SIMPLE", true),
            Card::new("BITPIX", bitpix),
            Card::new("NAXIS", axes.len() as i64),
        ];
        for (axis, extent) in axes.iter().enumerate() {
            cards.push(Card::new(&format!("NAXIS{}", axis + 1), *extent));
        }
        cards
    }

    fn codec_message(bytes: &[u8]) -> String {
        let err = read_hdu_list(bytes, &FitsLoadArgs::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
        err.to_string()
    }

    #[test]
    fn test_overflowing_data_size_is_codec_error() {
        let bytes = header_block(&primary_cards(8, &[1 << 40, 1 << 40]));
        assert!(codec_message(&bytes).contains("overflows"));

        let bytes = header_block(&primary_cards(-64, &[i64::MAX]));
        assert!(codec_message(&bytes).contains("overflows"));
    }

    #[test]
    fn test_oversized_declaration_reads_only_what_is_present() {
        // Claims a terabyte; the stream holds one data block.
        let mut bytes = header_block(&primary_cards(8, &[1 << 40]));
        bytes.extend(vec![0u8; BLOCK_SIZE]);
        let message = codec_message(&bytes);
        assert!(message.contains("truncated"));
        assert!(message.contains(&format!("{} of {}", BLOCK_SIZE, 1u64 << 40)));
    }

    #[test]
    fn test_negative_axis_is_codec_error() {
        let bytes = header_block(&primary_cards(16, &[4, -2]));
        assert!(codec_message(&bytes).contains("NAXIS2"));
    }

    #[test]
    fn test_truncated_table_data_is_codec_error() {
        let mut bytes = header_block(&primary_cards(8, &[]));
        bytes.extend(header_block(&[
            Card::new("XTENSION", "BINTABLE"),
            Card::new("BITPIX", 8_i64),
            Card::new("NAXIS", 2_i64),
            Card::new("NAXIS1", 16_i64),
            Card::new("NAXIS2", 1000_i64),
            Card::new("PCOUNT", 0_i64),
            Card::new("GCOUNT", 1_i64),
        ]));
        bytes.extend(vec![1u8; 100]);
        assert!(codec_message(&bytes).contains("HDU 1"));
    }

    #[test]
    fn test_continued_string_is_joined_on_read() {
        let mut header = Vec::new();
        for card in primary_cards(8, &[]) {
            header.extend(format_card(&card).unwrap());
        }
        let first = format!("OBJECT  = '{}&'", "a".repeat(67));
        header.extend(format!("{:<80}", first).into_bytes());
        header.extend(format!("{:<80}", "CONTINUE  'bbbb'").into_bytes());
        header.extend(end_card());
        header.resize(BLOCK_SIZE, b' ');

        let list = read_hdu_list(header.as_slice(), &FitsLoadArgs::default()).unwrap();
        let header = &list.get(0).unwrap().header;
        let expected = format!("{}bbbb", "a".repeat(67));
        assert_eq!(header.get_str("OBJECT"), Some(expected.as_str()));
        assert!(!header.keywords().any(|keyword| keyword == "CONTINUE"));
    }

    mod malformed_input {
        use super::*;
        use crate::domain::header::Header;
        use crate::domain::model::{ImageData, ImageHdu, PixelData};
        use proptest::prelude::*;

        fn valid_file() -> Vec<u8> {
            let mut header = Header::new();
            header.set("OBJECT", "x".repeat(90).as_str());
            let image = ImageHdu::new(
                header,
                Some(ImageData::new(vec![3, 2], PixelData::I16(vec![1, 2, 3, 4, 5, 6])).unwrap()),
            );
            let mut bytes = Vec::new();
            HduList::from_hdus(vec![ImageHdu::primary(Header::new(), None), image])
                .write_to(&mut bytes, VerifyOption::Exception)
                .unwrap();
            bytes
        }

        fn assert_codec_or_ok(bytes: &[u8], options: &FitsLoadArgs) -> std::result::Result<(), TestCaseError> {
            if let Err(e) = read_hdu_list(bytes, options) {
                prop_assert_eq!(e.kind(), ErrorKind::Codec, "unexpected error: {}", e);
            }
            Ok(())
        }

        proptest! {
            /// Arbitrary bytes are rejected as a codec error, never a panic.
            #[test]
            fn prop_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..2 * BLOCK_SIZE)) {
                assert_codec_or_ok(&bytes, &FitsLoadArgs::default())?;
            }

            /// Corrupting any bytes of a valid file never panics.
            #[test]
            fn prop_corrupted_file(
                edits in proptest::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 1..16),
                lenient in any::<bool>(),
            ) {
                let mut bytes = valid_file();
                for (index, value) in edits {
                    let at = index.index(bytes.len());
                    bytes[at] = value;
                }
                let options = FitsLoadArgs {
                    ignore_missing_end: Some(lenient),
                    ..FitsLoadArgs::default()
                };
                assert_codec_or_ok(&bytes, &options)?;
            }

            /// Any structural values, with any amount of trailing data.
            #[test]
            fn prop_structural_values(
                bitpix in prop_oneof![Just(8i64), Just(16), Just(32), Just(64), Just(-32), Just(-64), any::<i64>()],
                axes in proptest::collection::vec(any::<i64>(), 0..4),
                tail in 0usize..2 * BLOCK_SIZE,
            ) {
                let mut bytes = header_block(&primary_cards(bitpix, &axes));
                bytes.extend(vec![0u8; tail]);
                assert_codec_or_ok(&bytes, &FitsLoadArgs::default())?;
            }

            /// Cutting a valid file short anywhere never panics.
            #[test]
            fn prop_truncated_file(cut in any::<prop::sample::Index>()) {
                let bytes = valid_file();
                let end = cut.index(bytes.len());
                assert_codec_or_ok(&bytes[..end], &FitsLoadArgs::default())?;
            }
        }
    }
}
