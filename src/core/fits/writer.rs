use crate::config::args::FitsSaveArgs;
use crate::core::fits::card::{end_card, format_card};
use crate::core::fits::{HduList, VerifyOption, BLOCK_SIZE};
use crate::domain::header::{Card, Header};
use crate::domain::model::{HduKind, ImageHdu, PixelData};
use crate::utils::error::{DatasetError, Result};
use std::io::Write;

fn is_structural(keyword: &str, extended: bool) -> bool {
    let keyword = keyword.to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SIMPLE" | "XTENSION" | "BITPIX" | "NAXIS" | "PCOUNT" | "GCOUNT" | "END"
    ) || (extended && keyword == "EXTEND")
        || keyword
            .strip_prefix("NAXIS")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Mandatory cards for an HDU written at `position`, derived from its data.
fn structural_cards(hdu: &ImageHdu, position: usize, total: usize) -> Vec<Card> {
    let (bitpix, shape): (i64, &[usize]) = match &hdu.data {
        Some(data) => (data.bitpix(), data.shape()),
        None => (hdu.header.get_i64("BITPIX").unwrap_or(8), &[]),
    };

    let mut cards = Vec::with_capacity(6 + shape.len());
    if position == 0 {
        cards.push(Card::new("SIMPLE", true).with_comment("conforms to FITS standard"));
    } else {
        cards.push(Card::new("XTENSION", "IMAGE").with_comment("Image extension"));
    }
    cards.push(Card::new("BITPIX", bitpix).with_comment("array data type"));
    cards.push(Card::new("NAXIS", shape.len() as i64).with_comment("number of array dimensions"));
    for (axis, &extent) in shape.iter().enumerate() {
        cards.push(Card::new(&format!("NAXIS{}", axis + 1), extent as i64));
    }
    if position == 0 {
        if total > 1 {
            cards.push(Card::new("EXTEND", true));
        }
    } else {
        cards.push(Card::new("PCOUNT", 0_i64).with_comment("number of parameters"));
        cards.push(Card::new("GCOUNT", 1_i64).with_comment("number of groups"));
    }
    cards
}

fn write_padded<W: Write>(writer: &mut W, bytes: &[u8], fill: u8) -> Result<()> {
    writer.write_all(bytes)?;
    let padding = (BLOCK_SIZE - bytes.len() % BLOCK_SIZE) % BLOCK_SIZE;
    if padding > 0 {
        writer.write_all(&vec![fill; padding])?;
    }
    Ok(())
}

fn encode_pixels(pixels: &PixelData) -> Vec<u8> {
    match pixels {
        PixelData::U8(v) => v.clone(),
        PixelData::I16(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
        PixelData::I32(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
        PixelData::I64(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
        PixelData::F32(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
        PixelData::F64(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
    }
}

fn write_hdu<W: Write>(writer: &mut W, hdu: &ImageHdu, position: usize, total: usize) -> Result<()> {
    if let HduKind::Other(xtension) = &hdu.kind {
        return Err(DatasetError::codec(format!(
            "cannot write a {} extension, only image HDUs are supported",
            xtension
        )));
    }

    let mut header_bytes = Vec::new();
    for card in structural_cards(hdu, position, total) {
        header_bytes.extend(format_card(&card)?);
    }
    for card in hdu
        .header
        .cards()
        .iter()
        .filter(|card| !is_structural(&card.keyword, position == 0))
    {
        header_bytes.extend(format_card(card)?);
    }
    header_bytes.extend(end_card());
    write_padded(writer, &header_bytes, b' ')?;

    if let Some(data) = &hdu.data {
        write_padded(writer, &encode_pixels(data.pixels()), 0)?;
    }
    Ok(())
}

impl HduList {
    /// Serialises every HDU. The first HDU is written as the primary HDU
    /// whatever its kind; later ones become image extensions.
    pub fn write_to<W: Write>(&self, writer: &mut W, output_verify: VerifyOption) -> Result<()> {
        if self.is_empty() {
            return Err(DatasetError::codec("cannot write an empty HDU list"));
        }
        let total = self.len();
        for (position, hdu) in self.iter().enumerate() {
            let mut checked = hdu.clone();
            checked.verify_cards(output_verify)?;
            write_hdu(writer, &checked, position, total)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ImageHdu {
    /// Writes this HDU as a complete file. An image extension is preceded
    /// by an empty primary HDU, so it lands at index 1.
    pub fn write_to<W: Write>(&self, writer: &mut W, options: &FitsSaveArgs) -> Result<()> {
        let output_verify = options.output_verify.unwrap_or_default();
        let list = match self.kind {
            HduKind::Primary => HduList::from_hdus(vec![self.clone()]),
            _ => HduList::from_hdus(vec![
                ImageHdu::primary(Header::new(), None),
                self.clone(),
            ]),
        };
        list.write_to(writer, output_verify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::args::FitsLoadArgs;
    use crate::core::fits::card::CARD_SIZE;
    use crate::core::fits::open;
    use crate::domain::model::ImageData;

    fn f32_image() -> ImageHdu {
        let mut header = Header::new();
        header.set("TELESCOP", "SDO/AIA");
        header.set("NAXIS1", 99_i64);
        header.add_history("synthetic");
        let data = ImageData::new(vec![3, 2], PixelData::F32(vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5]))
            .unwrap();
        ImageHdu::new(header, Some(data))
    }

    #[test]
    fn test_image_extension_gets_empty_primary() {
        let mut bytes = Vec::new();
        f32_image().write_to(&mut bytes, &FitsSaveArgs::default()).unwrap();
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);

        let list = open(bytes.as_slice(), &FitsLoadArgs::default()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).unwrap().kind, HduKind::Primary);
        assert!(list.get(0).unwrap().data.is_none());
        assert_eq!(list.get(0).unwrap().header.get_bool("EXTEND"), Some(true));

        let image = list.get(1).unwrap();
        assert_eq!(image.kind, HduKind::Image);
        assert_eq!(image.header.get_i64("NAXIS1"), Some(3));
        assert_eq!(image.header.get_str("TELESCOP"), Some("SDO/AIA"));
        assert_eq!(image.header.history().collect::<Vec<_>>(), vec!["synthetic"]);
        assert_eq!(image.data, f32_image().data);
    }

    #[test]
    fn test_structural_cards_come_first() {
        let mut bytes = Vec::new();
        f32_image().write_to(&mut bytes, &FitsSaveArgs::default()).unwrap();
        let extension = &bytes[BLOCK_SIZE..];
        let keywords: Vec<String> = extension
            .chunks(CARD_SIZE)
            .take(7)
            .map(|c| String::from_utf8_lossy(&c[..8]).trim_end().to_string())
            .collect();
        assert_eq!(
            keywords,
            vec!["XTENSION", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "PCOUNT", "GCOUNT"]
        );
    }

    #[test]
    fn test_output_verify_rejects_bad_keywords() {
        let mut hdu = f32_image();
        hdu.header.push(Card::new("lower", 1_i64));

        let mut bytes = Vec::new();
        assert!(hdu.write_to(&mut bytes, &FitsSaveArgs::default()).is_err());

        let options = FitsSaveArgs {
            output_verify: Some(VerifyOption::SilentFix),
            ..FitsSaveArgs::default()
        };
        let mut bytes = Vec::new();
        hdu.write_to(&mut bytes, &options).unwrap();
        let list = open(bytes.as_slice(), &FitsLoadArgs::default()).unwrap();
        assert_eq!(list.get(1).unwrap().header.get_i64("LOWER"), Some(1));
    }

    #[test]
    fn test_non_image_extension_is_not_written() {
        let mut hdu = f32_image();
        hdu.kind = HduKind::Other("BINTABLE".into());
        let list = HduList::from_hdus(vec![ImageHdu::primary(Header::new(), None), hdu]);
        let mut bytes = Vec::new();
        assert!(list.write_to(&mut bytes, VerifyOption::Exception).is_err());
    }
}
