//! Minimal FITS codec: header cards, image HDUs and their verification.

pub mod card;
pub mod reader;
pub mod verify;
pub mod writer;

pub use verify::{VerifyOption, VerifyReport};

use crate::config::args::FitsLoadArgs;
use crate::domain::model::ImageHdu;
use crate::utils::error::{DatasetError, Result};
use std::io::Read;

/// Size of every header and data block.
pub const BLOCK_SIZE: usize = 2880;

/// The ordered HDUs of one FITS file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HduList {
    hdus: Vec<ImageHdu>,
}

impl HduList {
    pub fn from_hdus(hdus: Vec<ImageHdu>) -> Self {
        Self { hdus }
    }

    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageHdu> {
        self.hdus.iter()
    }

    fn position(&self, index: i64) -> Result<usize> {
        let count = self.hdus.len();
        let resolved = if index < 0 {
            count as i64 + index
        } else {
            index
        };
        if (0..count as i64).contains(&resolved) {
            Ok(resolved as usize)
        } else {
            Err(DatasetError::HduIndexOutOfRange { index, count })
        }
    }

    /// HDU at `index`. Negative indices count back from the last HDU.
    pub fn get(&self, index: i64) -> Result<&ImageHdu> {
        let position = self.position(index)?;
        Ok(&self.hdus[position])
    }

    pub fn get_mut(&mut self, index: i64) -> Result<&mut ImageHdu> {
        let position = self.position(index)?;
        Ok(&mut self.hdus[position])
    }

    pub fn into_hdus(self) -> Vec<ImageHdu> {
        self.hdus
    }

    /// One summary line per HDU: index, name, kind, card count, shape and
    /// pixel type.
    pub fn info(&self) -> Vec<String> {
        self.hdus
            .iter()
            .enumerate()
            .map(|(index, hdu)| {
                let (shape, format) = match &hdu.data {
                    Some(data) => (
                        format!("{:?}", data.shape()),
                        format!("BITPIX={}", data.bitpix()),
                    ),
                    None => ("()".to_string(), String::new()),
                };
                format!(
                    "{:<3} {:<10} {:<10} {:>4} cards  {:<14} {}",
                    index,
                    hdu.name().unwrap_or(if index == 0 { "PRIMARY" } else { "" }),
                    hdu.kind.to_string(),
                    hdu.header.len(),
                    shape,
                    format
                )
                .trim_end()
                .to_string()
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a HduList {
    type Item = &'a ImageHdu;
    type IntoIter = std::slice::Iter<'a, ImageHdu>;

    fn into_iter(self) -> Self::IntoIter {
        self.hdus.iter()
    }
}

/// Reads a whole FITS stream into memory.
pub fn open<R: Read>(reader: R, options: &FitsLoadArgs) -> Result<HduList> {
    reader::read_hdu_list(reader, options)
}
