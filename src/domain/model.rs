use crate::domain::header::Header;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed pixel buffer. Values are the raw stored values of the file:
/// BSCALE/BZERO stay in the header and are not applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PixelData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl PixelData {
    pub fn bitpix(&self) -> i64 {
        match self {
            PixelData::U8(_) => 8,
            PixelData::I16(_) => 16,
            PixelData::I32(_) => 32,
            PixelData::I64(_) => 64,
            PixelData::F32(_) => -32,
            PixelData::F64(_) => -64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::I16(v) => v.len(),
            PixelData::I32(v) => v.len(),
            PixelData::I64(v) => v.len(),
            PixelData::F32(v) => v.len(),
            PixelData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a flat index widened to f64.
    pub fn value_f64(&self, index: usize) -> Option<f64> {
        match self {
            PixelData::U8(v) => v.get(index).map(|&x| x as f64),
            PixelData::I16(v) => v.get(index).map(|&x| x as f64),
            PixelData::I32(v) => v.get(index).map(|&x| x as f64),
            PixelData::I64(v) => v.get(index).map(|&x| x as f64),
            PixelData::F32(v) => v.get(index).map(|&x| x as f64),
            PixelData::F64(v) => v.get(index).copied(),
        }
    }
}

/// N-dimensional image. `shape` uses FITS axis order: `shape[0]` is NAXIS1,
/// the fastest varying axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    shape: Vec<usize>,
    pixels: PixelData,
}

impl ImageData {
    pub fn new(shape: Vec<usize>, pixels: PixelData) -> crate::utils::error::Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent));
        if shape.is_empty() || expected != Some(pixels.len()) {
            return Err(crate::utils::error::DatasetError::codec(format!(
                "shape {:?} does not match {} pixel value(s)",
                shape,
                pixels.len()
            )));
        }
        Ok(Self { shape, pixels })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn naxis(&self) -> usize {
        self.shape.len()
    }

    pub fn pixels(&self) -> &PixelData {
        &self.pixels
    }

    pub fn bitpix(&self) -> i64 {
        self.pixels.bitpix()
    }

    pub fn into_pixels(self) -> PixelData {
        self.pixels
    }

    /// Value at FITS (1-based) pixel coordinates given in axis order.
    pub fn pixel(&self, coords: &[usize]) -> Option<f64> {
        if coords.len() != self.shape.len() {
            return None;
        }
        let mut index = 0;
        let mut stride = 1;
        for (&coord, &extent) in coords.iter().zip(&self.shape) {
            if coord == 0 || coord > extent {
                return None;
            }
            index += (coord - 1) * stride;
            stride *= extent;
        }
        self.pixels.value_f64(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HduKind {
    Primary,
    Image,
    /// A non-image extension (BINTABLE, TABLE, ...). Listed but not decoded.
    Other(String),
}

impl fmt::Display for HduKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HduKind::Primary => write!(f, "PRIMARY"),
            HduKind::Image => write!(f, "IMAGE"),
            HduKind::Other(xtension) => write!(f, "{}", xtension),
        }
    }
}

/// A detached header + data unit. Owns everything it holds; nothing points
/// back into the stream it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHdu {
    pub kind: HduKind,
    pub header: Header,
    pub data: Option<ImageData>,
}

impl ImageHdu {
    /// A bare image extension.
    pub fn new(header: Header, data: Option<ImageData>) -> Self {
        Self {
            kind: HduKind::Image,
            header,
            data,
        }
    }

    pub fn primary(header: Header, data: Option<ImageData>) -> Self {
        Self {
            kind: HduKind::Primary,
            header,
            data,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.header.get_str("EXTNAME")
    }

    pub fn is_image(&self) -> bool {
        !matches!(self.kind, HduKind::Other(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_data_shape_must_match() {
        assert!(ImageData::new(vec![2, 3], PixelData::I16(vec![0; 6])).is_ok());
        assert!(ImageData::new(vec![2, 3], PixelData::I16(vec![0; 5])).is_err());
        assert!(ImageData::new(vec![], PixelData::I16(vec![])).is_err());
        assert!(ImageData::new(vec![usize::MAX, 2], PixelData::U8(vec![0; 2])).is_err());
    }

    #[test]
    fn test_pixel_uses_fits_axis_order() {
        // NAXIS1 = 3 columns, NAXIS2 = 2 rows
        let image = ImageData::new(
            vec![3, 2],
            PixelData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        )
        .unwrap();
        assert_eq!(image.pixel(&[1, 1]), Some(1.0));
        assert_eq!(image.pixel(&[3, 1]), Some(3.0));
        assert_eq!(image.pixel(&[1, 2]), Some(4.0));
        assert_eq!(image.pixel(&[4, 1]), None);
        assert_eq!(image.pixel(&[0, 1]), None);
    }

    #[test]
    fn test_bitpix() {
        assert_eq!(PixelData::U8(vec![]).bitpix(), 8);
        assert_eq!(PixelData::F64(vec![]).bitpix(), -64);
    }
}
