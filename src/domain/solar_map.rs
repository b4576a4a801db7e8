//! Solar map object model.
//!
//! A `SolarMap` pairs a 2-D image with the metadata describing where and how
//! it was observed. The metadata is kept as a FITS header so the map can be
//! written back without loss; `fits_header` strips the structural keywords
//! that a writer regenerates from the data itself.

use crate::domain::header::Header;
use crate::domain::model::ImageData;
use crate::utils::error::{DatasetError, Result};
use chrono::{NaiveDate, NaiveDateTime};

const STRUCTURAL_KEYWORDS: [&str; 6] = ["SIMPLE", "XTENSION", "BITPIX", "EXTEND", "PCOUNT", "GCOUNT"];

#[derive(Debug, Clone, PartialEq)]
pub struct SolarMap {
    data: ImageData,
    meta: Header,
}

/// A pair of values along the two image axes (x = NAXIS1, y = NAXIS2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisPair<T> {
    pub x: T,
    pub y: T,
}

impl SolarMap {
    pub fn new(data: ImageData, meta: Header) -> Result<Self> {
        if data.naxis() != 2 {
            return Err(DatasetError::codec(format!(
                "a solar map needs 2-D image data, got {} axes",
                data.naxis()
            )));
        }
        Ok(Self { data, meta })
    }

    pub fn data(&self) -> &ImageData {
        &self.data
    }

    pub fn meta(&self) -> &Header {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Header {
        &mut self.meta
    }

    pub fn into_parts(self) -> (ImageData, Header) {
        (self.data, self.meta)
    }

    /// Metadata as a header ready to be attached to a new image HDU.
    pub fn fits_header(&self) -> Header {
        let cards = self
            .meta
            .cards()
            .iter()
            .filter(|card| !is_structural(&card.keyword))
            .cloned()
            .collect();
        Header::from_cards(cards)
    }

    pub fn dimensions(&self) -> AxisPair<usize> {
        let shape = self.data.shape();
        AxisPair {
            x: shape[0],
            y: shape[1],
        }
    }

    pub fn observatory(&self) -> Option<&str> {
        self.meta
            .get_str("OBSRVTRY")
            .or_else(|| self.meta.get_str("TELESCOP"))
            .map(str::trim)
    }

    pub fn instrument(&self) -> Option<&str> {
        self.meta.get_str("INSTRUME").map(str::trim)
    }

    pub fn detector(&self) -> Option<&str> {
        self.meta.get_str("DETECTOR").map(str::trim)
    }

    pub fn wavelength(&self) -> Option<f64> {
        self.meta.get_f64("WAVELNTH")
    }

    pub fn wavelength_unit(&self) -> Option<&str> {
        self.meta.get_str("WAVEUNIT").map(str::trim)
    }

    pub fn exposure_time(&self) -> Option<f64> {
        self.meta.get_f64("EXPTIME")
    }

    /// Observation start from DATE-OBS, falling back to DATE_OBS and DATE.
    pub fn date(&self) -> Option<NaiveDateTime> {
        ["DATE-OBS", "DATE_OBS", "DATE"]
            .iter()
            .filter_map(|key| self.meta.get_str(key))
            .find_map(parse_fits_date)
    }

    pub fn reference_pixel(&self) -> Option<AxisPair<f64>> {
        self.axis_pair("CRPIX1", "CRPIX2")
    }

    pub fn reference_coordinate(&self) -> Option<AxisPair<f64>> {
        self.axis_pair("CRVAL1", "CRVAL2")
    }

    pub fn scale(&self) -> Option<AxisPair<f64>> {
        self.axis_pair("CDELT1", "CDELT2")
    }

    fn axis_pair(&self, x_key: &str, y_key: &str) -> Option<AxisPair<f64>> {
        Some(AxisPair {
            x: self.meta.get_f64(x_key)?,
            y: self.meta.get_f64(y_key)?,
        })
    }
}

fn is_structural(keyword: &str) -> bool {
    let keyword = keyword.to_ascii_uppercase();
    STRUCTURAL_KEYWORDS.contains(&keyword.as_str())
        || keyword
            .strip_prefix("NAXIS")
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

fn parse_fits_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
