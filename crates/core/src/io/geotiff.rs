//! GeoTIFF reading/writing via the `tiff` crate.
//!
//! Reads the geotransform from ModelPixelScale/ModelTiepoint tags, the CRS
//! from the GeoKey directory and the nodata sentinel from `GDAL_NODATA`.
//! Callers may override CRS and nodata through [`RasterReadOptions`].

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// Options for reading a raster file
#[derive(Debug, Clone, Default)]
pub struct RasterReadOptions {
    /// Band number (1-indexed), defaults to 1
    pub band: Option<usize>,
    /// Declared CRS, overrides the embedded one
    pub crs: Option<CRS>,
    /// Declared nodata value, overrides `GDAL_NODATA`
    pub nodata: Option<f64>,
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P, options: &RasterReadOptions) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file), options)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], options: &RasterReadOptions) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), options)
}

/// Tag lookup by code; known codes decode to their named variants
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::format(format!("{}: {}", context, e))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn decode_geotiff<T, R>(reader: R, options: &RasterReadOptions) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;

    let (width, height) = decoder.dimensions().map_err(tiff_err("cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let samples: Vec<T> = match decoder.read_image().map_err(tiff_err("cannot read image data"))? {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => return Err(Error::format("unsupported TIFF pixel format")),
    };

    let cells = rows * cols;
    if cells == 0 || samples.len() % cells != 0 {
        return Err(Error::format(format!(
            "pixel buffer of {} values does not match {}x{} grid",
            samples.len(),
            cols,
            rows
        )));
    }

    // Chunky (pixel-interleaved) layout: band b is every n-th sample
    let bands = samples.len() / cells;
    let band = options.band.unwrap_or(1);
    if band == 0 || band > bands {
        return Err(Error::InvalidParameter {
            name: "band",
            value: band.to_string(),
            reason: format!("file has {} band(s)", bands),
        });
    }
    let data: Vec<T> = if bands == 1 {
        samples
    } else {
        samples.into_iter().skip(band - 1).step_by(bands).collect()
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    match read_geotransform(&mut decoder) {
        Some(transform) => raster.set_transform(transform),
        None => tracing::warn!(
            "no ModelPixelScale/ModelTiepoint tags; using pixel coordinates (origin 0,0, cell size 1)"
        ),
    }

    let crs = options.crs.clone().or_else(|| read_crs(&mut decoder));
    raster.set_crs(crs);

    let nodata = options.nodata.or_else(|| read_nodata(&mut decoder));
    raster.set_nodata(nodata.and_then(num_traits::cast));

    Ok(raster)
}

/// ModelPixelScale + ModelTiepoint → north-up transform
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geo_tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code from the GeoKey directory, projected key preferred
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY)).ok()?;
    let count = *keys.get(3)? as usize;

    let lookup = |wanted: u16| {
        keys.get(4..4 + count * 4)?
            .chunks_exact(4)
            .find(|entry| entry[0] == wanted && entry[1] == 0)
            .map(|entry| entry[3])
            .filter(|&code| code != 0 && code != USER_DEFINED)
    };

    lookup(PROJECTED_CS_TYPE_KEY)
        .or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
        .map(|code| CRS::from_epsg(code as u32))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(geo_tag(GDAL_NODATA)).ok()?;
    text.trim_matches(char::from(0)).trim().parse().ok()
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file)
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err("cannot create TIFF image"))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("cannot write tiepoint tag"))?;

    let geokeys = geokey_directory(raster.crs());
    image
        .encoder()
        .write_tag(geo_tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(tiff_err("cannot write geokey tag"))?;

    if let Some(nodata) = raster.nodata().and_then(|nd| nd.to_f64()) {
        let text = format!("{}", nodata);
        image
            .encoder()
            .write_tag(geo_tag(GDAL_NODATA), text.as_str())
            .map_err(tiff_err("cannot write nodata tag"))?;
    }

    image
        .write_data(&data)
        .map_err(tiff_err("cannot write image data"))?;

    Ok(())
}

/// Minimal GeoKey directory: model type, raster-is-area and the EPSG code
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let code = crs
        .and_then(CRS::epsg)
        .and_then(|c| u16::try_from(c).ok());
    let geographic = crs.is_some_and(CRS::is_geographic);

    let mut keys = vec![
        GT_MODEL_TYPE_KEY, 0, 1, if geographic { 2 } else { 1 },
        GT_RASTER_TYPE_KEY, 0, 1, 1,
    ];
    if let Some(code) = code {
        let key = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }

    let count = (keys.len() / 4) as u16;
    let mut directory = vec![1, 1, 0, count];
    directory.extend(keys);
    directory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster<f64> {
        Raster::from_vec(vec![1.0, 2.0, -9999.0, 4.0, 5.0, 6.0], 2, 3)
            .unwrap()
            .with_transform(GeoTransform::new(440_000.0, 4_475_000.0, 30.0, -30.0))
            .with_crs(CRS::utm(30, true))
            .with_nodata(-9999.0)
    }

    #[test]
    fn buffer_roundtrip_keeps_metadata() {
        let raster = sample_raster();
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes, &RasterReadOptions::default()).unwrap();

        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.transform(), raster.transform());
        assert_eq!(back.crs().and_then(CRS::epsg), Some(32630));
        assert_eq!(back.nodata(), Some(-9999.0));
        assert!(back.is_nodata(back.get(0, 2).unwrap()));
        assert_eq!(back.get(1, 2).unwrap(), 6.0);
    }

    #[test]
    fn declared_crs_and_nodata_override_embedded() {
        let bytes = write_geotiff_to_buffer(&sample_raster()).unwrap();
        let options = RasterReadOptions {
            crs: Some(CRS::from_epsg(5880)),
            nodata: Some(6.0),
            ..Default::default()
        };
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes, &options).unwrap();
        assert_eq!(back.crs().and_then(CRS::epsg), Some(5880));
        assert!(back.is_nodata(back.get(1, 2).unwrap()));
    }

    #[test]
    fn file_roundtrip() {
        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&sample_raster(), tmp.path()).unwrap();
        let back: Raster<f32> = read_geotiff(tmp.path(), &RasterReadOptions::default()).unwrap();
        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn geo_tags_are_found_after_write() {
        let bytes = write_geotiff_to_buffer(&sample_raster()).unwrap();
        let mut decoder = Decoder::new(Cursor::new(&bytes[..])).unwrap();
        assert!(decoder.get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE)).is_ok());
        assert!(decoder.get_tag_f64_vec(geo_tag(MODEL_TIEPOINT)).is_ok());
        assert!(decoder.get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY)).is_ok());
        assert!(decoder.get_tag_ascii_string(geo_tag(GDAL_NODATA)).is_ok());
    }

    #[test]
    fn plain_tiff_falls_back_to_pixel_grid() {
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            encoder
                .write_image::<Gray32Float>(2, 1, &[3.0f32, 4.0])
                .unwrap();
        }
        let back: Raster<f64> = read_geotiff_from_buffer(&buf, &RasterReadOptions::default()).unwrap();
        assert_eq!(back.transform(), &GeoTransform::new(0.0, 0.0, 1.0, -1.0));
        assert!(back.crs().is_none());
        assert!(back.nodata().is_none());
        assert_eq!(back.get(0, 1).unwrap(), 4.0);
    }

    #[test]
    fn missing_band_is_rejected() {
        let bytes = write_geotiff_to_buffer(&sample_raster()).unwrap();
        let options = RasterReadOptions {
            band: Some(2),
            ..Default::default()
        };
        let err = read_geotiff_from_buffer::<f64>(&bytes, &options).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "band", .. }));
    }

    #[test]
    fn garbage_is_format_error() {
        let err = read_geotiff_from_buffer::<f64>(b"not a tiff", &RasterReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn geographic_crs_uses_geographic_key() {
        let dir = geokey_directory(Some(&CRS::wgs84()));
        assert_eq!(dir[3], 3);
        assert!(dir.chunks_exact(4).any(|k| k[0] == GEOGRAPHIC_TYPE_KEY && k[3] == 4326));
    }
}
