//! Single-band u16 GeoTIFF output.

use std::{io::{Seek, Write}, path::Path};

use anyhow::{anyhow, ensure, Context, Result};
use tiff::{
    encoder::{colortype::Gray16, DirectoryEncoder, TiffEncoder, TiffKind},
    tags::Tag,
};

use crate::{common, config::CrsDef, raster::Raster};

// GeoTIFF tags
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

// GeoKeys
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const PROJECTED_CS_TYPE: u16 = 3072;
const PCS_CITATION: u16 = 3073;

const MODEL_TYPE_PROJECTED: u16 = 1;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Citation prefix GDAL reads as an ESRI WKT definition.
const ESRI_PE_STRING: &str = "ESRI PE String = ";

/// Write `raster` to `path` through a temp file renamed on success.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<()> {
    ensure!(
        raster.transform.is_north_up(),
        "[io::geotiff] Only north-up rasters can be written, got {:?}",
        raster.transform
    );
    common::write_atomic(path, |writer| encode(&mut *writer, raster))
        .with_context(|| format!("[io::geotiff] Failed to write {}", path.display()))
}

fn encode<W: Write + Seek>(writer: W, raster: &Raster) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray16>(raster.width() as u32, raster.height() as u32)?;
    write_geo_tags(image.encoder(), raster)?;

    let pixels: Vec<u16> = raster.data.iter().copied().collect();
    image.write_data(&pixels)?;
    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(dir: &mut DirectoryEncoder<W, K>, raster: &Raster) -> Result<()> {
    let t = &raster.transform;
    dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), [t.a, -t.e, 0.0].as_slice())?;
    dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), [0.0, 0.0, 0.0, t.c, t.f, 0.0].as_slice())?;

    let (keys, ascii) = geo_keys(&raster.crs)?;
    dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())?;
    dir.write_tag(Tag::Unknown(GEO_ASCII_PARAMS), ascii.as_str())?;

    dir.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), raster.nodata.to_string().as_str())?;
    Ok(())
}

/// GeoKeyDirectory entries and the GeoAsciiParams they point into.
/// Keys are sorted by id. A CRS without an EPSG code is user-defined and
/// carries its WKT in PCSCitationGeoKey.
fn geo_keys(crs: &CrsDef) -> Result<(Vec<u16>, String)> {
    let ascii_len = |text: &str| {
        u16::try_from(text.len() + 1)
            .map_err(|_| anyhow!("[io::geotiff] CRS text of {} bytes does not fit GeoAsciiParams", text.len()))
    };

    let mut keys = vec![
        1, 1, 0, 0,
        GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        GT_CITATION, GEO_ASCII_PARAMS, ascii_len(&crs.name)?, 0,
    ];
    let mut ascii = format!("{}|", crs.name);

    match crs.epsg {
        Some(code) => keys.extend([PROJECTED_CS_TYPE, 0, 1, code]),
        None => {
            let pe = format!("{ESRI_PE_STRING}{}", crs.wkt);
            let offset = ascii_len(&crs.name)?;
            keys.extend([PROJECTED_CS_TYPE, 0, 1, USER_DEFINED]);
            keys.extend([PCS_CITATION, GEO_ASCII_PARAMS, ascii_len(&pe)?, offset]);
            ascii.push_str(&pe);
            ascii.push('|');
        }
    }
    ensure!(
        u16::try_from(ascii.len()).is_ok(),
        "[io::geotiff] GeoAsciiParams of {} bytes is too long",
        ascii.len()
    );

    keys[3] = (keys.len() / 4 - 1) as u16;
    Ok((keys, ascii))
}
