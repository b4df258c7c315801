//! I/O for rasters (GeoTIFF) and vector sources (GeoJSON)

mod geojson;
mod geotiff;
mod timeout;

pub use geojson::{
    geometry_store_to_string, parse_geometry_store, parse_point_set, point_set_to_string,
    read_geometry_store, read_point_set, write_geometry_store, write_point_set,
    VectorReadOptions,
};
pub use geotiff::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    RasterReadOptions,
};
pub use timeout::load_with_timeout;
