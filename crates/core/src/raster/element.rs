//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Types that can be stored in a grid cell.
///
/// Every element converts losslessly enough to `f64` for aggregation; the
/// nodata test is type-aware (NaN is always nodata for floats).
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Sentinel used when a value cannot be represented
    fn default_nodata() -> Self;

    /// Check if this value represents no-data under the given sentinel
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::MIN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    nodata.is_some_and(|nd| *self == nd)
                }
            }
        )*
    };
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::NAN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    if self.is_nan() {
                        return true;
                    }
                    match nodata {
                        Some(nd) if nd.is_nan() => false,
                        Some(nd) => *self == nd || (*self - nd).abs() <= nd.abs() * <$t>::EPSILON,
                        None => false,
                    }
                }
            }
        )*
    };
}

impl_raster_element_int!(i16, i32, u8, u16, u32);
impl_raster_element_float!(f32, f64);
