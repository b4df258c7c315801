//! Coordinate Reference System handling

mod transform;

pub use transform::CrsTransform;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// WGS84 / UTM zone `zone`, northern or southern hemisphere
    pub fn utm(zone: u32, north: bool) -> Self {
        let base = if north { 32600 } else { 32700 };
        Self::from_epsg(base + zone)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326) | Some(4269) | Some(4674) | Some(4258))
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual comparison is imperfect but conservative
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt
                .char_indices()
                .nth(50)
                .map(|(i, _)| i)
                .unwrap_or(wkt.len());
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

impl CRS {
    /// Full text form that parses back to an equivalent CRS.
    ///
    /// Unlike [`CRS::identifier`] the WKT is never shortened. `None` when no
    /// stored form survives a round trip through [`FromStr`].
    pub fn definition(&self) -> Option<String> {
        let text = match (self.epsg, &self.proj, &self.wkt) {
            (Some(code), _, _) => format!("EPSG:{}", code),
            (None, Some(proj), _) => proj.clone(),
            (None, None, Some(wkt)) => wkt.clone(),
            (None, None, None) => return None,
        };
        text.parse::<CRS>()
            .ok()
            .filter(|back| back.is_equivalent(self))
            .map(|_| text)
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl FromStr for CRS {
    type Err = Error;

    /// Parses `EPSG:4326`, `urn:ogc:def:crs:EPSG::4326`, `OGC:CRS84`,
    /// a bare EPSG number, a PROJ string (`+proj=...`) or WKT.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::format("empty CRS identifier"));
        }

        let upper = s.to_ascii_uppercase();
        if upper == "OGC:CRS84" || upper.ends_with("OGC:1.3:CRS84") {
            return Ok(CRS::wgs84());
        }

        let code = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:").map(|rest| {
                rest.rsplit(':').next().unwrap_or(rest)
            }))
            .unwrap_or(upper.as_str());

        if let Ok(code) = code.parse::<u32>() {
            return Ok(CRS::from_epsg(code));
        }
        if s.starts_with("+proj") {
            return Ok(CRS::from_proj(s));
        }
        if upper.starts_with("GEOGCS") || upper.starts_with("PROJCS") || upper.starts_with("GEOGCRS")
            || upper.starts_with("PROJCRS")
        {
            return Ok(CRS::from_wkt(s));
        }

        Err(Error::format(format!("unrecognised CRS identifier '{}'", s)))
    }
}

/// Require two optional CRS to be present and equivalent.
///
/// Used at the seams where data from two sources meet; there is no
/// implicit reprojection.
pub fn ensure_same(source: Option<&CRS>, target: Option<&CRS>) -> Result<()> {
    match (source, target) {
        (Some(a), Some(b)) if a.is_equivalent(b) => Ok(()),
        (Some(a), Some(b)) => Err(Error::Crs {
            source_crs: a.identifier(),
            target_crs: b.identifier(),
            reason: "coordinate reference systems differ; reproject first".into(),
        }),
        (a, b) => Err(Error::Crs {
            source_crs: a.map(CRS::identifier).unwrap_or_else(|| "missing".into()),
            target_crs: b.map(CRS::identifier).unwrap_or_else(|| "missing".into()),
            reason: "coordinate reference system not set".into(),
        }),
    }
}
