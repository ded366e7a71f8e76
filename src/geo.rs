//! Spherical Web-Mercator (EPSG:3857) bounding boxes around a picked point.

/// Spherical Earth radius used by EPSG:3857, in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude limit of the Web-Mercator square world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Axis-aligned box in EPSG:3857 meters.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MercatorBBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl MercatorBBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// `minx,miny,maxx,maxy` as expected by the WMS 1.3.0 `BBOX` parameter for EPSG:3857.
    pub fn to_wms_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Forward spherical Mercator projection of a lon/lat pair in degrees.
///
/// Longitude is wrapped into `[-180, 180)` (with `-180` reported as `180`) and latitude is
/// clamped to [`MAX_MERCATOR_LAT`] so `y` stays finite.
pub fn project(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let lon = normalize_lon(lon_deg);
    let lat = lat_deg.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);

    let lambda = lon.to_radians();
    let phi = lat.to_radians();

    let x = EARTH_RADIUS_M * lambda;
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + phi / 2.0).tan().ln();
    (x, y)
}

/// Square box of side `2 * |radius_km| * 1000` meters centered on the projected point.
pub fn lon_lat_to_mercator_bbox(lon_deg: f64, lat_deg: f64, radius_km: f64) -> MercatorBBox {
    let (x, y) = project(lon_deg, lat_deg);
    let r = radius_km.abs() * 1000.0;
    MercatorBBox {
        min_x: x - r,
        min_y: y - r,
        max_x: x + r,
        max_y: y + r,
    }
}

fn normalize_lon(lon: f64) -> f64 {
    let wrapped = ((lon + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}
