use chrono::NaiveDate;
use reqwest::Url;

use crate::{
    dates::{format_iso_date, monthly_dates_for_years},
    foundation::{
        core::{GeoPoint, YearRange},
        error::{AnimatorError, AnimatorResult},
    },
    geo::{MercatorBBox, lon_lat_to_mercator_bbox},
    layers::{LayerCatalog, LayerGroup},
};

/// One planned WMS `GetMap` call. `date` and `group` travel with the request so the response can
/// be labeled without looking at the URL again.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRequest {
    pub url: String,
    pub date: NaiveDate,
    pub group: LayerGroup,
    pub bbox: MercatorBBox,
}

/// Build the `GetMap` URL for one group and month.
pub fn get_map_url(
    endpoint: &str,
    layers: &str,
    date: NaiveDate,
    bbox: &MercatorBBox,
    width: u32,
    height: u32,
) -> AnimatorResult<Url> {
    let time = format_iso_date(date);
    let bbox = bbox.to_wms_param();
    let width = width.to_string();
    let height = height.to_string();
    Url::parse_with_params(
        endpoint,
        &[
            ("SERVICE", "WMS"),
            ("REQUEST", "GetMap"),
            ("VERSION", "1.3.0"),
            ("CRS", "EPSG:3857"),
            ("LAYERS", layers),
            ("STYLES", ""),
            ("FORMAT", "image/png"),
            ("TRANSPARENT", "TRUE"),
            ("TIME", time.as_str()),
            ("BBOX", bbox.as_str()),
            ("WIDTH", width.as_str()),
            ("HEIGHT", height.as_str()),
        ],
    )
    .map_err(|e| AnimatorError::validation(format!("invalid WMS endpoint '{endpoint}': {e}")))
}

/// Plan every tile request for `range` around `point`: one per (group, month), group-major in
/// [`LayerGroup::ALL`] order, months ascending within a group.
pub fn plan_requests(
    endpoint: &str,
    catalog: &LayerCatalog,
    range: YearRange,
    point: GeoPoint,
) -> AnimatorResult<Vec<TileRequest>> {
    let months = monthly_dates_for_years(range)?;
    let mut out = Vec::with_capacity(LayerGroup::ALL.len() * months.len());

    for group in LayerGroup::ALL {
        let spec = catalog.spec(group)?;
        let layers = catalog.layers_param(group)?;
        let bbox = lon_lat_to_mercator_bbox(point.longitude, point.latitude, spec.radius_km);

        for &date in &months {
            let url = get_map_url(endpoint, &layers, date, &bbox, spec.width, spec.height)?;
            out.push(TileRequest {
                url: url.into(),
                date,
                group,
                bbox,
            });
        }
    }

    tracing::debug!(
        range = %range,
        months = months.len(),
        requests = out.len(),
        "planned tile requests"
    );
    Ok(out)
}
