//! The fixed set of animated GIBS layer groups and their per-group settings.

use std::fmt;

use tracing::warn;

use crate::foundation::error::{AnimatorError, AnimatorResult};

/// Thematic measurement animated by the tool.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LayerGroup {
    /// MOPITT carbon monoxide surface mixing ratio.
    CarbonMonoxide,
    /// MODIS Terra monthly NDVI.
    Ndvi,
    /// MODIS Terra NDSI snow cover.
    SnowCover,
}

impl LayerGroup {
    /// Every group, in classification priority order. The first entry is the fallback.
    pub const ALL: [LayerGroup; 3] = [
        LayerGroup::CarbonMonoxide,
        LayerGroup::Ndvi,
        LayerGroup::SnowCover,
    ];

    pub fn key(self) -> &'static str {
        match self {
            LayerGroup::CarbonMonoxide => "carbon_monoxide",
            LayerGroup::Ndvi => "ndvi",
            LayerGroup::SnowCover => "snow_cover",
        }
    }
}

impl fmt::Display for LayerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Request and labeling settings for one layer group.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerSpec {
    pub group: LayerGroup,
    /// GIBS layer identifier of the measurement itself.
    pub layer_id: String,
    /// Human readable label drawn in frame footers and title cards.
    pub label: String,
    /// Short product tag drawn at the right of the footer.
    pub product_tag: String,
    /// Half-size of the requested box, kilometers.
    pub radius_km: f64,
    /// Requested tile width in pixels (`WIDTH`).
    pub width: u32,
    /// Requested tile height in pixels (`HEIGHT`).
    pub height: u32,
}

/// Immutable registry of the animated groups plus the base overlays requested with each.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerCatalog {
    /// Relief and coastline overlays always requested under each group layer.
    pub base_layers: Vec<String>,
    pub specs: Vec<LayerSpec>,
}

impl Default for LayerCatalog {
    fn default() -> Self {
        Self::gibs_default()
    }
}

impl LayerCatalog {
    pub fn gibs_default() -> Self {
        Self {
            base_layers: vec![
                "ASTER_GDEM_Greyscale_Shaded_Relief".to_string(),
                "Coastlines_15m".to_string(),
            ],
            specs: vec![
                LayerSpec {
                    group: LayerGroup::CarbonMonoxide,
                    layer_id: "MOPITT_CO_Monthly_Surface_Mixing_Ratio_Day".to_string(),
                    label: "Carbon Monoxide (Surface Mixing Ratio)".to_string(),
                    product_tag: "MOPITT".to_string(),
                    // CO plumes are regional; MOPITT pixels are ~22 km.
                    radius_km: 1500.0,
                    width: 720,
                    height: 720,
                },
                LayerSpec {
                    group: LayerGroup::Ndvi,
                    layer_id: "MODIS_Terra_L3_NDVI_Monthly".to_string(),
                    label: "Vegetation Index (NDVI, Monthly)".to_string(),
                    product_tag: "MODIS Terra".to_string(),
                    radius_km: 100.0,
                    width: 1080,
                    height: 1080,
                },
                LayerSpec {
                    group: LayerGroup::SnowCover,
                    layer_id: "MODIS_Terra_NDSI_Snow_Cover".to_string(),
                    label: "Snow Cover (NDSI)".to_string(),
                    product_tag: "MODIS Terra".to_string(),
                    radius_km: 100.0,
                    width: 1080,
                    height: 1080,
                },
            ],
        }
    }

    /// Check that every group has exactly one spec with usable request settings.
    pub fn validate(&self) -> AnimatorResult<()> {
        for group in LayerGroup::ALL {
            let count = self.specs.iter().filter(|s| s.group == group).count();
            if count != 1 {
                return Err(AnimatorError::validation(format!(
                    "layer catalog must define exactly one spec for '{group}', found {count}"
                )));
            }
        }
        for spec in &self.specs {
            if spec.layer_id.is_empty() {
                return Err(AnimatorError::validation(format!(
                    "layer '{}' has an empty layer_id",
                    spec.group
                )));
            }
            if spec.width == 0 || spec.height == 0 {
                return Err(AnimatorError::validation(format!(
                    "layer '{}' width/height must be non-zero",
                    spec.group
                )));
            }
            if !spec.radius_km.is_finite() || spec.radius_km == 0.0 {
                return Err(AnimatorError::validation(format!(
                    "layer '{}' radius_km must be finite and non-zero",
                    spec.group
                )));
            }
        }
        Ok(())
    }

    pub fn spec(&self, group: LayerGroup) -> AnimatorResult<&LayerSpec> {
        self.specs
            .iter()
            .find(|s| s.group == group)
            .ok_or_else(|| AnimatorError::validation(format!("no layer spec for '{group}'")))
    }

    /// Comma-joined `LAYERS` value: base overlays first, then the group's own layer.
    pub fn layers_param(&self, group: LayerGroup) -> AnimatorResult<String> {
        let spec = self.spec(group)?;
        let mut ids: Vec<&str> = self.base_layers.iter().map(String::as_str).collect();
        ids.push(&spec.layer_id);
        Ok(ids.join(","))
    }

    /// Map a (possibly comma-joined) layer id to its group by substring match, in
    /// [`LayerGroup::ALL`] priority order. `None` when nothing matches.
    pub fn classify(&self, layer_id: &str) -> Option<LayerGroup> {
        LayerGroup::ALL.into_iter().find(|group| {
            self.spec(*group)
                .map(|spec| layer_id.contains(spec.layer_id.as_str()))
                .unwrap_or(false)
        })
    }

    /// Like [`classify`](Self::classify) but errors on unknown ids.
    pub fn classify_strict(&self, layer_id: &str) -> AnimatorResult<LayerGroup> {
        self.classify(layer_id)
            .ok_or_else(|| AnimatorError::unknown_layer(layer_id))
    }

    /// Like [`classify`](Self::classify) but falls back to the first group, with a warning.
    pub fn classify_or_fallback(&self, layer_id: &str) -> LayerGroup {
        self.classify(layer_id).unwrap_or_else(|| {
            let fallback = LayerGroup::ALL[0];
            warn!(layer_id, %fallback, "unrecognized layer id, using fallback group");
            fallback
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_valid() {
        LayerCatalog::gibs_default().validate().unwrap();
    }

    #[test]
    fn classify_known_ids() {
        let cat = LayerCatalog::gibs_default();
        assert_eq!(
            cat.classify("MODIS_Terra_L3_NDVI_Monthly"),
            Some(LayerGroup::Ndvi)
        );
        assert_eq!(
            cat.classify("MODIS_Terra_NDSI_Snow_Cover"),
            Some(LayerGroup::SnowCover)
        );
        assert_eq!(
            cat.classify("MOPITT_CO_Monthly_Surface_Mixing_Ratio_Day"),
            Some(LayerGroup::CarbonMonoxide)
        );
    }

    #[test]
    fn classify_composite_layer_list() {
        let cat = LayerCatalog::gibs_default();
        let composite = cat.layers_param(LayerGroup::SnowCover).unwrap();
        assert!(composite.starts_with("ASTER_GDEM_Greyscale_Shaded_Relief,Coastlines_15m,"));
        assert_eq!(cat.classify(&composite), Some(LayerGroup::SnowCover));
    }

    #[test]
    fn unknown_id_is_detectable_or_falls_back() {
        let cat = LayerCatalog::gibs_default();
        assert_eq!(cat.classify("VIIRS_SNPP_CorrectedReflectance_TrueColor"), None);
        assert!(matches!(
            cat.classify_strict("nope"),
            Err(AnimatorError::UnknownLayer(_))
        ));
        assert_eq!(
            cat.classify_or_fallback("nope"),
            LayerGroup::CarbonMonoxide
        );
    }

    #[test]
    fn validate_rejects_missing_group() {
        let mut cat = LayerCatalog::gibs_default();
        cat.specs.retain(|s| s.group != LayerGroup::Ndvi);
        assert!(cat.validate().is_err());
    }

    #[test]
    fn groups_use_distinct_box_sizes() {
        let cat = LayerCatalog::gibs_default();
        let co = cat.spec(LayerGroup::CarbonMonoxide).unwrap();
        let ndvi = cat.spec(LayerGroup::Ndvi).unwrap();
        assert!(co.radius_km > ndvi.radius_km);
        assert_ne!(co.width, ndvi.width);
    }
}
