use std::{collections::HashMap, path::Path};

use anyhow::Context as _;

use crate::{
    compose::surface::DecodedImage,
    foundation::error::AnimatorResult,
    layers::LayerGroup,
};

/// Legend images keyed by layer group. Built once, then read-only; groups without an entry are
/// drawn without a legend.
#[derive(Clone, Debug, Default)]
pub struct LegendRegistry {
    legends: HashMap<LayerGroup, DecodedImage>,
}

impl LegendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and register a legend image (any format the `image` crate reads).
    pub fn insert_encoded(&mut self, group: LayerGroup, bytes: &[u8]) -> AnimatorResult<()> {
        let img = DecodedImage::decode(bytes)?;
        self.legends.insert(group, img);
        Ok(())
    }

    pub fn load_file(&mut self, group: LayerGroup, path: &Path) -> AnimatorResult<()> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read legend for '{group}' from '{}'", path.display()))?;
        self.insert_encoded(group, &bytes)
    }

    pub fn from_files<'a>(
        entries: impl IntoIterator<Item = (LayerGroup, &'a Path)>,
    ) -> AnimatorResult<Self> {
        let mut reg = Self::new();
        for (group, path) in entries {
            reg.load_file(group, path)?;
        }
        Ok(reg)
    }

    pub fn get(&self, group: LayerGroup) -> Option<&DecodedImage> {
        self.legends.get(&group)
    }

    pub fn len(&self) -> usize {
        self.legends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legends.is_empty()
    }
}
