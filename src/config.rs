use crate::symbol::meta::ShaderStage;

/// Symbol names looked up for each pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointNames {
    pub vertex: String,
    pub hull: String,
    pub domain: String,
    pub geometry: String,
    pub pixel: String,
    pub compute: String,
}
impl Default for EntryPointNames {
    fn default() -> Self {
        Self {
            vertex: "VSMain".into(),
            hull: "HSMain".into(),
            domain: "DSMain".into(),
            geometry: "GSMain".into(),
            pixel: "PSMain".into(),
            compute: "CSMain".into(),
        }
    }
}
impl EntryPointNames {
    pub fn get(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Hull => &self.hull,
            ShaderStage::Domain => &self.domain,
            ShaderStage::Geometry => &self.geometry,
            ShaderStage::Pixel => &self.pixel,
            ShaderStage::Compute => &self.compute,
        }
    }

    pub fn set(&mut self, stage: ShaderStage, name: impl Into<String>) {
        let slot = match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Hull => &mut self.hull,
            ShaderStage::Domain => &mut self.domain,
            ShaderStage::Geometry => &mut self.geometry,
            ShaderStage::Pixel => &mut self.pixel,
            ShaderStage::Compute => &mut self.compute,
        };
        *slot = name.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerConfig {
    pub entry_points: EntryPointNames,
    /// Adds `OriginUpperLeft` to the pixel wrapper.
    pub origin_upper_left: bool,
}
impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            entry_points: EntryPointNames::default(),
            origin_upper_left: true,
        }
    }
}
