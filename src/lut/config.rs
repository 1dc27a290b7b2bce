use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

pub const DEFAULT_THRESHOLD: f64 = 0.25;
pub const DEFAULT_NEW_LUT_BLOCKS: [i32; 2] = [-1, -4];
pub const DEFAULT_NEW_LUT_RESIDUALS: [(i32, f64); 2] = [(-1, 0.75), (-4, 0.25)];
/// Residual used for an active block with no explicit weight.
pub const UNMAPPED_RESIDUAL: f64 = 1.0;

/// A LUT that ships already trained, selectable by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedLut {
    pub label: String,
    pub lut_name: String,
    pub blocks: Vec<i32>,
    pub residual_map: BTreeMap<i32, f64>,
    #[serde(default)]
    pub read_only: bool,
}

/// Static list of pre-trained LUTs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PretrainedCatalog {
    entries: Vec<PretrainedLut>,
}

impl Default for PretrainedCatalog {
    fn default() -> Self {
        Self::new(vec![PretrainedLut {
            label: "Astarus AI demo".to_string(),
            lut_name: "demo-f0d18034".to_string(),
            blocks: vec![-1, -4, -9],
            residual_map: BTreeMap::from([(-1, 0.15), (-4, 0.15), (-9, 0.15)]),
            read_only: true,
        }])
    }
}

impl PretrainedCatalog {
    pub fn new(entries: Vec<PretrainedLut>) -> Self {
        Self { entries }
    }

    /// Reads a JSON array of [`PretrainedLut`] from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pre-trained LUTs at {}", path.display()))?;
        let entries: Vec<PretrainedLut> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid pre-trained LUT JSON at {}", path.display()))?;
        info!("Loaded {} pre-trained LUT(s) from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[PretrainedLut] {
        &self.entries
    }

    pub fn first(&self) -> Option<&PretrainedLut> {
        self.entries.first()
    }

    pub fn find(&self, lut_name: &str) -> Option<&PretrainedLut> {
        self.entries.iter().find(|p| p.lut_name == lut_name)
    }

    pub fn is_read_only(&self, lut_name: &str) -> bool {
        self.find(lut_name).is_some_and(|p| p.read_only)
    }

    /// Fresh `demo-xxxxxxxx` name that does not shadow a pre-trained LUT.
    pub fn generate_lut_name(&self) -> String {
        loop {
            let name = random_lut_name("demo");
            if self.find(&name).is_none() {
                return name;
            }
        }
    }
}

/// `<prefix>-` followed by 8 hex characters.
pub fn random_lut_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// Per-session LUT settings: which memory blocks exist, which are active, and
/// how strongly each one blends into the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LutConfig {
    pub lut_name: String,
    pub available_blocks: Vec<i32>,
    pub wnn_blocks: Vec<i32>,
    pub residual_map: BTreeMap<i32, f64>,
    pub threshold: f64,
    pub read_only: bool,
}

impl LutConfig {
    pub fn new_lut(lut_name: impl Into<String>) -> Self {
        Self {
            lut_name: lut_name.into(),
            available_blocks: DEFAULT_NEW_LUT_BLOCKS.to_vec(),
            wnn_blocks: DEFAULT_NEW_LUT_BLOCKS.to_vec(),
            residual_map: BTreeMap::from(DEFAULT_NEW_LUT_RESIDUALS),
            threshold: DEFAULT_THRESHOLD,
            read_only: false,
        }
    }

    pub fn from_pretrained(pretrained: &PretrainedLut) -> Self {
        Self {
            lut_name: pretrained.lut_name.clone(),
            available_blocks: pretrained.blocks.clone(),
            wnn_blocks: pretrained.blocks.clone(),
            residual_map: pretrained.residual_map.clone(),
            threshold: DEFAULT_THRESHOLD,
            read_only: pretrained.read_only,
        }
    }

    /// Resolves `lut_name` against the catalog, falling back to new-LUT defaults.
    pub fn resolve(catalog: &PretrainedCatalog, lut_name: &str) -> Self {
        match catalog.find(lut_name) {
            Some(pretrained) => Self::from_pretrained(pretrained),
            None => Self::new_lut(lut_name),
        }
    }

    /// One residual per active block, in block order.
    pub fn current_residuals(&self) -> Vec<f64> {
        self.wnn_blocks
            .iter()
            .map(|b| self.residual_map.get(b).copied().unwrap_or(UNMAPPED_RESIDUAL))
            .collect()
    }

    pub fn toggle_block(&mut self, block: i32) -> Result<(), AppError> {
        if !self.available_blocks.contains(&block) {
            return Err(AppError::UnknownBlock { block });
        }
        if let Some(pos) = self.wnn_blocks.iter().position(|b| *b == block) {
            self.wnn_blocks.remove(pos);
        } else {
            self.wnn_blocks.push(block);
        }
        Ok(())
    }

    pub fn set_residual(&mut self, block: i32, value: f64) -> Result<(), AppError> {
        if !self.available_blocks.contains(&block) {
            return Err(AppError::UnknownBlock { block });
        }
        self.residual_map.insert(block, value);
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// New blocks start active with a residual of 1.0.
    pub fn add_block(&mut self, block: i32) -> Result<(), AppError> {
        self.ensure_writable()?;
        if self.available_blocks.contains(&block) {
            return Err(AppError::DuplicateBlock { block });
        }
        self.available_blocks.push(block);
        self.wnn_blocks.push(block);
        self.residual_map.insert(block, UNMAPPED_RESIDUAL);
        Ok(())
    }

    pub fn delete_block(&mut self, block: i32) -> Result<(), AppError> {
        self.ensure_writable()?;
        if !self.available_blocks.contains(&block) {
            return Err(AppError::UnknownBlock { block });
        }
        self.available_blocks.retain(|b| *b != block);
        self.wnn_blocks.retain(|b| *b != block);
        self.residual_map.remove(&block);
        Ok(())
    }

    pub fn ensure_writable(&self) -> Result<(), AppError> {
        if self.read_only {
            return Err(AppError::ReadOnlyLut { lut_name: self.lut_name.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lut_defaults() {
        let lut = LutConfig::new_lut("demo-12345678");
        assert_eq!(lut.wnn_blocks, vec![-1, -4]);
        assert_eq!(lut.current_residuals(), vec![0.75, 0.25]);
        assert_eq!(lut.threshold, DEFAULT_THRESHOLD);
        assert!(!lut.read_only);
    }

    #[test]
    fn residuals_follow_active_block_order() {
        let mut lut = LutConfig::new_lut("x");
        lut.toggle_block(-1).unwrap();
        assert_eq!(lut.current_residuals(), vec![0.25]);
        lut.toggle_block(-1).unwrap();
        assert_eq!(lut.wnn_blocks, vec![-4, -1]);
        assert_eq!(lut.current_residuals(), vec![0.25, 0.75]);
    }

    #[test]
    fn unmapped_residual_defaults_to_one() {
        let mut lut = LutConfig::new_lut("x");
        lut.residual_map.remove(&-4);
        assert_eq!(lut.current_residuals(), vec![0.75, 1.0]);
    }

    #[test]
    fn add_and_delete_blocks() {
        let mut lut = LutConfig::new_lut("x");
        lut.add_block(-9).unwrap();
        assert_eq!(lut.current_residuals(), vec![0.75, 0.25, 1.0]);
        assert!(matches!(lut.add_block(-9), Err(AppError::DuplicateBlock { block: -9 })));

        lut.delete_block(-1).unwrap();
        assert_eq!(lut.available_blocks, vec![-4, -9]);
        assert_eq!(lut.wnn_blocks, vec![-4, -9]);
        assert!(!lut.residual_map.contains_key(&-1));
        assert!(matches!(lut.delete_block(-1), Err(AppError::UnknownBlock { block: -1 })));
    }

    #[test]
    fn read_only_lut_rejects_structural_edits() {
        let catalog = PretrainedCatalog::default();
        let mut lut = LutConfig::resolve(&catalog, "demo-f0d18034");
        assert!(lut.read_only);
        assert_eq!(lut.current_residuals(), vec![0.15, 0.15, 0.15]);
        assert!(matches!(lut.add_block(-2), Err(AppError::ReadOnlyLut { .. })));
        assert!(matches!(lut.delete_block(-1), Err(AppError::ReadOnlyLut { .. })));
        // tuning is still allowed
        lut.set_residual(-1, 0.5).unwrap();
        lut.toggle_block(-9).unwrap();
        assert_eq!(lut.current_residuals(), vec![0.5, 0.15]);
    }

    #[test]
    fn generated_names_avoid_catalog() {
        let catalog = PretrainedCatalog::default();
        let name = catalog.generate_lut_name();
        assert!(name.starts_with("demo-"));
        assert_eq!(name.len(), "demo-".len() + 8);
        assert!(catalog.find(&name).is_none());
    }

    #[test]
    fn catalog_json_uses_string_block_keys() {
        let json = r#"[{"label":"L","lut_name":"demo-aaaaaaaa","blocks":[-1],"residual_map":{"-1":0.3}}]"#;
        let entries: Vec<PretrainedLut> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].residual_map.get(&-1), Some(&0.3));
        assert!(!entries[0].read_only);
    }
}
