pub mod client;
pub mod config;
pub mod docs;
pub mod profile;

pub use client::{GenerationRequest, GenerationResponse, LutClient, Residuals, TrainingRequest};
pub use config::{LutConfig, PretrainedCatalog, PretrainedLut};
pub use profile::{ChatProfile, PairKind};
