use std::fmt;
use std::path::Path;

use crate::error::CoreError;
use crate::model::{SaveModel, SaveUtility};

/// What a provider knows about a model beyond the model itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelInfo {
    /// Human-readable game or product name, when the provider knows it.
    pub description: Option<String>,
    pub generation: Option<u8>,
    /// Provider-specific schema revision tag.
    pub schema: String,
}

pub struct LoadedModel {
    pub model: Box<dyn SaveModel>,
    pub info: ModelInfo,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model", &self.model.type_name())
            .field("info", &self.info)
            .finish()
    }
}

/// Opens save files into models. Decoding, encoding and validation of the
/// file format all live behind this trait.
pub trait ModelProvider {
    fn name(&self) -> &str;

    fn open(&self, path: &Path) -> Result<LoadedModel, CoreError>;

    /// Static helper collaborator consulted by the persistence selector.
    fn utility(&self) -> Option<&dyn SaveUtility> {
        None
    }
}
