use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CoreError, CoreErrorCode};
use crate::extract::Extractor;
use crate::library::ProviderLibrary;
use crate::model::{Coordinate, SaveModel};
use crate::mutate::{Acknowledgement, MutationEngine, Origin};
use crate::persist::PersistenceSelector;
use crate::provider::{LoadedModel, ModelInfo};
use crate::report::{ReadOptions, SaveReport, build_report};

/// Entry point tying a loaded provider library to the read and mutation
/// operations.
#[derive(Debug)]
pub struct Engine {
    library: ProviderLibrary,
}

/// One opened save file.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    loaded: LoadedModel,
}

impl Engine {
    pub fn new(library: ProviderLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &ProviderLibrary {
        &self.library
    }

    pub fn open(&self, path: &Path) -> Result<Session, CoreError> {
        require_source(path)?;
        let loaded = self.library.provider().open(path)?;
        info!(
            target: "boxbridge::library",
            path = %path.display(),
            model = loaded.model.type_name(),
            schema = %loaded.info.schema,
            "model loaded"
        );
        Ok(Session {
            path: path.to_path_buf(),
            loaded,
        })
    }

    pub fn check_schema(&self, session: &Session) -> Result<(), CoreError> {
        self.library.check_schema(session.info())
    }

    pub fn extractor(&self) -> Extractor<'_> {
        Extractor::new(self.library.bounds(), self.library.names())
    }

    pub fn report(&self, session: &Session, options: &ReadOptions) -> SaveReport {
        build_report(
            session.model(),
            session.info(),
            options,
            &self.extractor(),
        )
    }

    pub fn relocate(
        &self,
        session: &mut Session,
        from: Coordinate,
    ) -> Result<Acknowledgement, CoreError> {
        let path = session.path.clone();
        self.mutations().relocate(session.model_mut(), &path, from)
    }

    pub fn transfer(
        &self,
        src: &mut Session,
        dst: &mut Session,
        origin: Origin,
    ) -> Result<Acknowledgement, CoreError> {
        let src_path = src.path.clone();
        let dst_path = dst.path.clone();
        self.mutations().transfer(
            src.model_mut(),
            &src_path,
            dst.model_mut(),
            &dst_path,
            origin,
        )
    }

    fn mutations(&self) -> MutationEngine<'_> {
        let persistence = match self.library.provider().utility() {
            Some(utility) => PersistenceSelector::with_utility(utility),
            None => PersistenceSelector::new(),
        };
        MutationEngine::new(self.library.bounds()).with_persistence(persistence)
    }
}

/// Fails with `SourceMissing` unless `path` names an existing file.
pub fn require_source(path: &Path) -> Result<(), CoreError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CoreError::new(
            CoreErrorCode::SourceMissing,
            format!("save file not found: {}", path.display()),
        ))
    }
}

impl Session {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &ModelInfo {
        &self.loaded.info
    }

    pub fn model(&self) -> &dyn SaveModel {
        self.loaded.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn SaveModel {
        self.loaded.model.as_mut()
    }
}
