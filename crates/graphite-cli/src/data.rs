use crate::error::{CliError, Result};
use crate::utils::parser::{self, ModelName};
use directories::ProjectDirs;
use graphite::core::nn::weights::ModelWeights;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const WEIGHTS_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModel {
    pub name: String,
    pub tag: String,
    pub path: PathBuf,
}

/// Local directory of weight sets, laid out as `<base>/<name>/<tag>.json`.
#[derive(Debug)]
pub struct ModelDirectory {
    base_path: PathBuf,
}

impl ModelDirectory {
    pub fn new() -> Result<Self> {
        let path = Self::determine_model_path()?;
        debug!("ModelDirectory initialized with path: {:?}", &path);
        Ok(Self { base_path: path })
    }

    pub fn with_custom_path(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    pub fn resolve(&self, model: &ModelName) -> PathBuf {
        self.base_path
            .join(&model.name)
            .join(format!("{}.{}", model.tag, WEIGHTS_EXTENSION))
    }

    /// Resolves a weights reference given as a path or as `name[@tag]`.
    pub fn resolve_reference(&self, reference: &str) -> Result<PathBuf> {
        let path = Path::new(reference);
        if path.is_absolute() || reference.contains(['/', '\\']) || reference.ends_with(".json") {
            if !path.exists() {
                return Err(CliError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Provided path does not exist: {}", reference),
                )));
            }
            return Ok(path.to_path_buf());
        }

        let model = parser::parse_model_name(reference)
            .map_err(|e| CliError::Argument(e.to_string()))?;
        let resolved = self.resolve(&model);
        if !resolved.exists() {
            return Err(CliError::Data(format!(
                "Model weights do not exist: {:?}.\nHint: Run 'graphite init-weights --name {}' or 'graphite models list'.",
                resolved, model.name
            )));
        }
        Ok(resolved)
    }

    /// Every installed weight set, sorted by name then tag.
    pub fn list(&self) -> Result<Vec<InstalledModel>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut models = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            for file in fs::read_dir(entry.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(WEIGHTS_EXTENSION) {
                    continue;
                }
                if let Some(tag) = path.file_stem().and_then(|s| s.to_str()) {
                    models.push(InstalledModel {
                        name: name.clone(),
                        tag: tag.to_string(),
                        path: path.clone(),
                    });
                }
            }
        }
        models.sort_by(|a, b| (&a.name, &a.tag).cmp(&(&b.name, &b.tag)));
        Ok(models)
    }

    /// Writes `weights` under their header name and `tag`.
    pub fn install(&self, weights: &ModelWeights, tag: &str, force: bool) -> Result<PathBuf> {
        let model = parser::parse_model_name(&format!("{}@{}", weights.name(), tag))
            .map_err(|e| CliError::Argument(e.to_string()))?;
        let path = self.resolve(&model);
        if path.exists() && !force {
            return Err(CliError::Data(format!(
                "Weights already installed at {:?}. Use --force to overwrite.",
                path
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_weights(&path, weights)?;
        info!("Installed model '{}@{}' to {:?}", model.name, model.tag, &path);
        Ok(path)
    }

    pub fn set_custom_path(path: &Path) -> Result<()> {
        if !path.is_absolute() {
            return Err(CliError::Argument(format!(
                "Model directory must be an absolute path: {}",
                path.display()
            )));
        }
        let value = path.to_str().ok_or_else(|| {
            CliError::Argument(format!("Path is not valid UTF-8: {}", path.display()))
        })?;
        let config_path = Self::path_config_file()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, value).map_err(CliError::from)
    }

    pub fn reset_path() -> Result<()> {
        if let Ok(config_path) = Self::path_config_file() {
            if config_path.exists() {
                fs::remove_file(config_path)?;
            }
        }
        Ok(())
    }

    fn determine_model_path() -> Result<PathBuf> {
        match Self::path_config_file() {
            Ok(config_path) if config_path.exists() => {
                let custom = fs::read_to_string(&config_path)?.trim().to_string();
                if custom.is_empty() {
                    warn!("Custom path config file is empty, falling back to default path.");
                    Self::default_model_path()
                } else {
                    Ok(PathBuf::from(custom))
                }
            }
            _ => Self::default_model_path(),
        }
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "graphite", "graphite")
            .ok_or_else(|| CliError::Data("Could not determine the home directory.".to_string()))
    }

    fn path_config_file() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("models-path.conf"))
    }

    fn default_model_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().join("models"))
    }
}

pub fn read_weights(path: &Path) -> Result<ModelWeights> {
    debug!("Reading model weights from {:?}", path);
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

pub fn write_weights(path: &Path, weights: &ModelWeights) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, weights).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphite::core::nn::weights::Architecture;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    fn weights(name: &str) -> ModelWeights {
        let arch = Architecture {
            feature_width: 4,
            num_layers: 1,
            num_species: 4,
            num_radial_basis: 4,
            equivariant: false,
            update_edges: true,
            node_attr_width: 0,
            edge_attr_width: 0,
        };
        ModelWeights::initialize(name, &arch, 3.0, &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn logical_names_resolve_inside_the_directory() {
        let temp_dir = tempdir().unwrap();
        let directory = ModelDirectory::with_custom_path(temp_dir.path().to_path_buf());
        let model = parser::parse_model_name("demo@v3").unwrap();
        assert_eq!(directory.resolve(&model), temp_dir.path().join("demo/v3.json"));
    }

    #[test]
    fn installed_weights_are_listed_and_resolvable() {
        let temp_dir = tempdir().unwrap();
        let directory = ModelDirectory::with_custom_path(temp_dir.path().to_path_buf());
        directory.install(&weights("zeta"), "v1", false).unwrap();
        directory.install(&weights("alpha"), "latest", false).unwrap();

        let listed = directory.list().unwrap();
        let names: Vec<_> = listed.iter().map(|m| (m.name.as_str(), m.tag.as_str())).collect();
        assert_eq!(names, vec![("alpha", "latest"), ("zeta", "v1")]);

        let path = directory.resolve_reference("alpha").unwrap();
        let restored = read_weights(&path).unwrap();
        assert_eq!(restored.header, weights("alpha").header);
    }

    #[test]
    fn install_refuses_to_overwrite_without_force() {
        let temp_dir = tempdir().unwrap();
        let directory = ModelDirectory::with_custom_path(temp_dir.path().to_path_buf());
        directory.install(&weights("demo"), "v1", false).unwrap();
        assert!(matches!(
            directory.install(&weights("demo"), "v1", false),
            Err(CliError::Data(_))
        ));
        assert!(directory.install(&weights("demo"), "v1", true).is_ok());
    }

    #[test]
    fn missing_references_are_reported() {
        let temp_dir = tempdir().unwrap();
        let directory = ModelDirectory::with_custom_path(temp_dir.path().to_path_buf());
        assert!(matches!(
            directory.resolve_reference("absent@v1"),
            Err(CliError::Data(_))
        ));
        assert!(matches!(
            directory.resolve_reference("./absent.json"),
            Err(CliError::Io(_))
        ));
    }

    #[test]
    fn listing_a_missing_directory_is_empty() {
        let temp_dir = tempdir().unwrap();
        let directory = ModelDirectory::with_custom_path(temp_dir.path().join("nowhere"));
        assert!(directory.list().unwrap().is_empty());
    }
}
