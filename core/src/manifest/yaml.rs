use std::{
    env,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use regex::{Captures, Regex};
use tracing::error;

use crate::manifest::core::Manifest;

pub const YAML_CONFIG_NAME: &str = "marketsync.yaml";

#[derive(thiserror::Error, Debug)]
pub enum ReadManifestError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse manifest: {0}")]
    CouldNotParseManifest(#[from] serde_yaml::Error),

    #[error("Could not substitute env variables: {0}")]
    CouldNotSubstituteEnvVariables(#[from] regex::Error),

    #[error("Environment variable {0} not found")]
    MissingEnvVariable(String),
}

/// Expands `${VAR}` references in the raw manifest text from the process
/// environment before parsing.
fn substitute_env_variables(contents: &str) -> Result<String, ReadManifestError> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;

    let mut missing: Vec<String> = vec![];
    let result = re
        .replace_all(contents, |caps: &Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => {
                    error!("Environment variable {} not found", var_name);
                    missing.push(var_name.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    if let Some(name) = missing.into_iter().next() {
        return Err(ReadManifestError::MissingEnvVariable(name));
    }

    Ok(result)
}

pub fn read_manifest(file_path: &Path) -> Result<Manifest, ReadManifestError> {
    dotenv::dotenv().ok();

    let mut file = File::open(file_path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let contents = substitute_env_variables(&contents)?;
    let manifest: Manifest = serde_yaml::from_str(&contents)?;
    Ok(manifest)
}

#[derive(thiserror::Error, Debug)]
pub enum WriteManifestError {
    #[error("Could not parse manifest to string: {0}")]
    CouldNotTurnManifestToString(serde_yaml::Error),

    #[error("Could not create file: {0}")]
    CouldNotCreateFile(std::io::Error),

    #[error("Could not write to file: {0}")]
    CouldNotWriteToFile(std::io::Error),
}

pub fn write_manifest(data: &Manifest, file_path: &Path) -> Result<(), WriteManifestError> {
    let yaml_string =
        serde_yaml::to_string(data).map_err(WriteManifestError::CouldNotTurnManifestToString)?;

    let mut file = File::create(file_path).map_err(WriteManifestError::CouldNotCreateFile)?;
    file.write_all(yaml_string.as_bytes()).map_err(WriteManifestError::CouldNotWriteToFile)?;
    Ok(())
}
