use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::Error;

/// Deserialize YAML with document-path context in error messages.
pub fn from_yaml_with_path<T: DeserializeOwned>(path: &Path, src: &str) -> Result<T, Error> {
    let de = serde_yaml::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| parse_error(path, err))
}

/// Deserialize JSON with document-path context in error messages.
pub fn from_json_with_path<T: DeserializeOwned>(path: &Path, src: &str) -> Result<T, Error> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| parse_error(path, err))
}

fn parse_error<E: std::fmt::Display>(path: &Path, err: serde_path_to_error::Error<E>) -> Error {
    let location = err.path().to_string();
    Error::SchemaParse {
        path: path.to_path_buf(),
        location,
        message: err.into_inner().to_string(),
    }
}
