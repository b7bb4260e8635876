use std::path::Path;

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML deserialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON deserialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|os_str| os_str.to_str())
}

/// Text formats accepted for configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerdeFormat {
    Yaml,
    Json,
}

impl SerdeFormat {
    pub fn from_path(path: &Path) -> FileFormatResult<Self> {
        let ext = get_file_extension(path).ok_or(FileExtensionError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileExtensionError::UnsupportedFileExtension(
                path.display().to_string(),
            ))
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self, text: &str) -> SerdeFormatResult<T> {
        match self {
            Self::Yaml => Ok(serde_yml::from_str(text)?),
            Self::Json => Ok(serde_json::from_str(text)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(
            SerdeFormat::from_path(Path::new("run.YAML")).unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_path(Path::new("run.yml")).unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_path(Path::new("run.json")).unwrap(),
            SerdeFormat::Json
        );
        assert!(matches!(
            SerdeFormat::from_path(Path::new("run")),
            Err(FileExtensionError::MissingFileExtension)
        ));
        assert!(matches!(
            SerdeFormat::from_path(Path::new("run.toml")),
            Err(FileExtensionError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn deserializes_both_formats() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Sample {
            value: u32,
        }

        let yaml: Sample = SerdeFormat::Yaml.deserialize("value: 3\n").unwrap();
        let json: Sample = SerdeFormat::Json.deserialize("{\"value\": 3}").unwrap();
        assert_eq!(yaml, json);
    }
}
