//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot determine the software root directory: {0}")]
    SwRootUnavailable(std::io::Error),

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the `params` directory under the software
/// root (see [`crate::host::get_sw_root`]). Absolute paths are used as given.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let path = if Path::new(param_file_path).is_absolute() {
        Path::new(param_file_path).to_path_buf()
    } else {
        let mut path = crate::host::get_sw_root().map_err(LoadError::SwRootUnavailable)?;
        path.push("params");
        path.push(param_file_path);
        path
    };

    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    from_str(&params_str)
}

/// Parse parameters from a TOML string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestParams {
        gain: f64,
        #[serde(default)]
        limit_deg: Option<f64>,
    }

    #[test]
    fn test_from_str() {
        let p: TestParams = from_str("gain = 2.0\nlimit_deg = 35.0").unwrap();
        assert_eq!(p.gain, 2.0);
        assert_eq!(p.limit_deg, Some(35.0));

        let p: TestParams = from_str("gain = 0.5").unwrap();
        assert_eq!(p.limit_deg, None);
    }

    #[test]
    fn test_from_str_invalid() {
        match from_str::<TestParams>("gain = \"fast\"") {
            Err(LoadError::DeserialiseError(_)) => (),
            other => panic!("Expected a deserialise error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        match load::<TestParams>("/definitely/not/a/params/file.toml") {
            Err(LoadError::FileLoadError(_)) => (),
            other => panic!("Expected a file load error, got {:?}", other),
        }
    }
}
