use std::path::{Path, PathBuf};

use thiserror::Error;

/// Startup configuration, four ordered lines in `config.txt`:
/// source identifier, model reference, confidence threshold, text size.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source: String,
    pub model_ref: String,
    pub conf_threshold: f32,
    pub text_size: u32,
}

/// Line parameters, four ordered lines in `input.txt`. Free-form strings,
/// reused verbatim in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParams {
    pub operators: String,
    pub baskets: String,
    pub demand: String,
    pub temperature: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: missing line {line} ({field})")]
    MissingField { path: PathBuf, line: usize, field: &'static str },
    #[error("{field}: cannot parse {value:?}")]
    Parse { field: &'static str, value: String },
    #[error("confidence threshold {0} outside 0..=1")]
    ThresholdRange(f32),
}

fn read_lines(path: &Path, want: usize, fields: &[&'static str]) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
    for (i, field) in fields.iter().copied().enumerate().take(want) {
        if lines.get(i).map(|l| l.is_empty()).unwrap_or(true) {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                line: i + 1,
                field,
            });
        }
    }
    Ok(lines)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let fields = ["source", "model reference", "confidence threshold", "text size"];
        let lines = read_lines(path, 4, &fields)?;

        let conf_threshold: f32 = lines[2].parse().map_err(|_| ConfigError::Parse {
            field: "confidence threshold",
            value: lines[2].clone(),
        })?;
        if !(0.0..=1.0).contains(&conf_threshold) {
            return Err(ConfigError::ThresholdRange(conf_threshold));
        }
        let text_size: u32 = lines[3].parse().map_err(|_| ConfigError::Parse {
            field: "text size",
            value: lines[3].clone(),
        })?;

        Ok(Self {
            source: lines[0].clone(),
            model_ref: lines[1].clone(),
            conf_threshold,
            text_size,
        })
    }
}

impl InputParams {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let fields = ["operators", "baskets", "demand", "temperature"];
        let lines = read_lines(path, 4, &fields)?;
        Ok(Self {
            operators: lines[0].clone(),
            baskets: lines[1].clone(),
            demand: lines[2].clone(),
            temperature: lines[3].clone(),
        })
    }
}

/// Backing-file provider; read once at startup and again on refresh.
#[derive(Debug, Clone)]
pub struct FileProvider {
    pub config_path: PathBuf,
    pub input_path: PathBuf,
}

impl FileProvider {
    pub fn new(config_path: impl Into<PathBuf>, input_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into(), input_path: input_path.into() }
    }

    pub fn load(&self) -> Result<(Config, InputParams), ConfigError> {
        Ok((Config::load(&self.config_path)?, InputParams::load(&self.input_path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_four_ordered_config_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "config.txt", "0\nmodels/line3.onnx\n0.45\n2\n");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.source, "0");
        assert_eq!(cfg.model_ref, "models/line3.onnx");
        assert!((cfg.conf_threshold - 0.45).abs() < 1e-6);
        assert_eq!(cfg.text_size, 2);
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "config.txt", "0\nm\n1.5\n2\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::ThresholdRange(_))));
    }

    #[test]
    fn short_file_names_the_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "config.txt", "0\nm\n");
        match Config::load(&path) {
            Err(ConfigError::MissingField { line: 3, field, .. }) => {
                assert_eq!(field, "confidence threshold");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/config.txt")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn input_values_are_taken_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "input.txt", "Ana, Bel\n12\n500\n18C\n");
        let inp = InputParams::load(&path).unwrap();
        assert_eq!(inp.operators, "Ana, Bel");
        assert_eq!(inp.baskets, "12");
        assert_eq!(inp.demand, "500");
        assert_eq!(inp.temperature, "18C");
    }

    #[test]
    fn provider_reload_is_stable_for_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = write_file(dir.path(), "config.txt", "0\nm\n0.4\n2\n");
        let inp = write_file(dir.path(), "input.txt", "3\n12\n500\n18C\n");
        let provider = FileProvider::new(cfg, inp);
        let first = provider.load().unwrap();
        let second = provider.load().unwrap();
        assert_eq!(first, second);
    }
}
