//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

pub struct FileConfigAdapter {
    config: Ini,
    /// Directory relative file paths in the config are resolved against.
    base_dir: Option<PathBuf>,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self {
            config,
            base_dir: path.parent().map(Path::to_path_buf),
        })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self {
            config,
            base_dir: None,
        })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    /// Relative paths are taken from the config file's directory.
    fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        let value = self.config.get(section, key)?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let path = PathBuf::from(value);
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
panel = data/sp500_prices.csv

[strategy]
selection_percentile = 0.1
min_population = 50
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "panel"),
            Some("data/sp500_prices.csv".to_string())
        );
        assert_eq!(adapter.get_int("strategy", "min_population", 0), 50);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nrebalance = monthly\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_missing_or_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[strategy]\nlong_window = abc\n").unwrap();
        assert_eq!(adapter.get_int("strategy", "long_window", 60), 60);
        assert_eq!(adapter.get_int("strategy", "missing", 42), 42);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ntransaction_cost_rate = 0.0025\n").unwrap();
        assert_eq!(
            adapter.get_double("backtest", "transaction_cost_rate", 0.0),
            0.0025
        );
        assert_eq!(adapter.get_double("backtest", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ntrading_days_per_year = many\n").unwrap();
        assert_eq!(
            adapter.get_double("backtest", "trading_days_per_year", 252.0),
            252.0
        );
    }

    #[test]
    fn get_bool_values() {
        let adapter = FileConfigAdapter::from_string(
            "[output]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("output", "a", false));
        assert!(adapter.get_bool("output", "b", false));
        assert!(adapter.get_bool("output", "c", false));
        assert!(!adapter.get_bool("output", "d", true));
        assert!(!adapter.get_bool("output", "e", true));
        assert!(!adapter.get_bool("output", "f", true));
        assert!(adapter.get_bool("output", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[output]\nreturns = out/returns.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("output", "returns"),
            Some("out/returns.csv".to_string())
        );
    }

    #[test]
    fn get_path_is_relative_to_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.ini");
        std::fs::write(
            &path,
            "[data]\npanel = prices.csv\nrisk_free = /abs/dgs1.csv\nconstituents =\n",
        )
        .unwrap();

        let adapter = FileConfigAdapter::from_file(&path).unwrap();
        assert_eq!(
            adapter.get_path("data", "panel"),
            Some(dir.path().join("prices.csv"))
        );
        assert_eq!(
            adapter.get_path("data", "risk_free"),
            Some(PathBuf::from("/abs/dgs1.csv"))
        );
        assert_eq!(adapter.get_path("data", "constituents"), None);
        assert_eq!(adapter.get_path("data", "missing"), None);
    }

    #[test]
    fn get_path_without_file_is_unchanged() {
        let adapter = FileConfigAdapter::from_string("[data]\npanel = prices.csv\n").unwrap();
        assert_eq!(
            adapter.get_path("data", "panel"),
            Some(PathBuf::from("prices.csv"))
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
