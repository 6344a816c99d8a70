use std::path::{Path, PathBuf};

use serde::Deserialize;
use sul_core::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::{
    engine::{NoiseTolerantEngine, TiePolicy},
    log::{FileLog, QueryLog, TracingLog},
    oracle::SulOracle,
    session::{ProcessConfig, ProcessSession, SessionError},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("could not open query log: {0}")]
    Log(#[source] std::io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

fn default_reruns() -> usize {
    NoiseTolerantEngine::DEFAULT_RERUNS
}

/// The input alphabet, either as a list of symbols or as one space separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AlphabetSpec {
    List(Vec<String>),
    Line(String),
}

/// Where answered queries are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogConfig {
    /// Append traces to this file, otherwise they are emitted as `tracing` events.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Configuration of a learning session against an external process.
///
/// # Example
/// ```
/// use sul_oracle::Config;
/// let config = Config::from_toml(r#"
///     alphabet = "PING PONG"
///     [process]
///     command = "./driver"
/// "#).unwrap();
/// assert_eq!(config.max_reruns, 3);
/// assert!(!config.combine_query);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub alphabet: AlphabetSpec,
    /// Send prefix and suffix as one sequence without retries instead of symbol by symbol.
    #[serde(default)]
    pub combine_query: bool,
    #[serde(default = "default_reruns")]
    pub max_reruns: usize,
    #[serde(default)]
    pub tie_policy: TiePolicy,
    pub process: ProcessConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a configuration from its TOML representation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.alphabet()?;
        if self.max_reruns == 0 {
            return Err(ConfigError::Invalid(
                "max_reruns must be at least 1".to_string(),
            ));
        }
        if self.process.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "process.command must not be empty".to_string(),
            ));
        }
        self.process
            .codec()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn alphabet(&self) -> Result<SimpleAlphabet, ConfigError> {
        let alphabet = match &self.alphabet {
            AlphabetSpec::List(symbols) => SimpleAlphabet::try_new(symbols.iter().cloned()),
            AlphabetSpec::Line(line) => SimpleAlphabet::parse(line, " "),
        };
        alphabet.map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Builds the noise tolerant engine described by this configuration.
    pub fn engine(&self) -> Result<NoiseTolerantEngine, ConfigError> {
        if self.max_reruns == 0 {
            return Err(ConfigError::Invalid(
                "max_reruns must be at least 1".to_string(),
            ));
        }
        Ok(NoiseTolerantEngine::new(self.max_reruns).with_tie_policy(self.tie_policy))
    }

    /// Opens the configured query log.
    pub fn query_log(&self) -> Result<Box<dyn QueryLog + Send>, ConfigError> {
        Ok(match &self.log.path {
            Some(path) => Box::new(FileLog::open(path).map_err(ConfigError::Log)?),
            None => Box::new(TracingLog),
        })
    }

    /// Starts the external process and returns an oracle that is ready to answer queries.
    pub fn start(
        &self,
    ) -> Result<SulOracle<ProcessSession, Box<dyn QueryLog + Send>>, ConfigError> {
        let alphabet = self.alphabet()?;
        let engine = self.engine()?;
        let log = self.query_log()?;
        let session = ProcessSession::start(&self.process)?;
        Ok(SulOracle::new(session, log)
            .with_alphabet(alphabet)
            .combined(self.combine_query)
            .with_engine(engine))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::oracle::MembershipOracle;

    #[test]
    fn defaults() {
        let config = Config::from_toml(
            r#"
            alphabet = ["COMMIT", "CONFIRM"]
            [process]
            command = "python3"
            args = ["driver.py"]
            "#,
        )
        .unwrap();
        assert_eq!(config.alphabet().unwrap().size(), 2);
        assert_eq!(config.max_reruns, 3);
        assert_eq!(config.tie_policy, TiePolicy::FirstSeen);
        assert_eq!(config.process.args, vec!["driver.py".to_string()]);
        assert_eq!(config.process.delimiter_input, " ");
        assert_eq!(config.process.timeout(), None);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn full_configuration() {
        let config = Config::from_toml(
            r#"
            alphabet = "A B C"
            combine_query = true
            max_reruns = 5
            tie_policy = "inconclusive"
            [process]
            command = "./sul"
            delimiter_input = ","
            delimiter_output = ";"
            timeout_ms = 250
            working_dir = "/tmp"
            [log]
            path = "queries.log"
            "#,
        )
        .unwrap();
        assert!(config.combine_query);
        assert_eq!(config.engine().unwrap().max_reruns(), 5);
        assert_eq!(config.engine().unwrap().tie_policy(), TiePolicy::Inconclusive);
        assert_eq!(config.process.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.process.codec().unwrap().output_delimiter(), ";");
        assert_eq!(config.log.path, Some(PathBuf::from("queries.log")));
    }

    #[test]
    fn invalid_configurations() {
        let zero_reruns = r#"
            alphabet = "A"
            max_reruns = 0
            [process]
            command = "./sul"
        "#;
        assert!(matches!(
            Config::from_toml(zero_reruns),
            Err(ConfigError::Invalid(_))
        ));

        let empty_alphabet = r#"
            alphabet = []
            [process]
            command = "./sul"
        "#;
        assert!(matches!(
            Config::from_toml(empty_alphabet),
            Err(ConfigError::Invalid(_))
        ));

        let empty_delimiter = r#"
            alphabet = "A"
            [process]
            command = "./sul"
            delimiter_output = ""
        "#;
        assert!(matches!(
            Config::from_toml(empty_delimiter),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            Config::from_toml("alphabet = 3"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::load("/nonexistent/sul.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test_log::test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sul.toml");
        std::fs::write(
            &path,
            "alphabet = \"PING PONG\"\n[process]\ncommand = \"sh\"\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.process.command, "sh");
    }

    #[cfg(unix)]
    #[test_log::test]
    fn start_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("queries.log");
        let config = Config::from_toml(&format!(
            r#"
            alphabet = "PING PONG"
            [process]
            command = "sh"
            args = ["-c", 'while IFS= read -r line; do [ "$line" = RESET ] || echo OK; done']
            timeout_ms = 5000
            [log]
            path = "{}"
            "#,
            log.display()
        ))
        .unwrap();

        let mut oracle = config.start().unwrap();
        let answer = oracle.answer_query(&word!["PING"], &word!["PONG"]).unwrap();
        assert_eq!(answer, word!["OK"]);
        assert_eq!(
            oracle.answer_query(&word!["PING"], &word!["PONG"]).unwrap(),
            word!["OK"]
        );
        assert_eq!(oracle.executions(), 1);
        oracle.close().unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert_eq!(content, "[PING | PONG / OK | OK]\n");
    }
}
