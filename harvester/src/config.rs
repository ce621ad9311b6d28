use collector::config::Config as CollectorConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Debug, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub collector: CollectorConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    const COLLECTOR_YAML: &str = r#"
collector:
    listener:
        host: 0.0.0.0
        port: 3000
    admin_listener:
        host: 127.0.0.1
        port: 3001
    auth:
        url: https://auth.example.com/login
        body:
            username: svc
            password: secret
    upstream:
        url: https://api.example.com/records
        workspace: ws-123
        page_deduction: 1
"#;

    #[test]
    fn collector_config() {
        let tmp = write_tmp_file(COLLECTOR_YAML);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert!(config.common.metrics.is_none());
        assert!(config.common.logging.is_none());
        assert_eq!(config.collector.upstream.workspace, "ws-123");
        assert_eq!(config.collector.upstream.page_deduction, 1);
        assert_eq!(config.collector.upstream.max_concurrency, 10);
        assert!(config.collector.validate().is_ok());
    }

    #[test]
    fn common_config() {
        let yaml = format!(
            r#"
metrics:
    statsd_host: 127.0.0.1
    statsd_port: 8125
logging:
    sentry_dsn: https://key@sentry.example.com/1
{COLLECTOR_YAML}"#
        );
        let tmp = write_tmp_file(&yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_host, "127.0.0.1");
        assert_eq!(metrics.statsd_port, 8125);
        assert_eq!(
            config.common.logging.expect("logging config").sentry_dsn,
            "https://key@sentry.example.com/1"
        );
    }

    #[test]
    fn missing_file() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/harvester.yaml"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::LoadError(_)));
    }

    #[test]
    fn missing_collector_section() {
        let tmp = write_tmp_file("metrics:\n    statsd_host: localhost\n    statsd_port: 8125\n");
        let err = Config::from_file(tmp.path()).expect_err("no collector section");
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
