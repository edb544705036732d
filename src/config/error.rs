use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Channel {name}: unsupported type {kind:?} (supported: {supported})")]
    UnknownChannelType {
        name: String,
        kind: String,
        supported: String,
    },

    #[error("Channel {name}: missing required field {field:?}")]
    MissingField { name: String, field: &'static str },

    #[error("Channel {name}: failed to build HTTP client: {source}")]
    HttpClient {
        name: String,
        source: reqwest::Error,
    },

    #[error("No channels configured")]
    EmptyChannelSet,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
