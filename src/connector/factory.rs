use crate::config::{ChannelConfig, ConfigError, ConfigResult};
use crate::connector::httpbus::HttpBusConnector;
use crate::connector::token::TokenProvider;
use crate::connector::Connector;
use crate::metrics::StatusCounter;
use crate::probe::CorrelationMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Core handles a connector needs to report completions.
#[derive(Clone)]
pub struct BuildContext {
    pub correlation: Arc<CorrelationMap>,
    pub tokens: TokenProvider,
    pub status: Arc<StatusCounter>,
}

type BuilderFn =
    Box<dyn Fn(&str, &ChannelConfig, &BuildContext) -> ConfigResult<Arc<dyn Connector>> + Send + Sync>;

/// Static mapping from a channel type identifier to a connector constructor.
/// The set is closed and known at startup; tests may register extra kinds.
pub struct ConnectorFactory {
    builders: BTreeMap<&'static str, BuilderFn>,
}

impl Default for ConnectorFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConnectorFactory {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut factory = Self::empty();
        factory.register("httpbus", |name, config, ctx| {
            Ok(Arc::new(HttpBusConnector::new(name, config, ctx)?))
        });
        factory
    }

    pub fn register<F>(&mut self, kind: &'static str, builder: F)
    where
        F: Fn(&str, &ChannelConfig, &BuildContext) -> ConfigResult<Arc<dyn Connector>>
            + Send
            + Sync
            + 'static,
    {
        self.builders.insert(kind, Box::new(builder));
    }

    pub fn build(
        &self,
        name: &str,
        config: &ChannelConfig,
        ctx: &BuildContext,
    ) -> ConfigResult<Arc<dyn Connector>> {
        match self.builders.get(config.kind.as_str()) {
            Some(builder) => builder(name, config, ctx),
            None => Err(ConfigError::UnknownChannelType {
                name: name.to_string(),
                kind: config.kind.clone(),
                supported: self
                    .builders
                    .keys()
                    .copied()
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: &str) -> ChannelConfig {
        ChannelConfig {
            kind: kind.into(),
            interval: 10,
            max_wait: 60,
            receivers: 1,
            trash_size: 100,
            host: Some("https://bus.example.org".into()),
            topic: Some("e2e".into()),
            verify: true,
            token_env: None,
        }
    }

    fn ctx() -> BuildContext {
        BuildContext {
            correlation: Arc::new(CorrelationMap::new()),
            tokens: TokenProvider::Disabled,
            status: Arc::new(StatusCounter::new()),
        }
    }

    #[test]
    fn test_builds_known_kind() {
        let factory = ConnectorFactory::with_defaults();
        assert!(factory.build("orders", &config("httpbus"), &ctx()).is_ok());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let factory = ConnectorFactory::with_defaults();
        let err = factory
            .build("orders", &config("carrier-pigeon"), &ctx())
            .unwrap_err();
        match err {
            ConfigError::UnknownChannelType {
                kind, supported, ..
            } => {
                assert_eq!(kind, "carrier-pigeon");
                assert!(supported.contains("httpbus"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_backend_field_is_rejected() {
        let factory = ConnectorFactory::with_defaults();
        let mut bad = config("httpbus");
        bad.host = None;
        assert!(matches!(
            factory.build("orders", &bad, &ctx()),
            Err(ConfigError::MissingField { field: "host", .. })
        ));
    }
}
