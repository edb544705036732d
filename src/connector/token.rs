use tracing::warn;

/// Source of bearer tokens attached to backend requests.
///
/// A process-wide provider is constructed at startup from the CLI; a channel
/// may override it with a token read from an environment variable.
#[derive(Debug, Clone)]
pub enum TokenProvider {
    Disabled,
    Static(String),
    Env(String),
}

impl TokenProvider {
    pub fn token(&self) -> Option<String> {
        match self {
            TokenProvider::Disabled => None,
            TokenProvider::Static(token) => Some(token.clone()),
            TokenProvider::Env(var) => match std::env::var(var) {
                Ok(token) => Some(token),
                Err(_) => {
                    warn!("token environment variable {var} is not set");
                    None
                }
            },
        }
    }
}
