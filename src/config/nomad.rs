use serde::Deserialize;
use serde::Serialize;

/// Connection parameters for the scheduler backend. Consumed opaquely by
/// the client constructors; the engine itself never reads these fields.
///
/// Each field can be overridden with `DEPWATCH_NOMAD__*` environment
/// variables (see [`Settings::load`](crate::config::Settings::load)).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NomadConfig {
    /// Base address of the HTTP API
    #[serde(default = "default_nomad_address")]
    pub address: String,

    /// Namespace to scope all queries to (empty = default namespace)
    #[serde(default)]
    pub namespace: String,

    /// Region to scope all queries to (empty = agent's own region)
    #[serde(default)]
    pub region: String,

    /// ACL token attached to every request
    #[serde(default)]
    pub token: String,
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: default_nomad_address(),
            namespace: String::new(),
            region: String::new(),
            token: String::new(),
        }
    }
}

fn default_nomad_address() -> String {
    "http://127.0.0.1:4646".to_string()
}
