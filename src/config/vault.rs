use serde::Deserialize;
use serde::Serialize;

/// Connection parameters for the secret backend.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VaultConfig {
    /// Base address of the HTTP API
    #[serde(default = "default_vault_address")]
    pub address: String,

    /// Namespace to scope all queries to (empty = root namespace)
    #[serde(default)]
    pub namespace: String,

    /// Token attached to every request
    #[serde(default)]
    pub token: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: default_vault_address(),
            namespace: String::new(),
            token: String::new(),
        }
    }
}

fn default_vault_address() -> String {
    "http://127.0.0.1:8200".to_string()
}
