use tokio_util::sync::CancellationToken;
use tracing::trace;

use async_trait::async_trait;

use super::classify_api_error;
use super::grammar;
use super::Dependency;
use super::DependencyData;
use super::DependencyType;
use super::KvPair;
use super::QueryOptions;
use super::ResponseMetadata;
use crate::clients::ClientSet;
use crate::errors::FetchError;
use crate::errors::ParseError;

/// A requested key/value read, `<path>[@<region>]`. A missing key is a
/// watchable state (the pair carries `None`), not a fetch failure.
#[derive(Debug)]
pub struct KvGetQuery {
    stop: CancellationToken,

    path: String,
    region: Option<String>,
}

impl KvGetQuery {
    pub fn new(s: &str) -> Result<Self, ParseError> {
        let (path, region) = grammar::parse_path_query("nomad.var", s)?;
        Ok(Self {
            stop: CancellationToken::new(),
            path,
            region,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Dependency for KvGetQuery {
    async fn fetch(
        &self,
        clients: &ClientSet,
        opts: &QueryOptions,
    ) -> Result<(DependencyData, ResponseMetadata), FetchError> {
        if self.stop.is_cancelled() {
            return Err(FetchError::Stopped);
        }

        let opts = clients.nomad_defaults().merge(opts).merge(&QueryOptions {
            region: self.region.clone(),
            ..Default::default()
        });

        trace!("{self}: GET /v1/var/{}?{}", self.path, opts.to_query_string());

        let call = clients.nomad().kv_get(&self.path, &opts);
        let (value, meta) = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(FetchError::Stopped),
            res = call => {
                res.map_err(|e| classify_api_error(e, self.to_string(), false))?
            }
        };

        trace!("{self}: key present: {}", value.is_some());

        let pair = KvPair {
            path: self.path.clone(),
            value,
        };
        Ok((DependencyData::Kv(pair), meta))
    }

    fn stop(&self) {
        self.stop.cancel();
    }

    fn can_share(&self) -> bool {
        true
    }

    fn dep_type(&self) -> DependencyType {
        DependencyType::Nomad
    }
}

impl std::fmt::Display for KvGetQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nomad.var({})",
            grammar::canonical(None, &self.path, self.region.as_deref())
        )
    }
}
