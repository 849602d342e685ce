use tokio_util::sync::CancellationToken;
use tracing::trace;

use async_trait::async_trait;

use super::classify_api_error;
use super::grammar;
use super::sorted_tags;
use super::Dependency;
use super::DependencyData;
use super::DependencyType;
use super::NomadServiceSnippet;
use super::QueryOptions;
use super::ResponseMetadata;
use crate::clients::ClientSet;
use crate::errors::FetchError;
use crate::errors::ParseError;

/// A requested listing of all registered services, `[@<region>]`.
/// The listing is filtered to the connection's namespace and sorted by
/// name so consecutive fetches of the same state compare equal.
#[derive(Debug)]
pub struct NomadServicesQuery {
    stop: CancellationToken,

    region: Option<String>,
}

impl NomadServicesQuery {
    pub fn new(s: &str) -> Result<Self, ParseError> {
        let region = if s.is_empty() {
            None
        } else {
            let (left, region) = grammar::split_region("nomad.services", s)?;
            if !left.is_empty() || region.is_none() {
                return Err(ParseError::InvalidFormat {
                    kind: "nomad.services",
                    input: s.to_string(),
                });
            }
            region
        };
        Ok(Self {
            stop: CancellationToken::new(),
            region,
        })
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

#[async_trait]
impl Dependency for NomadServicesQuery {
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

        trace!("{self}: GET /v1/services?{}", opts.to_query_string());

        let call = clients.nomad().list_services(&opts);
        let (listings, meta) = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(FetchError::Stopped),
            res = call => {
                res.map_err(|e| classify_api_error(e, self.to_string(), false))?
            }
        };

        let entries = listings
            .into_iter()
            .find(|l| l.namespace == clients.nomad_namespace())
            .map(|l| l.services)
            .unwrap_or_default();

        trace!("{self}: returned {} results", entries.len());

        let mut snippets: Vec<NomadServiceSnippet> = entries
            .into_iter()
            .map(|s| NomadServiceSnippet {
                name: s.service_name,
                tags: sorted_tags(&s.tags),
            })
            .collect();
        snippets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));

        Ok((DependencyData::ServiceSnippets(snippets), meta))
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

impl std::fmt::Display for NomadServicesQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.region {
            Some(region) => write!(f, "nomad.services(@{region})"),
            None => write!(f, "nomad.services"),
        }
    }
}
