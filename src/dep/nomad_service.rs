use tokio_util::sync::CancellationToken;
use tracing::trace;

use async_trait::async_trait;

use super::classify_api_error;
use super::grammar;
use super::sorted_tags;
use super::Dependency;
use super::DependencyData;
use super::DependencyType;
use super::NomadService;
use super::QueryOptions;
use super::ResponseMetadata;
use crate::clients::ClientSet;
use crate::errors::FetchError;
use crate::errors::ParseError;

/// A requested service-catalog lookup, `[<tag>.]<name>[@<region>]`,
/// e.g. `metrics.redis@us-east-1`.
#[derive(Debug)]
pub struct NomadServiceQuery {
    stop: CancellationToken,

    tag: Option<String>,
    name: String,
    region: Option<String>,
}

impl NomadServiceQuery {
    pub fn new(s: &str) -> Result<Self, ParseError> {
        let spec = grammar::parse_service_query("nomad.service", s)?;
        Ok(Self {
            stop: CancellationToken::new(),
            tag: spec.tag,
            name: spec.name,
            region: spec.region,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

#[async_trait]
impl Dependency for NomadServiceQuery {
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

        trace!(
            "{self}: GET /v1/service/{}?{}",
            self.name,
            opts.to_query_string()
        );

        let call = clients
            .nomad()
            .service_registrations(&self.name, self.tag.as_deref(), &opts);
        let (entries, meta) = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(FetchError::Stopped),
            res = call => {
                res.map_err(|e| classify_api_error(e, self.to_string(), false))?
            }
        };

        trace!("{self}: returned {} results", entries.len());

        let mut services: Vec<NomadService> = entries
            .into_iter()
            .map(|s| NomadService {
                id: s.id,
                name: s.service_name,
                node: s.node_id,
                address: s.address,
                port: s.port,
                datacenter: s.datacenter,
                tags: sorted_tags(&s.tags),
                job_id: s.job_id,
                alloc_id: s.alloc_id,
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        Ok((DependencyData::Services(services), meta))
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

impl std::fmt::Display for NomadServiceQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nomad.service({})",
            grammar::canonical(self.tag.as_deref(), &self.name, self.region.as_deref())
        )
    }
}
