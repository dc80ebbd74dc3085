use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tonic::Status;

use converge_core::{PropertyMap, ProviderReference, Urn};
use converge_generator::{Registration, Source};
use converge_registry::ProviderRegistry;

use crate::error::engine_error_to_status;
use crate::headers::MonitorHeaders;
use crate::monitor::{
    CallRequest, CallResponse, InvokeRequest, InvokeResponse, ReadResourceRequest, ReadResourceResponse,
    RegisterResourceOutputsRequest, RegisterResourceRequest, RegisterResourceResponse, ResourceMonitor,
};
use crate::sink::RegistrationSink;

/// Implements the Resource Monitor RPC contract against a `RegistrationSink`:
/// constructs canonical URNs from (stack, project, parent-type-chain, type,
/// name), resolves provider references (synthesizing default providers on
/// first sight of a package), normalizes aliases per the calling SDK's
/// back-compat headers, and hands the result to the sink one registration at
/// a time.
pub struct MonitorService<S: RegistrationSink> {
    stack: String,
    project: String,
    registry: Arc<ProviderRegistry>,
    sink: Arc<S>,
    provider_config: HashMap<String, PropertyMap>,
    parent_chains: Mutex<HashMap<Urn, String>>,
    default_providers: Mutex<HashMap<String, ProviderReference>>,
}

impl<S: RegistrationSink> MonitorService<S> {
    pub fn new(stack: impl Into<String>, project: impl Into<String>, registry: Arc<ProviderRegistry>, sink: Arc<S>) -> Self {
        Self {
            stack: stack.into(),
            project: project.into(),
            registry,
            sink,
            provider_config: HashMap::new(),
            parent_chains: Mutex::new(HashMap::new()),
            default_providers: Mutex::new(HashMap::new()),
        }
    }

    /// Supply the stack-config inputs a synthesized default provider for
    /// `pkg` should be configured with.
    pub fn with_provider_config(mut self, pkg: impl Into<String>, config: PropertyMap) -> Self {
        self.provider_config.insert(pkg.into(), config);
        self
    }

    /// The type-chain contribution `urn`'s children should see as their
    /// parent-type-chain: a component resource contributes its own chain; a
    /// custom resource passes its own parent's contribution through
    /// unchanged, since custom parents are excluded from the chain.
    async fn child_chain_for(&self, parent: Option<&Urn>) -> Result<String, Status> {
        let Some(parent) = parent else {
            return Ok(String::new());
        };
        if let Some(chain) = self.parent_chains.lock().unwrap().get(parent).cloned() {
            return Ok(chain);
        }
        // Parent predates this update: fall back to the sink's knowledge of
        // whether it's custom. A parent with no record at all is invalid.
        match self.sink.resource_custom(parent).await {
            Some(true) => Ok(parent.parent_type_chain()),
            Some(false) => Ok(parent.type_chain().to_string()),
            None => Err(Status::invalid_argument(format!("parent {parent} was not registered in this update"))),
        }
    }

    fn record_child_chain(&self, urn: &Urn, custom: bool, parent_chain: &str) {
        let chain = if custom { parent_chain.to_string() } else { urn.type_chain().to_string() };
        self.parent_chains.lock().unwrap().insert(urn.clone(), chain);
    }

    async fn resolve_provider(&self, req_provider: Option<&str>, r#type: &str, version: Option<&str>) -> Result<ProviderReference, Status> {
        if let Some(wire) = req_provider {
            return ProviderReference::parse(wire).ok_or_else(|| Status::invalid_argument(format!("malformed provider reference: {wire}")));
        }

        let pkg = r#type.split(':').next().unwrap_or(r#type).to_string();
        if let Some(existing) = self.default_providers.lock().unwrap().get(&pkg).cloned() {
            return Ok(existing);
        }

        let version = version.unwrap_or("latest").to_string();
        let provider_type = converge_registry::default_provider_type(&pkg);
        let provider_urn = Urn::new(&self.stack, &self.project, "", &provider_type, converge_registry::DEFAULT_PROVIDER_NAME);

        let mut reg = Registration::new(provider_urn.clone(), true, provider_type);
        reg.inputs = self.provider_config.get(&pkg).cloned().unwrap_or_default();
        let outcome = self.sink.submit(reg).await.map_err(|e| engine_error_to_status(&e))?;

        self.registry
            .get_or_create(&pkg, &version, &outcome.id, &self.provider_config.get(&pkg).cloned().unwrap_or_default())
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        self.record_child_chain(&outcome.urn, true, "");
        let reference = ProviderReference::new(outcome.urn, outcome.id);
        self.default_providers.lock().unwrap().insert(pkg, reference.clone());
        Ok(reference)
    }

    fn build_registration(&self, urn: Urn, r#type: String, req: &RegisterResourceRequest, source: Source, headers: MonitorHeaders, provider: Option<ProviderReference>, parent: Option<Urn>) -> Result<Registration, Status> {
        let mut reg = Registration::new(urn, req.custom, r#type);
        reg.source = source;
        reg.parent = parent;
        reg.provider = provider;
        reg.inputs = req.inputs.clone();
        reg.dependencies = req
            .dependencies
            .iter()
            .map(|s| Urn::parse(s.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        reg.property_dependencies = req
            .property_dependencies
            .iter()
            .map(|(k, v)| {
                let urns = v.iter().map(|s| Urn::parse(s.clone())).collect::<Result<Vec<_>, _>>()?;
                Ok((k.clone(), urns))
            })
            .collect::<Result<_, converge_core::UrnParseError>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        // aliasSpecs is a feature the calling SDK negotiates; an SDK that
        // didn't opt in may still populate `aliases` with whatever its own
        // (pre-negotiation) default produced, so that field must be ignored
        // rather than trusted, not merely left empty by a well-behaved caller.
        reg.aliases = if headers.alias_specs {
            req.aliases
                .clone()
                .into_iter()
                .map(|a| a.into_alias(headers.old_sdk))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| Status::invalid_argument(e.to_string()))?
        } else {
            Vec::new()
        };
        reg.alias_urns = req
            .alias_urns
            .iter()
            .map(|s| Urn::parse(s.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        reg.protect = req.protect;
        reg.delete_before_replace = req.delete_before_replace;
        reg.deleted_with = req
            .deleted_with
            .as_ref()
            .map(|s| Urn::parse(s.clone()))
            .transpose()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        reg.ignore_changes = req.ignore_changes.clone();
        reg.additional_secret_outputs = req.additional_secret_outputs.clone();
        reg.replace_on_changes = req.replace_on_changes.clone();
        reg.retain_on_delete = req.retain_on_delete;
        reg.replace_with = req
            .replace_with
            .iter()
            .map(|s| Urn::parse(s.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        Ok(reg)
    }
}

#[async_trait]
impl<S: RegistrationSink> ResourceMonitor for MonitorService<S> {
    async fn register_resource(&self, req: RegisterResourceRequest, metadata: &tonic::metadata::MetadataMap) -> Result<RegisterResourceResponse, Status> {
        let headers = MonitorHeaders::from_metadata(metadata);

        let parent = req.parent_urn.as_ref().map(|s| Urn::parse(s.clone())).transpose().map_err(|e| Status::invalid_argument(e.to_string()))?;
        let parent_chain = self.child_chain_for(parent.as_ref()).await?;
        let urn = Urn::new(&self.stack, &self.project, &parent_chain, &req.r#type, &req.name);

        let provider = if req.custom {
            Some(self.resolve_provider(req.provider.as_deref(), &req.r#type, req.version.as_deref()).await?)
        } else {
            None
        };

        let reg = self.build_registration(urn.clone(), req.r#type.clone(), &req, Source::Register, headers, provider, parent)?;
        let outcome = self.sink.submit(reg).await.map_err(|e| engine_error_to_status(&e))?;

        self.record_child_chain(&urn, req.custom, &parent_chain);

        Ok(RegisterResourceResponse { urn: outcome.urn, id: outcome.id, outputs: outcome.outputs })
    }

    async fn register_resource_outputs(&self, req: RegisterResourceOutputsRequest) -> Result<(), Status> {
        self.sink.register_outputs(req.urn, req.outputs).await.map_err(|e| engine_error_to_status(&e))
    }

    async fn read_resource(&self, req: ReadResourceRequest, metadata: &tonic::metadata::MetadataMap) -> Result<ReadResourceResponse, Status> {
        let headers = MonitorHeaders::from_metadata(metadata);

        let parent = req.parent_urn.as_ref().map(|s| Urn::parse(s.clone())).transpose().map_err(|e| Status::invalid_argument(e.to_string()))?;
        let parent_chain = self.child_chain_for(parent.as_ref()).await?;
        let urn = Urn::new(&self.stack, &self.project, &parent_chain, &req.r#type, &req.name);

        let provider = Some(self.resolve_provider(req.provider.as_deref(), &req.r#type, req.version.as_deref()).await?);

        let register = RegisterResourceRequest { inputs: req.inputs.clone(), ..RegisterResourceRequest::new(req.r#type.clone(), req.name.clone(), true) };
        let mut reg = self.build_registration(urn.clone(), req.r#type.clone(), &register, Source::Read, headers, provider, parent)?;
        reg.external_id = Some(req.id);
        let outcome = self.sink.submit(reg).await.map_err(|e| engine_error_to_status(&e))?;

        self.record_child_chain(&urn, true, &parent_chain);

        Ok(ReadResourceResponse { urn: outcome.urn, outputs: outcome.outputs })
    }

    async fn invoke(&self, req: InvokeRequest) -> Result<InvokeResponse, Status> {
        let _ = req;
        Err(Status::unimplemented("Invoke is accepted at the wire boundary but not yet dispatched to a provider"))
    }

    async fn call(&self, req: CallRequest) -> Result<CallResponse, Status> {
        let _ = req;
        Err(Status::unimplemented("Call is accepted at the wire boundary but not yet dispatched to a provider"))
    }
}
