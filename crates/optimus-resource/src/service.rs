//! Resource service: single-resource operations and the streaming deploy
//! pipeline.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use optimus_core::error::{OptimusError, OptimusResult};
use optimus_core::models::resource::{ENTITY_RESOURCE, Resource, Status, Store};
use optimus_core::models::tenant::{NamespaceName, Tenant};
use optimus_core::repository::{ResourceRepository, TenantDetailsGetter};
use optimus_event::{Event, EventHandler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::{DeployLog, DeployRequest};
use crate::manager::ResourceManager;
use crate::metrics::DeployMetrics;

/// Resource service.
///
/// Generic over the repository and tenant lookup so the deploy pipeline
/// has no dependency on the database crate.
pub struct ResourceService<R: ResourceRepository, T: TenantDetailsGetter> {
    repo: Arc<R>,
    manager: Arc<ResourceManager<R>>,
    tenants: T,
    events: EventHandler,
    metrics: DeployMetrics,
}

impl<R: ResourceRepository, T: TenantDetailsGetter> ResourceService<R, T> {
    pub fn new(
        repo: Arc<R>,
        manager: Arc<ResourceManager<R>>,
        tenants: T,
        events: EventHandler,
        metrics: DeployMetrics,
    ) -> Self {
        Self {
            repo,
            manager,
            tenants,
            events,
            metrics,
        }
    }

    /// Validates `res` and assigns its URN. On failure the resource ends
    /// in `validation_failure`.
    fn prepare(&self, res: &mut Resource) -> OptimusResult<()> {
        let urn = match self
            .manager
            .validate(res)
            .and_then(|()| self.manager.get_urn(res))
        {
            Ok(urn) => urn,
            Err(err) => {
                res.mark_validation_failure()?;
                return Err(err);
            }
        };
        res.mark_validation_success()?;
        res.update_urn(urn)
    }

    pub async fn create(&self, mut res: Resource) -> OptimusResult<Resource> {
        // 1. Validate the spec and move to the pending state.
        self.prepare(&mut res)?;
        res.mark_to_create()?;

        // 2. The tenant must be known.
        self.tenants.ensure_exists(res.tenant()).await?;

        // 3. Persist the pending row.
        self.repo.create(&res).await?;

        // 4. Create in the store; the manager persists the outcome.
        self.manager.create_resource(&mut res).await?;
        self.events.handle_event(&Event::resource_created(&res));
        Ok(res)
    }

    pub async fn update(&self, mut res: Resource) -> OptimusResult<Resource> {
        // 1. The resource must already be registered.
        self.repo
            .read_by_full_name(res.tenant(), res.store(), res.full_name())
            .await?;

        // 2. Validate and move to the pending state.
        self.prepare(&mut res)?;
        res.mark_to_update()?;

        // 3. Persist, then reconcile.
        self.repo.update(&res).await?;
        self.manager.update_resource(&mut res).await?;
        self.events.handle_event(&Event::resource_updated(&res));
        Ok(res)
    }

    pub async fn get(&self, tenant: &Tenant, store: Store, full_name: &str) -> OptimusResult<Resource> {
        self.repo.read_by_full_name(tenant, store, full_name).await
    }

    pub async fn get_all(&self, tenant: &Tenant, store: Store) -> OptimusResult<Vec<Resource>> {
        self.repo.read_all(tenant, store).await
    }

    pub async fn change_namespace(
        &self,
        tenant: &Tenant,
        store: Store,
        full_name: &str,
        new_namespace: NamespaceName,
    ) -> OptimusResult<()> {
        self.tenants
            .ensure_exists(&tenant.with_namespace(new_namespace.clone()))
            .await?;
        let res = self.repo.read_by_full_name(tenant, store, full_name).await?;
        self.repo.change_namespace(&res, &new_namespace).await?;

        info!(
            %tenant,
            resource = full_name,
            new_namespace = %new_namespace,
            "resource moved to another namespace"
        );
        Ok(())
    }

    /// Pushes stored resources to the store again as updates. Every named
    /// resource must exist; the returned copies carry their new status.
    pub async fn apply(
        &self,
        tenant: &Tenant,
        store: Store,
        names: &[String],
    ) -> OptimusResult<Vec<Resource>> {
        let stored = self.repo.read_by_full_names(tenant, store, names).await?;

        let found: HashSet<&str> = stored.iter().map(Resource::full_name).collect();
        let missing: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !found.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(OptimusError::not_found(
                ENTITY_RESOURCE,
                format!("resources not found: [{}]", missing.join(", ")),
            ));
        }

        let mut resources = Vec::with_capacity(stored.len());
        for row in &stored {
            let mut res = row.renewed();
            res.mark_validation_success()?;
            if let Some(urn) = row.urn() {
                res.update_urn(urn)?;
            }
            res.mark_to_update()?;
            resources.push(res);
        }

        if let Err(err) = self.manager.deploy(store, &mut resources).await {
            warn!(%tenant, error = %err, "apply finished with failures");
        }
        for res in &resources {
            self.metrics.record(res);
            if res.status().is_successful() {
                self.events.handle_event(&Event::resource_updated(res));
            }
        }
        Ok(resources)
    }

    /// Consumes deploy requests until the stream ends or `cancel` fires.
    ///
    /// Problems with one request are reported on `log` and the namespace is
    /// remembered; the remaining requests still run. The result names every
    /// namespace that had a problem.
    pub async fn deploy<S>(
        &self,
        mut requests: S,
        log: &DeployLog,
        cancel: &CancellationToken,
    ) -> OptimusResult<()>
    where
        S: Stream<Item = DeployRequest> + Unpin + Send,
    {
        let mut errored: BTreeSet<String> = BTreeSet::new();

        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("deploy deadline exceeded");
                    log.error("deadline exceeded, no further resources are deployed");
                    return Err(OptimusError::internal(ENTITY_RESOURCE, "deadline exceeded"));
                }
                next = requests.next() => match next {
                    Some(request) => request,
                    None => break,
                },
            };

            let namespace = request.namespace_name.clone();
            if let Err(err) = self.deploy_request(request, log).await {
                log.error(format!("error deploying namespace [{namespace}]: {err}"));
                errored.insert(namespace);
            }
        }

        if errored.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = errored.into_iter().collect();
        Err(OptimusError::internal(
            ENTITY_RESOURCE,
            format!("error when deploying: [{}]", names.join(", ")),
        ))
    }

    async fn deploy_request(&self, request: DeployRequest, log: &DeployLog) -> OptimusResult<()> {
        let tenant = Tenant::new(&request.project_name, &request.namespace_name).map_err(|err| {
            OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                format!(
                    "invalid tenant information request project [{}] namespace [{}]: {err}",
                    request.project_name, request.namespace_name
                ),
            )
        })?;
        let store: Store = request.datastore_name.parse()?;

        let mut resources = Vec::with_capacity(request.resources.len());
        let mut adapt_failed = false;
        for spec in &request.resources {
            match spec.to_resource(&tenant, store) {
                Ok(res) => resources.push(res),
                Err(err) => {
                    warn!(%tenant, resource = %spec.name, error = %err, "cannot adapt resource");
                    log.error(format!("error adapting resource [{}]: {err}", spec.name));
                    adapt_failed = true;
                }
            }
        }

        let outcome = self.deploy_batch(&tenant, store, resources, log).await;
        if adapt_failed {
            return Err(OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                "some resources could not be read",
            ));
        }
        outcome
    }

    async fn deploy_batch(
        &self,
        tenant: &Tenant,
        store: Store,
        incoming: Vec<Resource>,
        log: &DeployLog,
    ) -> OptimusResult<()> {
        if incoming.is_empty() {
            return Ok(());
        }

        // 1. Tenant and current state.
        self.tenants.ensure_exists(tenant).await?;
        let existing: HashMap<String, Resource> = self
            .repo
            .read_all(tenant, store)
            .await?
            .into_iter()
            .map(|res| (res.full_name().to_string(), res))
            .collect();

        // 2. Validate and classify.
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut pending = Vec::with_capacity(incoming.len());
        for mut res in incoming {
            if let Err(err) = self.prepare(&mut res) {
                log.error(format!("[{}] {}: {err}", res.status(), res.full_name()));
                self.metrics.record(&res);
                failed += 1;
                continue;
            }
            match existing.get(res.full_name()) {
                Some(stored) if *stored == res && stored.status().is_successful() => {
                    res.mark_skipped()?;
                    log.info(format!("[skipped] {}", res.full_name()));
                    self.metrics.record(&res);
                    skipped += 1;
                }
                Some(_) => {
                    res.mark_to_update()?;
                    pending.push(res);
                }
                None => {
                    res.mark_to_create()?;
                    pending.push(res);
                }
            }
        }

        if !pending.is_empty() {
            // 3. Persist pending rows in one transaction.
            self.repo.create_or_update_all(&pending).await?;

            // 4. Reconcile against the store.
            let creates: HashSet<String> = pending
                .iter()
                .filter(|res| res.status() == Status::ToCreate)
                .map(|res| res.full_name().to_string())
                .collect();
            if let Err(err) = self.manager.deploy(store, &mut pending).await {
                warn!(%tenant, %store, error = %err, "deploy finished with failures");
            }

            // 5. Report and publish.
            for res in &pending {
                self.metrics.record(res);
                if res.status().is_successful() {
                    log.info(format!("[success] {}", res.full_name()));
                    let event = if creates.contains(res.full_name()) {
                        Event::resource_created(res)
                    } else {
                        Event::resource_updated(res)
                    };
                    self.events.handle_event(&event);
                } else {
                    log.error(format!("[{}] {}", res.status(), res.full_name()));
                    failed += 1;
                }
            }
        }

        info!(
            %tenant,
            %store,
            pending = pending.len(),
            skipped,
            failed,
            "deploy batch finished"
        );
        if failed > 0 {
            return Err(OptimusError::internal(
                ENTITY_RESOURCE,
                format!("{failed} resource(s) failed"),
            ));
        }
        Ok(())
    }
}
