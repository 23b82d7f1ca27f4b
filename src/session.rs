//! Caller-facing entry points.
//!
//! [`Ogm`] owns the frozen registry and one driver per configured database.
//! A [`Session`] targets one of those drivers and runs each save, load or
//! delete in its own transaction, bounded by a timeout.

use crate::cypher::{delete_statement, Filter, LoadQuery, Order, Pagination};
use crate::entity::{Entity, EntityRef, Mapped, Shared};
use crate::error::{OgmError, Result};
use crate::metadata::{Registry, TypeDescriptor};
use crate::neo4j::{rollback_quietly, GraphDriver, Neo4jClient};
use crate::persist::{persist, write_back_ids};
use crate::planner::{check_depth, plan};
use crate::reconstruct::{reconstruct, ObjectGraph};
use crate::schema::IndexStrategy;
use crate::value::Value;
use crate::Config;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Defaults applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub default_depth: usize,
    pub query_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_depth: 1,
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Registry plus database targets.
pub struct Ogm {
    registry: Arc<Registry>,
    drivers: Vec<Arc<dyn GraphDriver>>,
    options: SessionOptions,
}

impl Ogm {
    /// Assemble from already connected drivers. The first driver is the default target.
    pub fn new(
        registry: Registry,
        drivers: Vec<Arc<dyn GraphDriver>>,
        options: SessionOptions,
    ) -> Result<Self> {
        if drivers.is_empty() {
            return Err(OgmError::Configuration(
                "at least one database target is required".to_string(),
            ));
        }
        check_depth(options.default_depth)?;
        Ok(Self {
            registry: Arc::new(registry),
            drivers,
            options,
        })
    }

    /// Connect every configured database and apply the configured index strategy.
    pub async fn connect(config: &Config, registry: Registry) -> Result<Self> {
        if registry.strategy().name() != config.primary_key.name() {
            return Err(OgmError::Configuration(format!(
                "registry uses primary key strategy '{}' but the configuration selects '{}'",
                registry.strategy().name(),
                config.primary_key.name()
            )));
        }
        let mut drivers: Vec<Arc<dyn GraphDriver>> = Vec::new();
        for settings in config.connection_settings() {
            drivers.push(Arc::new(Neo4jClient::new(&settings).await?));
        }
        let ogm = Self::new(registry, drivers, config.session_options())?;
        ogm.reconcile_schema(config.index_strategy).await?;
        Ok(ogm)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn drivers(&self) -> &[Arc<dyn GraphDriver>] {
        &self.drivers
    }

    /// Run an index strategy against every target.
    pub async fn reconcile_schema(&self, strategy: IndexStrategy) -> Result<()> {
        strategy.apply(&self.registry, &self.drivers).await
    }

    /// Session on the default target.
    pub fn session(&self) -> Session {
        self.session_with(self.drivers[0].clone())
    }

    /// Session on the named database.
    pub fn session_for(&self, database: &str) -> Result<Session> {
        let driver = self
            .drivers
            .iter()
            .find(|d| d.database() == Some(database))
            .ok_or_else(|| {
                OgmError::Configuration(format!("database '{}' is not configured", database))
            })?;
        Ok(self.session_with(driver.clone()))
    }

    fn session_with(&self, driver: Arc<dyn GraphDriver>) -> Session {
        Session {
            registry: self.registry.clone(),
            driver,
            timeout: self.options.query_timeout,
            default_depth: self.options.default_depth,
        }
    }
}

/// Unit of work against one database target.
#[derive(Clone)]
pub struct Session {
    registry: Arc<Registry>,
    driver: Arc<dyn GraphDriver>,
    timeout: Duration,
    default_depth: usize,
}

impl Session {
    /// Override the query timeout for calls made through this session.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(OgmError::Timeout(self.timeout)),
        }
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Save `entity` and everything reachable within the default depth.
    pub async fn save<T: Entity>(&self, entity: &Shared<T>) -> Result<()> {
        self.save_depth(entity, self.default_depth).await
    }

    pub async fn save_depth<T: Entity>(&self, entity: &Shared<T>, depth: usize) -> Result<()> {
        self.save_ref(&EntityRef::from_shared(entity), depth).await
    }

    /// Save a type-erased root.
    pub async fn save_ref(&self, root: &EntityRef, depth: usize) -> Result<()> {
        self.bounded(self.save_inner(root, depth)).await
    }

    async fn save_inner(&self, root: &EntityRef, depth: usize) -> Result<()> {
        let started = Instant::now();
        let plan = plan(&self.registry, root, depth)?;

        let mut txn = self.driver.begin().await?;
        let ids = match persist(txn.as_mut(), &self.registry, &plan).await {
            Ok(ids) => ids,
            Err(e) => {
                rollback_quietly(txn, "save").await;
                return Err(e);
            }
        };
        txn.commit().await?;
        let generated = plan.apply_assigned_keys()?;
        let written = write_back_ids(&self.registry, &plan, &ids)?;

        tracing::info!(
            "Saved {} nodes and {} relationships ({} generated keys, {} new ids) in {:?}",
            plan.node_count(),
            plan.relationship_count(),
            generated,
            written,
            started.elapsed()
        );
        Ok(())
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Load the `T` with primary key `key`, with the default depth.
    pub async fn load<T: Mapped>(&self, key: impl Into<Value>) -> Result<Shared<T>> {
        self.load_depth(key, self.default_depth).await
    }

    pub async fn load_depth<T: Mapped>(
        &self,
        key: impl Into<Value>,
        depth: usize,
    ) -> Result<Shared<T>> {
        let descriptor = self.node_descriptor::<T>()?;
        let key = key.into();
        let filter = self.key_filter(descriptor, key.clone())?;
        let query = LoadQuery::new(&descriptor.label, depth).filter(filter);
        let graph = self
            .fetch(&query, depth)
            .await?
            .ok_or_else(|| {
                OgmError::NotFound(format!(
                    "{} with key {} does not exist",
                    descriptor.label,
                    key.to_key().unwrap_or_default()
                ))
            })?;
        graph.into_single::<T>()
    }

    /// Every `T`, with the default depth.
    pub async fn load_all<T: Mapped>(&self) -> Result<Vec<Shared<T>>> {
        self.load_all_depth(self.default_depth).await
    }

    pub async fn load_all_depth<T: Mapped>(&self, depth: usize) -> Result<Vec<Shared<T>>> {
        self.load_all_filtered(depth, Filter::default(), Vec::new(), Pagination::default())
            .await
    }

    /// Every `T` matching `filter`, ordered and windowed.
    pub async fn load_all_filtered<T: Mapped>(
        &self,
        depth: usize,
        filter: Filter,
        order: Vec<Order>,
        pagination: Pagination,
    ) -> Result<Vec<Shared<T>>> {
        let descriptor = self.node_descriptor::<T>()?;
        let query = LoadQuery::new(&descriptor.label, depth)
            .filter(filter)
            .order(order)
            .pagination(pagination);
        match self.fetch(&query, depth).await? {
            Some(graph) => graph.into_all::<T>(),
            None => Ok(Vec::new()),
        }
    }

    /// Run a load query and rebuild its result. `None` when nothing matched.
    async fn fetch(&self, query: &LoadQuery, depth: usize) -> Result<Option<ObjectGraph>> {
        check_depth(depth)?;
        let statement = query.to_statement();
        self.bounded(async {
            let mut txn = self.driver.begin().await?;
            let tuple = match txn.fetch_tuple(&statement).await {
                Ok(tuple) => tuple,
                Err(e) => {
                    rollback_quietly(txn, "load").await;
                    return Err(e);
                }
            };
            txn.commit().await?;
            if !tuple.has_primaries() {
                tracing::debug!("Load matched no primary nodes");
                return Ok(None);
            }
            let registry = self.registry.clone();
            let graph = tokio::task::spawn_blocking(move || reconstruct(&registry, &tuple))
                .await
                .map_err(|e| OgmError::Internal(format!("reconstruction task failed: {}", e)))??;
            Ok(Some(graph))
        })
        .await
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete the node behind `entity` and its relationships. Returns the number of nodes removed.
    pub async fn delete<T: Entity>(&self, entity: &Shared<T>) -> Result<i64> {
        let entity = EntityRef::from_shared(entity);
        let descriptor = self.registry.descriptor_of(&entity)?;
        if descriptor.is_relationship_object {
            return Err(OgmError::Configuration(format!(
                "{} is a relationship object; delete it through one of its endpoints",
                descriptor.type_key
            )));
        }
        let pk = descriptor.primary_key().ok_or_else(|| {
            OgmError::Configuration(format!("{} has no primary key", descriptor.type_key))
        })?;
        let key = entity.read().get(pk.field_name).unwrap_or_default();
        if key.is_null() {
            return Err(OgmError::Data(format!(
                "cannot delete a {} that was never saved",
                descriptor.label
            )));
        }
        self.delete_matching(descriptor, key).await
    }

    /// Delete the `T` with primary key `key`.
    pub async fn delete_by_key<T: Mapped>(&self, key: impl Into<Value>) -> Result<i64> {
        let descriptor = self.node_descriptor::<T>()?;
        self.delete_matching(descriptor, key.into()).await
    }

    async fn delete_matching(&self, descriptor: &TypeDescriptor, key: Value) -> Result<i64> {
        let filter = self.key_filter(descriptor, key)?;
        let statement = delete_statement(&descriptor.label, &filter);
        let deleted = self
            .bounded(async {
                let mut txn = self.driver.begin().await?;
                let rows = match txn.run(&statement).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        rollback_quietly(txn, "delete").await;
                        return Err(e);
                    }
                };
                txn.commit().await?;
                Ok(rows.first().and_then(|r| r.get_int("deleted")).unwrap_or_default())
            })
            .await?;
        tracing::info!("Deleted {} {} node(s)", deleted, descriptor.label);
        Ok(deleted)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn node_descriptor<T: Mapped>(&self) -> Result<&TypeDescriptor> {
        let descriptor = self.registry.descriptor_for::<T>()?;
        if descriptor.is_relationship_object {
            return Err(OgmError::Configuration(format!(
                "{} is a relationship object and cannot be loaded by key",
                descriptor.type_key
            )));
        }
        Ok(descriptor)
    }

    fn key_filter(&self, descriptor: &TypeDescriptor, key: Value) -> Result<Filter> {
        let strategy = self.registry.strategy();
        if strategy.is_graph_native() {
            let id = key.as_int().ok_or_else(|| {
                OgmError::Data(format!(
                    "{} keys are graph ids, got a {} value",
                    descriptor.label,
                    key.value_type()
                ))
            })?;
            return Ok(Filter::new().native_id(id));
        }
        if key.value_type() != strategy.value_type() {
            return Err(OgmError::Data(format!(
                "{} keys are {} values, got {}",
                descriptor.label,
                strategy.value_type(),
                key.value_type()
            )));
        }
        Ok(Filter::new().eq(strategy.db_field_name(), key))
    }
}
