//! Endpoint lifecycle manager
//!
//! Tracks robots and containers from creation to removal. Creation is two
//! phase: `begin_*` reserves the tag and comm id in the `Creating` state and
//! `complete_creation` or `abort_creation` finishes it. A destroy that arrives
//! while an endpoint is still `Creating` is recorded and applied atomically
//! when creation completes.
//!
//! ## Lock Usage
//!
//! The user-scoped tag indexes and the comm id index are `parking_lot`
//! locks held only for lookups and insertions. No index lock is held while
//! an endpoint lock is acquired.

use crate::endpoint::{Endpoint, EndpointKind, LifecycleState, TeardownReport};
use parking_lot::RwLock;
use rce_core::{
    CommId, ContainerDescriptor, EntityKey, RceError, Result, RobotDescriptor, SharedProxy, Tag,
    UserId,
};
use std::collections::HashMap;
use std::sync::Arc;

type Index = RwLock<HashMap<EntityKey, Arc<Endpoint>>>;

/// Result of finishing a two-phase creation
#[derive(Debug, Clone)]
pub enum Creation {
    /// The endpoint is active
    Active(Arc<Endpoint>),
    /// A destroy arrived while creating; the endpoint is already removed
    Cancelled(TeardownReport),
}

impl Creation {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Result of a destroy request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The endpoint was active and has been removed
    Completed(TeardownReport),
    /// The endpoint is still being created; it is removed when creation
    /// completes
    Deferred,
}

/// Owner of every robot and container endpoint
#[derive(Default)]
pub struct EndpointManager {
    containers: Index,
    robots: Index,
    by_comm_id: RwLock<HashMap<CommId, Arc<Endpoint>>>,
}

impl std::fmt::Debug for EndpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointManager")
            .field("containers", &self.containers.read().len())
            .field("robots", &self.robots.read().len())
            .finish()
    }
}

impl EndpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, kind: EndpointKind) -> &Index {
        match kind {
            EndpointKind::Robot => &self.robots,
            EndpointKind::Container => &self.containers,
        }
    }

    fn begin(
        &self,
        kind: EndpointKind,
        key: EntityKey,
        comm_id: CommId,
        proxy: SharedProxy,
    ) -> Result<Arc<Endpoint>> {
        let mut index = self.index(kind).write();
        if index.contains_key(&key) {
            return Err(RceError::duplicate_entity(kind.entity(), &key.tag));
        }
        let mut by_comm_id = self.by_comm_id.write();
        if by_comm_id.contains_key(&comm_id) {
            return Err(RceError::duplicate_entity("endpoint", &comm_id));
        }

        let endpoint = Arc::new(Endpoint::new(kind, key.clone(), comm_id.clone(), proxy));
        index.insert(key.clone(), Arc::clone(&endpoint));
        by_comm_id.insert(comm_id.clone(), Arc::clone(&endpoint));
        drop(by_comm_id);
        drop(index);

        tracing::debug!(kind = %kind, endpoint = %key, comm_id = %comm_id, "Endpoint creating");
        Ok(endpoint)
    }

    /// Reserve a container tag for the calling user
    pub fn begin_container(
        &self,
        user: &UserId,
        descriptor: &ContainerDescriptor,
        comm_id: CommId,
        proxy: SharedProxy,
    ) -> Result<Arc<Endpoint>> {
        self.begin(
            EndpointKind::Container,
            EntityKey::new(user.clone(), descriptor.tag.clone()),
            comm_id,
            proxy,
        )
    }

    /// Reserve a robot id for the calling user
    pub fn begin_robot(
        &self,
        user: &UserId,
        descriptor: &RobotDescriptor,
        comm_id: CommId,
        proxy: SharedProxy,
    ) -> Result<Arc<Endpoint>> {
        self.begin(
            EndpointKind::Robot,
            EntityKey::new(user.clone(), descriptor.robot_id.clone()),
            comm_id,
            proxy,
        )
    }

    /// Move a `Creating` endpoint to `Active`, applying a pending destroy
    pub fn complete_creation(&self, endpoint: &Arc<Endpoint>) -> Result<Creation> {
        let mut state = endpoint.lock();
        match state.lifecycle {
            LifecycleState::Creating => {}
            LifecycleState::Active => return Ok(Creation::Active(Arc::clone(endpoint))),
            LifecycleState::Removed => {
                return Err(RceError::unknown_entity(endpoint.kind().entity(), endpoint.tag()))
            }
        }

        state.lifecycle = LifecycleState::Active;
        if state.destroy_requested {
            let report = state.teardown();
            self.unindex(endpoint);
            drop(state);
            tracing::info!(
                kind = %endpoint.kind(),
                endpoint = %endpoint.key(),
                "Endpoint destroyed on creation"
            );
            return Ok(Creation::Cancelled(report));
        }
        drop(state);

        tracing::info!(
            kind = %endpoint.kind(),
            endpoint = %endpoint.key(),
            comm_id = %endpoint.comm_id(),
            "Endpoint created"
        );
        Ok(Creation::Active(Arc::clone(endpoint)))
    }

    /// Forget a `Creating` endpoint after its launch failed
    pub fn abort_creation(&self, endpoint: &Arc<Endpoint>) {
        let mut state = endpoint.lock();
        if state.lifecycle != LifecycleState::Creating {
            return;
        }
        state.teardown();
        self.unindex(endpoint);
        drop(state);

        tracing::warn!(
            kind = %endpoint.kind(),
            endpoint = %endpoint.key(),
            "Endpoint creation aborted"
        );
    }

    /// Create and activate a container in one step
    pub fn create_container(
        &self,
        user: &UserId,
        descriptor: &ContainerDescriptor,
        comm_id: CommId,
        proxy: SharedProxy,
    ) -> Result<Creation> {
        let endpoint = self.begin_container(user, descriptor, comm_id, proxy)?;
        self.complete_creation(&endpoint)
    }

    /// Create and activate a robot in one step
    pub fn create_robot(
        &self,
        user: &UserId,
        descriptor: &RobotDescriptor,
        comm_id: CommId,
        proxy: SharedProxy,
    ) -> Result<Creation> {
        let endpoint = self.begin_robot(user, descriptor, comm_id, proxy)?;
        self.complete_creation(&endpoint)
    }

    fn destroy(&self, kind: EndpointKind, key: &EntityKey) -> Result<Teardown> {
        let endpoint = self
            .index(kind)
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| RceError::unknown_entity(kind.entity(), &key.tag))?;

        let mut state = endpoint.lock();
        match state.lifecycle {
            LifecycleState::Creating => {
                state.destroy_requested = true;
                drop(state);
                tracing::debug!(kind = %kind, endpoint = %key, "Destroy deferred until creation completes");
                Ok(Teardown::Deferred)
            }
            LifecycleState::Active => {
                let report = state.teardown();
                self.unindex(&endpoint);
                drop(state);
                tracing::info!(
                    kind = %kind,
                    endpoint = %key,
                    interfaces = report.interfaces,
                    connections = report.connections,
                    "Endpoint destroyed"
                );
                Ok(Teardown::Completed(report))
            }
            LifecycleState::Removed => Err(RceError::unknown_entity(kind.entity(), &key.tag)),
        }
    }

    /// Destroy a container, cascading to its interfaces and connections
    pub fn destroy_container(&self, user: &UserId, tag: &Tag) -> Result<Teardown> {
        self.destroy(EndpointKind::Container, &EntityKey::new(user.clone(), tag.clone()))
    }

    /// Destroy a robot, cascading to its interfaces and connections
    pub fn destroy_robot(&self, user: &UserId, robot_id: &Tag) -> Result<Teardown> {
        self.destroy(EndpointKind::Robot, &EntityKey::new(user.clone(), robot_id.clone()))
    }

    fn unindex(&self, endpoint: &Endpoint) {
        self.index(endpoint.kind()).write().remove(endpoint.key());
        let mut by_comm_id = self.by_comm_id.write();
        // Only drop the comm id entry if it still points at this endpoint
        if by_comm_id
            .get(endpoint.comm_id())
            .is_some_and(|current| std::ptr::eq(current.as_ref(), endpoint))
        {
            by_comm_id.remove(endpoint.comm_id());
        }
    }

    /// Endpoint serving `comm_id`, in any lifecycle state
    pub fn endpoint_by_comm_id(&self, comm_id: &CommId) -> Option<Arc<Endpoint>> {
        self.by_comm_id.read().get(comm_id).cloned()
    }

    /// Active endpoint serving `comm_id` and owned by `user`
    pub fn active_endpoint(&self, user: &UserId, comm_id: &CommId) -> Result<Arc<Endpoint>> {
        self.endpoint_by_comm_id(comm_id)
            .filter(|endpoint| endpoint.user() == user && endpoint.is_active())
            .ok_or_else(|| RceError::unknown_entity("endpoint", comm_id))
    }

    pub fn container(&self, user: &UserId, tag: &Tag) -> Option<Arc<Endpoint>> {
        self.containers
            .read()
            .get(&EntityKey::new(user.clone(), tag.clone()))
            .cloned()
    }

    pub fn robot(&self, user: &UserId, robot_id: &Tag) -> Option<Arc<Endpoint>> {
        self.robots
            .read()
            .get(&EntityKey::new(user.clone(), robot_id.clone()))
            .cloned()
    }

    /// Active container owned by `user`
    pub fn active_container(&self, user: &UserId, tag: &Tag) -> Result<Arc<Endpoint>> {
        self.container(user, tag)
            .filter(|endpoint| endpoint.is_active())
            .ok_or_else(|| RceError::unknown_entity(EndpointKind::Container.entity(), tag))
    }

    /// Tracked endpoints of a user, containers first
    pub fn endpoints_of(&self, user: &UserId) -> Vec<Arc<Endpoint>> {
        let mut endpoints: Vec<Arc<Endpoint>> = self
            .containers
            .read()
            .values()
            .filter(|endpoint| endpoint.user() == user)
            .cloned()
            .collect();
        endpoints.extend(
            self.robots
                .read()
                .values()
                .filter(|endpoint| endpoint.user() == user)
                .cloned(),
        );
        endpoints
    }

    pub fn container_count(&self) -> usize {
        self.containers.read().len()
    }

    pub fn robot_count(&self) -> usize {
        self.robots.read().len()
    }
}
