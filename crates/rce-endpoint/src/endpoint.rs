//! Endpoint state
//!
//! An endpoint is a robot or a container exposing interfaces. All of its
//! mutable state sits behind one `parking_lot::Mutex`; operations on one
//! endpoint never contend with operations on another.

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use rce_core::{
    CommId, ContainerDescriptor, Descriptor, EntityKey, Envelope, InterfaceDescriptor,
    NodeDescriptor, Outbound, ParameterDescriptor, RceError, Result, RobotDescriptor,
    SharedProxy, Tag, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Closed set of endpoint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Robot,
    Container,
}

impl EndpointKind {
    /// Entity kind used in error reports
    pub fn entity(self) -> &'static str {
        match self {
            Self::Robot => RobotDescriptor::KIND,
            Self::Container => ContainerDescriptor::KIND,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity())
    }
}

/// Lifecycle state of a tracked endpoint
///
/// Absent endpoints are not tracked at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Creating,
    Active,
    Removed,
}

/// Remote peer permitted to exchange messages with a local interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub comm_id: CommId,
    pub tag: Tag,
}

impl Connection {
    pub fn new(comm_id: impl Into<CommId>, tag: impl Into<Tag>) -> Self {
        Self {
            comm_id: comm_id.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.comm_id, self.tag)
    }
}

/// Interface together with its live connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    pub descriptor: InterfaceDescriptor,
    pub connections: Vec<Connection>,
}

#[derive(Debug)]
struct InterfaceRecord {
    descriptor: InterfaceDescriptor,
    connections: BTreeSet<Connection>,
}

#[derive(Debug)]
pub(crate) struct EndpointState {
    pub(crate) lifecycle: LifecycleState,
    /// Destroy requested while the endpoint was still being created
    pub(crate) destroy_requested: bool,
    interfaces: IndexMap<Tag, InterfaceRecord>,
    nodes: IndexMap<Tag, NodeDescriptor>,
    parameters: IndexMap<Tag, ParameterDescriptor>,
}

/// Counts of what a destroy took down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub interfaces: usize,
    pub connections: usize,
    pub nodes: usize,
    pub parameters: usize,
}

impl EndpointState {
    fn new() -> Self {
        Self {
            lifecycle: LifecycleState::Creating,
            destroy_requested: false,
            interfaces: IndexMap::new(),
            nodes: IndexMap::new(),
            parameters: IndexMap::new(),
        }
    }

    /// Drop connections first, then interfaces, nodes and parameters
    pub(crate) fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        for record in self.interfaces.values_mut() {
            report.connections += record.connections.len();
            record.connections.clear();
        }
        report.interfaces = self.interfaces.len();
        report.nodes = self.nodes.len();
        report.parameters = self.parameters.len();
        self.interfaces.clear();
        self.nodes.clear();
        self.parameters.clear();
        self.lifecycle = LifecycleState::Removed;
        report
    }

    fn interface(&self, tag: &Tag) -> Result<&InterfaceRecord> {
        self.interfaces
            .get(tag)
            .ok_or_else(|| RceError::unknown_entity(InterfaceDescriptor::KIND, tag))
    }

    fn interface_mut(&mut self, tag: &Tag) -> Result<&mut InterfaceRecord> {
        self.interfaces
            .get_mut(tag)
            .ok_or_else(|| RceError::unknown_entity(InterfaceDescriptor::KIND, tag))
    }
}

/// Robot or container owning interfaces
pub struct Endpoint {
    kind: EndpointKind,
    key: EntityKey,
    comm_id: CommId,
    proxy: SharedProxy,
    state: Mutex<EndpointState>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("comm_id", &self.comm_id)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl Endpoint {
    pub(crate) fn new(
        kind: EndpointKind,
        key: EntityKey,
        comm_id: CommId,
        proxy: SharedProxy,
    ) -> Self {
        Self {
            kind,
            key,
            comm_id,
            proxy,
            state: Mutex::new(EndpointState::new()),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn user(&self) -> &UserId {
        &self.key.user
    }

    /// Container tag or robot id
    pub fn tag(&self) -> &Tag {
        &self.key.tag
    }

    pub fn comm_id(&self) -> &CommId {
        &self.comm_id
    }

    pub fn proxy(&self) -> &SharedProxy {
        &self.proxy
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle() == LifecycleState::Active
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock()
    }

    fn not_found(&self) -> RceError {
        RceError::unknown_entity(self.kind.entity(), &self.key.tag)
    }

    /// Lock the state of an active endpoint
    fn active(&self) -> Result<MutexGuard<'_, EndpointState>> {
        let state = self.state.lock();
        if state.lifecycle != LifecycleState::Active {
            return Err(self.not_found());
        }
        Ok(state)
    }

    fn require_container(&self) -> Result<()> {
        match self.kind {
            EndpointKind::Container => Ok(()),
            EndpointKind::Robot => Err(RceError::unknown_entity(
                ContainerDescriptor::KIND,
                &self.key.tag,
            )),
        }
    }

    pub fn add_interface(&self, descriptor: InterfaceDescriptor) -> Result<()> {
        let mut state = self.active()?;
        if state.interfaces.contains_key(&descriptor.tag) {
            return Err(RceError::duplicate_entity(
                InterfaceDescriptor::KIND,
                &descriptor.tag,
            ));
        }
        tracing::debug!(
            endpoint = %self.key,
            interface = %descriptor.tag,
            kind = ?descriptor.kind,
            message_type = %descriptor.message_type,
            "Interface added"
        );
        state.interfaces.insert(
            descriptor.tag.clone(),
            InterfaceRecord {
                descriptor,
                connections: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Remove an interface, dropping its live connections
    ///
    /// Returns the number of connections dropped.
    pub fn remove_interface(&self, tag: &Tag) -> Result<usize> {
        let mut state = self.active()?;
        let record = state
            .interfaces
            .shift_remove(tag)
            .ok_or_else(|| RceError::unknown_entity(InterfaceDescriptor::KIND, tag))?;
        let dropped = record.connections.len();
        tracing::debug!(
            endpoint = %self.key,
            interface = %tag,
            dropped_connections = dropped,
            "Interface removed"
        );
        Ok(dropped)
    }

    /// Register a remote peer on an interface
    ///
    /// Returns `false` if the connection was already registered.
    pub fn register_connection(&self, tag: &Tag, connection: Connection) -> Result<bool> {
        let mut state = self.active()?;
        let record = state.interface_mut(tag)?;
        let added = record.connections.insert(connection.clone());
        if added {
            tracing::debug!(
                endpoint = %self.key,
                interface = %tag,
                connection = %connection,
                "Connection registered"
            );
        }
        Ok(added)
    }

    /// Remove a remote peer from an interface
    ///
    /// Returns `false` if the connection was not registered.
    pub fn unregister_connection(&self, tag: &Tag, connection: &Connection) -> Result<bool> {
        let mut state = self.active()?;
        let record = state.interface_mut(tag)?;
        let removed = record.connections.remove(connection);
        if removed {
            tracing::debug!(
                endpoint = %self.key,
                interface = %tag,
                connection = %connection,
                "Connection unregistered"
            );
        }
        Ok(removed)
    }

    pub fn has_connection(&self, tag: &Tag, connection: &Connection) -> bool {
        self.active()
            .ok()
            .and_then(|state| {
                state
                    .interfaces
                    .get(tag)
                    .map(|record| record.connections.contains(connection))
            })
            .unwrap_or(false)
    }

    pub fn interface(&self, tag: &Tag) -> Option<InterfaceSnapshot> {
        let state = self.state.lock();
        state.interfaces.get(tag).map(|record| InterfaceSnapshot {
            descriptor: record.descriptor.clone(),
            connections: record.connections.iter().cloned().collect(),
        })
    }

    /// Interfaces in registration order
    pub fn interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.state
            .lock()
            .interfaces
            .values()
            .map(|record| record.descriptor.clone())
            .collect()
    }

    pub fn connections(&self, tag: &Tag) -> Result<Vec<Connection>> {
        let state = self.state.lock();
        Ok(state.interface(tag)?.connections.iter().cloned().collect())
    }

    /// Live connections across all interfaces
    pub fn connection_count(&self) -> usize {
        self.state
            .lock()
            .interfaces
            .values()
            .map(|record| record.connections.len())
            .sum()
    }

    pub fn add_node(&self, node: NodeDescriptor) -> Result<()> {
        self.require_container()?;
        let mut state = self.active()?;
        if state.nodes.contains_key(&node.tag) {
            return Err(RceError::duplicate_entity(NodeDescriptor::KIND, &node.tag));
        }
        tracing::debug!(endpoint = %self.key, node = %node.tag, "Node added");
        state.nodes.insert(node.tag.clone(), node);
        Ok(())
    }

    pub fn remove_node(&self, tag: &Tag) -> Result<NodeDescriptor> {
        self.require_container()?;
        let mut state = self.active()?;
        let node = state
            .nodes
            .shift_remove(tag)
            .ok_or_else(|| RceError::unknown_entity(NodeDescriptor::KIND, tag))?;
        tracing::debug!(endpoint = %self.key, node = %tag, "Node removed");
        Ok(node)
    }

    pub fn nodes(&self) -> Vec<NodeDescriptor> {
        self.state.lock().nodes.values().cloned().collect()
    }

    pub fn add_parameter(&self, parameter: ParameterDescriptor) -> Result<()> {
        self.require_container()?;
        let mut state = self.active()?;
        if state.parameters.contains_key(&parameter.name) {
            return Err(RceError::duplicate_entity(
                ParameterDescriptor::KIND,
                &parameter.name,
            ));
        }
        tracing::debug!(endpoint = %self.key, parameter = %parameter.name, "Parameter added");
        state.parameters.insert(parameter.name.clone(), parameter);
        Ok(())
    }

    pub fn remove_parameter(&self, name: &Tag) -> Result<ParameterDescriptor> {
        self.require_container()?;
        let mut state = self.active()?;
        let parameter = state
            .parameters
            .shift_remove(name)
            .ok_or_else(|| RceError::unknown_entity(ParameterDescriptor::KIND, name))?;
        tracing::debug!(endpoint = %self.key, parameter = %name, "Parameter removed");
        Ok(parameter)
    }

    pub fn parameters(&self) -> Vec<ParameterDescriptor> {
        self.state.lock().parameters.values().cloned().collect()
    }

    /// Post an envelope to the interface it addresses
    ///
    /// The destination interface must list `(origin, envelope.sender_tag)`
    /// among its connections. Posting happens under the endpoint lock, so
    /// envelopes for one interface reach the proxy in call order.
    pub fn deliver(&self, envelope: Envelope, origin: &CommId) -> Result<()> {
        let unknown = || {
            RceError::unknown_destination(&self.comm_id, &envelope.tag, &envelope.sender_tag)
        };
        let state = self.active().map_err(|_| unknown())?;
        let connected = state
            .interfaces
            .get(&envelope.tag)
            .map(|record| {
                record.connections.iter().any(|c| {
                    &c.comm_id == origin && c.tag == envelope.sender_tag
                })
            })
            .unwrap_or(false);
        if !connected {
            return Err(unknown());
        }

        self.proxy.post(Outbound::Envelope(envelope))
    }

    /// Post a control command to this endpoint's node
    pub fn post_command(&self, frame: Outbound) -> Result<()> {
        self.proxy.post(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rce_core::{CommProxy, InterfaceKind};
    use std::sync::Arc;

    struct NullProxy(CommId);

    impl CommProxy for NullProxy {
        fn comm_id(&self) -> &CommId {
            &self.0
        }

        fn post(&self, _frame: Outbound) -> Result<()> {
            Ok(())
        }
    }

    fn active_container() -> Endpoint {
        let endpoint = Endpoint::new(
            EndpointKind::Container,
            EntityKey::new("alice", "c1"),
            CommId::new("c1-comm"),
            Arc::new(NullProxy(CommId::new("c1-comm"))),
        );
        endpoint.lock().lifecycle = LifecycleState::Active;
        endpoint
    }

    fn chatter() -> InterfaceDescriptor {
        InterfaceDescriptor::new("chatter", InterfaceKind::Publisher, "std_msgs/String")
    }

    #[test]
    fn test_operations_require_active_state() {
        let endpoint = Endpoint::new(
            EndpointKind::Robot,
            EntityKey::new("alice", "r1"),
            CommId::new("r1-comm"),
            Arc::new(NullProxy(CommId::new("r1-comm"))),
        );
        assert!(matches!(
            endpoint.add_interface(chatter()),
            Err(RceError::UnknownEntity { ref kind, .. }) if kind == "robot"
        ));
    }

    #[test]
    fn test_register_connection_is_idempotent() {
        let endpoint = active_container();
        endpoint.add_interface(chatter()).unwrap();
        let tag = Tag::new("chatter");
        let peer = Connection::new("peer", "listener");

        assert!(endpoint.register_connection(&tag, peer.clone()).unwrap());
        assert!(!endpoint.register_connection(&tag, peer.clone()).unwrap());
        assert_eq!(endpoint.connections(&tag).unwrap(), vec![peer.clone()]);

        assert!(endpoint.unregister_connection(&tag, &peer).unwrap());
        assert!(!endpoint.unregister_connection(&tag, &peer).unwrap());
    }

    #[test]
    fn test_connection_on_unknown_interface() {
        let endpoint = active_container();
        assert!(matches!(
            endpoint.register_connection(&Tag::new("nope"), Connection::new("p", "t")),
            Err(RceError::UnknownEntity { ref kind, .. }) if kind == "interface"
        ));
    }

    #[test]
    fn test_remove_interface_drops_connections() {
        let endpoint = active_container();
        endpoint.add_interface(chatter()).unwrap();
        let tag = Tag::new("chatter");
        endpoint
            .register_connection(&tag, Connection::new("p1", "a"))
            .unwrap();
        endpoint
            .register_connection(&tag, Connection::new("p2", "b"))
            .unwrap();

        assert_eq!(endpoint.remove_interface(&tag).unwrap(), 2);
        assert_eq!(endpoint.connection_count(), 0);
        assert!(endpoint.interface(&tag).is_none());
        assert!(matches!(
            endpoint.remove_interface(&tag),
            Err(RceError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn test_nodes_only_on_containers() {
        let robot = Endpoint::new(
            EndpointKind::Robot,
            EntityKey::new("alice", "r1"),
            CommId::new("r1-comm"),
            Arc::new(NullProxy(CommId::new("r1-comm"))),
        );
        robot.lock().lifecycle = LifecycleState::Active;
        assert!(robot
            .add_node(NodeDescriptor::new("talker", "pkg", "talker.py"))
            .is_err());

        let container = active_container();
        container
            .add_node(NodeDescriptor::new("talker", "pkg", "talker.py"))
            .unwrap();
        assert!(matches!(
            container.add_node(NodeDescriptor::new("talker", "pkg", "other.py")),
            Err(RceError::DuplicateEntity { .. })
        ));
        assert!(matches!(
            container.remove_node(&Tag::new("listener")),
            Err(RceError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn test_teardown_counts() {
        let endpoint = active_container();
        endpoint.add_interface(chatter()).unwrap();
        endpoint
            .register_connection(&Tag::new("chatter"), Connection::new("p", "t"))
            .unwrap();
        let report = endpoint.lock().teardown();
        assert_eq!(
            report,
            TeardownReport {
                interfaces: 1,
                connections: 1,
                nodes: 0,
                parameters: 0
            }
        );
        assert_eq!(endpoint.lifecycle(), LifecycleState::Removed);
    }
}
