//! Controls bound to one user and one endpoint
//!
//! Every mutation updates the endpoint state first and then forwards the
//! command to the endpoint's node. Additions are rolled back when the
//! forward fails; removals stand and the failed forward is logged.

use crate::factory::ControlContext;
use rce_core::{
    CommId, ContainerDescriptor, EntityKey, InterfaceDescriptor, NodeDescriptor, Outbound,
    ParameterDescriptor, Request, ReservationId, Result, RobotDescriptor, SharedProxy, Tag, UserId,
};
use rce_endpoint::{Connection, Creation, Endpoint, Teardown};
use rce_serialization::ids;
use std::sync::Arc;

/// Interface and connection management on an endpoint
pub trait EndpointControl {
    fn add_interface(&self, interface: InterfaceDescriptor) -> Result<()>;

    /// Remove an interface; returns the number of connections dropped with it
    fn remove_interface(&self, tag: &Tag) -> Result<usize>;

    /// Allow `(comm_id, remote_tag)` to exchange messages with interface `tag`
    ///
    /// Returns `false` if the connection was already registered.
    fn register_connection(&self, tag: &Tag, comm_id: CommId, remote_tag: Tag) -> Result<bool>;

    /// Returns `false` if the connection was not registered.
    fn unregister_connection(&self, tag: &Tag, comm_id: CommId, remote_tag: Tag)
        -> Result<bool>;
}

/// ROS node management inside a container
pub trait NodeControl {
    fn add_node(&self, node: NodeDescriptor) -> Result<()>;
    fn remove_node(&self, tag: &Tag) -> Result<()>;
}

/// Parameter server management inside a container
pub trait ParameterControl {
    fn add_parameter(&self, parameter: ParameterDescriptor) -> Result<()>;
    fn remove_parameter(&self, name: &Tag) -> Result<()>;
}

/// User and comm id a control acts on
#[derive(Debug, Clone)]
struct Binding {
    user: UserId,
    comm_id: CommId,
    ctx: ControlContext,
}

impl Binding {
    fn endpoint(&self) -> Result<Arc<Endpoint>> {
        self.ctx.endpoints.active_endpoint(&self.user, &self.comm_id)
    }

    fn request(&self, kind: &str) -> Request {
        Request::new(self.user.clone(), kind)
    }

    fn forward(&self, endpoint: &Endpoint, request: Result<Request>) -> Result<()> {
        endpoint.post_command(Outbound::Command(request?))
    }

    fn forward_removal(&self, endpoint: &Endpoint, kind: &str, tag: &Tag) {
        if let Err(err) = self.forward(endpoint, self.request(kind).with_arg(tag)) {
            tracing::warn!(
                endpoint = %endpoint.key(),
                command = kind,
                tag = %tag,
                error = %err,
                "Removal not forwarded"
            );
        }
    }
}

impl EndpointControl for Binding {
    fn add_interface(&self, interface: InterfaceDescriptor) -> Result<()> {
        let endpoint = self.endpoint()?;
        let tag = interface.tag.clone();
        endpoint.add_interface(interface.clone())?;
        let request = self.request(ids::ADD_INTERFACE).with_arg(&interface);
        if let Err(err) = self.forward(&endpoint, request) {
            endpoint.remove_interface(&tag)?;
            return Err(err);
        }
        Ok(())
    }

    fn remove_interface(&self, tag: &Tag) -> Result<usize> {
        let endpoint = self.endpoint()?;
        let dropped = endpoint.remove_interface(tag)?;
        self.forward_removal(&endpoint, ids::REMOVE_INTERFACE, tag);
        Ok(dropped)
    }

    fn register_connection(&self, tag: &Tag, comm_id: CommId, remote_tag: Tag) -> Result<bool> {
        self.endpoint()?
            .register_connection(tag, Connection::new(comm_id, remote_tag))
    }

    fn unregister_connection(
        &self,
        tag: &Tag,
        comm_id: CommId,
        remote_tag: Tag,
    ) -> Result<bool> {
        self.endpoint()?
            .unregister_connection(tag, &Connection::new(comm_id, remote_tag))
    }
}

macro_rules! delegate_endpoint_control {
    ($control:ty) => {
        impl EndpointControl for $control {
            fn add_interface(&self, interface: InterfaceDescriptor) -> Result<()> {
                self.binding.add_interface(interface)
            }

            fn remove_interface(&self, tag: &Tag) -> Result<usize> {
                self.binding.remove_interface(tag)
            }

            fn register_connection(
                &self,
                tag: &Tag,
                comm_id: CommId,
                remote_tag: Tag,
            ) -> Result<bool> {
                self.binding.register_connection(tag, comm_id, remote_tag)
            }

            fn unregister_connection(
                &self,
                tag: &Tag,
                comm_id: CommId,
                remote_tag: Tag,
            ) -> Result<bool> {
                self.binding.unregister_connection(tag, comm_id, remote_tag)
            }
        }
    };
}

/// Control for the robot connected through `comm_id`
#[derive(Debug, Clone)]
pub struct RobotControl {
    binding: Binding,
}

impl RobotControl {
    pub(crate) fn new(user: UserId, comm_id: CommId, ctx: ControlContext) -> Self {
        Self {
            binding: Binding { user, comm_id, ctx },
        }
    }

    pub fn user(&self) -> &UserId {
        &self.binding.user
    }

    pub fn comm_id(&self) -> &CommId {
        &self.binding.comm_id
    }

    /// Attach a robot reachable at this control's comm id
    pub fn create_robot(&self, robot: &RobotDescriptor) -> Result<Creation> {
        let Binding { user, comm_id, ctx } = &self.binding;
        let proxy = ctx.proxies.proxy_for(comm_id)?;
        ctx.endpoints.create_robot(user, robot, comm_id.clone(), proxy)
    }

    pub fn destroy_robot(&self, robot_id: &Tag) -> Result<Teardown> {
        self.binding
            .ctx
            .endpoints
            .destroy_robot(&self.binding.user, robot_id)
    }
}

delegate_endpoint_control!(RobotControl);

/// Control for the container reachable at `comm_id`
///
/// `ctrl_id` is the comm id of the node issuing the commands; launched
/// containers report back to it.
#[derive(Debug, Clone)]
pub struct ContainerControl {
    binding: Binding,
    ctrl_id: CommId,
}

impl ContainerControl {
    pub(crate) fn new(user: UserId, comm_id: CommId, ctrl_id: CommId, ctx: ControlContext) -> Self {
        Self {
            binding: Binding { user, comm_id, ctx },
            ctrl_id,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.binding.user
    }

    pub fn comm_id(&self) -> &CommId {
        &self.binding.comm_id
    }

    pub fn ctrl_id(&self) -> &CommId {
        &self.ctrl_id
    }

    /// Place a container on the least-loaded machine and launch it there
    ///
    /// The placement reservation is committed once the machine accepted the
    /// launch and released on every failure path. A destroy that raced the
    /// launch yields [`Creation::Cancelled`] with the container already torn
    /// down on its machine.
    pub fn create_container(&self, descriptor: &ContainerDescriptor) -> Result<Creation> {
        let balancer = &self.binding.ctx.balancer;
        let placement = balancer.get_next_container_location()?;

        match self.launch(descriptor, &placement.comm_id, placement.reservation) {
            Ok(creation) => Ok(creation),
            Err(err) => {
                balancer.release(placement.reservation);
                tracing::warn!(
                    user = %self.binding.user,
                    container = %descriptor.tag,
                    machine = %placement.ip,
                    error = %err,
                    "Container creation failed"
                );
                Err(err)
            }
        }
    }

    fn launch(
        &self,
        descriptor: &ContainerDescriptor,
        machine_id: &CommId,
        reservation: ReservationId,
    ) -> Result<Creation> {
        let Binding { user, comm_id, ctx } = &self.binding;
        let key = EntityKey::new(user.clone(), descriptor.tag.clone());

        let proxy = ctx.proxies.proxy_for(comm_id)?;
        let endpoint = ctx
            .endpoints
            .begin_container(user, descriptor, comm_id.clone(), proxy)?;

        let machine = match self.post_launch(machine_id, descriptor) {
            Ok(machine) => machine,
            Err(err) => {
                ctx.endpoints.abort_creation(&endpoint);
                return Err(err);
            }
        };

        if let Err(err) = ctx.balancer.commit(reservation, key.clone()) {
            ctx.endpoints.abort_creation(&endpoint);
            self.post_teardown(&machine, &descriptor.tag);
            return Err(err);
        }

        match ctx.endpoints.complete_creation(&endpoint) {
            Ok(Creation::Active(endpoint)) => Ok(Creation::Active(endpoint)),
            Ok(cancelled @ Creation::Cancelled(_)) => {
                ctx.balancer.release_container(&key);
                self.post_teardown(&machine, &descriptor.tag);
                Ok(cancelled)
            }
            Err(err) => {
                ctx.balancer.release_container(&key);
                self.post_teardown(&machine, &descriptor.tag);
                Err(err)
            }
        }
    }

    fn post_launch(
        &self,
        machine_id: &CommId,
        descriptor: &ContainerDescriptor,
    ) -> Result<SharedProxy> {
        let machine = self.binding.ctx.proxies.proxy_for(machine_id)?;
        let launch = self
            .binding
            .request(ids::CREATE_CONTAINER)
            .with_arg(descriptor)?
            .with_arg(&self.binding.comm_id)?
            .with_arg(&self.ctrl_id)?;
        machine.post(Outbound::Command(launch))?;
        Ok(machine)
    }

    fn post_teardown(&self, machine: &SharedProxy, tag: &Tag) {
        let posted = self
            .binding
            .request(ids::DESTROY_CONTAINER)
            .with_arg(tag)
            .and_then(|request| machine.post(Outbound::Command(request)));
        if let Err(err) = posted {
            tracing::warn!(
                machine = %machine.comm_id(),
                container = %tag,
                error = %err,
                "Container teardown not delivered"
            );
        }
    }

    /// Destroy a container and free its machine slot
    ///
    /// A container still being launched is destroyed once the launch
    /// completes.
    pub fn destroy_container(&self, tag: &Tag) -> Result<Teardown> {
        let Binding { user, ctx, .. } = &self.binding;
        let key = EntityKey::new(user.clone(), tag.clone());
        let host = ctx.balancer.host_comm_id(&key);

        let teardown = ctx.endpoints.destroy_container(user, tag)?;
        if let Teardown::Completed(_) = teardown {
            ctx.balancer.release_container(&key);
            match host.map(|host| ctx.proxies.proxy_for(&host)) {
                Some(Ok(machine)) => self.post_teardown(&machine, tag),
                Some(Err(err)) => {
                    tracing::warn!(container = %tag, error = %err, "Hosting machine unreachable")
                }
                None => {}
            }
        }
        Ok(teardown)
    }
}

delegate_endpoint_control!(ContainerControl);

impl NodeControl for ContainerControl {
    fn add_node(&self, node: NodeDescriptor) -> Result<()> {
        let endpoint = self.binding.endpoint()?;
        let tag = node.tag.clone();
        endpoint.add_node(node.clone())?;
        let request = self.binding.request(ids::ADD_NODE).with_arg(&node);
        if let Err(err) = self.binding.forward(&endpoint, request) {
            endpoint.remove_node(&tag)?;
            return Err(err);
        }
        Ok(())
    }

    fn remove_node(&self, tag: &Tag) -> Result<()> {
        let endpoint = self.binding.endpoint()?;
        endpoint.remove_node(tag)?;
        self.binding
            .forward_removal(&endpoint, ids::REMOVE_NODE, tag);
        Ok(())
    }
}

impl ParameterControl for ContainerControl {
    fn add_parameter(&self, parameter: ParameterDescriptor) -> Result<()> {
        let endpoint = self.binding.endpoint()?;
        let name = parameter.name.clone();
        endpoint.add_parameter(parameter.clone())?;
        let request = self.binding.request(ids::ADD_PARAMETER).with_arg(&parameter);
        if let Err(err) = self.binding.forward(&endpoint, request) {
            endpoint.remove_parameter(&name)?;
            return Err(err);
        }
        Ok(())
    }

    fn remove_parameter(&self, name: &Tag) -> Result<()> {
        let endpoint = self.binding.endpoint()?;
        endpoint.remove_parameter(name)?;
        self.binding
            .forward_removal(&endpoint, ids::REMOVE_PARAMETER, name);
        Ok(())
    }
}

/// Control for either kind of endpoint
#[derive(Debug, Clone)]
pub enum Control {
    Robot(RobotControl),
    Container(ContainerControl),
}

impl Control {
    pub fn as_container(&self) -> Option<&ContainerControl> {
        match self {
            Self::Container(control) => Some(control),
            Self::Robot(_) => None,
        }
    }

    fn endpoint_control(&self) -> &dyn EndpointControl {
        match self {
            Self::Robot(control) => control,
            Self::Container(control) => control,
        }
    }
}

impl EndpointControl for Control {
    fn add_interface(&self, interface: InterfaceDescriptor) -> Result<()> {
        self.endpoint_control().add_interface(interface)
    }

    fn remove_interface(&self, tag: &Tag) -> Result<usize> {
        self.endpoint_control().remove_interface(tag)
    }

    fn register_connection(&self, tag: &Tag, comm_id: CommId, remote_tag: Tag) -> Result<bool> {
        self.endpoint_control()
            .register_connection(tag, comm_id, remote_tag)
    }

    fn unregister_connection(
        &self,
        tag: &Tag,
        comm_id: CommId,
        remote_tag: Tag,
    ) -> Result<bool> {
        self.endpoint_control()
            .unregister_connection(tag, comm_id, remote_tag)
    }
}
