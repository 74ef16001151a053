//! Control factory
//!
//! Controls are cheap handles; the factory hands each one the shared
//! registries it acts on.

use crate::controls::{ContainerControl, Control, RobotControl};
use rce_balancer::LoadBalancer;
use rce_core::{CommId, RceError, Result, SharedProxyProvider, Tag, UserId};
use rce_endpoint::{EndpointKind, EndpointManager};
use std::sync::Arc;

/// Registries shared by every control
#[derive(Clone)]
pub(crate) struct ControlContext {
    pub(crate) balancer: Arc<LoadBalancer>,
    pub(crate) endpoints: Arc<EndpointManager>,
    pub(crate) proxies: SharedProxyProvider,
}

impl std::fmt::Debug for ControlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlContext")
            .field("balancer", &self.balancer)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Builds robot and container controls
#[derive(Debug, Clone)]
pub struct ControlFactory {
    ctx: ControlContext,
}

impl ControlFactory {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        endpoints: Arc<EndpointManager>,
        proxies: SharedProxyProvider,
    ) -> Self {
        Self {
            ctx: ControlContext {
                balancer,
                endpoints,
                proxies,
            },
        }
    }

    /// Control for the robot of `user` connected through `comm_id`
    pub fn create_robot_control(&self, user: UserId, comm_id: CommId) -> RobotControl {
        RobotControl::new(user, comm_id, self.ctx.clone())
    }

    /// Control for the container of `user` reachable at `comm_id`, driven
    /// from the node at `ctrl_id`
    pub fn create_container_control(
        &self,
        user: UserId,
        comm_id: CommId,
        ctrl_id: CommId,
    ) -> ContainerControl {
        ContainerControl::new(user, comm_id, ctrl_id, self.ctx.clone())
    }

    /// Control matching the kind of the active endpoint at `comm_id`
    pub fn control_for(&self, user: &UserId, comm_id: &CommId, ctrl_id: &CommId) -> Result<Control> {
        let endpoint = self.ctx.endpoints.active_endpoint(user, comm_id)?;
        let control = match endpoint.kind() {
            EndpointKind::Robot => {
                Control::Robot(self.create_robot_control(user.clone(), comm_id.clone()))
            }
            EndpointKind::Container => Control::Container(self.create_container_control(
                user.clone(),
                comm_id.clone(),
                ctrl_id.clone(),
            )),
        };
        Ok(control)
    }

    /// Container control for the container `tag` of `user`, in any state
    pub fn container_control(
        &self,
        user: &UserId,
        tag: &Tag,
        ctrl_id: &CommId,
    ) -> Result<ContainerControl> {
        let endpoint = self
            .ctx
            .endpoints
            .container(user, tag)
            .ok_or_else(|| RceError::unknown_entity(EndpointKind::Container.entity(), tag))?;
        Ok(self.create_container_control(
            user.clone(),
            endpoint.comm_id().clone(),
            ctrl_id.clone(),
        ))
    }

    /// Robot control for the robot `robot_id` of `user`, in any state
    pub fn robot_control(&self, user: &UserId, robot_id: &Tag) -> Result<RobotControl> {
        let endpoint = self
            .ctx
            .endpoints
            .robot(user, robot_id)
            .ok_or_else(|| RceError::unknown_entity(EndpointKind::Robot.entity(), robot_id))?;
        Ok(self.create_robot_control(user.clone(), endpoint.comm_id().clone()))
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.ctx.balancer
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        &self.ctx.endpoints
    }
}
