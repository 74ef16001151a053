//! Control plane wiring
//!
//! Owns one instance of every registry and routes each incoming request
//! through a handler registered under the request's command type.
//!
//! ## Lock Usage
//!
//! The plane holds no locks of its own. Components lock internally and
//! release before returning; background sweepers take each component lock
//! once per tick and never across `.await`.

use crate::controls::{EndpointControl, NodeControl, ParameterControl};
use crate::factory::ControlFactory;
use rce_balancer::{LoadBalancer, MachineSpec};
use rce_core::{
    CommId, Envelope, EnvelopeKind, MessageId, RceConfig, Request, Result, SharedClock,
    SharedProxy, SharedProxyProvider, Tag, UserId,
};
use rce_endpoint::EndpointManager;
use rce_messaging::{Distributor, Messenger, OutgoingMessage, SharedHandler};
use rce_serialization::{ControlCommand, RosMessage, SerializationGateway, COMMAND_IDENTIFIERS};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Turns decoded commands into control operations
#[derive(Debug)]
struct CommandExecutor {
    factory: ControlFactory,
    /// Comm id of this node, handed to launched containers
    ctrl_id: CommId,
}

impl CommandExecutor {
    fn comm_id_in_use(&self, comm_id: &CommId) -> bool {
        comm_id == &self.ctrl_id
            || self.factory.balancer().serves_comm_id(comm_id)
            || self.factory.endpoints().endpoint_by_comm_id(comm_id).is_some()
    }

    fn allocate_comm_id(&self) -> CommId {
        loop {
            let comm_id = CommId::generate();
            if !self.comm_id_in_use(&comm_id) {
                return comm_id;
            }
        }
    }

    fn handle(&self, request: Request) -> Result<()> {
        let command = ControlCommand::from_request(&request)?;
        self.execute(&request.user, command)
    }

    fn execute(&self, user: &UserId, command: ControlCommand) -> Result<()> {
        tracing::debug!(
            user = %user,
            command = command.identifier(),
            class = ?command.class(),
            "Executing command"
        );
        let factory = &self.factory;
        let ctrl_id = &self.ctrl_id;

        match command {
            ControlCommand::CreateContainer(cmd) => factory
                .create_container_control(user.clone(), self.allocate_comm_id(), ctrl_id.clone())
                .create_container(&cmd.container)
                .map(|_| ()),
            ControlCommand::DestroyContainer(cmd) => factory
                .container_control(user, &cmd.tag, ctrl_id)?
                .destroy_container(&cmd.tag)
                .map(|_| ()),
            ControlCommand::CreateRobot(cmd) => factory
                .create_robot_control(user.clone(), cmd.comm_id)
                .create_robot(&cmd.robot)
                .map(|_| ()),
            ControlCommand::DestroyRobot(cmd) => factory
                .robot_control(user, &cmd.robot_id)?
                .destroy_robot(&cmd.robot_id)
                .map(|_| ()),
            ControlCommand::AddNode(cmd) => factory
                .container_control(user, &cmd.container, ctrl_id)?
                .add_node(cmd.node),
            ControlCommand::RemoveNode(cmd) => factory
                .container_control(user, &cmd.container, ctrl_id)?
                .remove_node(&cmd.tag),
            ControlCommand::AddParameter(cmd) => factory
                .container_control(user, &cmd.container, ctrl_id)?
                .add_parameter(cmd.parameter),
            ControlCommand::RemoveParameter(cmd) => factory
                .container_control(user, &cmd.container, ctrl_id)?
                .remove_parameter(&cmd.name),
            ControlCommand::AddInterface(cmd) => factory
                .control_for(user, &cmd.endpoint, ctrl_id)?
                .add_interface(cmd.interface),
            ControlCommand::RemoveInterface(cmd) => factory
                .control_for(user, &cmd.endpoint, ctrl_id)?
                .remove_interface(&cmd.tag)
                .map(|_| ()),
            ControlCommand::RegisterConnection(cmd) => {
                let args = cmd.0;
                factory
                    .control_for(user, &args.endpoint, ctrl_id)?
                    .register_connection(&args.tag, args.remote_comm_id, args.remote_tag)
                    .map(|_| ())
            }
            ControlCommand::UnregisterConnection(cmd) => {
                let args = cmd.0;
                factory
                    .control_for(user, &args.endpoint, ctrl_id)?
                    .unregister_connection(&args.tag, args.remote_comm_id, args.remote_tag)
                    .map(|_| ())
            }
        }
    }
}

/// The control plane of one node
pub struct ControlPlane {
    config: RceConfig,
    executor: Arc<CommandExecutor>,
    requests: Distributor<Request>,
    gateway: Arc<SerializationGateway>,
    messenger: Arc<Messenger>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("local", self.messenger.local_comm_id())
            .field("balancer", self.balancer())
            .field("endpoints", self.endpoints())
            .finish_non_exhaustive()
    }
}

impl ControlPlane {
    /// Wire every component for the node reachable through `local`
    ///
    /// `proxies` resolves the comm ids of machines, robots and containers.
    pub fn new(
        config: RceConfig,
        local: SharedProxy,
        proxies: SharedProxyProvider,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        let ctrl_id = local.comm_id().clone();
        let balancer = Arc::new(LoadBalancer::new(&config.balancer, Arc::clone(&clock)));
        let endpoints = Arc::new(EndpointManager::new());
        let messenger = Arc::new(Messenger::new(
            local,
            Arc::clone(&endpoints),
            Arc::new(Distributor::new()),
            config.messenger.clone(),
            clock,
        ));
        let executor = Arc::new(CommandExecutor {
            factory: ControlFactory::new(balancer, endpoints, proxies),
            ctrl_id: ctrl_id.clone(),
        });

        let requests = Distributor::new();
        for identifier in COMMAND_IDENTIFIERS {
            let executor = Arc::clone(&executor);
            let handler: SharedHandler<Request> =
                Arc::new(move |request: Request| -> Result<()> { executor.handle(request) });
            requests.add_handler(*identifier, handler);
        }

        tracing::info!(
            local = %ctrl_id,
            commands = COMMAND_IDENTIFIERS.len(),
            "Control plane ready"
        );
        Ok(Self {
            config,
            executor,
            requests,
            gateway: Arc::new(SerializationGateway::standard()),
            messenger,
        })
    }

    pub fn config(&self) -> &RceConfig {
        &self.config
    }

    pub fn factory(&self) -> &ControlFactory {
        &self.executor.factory
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        self.executor.factory.balancer()
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        self.executor.factory.endpoints()
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    pub fn gateway(&self) -> &Arc<SerializationGateway> {
        &self.gateway
    }

    /// Handlers for request types, keyed by command identifier
    pub fn request_handlers(&self) -> &Distributor<Request> {
        &self.requests
    }

    /// Entry point of the request layer
    pub fn process_request(&self, request: Request) -> Result<()> {
        let user = request.user.clone();
        let kind = request.kind.clone();

        let result = self.requests.dispatch(&kind, request);
        match &result {
            Ok(()) => tracing::debug!(user = %user, command = %kind, "Request processed"),
            Err(err) if err.is_soft() => {
                tracing::debug!(user = %user, command = %kind, error = %err, "Request rejected")
            }
            Err(err) => {
                tracing::warn!(user = %user, command = %kind, error = %err, "Request failed")
            }
        }
        result
    }

    /// Execute a command frame received from the transport on behalf of `user`
    pub fn process_frame(&self, user: &UserId, bytes: &[u8]) -> Result<()> {
        let command = self.gateway.decode_command(bytes)?;
        self.executor.execute(user, command)
    }

    /// Fresh comm id not used by this node, a registered machine or any
    /// tracked endpoint
    pub fn allocate_comm_id(&self) -> CommId {
        self.executor.allocate_comm_id()
    }

    /// Whether `comm_id` already names this node, a machine or an endpoint
    pub fn comm_id_in_use(&self, comm_id: &CommId) -> bool {
        self.executor.comm_id_in_use(comm_id)
    }

    pub fn register_machine(&self, spec: MachineSpec) -> Result<()> {
        self.balancer().register_machine(spec)
    }

    pub fn unregister_machine(&self, ip: &str) -> Result<()> {
        self.balancer().unregister_machine(ip)
    }

    /// Convert `msg` to its field mapping and route it like [`Messenger::send`]
    pub fn send_message(
        &self,
        user: &UserId,
        tag: &Tag,
        comm_id: &CommId,
        sender_tag: &Tag,
        msg: &RosMessage,
        kind: EnvelopeKind,
        msg_id: MessageId,
    ) -> Result<()> {
        let payload = self.gateway.encode_message(msg)?;
        self.messenger.send(
            user,
            tag,
            comm_id,
            sender_tag,
            OutgoingMessage::new(msg.message_type.clone(), kind, payload),
            msg_id,
        )
    }

    /// Hand an envelope from the transport to the messenger
    pub fn receive(&self, envelope: Envelope) -> Result<()> {
        self.messenger.receive(envelope)
    }

    /// Start the correlation reaper and the reservation sweeper
    ///
    /// Both tasks end once the plane is dropped.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        let balancer: Weak<LoadBalancer> = Arc::downgrade(self.balancer());
        let period = self.config.messenger.reaper_interval();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(balancer) = balancer.upgrade() else {
                    break;
                };
                balancer.expire_stale_reservations();
            }
        });
        vec![self.messenger.spawn_reaper(), sweeper]
    }
}
