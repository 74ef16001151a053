//! Control command vocabulary
//!
//! Each command is a [`Serializable`] record whose identifier doubles as the
//! request `type` it is decoded from. [`ControlCommand`] is the closed sum of
//! all of them.

use crate::frame::{Frame, Serializable};
use rce_core::{
    CommId, CommandClass, ContainerDescriptor, InterfaceDescriptor, NodeDescriptor,
    ParameterDescriptor, RceError, Request, Result, RobotDescriptor, Tag,
};
use serde::{Deserialize, Serialize};

/// Command identifiers, also used as request `type` values
pub mod ids {
    pub const CREATE_CONTAINER: &str = "CreateContainer";
    pub const DESTROY_CONTAINER: &str = "DestroyContainer";
    pub const CREATE_ROBOT: &str = "CreateRobot";
    pub const DESTROY_ROBOT: &str = "DestroyRobot";
    pub const ADD_NODE: &str = "AddNode";
    pub const REMOVE_NODE: &str = "RemoveNode";
    pub const ADD_PARAMETER: &str = "AddParameter";
    pub const REMOVE_PARAMETER: &str = "RemoveParameter";
    pub const ADD_INTERFACE: &str = "AddInterface";
    pub const REMOVE_INTERFACE: &str = "RemoveInterface";
    pub const REGISTER_CONNECTION: &str = "RegisterConnection";
    pub const UNREGISTER_CONNECTION: &str = "UnregisterConnection";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateContainer {
    pub container: ContainerDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyContainer {
    pub tag: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRobot {
    pub robot: RobotDescriptor,
    /// Comm id of the robot's connection, allocated by the comm id server
    pub comm_id: CommId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyRobot {
    pub robot_id: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNode {
    pub container: Tag,
    pub node: NodeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveNode {
    pub container: Tag,
    pub tag: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddParameter {
    pub container: Tag,
    pub parameter: ParameterDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveParameter {
    pub container: Tag,
    pub name: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddInterface {
    /// Comm id of the endpoint receiving the interface
    pub endpoint: CommId,
    pub interface: InterfaceDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveInterface {
    pub endpoint: CommId,
    pub tag: Tag,
}

/// Connection between a local interface and a remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionArgs {
    pub endpoint: CommId,
    pub tag: Tag,
    pub remote_comm_id: CommId,
    pub remote_tag: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterConnection(pub ConnectionArgs);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterConnection(pub ConnectionArgs);

impl Serializable for CreateContainer {
    const IDENTIFIER: &'static str = ids::CREATE_CONTAINER;
}

impl Serializable for DestroyContainer {
    const IDENTIFIER: &'static str = ids::DESTROY_CONTAINER;
}

impl Serializable for CreateRobot {
    const IDENTIFIER: &'static str = ids::CREATE_ROBOT;
}

impl Serializable for DestroyRobot {
    const IDENTIFIER: &'static str = ids::DESTROY_ROBOT;
}

impl Serializable for AddNode {
    const IDENTIFIER: &'static str = ids::ADD_NODE;
}

impl Serializable for RemoveNode {
    const IDENTIFIER: &'static str = ids::REMOVE_NODE;
}

impl Serializable for AddParameter {
    const IDENTIFIER: &'static str = ids::ADD_PARAMETER;
}

impl Serializable for RemoveParameter {
    const IDENTIFIER: &'static str = ids::REMOVE_PARAMETER;
}

impl Serializable for AddInterface {
    const IDENTIFIER: &'static str = ids::ADD_INTERFACE;
}

impl Serializable for RemoveInterface {
    const IDENTIFIER: &'static str = ids::REMOVE_INTERFACE;
}

impl Serializable for RegisterConnection {
    const IDENTIFIER: &'static str = ids::REGISTER_CONNECTION;
}

impl Serializable for UnregisterConnection {
    const IDENTIFIER: &'static str = ids::UNREGISTER_CONNECTION;
}

/// Every command the control plane understands
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    CreateContainer(CreateContainer),
    DestroyContainer(DestroyContainer),
    CreateRobot(CreateRobot),
    DestroyRobot(DestroyRobot),
    AddNode(AddNode),
    RemoveNode(RemoveNode),
    AddParameter(AddParameter),
    RemoveParameter(RemoveParameter),
    AddInterface(AddInterface),
    RemoveInterface(RemoveInterface),
    RegisterConnection(RegisterConnection),
    UnregisterConnection(UnregisterConnection),
}

/// Identifiers of every [`ControlCommand`] variant
pub const COMMAND_IDENTIFIERS: &[&str] = &[
    CreateContainer::IDENTIFIER,
    DestroyContainer::IDENTIFIER,
    CreateRobot::IDENTIFIER,
    DestroyRobot::IDENTIFIER,
    AddNode::IDENTIFIER,
    RemoveNode::IDENTIFIER,
    AddParameter::IDENTIFIER,
    RemoveParameter::IDENTIFIER,
    AddInterface::IDENTIFIER,
    RemoveInterface::IDENTIFIER,
    RegisterConnection::IDENTIFIER,
    UnregisterConnection::IDENTIFIER,
];

impl ControlCommand {
    /// Identifier of the wrapped command
    pub fn identifier(&self) -> &'static str {
        match self {
            Self::CreateContainer(_) => CreateContainer::IDENTIFIER,
            Self::DestroyContainer(_) => DestroyContainer::IDENTIFIER,
            Self::CreateRobot(_) => CreateRobot::IDENTIFIER,
            Self::DestroyRobot(_) => DestroyRobot::IDENTIFIER,
            Self::AddNode(_) => AddNode::IDENTIFIER,
            Self::RemoveNode(_) => RemoveNode::IDENTIFIER,
            Self::AddParameter(_) => AddParameter::IDENTIFIER,
            Self::RemoveParameter(_) => RemoveParameter::IDENTIFIER,
            Self::AddInterface(_) => AddInterface::IDENTIFIER,
            Self::RemoveInterface(_) => RemoveInterface::IDENTIFIER,
            Self::RegisterConnection(_) => RegisterConnection::IDENTIFIER,
            Self::UnregisterConnection(_) => UnregisterConnection::IDENTIFIER,
        }
    }

    /// Structural class of the command
    pub fn class(&self) -> CommandClass {
        match self {
            Self::AddInterface(cmd) if cmd.interface.kind.is_converter() => {
                CommandClass::EndpointConverter
            }
            Self::AddInterface(_)
            | Self::RemoveInterface(_)
            | Self::RegisterConnection(_)
            | Self::UnregisterConnection(_) => CommandClass::EndpointInterface,
            _ => CommandClass::Lifecycle,
        }
    }

    /// Encode the wrapped command as a frame
    pub fn to_frame(&self) -> Result<Frame> {
        match self {
            Self::CreateContainer(cmd) => cmd.to_frame(),
            Self::DestroyContainer(cmd) => cmd.to_frame(),
            Self::CreateRobot(cmd) => cmd.to_frame(),
            Self::DestroyRobot(cmd) => cmd.to_frame(),
            Self::AddNode(cmd) => cmd.to_frame(),
            Self::RemoveNode(cmd) => cmd.to_frame(),
            Self::AddParameter(cmd) => cmd.to_frame(),
            Self::RemoveParameter(cmd) => cmd.to_frame(),
            Self::AddInterface(cmd) => cmd.to_frame(),
            Self::RemoveInterface(cmd) => cmd.to_frame(),
            Self::RegisterConnection(cmd) => cmd.to_frame(),
            Self::UnregisterConnection(cmd) => cmd.to_frame(),
        }
    }

    /// Decode from the positional arguments of a request
    ///
    /// The request `type` selects the command; arguments follow the field
    /// order of the command record.
    pub fn from_request(request: &Request) -> Result<Self> {
        let command = match request.kind.as_str() {
            ids::CREATE_CONTAINER => {
                request.expect_arity(1)?;
                Self::CreateContainer(CreateContainer {
                    container: request.arg(0)?,
                })
            }
            ids::DESTROY_CONTAINER => {
                request.expect_arity(1)?;
                Self::DestroyContainer(DestroyContainer {
                    tag: request.arg(0)?,
                })
            }
            ids::CREATE_ROBOT => {
                request.expect_arity(2)?;
                Self::CreateRobot(CreateRobot {
                    robot: request.arg(0)?,
                    comm_id: request.arg(1)?,
                })
            }
            ids::DESTROY_ROBOT => {
                request.expect_arity(1)?;
                Self::DestroyRobot(DestroyRobot {
                    robot_id: request.arg(0)?,
                })
            }
            ids::ADD_NODE => {
                request.expect_arity(2)?;
                Self::AddNode(AddNode {
                    container: request.arg(0)?,
                    node: request.arg(1)?,
                })
            }
            ids::REMOVE_NODE => {
                request.expect_arity(2)?;
                Self::RemoveNode(RemoveNode {
                    container: request.arg(0)?,
                    tag: request.arg(1)?,
                })
            }
            ids::ADD_PARAMETER => {
                request.expect_arity(2)?;
                Self::AddParameter(AddParameter {
                    container: request.arg(0)?,
                    parameter: request.arg(1)?,
                })
            }
            ids::REMOVE_PARAMETER => {
                request.expect_arity(2)?;
                Self::RemoveParameter(RemoveParameter {
                    container: request.arg(0)?,
                    name: request.arg(1)?,
                })
            }
            ids::ADD_INTERFACE => {
                request.expect_arity(2)?;
                Self::AddInterface(AddInterface {
                    endpoint: request.arg(0)?,
                    interface: request.arg(1)?,
                })
            }
            ids::REMOVE_INTERFACE => {
                request.expect_arity(2)?;
                Self::RemoveInterface(RemoveInterface {
                    endpoint: request.arg(0)?,
                    tag: request.arg(1)?,
                })
            }
            ids::REGISTER_CONNECTION => {
                Self::RegisterConnection(RegisterConnection(connection_args(request)?))
            }
            ids::UNREGISTER_CONNECTION => {
                Self::UnregisterConnection(UnregisterConnection(connection_args(request)?))
            }
            other => {
                return Err(RceError::serialization(format!(
                    "unknown command type '{other}'"
                )))
            }
        };
        Ok(command)
    }
}

fn connection_args(request: &Request) -> Result<ConnectionArgs> {
    request.expect_arity(4)?;
    Ok(ConnectionArgs {
        endpoint: request.arg(0)?,
        tag: request.arg(1)?,
        remote_comm_id: request.arg(2)?,
        remote_tag: request.arg(3)?,
    })
}

macro_rules! into_command {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for ControlCommand {
                fn from(cmd: $ty) -> Self {
                    Self::$ty(cmd)
                }
            }
        )*
    };
}

into_command!(
    CreateContainer,
    DestroyContainer,
    CreateRobot,
    DestroyRobot,
    AddNode,
    RemoveNode,
    AddParameter,
    RemoveParameter,
    AddInterface,
    RemoveInterface,
    RegisterConnection,
    UnregisterConnection,
);
