//! Descriptor records consumed by lifecycle operations
//!
//! Descriptors arrive from the request layer and are mostly opaque to the
//! control plane: only the tag and, for interfaces, the kind and message type
//! are interpreted here.

use crate::identifiers::Tag;
use serde::{Deserialize, Serialize};

/// Records that expose a stable tag within their owning scope
pub trait Descriptor {
    /// Entity kind used in logs and errors
    const KIND: &'static str;

    /// Tag identifying the described entity
    fn tag(&self) -> &Tag;
}

/// Robot to be attached to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotDescriptor {
    pub robot_id: Tag,
}

impl RobotDescriptor {
    pub fn new(robot_id: impl Into<Tag>) -> Self {
        Self {
            robot_id: robot_id.into(),
        }
    }
}

impl Descriptor for RobotDescriptor {
    const KIND: &'static str = "robot";

    fn tag(&self) -> &Tag {
        &self.robot_id
    }
}

/// Container to be placed on a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    pub tag: Tag,
}

impl ContainerDescriptor {
    pub fn new(tag: impl Into<Tag>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Descriptor for ContainerDescriptor {
    const KIND: &'static str = "container";

    fn tag(&self) -> &Tag {
        &self.tag
    }
}

/// ROS node to launch inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub tag: Tag,
    pub package: String,
    pub executable: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl NodeDescriptor {
    pub fn new(tag: impl Into<Tag>, package: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            package: package.into(),
            executable: executable.into(),
            namespace: None,
            args: Vec::new(),
        }
    }
}

impl Descriptor for NodeDescriptor {
    const KIND: &'static str = "node";

    fn tag(&self) -> &Tag {
        &self.tag
    }
}

/// Value stored on the ROS parameter server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(Vec<ParameterValue>),
    /// File content made available to nodes by path
    File(#[serde(with = "serde_bytes")] Vec<u8>),
}

/// Parameter to be set inside a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: Tag,
    pub value: ParameterValue,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<Tag>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl Descriptor for ParameterDescriptor {
    const KIND: &'static str = "parameter";

    fn tag(&self) -> &Tag {
        &self.name
    }
}

/// Communication surface exposed by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    ServiceClient,
    ServiceProvider,
    Publisher,
    Subscriber,
    ServiceClientConverter,
    ServiceProviderConverter,
    PublisherConverter,
    SubscriberConverter,
}

impl InterfaceKind {
    /// Converter interfaces translate between ROS messages and field mappings
    pub fn is_converter(self) -> bool {
        matches!(
            self,
            Self::ServiceClientConverter
                | Self::ServiceProviderConverter
                | Self::PublisherConverter
                | Self::SubscriberConverter
        )
    }

    /// Service interfaces exchange correlated request/response pairs
    pub fn is_service(self) -> bool {
        matches!(
            self,
            Self::ServiceClient
                | Self::ServiceProvider
                | Self::ServiceClientConverter
                | Self::ServiceProviderConverter
        )
    }
}

/// Interface to register on a robot or container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub tag: Tag,
    pub kind: InterfaceKind,
    /// ROS message or service type, e.g. `std_msgs/String`
    pub message_type: String,
}

impl InterfaceDescriptor {
    pub fn new(tag: impl Into<Tag>, kind: InterfaceKind, message_type: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            kind,
            message_type: message_type.into(),
        }
    }
}

impl Descriptor for InterfaceDescriptor {
    const KIND: &'static str = "interface";

    fn tag(&self) -> &Tag {
        &self.tag
    }
}
