//! Descriptor fixtures

use rce_core::{
    ContainerDescriptor, InterfaceDescriptor, InterfaceKind, NodeDescriptor, ParameterDescriptor,
    ParameterValue, RobotDescriptor,
};

pub fn container(tag: &str) -> ContainerDescriptor {
    ContainerDescriptor::new(tag)
}

pub fn robot(robot_id: &str) -> RobotDescriptor {
    RobotDescriptor::new(robot_id)
}

pub fn node(tag: &str) -> NodeDescriptor {
    NodeDescriptor::new(tag, "rospy_tutorials", format!("{tag}.py"))
}

pub fn int_parameter(name: &str, value: i64) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterValue::Int(value))
}

/// `std_msgs/String` publisher
pub fn publisher(tag: &str) -> InterfaceDescriptor {
    InterfaceDescriptor::new(tag, InterfaceKind::Publisher, "std_msgs/String")
}

/// `std_msgs/String` subscriber
pub fn subscriber(tag: &str) -> InterfaceDescriptor {
    InterfaceDescriptor::new(tag, InterfaceKind::Subscriber, "std_msgs/String")
}

pub fn service_provider(tag: &str, service_type: &str) -> InterfaceDescriptor {
    InterfaceDescriptor::new(tag, InterfaceKind::ServiceProvider, service_type)
}
