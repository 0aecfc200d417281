use alloc::{boxed::Box, vec, vec::Vec};
use core::fmt;
use dt::{
    node::Node,
    prop::{Property, PropertyError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BusType {
    Platform,
    Spi,
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusType::Platform => f.write_str("platform"),
            BusType::Spi => f.write_str("spi"),
        }
    }
}

/// Identity of a device instance on its bus: name plus optional instance index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    pub name: Box<str>,
    pub instance: Option<u32>,
}

impl DeviceId {
    pub fn new(name: &str, instance: Option<u32>) -> DeviceId {
        DeviceId {
            name: Box::from(name),
            instance,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(id) => write!(f, "{}.{}", self.name, id),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A device as announced to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub bus: BusType,
    pub props: Vec<Property>,
}

impl Device {
    pub fn new(bus: BusType, name: &str, instance: Option<u32>) -> Device {
        Device {
            id: DeviceId::new(name, instance),
            bus,
            props: vec![],
        }
    }

    pub fn platform(name: &str, instance: Option<u32>) -> Device {
        Self::new(BusType::Platform, name, instance)
    }

    pub fn spi(name: &str) -> Device {
        Self::new(BusType::Spi, name, None)
    }

    pub fn with_property(mut self, prop: Property) -> Device {
        self.props.retain(|x| x.name != prop.name);
        self.props.push(prop);
        self
    }

    pub fn with_compatible(self, compatible: &[&str]) -> Device {
        self.with_property(Property::from_strlist("compatible", compatible))
    }

    /// Build a platform device from a tree node. The device is named after the node.
    pub fn from_dt_node(node: &Node) -> Device {
        let instance = u32::from_str_radix(&node.unit_addr, 16).ok();
        Device {
            id: DeviceId::new(&node.node_name, instance),
            bus: BusType::Platform,
            props: node.props.clone(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|x| x.name.as_ref() == name)
    }

    /// `compatible` entries, most specific first. Empty when absent or malformed.
    pub fn compatible(&self) -> Vec<&str> {
        self.property("compatible")
            .and_then(|x| x.value_as_strlist().ok())
            .unwrap_or_default()
    }

    pub fn read_u32_or(&self, name: &str, default: u32) -> Result<u32, PropertyError> {
        match self.property(name) {
            Some(prop) => prop.value_as_u32(),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt::node::DeviceTree;

    #[test]
    fn id_display_includes_instance() {
        assert_eq!(format!("{}", DeviceId::new("foo_char", Some(0))), "foo_char.0");
        assert_eq!(format!("{}", DeviceId::new("foo-spi", None)), "foo-spi");
    }

    #[test]
    fn properties_replace_by_name() {
        let dev = Device::platform("spi", Some(0))
            .with_property(Property::from_u32("num-cs", 2))
            .with_property(Property::from_u32("num-cs", 4))
            .with_compatible(&["foo-master"]);
        assert_eq!(dev.props.len(), 2);
        assert_eq!(dev.read_u32_or("num-cs", 1), Ok(4));
        assert_eq!(dev.read_u32_or("missing", 1), Ok(1));
        assert_eq!(dev.compatible(), vec!["foo-master"]);
    }

    #[test]
    fn tree_node_becomes_platform_device() {
        let mut tree = DeviceTree::new();
        let id = tree
            .add_node("/", "spi@1000", vec![Property::from_strlist("compatible", &["foo-master"])])
            .unwrap();
        let dev = Device::from_dt_node(&tree.container[id]);
        assert_eq!(dev.id, DeviceId::new("spi", Some(0x1000)));
        assert_eq!(dev.compatible(), vec!["foo-master"]);
    }
}
