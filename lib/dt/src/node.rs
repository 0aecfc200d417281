use crate::prop::{Property, PropertyError};
use alloc::{boxed::Box, string::String, vec, vec::Vec};
use log::debug;

/// Device-description tree, stored as an arena of [Node]s indexed by `node_id`.
///
/// Paths are `/`-separated node names, e.g. `/soc/spi@1000`. The root node has path `/`.
#[derive(Debug, Clone)]
pub struct DeviceTree {
    pub root_id: usize,
    pub container: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: usize,
    pub parent_id: usize,
    pub full_name: Box<str>,
    pub node_name: Box<str>,
    pub unit_addr: Box<str>,
    pub children: Vec<usize>,
    pub props: Vec<Property>,
    pub node_type: NodeType,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NodeType {
    /// Node carrying a `compatible` property; it describes a device a driver can bind.
    Device,
    /// Pure description node (buses without drivers, `chosen`, `aliases`, ...).
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    ParentNotFound,
    DuplicatedNode,
    InvalidName,
}

impl Node {
    fn new(node_id: usize, parent_id: usize, full_name: &str, props: Vec<Property>) -> Node {
        let (node_name, unit_addr) = match full_name.split_once('@') {
            Some((name, addr)) => (name, addr),
            None => (full_name, ""),
        };
        let node_type = if props.iter().any(|x| x.name.as_ref() == "compatible") {
            NodeType::Device
        } else {
            NodeType::Description
        };
        Node {
            node_id,
            parent_id,
            full_name: Box::from(full_name),
            node_name: Box::from(node_name),
            unit_addr: Box::from(unit_addr),
            children: vec![],
            props,
            node_type,
        }
    }
}

impl DeviceTree {
    pub fn new() -> DeviceTree {
        DeviceTree {
            root_id: 0,
            container: vec![Node::new(0, 0, "", vec![])],
        }
    }

    /// Attach a new node named `full_name` under the node at `parent_path`.
    ///
    /// Return the id of the new node.
    pub fn add_node(
        &mut self,
        parent_path: impl AsRef<str>,
        full_name: impl AsRef<str>,
        props: Vec<Property>,
    ) -> Result<usize, TreeError> {
        let full_name = full_name.as_ref();
        if full_name.is_empty() || full_name.contains('/') {
            return Err(TreeError::InvalidName);
        }
        let parent_id = self
            .get_node(parent_path.as_ref())
            .ok_or(TreeError::ParentNotFound)?
            .node_id;
        if self
            .get_children(&self.container[parent_id])
            .any(|x| x.full_name.as_ref() == full_name)
        {
            return Err(TreeError::DuplicatedNode);
        }
        let node_id = self.container.len();
        self.container
            .push(Node::new(node_id, parent_id, full_name, props));
        self.container[parent_id].children.push(node_id);
        debug!("Added node '{}'.", self.get_full_path(&self.container[node_id]));
        Ok(node_id)
    }

    pub fn is_root(&self, node: &Node) -> bool {
        self.get_parent(node).node_id == node.node_id
    }
    fn full_path(&self, node: &Node) -> String {
        if self.is_root(node) {
            String::from("")
        } else {
            self.full_path(self.get_parent(node)) + "/" + node.full_name.as_ref()
        }
    }
    pub fn get_full_path(&self, node: &Node) -> Box<str> {
        if self.is_root(node) {
            return Box::from("/");
        }
        self.full_path(node).into_boxed_str()
    }
    pub fn get_parent(&self, node: &Node) -> &Node {
        &self.container[node.parent_id]
    }
    pub fn get_children<'b>(&'b self, node: &Node) -> impl Iterator<Item = &'b Node> + use<'b> {
        node.children
            .clone()
            .into_iter()
            .map(|x| &self.container[x])
    }
    pub fn get_property<'b>(&self, node: &'b Node, name: impl AsRef<str>) -> Option<&'b Property> {
        let name = name.as_ref();
        node.props.iter().find(|prop| prop.name.as_ref().eq(name))
    }
    pub fn get_node(&self, path: impl AsRef<str>) -> Option<&Node> {
        let mut node = &self.container[self.root_id];
        for section in path.as_ref().split('/') {
            if section.trim().is_empty() {
                continue;
            }
            node = self
                .get_children(node)
                .find(|x| x.full_name.as_ref().eq(section))?;
        }
        Some(node)
    }
    /// Collect nodes matching `path`, where a section may be `*` or a node name without unit address.
    pub fn get_nodes(&self, path: impl AsRef<str>) -> Vec<&Node> {
        let root = &self.container[self.root_id];
        let path: Vec<&str> = path.as_ref().split('/').collect();
        self.get_sub_nodes(root, &path, 0)
    }
    fn get_sub_nodes<'b>(&'b self, node: &'b Node, path: &[&str], mut cursor: usize) -> Vec<&'b Node> {
        while cursor < path.len() && path[cursor].trim().is_empty() {
            cursor += 1;
        }
        if cursor >= path.len() {
            return vec![node];
        }
        let sec = path[cursor];
        self.get_children(node)
            .flat_map(|child| {
                if sec.eq("*")
                    || child.full_name.as_ref().eq(sec)
                    || child.node_name.as_ref().eq(sec)
                {
                    self.get_sub_nodes(child, path, cursor + 1)
                } else {
                    vec![]
                }
            })
            .collect()
    }

    /// Every node in the tree, parents before children.
    pub fn walk(&self) -> Vec<&Node> {
        let mut res = vec![];
        let mut stack = vec![self.root_id];
        while let Some(id) = stack.pop() {
            let node = &self.container[id];
            res.push(node);
            stack.extend(node.children.iter().rev());
        }
        res
    }

    /// Entries of the node's `compatible` property, most specific first.
    pub fn get_compatible<'b>(&self, node: &'b Node) -> Result<Vec<&'b str>, PropertyError> {
        match self.get_property(node, "compatible") {
            Some(prop) => prop.value_as_strlist(),
            None => Ok(vec![]),
        }
    }

    /// Nodes listing `comp` in their `compatible` property.
    pub fn find_compatible(&self, comp: &str) -> Vec<&Node> {
        self.walk()
            .into_iter()
            .filter(|node| {
                self.get_compatible(node)
                    .map(|list| list.contains(&comp))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Read a single-cell property, falling back to `default` when it is absent.
    ///
    /// A present but malformed property is an error rather than a silent default.
    pub fn read_u32_or(&self, node: &Node, name: &str, default: u32) -> Result<u32, PropertyError> {
        match self.get_property(node, name) {
            Some(prop) => prop.value_as_u32(),
            None => Ok(default),
        }
    }
}

impl Default for DeviceTree {
    fn default() -> Self {
        Self::new()
    }
}
