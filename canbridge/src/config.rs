use crate::core::NodeId;
use crate::frame::Mtu;

/// Inbound relay capacity used when the bridge type does not name one
pub const DEFAULT_RX_QUEUE_CAPACITY: usize = 10;

/// Outbound frame queue capacity used when the bridge type does not name one
pub const DEFAULT_TX_QUEUE_CAPACITY: usize = 32;

/// Initial node identity
///
/// Both values can be changed later with `Bridge::set_node_id` and `Bridge::set_mtu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// `None` starts the node anonymous.
    pub node_id: Option<NodeId>,
    pub mtu: Mtu,
}

impl Config {
    pub const fn new(node_id: NodeId, mtu: Mtu) -> Self {
        Self {
            node_id: Some(node_id),
            mtu,
        }
    }
}
