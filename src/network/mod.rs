//! Broadcast network
//!
//! Keeps a full mesh of TCP links between the nodes of a static
//! subscription list and bridges it to a pair of application channels:
//! every payload on the outgoing channel goes to every live peer, and every
//! payload received from any peer lands on the incoming channel.
//!
//! Nodes find each other only through the subscription list. For each pair
//! the lexicographically smaller identity dials and the other listens.

pub mod config;
pub mod coordinator;
mod dialer;
pub mod frame;
pub mod handshake;
pub mod link;
mod listener;
pub mod registry;
pub mod subscription;

pub use config::{Direction, NetworkConfig};
pub use coordinator::{start_network, start_network_with_config, NetworkHandle};
pub use frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
pub use link::{LinkDirection, LinkState, PeerLink};
pub use registry::LinkRegistry;
pub use subscription::{dial_role, DialRole, PeerDescriptor, PeerId, Subscription};
