//! TMSN - a broadcast network for distributed workers
//!
//! Each node joins a full mesh of TCP links described by a static
//! subscription list and exchanges opaque byte payloads through two
//! channels: one outgoing (broadcast to every peer) and one incoming
//! (payloads from all peers, interleaved in arrival order).
//!
//! ```no_run
//! use bytes::Bytes;
//! use tmsn::network::{start_network, PeerDescriptor};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> tmsn::Result<()> {
//! let peers = vec![
//!     PeerDescriptor::new("a", "10.0.0.1:7000"),
//!     PeerDescriptor::new("b", "10.0.0.2:7000"),
//! ];
//! let (incoming_tx, mut incoming_rx) = mpsc::channel(1024);
//! let (outgoing_tx, outgoing_rx) = mpsc::channel(1024);
//!
//! let network = start_network("a", &peers, 7000, false, incoming_tx, outgoing_rx).await?;
//! outgoing_tx.send(Bytes::from_static(b"ping")).await.ok();
//! if let Some(payload) = incoming_rx.recv().await {
//!     println!("{} bytes from the mesh", payload.len());
//! }
//! network.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod network;
pub mod stats;
pub mod version;

pub use error::{Error, ErrorCode, Result};
