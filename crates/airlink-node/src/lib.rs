//! Runtime for the airlink transport.
//!
//! One engine task drives every channel's transmit and receive machines off
//! a bounded frame queue. Consumers reach the transport through an
//! [`engine::EngineHandle`]: the request broker layers blocking
//! request/response on top of one-way block delivery, the parameter and file
//! services speak their sub-protocols, and the pairing manager binds two
//! devices together. The link itself is abstract ([`link::LinkPort`]); an
//! in-memory implementation for tests lives in [`testing`].

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod link;
pub mod logging;
pub mod pairing;
pub mod params;
pub mod storage;
pub mod testing;

pub use broker::{Broker, CorrelationKey, Response};
pub use config::{ChannelConfig, NodeConfig};
pub use engine::{Engine, EngineConfig, EngineHandle, LinkStats};
pub use error::{LinkSendError, NodeError, RequestError, StorageError, SubmitError};
pub use link::{EventSink, InboundFrame, LinkPort};
