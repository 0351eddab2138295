//! Shared setup for integration tests: two engines joined by an in-memory
//! link.
#![allow(dead_code)]

use std::sync::Arc;

use airlink_core::PeerAddr;
use airlink_node::engine::{Engine, EngineConfig, EngineHandle};
use airlink_node::link::LinkPort;
use airlink_node::testing::MemoryLink;

pub const ADDR_A: PeerAddr = PeerAddr::new([0xAA; 6]);
pub const ADDR_B: PeerAddr = PeerAddr::new([0xBB; 6]);

pub struct TestNode {
    pub handle: EngineHandle,
    pub link: Arc<MemoryLink>,
}

impl TestNode {
    pub fn link_port(&self) -> Arc<dyn LinkPort> {
        Arc::clone(&self.link) as Arc<dyn LinkPort>
    }
}

/// Spawn two engines wired back-to-back. Must run inside a tokio runtime.
pub fn node_pair() -> (TestNode, TestNode) {
    airlink_node::logging::init_for_tests();

    let (link_a, link_b) = MemoryLink::pair(ADDR_A, ADDR_B);
    let (engine_a, handle_a) = Engine::new(
        Arc::clone(&link_a) as Arc<dyn LinkPort>,
        EngineConfig::default(),
    );
    let (engine_b, handle_b) = Engine::new(
        Arc::clone(&link_b) as Arc<dyn LinkPort>,
        EngineConfig::default(),
    );
    link_a.connect(handle_b.event_sink());
    link_b.connect(handle_a.event_sink());
    tokio::spawn(engine_a.run());
    tokio::spawn(engine_b.run());

    (
        TestNode {
            handle: handle_a,
            link: link_a,
        },
        TestNode {
            handle: handle_b,
            link: link_b,
        },
    )
}
