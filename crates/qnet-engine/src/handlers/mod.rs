//! Protocol handler modules
//!
//! Each module installs exactly the `(kind, protocol)` pairs of its own
//! protocol family and nothing else. Fallbacks are never installed here.

pub mod connection;
pub mod mim;
pub mod msm;
pub mod purification;
pub mod swapping;
pub mod tomography;

use qnet_core::ProtocolKind;

use crate::{EngineContext, HandlerRegistry};

pub use connection::ConnectionManagementHandler;
pub use mim::MimHandler;
pub use msm::MsmHandler;
pub use purification::PurificationHandler;
pub use swapping::SwappingHandler;
pub use tomography::LinkTomographyHandler;

/// A protocol family's contribution to the dispatch table
pub trait ProtocolHandler {
    fn protocol(&self) -> ProtocolKind;

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>);
}

/// Handlers installed on every node
pub fn default_protocol_handlers() -> Vec<Box<dyn ProtocolHandler>> {
    vec![
        Box::new(MimHandler),
        Box::new(MsmHandler),
        Box::new(PurificationHandler),
        Box::new(SwappingHandler),
        Box::new(ConnectionManagementHandler),
        Box::new(LinkTomographyHandler),
    ]
}

/// Install every default handler
pub fn register_defaults(registry: &mut HandlerRegistry<EngineContext>) {
    for handler in default_protocol_handlers() {
        handler.register(registry);
    }
}
