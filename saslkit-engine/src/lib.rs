pub mod adapter;
pub mod engine;
pub mod registry;

pub use adapter::EngineNegotiator;
pub use engine::{
    code, ConnParams, Engine, EngineConn, EngineSecurityProps, EngineStep, BUFFER_SIZE,
};
pub use registry::EngineRegistry;
