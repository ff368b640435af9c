pub mod bridge;
pub mod metrics;
pub mod protocol;

pub use bridge::{run_bridge, BridgeConfig};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{
    AxisMsg, HelloMsg, IncomingMessage, MechanismMsg, ModeMsg, ProtocolError, ProtocolVersion,
    StateMsg,
};
