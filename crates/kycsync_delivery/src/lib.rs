pub mod bridge;
pub mod connectivity;

pub use bridge::{
    DeliveryBridge, DeliveryError, DeliveryReceipt, InMemoryDeliveryBridge, ScriptedOutcome,
};
pub use connectivity::{ConnectivityProbe, StaticConnectivity};
