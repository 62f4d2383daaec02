pub mod bus;
pub mod engine;

pub use bus::{BusClient, BusMessage, MessageHandler, Registry, SubscriptionId};
pub use engine::{EngineFactory, EngineOutput, InferenceEngine, InferenceJob};
