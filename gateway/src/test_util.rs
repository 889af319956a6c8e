//! Shared fixtures for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use embed_dispatch_common::{
    params, Broker, BrokerError, Consumer, ModelConfig, ModelRegistry, Scalar,
};

/// Registry with a "small" and a "large" hash model.
pub fn test_registry() -> Arc<ModelRegistry> {
    let mut small = ModelConfig {
        display_name: Some("MiniLM L6".to_string()),
        ..Default::default()
    };
    small
        .params
        .insert(params::EMBEDDING_DIM.to_string(), Scalar::Int(16));

    let large = ModelConfig {
        display_name: Some("MPNet Base".to_string()),
        ..Default::default()
    };

    Arc::new(
        ModelRegistry::from_configs(vec![
            ("small".to_string(), small),
            ("large".to_string(), large),
        ])
        .unwrap(),
    )
}

/// A broker that rejects every publish.
pub struct FailingBroker;

#[async_trait]
impl Broker for FailingBroker {
    fn broker_type(&self) -> &'static str {
        "failing"
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("connection refused".to_string()))
    }

    async fn publish(&self, queue: &str, _payload: Vec<u8>) -> Result<(), BrokerError> {
        Err(BrokerError::PublishRejected {
            queue: queue.to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn Consumer>, BrokerError> {
        Err(BrokerError::ConsumeFailed {
            queue: queue.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}
