//! embed-dispatch common types
//!
//! Shared by the gateway (producer side) and the embedding workers
//! (consumer side): task messages and results, the model registry, the queue
//! routing policy, and the broker and result store interfaces.

pub mod api;
pub mod broker;
pub mod model;
pub mod registry;
pub mod routing;
pub mod store;
pub mod task;

pub use api::{
    BatchEmbeddingRequest, EmbeddingRequest, ModelInfo, TaskAccepted, TaskStatusResponse,
};
pub use broker::{
    Acknowledger, Broker, BrokerError, Consumer, Delivery, MemoryBroker,
    DEFAULT_DEAD_LETTER_CAPACITY,
};
pub use model::{params, EngineKind, ModelConfig, ModelDescriptor, RuntimeParams, Scalar};
pub use registry::{ModelRegistry, RegistryError};
pub use routing::{dead_letter_queue, default_queue_name, QueueRouter};
pub use store::{ClaimOutcome, MemoryResultStore, PutOutcome, ResultStore, StoreError};
pub use task::{
    new_task_id, peek_task_id, EmbeddingInput, Embeddings, ErrorKind, Task, TaskError,
    TaskRecord, TaskResult, TaskStatus,
};
