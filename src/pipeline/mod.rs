pub mod normalize;
pub mod confidence;
pub mod transform;
pub mod mapping;
pub mod auto_accept;
pub mod failures;
pub mod processor; // Background orchestration: OCR -> normalize -> score -> auto-accept

pub use processor::{DocumentProcessor, ProcessingAck, ProcessingHandle};
