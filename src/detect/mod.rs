mod backend;
pub mod backends;
mod decode;
mod labels;
mod result;

pub use backend::{InferenceBackend, Invocation};
pub use backends::{AcceleratorBackend, SyntheticBackend};
pub use decode::{BoxOrder, DecodeError, DetectionDecoder, OutputSchema};
pub use labels::LabelMap;
pub use result::{BoundingBox, Detection};
