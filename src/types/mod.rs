//! Entity type descriptors
//!
//! Static lookup table describing each entity's fields. Built once per
//! process and shared read-only by every cursor and the materializer.

mod descriptor;
mod errors;
mod registry;

pub use descriptor::{EntityDescriptor, FieldDescriptor, FieldKind};
pub use errors::{DescriptorError, DescriptorResult};
pub use registry::TypeRegistry;
