//! Write operations and the buffer that batches them.

pub mod operation;
pub mod operation_buffer;
