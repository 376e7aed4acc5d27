mod device_buffer;
mod raw_buffer;

pub use device_buffer::*;
pub use raw_buffer::*;
