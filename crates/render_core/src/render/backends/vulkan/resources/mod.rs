// GPU resources: buffers, images and descriptor management

pub mod buffer;
pub mod descriptor_allocator;
pub mod descriptor_set;
pub mod texture;
