pub mod amdgpu;
pub mod arg_parser;
pub mod channel;
pub mod device;
pub mod errors;
pub mod fan_curve;
pub mod gpu_state;
pub mod logger;
pub mod memory_timing;
pub mod notification;
pub mod preset;
pub mod range;
pub mod reconciler;
