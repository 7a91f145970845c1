// Platform abstraction shared by the per-OS service manager crates

pub mod service;
