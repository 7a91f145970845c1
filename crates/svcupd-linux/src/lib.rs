// Linux platform implementations

#[cfg(target_os = "linux")]
pub mod service;
