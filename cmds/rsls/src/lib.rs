pub mod commands;
pub mod credentials;
pub mod fingerprint;
pub mod introspect;
pub mod lifecycle;
pub mod remote;
pub mod resource;
pub mod runner;
pub mod state;
#[cfg(test)]
pub mod test_utils;
