//! VigilantPI domain concepts: configuration, cameras, tasks, the encoder
//! contract, the on-disk recording layout and host integration

pub mod camera;
pub mod config;
pub mod encoder;
pub mod host;
pub mod layout;
pub mod mount;
pub mod notification;
pub mod task;
