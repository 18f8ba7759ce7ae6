pub mod controller;
pub mod device;
pub mod interval;
pub mod observer;
pub mod policy;
pub mod status;
pub mod window;
