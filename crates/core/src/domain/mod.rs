pub mod metadata;
pub mod organization;
pub mod participant;
pub mod quote;
pub mod thread;
pub mod user;
