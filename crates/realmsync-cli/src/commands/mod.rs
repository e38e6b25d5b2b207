pub mod fixture;
pub mod realms;
pub mod sync;
pub mod trusted_hosts;
