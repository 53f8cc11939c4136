pub mod barrier;
pub mod command_scope;
pub mod semaphore;
pub mod submit_info;
