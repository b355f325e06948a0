pub mod sweep_worker;

pub use sweep_worker::run as run_sweep_worker;
