pub mod walk;

pub use walk::collect_batch;
