pub mod component_test;
pub mod sink;

pub use component_test::{ComponentTest, default_test_config};
pub use sink::Sink;
