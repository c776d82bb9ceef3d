pub mod backends;

pub use backends::{available_drivers, create_device};
