pub mod walk;

pub use walk::Finder;
