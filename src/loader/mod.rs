pub mod dir_loader;

pub use dir_loader::DirectoryLoader;
