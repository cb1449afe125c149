pub mod dispatch;
pub mod paths;
pub mod reader;
pub mod writer;

pub use dispatch::Dispatcher;
pub use paths::{resolve_under_base, safe_basename, safe_member_relpath};
pub use reader::{ArchiveReader, UnpackedArchive};
pub use writer::ArchiveWriter;
