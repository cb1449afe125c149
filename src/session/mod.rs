pub mod manifest;
pub mod tracker;

pub use manifest::{manifest_from_names, NameQueue, NamingManifest};
pub use tracker::{fingerprint_of, FileSignature, SessionState, SessionStore};
