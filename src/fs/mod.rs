//! Read-only filesystem over a remote object store

pub mod file;
pub mod filesystem;

pub use file::RemoteFile;
pub use filesystem::CachedFileSystem;
