// System Layer
pub mod archive;
pub mod download;
pub mod filesystem;
pub mod host;
pub mod net;
pub mod vfs;

#[cfg(test)]
pub(crate) mod test_server;

pub use archive::{ArchiveHandle, ZipArchiveFs};
pub use download::DownloadDescriptor;
pub use filesystem::TreeVisitor;
pub use host::mac_address;
pub use net::HttpFetcher;
pub use vfs::{EntryKind, EntryMetadata, LocalFs, VirtualFs};
