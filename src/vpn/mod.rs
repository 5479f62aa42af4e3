//! VPN detection support: range lists, storage and ban requests.

pub mod ban;
pub mod ingest;
pub mod range;
pub mod store;

pub use ban::{BanPolicy, BanRequest, BanRequester};
pub use ingest::{IngestReport, Ingestor};
pub use range::{parse_line, IpRange};
pub use store::{MemoryRangeStore, RangeStore};
