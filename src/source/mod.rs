mod cache;
mod decode;
mod index;
mod metadata;
mod options;
mod registry;
mod remote;
mod scheduler;
mod tiled;

pub use cache::{Bundle, BundleId, URL_PROPERTY};
pub use decode::{BundleDecoder, FlatGeobufDecoder, GeoJsonDecoder};
pub use index::BundleIndex;
pub use metadata::{IndexDescriptor, Metadata};
pub use options::{TiledDataset, VectorDataSourceOptions};
pub use registry::DatasourceRegistry;
pub use remote::{HttpSource, MemSource, RemoteSource};
pub use scheduler::Priority;
pub use tiled::TiledVectorCache;
