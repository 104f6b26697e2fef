// Adapters implementing the application ports

pub mod clock;
pub mod http_client;
pub mod object_sink_fs;
pub mod object_sink_memory;
pub mod object_sink_supabase;

pub use clock::{FixedClock, SystemClock};
pub use http_client::ReqwestHttp;
pub use object_sink_fs::FsObjectSink;
pub use object_sink_memory::MemoryObjectSink;
pub use object_sink_supabase::SupabaseObjectSink;
