pub mod handle;
pub mod options;
pub mod record;

pub use handle::LockHandle;
pub use options::{AcquireOptions, ClientOptions};
pub use record::LockRecord;

pub(crate) use handle::HandleState;
pub(crate) use record::new_record_version;
