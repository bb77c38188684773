//! CLI commands implementation

pub mod books;
pub mod init;
pub mod jobs;
pub mod serve;
pub mod status;
pub mod sync;

pub use books::*;
pub use init::*;
pub use jobs::*;
pub use serve::*;
pub use status::*;
pub use sync::*;
