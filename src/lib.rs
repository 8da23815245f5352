pub mod cli;
pub mod compressor;
pub mod error;
pub mod mode;
pub mod packager;
pub mod progress;
pub mod task;

pub use error::{ArchiverError, Result};
pub use mode::{ArchiveFormat, Mode};
pub use task::{Options, Summary, Task};
