mod entry;
mod money;
mod page;

pub use entry::*;
pub use money::*;
pub use page::*;
