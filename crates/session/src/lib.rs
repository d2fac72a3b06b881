mod command;
mod crop;
mod format_state;
mod insertion;
mod session;
mod snapshot;
mod toolbar;

pub use crate::command::*;
pub use crate::crop::*;
pub use crate::format_state::*;
pub use crate::insertion::*;
pub use crate::session::*;
pub use crate::snapshot::*;
pub use crate::toolbar::*;
