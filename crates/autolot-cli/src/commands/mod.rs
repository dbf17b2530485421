mod checkpoint;
mod query;
mod serve;
mod setup;
mod status;
mod sync;

pub use checkpoint::{cmd_checkpoint_clear, cmd_checkpoint_set, cmd_checkpoint_show};
pub use query::{cmd_query, QueryArgs};
pub use serve::cmd_serve;
pub use setup::cmd_setup;
pub use status::cmd_status;
pub use sync::cmd_sync;
