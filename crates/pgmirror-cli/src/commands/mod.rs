mod init;
mod reset;
mod run;
mod setup;
mod status;

pub use init::cmd_init;
pub use reset::cmd_reset;
pub use run::cmd_run;
pub use setup::cmd_setup;
pub use status::cmd_status;
