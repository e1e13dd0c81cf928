pub mod command_executor;
pub mod credentials;

pub use command_executor::{CommandError, SafeCommandExecutor};
pub use credentials::{IndexCredentials, PASSWORD_VAR, USERNAME_VAR};
