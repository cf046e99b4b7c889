mod case;
mod session;
mod setup;

pub use case::*;
pub use session::*;
pub use setup::*;
