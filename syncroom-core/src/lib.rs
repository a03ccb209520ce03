mod config;
mod queuing;
mod session;
mod util;

pub use config::*;
pub use queuing::*;
pub use session::*;
pub use util::*;
