use colored::Colorize;
use log::{error, info};
use syncroom_collab::{Collab, NoembedResolver};
use syncroom_core::Config;
use syncroom_server::{run_server, ServerError};
use thiserror::Error;
use tokio::runtime::{self, Runtime};

mod logging;

struct Syncroom {
    collab: Collab,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum SyncroomError {
    #[error("Could not build the async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl Syncroom {
    fn new() -> Result<Self, SyncroomError> {
        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("syncroom-async")
            .build()?;

        let config = Config::default();
        info!(
            "Rooms keep {} played tracks and {} chat messages",
            config.history_size, config.chat_log_size
        );

        Ok(Self {
            collab: Collab::new(config, NoembedResolver::new()),
            runtime,
        })
    }

    fn run(self) -> Result<(), SyncroomError> {
        let Self { collab, runtime } = self;

        runtime.block_on(run_server(collab))?;
        Ok(())
    }
}

impl SyncroomError {
    fn hint(&self) -> String {
        match self {
            SyncroomError::Server(ServerError::InvalidPort(_) | ServerError::InvalidHost(_)) => {
                "Check the SYNCROOM_SERVER_PORT and SYNCROOM_SERVER_HOST environment variables.".to_string()
            }
            SyncroomError::Server(ServerError::Bind { .. }) => "Make sure no other program is using the port, or pick another one with SYNCROOM_SERVER_PORT.".to_string(),
            _ => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn main() {
    if let Err(error) = logging::init_logger() {
        eprintln!("Could not initialize logging: {}", error);
    }

    let result = Syncroom::new().and_then(|syncroom| {
        info!("Initialized successfully.");
        syncroom.run()
    });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "Syncroom failed to start!".bold().red());
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).bright_black().italic()
        );
    }
}
