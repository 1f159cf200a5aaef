use thiserror::Error;

use sigchat_net::CommunicatorError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessengerError {
    #[error("Messenger is not set up")]
    NotSetUp,

    #[error("Communicator error: {0}")]
    Communicator(#[from] CommunicatorError),
}

pub type Result<T> = std::result::Result<T, MessengerError>;
