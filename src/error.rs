use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("node has already been initialized as {name:?}")]
    AlreadyInitialized { name: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("malformed bag: {0}")]
    Format(String),
    #[error("point cloud does not match the xyzi layout: {0}")]
    InvalidCloud(String),
    #[error(transparent)]
    Bag(#[from] rosbag::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
