use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("clusterstore: store unavailable: {0}")]
    Unavailable(String),

    #[error("clusterstore: not found: {0}")]
    NotFound(String),

    #[error("clusterstore: serialization error: {0}")]
    Serialization(String),

    #[error("clusterstore: {0} is not supported by this backend")]
    Unsupported(&'static str),
}

impl From<storyline_kv::KVError> for StoreError {
    fn from(e: storyline_kv::KVError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
