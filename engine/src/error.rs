use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine: invariant violation: {0}")]
    InvariantViolation(String),

    #[error("engine: invalid config: {0}")]
    InvalidConfig(String),

    #[error("engine: lock error: {0}")]
    Lock(String),

    #[error("engine: vector error: {0}")]
    VecMath(#[from] storyline_vecmath::VecMathError),

    #[error("engine: store error: {0}")]
    Store(#[from] storyline_clusterstore::StoreError),
}
