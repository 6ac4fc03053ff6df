use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] kyc_store_lmdb::LmdbError),

    #[error("data directory check failed: {0}")]
    DataDir(String),

    #[error("session error: {0}")]
    Session(#[from] kyc_session::SessionError),

    #[error("scorer setup failed: {0}")]
    Scorer(#[from] kyc_session::ScorerError),

    #[error("RPC server error: {0}")]
    Rpc(#[from] kyc_rpc::RpcError),

    #[error("WebSocket server error: {0}")]
    WebSocket(#[from] kyc_websocket::WsError),

    #[error("logging already initialised: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}
