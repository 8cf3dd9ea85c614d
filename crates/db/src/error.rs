use armada_core::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("conflict: {0}")]
    Conflict(String),

    /// The transaction handle was used after `done`.
    #[error("transaction already finished")]
    TransactionClosed,
}
