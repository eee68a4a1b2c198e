use thiserror::Error;

/// Errors raised while reconciling or migrating a gallery.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A site rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A listing came back in a shape the adapter could not understand.
    #[error("Unexpected listing structure: {0}")]
    Scrape(String),

    /// Any other failure talking to a site.
    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    /// Recovered locally by uploading without a category.
    #[error("No destination category for {0:?}")]
    UnmappedCategory(String),

    #[error("Migration cancelled")]
    Cancelled,

    #[error("Site snapshots not loaded; call load() first")]
    NotLoaded,

    #[error("Cannot move from {from:?} to {to:?}")]
    InvalidState {
        from: crate::progress::MigrationState,
        to: crate::progress::MigrationState,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
}

pub type Result<T> = std::result::Result<T, SyncError>;
