//! Backend-agnostic implementation of the Relay cursor connection algorithm.
//!
//! A [`Connector`] describes the handful of operations the algorithm needs on an
//! ordered, not-yet-materialized collection (its "accessor"). A
//! [`ConnectionBuilder`] binds one connector and paginates any accessor of that
//! connector into a [`Connection`] that serializes as a GraphQL connection.
//!
//! ```ignore
//! let builder = connection_builder(MemoryConnector::<Item>::new());
//! let page = builder
//!     .paginate(items, Args::default().with_first(3), &Options::default())
//!     .await?;
//! ```

pub mod args;
pub mod connection;
pub mod connector;
pub mod cursor;
pub mod memory;

pub use args::{Args, OrderBy, OrderDirection, PageArgs};
pub use connection::{
    connection_builder, Connection, ConnectionBuilder, Edge, Options, PageInfo,
};
pub use connector::{Connector, OrderContext};
pub use cursor::{decode_cursor, encode_cursor, node_key};
pub use memory::MemoryConnector;

/// Error type for pagination
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Connector contract violated: {0}")]
    ContractViolation(String),
    #[error("Accessor error: {source}")]
    Accessor {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConnectionError {
    /// Wraps a backend failure so it propagates unchanged to the caller.
    pub fn accessor<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Accessor {
            source: Box::new(err),
        }
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
