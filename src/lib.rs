//! `rsq-warehouse` is an async client for a Redshift Serverless warehouse and
//! the S3 bucket that feeds it.
//!
//! Two ways to run SQL, both returning a column-major [`TabularResult`]:
//! - [`DataApiConnection::query`] submits through the Redshift Data API and
//!   polls until the statement finishes.
//! - [`DirectConnection::query`] uses one wire-protocol session opened with
//!   temporary credentials.
//!
//! Bucket access goes through [`ObjectStorage`], object keys are built with
//! [`PathFactory`].

mod client;
mod columnar;
mod credentials;
mod data_api;
mod decode;
mod direct;
mod error;
mod options;
mod params;
mod paths;
mod signing;
mod storage;
mod transport;
mod types;
mod value;
mod wire;

#[cfg(feature = "row-map")]
pub mod row_map;

pub use client::DataApiConnection;
pub use columnar::{decode_batches, encode_batches, ParquetMerger, DEFAULT_BATCH_SIZE};
pub use credentials::{
    AwsCredentials, AwsEnvironment, CredentialProvider, CredentialsSource, DbCredentials,
    ServerlessCredentials,
};
pub use data_api::{DataApi, HttpDataApi};
pub use direct::{
    ConnectParams, ConnectionState, Connector, DirectConnection, PostgresConnector, SqlSession,
    DEFAULT_PORT,
};
pub use error::WarehouseError;
pub use options::{ClientOptions, PollOptions};
pub use params::Params;
pub use paths::{clean_path, find_template_params, PathFactory, VALID_FILE_TYPES};
pub use storage::{DirectoryTree, Document, ObjectStorage};
pub use transport::service_endpoint;
pub use types::{
    QueryStatus, ResultPage, StatementDescription, StatusClass, TabularResult, WrappedValue,
};
pub use value::Value;
pub use wire::SqlParameter;

pub type Result<T> = std::result::Result<T, WarehouseError>;
