//! otaflow-client: HTTP client library
//!
//! Talks to the otaflow daemon's firmware update API.
//!
//! ```no_run
//! use otaflow_api::requests::TriggerRequest;
//! use otaflow_client::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:8080")?;
//!
//! client.trigger(&TriggerRequest::new("https://fw.example.com/v2.bin")).await?;
//!
//! let status = client.status().await?;
//! println!("{:?}: {} bytes", status.status, status.progress);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;

pub use error::{ClientError, Result};
pub use http::HttpClient;
