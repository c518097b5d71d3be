//! HTTP(S) firmware transport using a blocking `reqwest` client
//!
//! A client is built per attempt from the request's TLS material, so key
//! material never outlives the attempt that used it.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use otaflow_core::{
    FirmwareSession, FirmwareTransport, ImageDescriptor, StepOutcome, TransportError,
    UpdateRequest,
};
use reqwest::blocking::{Client, Response};
use reqwest::{Certificate, Identity};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::descriptor::{DESCRIPTOR_PREFIX_LEN, IMAGE_MAGIC, parse_app_descriptor};
use crate::error::{body_error, request_error};
use crate::slot::{FirmwareSlot, StagedImage};

/// Settings for `HttpTransport`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Connect timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout of each network read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Bytes read per transfer step
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Reject images that do not start with the image header magic byte
    #[serde(default = "default_require_image_header")]
    pub require_image_header: bool,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    30_000
}

fn default_chunk_size() -> usize {
    4096
}

fn default_require_image_header() -> bool {
    true
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            chunk_size: default_chunk_size(),
            require_image_header: default_require_image_header(),
        }
    }
}

/// Downloads firmware over HTTP(S) into a `FirmwareSlot`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: HttpTransportConfig,
    slot: Arc<FirmwareSlot>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig, slot: FirmwareSlot) -> Self {
        Self {
            config,
            slot: Arc::new(slot),
        }
    }

    fn client(&self, request: &UpdateRequest) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(self.config.connect_timeout_ms))
            .timeout(Duration::from_millis(self.config.read_timeout_ms))
            .user_agent(concat!("otaflow/", env!("CARGO_PKG_VERSION")));

        if let Some(ca) = &request.ca_cert_pem {
            let cert = Certificate::from_pem(ca.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
            if !request.use_global_trust_store {
                builder = builder.tls_built_in_root_certs(false);
            }
        }

        match (&request.client_key_pem, &request.client_cert_pem) {
            (Some(key), Some(cert)) => {
                let pem = format!("{key}\n{cert}");
                let identity = Identity::from_pem(pem.as_bytes())
                    .map_err(|e| TransportError::InvalidRequest(format!("client identity: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(TransportError::InvalidRequest(
                    "client key and certificate must be given together".to_string(),
                ));
            }
        }

        builder.build().map_err(|e| request_error(&e))
    }
}

impl FirmwareTransport for HttpTransport {
    fn begin(&self, request: &UpdateRequest) -> Result<Box<dyn FirmwareSession>, TransportError> {
        let client = self.client(request)?;

        debug!(url = %request.url, "requesting firmware image");
        let response = client
            .get(&request.url)
            .send()
            .map_err(|e| request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let content_length = response.content_length();
        info!(
            url = %request.url,
            content_length = ?content_length,
            "firmware download started"
        );

        Ok(Box::new(HttpSession {
            response,
            staged: self.slot.stage()?,
            slot: Arc::clone(&self.slot),
            content_length,
            head: Vec::with_capacity(DESCRIPTOR_PREFIX_LEN),
            buf: vec![0; self.config.chunk_size.max(1)],
            require_image_header: self.config.require_image_header,
            eof: false,
        }))
    }
}

/// One download in progress
struct HttpSession {
    response: Response,
    staged: StagedImage,
    slot: Arc<FirmwareSlot>,
    content_length: Option<u64>,
    /// Start of the image, kept for the descriptor
    head: Vec<u8>,
    buf: Vec<u8>,
    require_image_header: bool,
    eof: bool,
}

impl HttpSession {
    /// Read one chunk from the body into the slot; returns bytes read
    fn read_chunk(&mut self) -> Result<usize, TransportError> {
        let n = self.response.read(&mut self.buf).map_err(|e| body_error(&e))?;
        if n == 0 {
            self.eof = true;
            return Ok(0);
        }

        let chunk = &self.buf[..n];
        if self.head.len() < DESCRIPTOR_PREFIX_LEN {
            let take = (DESCRIPTOR_PREFIX_LEN - self.head.len()).min(n);
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.staged.write(chunk)?;
        Ok(n)
    }
}

impl FirmwareSession for HttpSession {
    fn image_descriptor(&mut self) -> Result<ImageDescriptor, TransportError> {
        while self.head.len() < DESCRIPTOR_PREFIX_LEN && !self.eof {
            self.read_chunk()?;
        }
        parse_app_descriptor(&self.head)
    }

    fn total_size(&self) -> Option<u64> {
        self.content_length
    }

    fn step(&mut self) -> StepOutcome {
        if self.eof {
            return StepOutcome::Done;
        }
        match self.read_chunk() {
            Ok(0) => StepOutcome::Done,
            Ok(_) => StepOutcome::InProgress(self.staged.written()),
            Err(e) => StepOutcome::Error(e),
        }
    }

    fn bytes_read(&self) -> u64 {
        self.staged.written()
    }

    fn finish(self: Box<Self>) -> Result<(), TransportError> {
        let this = *self;
        let written = this.staged.written();
        if written == 0 {
            return Err(TransportError::Verification("empty image".to_string()));
        }
        match this.content_length {
            Some(expected) if expected != written => {
                return Err(TransportError::Verification(format!(
                    "size mismatch: expected {expected} bytes, got {written}"
                )));
            }
            _ => {}
        }

        let magic = this.staged.first_byte().unwrap_or_default();
        if magic != IMAGE_MAGIC {
            if this.require_image_header {
                return Err(TransportError::Verification(format!(
                    "invalid image header magic 0x{magic:02x}"
                )));
            }
            warn!(magic, "image header magic not found, installing anyway");
        }

        this.staged.install(&this.slot)?;
        Ok(())
    }
}
