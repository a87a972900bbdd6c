//! # Uploads
//!
//! Finds the text documents dropped into the uploads directory so they can
//! be (re-)indexed in one batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Uploads Scanner                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  UploadsConfig ──► UploadScanner ──► ScanResult                 │
//! │       │                 │               │                       │
//! │       ▼                 ▼               ▼                       │
//! │  ExcludePatterns    Extensions    UploadedDocument | Skipped    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod scanner;

pub use config::UploadsConfig;
pub use error::{Result, UploadsError};
pub use scanner::{ScanResult, SkippedFile, UploadScanner, UploadedDocument};
