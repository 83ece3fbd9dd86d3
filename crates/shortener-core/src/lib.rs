// ABOUTME: Core library for the shortener, containing the record model and storage contract.
// ABOUTME: Also hosts the deletion pipeline that filters requested ids by ownership.

pub mod deletion;
pub mod error;
pub mod record;
pub mod storage;

pub use deletion::{CheckOutcome, DeletionConfig, DeletionPipeline, DeletionReport, parse_ids};
pub use error::{StoreError, StoreResult};
pub use record::{BatchItem, FIRST_ID, MAX_OWNER_LEN, MAX_URL_LEN, Record, validate_fields};
pub use storage::Storage;
